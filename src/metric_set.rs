// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Published gauges of one device
//!
//! A [`MetricSet`] binds every [`MetricSpec`] of the device table to a
//! gauge registered in an explicit [`Registry`]. It turns a validated frame
//! into gauge values and applies the failure policy: instantaneous readings
//! drop to zero, cumulative counters keep their last accepted value.

use crate::codec::Width;
use crate::config::PollerConfig;
use crate::error::{Error, Result};
use crate::filter::CounterFilter;
use crate::layout::{MetricSpec, DEVICE_METRICS, READ_ERRORS_METRIC};
use prometheus::{Gauge, Opts, Registry};
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Label carried by every gauge of a device
pub const DEVICE_LABEL: &str = "device_name";

/// One published quantity bound to its gauge
pub struct MetricDescriptor {
    name: &'static str,
    offset: usize,
    width: Width,
    scale: f64,
    sticky: bool,
    filter: Option<CounterFilter>,
    gauge: Gauge,
}

impl MetricDescriptor {
    /// Gauge name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Byte offset into the frame
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Raw field width
    pub fn width(&self) -> Width {
        self.width
    }

    /// Divisor applied to the raw value
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Whether the value survives a failed poll
    pub fn is_sticky(&self) -> bool {
        self.sticky
    }

    /// Whether readings go through a counter filter
    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// Currently published value
    pub fn value(&self) -> f64 {
        self.gauge.get()
    }
}

impl fmt::Debug for MetricDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricDescriptor")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("width", &self.width)
            .field("scale", &self.scale)
            .field("sticky", &self.sticky)
            .field("filter", &self.filter)
            .field("value", &self.gauge.get())
            .finish()
    }
}

/// Ordered gauges of one device plus its read error counter
pub struct MetricSet {
    descriptors: Vec<MetricDescriptor>,
    read_errors: Gauge,
    frame_len: usize,
    register_count: u16,
}

impl MetricSet {
    /// Build the gauges of the energy meter and register them.
    pub fn new(registry: &Registry, config: &PollerConfig) -> Result<Self> {
        Self::from_specs(
            registry,
            &config.device_name,
            &DEVICE_METRICS,
            config.frame_len(),
            config.energy_rate_limit,
        )
    }

    /// Build gauges from an arbitrary table and register them.
    ///
    /// Fails if `frame_len` is odd or spans more registers than one read
    /// can request, if a descriptor does not fit in `frame_len` bytes, has a
    /// non-positive scale or is filtered without being sticky, or if any
    /// gauge is already registered under the same name and label.
    pub fn from_specs(
        registry: &Registry,
        device_name: &str,
        specs: &[MetricSpec],
        frame_len: usize,
        rate_limit: f64,
    ) -> Result<Self> {
        if frame_len % 2 != 0 {
            return Err(Error::InvalidFrameLength(frame_len));
        }
        let register_count =
            u16::try_from(frame_len / 2).map_err(|_| Error::InvalidFrameLength(frame_len))?;

        let mut descriptors = Vec::with_capacity(specs.len());
        for spec in specs {
            validate(spec, frame_len)?;
            let gauge = register_gauge(registry, device_name, spec.name, spec.help)?;
            descriptors.push(MetricDescriptor {
                name: spec.name,
                offset: spec.offset,
                width: spec.width,
                scale: spec.scale,
                sticky: spec.sticky,
                filter: spec.filtered.then(|| CounterFilter::new(rate_limit)),
                gauge,
            });
        }

        let read_errors =
            register_gauge(registry, device_name, READ_ERRORS_METRIC, "Sensor read errors")?;

        Ok(Self {
            descriptors,
            read_errors,
            frame_len,
            register_count,
        })
    }

    /// Decode `frame` and publish every value.
    ///
    /// The frame must be exactly [`MetricSet::frame_len`] bytes long.
    pub fn apply(&mut self, frame: &[u8], now: Instant) {
        for d in &mut self.descriptors {
            let raw = d.width.decode(frame, d.offset, d.scale);
            let value = match d.filter.as_mut() {
                Some(filter) => {
                    let decision = filter.observe(raw, now);
                    if !decision.is_accepted() {
                        debug!(metric = d.name, raw, ?decision, "Counter reading rejected");
                    }
                    filter.last_accepted().unwrap_or(raw)
                }
                None => raw,
            };
            d.gauge.set(value);
        }
    }

    /// Record a failed poll: count it and zero the instantaneous readings.
    pub fn on_failure(&self) {
        self.read_errors.inc();
        for d in self.descriptors.iter().filter(|d| !d.sticky) {
            d.gauge.set(0.0);
        }
    }

    /// Frame length this set decodes
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Number of registers spanned by the frame
    pub fn register_count(&self) -> u16 {
        self.register_count
    }

    /// Number of published quantities, the error counter excluded
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the set publishes no quantity
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in table order
    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    /// Published value of a quantity
    pub fn value(&self, name: &str) -> Option<f64> {
        self.descriptors
            .iter()
            .find(|d| d.name == name)
            .map(MetricDescriptor::value)
    }

    /// Number of failed polls so far
    pub fn errors(&self) -> f64 {
        self.read_errors.get()
    }
}

impl fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSet")
            .field("descriptors", &self.descriptors)
            .field("errors", &self.read_errors.get())
            .field("frame_len", &self.frame_len)
            .finish()
    }
}

fn validate(spec: &MetricSpec, frame_len: usize) -> Result<()> {
    let invalid = |reason: String| Error::InvalidDescriptor {
        name: spec.name.to_string(),
        reason,
    };

    if !(spec.scale.is_finite() && spec.scale > 0.0) {
        return Err(invalid(format!("scale must be positive, got {}", spec.scale)));
    }
    let end = spec.offset + spec.width.bytes();
    if end > frame_len {
        return Err(invalid(format!(
            "field ends at byte {} but the frame has {}",
            end, frame_len
        )));
    }
    if spec.filtered && !spec.sticky {
        return Err(invalid("only sticky metrics can be filtered".to_string()));
    }
    Ok(())
}

fn register_gauge(registry: &Registry, device_name: &str, name: &str, help: &str) -> Result<Gauge> {
    let registration = |source| Error::Registration {
        name: name.to_string(),
        source,
    };

    let opts = Opts::new(name, help).const_label(DEVICE_LABEL, device_name);
    let gauge = Gauge::with_opts(opts).map_err(registration)?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(registration)?;
    Ok(gauge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FRAME_LEN;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn frame() -> Vec<u8> {
        let mut f = vec![0u8; FRAME_LEN];
        f[0..2].copy_from_slice(&2331u16.to_be_bytes()); // 233.1 V
        f[2..4].copy_from_slice(&52u16.to_be_bytes()); // 5.2 A
        f[4..6].copy_from_slice(&500u16.to_be_bytes()); // 50.0 Hz
        f[6..8].copy_from_slice(&1150u16.to_be_bytes());
        f[8..10].copy_from_slice(&120u16.to_be_bytes());
        f[10..12].copy_from_slice(&1200u16.to_be_bytes());
        f[12..14].copy_from_slice(&958u16.to_be_bytes());
        f[14..18].copy_from_slice(&123456u32.to_be_bytes()); // 1234.56 kWh
        f[34..38].copy_from_slice(&4200u32.to_be_bytes()); // 42.00 kvarh
        f[74..76].copy_from_slice(&31u16.to_be_bytes());
        f
    }

    fn meter(registry: &Registry) -> MetricSet {
        MetricSet::new(registry, &PollerConfig::default()).unwrap()
    }

    #[test]
    fn test_new_registers_all_gauges() {
        let registry = Registry::new();
        let set = meter(&registry);
        assert_eq!(set.len(), DEVICE_METRICS.len());
        assert_eq!(set.frame_len(), FRAME_LEN);
        // 10 quantities + error counter
        assert_eq!(registry.gather().len(), 11);
    }

    #[test]
    fn test_descriptors_follow_table() {
        let registry = Registry::new();
        let set = meter(&registry);
        for (d, spec) in set.descriptors().iter().zip(DEVICE_METRICS.iter()) {
            assert_eq!(d.name(), spec.name);
            assert_eq!(d.offset(), spec.offset);
            assert_eq!(d.width(), spec.width);
            assert_eq!(d.scale(), spec.scale);
            assert_eq!(d.is_sticky(), spec.sticky);
            assert_eq!(d.is_filtered(), spec.filtered);
        }
        assert!(!set.is_empty());
    }

    #[test]
    fn test_apply_decodes_frame() {
        let registry = Registry::new();
        let mut set = meter(&registry);
        set.apply(&frame(), Instant::now());

        assert_relative_eq!(set.value("mains_voltage_v").unwrap(), 233.1);
        assert_relative_eq!(set.value("mains_current_a").unwrap(), 5.2);
        assert_relative_eq!(set.value("mains_frequency_hz").unwrap(), 50.0);
        assert_relative_eq!(set.value("mains_active_power_w").unwrap(), 1150.0);
        assert_relative_eq!(set.value("mains_power_factor_pf").unwrap(), 0.958);
        assert_relative_eq!(set.value("mains_active_energy_kwh").unwrap(), 1234.56);
        assert_relative_eq!(set.value("mains_reactive_energy_kvarh").unwrap(), 42.0);
        assert_relative_eq!(set.value("mains_device_temperature_c").unwrap(), 31.0);
    }

    #[test]
    fn test_on_failure_resets_only_instant_readings() {
        let registry = Registry::new();
        let mut set = meter(&registry);
        set.apply(&frame(), Instant::now());
        set.on_failure();

        assert_eq!(set.errors(), 1.0);
        for d in set.descriptors() {
            if d.is_sticky() {
                assert!(d.value() > 0.0, "{} was reset", d.name());
            } else {
                assert_eq!(d.value(), 0.0, "{} was kept", d.name());
            }
        }
    }

    #[test]
    fn test_apply_filters_energy_spike() {
        let registry = Registry::new();
        let mut set = meter(&registry);
        let t0 = Instant::now();
        set.apply(&frame(), t0);

        let mut corrupted = frame();
        corrupted[14..18].copy_from_slice(&u32::MAX.to_be_bytes());
        corrupted[34..38].copy_from_slice(&0u32.to_be_bytes());
        set.apply(&corrupted, t0 + Duration::from_secs(10));

        assert_relative_eq!(set.value("mains_active_energy_kwh").unwrap(), 1234.56);
        assert_relative_eq!(set.value("mains_reactive_energy_kvarh").unwrap(), 42.0);
    }

    #[test]
    fn test_apply_publishes_gradual_energy_increase() {
        let registry = Registry::new();
        let mut set = meter(&registry);
        let t0 = Instant::now();
        set.apply(&frame(), t0);

        let mut later = frame();
        later[14..18].copy_from_slice(&123457u32.to_be_bytes());
        later[34..38].copy_from_slice(&4210u32.to_be_bytes());
        set.apply(&later, t0 + Duration::from_secs(10));

        assert_relative_eq!(set.value("mains_active_energy_kwh").unwrap(), 1234.57);
        assert_relative_eq!(set.value("mains_reactive_energy_kvarh").unwrap(), 42.1);
    }

    #[test]
    fn test_register_count_follows_frame() {
        let registry = Registry::new();
        let set = meter(&registry);
        assert_eq!(set.register_count(), 39);
    }

    #[test]
    fn test_odd_frame_length_rejected() {
        let registry = Registry::new();
        let result = MetricSet::from_specs(&registry, "dev", &DEVICE_METRICS, FRAME_LEN + 1, 0.1);
        assert!(matches!(result, Err(Error::InvalidFrameLength(79))));
    }

    #[test]
    fn test_frame_beyond_one_read_rejected() {
        let registry = Registry::new();
        let frame_len = (usize::from(u16::MAX) + 1) * 2;
        let result = MetricSet::from_specs(&registry, "dev", &DEVICE_METRICS, frame_len, 0.1);
        assert!(matches!(result, Err(Error::InvalidFrameLength(n)) if n == frame_len));
        // Nothing was registered
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        let _set = meter(&registry);
        let result = MetricSet::new(&registry, &PollerConfig::default());
        assert!(matches!(result, Err(Error::Registration { .. })));
    }

    #[test]
    fn test_distinct_devices_share_registry() {
        let registry = Registry::new();
        let _a = meter(&registry);
        let b = MetricSet::new(&registry, &PollerConfig::with_device_name("garage"));
        assert!(b.is_ok());
    }

    #[test]
    fn test_descriptor_outside_frame_rejected() {
        let registry = Registry::new();
        let specs = [MetricSpec::counter("late_energy", "Late energy", 76, 100.0)];
        let result = MetricSet::from_specs(&registry, "dev", &specs, FRAME_LEN, 0.1);
        assert!(matches!(result, Err(Error::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let registry = Registry::new();
        let specs = [MetricSpec::instant("bad_scale", "Bad scale", 0, 0.0)];
        let result = MetricSet::from_specs(&registry, "dev", &specs, FRAME_LEN, 0.1);
        assert!(matches!(result, Err(Error::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_filtered_must_be_sticky() {
        let registry = Registry::new();
        let mut spec = MetricSpec::counter("odd", "Odd", 0, 1.0);
        spec.sticky = false;
        let result = MetricSet::from_specs(&registry, "dev", &[spec], FRAME_LEN, 0.1);
        assert!(matches!(result, Err(Error::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_gauges_carry_device_label() {
        let registry = Registry::new();
        let _set = MetricSet::new(&registry, &PollerConfig::with_device_name("shed")).unwrap();
        for family in registry.gather() {
            let label = &family.get_metric()[0].get_label()[0];
            assert_eq!(label.get_name(), DEVICE_LABEL);
            assert_eq!(label.get_value(), "shed");
        }
    }
}
