// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Register layout of the energy meter
//!
//! Offsets are byte offsets into the frame returned by reading
//! [`READ_REGISTERS`] holding registers from address 0.
//!
//! ```text
//! 0   voltage          u16  /10   V
//! 2   current          u16  /10   A
//! 4   frequency        u16  /10   Hz
//! 6   active power     u16  /1    W
//! 8   reactive power   u16  /1    var
//! 10  apparent power   u16  /1    VA
//! 12  power factor     u16  /1000
//! 14  active energy    5 x u32 (total, T1..T4)  /100 kWh
//! 34  reactive energy  5 x u32 (total, T1..T4)  /100 kvarh
//! 54  time slots       4 x 24 bit
//! 66  device clock     u64
//! 74  temperature      u16  /1    C
//! ```
//!
//! Only the energy totals are read; the tariff bins, time slots and clock
//! are meaningless while the device clock is not set.

use crate::codec::Width;

/// Mains voltage, 16 bits
pub const VOLTAGE_REG: usize = 0;
/// Mains current, 16 bits
pub const CURRENT_REG: usize = 2;
/// Mains frequency, 16 bits
pub const FREQUENCY_REG: usize = 4;
/// Active power, 16 bits
pub const ACTIVE_POWER_REG: usize = 6;
/// Reactive power, 16 bits
pub const REACTIVE_POWER_REG: usize = 8;
/// Apparent power, 16 bits
pub const APPARENT_POWER_REG: usize = 10;
/// Power factor, 16 bits
pub const POWER_FACTOR_REG: usize = 12;
/// Active energy, 5 x 32 bits
pub const ACTIVE_ENERGY_REG: usize = 14;
/// Reactive energy, 5 x 32 bits
pub const REACTIVE_ENERGY_REG: usize = 34;
/// Energy time slots, 4 x 24 bits
pub const TIME_SLOT_REG: usize = 54;
/// Device real time clock, 64 bits
pub const CLOCK_REG: usize = 66;
/// Device temperature, 16 bits
pub const TEMPERATURE_REG: usize = 74;

/// Registers read per poll
pub const READ_REGISTERS: u16 = 39;

/// Frame length in bytes
pub const FRAME_LEN: usize = READ_REGISTERS as usize * 2;

/// Name of the poll failure counter
pub const READ_ERRORS_METRIC: &str = "sensor_read_errors_count";

/// Static description of a published quantity
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    /// Gauge name
    pub name: &'static str,
    /// Gauge help text
    pub help: &'static str,
    /// Byte offset into the frame
    pub offset: usize,
    /// Raw field width
    pub width: Width,
    /// Divisor applied to the raw value
    pub scale: f64,
    /// Keep the last value when a poll fails
    pub sticky: bool,
    /// Guard the value with a counter filter (sticky metrics only)
    pub filtered: bool,
}

impl MetricSpec {
    /// Instantaneous 16-bit reading, reset to zero on a failed poll
    pub const fn instant(name: &'static str, help: &'static str, offset: usize, scale: f64) -> Self {
        Self {
            name,
            help,
            offset,
            width: Width::U16,
            scale,
            sticky: false,
            filtered: false,
        }
    }

    /// Filtered 32-bit cumulative counter, kept across failed polls
    pub const fn counter(name: &'static str, help: &'static str, offset: usize, scale: f64) -> Self {
        Self {
            name,
            help,
            offset,
            width: Width::U32,
            scale,
            sticky: true,
            filtered: true,
        }
    }
}

/// Metrics published for the energy meter
pub const DEVICE_METRICS: [MetricSpec; 10] = [
    MetricSpec::instant("mains_voltage_v", "Mains voltage", VOLTAGE_REG, 10.0),
    MetricSpec::instant("mains_current_a", "Mains current", CURRENT_REG, 10.0),
    MetricSpec::instant("mains_frequency_hz", "Mains frequency", FREQUENCY_REG, 10.0),
    MetricSpec::instant("mains_active_power_w", "Mains active power", ACTIVE_POWER_REG, 1.0),
    MetricSpec::instant(
        "mains_reactive_power_var",
        "Mains reactive power",
        REACTIVE_POWER_REG,
        1.0,
    ),
    MetricSpec::instant(
        "mains_apparent_power_va",
        "Mains apparent power",
        APPARENT_POWER_REG,
        1.0,
    ),
    MetricSpec::instant(
        "mains_power_factor_pf",
        "Mains power factor",
        POWER_FACTOR_REG,
        1000.0,
    ),
    MetricSpec::counter(
        "mains_active_energy_kwh",
        "Mains active energy",
        ACTIVE_ENERGY_REG,
        100.0,
    ),
    MetricSpec::counter(
        "mains_reactive_energy_kvarh",
        "Mains reactive energy",
        REACTIVE_ENERGY_REG,
        100.0,
    ),
    MetricSpec::instant(
        "mains_device_temperature_c",
        "Mains device temperature",
        TEMPERATURE_REG,
        1.0,
    ),
];
