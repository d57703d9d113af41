// Powerlog - Meter acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Register codec
//!
//! Converts big-endian register contents of a frame into physical values.
//! All functions index the frame directly: the caller guarantees that the
//! field lies inside the frame (see [`crate::MetricSet`] and
//! [`crate::PollCycle`], which validate offsets and frame length).

/// Raw width of a register field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// One 16-bit register
    U16,
    /// Two consecutive registers forming a 32-bit value
    U32,
}

impl Width {
    /// Size of the field in bytes
    pub fn bytes(&self) -> usize {
        match self {
            Width::U16 => 2,
            Width::U32 => 4,
        }
    }

    /// Decode a field of this width at `offset`
    pub fn decode(&self, frame: &[u8], offset: usize, scale: f64) -> f64 {
        match self {
            Width::U16 => decode16(frame, offset, scale),
            Width::U32 => decode32(frame, offset, scale),
        }
    }
}

/// Read a 16-bit big-endian unsigned value and divide it by `scale`.
///
/// # Panics
///
/// Panics if `offset + 2` exceeds the frame length.
pub fn decode16(frame: &[u8], offset: usize, scale: f64) -> f64 {
    let raw = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
    f64::from(raw) / scale
}

/// Read a 32-bit big-endian unsigned value and divide it by `scale`.
///
/// Energy totals are followed by four tariff bins on the device. The bins
/// depend on the device clock, which is never set, so only the total is read.
///
/// # Panics
///
/// Panics if `offset + 4` exceeds the frame length.
pub fn decode32(frame: &[u8], offset: usize, scale: f64) -> f64 {
    let raw = u32::from_be_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ]);
    f64::from(raw) / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decode16() {
        assert_relative_eq!(decode16(&[0x01, 0x10], 0, 1.0), 272.0);
        assert_relative_eq!(decode16(&[0x01, 0x10], 0, 100.0), 2.72, epsilon = 1e-9);
    }

    #[test]
    fn test_decode32() {
        let data = [0x00, 0x01, 0x02, 0x10];
        assert_relative_eq!(decode32(&data, 0, 1.0), 66064.0);
        assert_relative_eq!(decode32(&data, 0, 100.0), 660.64, epsilon = 1e-9);
    }

    #[test]
    fn test_decode_at_offset() {
        let data = [0xff, 0xff, 0x09, 0x1a, 0xff];
        // 0x091a = 2330 -> 233.0 V
        assert_relative_eq!(decode16(&data, 2, 10.0), 233.0);
    }

    #[test]
    fn test_decode16_full_range() {
        for v in [0u16, 1, 255, 256, 4095, u16::MAX] {
            let bytes = v.to_be_bytes();
            for scale in [1.0, 10.0, 100.0, 1000.0] {
                assert_relative_eq!(decode16(&bytes, 0, scale), v as f64 / scale);
            }
        }
    }

    #[test]
    fn test_width_dispatch() {
        let data = [0x00, 0x01, 0x02, 0x10];
        assert_eq!(Width::U16.bytes(), 2);
        assert_eq!(Width::U32.bytes(), 4);
        assert_relative_eq!(Width::U16.decode(&data, 0, 1.0), 1.0);
        assert_relative_eq!(Width::U32.decode(&data, 0, 1.0), 66064.0);
    }

    #[test]
    #[should_panic]
    fn test_decode32_out_of_range() {
        decode32(&[0x00, 0x01, 0x02], 0, 1.0);
    }
}
