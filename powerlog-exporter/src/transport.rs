// Powerlog Exporter - Modbus register source
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Modbus register source over a serial line (RTU) or TCP.

use async_trait::async_trait;
use powerlog::RegisterSource;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::client::{rtu, tcp, Context};
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::info;

/// Serial line settings, 8N1 framing
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// TTY device path
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Modbus slave address
    pub slave_id: u8,
}

/// Holding register reader with a per-request timeout
pub struct ModbusSource {
    ctx: Context,
    timeout: Duration,
}

impl ModbusSource {
    /// Open a serial device and attach a Modbus RTU client to it.
    pub fn rtu(settings: &SerialSettings, timeout: Duration) -> Result<Self, tokio_serial::Error> {
        let builder = tokio_serial::new(&settings.path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(timeout);
        let port = SerialStream::open(&builder)?;
        info!("Connected to device: {}", settings.path);

        Ok(Self {
            ctx: rtu::attach_slave(port, Slave(settings.slave_id)),
            timeout,
        })
    }

    /// Connect to a Modbus TCP device or gateway.
    pub async fn tcp(addr: SocketAddr, slave_id: u8, timeout: Duration) -> io::Result<Self> {
        let ctx = tokio::time::timeout(timeout, tcp::connect_slave(addr, Slave(slave_id)))
            .await
            .map_err(|_| timed_out(timeout))??;
        info!("Connected to device: {}", addr);

        Ok(Self { ctx, timeout })
    }
}

#[async_trait]
impl RegisterSource for ModbusSource {
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> io::Result<Vec<u8>> {
        let words = tokio::time::timeout(
            self.timeout,
            self.ctx.read_holding_registers(address, count),
        )
        .await
        .map_err(|_| timed_out(self.timeout))??;
        Ok(registers_to_bytes(&words))
    }
}

fn timed_out(timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("no response within {:?}", timeout),
    )
}

/// Big-endian byte image of a register block
pub fn registers_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_to_bytes() {
        assert_eq!(registers_to_bytes(&[0x0110, 0x0002]), vec![0x01, 0x10, 0x00, 0x02]);
        assert!(registers_to_bytes(&[]).is_empty());
    }

    #[test]
    fn test_registers_decode_as_frame() {
        let bytes = registers_to_bytes(&[0x0001, 0x0210]);
        assert_eq!(powerlog::decode32(&bytes, 0, 100.0), 660.64);
    }

    #[test]
    fn test_missing_serial_device() {
        let settings = SerialSettings {
            path: "/dev/powerlog-does-not-exist".to_string(),
            baud_rate: 9600,
            slave_id: 1,
        };
        assert!(ModbusSource::rtu(&settings, Duration::from_secs(1)).is_err());
    }
}
