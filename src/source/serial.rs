//! Serial device line source
//!
//! Wraps a `serialport` handle. Reads use the configured read timeout, so a
//! quiet device surfaces as [`PortLogError::ReadTimeout`] rather than a
//! blocked thread; an I/O error or end-of-stream (USB adapter unplugged)
//! surfaces as [`PortLogError::SourceDisconnected`].

use super::line_buffer::LineBuffer;
use super::LineSource;
use crate::config::{to_serialport_data_bits, SerialSourceConfig};
use crate::error::{PortLogError, Result};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Line source backed by a serial device
pub struct SerialLineSource {
    config: SerialSourceConfig,
    port: Option<Box<dyn SerialPort>>,
    buffer: LineBuffer,
    scratch: [u8; 1024],
}

impl SerialLineSource {
    pub fn new(config: SerialSourceConfig) -> Self {
        Self {
            config,
            port: None,
            buffer: LineBuffer::new(),
            scratch: [0u8; 1024],
        }
    }

    pub fn config(&self) -> &SerialSourceConfig {
        &self.config
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read_timeout_ms)
    }

    fn disconnected(&mut self, reason: impl ToString) -> PortLogError {
        self.port = None;
        PortLogError::disconnected(&self.config.port_name, reason)
    }
}

impl LineSource for SerialLineSource {
    fn identity(&self) -> &str {
        &self.config.port_name
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let data_bits = to_serialport_data_bits(self.config.data_bits).ok_or_else(|| {
            PortLogError::ConfigInvalid(format!("data bits {}", self.config.data_bits))
        })?;

        let port = serialport::new(&self.config.port_name, self.config.baud_rate)
            .data_bits(data_bits)
            .parity(self.config.parity.into())
            .stop_bits(self.config.stop_bits.into())
            .flow_control(self.config.flow_control.into())
            .timeout(self.read_timeout())
            .open()
            .map_err(|e| PortLogError::unavailable(&self.config.port_name, e))?;

        tracing::info!(
            "Opened {} at {} (flow control: {})",
            self.config.port_name,
            self.config.line_summary(),
            self.config.flow_control
        );

        self.buffer.clear();
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
        self.buffer.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_line(&mut self) -> Result<String> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(line);
        }

        let deadline = Instant::now() + self.read_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PortLogError::ReadTimeout);
            }

            let Some(port) = self.port.as_mut() else {
                return Err(PortLogError::disconnected(&self.config.port_name, "port not open"));
            };
            if let Err(e) = port.set_timeout(remaining) {
                return Err(self.disconnected(e));
            }

            match port.read(&mut self.scratch) {
                Ok(0) => return Err(self.disconnected("end of stream")),
                Ok(n) => {
                    self.buffer.feed(&self.scratch[..n]);
                    if let Some(line) = self.buffer.next_line() {
                        return Ok(line);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(PortLogError::ReadTimeout);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.disconnected(e)),
            }
        }
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        let write_timeout = Duration::from_millis(self.config.write_timeout_ms);
        let read_timeout = self.read_timeout();
        let Some(port) = self.port.as_mut() else {
            return Err(PortLogError::disconnected(&self.config.port_name, "port not open"));
        };

        let result = port
            .set_timeout(write_timeout)
            .map_err(std::io::Error::from)
            .and_then(|_| port.write_all(text.as_bytes()))
            .and_then(|_| port.write_all(b"\n"))
            .and_then(|_| port.flush());
        let _ = port.set_timeout(read_timeout);

        result.map_err(|e| match e.kind() {
            ErrorKind::TimedOut => PortLogError::Io(e),
            _ => self.disconnected(e),
        })
    }
}

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub product: Option<String>,
}

/// List serial ports the OS reports
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| PortLogError::unavailable("serial ports", e))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (port_type, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => ("USB".to_string(), info.product),
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                product,
            }
        })
        .collect())
}
