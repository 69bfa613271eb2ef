//! Hardware serial ports via the `serialport` crate.

use super::{Connector, SerialLink};
use crate::error::{AppResult, AttendanceError};
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use super::LineAssembler;
#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::io::{self, Read, Write};
use std::time::Instant;
#[cfg(feature = "instrument_serial")]
use tracing::{debug, trace};

/// Opens real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

#[cfg(feature = "instrument_serial")]
impl Connector for SystemConnector {
    fn available_ports(&self) -> AppResult<Vec<String>> {
        let ports = serialport::available_ports().map_err(|e| AttendanceError::Io(e.into()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> AppResult<Box<dyn SerialLink>> {
        let handle = serialport::new(port, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| AttendanceError::ConnectionOpen {
                port: port.to_string(),
                reason: e.to_string(),
            })?;
        debug!(port, baud_rate, timeout_ms = timeout.as_millis() as u64, "Serial port opened");

        Ok(Box::new(SerialPortLink {
            name: port.to_string(),
            port: Some(handle),
            timeout,
            lines: LineAssembler::default(),
        }))
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl Connector for SystemConnector {
    fn available_ports(&self) -> AppResult<Vec<String>> {
        Err(AttendanceError::SerialFeatureDisabled)
    }

    fn open(&self, _port: &str, _baud_rate: u32, _timeout: Duration) -> AppResult<Box<dyn SerialLink>> {
        Err(AttendanceError::SerialFeatureDisabled)
    }
}

/// An open hardware port.
#[cfg(feature = "instrument_serial")]
pub struct SerialPortLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    timeout: Duration,
    lines: LineAssembler,
}

#[cfg(feature = "instrument_serial")]
impl SerialPortLink {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

#[cfg(feature = "instrument_serial")]
impl SerialLink for SerialPortLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + self.timeout;
        let mut chunk = [0u8; 256];
        loop {
            let Some(budget) = remaining_until(deadline, Instant::now()) else {
                return Ok(self.lines.flush());
            };
            let port = self.port()?;
            port.set_timeout(budget).map_err(io::Error::from)?;
            match port.read(&mut chunk) {
                Ok(0) => return Ok(self.lines.flush()),
                Ok(n) => {
                    trace!(port = %self.name, bytes = n, "Serial read");
                    self.lines.push(&chunk[..n]);
                    if let Some(line) = self.lines.next_line() {
                        return Ok(Some(line));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(self.lines.flush()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.name, "Serial port closed");
        }
        Ok(())
    }
}

/// Time left before `deadline`, or `None` once it has passed.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
fn remaining_until(deadline: Instant, now: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(now)
        .filter(|left| !left.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_budget_shrinks_to_the_deadline() {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(100);

        assert_eq!(remaining_until(deadline, start), Some(Duration::from_millis(100)));
        assert_eq!(
            remaining_until(deadline, start + Duration::from_millis(70)),
            Some(Duration::from_millis(30))
        );
        assert_eq!(remaining_until(deadline, deadline), None);
        assert_eq!(remaining_until(deadline, deadline + Duration::from_millis(1)), None);
    }
}
