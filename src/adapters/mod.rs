//! Serial link abstractions.
//!
//! The ingestion worker and the LED panel only ever talk to a [`SerialLink`]
//! obtained from a [`Connector`]. Two connectors exist:
//!
//! - [`SystemConnector`]: real ports through the `serialport` crate
//!   (`instrument_serial` feature);
//! - [`MockConnector`]: scripted device for tests and dry runs.

use crate::error::AppResult;
use std::io;
use std::time::Duration;

pub mod serial;
pub use serial::SystemConnector;

pub mod mock_adapter;
pub use mock_adapter::{MockConnector, MockDevice, MockRead, MOCK_PORT};

/// An open byte stream to a device.
///
/// `read_line` blocks for at most the timeout the link was opened with.
pub trait SerialLink: Send {
    /// Name the link was opened with.
    fn port_name(&self) -> &str;

    /// Read one newline-terminated line.
    ///
    /// Returns `Ok(None)` if the timeout elapsed with nothing received. A
    /// partial line that is still unterminated when the timeout elapses is
    /// returned as-is.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Write every byte and flush.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Release the underlying device. Further reads and writes fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Port enumeration and connection-open primitive.
pub trait Connector: Send + Sync {
    /// Names of the ports currently present.
    fn available_ports(&self) -> AppResult<Vec<String>>;

    /// Open `port`; reads on the returned link wait at most `timeout`.
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> AppResult<Box<dyn SerialLink>>;
}

/// Splits a byte stream into `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    /// Append raw bytes as they arrive.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete line, terminator included.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let rest = self.pending.split_off(end + 1);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// Take whatever is buffered, if anything.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_across_chunks() {
        let mut lines = LineAssembler::default();
        lines.push(b"AB1");
        assert_eq!(lines.next_line(), None);
        lines.push(b"2CD\r\nEF");
        assert_eq!(lines.next_line(), Some(b"AB12CD\r\n".to_vec()));
        assert_eq!(lines.next_line(), None);
        lines.push(b"34\n\n");
        assert_eq!(lines.next_line(), Some(b"EF34\n".to_vec()));
        assert_eq!(lines.next_line(), Some(b"\n".to_vec()));
        assert_eq!(lines.flush(), None);
    }

    #[test]
    fn flush_returns_partial_line() {
        let mut lines = LineAssembler::default();
        lines.push(b"0A0B");
        assert_eq!(lines.flush(), Some(b"0A0B".to_vec()));
        assert_eq!(lines.flush(), None);
    }
}
