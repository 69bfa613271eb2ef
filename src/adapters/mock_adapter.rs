//! Mock serial device for testing
//!
//! A [`MockDevice`] plays the role of the microcontroller: tests queue up
//! what the device "prints" and later inspect what was written to it and
//! whether the link was closed. A [`MockConnector`] hands out links bound to
//! that device. It provides:
//! - Scripted reads (lines, timeouts, I/O errors)
//! - Open-failure injection
//! - Open/close/write bookkeeping for test verification
//!
//! # Example
//!
//! ```
//! use rfid_attendance::adapters::{Connector, MockConnector, MockDevice, SerialLink};
//! use std::time::Duration;
//!
//! let device = MockDevice::new();
//! device.push_line("AB 12 CD");
//! let connector = MockConnector::new(device.clone());
//! let mut link = connector.open("mock0", 9600, Duration::from_millis(5)).unwrap();
//! assert_eq!(link.read_line().unwrap(), Some(b"AB 12 CD\n".to_vec()));
//! ```

use super::{Connector, SerialLink};
use crate::error::{AppResult, AttendanceError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default port name exposed by [`MockConnector::new`].
pub const MOCK_PORT: &str = "mock0";

/// One scripted read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// Bytes returned as one line
    Line(Vec<u8>),
    /// Nothing arrives for one timeout interval
    Timeout,
    /// The read fails with this message
    Fail(String),
}

#[derive(Debug, Default)]
struct DeviceState {
    script: Mutex<VecDeque<MockRead>>,
    written: Mutex<Vec<u8>>,
    open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
}

/// Shared handle to a simulated device.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<DeviceState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockDevice {
    /// A device with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line; a trailing newline is added.
    pub fn push_line(&self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push(MockRead::Line(bytes));
    }

    /// Queue one scripted read result.
    pub fn push(&self, read: MockRead) {
        lock(&self.state.script).push_back(read);
    }

    /// Reads not yet consumed by a link.
    pub fn pending(&self) -> usize {
        lock(&self.state.script).len()
    }

    /// Every byte written to the device so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state.written).clone()
    }

    /// Whether a link to the device is currently open.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Successful opens so far.
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Closes so far.
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Total `read_line` calls across all links.
    pub fn read_count(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }
}

/// Connector whose every port leads to the same [`MockDevice`].
#[derive(Debug)]
pub struct MockConnector {
    device: MockDevice,
    ports: Vec<String>,
    fail_next_open: Mutex<Option<String>>,
}

impl MockConnector {
    /// A connector exposing [`MOCK_PORT`] backed by `device`.
    pub fn new(device: MockDevice) -> Self {
        Self {
            device,
            ports: vec![MOCK_PORT.to_string()],
            fail_next_open: Mutex::new(None),
        }
    }

    /// Replace the port names that enumerate and open successfully.
    pub fn with_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Make the next `open` fail with `reason`.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        *lock(&self.fail_next_open) = Some(reason.into());
    }

    /// The device behind every link this connector opens.
    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

impl Connector for MockConnector {
    fn available_ports(&self) -> AppResult<Vec<String>> {
        Ok(self.ports.clone())
    }

    fn open(&self, port: &str, _baud_rate: u32, timeout: Duration) -> AppResult<Box<dyn SerialLink>> {
        if let Some(reason) = lock(&self.fail_next_open).take() {
            return Err(AttendanceError::ConnectionOpen {
                port: port.to_string(),
                reason,
            });
        }
        if !self.ports.iter().any(|p| p == port) {
            return Err(AttendanceError::ConnectionOpen {
                port: port.to_string(),
                reason: "no such port".to_string(),
            });
        }

        self.device.state.open.store(true, Ordering::SeqCst);
        self.device.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLink {
            name: port.to_string(),
            device: self.device.clone(),
            timeout,
            closed: false,
        }))
    }
}

struct MockLink {
    name: String,
    device: MockDevice,
    timeout: Duration,
    closed: bool,
}

impl MockLink {
    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "mock link closed"))
        } else {
            Ok(())
        }
    }
}

impl SerialLink for MockLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.device.state.reads.fetch_add(1, Ordering::SeqCst);

        let next = lock(&self.device.state.script).pop_front();
        match next {
            Some(MockRead::Line(bytes)) => Ok(Some(bytes)),
            Some(MockRead::Fail(message)) => Err(io::Error::new(io::ErrorKind::Other, message)),
            Some(MockRead::Timeout) | None => {
                std::thread::sleep(self.timeout);
                Ok(None)
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        lock(&self.device.state.written).extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.closed = true;
            self.device.state.open.store(false, Ordering::SeqCst);
            self.device.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
