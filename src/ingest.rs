//! Serial ingestion worker.
//!
//! One background thread per active connection. The thread owns the link,
//! reads one line per iteration with a bounded wait, normalizes it, and pushes
//! the resulting [`ScanEvent`] onto the hand-off queue. It never touches the
//! record store or any UI state; failures travel back to the foreground on a
//! separate error channel.
//!
//! Cancellation is cooperative: the stop flag is checked between reads and
//! while waiting for room in a full hand-off queue, so shutting down takes at
//! most one read timeout.

use crate::adapters::{Connector, SerialLink};
use crate::error::{AppResult, AttendanceError};
use crate::identifier::{self, Identifier};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace, warn};

/// Producer side of the hand-off queue.
pub type ScanSender = mpsc::Sender<ScanEvent>;
/// Consumer side of the hand-off queue.
pub type ScanReceiver = mpsc::Receiver<ScanEvent>;
/// Worker failure reports, consumed on the foreground context.
pub type ErrorSender = mpsc::UnboundedSender<AttendanceError>;

/// One tag read, as received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Canonical form of `raw`
    pub identifier: Identifier,
    /// Decoded line with surrounding whitespace trimmed
    pub raw: String,
    /// When the line came off the link
    pub received_at: DateTime<Local>,
}

impl ScanEvent {
    /// Decode a raw line. Undecodable bytes are dropped rather than failing
    /// the read. Returns `None` when nothing identifier-like is left.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(bytes).replace(char::REPLACEMENT_CHARACTER, "");
        let raw = text.trim();
        if raw.is_empty() {
            return None;
        }
        let identifier = identifier::normalize(raw);
        if identifier.is_empty() {
            return None;
        }
        Some(Self {
            identifier,
            raw: raw.to_string(),
            received_at: Local::now(),
        })
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Port name passed to the connector
    pub port: String,
    /// Line speed
    pub baud_rate: u32,
    /// Bounded wait per line; also the stop latency
    pub read_timeout: Duration,
}

/// Handle to a running worker.
///
/// Dropping the handle raises the stop flag but does not wait for the thread.
#[derive(Debug)]
pub struct IngestHandle {
    port: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl IngestHandle {
    /// Port this worker reads.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Ask the worker to stop after its current read.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True once the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread to exit. The link is closed once this returns.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(port = %self.port, "Serial reader thread panicked");
            }
        }
    }

    /// Stop and wait.
    pub fn shutdown(self) {
        self.stop();
        self.join();
    }
}

impl Drop for IngestHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Exit {
    Stopped,
    QueueClosed,
    Failed(AttendanceError),
}

/// Start a reader thread for `config.port`.
///
/// The connection is opened on the new thread; an open failure is reported on
/// `errors` and the thread ends without reading.
pub fn spawn(
    connector: Arc<dyn Connector>,
    config: WorkerConfig,
    queue: ScanSender,
    errors: ErrorSender,
) -> AppResult<IngestHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let port = config.port.clone();

    let thread = thread::Builder::new()
        .name(format!("serial-{}", config.port))
        .spawn({
            let stop = stop.clone();
            move || run(connector.as_ref(), &config, &stop, &queue, &errors)
        })?;

    Ok(IngestHandle {
        port,
        stop,
        thread: Some(thread),
    })
}

fn run(
    connector: &dyn Connector,
    config: &WorkerConfig,
    stop: &AtomicBool,
    queue: &ScanSender,
    errors: &ErrorSender,
) {
    let mut link = match connector.open(&config.port, config.baud_rate, config.read_timeout) {
        Ok(link) => link,
        Err(e) => {
            error!(port = %config.port, error = %e, "Failed to open serial port");
            let _ = errors.send(e);
            return;
        }
    };
    info!(port = %config.port, baud = config.baud_rate, "Serial reader started");

    let exit = read_loop(link.as_mut(), stop, queue, queue_backoff(config.read_timeout));

    if let Err(e) = link.close() {
        warn!(port = %config.port, error = %e, "Error closing serial port");
    }

    match exit {
        Exit::Stopped => info!(port = %config.port, "Serial reader stopped"),
        Exit::QueueClosed => debug!(port = %config.port, "Hand-off queue closed, serial reader exiting"),
        Exit::Failed(e) => {
            error!(port = %config.port, error = %e, "Serial reader failed");
            let _ = errors.send(e);
        }
    }
}

fn read_loop(link: &mut dyn SerialLink, stop: &AtomicBool, queue: &ScanSender, backoff: Duration) -> Exit {
    while !stop.load(Ordering::Acquire) {
        let bytes = match link.read_line() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => return Exit::Failed(AttendanceError::Read(e.to_string())),
        };

        let Some(event) = ScanEvent::from_bytes(&bytes) else {
            trace!(port = link.port_name(), bytes = bytes.len(), "Ignoring line without identifier");
            continue;
        };

        debug!(identifier = %event.identifier, raw = %event.raw, "Tag scanned");
        match publish(event, stop, queue, backoff) {
            Publish::Sent => {}
            Publish::Stopped => break,
            Publish::Closed => return Exit::QueueClosed,
        }
    }
    Exit::Stopped
}

enum Publish {
    Sent,
    Stopped,
    Closed,
}

/// Poll interval while the hand-off queue is full.
fn queue_backoff(read_timeout: Duration) -> Duration {
    (read_timeout / 10).clamp(Duration::from_millis(1), Duration::from_millis(10))
}

/// Push one event, waiting for room while the queue is full.
///
/// The stop flag is re-checked between attempts, so a full queue that nobody
/// drains never holds the thread past a stop request. Nothing is pushed once
/// the flag is raised.
fn publish(mut event: ScanEvent, stop: &AtomicBool, queue: &ScanSender, backoff: Duration) -> Publish {
    loop {
        if stop.load(Ordering::Acquire) {
            warn!(identifier = %event.identifier, "Stop requested before the scan was queued; scan discarded");
            return Publish::Stopped;
        }
        match queue.try_send(event) {
            Ok(()) => return Publish::Sent,
            Err(TrySendError::Closed(_)) => return Publish::Closed,
            Err(TrySendError::Full(pending)) => {
                event = pending;
                thread::sleep(backoff);
            }
        }
    }
}
