//! The core application state and logic.
//!
//! `App` is owned by the foreground context. It holds everything the user
//! sees (profiles, recent attendance, registration form, detected tag), the
//! record store, and the single optional reader thread. Every user action is a
//! [`Command`] applied through [`App::apply`]; rendering is a separate, pure
//! projection of [`AppState`] (see `crate::view`).

use crate::{
    adapters::Connector,
    config::{SerialSettings, Settings},
    error::{AppResult, AttendanceError},
    identifier::{normalize, Identifier},
    ingest::{self, ErrorSender, IngestHandle, ScanEvent, ScanReceiver, ScanSender, WorkerConfig},
    store::{AttendanceRecord, Profile, RecordStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Registration form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    /// Tag identifier, canonicalized on save
    Identifier,
    /// Display name
    Name,
    /// Free text, optional
    Age,
}

/// Text currently typed into the registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    /// Raw identifier text
    pub identifier: String,
    /// Name as typed
    pub name: String,
    /// Age as typed; empty means none
    pub age: String,
}

/// A user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-enumerate serial ports
    RefreshPorts,
    /// Start a reader on `port`
    Connect {
        /// Port name as listed by `RefreshPorts`
        port: String,
    },
    /// Stop the reader, if any
    Disconnect,
    /// Clear the registration form
    NewForm,
    /// Copy a profile into the form
    SelectProfile(String),
    /// Overwrite one form field
    SetField {
        /// Field to overwrite
        field: FormField,
        /// New text, stored as typed
        value: String,
    },
    /// Add or update the profile described by the form
    SaveForm,
    /// Delete the profile with this identifier
    DeleteProfile(String),
    /// Copy the last detected tag into the form
    AssignDetected,
    /// Record attendance for the last detected tag
    LogDetected,
    /// Record attendance for the tag in the form, registering it first if needed
    LogForm,
    /// Copy the attendance log to `path`
    Export {
        /// Destination file, overwritten if present
        path: PathBuf,
    },
    /// Re-read both data files
    Reload,
}

/// Something the front end should tell the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Plain status message
    Info(String),
    /// A record was appended to the attendance log
    AttendanceLogged(AttendanceRecord),
    /// A scanned tag matched no profile and was staged into the form
    UnknownTag(Identifier),
    /// A command or the reader failed
    Error(String),
}

/// Everything the views render.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Registered profiles, in file order
    pub profiles: Vec<Profile>,
    /// Tail of the attendance log
    pub recent_attendance: Vec<AttendanceRecord>,
    /// Registration form contents
    pub form: RegistrationForm,
    /// Last identifier received from the reader
    pub detected: Option<Identifier>,
    /// Profile loaded into the form with `SelectProfile`
    pub selected: Option<Identifier>,
    /// Ports found by the last `RefreshPorts`
    pub ports: Vec<String>,
    /// Port of the running reader
    pub connected_port: Option<String>,
    /// Bumped every time the views need re-rendering
    pub revision: u64,
    /// Pending messages, drained by [`App::take_notifications`]
    pub notifications: Vec<Notification>,
}

impl AppState {
    /// Profile registered under `identifier`, if any.
    pub fn find_profile(&self, identifier: &Identifier) -> Option<&Profile> {
        self.profiles.iter().find(|p| &p.identifier == identifier)
    }
}

/// Foreground application: state, record store and reader thread.
pub struct App {
    store: RecordStore,
    connector: Arc<dyn Connector>,
    serial: SerialSettings,
    log_view_limit: usize,
    state: AppState,
    reader: Option<IngestHandle>,
    scan_tx: ScanSender,
    scan_rx: ScanReceiver,
    error_tx: ErrorSender,
    error_rx: mpsc::UnboundedReceiver<AttendanceError>,
}

impl App {
    /// Build the application without touching the filesystem.
    pub fn new(settings: &Settings, connector: Arc<dyn Connector>) -> Self {
        let (scan_tx, scan_rx) = mpsc::channel(settings.serial.queue_capacity.max(1));
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        Self {
            store: RecordStore::from_settings(&settings.storage),
            connector,
            serial: settings.serial.clone(),
            log_view_limit: settings.coordinator.log_view_limit,
            state: AppState::default(),
            reader: None,
            scan_tx,
            scan_rx,
            error_tx,
            error_rx,
        }
    }

    /// Build the application, create missing data files and load them.
    pub fn open(settings: &Settings, connector: Arc<dyn Connector>) -> AppResult<Self> {
        let mut app = Self::new(settings, connector);
        app.store.ensure_files()?;
        app.reload()?;
        Ok(app)
    }

    /// Current state, for rendering.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The backing record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Whether a reader thread is running or has not been reaped yet.
    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    /// Drain pending notifications, oldest first.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.state.notifications)
    }

    /// Profile registered under `identifier`, if any.
    pub fn find_profile(&self, identifier: &Identifier) -> Option<&Profile> {
        self.state.find_profile(identifier)
    }

    /// Apply one user action.
    ///
    /// On error nothing was persisted and the profile list is unchanged.
    pub fn apply(&mut self, command: Command) -> AppResult<()> {
        match command {
            Command::RefreshPorts => {
                self.state.ports = self.connector.available_ports()?;
                Ok(())
            }
            Command::Connect { port } => self.connect(port.trim()),
            Command::Disconnect => {
                self.disconnect();
                Ok(())
            }
            Command::NewForm => {
                self.state.form = RegistrationForm::default();
                self.state.selected = None;
                Ok(())
            }
            Command::SelectProfile(identifier) => self.select_profile(&normalize(&identifier)),
            Command::SetField { field, value } => {
                let slot = match field {
                    FormField::Identifier => &mut self.state.form.identifier,
                    FormField::Name => &mut self.state.form.name,
                    FormField::Age => &mut self.state.form.age,
                };
                *slot = value;
                Ok(())
            }
            Command::SaveForm => self.save_form(),
            Command::DeleteProfile(identifier) => self.delete_profile(&normalize(&identifier)),
            Command::AssignDetected => {
                let detected = self.detected()?;
                self.state.form.identifier = detected.to_string();
                Ok(())
            }
            Command::LogDetected => self.log_detected(),
            Command::LogForm => self.log_form(),
            Command::Export { path } => {
                self.store.export_attendance(&path)?;
                self.notify(Notification::Info(format!(
                    "Attendance log exported to {}",
                    path.display()
                )));
                Ok(())
            }
            Command::Reload => self.reload(),
        }
    }

    /// Re-read both files into the views. State is untouched on failure.
    pub fn reload(&mut self) -> AppResult<()> {
        let profiles = self.store.load_profiles()?;
        let recent = self.store.load_attendance(Some(self.log_view_limit))?;
        self.state.profiles = profiles;
        self.state.recent_attendance = recent;
        self.state.revision += 1;
        Ok(())
    }

    /// Stop the reader, if any, and wait until its port is closed.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.reader.take() {
            let port = handle.port().to_string();
            handle.shutdown();
            self.state.connected_port = None;
            self.notify(Notification::Info(format!("Disconnected from {}", port)));
        }
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.state.notifications.push(notification);
    }

    pub(crate) fn next_scan(&mut self) -> Option<ScanEvent> {
        self.scan_rx.try_recv().ok()
    }

    pub(crate) fn next_reader_error(&mut self) -> Option<AttendanceError> {
        self.error_rx.try_recv().ok()
    }

    pub(crate) fn set_detected(&mut self, identifier: Identifier) {
        self.state.detected = Some(identifier);
    }

    /// Put an unregistered identifier into the form so it can be registered.
    pub(crate) fn stage_for_registration(&mut self, identifier: &Identifier) {
        self.state.form.identifier = identifier.to_string();
    }

    /// Forget a reader thread that has already exited (open or read failure).
    pub(crate) fn reap_reader(&mut self) {
        if self.reader.as_ref().is_some_and(IngestHandle::is_finished) {
            if let Some(handle) = self.reader.take() {
                handle.join();
            }
            self.state.connected_port = None;
        }
    }

    /// Append one attendance record and refresh the views.
    pub(crate) fn record_attendance(
        &mut self,
        identifier: &Identifier,
        name: &str,
    ) -> AppResult<AttendanceRecord> {
        let record = self.store.append_attendance(identifier, name)?;
        self.notify(Notification::AttendanceLogged(record.clone()));
        self.refresh_views();
        Ok(record)
    }

    fn refresh_views(&mut self) {
        if let Err(e) = self.reload() {
            warn!(error = %e, "Failed to refresh views");
            self.notify(Notification::Error(e.to_string()));
        }
    }

    fn connect(&mut self, port: &str) -> AppResult<()> {
        self.reap_reader();
        if let Some(handle) = &self.reader {
            return Err(AttendanceError::AlreadyConnected(handle.port().to_string()));
        }
        if port.is_empty() {
            return Err(AttendanceError::Validation("Select a serial port first".into()));
        }

        let config = WorkerConfig {
            port: port.to_string(),
            baud_rate: self.serial.baud_rate,
            read_timeout: self.serial.read_timeout(),
        };
        let handle = ingest::spawn(
            self.connector.clone(),
            config,
            self.scan_tx.clone(),
            self.error_tx.clone(),
        )?;
        info!(port, "Serial reader spawned");
        self.reader = Some(handle);
        self.state.connected_port = Some(port.to_string());
        self.notify(Notification::Info(format!("Connected to {}", port)));
        Ok(())
    }

    fn detected(&self) -> AppResult<Identifier> {
        self.state
            .detected
            .clone()
            .ok_or_else(|| AttendanceError::Validation("No tag detected yet".into()))
    }

    fn select_profile(&mut self, identifier: &Identifier) -> AppResult<()> {
        let profile = self.find_profile(identifier).cloned().ok_or_else(|| {
            AttendanceError::Validation(format!("No profile with identifier {}", identifier))
        })?;
        self.state.form = RegistrationForm {
            identifier: profile.identifier.to_string(),
            name: profile.name,
            age: profile.age.unwrap_or_default(),
        };
        self.state.selected = Some(profile.identifier);
        Ok(())
    }

    fn save_form(&mut self) -> AppResult<()> {
        let identifier = normalize(&self.state.form.identifier);
        let name = self.state.form.name.trim().to_string();
        let age = Some(self.state.form.age.trim())
            .filter(|age| !age.is_empty())
            .map(str::to_string);
        if identifier.is_empty() || name.is_empty() {
            return Err(AttendanceError::Validation(
                "Identifier and name are required".into(),
            ));
        }

        let mut profiles = self.state.profiles.clone();
        let updated = match profiles.iter_mut().find(|p| p.identifier == identifier) {
            Some(existing) => {
                existing.name = name;
                existing.age = age;
                true
            }
            None => {
                profiles.push(Profile::new(identifier.clone(), name, age));
                false
            }
        };
        self.store.save_profiles(&profiles)?;

        self.state.profiles = profiles;
        self.state.form.identifier = identifier.to_string();
        self.notify(Notification::Info(if updated {
            format!("Profile {} updated", identifier)
        } else {
            format!("Profile {} added", identifier)
        }));
        self.refresh_views();
        Ok(())
    }

    fn delete_profile(&mut self, identifier: &Identifier) -> AppResult<()> {
        if self.find_profile(identifier).is_none() {
            return Err(AttendanceError::Validation(format!(
                "No profile with identifier {}",
                identifier
            )));
        }
        let profiles: Vec<Profile> = self
            .state
            .profiles
            .iter()
            .filter(|p| &p.identifier != identifier)
            .cloned()
            .collect();
        self.store.save_profiles(&profiles)?;

        self.state.profiles = profiles;
        if self.state.selected.as_ref() == Some(identifier) {
            self.state.selected = None;
        }
        self.notify(Notification::Info(format!("Profile {} deleted", identifier)));
        self.refresh_views();
        Ok(())
    }

    fn log_detected(&mut self) -> AppResult<()> {
        let identifier = self.detected()?;
        let Some(name) = self.find_profile(&identifier).map(|p| p.name.clone()) else {
            self.stage_for_registration(&identifier);
            return Err(AttendanceError::Validation(format!(
                "Tag {} is not registered; register it in the form first",
                identifier
            )));
        };
        self.record_attendance(&identifier, &name)?;
        Ok(())
    }

    fn log_form(&mut self) -> AppResult<()> {
        let identifier = normalize(&self.state.form.identifier);
        if identifier.is_empty() {
            return Err(AttendanceError::Validation("The form has no identifier".into()));
        }
        if self.find_profile(&identifier).is_none() {
            if self.state.form.name.trim().is_empty() {
                return Err(AttendanceError::Validation(
                    "Fill in a name and save the profile first".into(),
                ));
            }
            self.save_form()?;
        }
        let name = self
            .find_profile(&identifier)
            .map(|p| p.name.clone())
            .ok_or_else(|| AttendanceError::Validation(format!("Tag {} is not registered", identifier)))?;
        self.record_attendance(&identifier, &name)?;
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.shutdown();
        }
    }
}
