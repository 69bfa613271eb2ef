//! Attendance coordinator.
//!
//! Runs on the foreground context at a fixed cadence. Each tick drains every
//! identifier currently in the hand-off queue, in the order the reader pushed
//! them, and turns each one into exactly one [`ScanOutcome`]:
//!
//! - known identifier: an attendance record is appended;
//! - unknown identifier: it is staged into the registration form and an
//!   `UnknownTag` notification is raised. Nothing is written to the log.
//!
//! Worker failures are drained in the same tick and surfaced as notifications.

use crate::{
    app::{App, Notification},
    identifier::Identifier,
    store::AttendanceRecord,
};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// What happened to one drained identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Registered; a record was appended
    Logged(AttendanceRecord),
    /// Not registered; placed in the registration form
    Staged(Identifier),
    /// Registered, but the log write failed
    Failed {
        /// The registered identifier that was scanned
        identifier: Identifier,
        /// Rendered store error
        error: String,
    },
}

/// Running totals since the coordinator was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Records appended
    pub logged: u64,
    /// Unknown identifiers staged for registration
    pub staged: u64,
    /// Registered identifiers whose log write failed
    pub failed: u64,
    /// Errors reported by the reader thread
    pub reader_errors: u64,
}

/// Turns drained identifiers into attendance records or registrations.
#[derive(Debug, Default)]
pub struct AttendanceCoordinator {
    stats: CoordinatorStats,
}

/// Fixed-rate ticker for the polling loop. Late ticks are skipped, not bunched.
pub fn poll_interval(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl AttendanceCoordinator {
    /// A coordinator with zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals since creation.
    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    /// Drain the hand-off queue and the worker error channel once.
    pub fn tick(&mut self, app: &mut App) -> Vec<ScanOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = app.next_scan() {
            outcomes.push(self.handle_identifier(app, event.identifier));
        }

        while let Some(error) = app.next_reader_error() {
            self.stats.reader_errors += 1;
            app.notify(Notification::Error(error.to_string()));
        }
        // The error is sent just before the thread exits; reap on a later tick if needed.
        app.reap_reader();

        if !outcomes.is_empty() {
            debug!(count = outcomes.len(), "Drained scans");
        }
        outcomes
    }

    /// Decide what one identifier means and act on it.
    pub fn handle_identifier(&mut self, app: &mut App, identifier: Identifier) -> ScanOutcome {
        app.set_detected(identifier.clone());

        let Some(name) = app.find_profile(&identifier).map(|p| p.name.clone()) else {
            warn!(identifier = %identifier, "Unknown tag staged for registration");
            app.stage_for_registration(&identifier);
            app.notify(Notification::UnknownTag(identifier.clone()));
            self.stats.staged += 1;
            return ScanOutcome::Staged(identifier);
        };

        match app.record_attendance(&identifier, &name) {
            Ok(record) => {
                self.stats.logged += 1;
                ScanOutcome::Logged(record)
            }
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Failed to record attendance");
                app.notify(Notification::Error(e.to_string()));
                self.stats.failed += 1;
                ScanOutcome::Failed {
                    identifier,
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockConnector, MockDevice};
    use crate::app::Command;
    use crate::config::Settings;
    use crate::identifier::normalize;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn app_in(dir: &TempDir) -> App {
        let mut settings = Settings::default();
        settings.storage.profiles_path = dir.path().join("users.csv");
        settings.storage.attendance_path = dir.path().join("attendance.csv");
        App::open(&settings, Arc::new(MockConnector::new(MockDevice::new()))).unwrap()
    }

    fn register(app: &mut App, identifier: &str, name: &str) {
        use crate::app::FormField;
        app.apply(Command::SetField { field: FormField::Identifier, value: identifier.into() }).unwrap();
        app.apply(Command::SetField { field: FormField::Name, value: name.into() }).unwrap();
        app.apply(Command::SaveForm).unwrap();
        app.apply(Command::NewForm).unwrap();
    }

    #[test]
    #[traced_test]
    fn unknown_identifier_is_staged_not_logged() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        let mut coordinator = AttendanceCoordinator::new();

        let outcome = coordinator.handle_identifier(&mut app, normalize("AB12CD"));
        assert_eq!(outcome, ScanOutcome::Staged(normalize("AB12CD")));
        assert_eq!(app.state().form.identifier, "AB12CD");
        assert!(app.state().profiles.is_empty());
        assert!(app.store().load_attendance(None).unwrap().is_empty());
        assert!(app
            .take_notifications()
            .contains(&Notification::UnknownTag(normalize("AB12CD"))));
        assert!(logs_contain("Unknown tag staged for registration"));
    }

    #[test]
    fn known_identifier_logs_with_profile_name() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        register(&mut app, "AB12CD", "Alice");
        let mut coordinator = AttendanceCoordinator::new();

        let ScanOutcome::Logged(record) = coordinator.handle_identifier(&mut app, normalize(" ab-12 cd \n"))
        else {
            panic!("expected a logged outcome");
        };
        assert_eq!(record.identifier, "AB12CD");
        assert_eq!(record.name, "Alice");
        assert_eq!(app.state().detected, Some(normalize("AB12CD")));
        assert_eq!(app.state().recent_attendance, vec![record]);
        assert_eq!(coordinator.stats().logged, 1);
    }

    #[test]
    fn log_keeps_name_at_time_of_scan() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        register(&mut app, "AB12CD", "Alice");
        let mut coordinator = AttendanceCoordinator::new();
        coordinator.handle_identifier(&mut app, normalize("AB12CD"));

        register(&mut app, "AB12CD", "Alicia");
        coordinator.handle_identifier(&mut app, normalize("AB12CD"));

        let names: Vec<_> = app
            .store()
            .load_attendance(None)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["Alice", "Alicia"]);
    }

    #[test]
    fn store_failure_is_reported_not_dropped() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);
        register(&mut app, "AB12CD", "Alice");
        // Replace the log file with a directory so appends fail.
        std::fs::remove_file(dir.path().join("attendance.csv")).unwrap();
        std::fs::create_dir(dir.path().join("attendance.csv")).unwrap();

        let mut coordinator = AttendanceCoordinator::new();
        let outcome = coordinator.handle_identifier(&mut app, normalize("AB12CD"));
        assert!(matches!(outcome, ScanOutcome::Failed { .. }));
        assert_eq!(coordinator.stats().failed, 1);
        assert!(app
            .take_notifications()
            .iter()
            .any(|n| matches!(n, Notification::Error(_))));
    }

    #[tokio::test]
    async fn poll_interval_waits_one_period_between_ticks() {
        let mut ticker = poll_interval(Duration::from_millis(10));
        let started = tokio::time::Instant::now();
        ticker.tick().await;
        ticker.tick().await;
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
