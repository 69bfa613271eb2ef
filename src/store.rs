//! CSV-backed record store.
//!
//! Two flat files live side by side:
//!
//! - the **profile file** (`identifier,name,age`), rewritten in full on every save;
//! - the **attendance log** (`identifier,name,timestamp`), append-only.
//!
//! The store holds no state beyond the two paths. Callers own the in-memory
//! profile list and do read-modify-write; the store does not serialize
//! concurrent writers, and edits made to the files by other programs while the
//! application runs are last-write-wins.

use crate::{
    config::StorageSettings,
    error::{AppResult, AttendanceError},
    identifier::Identifier,
};
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Header row of the profile file.
pub const PROFILE_HEADER: [&str; 3] = ["identifier", "name", "age"];
/// Header row of the attendance log.
pub const ATTENDANCE_HEADER: [&str; 3] = ["identifier", "name", "timestamp"];
/// Local wall-clock format used in the attendance log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A registered person, keyed by tag identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique key
    pub identifier: Identifier,
    /// Display name, never empty
    pub name: String,
    /// Free text; never validated.
    #[serde(default)]
    pub age: Option<String>,
}

impl Profile {
    /// Build a profile from its parts.
    pub fn new(identifier: Identifier, name: impl Into<String>, age: Option<String>) -> Self {
        Self {
            identifier,
            name: name.into(),
            age,
        }
    }
}

/// One line of the attendance log.
///
/// `name` is copied from the profile when the record is written and is never
/// updated afterwards, even if the profile is renamed or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Identifier that was scanned
    pub identifier: Identifier,
    /// Profile name at the time of the scan
    pub name: String,
    /// Local wall-clock time, whole seconds
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Paths to the two backing files.
#[derive(Debug, Clone)]
pub struct RecordStore {
    profiles_path: PathBuf,
    attendance_path: PathBuf,
}

impl RecordStore {
    /// Store over the two given files. Nothing is touched until a method is called.
    pub fn new(profiles_path: impl Into<PathBuf>, attendance_path: impl Into<PathBuf>) -> Self {
        Self {
            profiles_path: profiles_path.into(),
            attendance_path: attendance_path.into(),
        }
    }

    /// Store over the configured files.
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(&settings.profiles_path, &settings.attendance_path)
    }

    /// Path of the profile file.
    pub fn profiles_path(&self) -> &Path {
        &self.profiles_path
    }

    /// Path of the attendance log.
    pub fn attendance_path(&self) -> &Path {
        &self.attendance_path
    }

    /// Create any missing backing file with its header row. Safe to call repeatedly.
    pub fn ensure_files(&self) -> AppResult<()> {
        create_with_header(&self.profiles_path, &PROFILE_HEADER)?;
        create_with_header(&self.attendance_path, &ATTENDANCE_HEADER)?;
        Ok(())
    }

    /// Read every profile. Identifiers are re-canonicalized; rows whose
    /// identifier is empty after canonicalization are skipped, and only the
    /// first row for each canonical identifier is kept.
    pub fn load_profiles(&self) -> AppResult<Vec<Profile>> {
        let path = &self.profiles_path;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| AttendanceError::store(path, e))?;

        let mut profiles = Vec::new();
        let mut seen = HashSet::new();
        for (row, result) in reader.deserialize::<Profile>().enumerate() {
            match result {
                Ok(profile) if profile.identifier.is_empty() => {
                    warn!(file = %path.display(), row = row + 2, "Skipping profile without identifier");
                }
                Ok(profile) if !seen.insert(profile.identifier.clone()) => {
                    warn!(
                        file = %path.display(),
                        row = row + 2,
                        identifier = %profile.identifier,
                        name = %profile.name,
                        "Skipping duplicate profile; the first row for this identifier wins"
                    );
                }
                Ok(profile) => profiles.push(profile),
                Err(e) if e.is_io_error() => return Err(AttendanceError::store(path, e)),
                Err(e) => {
                    warn!(file = %path.display(), row = row + 2, error = %e, "Skipping malformed profile row");
                }
            }
        }
        debug!(count = profiles.len(), "Loaded profiles");
        Ok(profiles)
    }

    /// Replace the profile file with `profiles`.
    ///
    /// The rows are written to a sibling temporary file which is then renamed
    /// over the target, so a failed save leaves the previous file in place.
    pub fn save_profiles(&self, profiles: &[Profile]) -> AppResult<()> {
        let path = &self.profiles_path;
        let tmp = temp_sibling(path);

        let result = (|| -> Result<(), Box<dyn std::error::Error>> {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)?;
            writer.write_record(PROFILE_HEADER)?;
            for profile in profiles {
                writer.serialize(profile)?;
            }
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp, path)?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(AttendanceError::store(path, e));
        }
        info!(count = profiles.len(), file = %path.display(), "Saved profiles");
        Ok(())
    }

    /// Append one attendance record stamped with the current local time.
    ///
    /// Repeated scans are never deduplicated; every call appends.
    pub fn append_attendance(&self, identifier: &Identifier, name: &str) -> AppResult<AttendanceRecord> {
        let record = AttendanceRecord {
            identifier: identifier.clone(),
            name: name.to_string(),
            timestamp: Local::now().naive_local().trunc_subsecs(0),
        };
        self.append_record(&record)?;
        Ok(record)
    }

    fn append_record(&self, record: &AttendanceRecord) -> AppResult<()> {
        let path = &self.attendance_path;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AttendanceError::store(path, e))?;
        let needs_header = file
            .metadata()
            .map_err(|e| AttendanceError::store(path, e))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer
                .write_record(ATTENDANCE_HEADER)
                .map_err(|e| AttendanceError::store(path, e))?;
        }
        writer
            .serialize(record)
            .map_err(|e| AttendanceError::store(path, e))?;
        writer.flush().map_err(|e| AttendanceError::store(path, e))?;

        info!(
            identifier = %record.identifier,
            name = %record.name,
            timestamp = %record.timestamp.format(TIMESTAMP_FORMAT),
            "Attendance recorded"
        );
        Ok(())
    }

    /// Read the attendance log in file order, keeping only the last `limit`
    /// records when a non-zero limit is given.
    pub fn load_attendance(&self, limit: Option<usize>) -> AppResult<Vec<AttendanceRecord>> {
        let path = &self.attendance_path;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| AttendanceError::store(path, e))?;

        let mut records = Vec::new();
        for (row, result) in reader.deserialize::<AttendanceRecord>().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(e) if e.is_io_error() => return Err(AttendanceError::store(path, e)),
                Err(e) => {
                    warn!(file = %path.display(), row = row + 2, error = %e, "Skipping malformed attendance row");
                }
            }
        }

        if let Some(limit) = limit.filter(|&n| n > 0) {
            let skip = records.len().saturating_sub(limit);
            records.drain(..skip);
        }
        Ok(records)
    }

    /// Copy the attendance log byte-for-byte to `dest`. Returns the byte count.
    pub fn export_attendance(&self, dest: &Path) -> AppResult<u64> {
        let bytes = fs::copy(&self.attendance_path, dest).map_err(|e| AttendanceError::store(dest, e))?;
        info!(dest = %dest.display(), bytes, "Attendance log exported");
        Ok(bytes)
    }
}

fn create_with_header(path: &Path, header: &[&str]) -> AppResult<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AttendanceError::store(parent, e))?;
    }
    let file = File::create(path).map_err(|e| AttendanceError::store(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(header)
        .map_err(|e| AttendanceError::store(path, e))?;
    writer.flush().map_err(|e| AttendanceError::store(path, e))?;
    info!(file = %path.display(), "Created data file");
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::normalize;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn store_in(dir: &TempDir) -> RecordStore {
        RecordStore::new(dir.path().join("users.csv"), dir.path().join("attendance.csv"))
    }

    #[test]
    fn ensure_files_writes_headers_once() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_files().unwrap();
        store
            .save_profiles(&[Profile::new(normalize("AB12CD"), "Alice", None)])
            .unwrap();
        store.ensure_files().unwrap();

        let users = fs::read_to_string(store.profiles_path()).unwrap();
        assert_eq!(users, "identifier,name,age\nAB12CD,Alice,\n");
        let log = fs::read_to_string(store.attendance_path()).unwrap();
        assert_eq!(log, "identifier,name,timestamp\n");
    }

    #[test]
    fn ensure_files_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(
            dir.path().join("data/users.csv"),
            dir.path().join("data/logs/attendance.csv"),
        );
        store.ensure_files().unwrap();
        assert!(store.profiles_path().exists());
        assert!(store.attendance_path().exists());
    }

    #[test]
    fn profiles_round_trip_in_any_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_files().unwrap();

        let profiles = vec![
            Profile::new(normalize("AB12CD"), "Alice", Some("31".into())),
            Profile::new(normalize("0011FF"), "Bob, Jr.", None),
            Profile::new(normalize("99"), "Chidi \"The Ethicist\"", Some("thirty".into())),
        ];
        store.save_profiles(&profiles).unwrap();

        let mut loaded = store.load_profiles().unwrap();
        let mut expected = profiles.clone();
        loaded.sort_by(|a, b| a.identifier.as_str().cmp(b.identifier.as_str()));
        expected.sort_by(|a, b| a.identifier.as_str().cmp(b.identifier.as_str()));
        assert_eq!(loaded, expected);
        assert!(!temp_sibling(store.profiles_path()).exists());
    }

    #[test]
    fn load_canonicalizes_hand_edited_identifiers() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.profiles_path(),
            "identifier,name,age\n ab:12:cd ,Alice,20\n--,Nobody,\n",
        )
        .unwrap();

        let loaded = store.load_profiles().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].identifier, "AB12CD");
        assert_eq!(loaded[0].age.as_deref(), Some("20"));
    }

    #[test]
    #[traced_test]
    fn duplicate_identifiers_keep_first_row() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.profiles_path(),
            "identifier,name,age\nab12cd,Alice,\nFF00,Bob,\nAB-12-CD,Old Alice,40\n",
        )
        .unwrap();

        let loaded = store.load_profiles().unwrap();
        let names: Vec<_> = loaded.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert_eq!(loaded[0].identifier, "AB12CD");
        assert!(logs_contain("Skipping duplicate profile"));
    }

    #[test]
    fn append_writes_header_into_empty_log() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.attendance_path(), "").unwrap();

        let record = store.append_attendance(&normalize("AB12CD"), "Alice").unwrap();
        let text = fs::read_to_string(store.attendance_path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("identifier,name,timestamp"));
        assert_eq!(
            lines.next().map(str::to_string),
            Some(format!("AB12CD,Alice,{}", record.timestamp.format(TIMESTAMP_FORMAT)))
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn repeated_scans_all_append_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_files().unwrap();

        let id = normalize("AB12CD");
        for _ in 0..5 {
            store.append_attendance(&id, "Alice").unwrap();
        }
        let records = store.load_attendance(None).unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn load_attendance_limit_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.attendance_path(),
            "identifier,name,timestamp\n\
             A1,Ann,2024-01-01 08:00:00\n\
             B2,Ben,2024-01-01 08:05:00\n\
             C3,Cal,2024-01-01 08:10:00\n",
        )
        .unwrap();

        let last_two = store.load_attendance(Some(2)).unwrap();
        let names: Vec<_> = last_two.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Ben", "Cal"]);

        assert_eq!(store.load_attendance(Some(10)).unwrap().len(), 3);
        assert_eq!(store.load_attendance(Some(0)).unwrap().len(), 3);
    }

    #[test]
    fn malformed_attendance_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.attendance_path(),
            "identifier,name,timestamp\nA1,Ann,yesterday\nB2,Ben,2024-01-01 08:05:00\n",
        )
        .unwrap();
        let records = store.load_attendance(None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "B2");
    }

    #[test]
    fn failed_save_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_files().unwrap();
        store
            .save_profiles(&[Profile::new(normalize("AB12CD"), "Alice", None)])
            .unwrap();

        // A directory where the temp file should go makes the write fail.
        fs::create_dir(temp_sibling(store.profiles_path())).unwrap();
        let err = store
            .save_profiles(&[Profile::new(normalize("FFFF"), "Mallory", None)])
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Store(_)));

        let loaded = store.load_profiles().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Alice");
    }

    #[test]
    fn missing_files_surface_as_store_errors() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(matches!(store.load_profiles(), Err(AttendanceError::Store(_))));
        assert!(matches!(store.load_attendance(None), Err(AttendanceError::Store(_))));
    }

    #[test]
    fn export_copies_log_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_files().unwrap();
        store.append_attendance(&normalize("AB12CD"), "Alice").unwrap();

        let dest = dir.path().join("export.csv");
        let bytes = store.export_attendance(&dest).unwrap();
        let original = fs::read(store.attendance_path()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), original);
        assert_eq!(bytes, original.len() as u64);
    }
}
