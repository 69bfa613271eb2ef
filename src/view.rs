//! Text projections of [`AppState`].
//!
//! Every function here is pure: the same state always renders the same text.

use crate::app::{AppState, Notification};
use crate::store::{AttendanceRecord, Profile, TIMESTAMP_FORMAT};

/// Render rows as left-aligned columns under an uppercase header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render_row = |cells: Vec<String>| -> String {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    let mut out = render_row(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        out.push('\n');
        out.push_str(&render_row(row.clone()));
    }
    out
}

/// Registered profiles as a table.
pub fn profiles(state: &AppState) -> String {
    profile_table(&state.profiles)
}

/// Profiles as an `IDENTIFIER NAME AGE` table.
pub fn profile_table(profiles: &[Profile]) -> String {
    let rows: Vec<Vec<String>> = profiles
        .iter()
        .map(|p| {
            vec![
                p.identifier.to_string(),
                p.name.clone(),
                p.age.clone().unwrap_or_default(),
            ]
        })
        .collect();
    table(&["identifier", "name", "age"], &rows)
}

/// Recent attendance as a table, oldest first.
pub fn attendance(state: &AppState) -> String {
    attendance_table(&state.recent_attendance)
}

/// Records as a `TIMESTAMP IDENTIFIER NAME` table.
pub fn attendance_table(records: &[AttendanceRecord]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                r.identifier.to_string(),
                r.name.clone(),
            ]
        })
        .collect();
    table(&["timestamp", "identifier", "name"], &rows)
}

/// The registration form fields.
pub fn form(state: &AppState) -> String {
    let form = &state.form;
    format!(
        "Identifier: {}\nName:       {}\nAge:        {}",
        form.identifier, form.name, form.age
    )
}

/// One port per line.
pub fn ports(state: &AppState) -> String {
    if state.ports.is_empty() {
        return "No serial ports found".to_string();
    }
    state.ports.join("\n")
}

/// Connection and counts summary.
pub fn status(state: &AppState) -> String {
    format!(
        "Port:     {}\nDetected: {}\nProfiles: {}\nShown:    {} attendance records",
        state.connected_port.as_deref().unwrap_or("(disconnected)"),
        state
            .detected
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string),
        state.profiles.len(),
        state.recent_attendance.len(),
    )
}

/// One-line rendering of a notification.
pub fn notification(notification: &Notification) -> String {
    match notification {
        Notification::Info(message) => message.clone(),
        Notification::AttendanceLogged(record) => format!(
            "[{}] {} ({}) checked in",
            record.timestamp.format(TIMESTAMP_FORMAT),
            record.name,
            record.identifier
        ),
        Notification::UnknownTag(identifier) => format!(
            "Unknown tag {}: staged in the form, use `register NAME [AGE]` to add it",
            identifier
        ),
        Notification::Error(message) => format!("Error: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::normalize;
    use chrono::NaiveDateTime;

    fn sample_state() -> AppState {
        AppState {
            profiles: vec![
                Profile::new(normalize("AB12CD"), "Alice", Some("31".into())),
                Profile::new(normalize("FF"), "Bartholomew", None),
            ],
            recent_attendance: vec![AttendanceRecord {
                identifier: normalize("AB12CD"),
                name: "Alice".into(),
                timestamp: NaiveDateTime::parse_from_str("2024-03-01 07:59:30", TIMESTAMP_FORMAT)
                    .unwrap(),
            }],
            ..AppState::default()
        }
    }

    #[test]
    fn profiles_table_aligns_columns() {
        let text = profiles(&sample_state());
        assert_eq!(
            text,
            "IDENTIFIER  NAME         AGE\n\
             AB12CD      Alice        31\n\
             FF          Bartholomew"
        );
    }

    #[test]
    fn attendance_table_uses_log_timestamp_format() {
        let text = attendance(&sample_state());
        assert!(text.lines().nth(1).unwrap().starts_with("2024-03-01 07:59:30  AB12CD"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let state = sample_state();
        assert_eq!(status(&state), status(&state));
        assert!(status(&state).contains("(disconnected)"));
        assert_eq!(ports(&state), "No serial ports found");
    }

    #[test]
    fn unknown_tag_notification_mentions_identifier() {
        let text = notification(&Notification::UnknownTag(normalize("ab12cd")));
        assert!(text.contains("AB12CD"));
    }
}
