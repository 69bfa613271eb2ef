//! Interactive console commands for `rfid_attendance run`.
//!
//! Each line typed at the prompt is parsed into a [`ConsoleInput`]; actions
//! map onto [`Command`]s, the rest select which view to print.

use crate::app::{Command, FormField};
use std::path::PathBuf;

/// A view the user asked to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Registered profiles
    Profiles,
    /// Recent attendance
    Attendance,
    /// Registration form
    Form,
    /// Connection summary
    Status,
}

/// What one console line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Apply in order; stop at the first error
    Commands(Vec<Command>),
    /// Print a view
    Show(Screen),
    /// Print the command list
    Help,
    /// Leave the session
    Quit,
    /// Blank line
    Empty,
}

/// Text printed for `help`.
pub const HELP: &str = "\
Commands:
  users | logs | form | status       show a view
  ports                              refresh and list serial ports
  connect [PORT]                     start reading from PORT
  disconnect                         stop reading
  new                                clear the form
  select ID                          load a profile into the form
  set id|name|age VALUE              edit a form field
  save                               add or update the profile in the form
  register NAME [AGE]                name the staged tag and save it
  delete ID                          delete a profile
  assign                             copy the detected tag into the form
  mark                               record attendance for the detected tag
  mark-form                          record attendance for the tag in the form
  export PATH                        copy the attendance log to PATH
  reload                             re-read the data files
  help | quit";

/// Parse one console line. `default_port` fills in a bare `connect`.
pub fn parse(line: &str, default_port: Option<&str>) -> Result<ConsoleInput, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let single = |command: Command| -> Result<ConsoleInput, String> {
        Ok(ConsoleInput::Commands(vec![command]))
    };
    let require = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("`{}` needs {}", word, what))
        } else {
            Ok(rest.to_string())
        }
    };

    match word.to_lowercase().as_str() {
        "" => Ok(ConsoleInput::Empty),
        "help" | "?" => Ok(ConsoleInput::Help),
        "quit" | "exit" => Ok(ConsoleInput::Quit),
        "users" | "profiles" => Ok(ConsoleInput::Show(Screen::Profiles)),
        "logs" | "attendance" => Ok(ConsoleInput::Show(Screen::Attendance)),
        "form" => Ok(ConsoleInput::Show(Screen::Form)),
        "status" => Ok(ConsoleInput::Show(Screen::Status)),
        "ports" => single(Command::RefreshPorts),
        "connect" => {
            let port = if rest.is_empty() {
                default_port
                    .map(str::to_string)
                    .ok_or_else(|| "`connect` needs a port name".to_string())?
            } else {
                rest.to_string()
            };
            single(Command::Connect { port })
        }
        "disconnect" => single(Command::Disconnect),
        "new" => single(Command::NewForm),
        "select" => single(Command::SelectProfile(require("an identifier")?)),
        "set" => {
            let (field, value) = rest
                .split_once(char::is_whitespace)
                .map(|(f, v)| (f, v.trim()))
                .unwrap_or((rest, ""));
            let field = match field.to_lowercase().as_str() {
                "id" | "identifier" | "uid" => FormField::Identifier,
                "name" => FormField::Name,
                "age" => FormField::Age,
                other => return Err(format!("Unknown form field `{}`", other)),
            };
            single(Command::SetField {
                field,
                value: value.to_string(),
            })
        }
        "save" => single(Command::SaveForm),
        "register" => {
            let args = require("a name")?;
            // A trailing number is the age; everything before it is the name.
            let (name, age) = match args.rsplit_once(char::is_whitespace) {
                Some((name, age)) if age.chars().all(|c| c.is_ascii_digit()) => {
                    (name.trim().to_string(), age.to_string())
                }
                _ => (args.clone(), String::new()),
            };
            Ok(ConsoleInput::Commands(vec![
                Command::SetField {
                    field: FormField::Name,
                    value: name,
                },
                Command::SetField {
                    field: FormField::Age,
                    value: age,
                },
                Command::SaveForm,
            ]))
        }
        "delete" | "remove" => single(Command::DeleteProfile(require("an identifier")?)),
        "assign" => single(Command::AssignDetected),
        "mark" => single(Command::LogDetected),
        "mark-form" => single(Command::LogForm),
        "export" => single(Command::Export {
            path: PathBuf::from(require("a destination path")?),
        }),
        "reload" => single(Command::Reload),
        other => Err(format!("Unknown command `{}`; type `help`", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(line: &str) -> Vec<Command> {
        match parse(line, Some("COM5")).unwrap() {
            ConsoleInput::Commands(commands) => commands,
            other => panic!("expected commands, got {:?}", other),
        }
    }

    #[test]
    fn views_and_control_words() {
        assert_eq!(parse("  ", None), Ok(ConsoleInput::Empty));
        assert_eq!(parse("USERS", None), Ok(ConsoleInput::Show(Screen::Profiles)));
        assert_eq!(parse("logs", None), Ok(ConsoleInput::Show(Screen::Attendance)));
        assert_eq!(parse("quit", None), Ok(ConsoleInput::Quit));
        assert!(parse("dance", None).is_err());
    }

    #[test]
    fn connect_uses_default_port() {
        assert_eq!(commands("connect"), [Command::Connect { port: "COM5".into() }]);
        assert_eq!(
            commands("connect /dev/ttyACM0"),
            [Command::Connect {
                port: "/dev/ttyACM0".into()
            }]
        );
        assert!(parse("connect", None).is_err());
    }

    #[test]
    fn set_field_keeps_spaces_in_value() {
        assert_eq!(
            commands("set name Mary Ann"),
            [Command::SetField {
                field: FormField::Name,
                value: "Mary Ann".into()
            }]
        );
        assert_eq!(
            commands("set age"),
            [Command::SetField {
                field: FormField::Age,
                value: String::new()
            }]
        );
        assert!(parse("set colour red", None).is_err());
    }

    #[test]
    fn register_splits_trailing_age() {
        let parsed = commands("register Mary Ann 42");
        assert_eq!(
            parsed[0],
            Command::SetField {
                field: FormField::Name,
                value: "Mary Ann".into()
            }
        );
        assert_eq!(
            parsed[1],
            Command::SetField {
                field: FormField::Age,
                value: "42".into()
            }
        );
        assert_eq!(parsed[2], Command::SaveForm);

        let parsed = commands("register Bob");
        assert_eq!(
            parsed[0],
            Command::SetField {
                field: FormField::Name,
                value: "Bob".into()
            }
        );
        assert!(parse("register", None).is_err());
    }

    #[test]
    fn arguments_are_required() {
        assert!(parse("delete", None).is_err());
        assert!(parse("select", None).is_err());
        assert!(parse("export", None).is_err());
        assert_eq!(commands("delete ab12cd"), [Command::DeleteProfile("ab12cd".into())]);
    }
}
