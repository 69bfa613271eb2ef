//! CLI Entry Point for rfid_attendance
//!
//! Provides command-line interface for:
//! - Running the interactive attendance session (reader + coordinator + console)
//! - Managing registered profiles without a reader attached
//! - Viewing and exporting the attendance log
//! - Driving the LED panel sketch
//!
//! # Usage
//!
//! Start a session on a port:
//! ```bash
//! rfid_attendance run --port /dev/ttyACM0
//! ```
//!
//! Register someone ahead of time:
//! ```bash
//! rfid_attendance users add AB12CD "Alice" --age 31
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rfid_attendance::adapters::{Connector, SystemConnector};
use rfid_attendance::app::{App, Command, FormField, Notification};
use rfid_attendance::config::{Settings, DEFAULT_CONFIG_FILE};
use rfid_attendance::console::{self, ConsoleInput, Screen};
use rfid_attendance::coordinator::{self, AttendanceCoordinator};
use rfid_attendance::led::{LedCommand, LedPanel};
use rfid_attendance::store::RecordStore;
use rfid_attendance::{logging, view};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rfid_attendance")]
#[command(about = "Serial RFID attendance recorder", long_about = None)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Read tags and record attendance until `quit` or Ctrl-C
    Run {
        /// Serial port; defaults to the configured port, then the first one found
        #[arg(long)]
        port: Option<String>,
    },

    /// Manage registered profiles
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show the tail of the attendance log
    Logs {
        /// Number of records (0 for all)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Copy the attendance log to another file
    Export { path: PathBuf },

    /// Send commands to the LED panel sketch
    Led {
        /// Serial port; defaults to the configured port
        #[arg(long)]
        port: Option<String>,

        #[arg(value_enum, required = true)]
        commands: Vec<LedCommand>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    List,
    /// Add a profile, or update the one with the same identifier
    Add {
        identifier: String,
        name: String,
        #[arg(long)]
        age: Option<String>,
    },
    Remove { identifier: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings as TOML
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        settings.application.log_level = level;
    }
    settings.validate()?;
    logging::init_from_settings(&settings).map_err(|e| anyhow!(e))?;

    let connector: Arc<dyn Connector> = Arc::new(SystemConnector);

    match cli.command {
        Commands::Ports => list_ports(connector.as_ref()),
        Commands::Run { port } => run_session(&settings, connector, port).await,
        Commands::Users { action } => manage_users(&settings, connector, action),
        Commands::Logs { limit } => show_logs(&settings, limit),
        Commands::Export { path } => export_log(&settings, path),
        Commands::Led { port, commands } => drive_leds(&settings, connector.as_ref(), port, &commands),
        Commands::Config { action: ConfigAction::Show } => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

fn list_ports(connector: &dyn Connector) -> Result<()> {
    let ports = connector.available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

async fn run_session(settings: &Settings, connector: Arc<dyn Connector>, port: Option<String>) -> Result<()> {
    let mut app = App::open(settings, connector)?;
    if let Err(e) = app.apply(Command::RefreshPorts) {
        warn!(error = %e, "Port enumeration failed");
    }

    let port = port
        .or_else(|| settings.serial.default_port.clone())
        .or_else(|| app.state().ports.first().cloned());
    match &port {
        Some(port) => {
            if let Err(e) = app.apply(Command::Connect { port: port.clone() }) {
                println!("Error: {}", e);
            }
        }
        None => println!("No serial port available; use `connect PORT` once one is attached"),
    }
    print_notifications(&mut app);
    println!("Type `help` for commands.");

    let mut coordinator = AttendanceCoordinator::new();
    let mut ticker = coordinator::poll_interval(settings.coordinator.poll_interval());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                coordinator.tick(&mut app);
                print_notifications(&mut app);
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        // Commands may join the reader thread or touch the CSV files.
                        let quit = tokio::task::block_in_place(|| handle_line(&mut app, &line, port.as_deref()));
                        if quit {
                            break;
                        }
                    }
                    None => {
                        info!("Console input closed; reading until interrupted");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    tokio::task::block_in_place(|| app.disconnect());
    // Scans queued before the reader stopped still count.
    coordinator.tick(&mut app);
    print_notifications(&mut app);

    let stats = coordinator.stats();
    info!(
        logged = stats.logged,
        staged = stats.staged,
        failed = stats.failed,
        reader_errors = stats.reader_errors,
        "Session finished"
    );
    Ok(())
}

/// Returns true when the user asked to quit.
fn handle_line(app: &mut App, line: &str, default_port: Option<&str>) -> bool {
    match console::parse(line, default_port) {
        Ok(ConsoleInput::Empty) => {}
        Ok(ConsoleInput::Quit) => return true,
        Ok(ConsoleInput::Help) => println!("{}", console::HELP),
        Ok(ConsoleInput::Show(screen)) => {
            let state = app.state();
            let text = match screen {
                Screen::Profiles => view::profiles(state),
                Screen::Attendance => view::attendance(state),
                Screen::Form => view::form(state),
                Screen::Status => view::status(state),
            };
            println!("{}", text);
        }
        Ok(ConsoleInput::Commands(commands)) => {
            for command in commands {
                let lists_ports = command == Command::RefreshPorts;
                if let Err(e) = app.apply(command) {
                    println!("Error: {}", e);
                    break;
                }
                if lists_ports {
                    println!("{}", view::ports(app.state()));
                }
            }
        }
        Err(message) => println!("{}", message),
    }
    print_notifications(app);
    false
}

fn print_notifications(app: &mut App) {
    for notification in app.take_notifications() {
        if matches!(notification, Notification::UnknownTag(_)) {
            print!("\x07");
        }
        println!("{}", view::notification(&notification));
    }
}

fn manage_users(settings: &Settings, connector: Arc<dyn Connector>, action: UserAction) -> Result<()> {
    let mut app = App::open(settings, connector)?;
    match action {
        UserAction::List => println!("{}", view::profiles(app.state())),
        UserAction::Add { identifier, name, age } => {
            let fields = [
                (FormField::Identifier, identifier),
                (FormField::Name, name),
                (FormField::Age, age.unwrap_or_default()),
            ];
            for (field, value) in fields {
                app.apply(Command::SetField { field, value })?;
            }
            app.apply(Command::SaveForm)?;
        }
        UserAction::Remove { identifier } => app.apply(Command::DeleteProfile(identifier))?,
    }
    print_notifications(&mut app);
    Ok(())
}

fn show_logs(settings: &Settings, limit: Option<usize>) -> Result<()> {
    let store = RecordStore::from_settings(&settings.storage);
    store.ensure_files()?;
    let limit = limit.unwrap_or(settings.coordinator.log_view_limit);
    let records = store.load_attendance(Some(limit))?;
    println!("{}", view::attendance_table(&records));
    Ok(())
}

fn export_log(settings: &Settings, path: PathBuf) -> Result<()> {
    let store = RecordStore::from_settings(&settings.storage);
    store.ensure_files()?;
    let bytes = store.export_attendance(&path)?;
    println!("Exported {} bytes to {}", bytes, path.display());
    Ok(())
}

fn drive_leds(
    settings: &Settings,
    connector: &dyn Connector,
    port: Option<String>,
    commands: &[LedCommand],
) -> Result<()> {
    let port = port
        .or_else(|| settings.serial.default_port.clone())
        .ok_or_else(|| anyhow!("No port given; pass --port or set serial.default_port"))?;
    let link = connector.open(&port, settings.serial.baud_rate, settings.serial.read_timeout())?;
    let mut panel = LedPanel::new(link);
    panel.send_all(commands)?;
    panel.close()?;
    info!(port = %port, count = commands.len(), "LED commands sent");
    Ok(())
}
