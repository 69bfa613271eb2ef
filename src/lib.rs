//! # RFID Attendance Core Library
//!
//! This crate reads RFID tag identifiers from a microcontroller over a serial
//! link, matches them against a flat-file list of registered people, and
//! appends timestamped attendance records to a CSV log. It also carries the
//! single-byte command set of the companion LED panel sketch.
//!
//! ## Data flow
//!
//! ```text
//! device ──serial──▶ ingest (reader thread) ──hand-off queue──▶ coordinator (polling tick)
//!                                                                   │
//!                                                                   ▼
//!                                                        app state ──▶ store (CSV files)
//! ```
//!
//! ## Crate Structure
//!
//! - **`adapters`**: serial link traits, the `serialport`-backed connector and a scripted mock.
//! - **`app`**: the `App` struct owning all foreground state, and the `Command` set.
//! - **`config`**: layered settings (defaults, TOML file, environment) via `figment`.
//! - **`console`**: parser for commands typed at the interactive prompt.
//! - **`coordinator`**: drains the hand-off queue and decides log vs. stage for registration.
//! - **`error`**: the `AttendanceError` enum.
//! - **`identifier`**: tag identifier canonicalization.
//! - **`ingest`**: the background serial reader.
//! - **`led`**: LED panel commands.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`store`**: CSV persistence of profiles and the attendance log.
//! - **`view`**: text rendering of the application state.

pub mod adapters;
pub mod app;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod identifier;
pub mod ingest;
pub mod led;
pub mod logging;
pub mod store;
pub mod view;
