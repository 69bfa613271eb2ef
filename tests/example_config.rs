//! The shipped example configuration must stay in sync with the defaults.

use rfid_attendance::config::Settings;
use std::path::Path;

#[test]
fn example_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/rfid_attendance.example.toml");
    assert!(path.exists(), "missing {}", path.display());

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings, Settings::default());
    settings.validate().unwrap();
}
