#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use excs_config::{Config, ConfigError, Profile, load_config_from, profile_to_station_config, save_config_to};

const LAYOUT: &str = r#"
default_profile = "layout"

[defaults]
output = "json"
timeout = 15

[profiles.layout]
host = "192.168.1.50"

[profiles.club]
host = "club-cs.local"
port = 2561
response_timeout = 5
heartbeat_interval = 30
heartbeat_timeout = 90
"#;

#[test]
fn loads_profiles_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, LAYOUT).unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.default_profile.as_deref(), Some("layout"));
    assert_eq!(config.defaults.output, "json");
    assert_eq!(config.profiles.len(), 2);

    let (name, layout) = config.profile(None).unwrap();
    assert_eq!(name, "layout");
    let station = profile_to_station_config(layout, &config.defaults).unwrap();
    assert_eq!(station.host, "192.168.1.50");
    assert_eq!(station.port, 2560);
    assert_eq!(station.response_timeout, Duration::from_secs(15));

    let (_, club) = config.profile(Some("club")).unwrap();
    let station = profile_to_station_config(club, &config.defaults).unwrap();
    assert_eq!(station.port, 2561);
    assert_eq!(station.response_timeout, Duration::from_secs(5));
    assert_eq!(station.heartbeat_timeout, Duration::from_secs(90));
}

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
    assert!(matches!(config.profile(None), Err(ConfigError::UnknownProfile { .. })));
}

#[test]
fn malformed_file_is_a_loading_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.layout]\nport = \"not a port\"\n").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)), "{err:?}");
}

#[test]
fn saved_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.profiles.insert(
        "default".into(),
        Profile {
            response_timeout: Some(8),
            ..Profile::new("10.0.0.7")
        },
    );
    save_config_to(&config, &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("host = \"10.0.0.7\""), "{written}");
    assert!(!written.contains("heartbeat_interval"), "{written}");
    assert_eq!(load_config_from(&path).unwrap(), config);
}
