//! Config save/load roundtrip integration tests.

use switchboard_core::config::{BindMode, Config};
use switchboard_integration_tests::config;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("switchboard.json5");

    let config = config();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.server.port, config.server.port);
    assert_eq!(loaded.server.bind, config.server.bind);
    assert_eq!(loaded.session.linger_ms, 200);
    assert_eq!(loaded.agents.len(), 3);
    assert_eq!(loaded.release_options, config.release_options);
    loaded.validate().unwrap();
}

#[test]
fn test_config_json5_with_comments() {
    let config = Config::parse(
        r#"{
            // loopback unless told otherwise
            server: { bind: 'lan', port: 6060 },
            session: { idle_timeout_ms: 0 },
            queues: ['support',],
        }"#,
    )
    .unwrap();
    assert_eq!(config.server.bind, BindMode::Lan);
    assert_eq!(config.session.idle_timeout_ms, 0);
    assert_eq!(config.session.linger_ms, 5000);
    assert_eq!(config.release_options.len(), 3);
}

#[test]
fn test_validation_collects_errors() {
    let mut config = config();
    config.server.port = 0;
    config.agents.push(config.agents[0].clone());
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("port"));
    assert!(err.contains("more than once"));
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/switchboard.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    assert!(Config::parse("not valid json").is_err());
}
