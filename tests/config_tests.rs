//! Configuration files on disk

use std::io::Write;
use tourbook::config::{AppConfig, Environment, StorageConfig};

#[test]
fn test_load_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
server:
  host: 0.0.0.0
  port: 8000
environment: production
query:
  limit: 25
logging:
  filter: tourbook=debug
"#
    )
    .unwrap();

    let config = AppConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.server.address(), "0.0.0.0:8000");
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.query.limit, 25);
    assert_eq!(config.query.page, 1);
    assert_eq!(config.storage, StorageConfig::InMemory);
    assert_eq!(config.logging.filter, "tourbook=debug");
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn test_invalid_yaml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server: [not, a, map]").unwrap();

    assert!(AppConfig::from_yaml_file(file.path()).is_err());
}

#[test]
fn test_file_then_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  port: 8000\n").unwrap();

    let config = AppConfig::from_yaml_file(file.path())
        .unwrap()
        .with_overrides(|key| (key == "PORT").then(|| "9000".to_string()))
        .unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "127.0.0.1");
}
