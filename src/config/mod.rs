//! Configuration loading and management
//!
//! Configuration comes from an optional YAML file (path in
//! `TOURBOOK_CONFIG`), then a handful of environment variables override it:
//!
//! | Variable       | Effect                                   |
//! |----------------|------------------------------------------|
//! | `PORT`         | `server.port`                            |
//! | `APP_ENV`      | `environment` (`development`/`production`) |
//! | `DATABASE_URL` | switches storage to MongoDB at that URI  |
//! | `RUST_LOG`     | read by the binary's log filter          |

use crate::core::error::ConfigError;
use crate::core::query::QueryDefaults;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "TOURBOOK_CONFIG";

/// Controls how much error detail reaches clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidValue {
                key: "environment".to_string(),
                message: format!("unknown environment '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port`, ready for a listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which storage engine backs the collections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    #[default]
    InMemory,
    Mongodb {
        uri: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_database() -> String {
    "tourbook".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tourbook=info,tower_http=info".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub environment: Environment,
    pub query: QueryDefaults,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validated()
    }

    /// File named by `TOURBOOK_CONFIG` (or defaults), then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_yaml_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("'{}' is not a valid port", port),
            })?;
        }
        if let Some(env) = lookup("APP_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(uri) = lookup("DATABASE_URL") {
            let database = match self.storage {
                StorageConfig::Mongodb { database, .. } => database,
                StorageConfig::InMemory => default_database(),
            };
            self.storage = StorageConfig::Mongodb { uri, database };
        }
        self.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.query.limit == 0 || self.query.page == 0 {
            return Err(ConfigError::InvalidValue {
                key: "query".to_string(),
                message: "default page and limit must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.address(), "127.0.0.1:3000");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.query.limit, 100);
        assert_eq!(config.storage, StorageConfig::InMemory);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str(
            r#"
environment: production
query:
  limit: 20
storage:
  backend: mongodb
  uri: mongodb://localhost:27017
"#,
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.query.limit, 20);
        assert_eq!(config.query.sort, "-createdAt");
        assert_eq!(
            config.storage,
            StorageConfig::Mongodb {
                uri: "mongodb://localhost:27017".into(),
                database: "tourbook".into()
            }
        );
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8080"),
            ("APP_ENV", "production"),
            ("DATABASE_URL", "mongodb://db:27017"),
        ]);
        let config = AppConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.environment, Environment::Production);
        assert!(matches!(
            config.storage,
            StorageConfig::Mongodb { ref uri, .. } if uri == "mongodb://db:27017"
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AppConfig::default()
            .with_overrides(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));

        assert!(AppConfig::from_yaml_str("query:\n  limit: 0\n").is_err());
        assert!("staging".parse::<Environment>().is_err());
    }
}
