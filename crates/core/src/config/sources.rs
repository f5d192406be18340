use crate::config::ConfigError;
use crate::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Where a resolved connection value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Default value used
    Default(String),
    /// Value loaded from the configuration file
    File(String),
}

impl ConfigSource {
    /// Check if source is environment variable
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    /// Check if source is default value
    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    /// Get source description
    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVar(var) => format!("Environment variable: {}", var),
            ConfigSource::Default(value) => format!("Default value: {}", value),
            ConfigSource::File(path) => format!("Configuration file: {}", path),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Names of the environment variables holding connection credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvKeys {
    pub user: String,
    pub password: String,
    pub port: String,
    pub host: String,
    pub database: String,
}

impl Default for EnvKeys {
    fn default() -> Self {
        Self {
            user: "DB_USER".to_string(),
            password: "DB_PASSWORD".to_string(),
            port: "DB_PORT".to_string(),
            host: "DB_HOST".to_string(),
            database: "DB_NAME".to_string(),
        }
    }
}

/// Fully resolved parameters for opening a database connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub dialect: Dialect,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Database file, only meaningful for SQLite
    pub sqlite_path: Option<PathBuf>,
    pub sources: HashMap<String, ConfigSource>,
}

impl ConnectionSettings {
    /// Settings for a SQLite database file
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut sources = HashMap::new();
        sources.insert(
            "sqlite_path".to_string(),
            ConfigSource::File(path.display().to_string()),
        );

        Self {
            dialect: Dialect::Sqlite,
            host: String::new(),
            port: 0,
            user: String::new(),
            password: None,
            database: None,
            sqlite_path: Some(path),
            sources,
        }
    }

    /// Resolve server connection settings through `lookup`, which maps an
    /// environment variable name to its value.
    pub fn resolve<F>(dialect: Dialect, keys: &EnvKeys, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sources = HashMap::new();
        let mut read = |field: &str, key: &str| -> Option<String> {
            let value = lookup(key).filter(|v| !v.trim().is_empty());
            if value.is_some() {
                sources.insert(field.to_string(), ConfigSource::EnvVar(key.to_string()));
            }
            value
        };

        let host = read("host", &keys.host);
        let port = read("port", &keys.port);
        let user = read("user", &keys.user);
        let password = read("password", &keys.password);
        let database = read("database", &keys.database);

        let port = match port {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| {
                    ConfigError::invalid_value(keys.port.clone(), raw.clone(), "port between 1 and 65535")
                })?,
            None => {
                let port = dialect.default_port().unwrap_or_default();
                sources.insert("port".to_string(), ConfigSource::Default(port.to_string()));
                port
            }
        };

        let host = host.unwrap_or_else(|| {
            sources.insert("host".to_string(), ConfigSource::Default("localhost".to_string()));
            "localhost".to_string()
        });

        let user = user.unwrap_or_else(|| {
            let user = dialect.default_user().unwrap_or_default().to_string();
            sources.insert("user".to_string(), ConfigSource::Default(user.clone()));
            user
        });

        Ok(Self {
            dialect,
            host,
            port,
            user,
            password,
            database,
            sqlite_path: None,
            sources,
        })
    }

    /// Resolve server connection settings from the process environment
    pub fn from_env(dialect: Dialect, keys: &EnvKeys) -> Result<Self, ConfigError> {
        Self::resolve(dialect, keys, |key| std::env::var(key).ok())
    }

    /// Human readable target, never including the password
    pub fn describe(&self) -> String {
        match self.dialect {
            Dialect::Sqlite => format!(
                "sqlite://{}",
                self.sqlite_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            _ => format!(
                "{}://{}@{}:{}/{}",
                self.dialect,
                self.user,
                self.host,
                self.port,
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Load a `.env` file into the process environment if one exists
pub fn load_env_file() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {
            tracing::debug!("No .env file found, using the process environment")
        }
        Err(e) => tracing::warn!("Environment not loaded ({}). Using default configurations", e),
    }
}
