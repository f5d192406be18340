use crate::config::{ConfigError, ConnectionSettings, EnvKeys};
use crate::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "ez-migrate.json";
pub const DEFAULT_MIGRATIONS_PATH: &str = "./migrations";
pub const DEFAULT_SEEDS_PATH: &str = "./seeds";
pub const DEFAULT_SQLITE_PATH: &str = "./database.sqlite";
pub const DEFAULT_TRACKER_SQLITE_PATH: &str = "./migrations/tracker.db";

/// Where and how applied migrations are recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    pub dialect: Dialect,
    pub sqlite_path: PathBuf,
    pub env_keys: EnvKeys,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            sqlite_path: PathBuf::from(DEFAULT_TRACKER_SQLITE_PATH),
            env_keys: EnvKeys::default(),
        }
    }
}

/// The ez-migrate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateConfig {
    /// Dialect of the database migrations are applied to
    pub dialect: Dialect,
    pub migrations_path: PathBuf,
    pub seeds_path: PathBuf,
    /// Target database file when `dialect` is SQLite
    pub sqlite_path: PathBuf,
    pub env_keys: EnvKeys,
    pub tracker: TrackerConfig,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::MySql,
            migrations_path: PathBuf::from(DEFAULT_MIGRATIONS_PATH),
            seeds_path: PathBuf::from(DEFAULT_SEEDS_PATH),
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            env_keys: EnvKeys::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

// Shape of the file as written by users: every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialConfig {
    dialect: Option<String>,
    migrations_path: Option<PathBuf>,
    seeds_path: Option<PathBuf>,
    sqlite_path: Option<PathBuf>,
    env_keys: Option<PartialEnvKeys>,
    tracker: Option<PartialTracker>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialTracker {
    dialect: Option<String>,
    sqlite_path: Option<PathBuf>,
    env_keys: Option<PartialEnvKeys>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialEnvKeys {
    user: Option<String>,
    password: Option<String>,
    port: Option<String>,
    host: Option<String>,
    database: Option<String>,
}

impl PartialEnvKeys {
    fn overlay(self, base: &EnvKeys) -> EnvKeys {
        EnvKeys {
            user: self.user.unwrap_or_else(|| base.user.clone()),
            password: self.password.unwrap_or_else(|| base.password.clone()),
            port: self.port.unwrap_or_else(|| base.port.clone()),
            host: self.host.unwrap_or_else(|| base.host.clone()),
            database: self.database.unwrap_or_else(|| base.database.clone()),
        }
    }
}

fn parse_dialect(field: &str, raw: &str) -> Result<Dialect, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::invalid_value(field, raw, "one of: sqlite, mysql, postgres"))
}

impl MigrateConfig {
    /// Load `ez-migrate.json` from the working directory
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load a configuration file, falling back to defaults when it does not exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                "Cannot read {}. Using default configuration, run \"ez-migrate init\" to create it",
                path.display()
            );
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Overlay user supplied JSON on top of the defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        if json.trim().is_empty() {
            return Err(ConfigError::validation_failed("configuration file is empty"));
        }

        let user: PartialConfig = serde_json::from_str(json)?;
        let defaults = Self::default();

        let dialect = match user.dialect {
            Some(raw) => parse_dialect("dialect", &raw)?,
            None => defaults.dialect,
        };
        let env_keys = match user.env_keys {
            Some(keys) => keys.overlay(&defaults.env_keys),
            None => defaults.env_keys.clone(),
        };

        // Without an explicit tracker section the tracker lives next to the target
        let tracker = match user.tracker {
            Some(tracker) => TrackerConfig {
                dialect: match tracker.dialect {
                    Some(raw) => parse_dialect("tracker.dialect", &raw)?,
                    None => defaults.tracker.dialect,
                },
                sqlite_path: tracker
                    .sqlite_path
                    .unwrap_or_else(|| defaults.tracker.sqlite_path.clone()),
                env_keys: match tracker.env_keys {
                    Some(keys) => keys.overlay(&defaults.tracker.env_keys),
                    None => defaults.tracker.env_keys.clone(),
                },
            },
            None => TrackerConfig {
                dialect,
                sqlite_path: defaults.tracker.sqlite_path.clone(),
                env_keys: env_keys.clone(),
            },
        };

        Ok(Self {
            dialect,
            migrations_path: user.migrations_path.unwrap_or(defaults.migrations_path),
            seeds_path: user.seeds_path.unwrap_or(defaults.seeds_path),
            sqlite_path: user.sqlite_path.unwrap_or(defaults.sqlite_path),
            env_keys,
            tracker,
        })
    }

    /// Write the default configuration. Returns `false` when the file already exists.
    pub fn write_default(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }

        let json = serde_json::to_string_pretty(&Self::default())?;
        fs::write(path, json)?;
        tracing::info!("Created configuration file {}", path.display());
        Ok(true)
    }

    /// Connection settings for the migration target, read from the environment
    pub fn target_settings(&self) -> Result<ConnectionSettings, ConfigError> {
        self.target_settings_with(|key| std::env::var(key).ok())
    }

    pub fn target_settings_with<F>(&self, lookup: F) -> Result<ConnectionSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.dialect {
            Dialect::Sqlite => Ok(ConnectionSettings::sqlite(&self.sqlite_path)),
            dialect => ConnectionSettings::resolve(dialect, &self.env_keys, lookup),
        }
    }

    /// Connection settings for the tracker store, read from the environment
    pub fn tracker_settings(&self) -> Result<ConnectionSettings, ConfigError> {
        self.tracker_settings_with(|key| std::env::var(key).ok())
    }

    pub fn tracker_settings_with<F>(&self, lookup: F) -> Result<ConnectionSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.tracker.dialect {
            Dialect::Sqlite => Ok(ConnectionSettings::sqlite(&self.tracker.sqlite_path)),
            dialect => ConnectionSettings::resolve(dialect, &self.tracker.env_keys, lookup),
        }
    }

    /// Validate the essentials against the process environment
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(|key| std::env::var(key).ok())
    }

    pub fn validate_with<F>(&self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target = self.target_settings_with(&lookup)?;
        if target.dialect.is_server() {
            if target.database.is_none() {
                return Err(ConfigError::missing_required(
                    "database",
                    format!(
                        "Set the {} environment variable to the target database name",
                        self.env_keys.database
                    ),
                ));
            }
            if target.password.is_none() {
                tracing::warn!("Password is not specified for the migration target database");
            }
        }

        let tracker = self.tracker_settings_with(&lookup)?;
        if tracker.dialect.is_server() {
            if tracker.database.is_none() {
                return Err(ConfigError::missing_required(
                    "tracker.database",
                    format!(
                        "Set the {} environment variable to the tracker database name",
                        self.tracker.env_keys.database
                    ),
                ));
            }
            if tracker.password.is_none() {
                tracing::warn!("Password is not specified for the tracker database");
            }
        }

        if target.dialect == Dialect::Sqlite
            && tracker.dialect == Dialect::Sqlite
            && target.sqlite_path == tracker.sqlite_path
        {
            return Err(ConfigError::validation_failed(
                "the SQLite tracker must use a different file than the SQLite target",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = MigrateConfig::default();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.tracker.dialect, Dialect::Sqlite);
        assert_eq!(config.migrations_path, PathBuf::from("./migrations"));
        assert_eq!(config.env_keys.database, "DB_NAME");
    }

    #[test]
    fn test_partial_overlay() {
        let config = MigrateConfig::from_json_str(
            r#"{
                "dialect": "postgresql",
                "migrationsPath": "db/migrations",
                "envKeys": { "database": "PG_DATABASE" },
                "tracker": { "dialect": "sqlite", "sqlitePath": "db/tracker.db" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.migrations_path, PathBuf::from("db/migrations"));
        assert_eq!(config.seeds_path, PathBuf::from("./seeds"));
        assert_eq!(config.env_keys.database, "PG_DATABASE");
        assert_eq!(config.env_keys.user, "DB_USER");
        assert_eq!(config.tracker.sqlite_path, PathBuf::from("db/tracker.db"));
    }

    #[test]
    fn test_tracker_inherits_target_without_section() {
        let config = MigrateConfig::from_json_str(
            r#"{ "dialect": "mysql", "envKeys": { "host": "MY_HOST" } }"#,
        )
        .unwrap();

        assert_eq!(config.tracker.dialect, Dialect::MySql);
        assert_eq!(config.tracker.env_keys.host, "MY_HOST");
    }

    #[test]
    fn test_unknown_dialect_is_invalid_value() {
        let result = MigrateConfig::from_json_str(r#"{ "dialect": "oracle" }"#);
        match result {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "dialect");
                assert_eq!(value, "oracle");
            }
            other => panic!("Expected invalid value error, got {:?}", other),
        }

        let result = MigrateConfig::from_json_str(r#"{ "tracker": { "dialect": "mssql" } }"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            MigrateConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            MigrateConfig::from_json_str("   "),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_validate_requires_target_database() {
        let config = MigrateConfig::default();
        let result = config.validate_with(no_env);
        assert!(matches!(result, Err(ConfigError::MissingRequired { .. })));

        let ok = config.validate_with(|key| (key == "DB_NAME").then(|| "app".to_string()));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_validate_rejects_shared_sqlite_file() {
        let mut config = MigrateConfig::default();
        config.dialect = Dialect::Sqlite;
        config.sqlite_path = PathBuf::from("./same.db");
        config.tracker.sqlite_path = PathBuf::from("./same.db");

        assert!(matches!(
            config.validate_with(no_env),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_write_default_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);

        assert!(MigrateConfig::write_default(&path).unwrap());
        assert!(!MigrateConfig::write_default(&path).unwrap());

        let loaded = MigrateConfig::load_from(&path).unwrap();
        assert_eq!(loaded, MigrateConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = MigrateConfig::load_from(temp_dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, MigrateConfig::default());
    }

    #[test]
    #[serial]
    fn test_target_settings_from_process_env() {
        std::env::set_var("EZMIG_TEST_DB", "inventory");
        let mut config = MigrateConfig::default();
        config.env_keys.database = "EZMIG_TEST_DB".to_string();

        let settings = config.target_settings().unwrap();
        assert_eq!(settings.database.as_deref(), Some("inventory"));
        assert_eq!(settings.port, 3306);

        std::env::remove_var("EZMIG_TEST_DB");
    }
}
