use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use thiserror::Error;

/// Path spelling that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

pub const DEFAULT_DATABASE_PATH: &str = "jmt.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: unrecognized value `{value}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PathBuf", into = "PathBuf")]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl From<PathBuf> for StoreLocation {
    fn from(path: PathBuf) -> Self {
        if path == Path::new(MEMORY_PATH) {
            StoreLocation::Memory
        } else {
            StoreLocation::File(path)
        }
    }
}

impl From<StoreLocation> for PathBuf {
    fn from(location: StoreLocation) -> Self {
        match location {
            StoreLocation::Memory => PathBuf::from(MEMORY_PATH),
            StoreLocation::File(path) => path,
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Memory => f.write_str(MEMORY_PATH),
            StoreLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    fn to_sqlite(self) -> SqliteJournalMode {
        match self {
            JournalMode::Delete => SqliteJournalMode::Delete,
            JournalMode::Truncate => SqliteJournalMode::Truncate,
            JournalMode::Persist => SqliteJournalMode::Persist,
            JournalMode::Memory => SqliteJournalMode::Memory,
            JournalMode::Wal => SqliteJournalMode::Wal,
            JournalMode::Off => SqliteJournalMode::Off,
        }
    }
}

impl FromStr for JournalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(JournalMode::Delete),
            "truncate" => Ok(JournalMode::Truncate),
            "persist" => Ok(JournalMode::Persist),
            "memory" => Ok(JournalMode::Memory),
            "wal" => Ok(JournalMode::Wal),
            "off" => Ok(JournalMode::Off),
            _ => Err(ConfigError::InvalidValue {
                key: "journal_mode".into(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    Off,
    Normal,
    Full,
    Extra,
}

impl Synchronous {
    fn to_sqlite(self) -> SqliteSynchronous {
        match self {
            Synchronous::Off => SqliteSynchronous::Off,
            Synchronous::Normal => SqliteSynchronous::Normal,
            Synchronous::Full => SqliteSynchronous::Full,
            Synchronous::Extra => SqliteSynchronous::Extra,
        }
    }
}

impl FromStr for Synchronous {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Synchronous::Off),
            "normal" => Ok(Synchronous::Normal),
            "full" => Ok(Synchronous::Full),
            "extra" => Ok(Synchronous::Extra),
            _ => Err(ConfigError::InvalidValue {
                key: "synchronous".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Connection settings applied to every pooled SQLite connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// How long a writer waits on a held lock before surfacing `StoreBusy`.
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub synchronous: Synchronous,
    pub foreign_keys: bool,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::File(PathBuf::from(DEFAULT_DATABASE_PATH)),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::Wal,
            synchronous: Synchronous::Normal,
            foreign_keys: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::from(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            location: std::env::var("JMT_DATABASE_PATH")
                .map(|v| StoreLocation::from(PathBuf::from(v)))
                .unwrap_or(defaults.location),
            busy_timeout_ms: parse_env("JMT_BUSY_TIMEOUT_MS")?.unwrap_or(defaults.busy_timeout_ms),
            journal_mode: match std::env::var("JMT_JOURNAL_MODE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.journal_mode,
            },
            synchronous: match std::env::var("JMT_SYNCHRONOUS") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.synchronous,
            },
            foreign_keys: match std::env::var("JMT_FOREIGN_KEYS") {
                Ok(v) => parse_flag("JMT_FOREIGN_KEYS", &v)?,
                Err(_) => defaults.foreign_keys,
            },
            max_connections: parse_env("JMT_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn connect_options(&self) -> Result<SqliteConnectOptions, sqlx::Error> {
        let base = match &self.location {
            StoreLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
            StoreLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        };
        Ok(base
            .journal_mode(self.journal_mode.to_sqlite())
            .synchronous(self.synchronous.to_sqlite())
            .foreign_keys(self.foreign_keys)
            .busy_timeout(self.busy_timeout())
            .pragma("temp_store", "memory"))
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: v,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "true" | "TRUE" | "True" | "on" => Ok(true),
        "0" | "false" | "FALSE" | "False" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favour_concurrent_durability() {
        let config = StoreConfig::default();
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.synchronous, Synchronous::Normal);
        assert!(config.foreign_keys);
        assert_eq!(config.busy_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn memory_path_selects_in_memory_location() {
        assert_eq!(StoreConfig::at(":memory:").location, StoreLocation::Memory);
        assert_eq!(
            StoreConfig::at("data/jmt.db").location,
            StoreLocation::File(PathBuf::from("data/jmt.db"))
        );
    }

    #[test]
    fn pragma_values_parse_strictly() {
        assert_eq!("WAL".parse::<JournalMode>().unwrap(), JournalMode::Wal);
        assert_eq!(" full ".parse::<Synchronous>().unwrap(), Synchronous::Full);
        assert!("wal2".parse::<JournalMode>().is_err());
        assert!("fastest".parse::<Synchronous>().is_err());
        assert!(parse_flag("JMT_FOREIGN_KEYS", "maybe").is_err());
        assert!(!parse_flag("JMT_FOREIGN_KEYS", "off").unwrap());
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"location":"/tmp/jobs.db","journal_mode":"delete"}"#)
                .expect("parse");
        assert_eq!(
            config.location,
            StoreLocation::File(PathBuf::from("/tmp/jobs.db"))
        );
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }
}
