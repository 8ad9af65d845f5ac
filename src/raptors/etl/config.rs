//! Runtime configuration loaded from an optional TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::raptors::etl::error::Result;

/// Database used whenever neither the CLI nor the configuration names one.
pub const DEFAULT_DATABASE: &str = "ccsdm";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_CURRENT_YEAR: i32 = 2018;

/// Top-level configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mongo: MongoConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub fiscal: FiscalConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads the file when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Resolves the database name, preferring an explicit choice.
    pub fn database_or_default(&self, database: Option<&str>) -> String {
        database
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.mongo.database.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
        }
    }
}

impl MongoConfig {
    /// Connection string for the configured server, with optional overrides.
    pub fn uri(&self, host: Option<&str>, port: Option<u16>) -> String {
        format!(
            "mongodb://{}:{}",
            host.unwrap_or(&self.host),
            port.unwrap_or(self.port)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory holding templates, backups and generated reports.
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Directory receiving the unmapped-rows workbooks.
    #[serde(default = "default_unmapped_dir")]
    pub unmapped_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            unmapped_dir: default_unmapped_dir(),
        }
    }
}

impl PathConfig {
    pub fn home_dir(&self) -> PathBuf {
        expand_home(&self.home_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Destinations purged by fiscal week rather than wholesale.
    #[serde(default = "default_sensitive_collections")]
    pub sensitive_collections: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sensitive_collections: default_sensitive_collections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalConfig {
    #[serde(default = "default_current_year")]
    pub current_year: i32,
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            current_year: default_current_year(),
        }
    }
}

/// Replaces a leading `~` with the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_home_dir() -> PathBuf {
    PathBuf::from("~/Documents/Raptors/XLSX")
}

fn default_unmapped_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_sensitive_collections() -> Vec<String> {
    vec![
        "ent_dump_from_finance".to_string(),
        "ent_dump_from_finance_old".to_string(),
    ]
}

fn default_current_year() -> i32 {
    DEFAULT_CURRENT_YEAR
}
