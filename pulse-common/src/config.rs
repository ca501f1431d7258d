//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PULSE_ROOT_FOLDER";

/// File name of the TOML config inside the root folder
pub const CONFIG_FILE_NAME: &str = "pulse.toml";

/// File name of the SQLite database inside the root folder
pub const DATABASE_FILE_NAME: &str = "pulse.db";

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "pulse_engine=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Base URLs of the outbound collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpstreamsConfig {
    pub quotes: Option<String>,
    pub messages: Option<String>,
    pub extraction: Option<String>,
    pub interpretation: Option<String>,
    /// Request rate allowed against the message source
    pub messages_per_second: Option<u32>,
}

/// Circuit breaker parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakerSection {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_secs: Option<u64>,
    pub half_open_success_threshold: Option<u32>,
}

/// Scheduling and pacing knobs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Run the in-process scheduler
    pub enabled: Option<bool>,
    /// Trading window open, "HH:MM" UTC
    pub trading_open_utc: Option<String>,
    /// Trading window close, "HH:MM" UTC
    pub trading_close_utc: Option<String>,
    pub run_budget_secs: Option<u64>,
    pub inter_symbol_delay_ms: Option<u64>,
    pub inter_date_delay_ms: Option<u64>,
}

/// Contents of `pulse.toml`
///
/// Every field is optional; anything missing falls back to environment
/// variables or compiled defaults during resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub bind_address: Option<String>,
    pub admin_token: Option<String>,
    #[serde(default)]
    pub watchlist: Vec<String>,
    pub decision_lens: Option<String>,
    #[serde(default)]
    pub upstreams: UpstreamsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub breaker: BreakerSection,
}

/// Load TOML config from `path`
///
/// A missing file is not an error: the defaults are returned instead.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `PULSE_ROOT_FOLDER`
/// 3. OS-dependent compiled default (fallback)
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Supply the `--root-folder` command-line value, if any
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("{}: root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!("{}: root folder from {}: {}", self.module_name, ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        let path = default_root_folder();
        info!("{}: root folder (default): {}", self.module_name, path.display());
        path
    }
}

/// Creates the root folder and hands out the well-known paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder).map_err(|e| {
            Error::Config(format!(
                "Cannot create root folder {}: {}",
                self.root_folder.display(),
                e
            ))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root_folder.join(CONFIG_FILE_NAME)
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pulse"))
        .unwrap_or_else(|| PathBuf::from("./pulse_data"))
}
