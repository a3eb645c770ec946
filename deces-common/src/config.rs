//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`DECES_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "DECES_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "deces.db";

/// Working directory (downloads, extracted entries) inside the root folder
pub const WORK_DIR: &str = "tmp";

/// Compiled-in defaults, used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Only bootstrap concerns live here; runtime tuning of the ingest pipeline
/// can be overridden per key from the database `settings` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and working files
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingest pipeline overrides
    #[serde(default)]
    pub ingest: IngestToml,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Optional ingest tuning from the `[ingest]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestToml {
    pub batch_size: Option<usize>,
    pub error_ceiling: Option<usize>,
    pub progress_interval: Option<u64>,
    pub completion_ratio: Option<f64>,
    pub trusted_url_prefix: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub stale_run_timeout_secs: Option<u64>,
}

/// Resolves the root folder following the priority order above
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

    /// Command-line value, takes precedence over everything else
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(config) = load_toml_config() {
            if let Some(path) = config.root_folder {
                info!(module = %self.module_name, "Root folder from TOML: {}", path.display());
                return path;
            }
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Creates the root folder layout on first start
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.work_dir())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root_folder.join(WORK_DIR)
    }
}

/// Candidate TOML locations, most specific first
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("deces").join("config.toml"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/deces/config.toml"));
    }
    candidates
}

/// Load the first TOML config file found; `None` when none exists or it is invalid
pub fn load_toml_config() -> Option<TomlConfig> {
    for path in config_file_candidates() {
        if !path.exists() {
            continue;
        }
        match read_toml_config(&path) {
            Ok(config) => {
                debug!("Loaded TOML config: {}", path.display());
                return Some(config);
            }
            Err(e) => {
                warn!("Ignoring TOML config {}: {}", path.display(), e);
                return None;
            }
        }
    }
    None
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("deces"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/deces"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("deces"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/deces"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("deces"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\deces"))
    } else {
        PathBuf::from("./deces_data")
    }
}
