//! Project configuration (`.ripple/config.toml`)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CACHE_DIR;
use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.toml";

/// Directories skipped by default during a scan.
pub const DEFAULT_IGNORE: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".pytest_cache",
    "venv",
    "env",
    ".venv",
    "dist",
    "build",
    "target",
    CACHE_DIR,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RippleConfig {
    pub scan: ScanSettings,
    pub impact: ImpactSettings,
    pub edit: EditSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Glob patterns matched against every path component and the relative path.
    pub ignore: Vec<String>,
    pub respect_gitignore: bool,
    pub max_workers: usize,
    /// Files larger than this (bytes) are skipped and reported.
    pub max_file_size: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        ScanSettings {
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            respect_gitignore: true,
            max_workers: cores.clamp(1, 8),
            max_file_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactSettings {
    pub max_depth: usize,
}

impl Default for ImpactSettings {
    fn default() -> Self {
        ImpactSettings { max_depth: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditSettings {
    /// Backups kept per file; older snapshots are pruned after each edit.
    pub backup_retention: usize,
    /// Treat validation failures as hard errors.
    pub strict: bool,
}

impl Default for EditSettings {
    fn default() -> Self {
        EditSettings {
            backup_retention: 10,
            strict: false,
        }
    }
}

impl RippleConfig {
    /// Load `<root>/.ripple/config.toml`; a missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CACHE_DIR).join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let config: RippleConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
