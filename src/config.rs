// src/config.rs
//! Service configuration: environment variables first, then an optional TOML
//! file, then defaults. `.env` is loaded by the binary before this runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const ENV_CONFIG_PATH: &str = "RECONCILER_CONFIG_PATH";
pub const ENV_BACKEND_URL: &str = "RECONCILER_BACKEND_URL";
pub const ENV_SCOPE_ID: &str = "RECONCILER_SCOPE_ID";
pub const ENV_BIND_ADDR: &str = "RECONCILER_BIND_ADDR";

pub const DEFAULT_CONFIG_PATH: &str = "config/reconciler.toml";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:9100";
pub const DEFAULT_SCOPE_ID: &str = "default";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Base URL of the reconciliation service.
    pub backend_base_url: String,
    /// Organizational scope passed to every per-day driver fetch.
    pub scope_id: String,
    pub bind_addr: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    backend_base_url: Option<String>,
    #[serde(default)]
    scope_id: Option<String>,
    #[serde(default)]
    bind_addr: Option<String>,
}

impl AppConfig {
    /// Resolution order per field: env var, then TOML file, then default.
    /// The file is `$RECONCILER_CONFIG_PATH` if set (must exist), otherwise
    /// `config/reconciler.toml` if present.
    pub fn load() -> Result<Self> {
        let file = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                Some(Self::read_file(&pb).with_context(|| {
                    format!("{ENV_CONFIG_PATH} points to {}", pb.display())
                })?)
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
                if pb.exists() {
                    Some(Self::read_file(&pb)?)
                } else {
                    None
                }
            }
        };
        Ok(Self::merge(file.unwrap_or_default()))
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn merge(file: FileConfig) -> Self {
        let pick = |env_name: &str, file_value: Option<String>, default: &str| {
            std::env::var(env_name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or(file_value)
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            backend_base_url: pick(ENV_BACKEND_URL, file.backend_base_url, DEFAULT_BACKEND_URL),
            scope_id: pick(ENV_SCOPE_ID, file.scope_id, DEFAULT_SCOPE_ID),
            bind_addr: pick(ENV_BIND_ADDR, file.bind_addr, DEFAULT_BIND_ADDR),
        }
    }
}
