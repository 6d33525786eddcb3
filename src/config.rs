//! fleetrun configuration file
//!
//! Lives at `<config dir>/config.toml`. Every field has a default, and a
//! missing file is the same as an empty one.

use crate::paths;
use anyhow::{Context, Result};
use dispatch::{AuditOptions, RunConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub audit: AuditOptions,
    pub templates: TemplatesConfig,
    pub ssh: SshConfig,
    pub http: HttpConfig,
    pub transport: TransportConfig,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    pub bind: String,
    /// Prefix for every route, e.g. `/fleet/v1`
    pub root_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            root_path: String::new(),
        }
    }
}

/// Engine defaults, in file-friendly units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_concurrency: usize,
    pub per_device_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_secs: u64,
    pub max_output_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let run = RunConfig::default();
        Self {
            max_concurrency: run.max_concurrency,
            per_device_timeout_secs: run.per_device_timeout.as_secs(),
            max_retries: run.max_retries,
            retry_backoff_ms: run.retry_backoff.as_millis() as u64,
            backoff_factor: run.backoff_factor,
            max_backoff_secs: run.max_backoff.as_secs(),
            max_output_bytes: run.max_output_bytes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory holding named templates; defaults to `<config dir>/templates`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// ssh client binary
    pub program: String,
    /// Login user when the device address carries none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub connect_timeout_secs: u64,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`
    pub options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            user: None,
            port: None,
            connect_timeout_secs: 10,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Scheme used when a device address has none
    pub scheme: String,
    /// Path appended to bare device addresses
    pub path: String,
    pub content_type: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            path: "/".to_string(),
            content_type: "text/plain; charset=utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport for devices that do not name one
    pub default: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default: "ssh".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Could not write {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Engine options built from the file values
    pub fn run_config(&self) -> RunConfig {
        let d = &self.dispatch;
        RunConfig {
            max_concurrency: d.max_concurrency,
            per_device_timeout: Duration::from_secs(d.per_device_timeout_secs),
            max_retries: d.max_retries,
            retry_backoff: Duration::from_millis(d.retry_backoff_ms),
            backoff_factor: d.backoff_factor,
            max_backoff: Duration::from_secs(d.max_backoff_secs),
            max_output_bytes: d.max_output_bytes,
            audit: self.audit.clone(),
        }
    }

    /// Resolved directory for named templates
    pub fn templates_dir(&self) -> Result<PathBuf> {
        match &self.templates.dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::default_templates_dir(),
        }
    }
}
