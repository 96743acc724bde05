use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::namespace::DEFAULT_PREFIX;
use crate::retry::RetryConfig;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";

/// Configuration loaded from `flowstate.yaml`.
/// Missing fields fall back to defaults; env vars and CLI flags override.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis address, `host:port` or a `redis://` URL.
    pub address: String,
    /// First namespace segment of every physical key.
    pub prefix: String,
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `flowstate.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("flowstate.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: StoreConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    /// Override fields from `FLOWSTATE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with a custom variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(address) = lookup("FLOWSTATE_ADDRESS") {
            self.address = address;
        }
        if let Some(prefix) = lookup("FLOWSTATE_PREFIX") {
            self.prefix = prefix;
        }
        if let Some(raw) = lookup("FLOWSTATE_MAX_RETRIES") {
            self.retry.max_retries = raw
                .parse()
                .with_context(|| format!("Invalid FLOWSTATE_MAX_RETRIES: {}", raw))?;
        }
        if let Some(raw) = lookup("FLOWSTATE_BACKOFF_MS") {
            self.retry.backoff_ms = raw
                .parse()
                .with_context(|| format!("Invalid FLOWSTATE_BACKOFF_MS: {}", raw))?;
        }
        Ok(())
    }
}
