//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path in `ODDSEDGE_CONFIG`) into typed
//! structs. Every section has defaults, so a partial file is valid.
//! The upstream API key is referenced by env-var name and resolved at
//! runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::data::cache::DEFAULT_TTL_SECS;
use crate::strategy::filter::MAX_RESULTS;

/// Env var overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "ODDSEDGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub odds: OddsConfig,
    pub edge: EdgeConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Where event data comes from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The Odds API v4.
    OddsApi,
    /// Built-in static events, no network.
    Sample,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OddsConfig {
    pub source: SourceKind,
    pub base_url: String,
    pub api_key_env: String,
    /// Comma-separated bookmaker regions, e.g. "eu,uk".
    pub regions: String,
    /// Comma-separated market keys, e.g. "h2h,totals".
    pub markets: String,
    /// Sport key used when a request does not name one.
    pub default_sport: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: i64,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::OddsApi,
            base_url: "https://api.the-odds-api.com/v4".to_string(),
            api_key_env: "ODDS_API_KEY".to_string(),
            regions: "eu".to_string(),
            markets: "h2h".to_string(),
            default_sport: "upcoming".to_string(),
            timeout_secs: 15,
            cache_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl OddsConfig {
    /// Cache namespace for this request shape.
    pub fn request_shape(&self) -> String {
        format!("{}:{}", self.regions, self.markets)
    }

    /// The upstream API key, if its env var is set and non-empty.
    pub fn api_key(&self) -> Option<SecretString> {
        AppConfig::resolve_env(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::new)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EdgeConfig {
    /// Cap on bets returned by `/bets`.
    pub max_results: usize,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self { max_results: MAX_RESULTS }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    /// Seed the tracked-bet table from sample odds when it is empty.
    pub seed_sample: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://oddsedge.db".to_string(),
            seed_sample: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.edge.max_results == 0 {
            anyhow::bail!("edge.max_results must be at least 1");
        }
        if config.odds.cache_ttl_secs < 0 {
            anyhow::bail!("odds.cache_ttl_secs must not be negative");
        }
        Ok(config)
    }

    /// Config file path from `ODDSEDGE_CONFIG`, else `config.toml`.
    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
