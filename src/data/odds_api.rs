//! The Odds API v4 client.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Base URL: https://api.the-odds-api.com/v4
//! Auth: `apiKey` query parameter. Quota usage is reported in the
//! `x-requests-remaining` / `x-requests-used` response headers.
//!
//! Odds are always requested in decimal format with ISO timestamps.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{OddsSource, SourceError};
use crate::config::OddsConfig;
use crate::types::Event;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Entry of `GET /sports`.
#[derive(Debug, Deserialize)]
struct SportEntry {
    key: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Upstream odds service client.
pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    regions: String,
    markets: String,
}

impl OddsApiClient {
    /// Create a new client.
    ///
    /// A missing `api_key` is not an error here; every request will then
    /// fail with `SourceError::Unauthorized`.
    pub fn new(config: &OddsConfig, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("oddsedge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for odds API")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            regions: config.regions.clone(),
            markets: config.markets.clone(),
        })
    }

    /// GET `{base_url}{path}` with the API key attached and map failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| SourceError::Unauthorized("no API key configured".to_string()))?;

        let url = format!("{}{path}", self.base_url);
        debug!(path, "Odds API request");

        let resp = self
            .http
            .get(&url)
            .query(&[("apiKey", key.expose_secret().as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.without_url().to_string()))?;

        if let Some(remaining) = resp
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!(remaining, "Odds API quota");
        }

        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = resp.text().await.unwrap_or_default();
                warn!(status = %status, "Odds API rejected credentials");
                return Err(SourceError::Unauthorized(body));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Odds API rate limit hit");
                return Err(SourceError::RateLimited);
            }
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(SourceError::Upstream { status: s.as_u16(), body });
            }
            _ => {}
        }

        resp.json().await.map_err(|e| {
            SourceError::Transport(format!("invalid response from {path}: {}", e.without_url()))
        })
    }
}

#[async_trait]
impl OddsSource for OddsApiClient {
    async fn sports(&self) -> Result<Vec<String>, SourceError> {
        let entries: Vec<SportEntry> = self.get_json("/sports", &[]).await?;
        let keys: Vec<String> = entries
            .into_iter()
            .filter(|s| s.active)
            .map(|s| s.key)
            .collect();
        debug!(count = keys.len(), "Sports fetched");
        Ok(keys)
    }

    async fn events(&self, sport_key: &str) -> Result<Vec<Event>, SourceError> {
        let path = format!("/sports/{}/odds", urlencoding::encode(sport_key));
        let raw: Vec<serde_json::Value> = self
            .get_json(
                &path,
                &[
                    ("regions", self.regions.as_str()),
                    ("markets", self.markets.as_str()),
                    ("oddsFormat", "decimal"),
                    ("dateFormat", "iso"),
                ],
            )
            .await?;

        let total = raw.len();
        let events: Vec<Event> = raw
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if events.len() < total {
            warn!(sport_key, skipped = total - events.len(), "Dropped undecodable events");
        }
        debug!(sport_key, count = events.len(), "Events fetched");
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
