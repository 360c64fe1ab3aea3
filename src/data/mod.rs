//! Odds data acquisition.
//!
//! Defines the `OddsSource` trait and its implementations: the upstream
//! odds API client, a static sample source for offline use, and a
//! TTL-caching decorator that wraps either.

pub mod cache;
pub mod odds_api;
pub mod sample;

use async_trait::async_trait;

use crate::types::Event;

/// Failures fetching odds from a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Credential missing or rejected by the upstream service.
    #[error("upstream authentication failed: {0}")]
    Unauthorized(String),

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(String),
}

/// Abstraction over wherever raw event/odds data comes from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Sport/league keys this source can serve.
    async fn sports(&self) -> Result<Vec<String>, SourceError>;

    /// Events with nested bookmaker prices for one sport key.
    async fn events(&self, sport_key: &str) -> Result<Vec<Event>, SourceError>;
}

/// Sorted, de-duplicated bookmaker names appearing in `events`.
pub fn bookmaker_names(events: &[Event]) -> Vec<String> {
    let mut names: Vec<String> = events
        .iter()
        .flat_map(|e| e.bookmakers.iter().map(|b| b.name().to_string()))
        .collect();
    names.sort();
    names.dedup();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
