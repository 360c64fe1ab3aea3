//! Shared types for the odds service.
//!
//! Upstream event shapes are deliberately permissive: every field is
//! optional or defaulted so a single malformed record never fails a batch.
//! The edge calculator resolves the fallbacks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Label used when an upstream record carries no usable name.
pub const UNKNOWN: &str = "unknown";

// ---------------------------------------------------------------------------
// Upstream event data
// ---------------------------------------------------------------------------

/// A single real-world contest with nested bookmaker prices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sport_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sport_title: Option<String>,
    /// ISO-8601 start time as sent upstream.
    #[serde(default, deserialize_with = "lenient_string")]
    pub commence_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub home_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub away_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub bookmakers: Vec<BookmakerOdds>,
}

impl Event {
    /// `"{home} vs {away}"`, with unknown teams coerced.
    pub fn display_name(&self) -> String {
        format!("{} vs {}", self.home(), self.away())
    }

    pub fn home(&self) -> &str {
        non_empty(self.home_team.as_deref()).unwrap_or(UNKNOWN)
    }

    pub fn away(&self) -> &str {
        non_empty(self.away_team.as_deref()).unwrap_or(UNKNOWN)
    }

    /// Sport label: title, then key, then the generic literal.
    pub fn sport_label(&self) -> &str {
        non_empty(self.sport_title.as_deref())
            .or_else(|| non_empty(self.sport_key.as_deref()))
            .unwrap_or(UNKNOWN)
    }

    /// Parsed start time, falling back to `now` when absent or unparseable.
    pub fn start_time_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.commence_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// Upstream id, or one synthesized from the teams and start time.
    pub fn id_or(&self, start_time: DateTime<Utc>) -> String {
        match non_empty(self.id.as_deref()) {
            Some(id) => id.to_string(),
            None => format!("{}_{}_{}", self.home(), self.away(), start_time.to_rfc3339()),
        }
    }
}

/// One bookmaker's markets for an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmakerOdds {
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub markets: Vec<MarketOdds>,
}

impl BookmakerOdds {
    pub fn name(&self) -> &str {
        non_empty(self.title.as_deref())
            .or_else(|| non_empty(self.key.as_deref()))
            .unwrap_or(UNKNOWN)
    }
}

/// One market (e.g. `h2h`) with its outcome prices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketOdds {
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub outcomes: Vec<OutcomeOdds>,
}

impl MarketOdds {
    pub fn market_key(&self) -> &str {
        non_empty(self.key.as_deref()).unwrap_or(UNKNOWN)
    }
}

/// One outcome price. `price` is decimal odds; anything non-numeric is 0.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeOdds {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price: f64,
    /// Handicap or total line for spreads/totals markets.
    #[serde(default, deserialize_with = "lenient_point")]
    pub point: Option<f64>,
}

impl OutcomeOdds {
    /// Selection name, qualified by the line when one is present.
    pub fn selection(&self) -> String {
        let name = non_empty(self.name.as_deref()).unwrap_or(UNKNOWN);
        match self.point {
            Some(point) => format!("{name} {point}"),
            None => name.to_string(),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Array elements that fail to decode are dropped; a non-array is empty.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Any scalar as text; objects, arrays and null become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_point<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accepts numbers and numeric strings; everything else becomes 0.0.
fn lenient_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

// ---------------------------------------------------------------------------
// Computed bets
// ---------------------------------------------------------------------------

/// A priced bet opportunity annotated with its consensus edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub event: String,
    pub bookmaker: String,
    pub market: String,
    pub selection: String,
    pub odds: f64,
    /// Consensus probability minus this quote's implied probability.
    pub edge: f64,
    pub sport: String,
    pub start_time: DateTime<Utc>,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {} {} @ {:.2} ({}) edge={:+.2}%",
            self.sport,
            self.event,
            self.market,
            self.selection,
            self.odds,
            self.bookmaker,
            self.edge * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracking store types
// ---------------------------------------------------------------------------

/// Lifecycle of a tracked bet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BetStatus {
    Active,
    Registered,
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetStatus::Active => write!(f, "active"),
            BetStatus::Registered => write!(f, "registered"),
        }
    }
}

/// A bet row held by the tracking store.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedBet {
    pub id: i64,
    pub event: String,
    pub bookmaker: String,
    pub market: String,
    pub selection: String,
    pub odds: f64,
    pub edge: f64,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub status: BetStatus,
    pub stake: Option<Decimal>,
    pub registered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Fractional Kelly stake under the current settings (listing only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_stake: Option<Decimal>,
}

/// One registration in the history log.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub bet_id: i64,
    pub event: String,
    pub bookmaker: String,
    pub market: String,
    pub selection: String,
    pub odds: f64,
    pub edge: f64,
    pub stake: Decimal,
    pub registered_at: DateTime<Utc>,
}

/// User-tunable staking settings, persisted as key/value rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bankroll: Decimal,
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub kelly_fraction: f64,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Rows per page when listing tracked bets.
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bankroll: dec!(1000),
            kelly_fraction: 0.25,
            min_stake: dec!(2),
            max_stake: dec!(100),
            page_size: 20,
        }
    }
}

impl Settings {
    /// Check the settings are internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.kelly_fraction > 0.0 && self.kelly_fraction <= 1.0) {
            return Err(format!(
                "kelly_fraction must be in (0, 1], got {}",
                self.kelly_fraction
            ));
        }
        if self.bankroll < Decimal::ZERO {
            return Err(format!("bankroll must not be negative, got {}", self.bankroll));
        }
        if self.min_stake < Decimal::ZERO || self.min_stake > self.max_stake {
            return Err(format!(
                "stake bounds must satisfy 0 <= min_stake <= max_stake, got {}..{}",
                self.min_stake, self.max_stake
            ));
        }
        if self.page_size == 0 {
            return Err("page_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Aggregate figures over the tracking store.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_bets: i64,
    pub active_bets: i64,
    pub registered_bets: i64,
    pub total_staked: Decimal,
    /// Mean odds of registered bets (0 when none).
    pub average_odds: f64,
    /// Mean edge of registered bets (0 when none).
    pub average_edge: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
