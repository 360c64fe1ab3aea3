//! Bet query filtering.
//!
//! Applies the `/bets` query parameters to a computed batch, sorts by
//! descending edge and truncates to the result cap.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::types::Bet;

/// Default cap on returned bets.
pub const MAX_RESULTS: usize = 200;

/// Longest `hours_before` window honoured (about a century).
pub const MAX_WINDOW_HOURS: i64 = 100 * 366 * 24;

/// Query parameters accepted by `GET /bets`.
///
/// `edge_min` / `edge_max` are percentages (5 means an edge of 0.05).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BetQuery {
    pub sport_key: Option<String>,
    /// Case-insensitive match on the sport label.
    pub sport: Option<String>,
    pub bookmaker: Option<String>,
    pub hours_before: Option<i64>,
    pub edge_min: Option<f64>,
    pub edge_max: Option<f64>,
}

impl BetQuery {
    /// Lower edge bound as a fraction.
    pub fn edge_min_fraction(&self) -> Option<f64> {
        self.edge_min.map(percent_to_fraction)
    }

    /// Upper edge bound as a fraction.
    pub fn edge_max_fraction(&self) -> Option<f64> {
        self.edge_max.map(percent_to_fraction)
    }

    /// Whether a single bet passes every supplied filter.
    pub fn matches(&self, bet: &Bet, now: DateTime<Utc>) -> bool {
        if let Some(sport) = self.sport.as_deref().filter(|s| !s.is_empty()) {
            if !bet.sport.eq_ignore_ascii_case(sport) {
                return false;
            }
        }
        if let Some(bookmaker) = self.bookmaker.as_deref().filter(|s| !s.is_empty()) {
            if !bet.bookmaker.eq_ignore_ascii_case(bookmaker) {
                return false;
            }
        }
        if let Some(end) = self.hours_before.and_then(|h| window_end(now, h)) {
            if bet.start_time > end {
                return false;
            }
        }
        if let Some(min) = self.edge_min_fraction() {
            if bet.edge < min {
                return false;
            }
        }
        if let Some(max) = self.edge_max_fraction() {
            if bet.edge > max {
                return false;
            }
        }
        true
    }

    /// Filter, sort by descending edge and cap at `limit`.
    pub fn apply(&self, bets: Vec<Bet>, now: DateTime<Utc>, limit: usize) -> Vec<Bet> {
        let mut selected: Vec<Bet> = bets.into_iter().filter(|b| self.matches(b, now)).collect();
        sort_by_edge(&mut selected);
        selected.truncate(limit);
        selected
    }
}

/// Percent input (0–100) to a fractional edge bound.
pub fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

/// Latest start time admitted by an `hours_before` window.
///
/// Windows are clamped to `MAX_WINDOW_HOURS` either way; `None` means the
/// window is unbounded.
pub fn window_end(now: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    let hours = hours.clamp(-MAX_WINDOW_HOURS, MAX_WINDOW_HOURS);
    Duration::try_hours(hours).and_then(|d| now.checked_add_signed(d))
}

/// Best edge first.
pub fn sort_by_edge(bets: &mut [Bet]) {
    bets.sort_by(|a, b| b.edge.total_cmp(&a.edge));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
