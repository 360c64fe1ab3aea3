//! Strategy — consensus edge scoring, bet filtering, and stake sizing.

pub mod edge;
pub mod filter;
pub mod kelly;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Bet, Event};
use filter::BetQuery;

/// Pipelines edge computation → query filtering → sort → cap.
pub fn rank_bets(events: &[Event], query: &BetQuery, now: DateTime<Utc>, limit: usize) -> Vec<Bet> {
    let computed = edge::compute_bets(events, now);
    let total = computed.len();
    let ranked = query.apply(computed, now, limit);

    debug!(computed = total, returned = ranked.len(), "Bets ranked");
    ranked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
