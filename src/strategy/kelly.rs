//! Kelly criterion stake sizing.
//!
//! Suggests a stake for a tracked bet from its decimal odds and edge,
//! using the fractional multiplier and stake bounds held in settings.

use rust_decimal::prelude::*;
use tracing::debug;

use crate::types::Settings;

/// Full Kelly fraction for decimal `odds` at win probability `p`.
///
/// f* = (b·p − q) / b, with b = odds − 1 and q = 1 − p.
pub fn kelly_fraction(odds: f64, p: f64) -> f64 {
    let b = odds - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    (b * p - (1.0 - p)) / b
}

/// Stake for a bet priced at `odds` whose consensus edge is `edge`.
///
/// The win probability is the consensus probability the edge was measured
/// against (`1/odds + edge`). Returns `None` when Kelly says no bet.
pub fn suggest_stake(odds: f64, edge: f64, settings: &Settings) -> Option<Decimal> {
    if odds <= 1.0 {
        return None;
    }
    let p = (1.0 / odds + edge).clamp(0.0, 1.0);
    let kelly = kelly_fraction(odds, p);
    if kelly <= 0.0 {
        return None;
    }

    let fraction = Decimal::from_f64(kelly * settings.kelly_fraction)?;
    let raw = settings.bankroll * fraction;
    let stake = raw
        .max(settings.min_stake)
        .min(settings.max_stake)
        .round_dp(2);

    debug!(
        odds,
        edge,
        raw_kelly = kelly,
        stake = %stake,
        "Stake suggested"
    );

    Some(stake)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
