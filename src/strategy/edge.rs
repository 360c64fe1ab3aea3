//! Consensus edge calculation.
//!
//! Flattens nested event → bookmaker → market → outcome prices into
//! quotes, takes the median implied probability per (event, market,
//! selection) as the consensus, and scores every quote against it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::types::{Bet, Event};

/// Decimal odds at or below this return nothing over the stake.
pub const MIN_VALID_ODDS: f64 = 1.0;

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Groups every bookmaker's price for the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsensusKey {
    pub event_id: String,
    pub market: String,
    pub selection: String,
}

/// One valid bookmaker price with its event context resolved.
#[derive(Debug, Clone)]
pub struct Quote {
    pub key: ConsensusKey,
    pub event: String,
    pub bookmaker: String,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub odds: f64,
}

impl Quote {
    pub fn implied_probability(&self) -> f64 {
        1.0 / self.odds
    }
}

/// Walk the nested structure once, resolving fallbacks and dropping
/// quotes with odds <= 1.0.
pub fn collect_quotes(events: &[Event], now: DateTime<Utc>) -> Vec<Quote> {
    let mut quotes = Vec::new();

    for event in events {
        let start_time = event.start_time_or(now);
        let event_id = event.id_or(start_time);
        let name = event.display_name();
        let sport = event.sport_label();

        for bookmaker in &event.bookmakers {
            for market in &bookmaker.markets {
                for outcome in &market.outcomes {
                    // Negated so NaN is skipped too.
                    if !(outcome.price > MIN_VALID_ODDS) {
                        continue;
                    }
                    quotes.push(Quote {
                        key: ConsensusKey {
                            event_id: event_id.clone(),
                            market: market.market_key().to_string(),
                            selection: outcome.selection(),
                        },
                        event: name.clone(),
                        bookmaker: bookmaker.name().to_string(),
                        sport: sport.to_string(),
                        start_time,
                        odds: outcome.price,
                    });
                }
            }
        }
    }

    quotes
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Median of the given probabilities; 0.0 when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Consensus probability for every key present in `quotes`.
pub fn consensus(quotes: &[Quote]) -> HashMap<&ConsensusKey, f64> {
    let mut grouped: HashMap<&ConsensusKey, Vec<f64>> = HashMap::new();
    for quote in quotes {
        grouped
            .entry(&quote.key)
            .or_default()
            .push(quote.implied_probability());
    }

    grouped
        .into_iter()
        .map(|(key, probs)| (key, median(&probs)))
        .collect()
}

// ---------------------------------------------------------------------------
// Edge calculation
// ---------------------------------------------------------------------------

/// Score every valid quote against its consensus.
///
/// A quote contributes to the consensus it is compared against, so a lone
/// quote always has zero edge. Output order is unspecified.
pub fn compute_bets(events: &[Event], now: DateTime<Utc>) -> Vec<Bet> {
    let quotes = collect_quotes(events, now);
    let consensus = consensus(&quotes);

    let bets: Vec<Bet> = quotes
        .iter()
        .map(|quote| {
            let p_cons = consensus.get(&quote.key).copied().unwrap_or(0.0);
            Bet {
                event: quote.event.clone(),
                bookmaker: quote.bookmaker.clone(),
                market: quote.key.market.clone(),
                selection: quote.key.selection.clone(),
                odds: quote.odds,
                edge: p_cons - quote.implied_probability(),
                sport: quote.sport.clone(),
                start_time: quote.start_time,
            }
        })
        .collect();

    debug!(
        events = events.len(),
        quotes = quotes.len(),
        keys = consensus.len(),
        "Edges computed"
    );

    bets
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookmakerOdds, MarketOdds, OutcomeOdds};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn bookmaker(name: &str, prices: &[(&str, f64)]) -> BookmakerOdds {
        BookmakerOdds {
            key: Some(name.to_lowercase()),
            title: Some(name.to_string()),
            markets: vec![MarketOdds {
                key: Some("h2h".into()),
                outcomes: prices
                    .iter()
                    .map(|(sel, price)| OutcomeOdds {
                        name: Some(sel.to_string()),
                        price: *price,
                        point: None,
                    })
                    .collect(),
            }],
        }
    }

    fn event(id: &str, bookmakers: Vec<BookmakerOdds>) -> Event {
        Event {
            id: Some(id.into()),
            sport_key: Some("soccer_epl".into()),
            sport_title: Some("EPL".into()),
            commence_time: Some("2026-03-01T15:00:00Z".into()),
            home_team: Some("Arsenal".into()),
            away_team: Some("Chelsea".into()),
            bookmakers,
        }
    }

    fn edge_of(bets: &[Bet], bookmaker: &str, selection: &str) -> f64 {
        bets.iter()
            .find(|b| b.bookmaker == bookmaker && b.selection == selection)
            .map(|b| b.edge)
            .unwrap()
    }

    #[test]
    fn test_median_odd_count() {
        assert!((median(&[0.6, 0.4, 0.5]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_median_even_count() {
        assert!((median(&[0.9, 0.3, 0.7, 0.5]) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_two_bookmaker_scenario() {
        let events = vec![event(
            "e1",
            vec![bookmaker("A", &[("Arsenal", 2.0)]), bookmaker("B", &[("Arsenal", 2.5)])],
        )];
        let bets = compute_bets(&events, now());
        assert_eq!(bets.len(), 2);
        assert!((edge_of(&bets, "A", "Arsenal") + 0.05).abs() < 1e-12);
        assert!((edge_of(&bets, "B", "Arsenal") - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_single_quote_has_zero_edge() {
        let events = vec![event("e1", vec![bookmaker("A", &[("Arsenal", 1.9), ("Chelsea", 4.2)])])];
        let bets = compute_bets(&events, now());
        assert_eq!(bets.len(), 2);
        assert!(bets.iter().all(|b| b.edge.abs() < 1e-12));
    }

    #[test]
    fn test_invalid_odds_are_skipped() {
        let events = vec![event(
            "e1",
            vec![
                bookmaker("A", &[("Arsenal", 1.0), ("Chelsea", 0.0)]),
                bookmaker("B", &[("Arsenal", 2.0), ("Chelsea", -3.0)]),
            ],
        )];
        let bets = compute_bets(&events, now());
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].bookmaker, "B");
        // The 1.0 quote must not drag the consensus.
        assert!(bets[0].edge.abs() < 1e-12);
    }

    #[test]
    fn test_event_with_no_valid_quotes() {
        let events = vec![
            event(
                "dead",
                vec![bookmaker("A", &[("Arsenal", 1.0)]), bookmaker("B", &[("Chelsea", 0.5)])],
            ),
            event("live", vec![bookmaker("A", &[("Arsenal", 2.0)])]),
        ];
        let bets = compute_bets(&events, now());
        assert_eq!(bets.len(), 1);
    }

    #[test]
    fn test_three_bookmaker_median() {
        // Implied probabilities 0.4, 0.5, 0.625 → consensus 0.5.
        let events = vec![event(
            "e1",
            vec![
                bookmaker("A", &[("Arsenal", 2.5)]),
                bookmaker("B", &[("Arsenal", 2.0)]),
                bookmaker("C", &[("Arsenal", 1.6)]),
            ],
        )];
        let bets = compute_bets(&events, now());
        assert!((edge_of(&bets, "A", "Arsenal") - 0.1).abs() < 1e-12);
        assert!(edge_of(&bets, "B", "Arsenal").abs() < 1e-12);
        assert!((edge_of(&bets, "C", "Arsenal") + 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_keys_separate_events_and_selections() {
        let events = vec![
            event(
                "e1",
                vec![bookmaker("A", &[("Arsenal", 2.0)]), bookmaker("B", &[("Chelsea", 4.0)])],
            ),
            event("e2", vec![bookmaker("C", &[("Arsenal", 3.0)])]),
        ];
        let bets = compute_bets(&events, now());
        assert_eq!(bets.len(), 3);
        assert!(bets.iter().all(|b| b.edge.abs() < 1e-12));
    }

    #[test]
    fn test_missing_event_fields_fall_back() {
        let events = vec![Event {
            bookmakers: vec![bookmaker("A", &[("X", 2.0)]), bookmaker("B", &[("X", 2.5)])],
            ..Default::default()
        }];
        let bets = compute_bets(&events, now());
        assert_eq!(bets.len(), 2);
        assert_eq!(bets[0].sport, "unknown");
        assert_eq!(bets[0].event, "unknown vs unknown");
        assert_eq!(bets[0].start_time, now());
        // Both quotes share a synthesized id, so they form one consensus.
        assert!((edge_of(&bets, "B", "X") - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_bet_carries_context() {
        let events = vec![event("e1", vec![bookmaker("A", &[("Arsenal", 2.0)])])];
        let bet = &compute_bets(&events, now())[0];
        assert_eq!(bet.event, "Arsenal vs Chelsea");
        assert_eq!(bet.market, "h2h");
        assert_eq!(bet.sport, "EPL");
        assert_eq!(bet.odds, 2.0);
        assert_eq!(bet.start_time, Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_collect_quotes_from_json() {
        let json = r#"[{
            "id": "x1",
            "sport_title": "NBA",
            "commence_time": "2026-03-02T01:00:00Z",
            "home_team": "Lakers",
            "away_team": "Celtics",
            "bookmakers": [{
                "key": "bet365",
                "title": "Bet365",
                "markets": [{"key": "h2h", "outcomes": [
                    {"name": "Lakers", "price": "1.95"},
                    {"name": "Celtics", "price": null}
                ]}]
            }]
        }]"#;
        let events: Vec<Event> = serde_json::from_str(json).unwrap();
        let quotes = collect_quotes(&events, now());
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].bookmaker, "Bet365");
        assert!((quotes[0].implied_probability() - 1.0 / 1.95).abs() < 1e-12);
    }
}
