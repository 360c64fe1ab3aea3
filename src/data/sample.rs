//! Built-in sample odds.
//!
//! A fixed set of events used when no upstream source is configured and
//! for seeding the tracking store. Start times are relative to the
//! moment of the request so time-window filters behave realistically.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{OddsSource, SourceError};
use crate::types::{BookmakerOdds, Event, MarketOdds, OutcomeOdds};

pub const FOOTBALL: &str = "soccer_la_liga";
pub const TENNIS: &str = "tennis_atp";

/// Offline `OddsSource` with deterministic prices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleOddsSource;

impl SampleOddsSource {
    pub fn new() -> Self {
        Self
    }

    /// All sample events with start times anchored at `now`.
    pub fn events_at(now: DateTime<Utc>) -> Vec<Event> {
        vec![
            event(
                "sample-football-1",
                FOOTBALL,
                "La Liga",
                now + Duration::hours(2),
                ("Team A", "Team B"),
                "1x2",
                &[
                    ("Bet365", &[("Team A", 2.10), ("Draw", 3.30), ("Team B", 3.60)]),
                    ("William Hill", &[("Team A", 1.95), ("Draw", 3.40), ("Team B", 3.90)]),
                    ("Unibet", &[("Team A", 2.00), ("Draw", 3.25), ("Team B", 3.75)]),
                ],
            ),
            event(
                "sample-tennis-1",
                TENNIS,
                "ATP",
                now + Duration::hours(5),
                ("Player X", "Player Y"),
                "h2h",
                &[
                    ("Bet365", &[("Player X", 2.05), ("Player Y", 1.75)]),
                    ("William Hill", &[("Player X", 2.20), ("Player Y", 1.80)]),
                    ("Pinnacle", &[("Player X", 2.12), ("Player Y", 1.72)]),
                    ("Unibet", &[("Player X", 2.00), ("Player Y", 1.85)]),
                ],
            ),
        ]
    }
}

type BookPrices<'a> = (&'a str, &'a [(&'a str, f64)]);

fn event(
    id: &str,
    sport_key: &str,
    sport_title: &str,
    start: DateTime<Utc>,
    (home, away): (&str, &str),
    market: &str,
    books: &[BookPrices<'_>],
) -> Event {
    Event {
        id: Some(id.to_string()),
        sport_key: Some(sport_key.to_string()),
        sport_title: Some(sport_title.to_string()),
        commence_time: Some(start.to_rfc3339()),
        home_team: Some(home.to_string()),
        away_team: Some(away.to_string()),
        bookmakers: books
            .iter()
            .map(|(name, prices)| BookmakerOdds {
                key: Some(name.to_lowercase().replace(' ', "")),
                title: Some(name.to_string()),
                markets: vec![MarketOdds {
                    key: Some(market.to_string()),
                    outcomes: prices
                        .iter()
                        .map(|(selection, price)| OutcomeOdds {
                            name: Some(selection.to_string()),
                            price: *price,
                            point: None,
                        })
                        .collect(),
                }],
            })
            .collect(),
    }
}

#[async_trait]
impl OddsSource for SampleOddsSource {
    async fn sports(&self) -> Result<Vec<String>, SourceError> {
        Ok(vec![FOOTBALL.to_string(), TENNIS.to_string()])
    }

    /// `"upcoming"` returns every sample event, like the upstream API.
    async fn events(&self, sport_key: &str) -> Result<Vec<Event>, SourceError> {
        let events = Self::events_at(Utc::now());
        if sport_key == "upcoming" {
            return Ok(events);
        }
        Ok(events
            .into_iter()
            .filter(|e| e.sport_key.as_deref() == Some(sport_key))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
