//! Mock odds source for integration testing.
//!
//! A deterministic `OddsSource` that serves in-memory events, counts
//! upstream calls, and can be switched into a failing mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use oddsedge::data::{OddsSource, SourceError};
use oddsedge::types::{BookmakerOdds, Event, MarketOdds, OutcomeOdds};

/// How the mock should fail, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unauthorized,
    RateLimited,
}

pub struct MockSource {
    events: Mutex<Vec<Event>>,
    failure: Mutex<Option<Failure>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Force subsequent calls to fail (or succeed again with `None`).
    pub fn set_failure(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Number of `events()` / `sports()` calls that reached the mock.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.failure.lock().unwrap() {
            Some(Failure::Unauthorized) => Err(SourceError::Unauthorized("invalid api key".into())),
            Some(Failure::RateLimited) => Err(SourceError::RateLimited),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OddsSource for MockSource {
    async fn sports(&self) -> Result<Vec<String>, SourceError> {
        self.check()?;
        let mut keys: Vec<String> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.sport_key.clone())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn events(&self, sport_key: &str) -> Result<Vec<Event>, SourceError> {
        self.check()?;
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|e| sport_key == "upcoming" || e.sport_key.as_deref() == Some(sport_key))
            .cloned()
            .collect())
    }
}

/// A head-to-head event where each book prices `(home, away)`.
pub fn h2h_event(
    sport_key: &str,
    home: &str,
    away: &str,
    start: DateTime<Utc>,
    books: &[(&str, f64, f64)],
) -> Event {
    Event {
        id: None,
        sport_key: Some(sport_key.to_string()),
        sport_title: None,
        commence_time: Some(start.to_rfc3339()),
        home_team: Some(home.to_string()),
        away_team: Some(away.to_string()),
        bookmakers: books
            .iter()
            .map(|(book, home_price, away_price)| BookmakerOdds {
                key: None,
                title: Some(book.to_string()),
                markets: vec![MarketOdds {
                    key: Some("h2h".to_string()),
                    outcomes: vec![
                        OutcomeOdds {
                            name: Some(home.to_string()),
                            price: *home_price,
                            point: None,
                        },
                        OutcomeOdds {
                            name: Some(away.to_string()),
                            price: *away_price,
                            point: None,
                        },
                    ],
                }],
            })
            .collect(),
    }
}
