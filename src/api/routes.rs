//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use crate::data::{bookmaker_names, OddsSource};
use crate::storage::{BetStore, TrackedQuery, DEFAULT_HISTORY_LIMIT};
use crate::strategy::{filter::BetQuery, kelly, rank_bets};
use crate::types::{Bet, HistoryEntry, Settings, Stats, TrackedBet};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub source: Arc<dyn OddsSource>,
    pub store: BetStore,
    /// Sport key used when a request omits `sport_key`.
    pub default_sport: String,
    pub max_results: usize,
}

impl ApiState {
    fn sport_key<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_sport.as_str())
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SportQuery {
    pub sport_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub bet_id: i64,
    pub stake: Decimal,
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// GET /sports
pub async fn get_sports(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.source.sports().await?))
}

/// GET /bookmakers
pub async fn get_bookmakers(
    State(state): State<AppState>,
    query: Result<Query<SportQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(query) = query?;
    let sport_key = state.sport_key(query.sport_key.as_deref());
    let events = state.source.events(sport_key).await?;
    Ok(Json(bookmaker_names(&events)))
}

/// GET /bets
pub async fn get_bets(
    State(state): State<AppState>,
    query: Result<Query<BetQuery>, QueryRejection>,
) -> Result<Json<Vec<Bet>>, ApiError> {
    let Query(query) = query?;
    let sport_key = state.sport_key(query.sport_key.as_deref());
    let events = state.source.events(sport_key).await?;
    Ok(Json(rank_bets(&events, &query, Utc::now(), state.max_results)))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "time": Utc::now().to_rfc3339() }))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// GET /settings
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.store.load_settings().await?))
}

/// POST /settings
pub async fn put_settings(
    State(state): State<AppState>,
    body: Result<Json<Settings>, JsonRejection>,
) -> Result<Json<Settings>, ApiError> {
    let Json(settings) = body?;
    state.store.save_settings(&settings).await?;
    Ok(Json(settings))
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

/// GET /tracked
pub async fn get_tracked(
    State(state): State<AppState>,
    query: Result<Query<TrackedQuery>, QueryRejection>,
) -> Result<Json<Vec<TrackedBet>>, ApiError> {
    let Query(query) = query?;
    let settings = state.store.load_settings().await?;
    let mut bets = state
        .store
        .list_active(&query, Utc::now(), settings.page_size)
        .await?;
    for bet in &mut bets {
        bet.suggested_stake = kelly::suggest_stake(bet.odds, bet.edge, &settings);
    }
    Ok(Json(bets))
}

/// POST /tracked
pub async fn post_tracked(
    State(state): State<AppState>,
    body: Result<Json<Bet>, JsonRejection>,
) -> Result<(StatusCode, Json<TrackedBet>), ApiError> {
    let Json(bet) = body?;
    if !(bet.odds > 1.0) {
        return Err(ApiError::BadRequest(format!("odds must exceed 1.0, got {}", bet.odds)));
    }
    let tracked = state.store.insert_bet(&bet).await?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

/// POST /register
pub async fn post_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<HistoryEntry>, ApiError> {
    let Json(req) = body?;
    if req.stake <= Decimal::ZERO {
        return Err(ApiError::BadRequest(format!("stake must be positive, got {}", req.stake)));
    }
    let entry = state.store.register(req.bet_id, req.stake, Utc::now()).await?;
    info!(bet_id = entry.bet_id, history_id = entry.id, "Registration recorded");
    Ok(Json(entry))
}

/// GET /history
pub async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.store.history(limit).await?))
}

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.store.stats().await?))
}
