//! End-to-end API flows.
//!
//! Wires `MockSource` behind the TTL cache with a manual clock, serves
//! the real router, and tracks bets in an on-disk SQLite store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use oddsedge::api::{build_router, ApiState};
use oddsedge::data::cache::{CachedOddsSource, ManualClock};
use oddsedge::data::OddsSource;
use oddsedge::storage::BetStore;

use crate::mock_source::{h2h_event, Failure, MockSource};

struct Harness {
    app: Router,
    mock: Arc<MockSource>,
    clock: Arc<ManualClock>,
}

fn events() -> Vec<oddsedge::types::Event> {
    let start = Utc::now() + Duration::hours(3);
    vec![
        h2h_event(
            "basketball_nba",
            "Celtics",
            "Lakers",
            start,
            &[("BookA", 2.0, 1.9), ("BookB", 2.5, 1.8)],
        ),
        h2h_event(
            "icehockey_nhl",
            "Bruins",
            "Rangers",
            start + Duration::hours(24),
            &[("BookA", 1.0, 2.2), ("BookC", 0.0, 2.2)],
        ),
    ]
}

async fn harness(store: BetStore) -> Harness {
    let mock = Arc::new(MockSource::new(events()));
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));

    let inner: Arc<dyn OddsSource> = mock.clone();
    let source: Arc<dyn OddsSource> = Arc::new(CachedOddsSource::new(
        inner,
        "us:h2h",
        Duration::seconds(300),
        clock.clone(),
    ));

    let state = Arc::new(ApiState {
        source,
        store,
        default_sport: "upcoming".to_string(),
        max_results: 200,
    });

    Harness {
        app: build_router(state),
        mock,
        clock,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn consensus_edges_are_symmetric_around_median() {
    let h = harness(BetStore::in_memory().await.unwrap()).await;
    let (status, json) = get(&h.app, "/bets?sport_key=basketball_nba").await;
    assert_eq!(status, StatusCode::OK);

    let bets = json.as_array().unwrap();
    assert_eq!(bets.len(), 4);

    let celtics: Vec<(&str, f64)> = bets
        .iter()
        .filter(|b| b["selection"] == "Celtics")
        .map(|b| (b["bookmaker"].as_str().unwrap(), b["edge"].as_f64().unwrap()))
        .collect();
    for (book, edge) in celtics {
        let expected = if book == "BookB" { 0.05 } else { -0.05 };
        assert!((edge - expected).abs() < 1e-9, "{book}: {edge}");
    }

    assert_eq!(bets[0]["event"], "Celtics vs Lakers");
    assert_eq!(bets[0]["sport"], "basketball_nba");
}

#[tokio::test]
async fn invalid_quotes_are_dropped_and_single_quotes_score_zero() {
    let h = harness(BetStore::in_memory().await.unwrap()).await;
    let (_, json) = get(&h.app, "/bets?sport_key=icehockey_nhl").await;
    let bets = json.as_array().unwrap();

    // Only the two 2.2 Rangers quotes survive; they agree, so edge is zero.
    assert_eq!(bets.len(), 2);
    assert!(bets.iter().all(|b| b["selection"] == "Rangers"));
    assert!(bets.iter().all(|b| b["edge"].as_f64().unwrap().abs() < 1e-12));
}

#[tokio::test]
async fn edge_min_zero_keeps_non_negative_subset() {
    let h = harness(BetStore::in_memory().await.unwrap()).await;
    let (_, all) = get(&h.app, "/bets").await;
    let (_, positive) = get(&h.app, "/bets?edge_min=0").await;

    let expected = all
        .as_array()
        .unwrap()
        .iter()
        .filter(|b| b["edge"].as_f64().unwrap() >= 0.0)
        .count();
    assert_eq!(positive.as_array().unwrap().len(), expected);

    let (_, windowed) = get(&h.app, "/bets?edge_min=5&edge_max=10").await;
    assert!(windowed
        .as_array()
        .unwrap()
        .iter()
        .all(|b| (0.05 - 1e-9..=0.10 + 1e-9).contains(&b["edge"].as_f64().unwrap())));
}

#[tokio::test]
async fn repeated_requests_hit_cache_until_ttl() {
    let h = harness(BetStore::in_memory().await.unwrap()).await;

    get(&h.app, "/bets?sport_key=basketball_nba").await;
    get(&h.app, "/bookmakers?sport_key=basketball_nba").await;
    assert_eq!(h.mock.calls(), 1);

    h.clock.advance(Duration::seconds(299));
    get(&h.app, "/bets?sport_key=basketball_nba").await;
    assert_eq!(h.mock.calls(), 1);

    h.clock.advance(Duration::seconds(1));
    get(&h.app, "/bets?sport_key=basketball_nba").await;
    assert_eq!(h.mock.calls(), 2);

    // A different sport is a different cache entry.
    get(&h.app, "/bets?sport_key=icehockey_nhl").await;
    assert_eq!(h.mock.calls(), 3);
}

#[tokio::test]
async fn upstream_failures_map_to_status_and_are_not_cached() {
    let h = harness(BetStore::in_memory().await.unwrap()).await;

    h.mock.set_failure(Some(Failure::Unauthorized));
    let (status, json) = get(&h.app, "/bets").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("authentication"));

    h.mock.set_failure(Some(Failure::RateLimited));
    let (status, _) = get(&h.app, "/sports").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    h.mock.set_failure(None);
    let (status, json) = get(&h.app, "/sports").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!(["basketball_nba", "icehockey_nhl"]));
}

#[tokio::test]
async fn track_register_and_report_persist_across_reopen() {
    let mut path = std::env::temp_dir();
    path.push(format!("oddsedge_it_{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());

    {
        let h = harness(BetStore::open(&url).await.unwrap()).await;

        let (_, bets) = get(&h.app, "/bets?sport_key=basketball_nba&edge_min=0").await;
        for bet in bets.as_array().unwrap() {
            let (status, _) = post(&h.app, "/tracked", bet.clone()).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, tracked) = get(&h.app, "/tracked?bookmakers=bookb").await;
        let tracked = tracked.as_array().unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0]["selection"], "Celtics");
        assert!(tracked[0]["suggested_stake"].as_f64().unwrap() > 0.0);
        let bet_id = tracked[0]["id"].as_i64().unwrap();

        let register = json!({"bet_id": bet_id, "stake": 20.5});
        let (status, entry) = post(&h.app, "/register", register.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["stake"].as_f64().unwrap(), 20.5);

        let (status, err) = post(&h.app, "/register", register).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(err["error"].as_str().is_some());

        let (status, _) = post(&h.app, "/register", json!({"bet_id": 9999, "stake": 1})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let h = harness(BetStore::open(&url).await.unwrap()).await;
    let (_, history) = get(&h.app, "/history?limit=10").await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (_, stats) = get(&h.app, "/stats").await;
    assert_eq!(stats["total_bets"], 2);
    assert_eq!(stats["active_bets"], 1);
    assert_eq!(stats["registered_bets"], 1);
    assert_eq!(stats["total_staked"].as_f64().unwrap(), 20.5);

    drop(h);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn settings_drive_page_size_and_stakes() {
    let h = harness(BetStore::in_memory().await.unwrap()).await;

    let (_, bets) = get(&h.app, "/bets").await;
    for bet in bets.as_array().unwrap() {
        post(&h.app, "/tracked", bet.clone()).await;
    }

    let (status, _) = post(
        &h.app,
        "/settings",
        json!({
            "bankroll": 1000,
            "kelly_fraction": 1.0,
            "min_stake": 1,
            "max_stake": 5,
            "page_size": 2
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, page1) = get(&h.app, "/tracked").await;
    let (_, page2) = get(&h.app, "/tracked?page=2").await;
    let page1 = page1.as_array().unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page2.as_array().unwrap().len(), 2);
    assert!(page1[0]["edge"].as_f64().unwrap() >= page1[1]["edge"].as_f64().unwrap());
    // Positive edges are capped at max_stake.
    assert_eq!(page1[0]["suggested_stake"].as_f64().unwrap(), 5.0);
}
