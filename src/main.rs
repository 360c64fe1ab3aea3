//! ODDSEDGE — sports odds republisher.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the tracking store (seeding it on first run), wires the odds
//! source behind a TTL cache and serves the HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use oddsedge::api::{self, ApiState};
use oddsedge::config::{AppConfig, SourceKind};
use oddsedge::data::cache::{CachedOddsSource, SystemClock};
use oddsedge::data::odds_api::OddsApiClient;
use oddsedge::data::sample::SampleOddsSource;
use oddsedge::data::OddsSource;
use oddsedge::storage::BetStore;
use oddsedge::strategy::edge::compute_bets;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::default_path();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        source = ?cfg.odds.source,
        default_sport = %cfg.odds.default_sport,
        cache_ttl_secs = cfg.odds.cache_ttl_secs,
        "ODDSEDGE starting up"
    );

    // -- Odds source -------------------------------------------------------

    let upstream: Arc<dyn OddsSource> = match cfg.odds.source {
        SourceKind::Sample => {
            info!("Using built-in sample odds");
            Arc::new(SampleOddsSource::new())
        }
        SourceKind::OddsApi => {
            let key = cfg.odds.api_key();
            if key.is_none() {
                warn!(
                    env = %cfg.odds.api_key_env,
                    "No odds API key configured; upstream requests will fail"
                );
            }
            Arc::new(OddsApiClient::new(&cfg.odds, key)?)
        }
    };

    let source: Arc<dyn OddsSource> = Arc::new(CachedOddsSource::new(
        upstream,
        cfg.odds.request_shape(),
        Duration::seconds(cfg.odds.cache_ttl_secs),
        Arc::new(SystemClock),
    ));

    // -- Tracking store ----------------------------------------------------

    let store = BetStore::open(&cfg.store.database_url)
        .await
        .with_context(|| format!("Failed to open tracking store: {}", cfg.store.database_url))?;

    if cfg.store.seed_sample {
        let now = Utc::now();
        let seeded = store
            .seed_if_empty(&compute_bets(&SampleOddsSource::events_at(now), now))
            .await
            .context("Failed to seed tracking store")?;
        if seeded > 0 {
            info!(seeded, "Tracking store seeded from sample odds");
        }
    }

    // -- Serve -------------------------------------------------------------

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| {
            format!("Invalid listen address {}:{}", cfg.server.host, cfg.server.port)
        })?;

    let state = Arc::new(ApiState {
        source,
        store,
        default_sport: cfg.odds.default_sport.clone(),
        max_results: cfg.edge.max_results,
    });

    api::serve(state, addr).await?;

    info!("ODDSEDGE shut down cleanly");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oddsedge=info,tower_http=info"));

    let json_logging = std::env::var("ODDSEDGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
