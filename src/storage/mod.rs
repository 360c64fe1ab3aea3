//! Persistence layer.
//!
//! SQLite-backed bet tracking: a `settings` key/value table, a `bets`
//! table whose rows move `active → registered`, and an append-only
//! `history` log of registrations. Timestamps are stored as RFC 3339
//! text at second precision in UTC so they compare lexicographically.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::*;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::strategy::filter::{percent_to_fraction, window_end};
use crate::types::{Bet, BetStatus, HistoryEntry, Settings, Stats, TrackedBet};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bets (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event         TEXT NOT NULL,
    bookmaker     TEXT NOT NULL,
    market        TEXT NOT NULL,
    selection     TEXT NOT NULL,
    odds          REAL NOT NULL,
    edge          REAL NOT NULL,
    sport         TEXT NOT NULL,
    start_time    TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'active',
    stake         REAL,
    registered_at TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bets_status_edge ON bets(status, edge);

CREATE TABLE IF NOT EXISTS history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    bet_id        INTEGER NOT NULL REFERENCES bets(id),
    event         TEXT NOT NULL,
    bookmaker     TEXT NOT NULL,
    market        TEXT NOT NULL,
    selection     TEXT NOT NULL,
    odds          REAL NOT NULL,
    edge          REAL NOT NULL,
    stake         REAL NOT NULL,
    registered_at TEXT NOT NULL
);
"#;

const BET_COLUMNS: &str = "id, event, bookmaker, market, selection, odds, edge, sport, \
                           start_time, status, stake, registered_at, created_at";

/// Default number of history rows returned.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Query filter
// ---------------------------------------------------------------------------

/// Filters for listing active tracked bets.
///
/// Edge bounds are percentages; `bookmakers` is a comma-separated
/// allow-list; `page` is 1-based.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackedQuery {
    pub edge_min: Option<f64>,
    pub edge_max: Option<f64>,
    pub hours_before: Option<i64>,
    pub bookmakers: Option<String>,
    pub page: Option<u32>,
}

impl TrackedQuery {
    /// Lower-cased, trimmed bookmaker allow-list.
    pub fn bookmaker_list(&self) -> Vec<String> {
        self.bookmakers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|b| b.trim().to_lowercase())
            .filter(|b| !b.is_empty())
            .collect()
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct BetRow {
    id: i64,
    event: String,
    bookmaker: String,
    market: String,
    selection: String,
    odds: f64,
    edge: f64,
    sport: String,
    start_time: String,
    status: BetStatus,
    stake: Option<f64>,
    registered_at: Option<String>,
    created_at: String,
}

impl TryFrom<BetRow> for TrackedBet {
    type Error = StoreError;

    fn try_from(row: BetRow) -> Result<Self, Self::Error> {
        Ok(TrackedBet {
            id: row.id,
            event: row.event,
            bookmaker: row.bookmaker,
            market: row.market,
            selection: row.selection,
            odds: row.odds,
            edge: row.edge,
            sport: row.sport,
            start_time: parse_ts(&row.start_time)?,
            status: row.status,
            stake: row.stake.map(money),
            registered_at: row.registered_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&row.created_at)?,
            suggested_stake: None,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    bet_id: i64,
    event: String,
    bookmaker: String,
    market: String,
    selection: String,
    odds: f64,
    edge: f64,
    stake: f64,
    registered_at: String,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            id: row.id,
            bet_id: row.bet_id,
            event: row.event,
            bookmaker: row.bookmaker,
            market: row.market,
            selection: row.selection,
            odds: row.odds,
            edge: row.edge,
            stake: money(row.stake),
            registered_at: parse_ts(&row.registered_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total: i64,
    active: i64,
    registered: i64,
    staked: f64,
    avg_odds: f64,
    avg_edge: f64,
}

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

/// REAL column → money, rounded to cents.
fn money(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(2)
}

fn to_real(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the tracking database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BetStore {
    pool: SqlitePool,
}

impl BetStore {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(database_url, "Tracking store opened");
        Ok(store)
    }

    /// A private in-memory database (useful for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    // -- Settings ----------------------------------------------------------

    /// Stored settings, with defaults for any key not yet written.
    pub async fn load_settings(&self) -> Result<Settings, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        let mut settings = Settings::default();
        for (key, value) in rows {
            let applied = match key.as_str() {
                "bankroll" => Decimal::from_str(&value).map(|v| settings.bankroll = v).is_ok(),
                "kelly_fraction" => {
                    value.parse::<f64>().map(|v| settings.kelly_fraction = v).is_ok()
                }
                "min_stake" => Decimal::from_str(&value).map(|v| settings.min_stake = v).is_ok(),
                "max_stake" => Decimal::from_str(&value).map(|v| settings.max_stake = v).is_ok(),
                "page_size" => value.parse::<u32>().map(|v| settings.page_size = v).is_ok(),
                _ => true,
            };
            if !applied {
                warn!(key = %key, value = %value, "Ignoring unparseable setting");
            }
        }
        Ok(settings)
    }

    /// Validate and persist every setting.
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        settings.validate().map_err(StoreError::Invalid)?;

        let pairs = [
            ("bankroll", settings.bankroll.to_string()),
            ("kelly_fraction", settings.kelly_fraction.to_string()),
            ("min_stake", settings.min_stake.to_string()),
            ("max_stake", settings.max_stake.to_string()),
            ("page_size", settings.page_size.to_string()),
        ];

        let mut tx = self.pool.begin().await?;
        for (key, value) in pairs {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(
            bankroll = %settings.bankroll,
            kelly_fraction = settings.kelly_fraction,
            page_size = settings.page_size,
            "Settings saved"
        );
        Ok(())
    }

    // -- Bets --------------------------------------------------------------

    /// Start tracking a computed bet. The new row is `active`.
    pub async fn insert_bet(&self, bet: &Bet) -> Result<TrackedBet, StoreError> {
        let id = Self::insert_row(&self.pool, bet, Utc::now()).await?;
        debug!(id, event = %bet.event, "Bet tracked");
        self.get_bet(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("bet {id} vanished after insert")))
    }

    async fn insert_row<'e, E>(
        executor: E,
        bet: &Bet,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT INTO bets \
             (event, bookmaker, market, selection, odds, edge, sport, start_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bet.event)
        .bind(&bet.bookmaker)
        .bind(&bet.market)
        .bind(&bet.selection)
        .bind(bet.odds)
        .bind(bet.edge)
        .bind(&bet.sport)
        .bind(format_ts(bet.start_time))
        .bind(format_ts(now))
        .execute(executor)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert `bets` only when the table is empty. Returns rows inserted.
    pub async fn seed_if_empty(&self, bets: &[Bet]) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bets")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            debug!(count, "Store already populated, skipping seed");
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for bet in bets {
            Self::insert_row(&mut *tx, bet, now).await?;
        }
        tx.commit().await?;

        info!(count = bets.len(), "Seeded tracked bets");
        Ok(bets.len())
    }

    pub async fn get_bet(&self, id: i64) -> Result<Option<TrackedBet>, StoreError> {
        let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = ?");
        let row: Option<BetRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TrackedBet::try_from).transpose()
    }

    /// One page of active bets matching `query`, best edge first.
    pub async fn list_active(
        &self,
        query: &TrackedQuery,
        now: DateTime<Utc>,
        page_size: u32,
    ) -> Result<Vec<TrackedBet>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {BET_COLUMNS} FROM bets WHERE status = 'active'"
        ));

        if let Some(min) = query.edge_min {
            qb.push(" AND edge >= ").push_bind(percent_to_fraction(min));
        }
        if let Some(max) = query.edge_max {
            qb.push(" AND edge <= ").push_bind(percent_to_fraction(max));
        }
        if let Some(end) = query.hours_before.and_then(|h| window_end(now, h)) {
            qb.push(" AND start_time <= ").push_bind(format_ts(end));
        }
        let bookmakers = query.bookmaker_list();
        if !bookmakers.is_empty() {
            qb.push(" AND lower(bookmaker) IN (");
            let mut list = qb.separated(", ");
            for bookmaker in bookmakers {
                list.push_bind(bookmaker);
            }
            list.push_unseparated(")");
        }

        let page_size = i64::from(page_size.max(1));
        let offset = i64::from(query.page() - 1) * page_size;
        qb.push(" ORDER BY edge DESC, id ASC LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<BetRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(TrackedBet::try_from).collect()
    }

    /// Move an active bet to `registered` and log it.
    ///
    /// Fails with `NotFound` if the bet does not exist or is already
    /// registered; nothing is written in that case.
    pub async fn register(
        &self,
        bet_id: i64,
        stake: Decimal,
        now: DateTime<Utc>,
    ) -> Result<HistoryEntry, StoreError> {
        let registered_at = format_ts(now);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE bets SET status = 'registered', stake = ?, registered_at = ? \
             WHERE id = ? AND status = 'active'",
        )
        .bind(to_real(stake))
        .bind(&registered_at)
        .bind(bet_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "bet {bet_id} not found or already registered"
            )));
        }

        let row: BetRow = sqlx::query_as(&format!("SELECT {BET_COLUMNS} FROM bets WHERE id = ?"))
            .bind(bet_id)
            .fetch_one(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO history \
             (bet_id, event, bookmaker, market, selection, odds, edge, stake, registered_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(bet_id)
        .bind(&row.event)
        .bind(&row.bookmaker)
        .bind(&row.market)
        .bind(&row.selection)
        .bind(row.odds)
        .bind(row.edge)
        .bind(to_real(stake))
        .bind(&registered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(bet_id, stake = %stake, event = %row.event, "Bet registered");

        Ok(HistoryEntry {
            id: inserted.last_insert_rowid(),
            bet_id,
            event: row.event,
            bookmaker: row.bookmaker,
            market: row.market,
            selection: row.selection,
            odds: row.odds,
            edge: row.edge,
            stake: money(to_real(stake)),
            registered_at: parse_ts(&registered_at)?,
        })
    }

    // -- History & stats ---------------------------------------------------

    /// Most recent registrations first.
    pub async fn history(&self, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, bet_id, event, bookmaker, market, selection, odds, edge, stake, \
                    registered_at \
             FROM history ORDER BY registered_at DESC, id DESC LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    pub async fn stats(&self) -> Result<Stats, StoreError> {
        let row: StatsRow = sqlx::query_as(
            "SELECT \
                COUNT(*) AS total, \
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active, \
                COALESCE(SUM(CASE WHEN status = 'registered' THEN 1 ELSE 0 END), 0) AS registered, \
                CAST(COALESCE(SUM(stake), 0) AS REAL) AS staked, \
                CAST(COALESCE(AVG(CASE WHEN status = 'registered' THEN odds END), 0) AS REAL) \
                    AS avg_odds, \
                CAST(COALESCE(AVG(CASE WHEN status = 'registered' THEN edge END), 0) AS REAL) \
                    AS avg_edge \
             FROM bets",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            total_bets: row.total,
            active_bets: row.active,
            registered_bets: row.registered,
            total_staked: money(row.staked),
            average_odds: row.avg_odds,
            average_edge: row.avg_edge,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
