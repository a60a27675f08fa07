//! Durable store
//!
//! SQLite-backed persistence for flushed aggregates and latest prices.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use marketflow_core::{AggregateRecord, Extreme, LatestTable, MarketflowError, Pair, Source, Tick};

/// Durable relational collaborator
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist one merged record per key
    async fn save_aggregated(
        &self,
        records: &HashMap<String, AggregateRecord>,
    ) -> Result<(), StoreError>;

    /// Upsert the latest tick per (source, pair)
    async fn save_latest(&self, latest: &LatestTable) -> Result<(), StoreError>;

    async fn latest_by_source(
        &self,
        source: Source,
        pair: Pair,
    ) -> Result<Option<Tick>, StoreError>;

    /// Most recent latest price for `pair` across every source
    async fn latest_by_all(&self, pair: Pair) -> Result<Option<Tick>, StoreError>;

    /// Highest max or lowest min, over the whole history when `period` is None
    async fn extreme(
        &self,
        op: Extreme,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError>;

    /// Mean of the stored averages
    async fn average(
        &self,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError>;

    async fn check_health(&self) -> Result<(), StoreError>;
}

/// Store implementation using SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS aggregated_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair TEXT NOT NULL,
                source TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                avg_price REAL NOT NULL,
                min_price REAL NOT NULL,
                max_price REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_aggregated_market
            ON aggregated_prices(source, pair, stored_at);

            CREATE TABLE IF NOT EXISTS latest_prices (
                source TEXT NOT NULL,
                pair TEXT NOT NULL,
                price REAL NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (source, pair)
            );
            "#,
        )?;

        Ok(())
    }

    /// Lower bound of the trailing window in epoch millis
    fn window_start(period: Option<Duration>) -> i64 {
        match period {
            Some(period) => Utc::now().timestamp_millis() - period.as_millis() as i64,
            None => i64::MIN,
        }
    }

    /// Run an aggregate query returning `(value, newest stored_at)`
    fn query_stat(
        &self,
        sql: &str,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        let (value, stored_at): (Option<f64>, Option<i64>) = conn.query_row(
            sql,
            params![source.as_str(), pair.as_str(), Self::window_start(period)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(match (value, stored_at) {
            (Some(price), Some(timestamp)) => {
                Some(Tick::new(source.as_str(), pair.as_str(), price, timestamp))
            }
            _ => None,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_aggregated(
        &self,
        records: &HashMap<String, AggregateRecord>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO aggregated_prices (pair, source, stored_at, avg_price, min_price, max_price)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for record in records.values() {
                stmt.execute(params![
                    record.pair,
                    record.source,
                    record.timestamp.timestamp_millis(),
                    record.avg_price,
                    record.min_price,
                    record.max_price,
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    async fn save_latest(&self, latest: &LatestTable) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO latest_prices (source, pair, price, stored_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(source, pair) DO UPDATE SET
                    price = excluded.price,
                    stored_at = excluded.stored_at
                "#,
            )?;
            for (_, tick) in latest.iter() {
                stmt.execute(params![tick.source, tick.pair, tick.price, tick.timestamp])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    async fn latest_by_source(
        &self,
        source: Source,
        pair: Pair,
    ) -> Result<Option<Tick>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        let tick = conn
            .query_row(
                r#"
                SELECT source, pair, price, stored_at
                FROM latest_prices
                WHERE source = ?1 AND pair = ?2
                "#,
                params![source.as_str(), pair.as_str()],
                row_to_tick,
            )
            .optional()?;

        Ok(tick)
    }

    async fn latest_by_all(&self, pair: Pair) -> Result<Option<Tick>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        let tick = conn
            .query_row(
                r#"
                SELECT source, pair, price, stored_at
                FROM latest_prices
                WHERE pair = ?1
                ORDER BY stored_at DESC
                LIMIT 1
                "#,
                params![pair.as_str()],
                row_to_tick,
            )
            .optional()?;

        Ok(tick)
    }

    async fn extreme(
        &self,
        op: Extreme,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError> {
        let sql = match op {
            Extreme::Highest => {
                "SELECT MAX(max_price), MAX(stored_at) FROM aggregated_prices
                 WHERE source = ?1 AND pair = ?2 AND stored_at >= ?3"
            }
            Extreme::Lowest => {
                "SELECT MIN(min_price), MAX(stored_at) FROM aggregated_prices
                 WHERE source = ?1 AND pair = ?2 AND stored_at >= ?3"
            }
        };
        self.query_stat(sql, source, pair, period)
    }

    async fn average(
        &self,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError> {
        self.query_stat(
            "SELECT AVG(avg_price), MAX(stored_at) FROM aggregated_prices
             WHERE source = ?1 AND pair = ?2 AND stored_at >= ?3",
            source,
            pair,
            period,
        )
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn row_to_tick(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tick> {
    Ok(Tick {
        source: row.get(0)?,
        pair: row.get(1)?,
        price: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to acquire lock")]
    LockError,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for MarketflowError {
    fn from(err: StoreError) -> Self {
        MarketflowError::persistence(err.to_string())
    }
}
