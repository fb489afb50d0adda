//! SQLite chart store.
//!
//! One row per chart in `pf_charts`, keyed by
//! `(symbol, box_size, reversal_boxes, scale, interval)`. Scalar state is
//! mirrored into columns for inspection; the full document lives in
//! `chart_data` as JSON text and is the only thing `load` reads back.
//!
//! The store owns a small tokio runtime and exposes a blocking API so it can
//! be called from rayon workers. Saves to the same key are serialised by a
//! per-key lock and replace the row inside one transaction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::runtime::Runtime;
use tracing::info;

use super::{ChartDocument, ChartStore, StoreError};
use crate::chart::Chart;
use crate::domain::{BoxScale, ChartParams, Interval};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS pf_charts (
        symbol TEXT NOT NULL,
        box_size TEXT NOT NULL,
        reversal_boxes INTEGER NOT NULL,
        scale TEXT NOT NULL,
        interval TEXT NOT NULL,
        current_direction TEXT NOT NULL,
        last_box_index INTEGER NOT NULL,
        last_value_seen TEXT,
        last_timestamp DATETIME,
        fingerprint TEXT NOT NULL,
        chart_data TEXT NOT NULL,
        updated_at DATETIME NOT NULL,
        PRIMARY KEY (symbol, box_size, reversal_boxes, scale, interval)
    )
"#;

const KEY_FILTER: &str =
    "symbol = ?1 AND box_size = ?2 AND reversal_boxes = ?3 AND scale = ?4 AND interval = ?5";

pub struct SqliteChartStore {
    pool: SqlitePool,
    path: PathBuf,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    runtime: Runtime,
}

/// Primary-key values of one chart row.
struct RowKey {
    symbol: String,
    box_size: String,
    reversal_boxes: i64,
    scale: &'static str,
    interval: &'static str,
}

impl RowKey {
    fn new(params: &ChartParams, interval: Interval) -> Self {
        Self {
            symbol: params.symbol().to_string(),
            box_size: params.box_size_label(),
            reversal_boxes: i64::from(params.reversal_boxes()),
            scale: params.scale().key(),
            interval: interval.as_str(),
        }
    }

    fn lock_name(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.symbol, self.box_size, self.reversal_boxes, self.scale, self.interval
        )
    }
}

impl SqliteChartStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pfchart-sqlite")
            .enable_all()
            .build()
            .map_err(StoreError::Runtime)?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = runtime.block_on(async {
            let pool = SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?;
            sqlx::query(CREATE_TABLE).execute(&pool).await?;
            Ok::<_, sqlx::Error>(pool)
        })?;

        info!(path = %path.display(), "opened chart database");
        Ok(Self {
            pool,
            path,
            key_locks: Mutex::new(HashMap::new()),
            runtime,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact number of stored charts across all intervals.
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self.runtime.block_on(
            sqlx::query_scalar("SELECT COUNT(*) FROM pf_charts").fetch_one(&self.pool),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn key_lock(&self, key: &RowKey) -> Arc<Mutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.lock_name()).or_default())
    }
}

impl Drop for SqliteChartStore {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

impl ChartStore for SqliteChartStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn save(&self, chart: &Chart, interval: Interval) -> Result<(), StoreError> {
        let key = RowKey::new(chart.params(), interval);
        let doc = ChartDocument::from_chart(chart, interval);
        let chart_data = doc.to_json()?;

        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(&format!("DELETE FROM pf_charts WHERE {KEY_FILTER}"))
                .bind(&key.symbol)
                .bind(&key.box_size)
                .bind(key.reversal_boxes)
                .bind(key.scale)
                .bind(key.interval)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO pf_charts
                (symbol, box_size, reversal_boxes, scale, interval,
                 current_direction, last_box_index, last_value_seen, last_timestamp,
                 fingerprint, chart_data, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(&key.symbol)
            .bind(&key.box_size)
            .bind(key.reversal_boxes)
            .bind(key.scale)
            .bind(key.interval)
            .bind(doc.current_direction.as_str())
            .bind(doc.last_box_index)
            .bind(doc.last_value_seen.map(|v| v.to_string()))
            .bind(doc.last_timestamp)
            .bind(doc.fingerprint.as_str())
            .bind(&chart_data)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(())
        })?;
        Ok(())
    }

    fn load(&self, params: &ChartParams, interval: Interval) -> Result<Option<Chart>, StoreError> {
        let key = RowKey::new(params, interval);
        let data: Option<String> = self.runtime.block_on(
            sqlx::query_scalar(&format!("SELECT chart_data FROM pf_charts WHERE {KEY_FILTER}"))
                .bind(&key.symbol)
                .bind(&key.box_size)
                .bind(key.reversal_boxes)
                .bind(key.scale)
                .bind(key.interval)
                .fetch_optional(&self.pool),
        )?;

        match data {
            None => Ok(None),
            Some(json) => ChartDocument::from_json(&json)?.into_chart().map(Some),
        }
    }

    fn list(&self, interval: Interval) -> Result<Vec<ChartParams>, StoreError> {
        let rows = self.runtime.block_on(
            sqlx::query(
                "SELECT symbol, box_size, reversal_boxes, scale FROM pf_charts \
                 WHERE interval = ?1 ORDER BY symbol, box_size, reversal_boxes, scale",
            )
            .bind(interval.as_str())
            .fetch_all(&self.pool),
        )?;

        let mut params = rows
            .iter()
            .map(|row| {
                let symbol: String = row.try_get("symbol")?;
                let box_size: String = row.try_get("box_size")?;
                let reversal: i64 = row.try_get("reversal_boxes")?;
                let scale: String = row.try_get("scale")?;
                Ok::<_, sqlx::Error>((symbol, box_size, reversal, scale))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?
            .into_iter()
            .map(|(symbol, box_size, reversal, scale)| {
                let key = format!("{symbol} {box_size}X{reversal} {scale}");
                let corrupt = |reason: String| StoreError::Corrupt {
                    key: key.clone(),
                    reason,
                };
                let box_size = Decimal::from_str(&box_size).map_err(|e| corrupt(e.to_string()))?;
                let reversal = u32::try_from(reversal).map_err(|e| corrupt(e.to_string()))?;
                let scale = BoxScale::from_str(&scale).map_err(|e| corrupt(e.to_string()))?;
                ChartParams::new(&symbol, box_size, reversal, scale).map_err(|e| corrupt(e.to_string()))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        // Text ordering of box_size is lexical; re-sort numerically.
        super::sort_params(&mut params);
        Ok(params)
    }
}
