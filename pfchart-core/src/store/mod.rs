//! Chart persistence.
//!
//! One capability, [`ChartStore`], with two implementations:
//! - [`JsonFileStore`]: one JSON document per chart, atomic tmp+rename writes
//! - [`SqliteChartStore`]: one row per chart in the `pf_charts` table
//!
//! Both persist the same [`ChartDocument`], so a chart loaded from either is
//! ready to keep ingesting where the stored run stopped.

pub mod document;
pub mod json_file;
pub mod sqlite;

pub use document::{ChartDocument, SCHEMA_VERSION};
pub use json_file::JsonFileStore;
pub use sqlite::SqliteChartStore;

use std::path::PathBuf;

use thiserror::Error;

use crate::chart::Chart;
use crate::domain::{ChartParams, Interval};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("corrupt chart document for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("stored chart is {found}, expected {expected}")]
    ParamsMismatch { expected: String, found: String },

    #[error("failed to start storage runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persistent home for charts, keyed by params + interval.
///
/// Implementations are shared across per-symbol worker threads.
pub trait ChartStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Insert or replace the chart stored under its key.
    fn save(&self, chart: &Chart, interval: Interval) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing is stored under the key.
    fn load(&self, params: &ChartParams, interval: Interval) -> Result<Option<Chart>, StoreError>;

    /// Params of every chart stored for `interval`, in a stable order.
    fn list(&self, interval: Interval) -> Result<Vec<ChartParams>, StoreError>;
}

/// Stable ordering for listings: symbol, box size, reversal, scale.
pub(crate) fn sort_params(params: &mut [ChartParams]) {
    params.sort_by(|a, b| {
        a.symbol()
            .cmp(b.symbol())
            .then(a.box_size().cmp(&b.box_size()))
            .then(a.reversal_boxes().cmp(&b.reversal_boxes()))
            .then(a.scale().key().cmp(b.scale().key()))
    });
}
