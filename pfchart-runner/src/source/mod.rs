//! Price source trait and structured error types.
//!
//! The PriceSource trait abstracts over where prices come from (in-memory
//! fixtures, CSV files, a live feed, synthetic walks) so the orchestrator can
//! drive any of them and tests can mock them.

pub mod csv_dir;
pub mod live;
pub mod memory;
pub mod synthetic;

pub use csv_dir::CsvDirSource;
pub use live::{LivePublisher, LiveSource};
pub use memory::MemorySource;
pub use synthetic::SyntheticSource;

use std::path::PathBuf;

use chrono::NaiveDate;
use pfchart_core::PricePoint;
use thiserror::Error;

use crate::cancel::CancelToken;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no price data for symbol '{symbol}'")]
    SymbolNotFound { symbol: String },

    #[error("{symbol}: malformed record at line {line}: {reason}")]
    Malformed {
        symbol: String,
        line: u64,
        reason: String,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{symbol}: live feed disconnected without finishing")]
    Disconnected { symbol: String },

    #[error("{symbol}: live feed already opened")]
    AlreadyOpen { symbol: String },
}

/// One symbol's ordered price stream.
pub trait PriceStream: Send {
    /// Next point, or `Ok(None)` once the stream is exhausted or `cancel` fires.
    fn next_point(&mut self, cancel: &CancelToken) -> Result<Option<PricePoint>, SourceError>;
}

/// Where prices come from.
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Symbols this source can stream, used to resolve `ALL`.
    fn known_symbols(&self) -> Result<Vec<String>, SourceError>;

    /// Open `symbol`'s stream, skipping points dated before `begin`.
    fn open(
        &self,
        symbol: &str,
        begin: Option<NaiveDate>,
    ) -> Result<Box<dyn PriceStream>, SourceError>;
}

/// Stream over points already in memory.
pub struct VecStream {
    points: std::vec::IntoIter<PricePoint>,
}

impl VecStream {
    pub fn new(points: Vec<PricePoint>, begin: Option<NaiveDate>) -> Self {
        let points: Vec<PricePoint> = match begin {
            Some(day) => points
                .into_iter()
                .filter(|p| p.timestamp.date_naive() >= day)
                .collect(),
            None => points,
        };
        Self {
            points: points.into_iter(),
        }
    }
}

impl PriceStream for VecStream {
    fn next_point(&mut self, cancel: &CancelToken) -> Result<Option<PricePoint>, SourceError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(self.points.next())
    }
}
