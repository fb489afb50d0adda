//! PFChart Runner — chart job orchestration on top of `pfchart-core`.
//!
//! This crate provides:
//! - Run configuration (TOML or CLI-built) with upfront validation
//! - Price sources: CSV directories, live channels, synthetic walks, in-memory fixtures
//! - The job orchestrator: symbol resolution, parameter grids, load/update/scan modes
//! - Scan deltas and CSV column export
//! - Cooperative cancellation for live runs

pub mod cancel;
pub mod config;
pub mod export;
pub mod jobs;
pub mod orchestrator;
pub mod scan;
pub mod source;

pub use cancel::CancelToken;
pub use config::{ConfigError, RunConfig, RunMode, SymbolSelection, ALL_SYMBOLS};
pub use export::{export_columns_csv, export_scan_json, ChartExporter, CsvColumnExporter};
pub use jobs::ParamGrid;
pub use orchestrator::{ChartRunner, JobError, RunError, RunSummary, SymbolFailure};
pub use scan::ScanDelta;
pub use source::{
    CsvDirSource, LivePublisher, LiveSource, MemorySource, PriceSource, PriceStream,
    SourceError, SyntheticSource,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn runner_is_send_sync() {
        assert_send::<ChartRunner>();
        assert_sync::<ChartRunner>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<CancelToken>();
        assert_sync::<CancelToken>();
    }

    #[test]
    fn sources_are_send_sync() {
        assert_send::<CsvDirSource>();
        assert_sync::<CsvDirSource>();
        assert_send::<LiveSource>();
        assert_sync::<LiveSource>();
        assert_send::<LivePublisher>();
        assert_send::<SyntheticSource>();
        assert_sync::<SyntheticSource>();
        assert_send::<Box<dyn PriceStream>>();
    }

    #[test]
    fn results_cross_threads() {
        assert_send::<RunSummary>();
        assert_send::<SymbolFailure>();
        assert_sync::<SymbolFailure>();
        assert_send::<ScanDelta>();
    }
}
