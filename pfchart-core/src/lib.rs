//! PFChart Core — domain types, box grids, the chart state machine, chart stores.
//!
//! This crate contains the heart of the point-and-figure engine:
//! - Domain types (chart params, columns, price points)
//! - Box grids (linear, percent) and the ATR window behind volatility-adaptive boxes
//! - The incremental chart state machine with explicit ingest outcomes
//! - Chart persistence (JSON documents on disk, SQLite rows) behind one trait

pub mod boxes;
pub mod chart;
pub mod domain;
pub mod fingerprint;
pub mod store;

pub use chart::{chart_file_name, Chart, ChartError, IngestOutcome};
pub use domain::{BoxScale, ChartDirection, ChartParams, Column, Direction, Interval, PricePoint};
pub use store::{ChartStore, JsonFileStore, SqliteChartStore, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: charts and stores cross worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::ChartParams>();
        require_sync::<domain::ChartParams>();
        require_send::<domain::PricePoint>();
        require_sync::<domain::PricePoint>();
        require_send::<boxes::AtrWindow>();
        require_sync::<boxes::AtrWindow>();
        require_send::<chart::Chart>();
        require_sync::<chart::Chart>();
        require_send::<store::ChartDocument>();
        require_sync::<store::ChartDocument>();

        require_send::<store::JsonFileStore>();
        require_sync::<store::JsonFileStore>();
        require_send::<store::SqliteChartStore>();
        require_sync::<store::SqliteChartStore>();
        require_send::<Box<dyn store::ChartStore>>();
        require_sync::<Box<dyn store::ChartStore>>();
    }

    /// Architecture contract: stores persist charts, they never ingest.
    ///
    /// `ChartStore` only sees `&Chart`, so state machine logic cannot leak
    /// into an adapter.
    #[test]
    fn store_trait_only_borrows_charts() {
        fn _check_trait_object_builds(
            store: &dyn store::ChartStore,
            chart: &chart::Chart,
        ) -> Result<(), store::StoreError> {
            store.save(chart, domain::Interval::Eod)
        }
    }
}
