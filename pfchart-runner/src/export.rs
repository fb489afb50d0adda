//! Chart export — CSV column tapes for external plotting tools.
//!
//! Exporters receive every finalised chart of a run. Failures surface as
//! per-symbol `JobError::Export` and never abort other symbols.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pfchart_core::{chart_file_name, Chart, Interval};

use crate::scan::ScanDelta;

/// Sink for finalised charts.
pub trait ChartExporter: Send + Sync {
    fn name(&self) -> &str;

    fn export(&self, chart: &Chart, interval: Interval) -> Result<()>;
}

/// One row per box: `column,direction,box_index,lower,upper`.
///
/// `lower`/`upper` are empty for volatility-adaptive scales: their boxes
/// were placed on grids that moved with the ATR, so only the index is kept.
pub fn export_columns_csv(chart: &Chart) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["column", "direction", "box_index", "lower", "upper"])?;

    let fixed_grid = !chart.params().scale().is_atr();
    for (i, column) in chart.columns().iter().enumerate() {
        let number = (i + 1).to_string();
        for &index in column.boxes() {
            let bounds = if fixed_grid {
                chart
                    .box_boundaries_for(index)
                    .with_context(|| format!("box {index} of {}", chart.params()))?
            } else {
                None
            };
            let (lower, upper) = match bounds {
                Some((lo, hi)) => (lo.normalize().to_string(), hi.normalize().to_string()),
                None => (String::new(), String::new()),
            };
            wtr.write_record([
                number.as_str(),
                column.direction().as_str(),
                &index.to_string(),
                &lower,
                &upper,
            ])?;
        }
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Scan deltas as a pretty JSON array, for daily scan reports.
pub fn export_scan_json(scans: &[ScanDelta]) -> Result<String> {
    serde_json::to_string_pretty(scans).context("failed to serialize scan deltas to JSON")
}

/// Writes `{dir}/{chart file name}.csv` for each chart.
#[derive(Debug, Clone)]
pub struct CsvColumnExporter {
    dir: PathBuf,
}

impl CsvColumnExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, chart: &Chart, interval: Interval) -> PathBuf {
        self.dir.join(chart_file_name(chart.params(), interval, "csv"))
    }
}

impl ChartExporter for CsvColumnExporter {
    fn name(&self) -> &str {
        "csv"
    }

    fn export(&self, chart: &Chart, interval: Interval) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(chart, interval);
        let body = export_columns_csv(chart)?;
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
    }
}
