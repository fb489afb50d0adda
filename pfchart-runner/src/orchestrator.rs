//! Chart job orchestrator — runs a config against a price source.
//!
//! Every symbol is one job: its price stream is opened once and fanned out
//! to all of that symbol's charts in grid order. End-of-day jobs run on the
//! rayon pool (or sequentially); live jobs block on their feeds until
//! cancelled, so each gets its own thread. Jobs return their charts by value
//! and a failing symbol is reported in the summary without touching the others.

use std::collections::HashSet;
use std::panic;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use pfchart_core::{Chart, ChartError, ChartParams, ChartStore, Interval, StoreError};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::{ConfigError, RunConfig, RunMode, SymbolSelection};
use crate::export::ChartExporter;
use crate::jobs::ParamGrid;
use crate::scan::{ScanBaseline, ScanDelta};
use crate::source::{PriceSource, SourceError};

/// Fatal errors, raised before any price is ingested.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("symbol resolution failed: {0}")]
    Source(#[from] SourceError),

    #[error("listing stored charts failed: {0}")]
    Store(#[from] StoreError),
}

/// Why one symbol's job stopped.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("price source: {0}")]
    Source(#[from] SourceError),

    #[error("chart: {0}")]
    Chart(#[from] ChartError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("{exporter} export: {source:#}")]
    Export {
        exporter: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A symbol whose job failed. `params` names the chart involved, when the
/// failure belongs to one chart rather than the whole stream.
#[derive(Debug, Error)]
#[error("{symbol}{}: {error}", .params.as_ref().map(|p| format!(" [{p}]")).unwrap_or_default())]
pub struct SymbolFailure {
    pub symbol: String,
    pub params: Option<ChartParams>,
    #[source]
    pub error: JobError,
}

impl SymbolFailure {
    fn new(symbol: &str, params: Option<&ChartParams>, error: impl Into<JobError>) -> Self {
        Self {
            symbol: symbol.to_string(),
            params: params.cloned(),
            error: error.into(),
        }
    }
}

/// Result of a run: finalised charts, failed symbols and scan deltas.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub charts: Vec<Chart>,
    pub failures: Vec<SymbolFailure>,
    /// Filled in scan mode only, one per chart.
    pub scans: Vec<ScanDelta>,
    /// Points read from the source across all symbols.
    pub points_read: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn chart(&self, params: &ChartParams) -> Option<&Chart> {
        self.charts.iter().find(|c| c.params() == params)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One symbol's finished job.
struct SymbolRun {
    charts: Vec<Chart>,
    scans: Vec<ScanDelta>,
    points: usize,
}

/// A chart being driven by a job, with what it looked like when seeded.
struct ChartJob {
    chart: Chart,
    seeded: bool,
    baseline: ScanBaseline,
    /// Points at or before this were charted by an earlier run.
    resume_after: Option<DateTime<Utc>>,
    skipped: usize,
}

pub struct ChartRunner {
    source: Arc<dyn PriceSource>,
    store: Option<Arc<dyn ChartStore>>,
    exporters: Vec<Arc<dyn ChartExporter>>,
    cancel: CancelToken,
}

impl ChartRunner {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self {
            source,
            store: None,
            exporters: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ChartStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ChartExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this runner's streams; clone it to another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Resolve symbols and chart params, then run every symbol's job.
    pub fn run(&self, config: &RunConfig) -> Result<RunSummary, RunError> {
        config.validate(self.store.is_some())?;
        let symbols = self.resolve_symbols(config)?;
        let params = self.chart_params(config, &symbols)?;

        let jobs: Vec<(String, Vec<ChartParams>)> = symbols
            .into_iter()
            .filter_map(|symbol| {
                let charts: Vec<ChartParams> = params
                    .iter()
                    .filter(|p| p.symbol() == symbol)
                    .cloned()
                    .collect();
                (!charts.is_empty()).then_some((symbol, charts))
            })
            .collect();

        info!(
            mode = %config.mode,
            interval = %config.interval,
            source = self.source.name(),
            symbols = jobs.len(),
            charts = params.len(),
            "starting chart run"
        );

        let live = config.interval == Interval::Live;
        let outcomes: Vec<Result<SymbolRun, SymbolFailure>> = if live {
            thread::scope(|scope| {
                let handles: Vec<_> = jobs
                    .iter()
                    .map(|(symbol, charts)| {
                        scope.spawn(move || self.run_symbol(config, symbol, charts))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                    .collect()
            })
        } else if config.parallel {
            jobs.par_iter()
                .map(|(symbol, charts)| self.run_symbol(config, symbol, charts))
                .collect()
        } else {
            jobs.iter()
                .map(|(symbol, charts)| self.run_symbol(config, symbol, charts))
                .collect()
        };

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome {
                Ok(run) => {
                    summary.points_read += run.points;
                    summary.charts.extend(run.charts);
                    summary.scans.extend(run.scans);
                }
                Err(failure) => {
                    warn!(
                        symbol = %failure.symbol,
                        params = ?failure.params.as_ref().map(ToString::to_string),
                        error = %failure.error,
                        "symbol failed"
                    );
                    summary.failures.push(failure);
                }
            }
        }
        summary.cancelled = self.cancel.is_cancelled();

        info!(
            charts = summary.charts.len(),
            failures = summary.failures.len(),
            points = summary.points_read,
            cancelled = summary.cancelled,
            "chart run finished"
        );
        Ok(summary)
    }

    fn resolve_symbols(&self, config: &RunConfig) -> Result<Vec<String>, RunError> {
        Ok(match config.symbol_selection() {
            SymbolSelection::Listed(symbols) => symbols,
            SymbolSelection::All => {
                let mut seen = HashSet::new();
                self.source
                    .known_symbols()?
                    .into_iter()
                    .map(|s| s.to_ascii_uppercase())
                    .filter(|s| seen.insert(s.clone()))
                    .collect()
            }
        })
    }

    /// The run's grid, or for a scan without box sizes every stored chart
    /// of the selected symbols.
    fn chart_params(
        &self,
        config: &RunConfig,
        symbols: &[String],
    ) -> Result<Vec<ChartParams>, RunError> {
        if config.box_sizes.is_empty() {
            let Some(store) = &self.store else {
                return Err(ConfigError::StoreRequired(config.mode).into());
            };
            let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
            let stored = store.list(config.interval)?;
            return Ok(stored
                .into_iter()
                .filter(|p| wanted.contains(p.symbol()))
                .collect());
        }

        let grid = ParamGrid::new(
            symbols.to_vec(),
            config.box_sizes.clone(),
            config.reversals.clone(),
            config.box_scale()?,
        );
        grid.generate()
            .map_err(|e| RunError::Config(ConfigError::Param(e)))
    }

    fn run_symbol(
        &self,
        config: &RunConfig,
        symbol: &str,
        params: &[ChartParams],
    ) -> Result<SymbolRun, SymbolFailure> {
        let mut jobs = Vec::with_capacity(params.len());
        for p in params {
            jobs.push(self.seed_chart(config, p)?);
        }

        let mut stream = self
            .source
            .open(symbol, config.begin_date)
            .map_err(|e| SymbolFailure::new(symbol, None, e))?;

        let mut points = 0usize;
        while !self.cancel.is_cancelled() {
            let Some(point) = stream
                .next_point(&self.cancel)
                .map_err(|e| SymbolFailure::new(symbol, None, e))?
            else {
                break;
            };
            points += 1;
            for job in &mut jobs {
                if job.resume_after.is_some_and(|last| point.timestamp <= last) {
                    job.skipped += 1;
                    continue;
                }
                job.chart
                    .ingest_point(&point)
                    .map_err(|e| SymbolFailure::new(symbol, Some(job.chart.params()), e))?;
            }
        }
        if self.cancel.is_cancelled() {
            info!(symbol, points, "cancelled, flushing charts");
        }

        let mut charts = Vec::with_capacity(jobs.len());
        let mut scans = Vec::new();
        for job in jobs {
            if job.skipped > 0 {
                debug!(
                    symbol,
                    params = %job.chart.params(),
                    skipped = job.skipped,
                    "skipped points already charted"
                );
            }
            let persist = match config.mode {
                RunMode::Scan => {
                    let delta = ScanDelta::between(&job.baseline, &job.chart);
                    let advanced = job.chart.last_timestamp() != job.resume_after;
                    let changed = delta.is_changed();
                    scans.push(delta);
                    changed || advanced || !job.seeded
                }
                RunMode::Load | RunMode::Update => true,
            };
            self.finalize(config, &job.chart, persist)
                .map_err(|e| SymbolFailure::new(symbol, Some(job.chart.params()), e))?;
            charts.push(job.chart);
        }

        info!(symbol, charts = charts.len(), points, "symbol finished");
        Ok(SymbolRun {
            charts,
            scans,
            points,
        })
    }

    /// Stored chart in resuming modes, otherwise (or when none is stored) a fresh one.
    fn seed_chart(
        &self,
        config: &RunConfig,
        params: &ChartParams,
    ) -> Result<ChartJob, SymbolFailure> {
        let stored = match (&self.store, config.mode.resumes()) {
            (Some(store), true) => store
                .load(params, config.interval)
                .map_err(|e| SymbolFailure::new(params.symbol(), Some(params), e))?,
            _ => None,
        };
        let seeded = stored.is_some();
        let chart = match stored {
            Some(chart) => {
                debug!(
                    params = %params,
                    last_timestamp = ?chart.last_timestamp(),
                    "resuming stored chart"
                );
                chart
            }
            None => {
                if config.mode.resumes() {
                    info!(params = %params, "no stored chart, starting fresh");
                }
                Chart::with_atr_period(params.clone(), config.atr_period)
            }
        };
        Ok(ChartJob {
            baseline: ScanBaseline::of(&chart),
            resume_after: chart.last_timestamp(),
            chart,
            seeded,
            skipped: 0,
        })
    }

    fn finalize(&self, config: &RunConfig, chart: &Chart, persist: bool) -> Result<(), JobError> {
        if persist {
            if let Some(store) = &self.store {
                store.save(chart, config.interval)?;
            }
        }
        for exporter in &self.exporters {
            exporter
                .export(chart, config.interval)
                .map_err(|source| JobError::Export {
                    exporter: exporter.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}
