//! PFChart CLI — build, update and scan point-and-figure charts.
//!
//! Commands:
//! - `run` — chart symbols from a CSV directory (or synthetic prices) per a
//!   TOML config and/or flags, persisting to JSON files or SQLite
//! - `show` — print a stored JSON chart
//!
//! Ctrl-C during `run` stops the price streams and flushes every chart.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use pfchart_core::store::ChartDocument;
use pfchart_core::{ChartStore, Interval, JsonFileStore, SqliteChartStore};
use pfchart_runner::{
    export_columns_csv, export_scan_json, CancelToken, ChartRunner, CsvColumnExporter, CsvDirSource,
    PriceSource, RunConfig, RunMode, RunSummary, SymbolSelection, SyntheticSource,
};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pfchart",
    about = "PFChart CLI — incremental point-and-figure charts"
)]
struct Cli {
    /// Log filter (e.g. `debug`, `pfchart_runner=debug`). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update charts for the requested symbols and parameters.
    Run(RunArgs),
    /// Print a stored JSON chart.
    Show {
        /// Path to a chart JSON document.
        path: PathBuf,

        /// Print the column CSV instead of the text rendering.
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML run config. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbols; repeatable, comma lists allowed, `ALL` for every known symbol.
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,

    /// Box sizes; a fraction for percent scales (0.01 = 1%).
    #[arg(long = "box-size", value_delimiter = ',')]
    box_sizes: Vec<Decimal>,

    /// Reversal box counts.
    #[arg(long = "reversal", value_delimiter = ',')]
    reversals: Vec<u32>,

    /// Box scale: linear or percent.
    #[arg(long)]
    scale: Option<String>,

    /// Size boxes from the average true range.
    #[arg(long, default_value_t = false)]
    use_atr: bool,

    #[arg(long)]
    atr_period: Option<usize>,

    /// Ignore prices before this date (YYYY-MM-DD).
    #[arg(long)]
    begin_date: Option<NaiveDate>,

    /// eod or live.
    #[arg(long)]
    interval: Option<String>,

    /// load, update or scan.
    #[arg(long)]
    mode: Option<String>,

    /// Directory of `{SYMBOL}.csv` price files.
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// CSV column charted as the price. Defaults to close.
    #[arg(long)]
    price_field: Option<String>,

    /// Use deterministic synthetic prices instead of a source directory.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Store charts as JSON documents in this directory.
    #[arg(long)]
    chart_dir: Option<PathBuf>,

    /// Store charts in this SQLite database.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Also write column CSVs to this directory.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Write scan deltas as JSON to this file (scan mode).
    #[arg(long)]
    scan_report: Option<PathBuf>,

    /// Run symbols one at a time.
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Run(args) => run_charts(args),
        Commands::Show { path, csv } => show_chart(&path, csv),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Config file (if any) with flags layered on top.
fn build_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::new(Vec::new(), Vec::new(), vec![1]),
    };
    if !args.symbols.is_empty() {
        config.symbols = args.symbols.clone();
    }
    if !args.box_sizes.is_empty() {
        config.box_sizes = args.box_sizes.clone();
    }
    if !args.reversals.is_empty() {
        config.reversals = args.reversals.clone();
    }
    if let Some(scale) = &args.scale {
        config.scale = scale.clone();
    }
    if args.use_atr {
        config.use_atr = true;
    }
    if let Some(period) = args.atr_period {
        config.atr_period = period;
    }
    if args.begin_date.is_some() {
        config.begin_date = args.begin_date;
    }
    if let Some(interval) = &args.interval {
        config.interval = Interval::from_str(interval)?;
    }
    if let Some(mode) = &args.mode {
        config.mode = RunMode::from_str(mode)?;
    }
    if args.sequential {
        config.parallel = false;
    }
    Ok(config)
}

fn build_source(args: &RunArgs, config: &RunConfig) -> Result<Arc<dyn PriceSource>> {
    match (&args.source_dir, args.synthetic) {
        (Some(_), true) => bail!("--source-dir and --synthetic are mutually exclusive"),
        (Some(dir), false) => {
            let mut source = CsvDirSource::new(dir);
            if let Some(field) = &args.price_field {
                source = source.with_price_field(field);
            }
            Ok(Arc::new(source))
        }
        (None, true) => {
            let symbols = match config.symbol_selection() {
                SymbolSelection::Listed(symbols) => symbols,
                SymbolSelection::All => bail!("ALL needs a --source-dir to list symbols"),
            };
            let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
            let end = chrono::Local::now().date_naive();
            let start = config
                .begin_date
                .unwrap_or_else(|| end - chrono::Duration::days(365 * 2));
            Ok(Arc::new(SyntheticSource::new(&refs, start, end)))
        }
        (None, false) => bail!("one of --source-dir or --synthetic is required"),
    }
}

fn build_store(args: &RunArgs) -> Result<Option<Arc<dyn ChartStore>>> {
    match (&args.chart_dir, &args.database) {
        (Some(_), Some(_)) => bail!("--chart-dir and --database are mutually exclusive"),
        (Some(dir), None) => Ok(Some(Arc::new(JsonFileStore::new(dir)))),
        (None, Some(path)) => {
            let store = SqliteChartStore::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Some(Arc::new(store)))
        }
        (None, None) => Ok(None),
    }
}

fn run_charts(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let source = build_source(&args, &config)?;

    let mut runner = ChartRunner::new(source);
    if let Some(store) = build_store(&args)? {
        runner = runner.with_store(store);
    }
    if let Some(dir) = &args.csv_dir {
        runner = runner.with_exporter(Arc::new(CsvColumnExporter::new(dir)));
    }

    cancel_on(tokio::signal::ctrl_c(), runner.cancel_token())?;
    let summary = runner.run(&config)?;
    print_summary(&summary);

    if let Some(path) = &args.scan_report {
        std::fs::write(path, export_scan_json(&summary.scans)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Scan report saved to: {}", path.display());
    }

    if !summary.is_success() {
        for failure in &summary.failures {
            eprintln!("Error: {failure}");
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Cancels the run once `signal` resolves. The runner then stops its streams
/// and finalises every chart as usual.
fn cancel_on<F>(signal: F, cancel: CancelToken) -> Result<thread::JoinHandle<()>>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to start signal listener")?;
    Ok(thread::spawn(move || {
        runtime.block_on(async {
            match signal.await {
                Ok(()) => {
                    info!("interrupt received, finalising charts");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "signal listener unavailable"),
            }
        });
    }))
}

fn print_summary(summary: &RunSummary) {
    println!("{:<32} {:>7} {:>6} {:>12}", "Chart", "Columns", "Boxes", "Direction");
    println!("{}", "-".repeat(60));
    for chart in &summary.charts {
        println!(
            "{:<32} {:>7} {:>6} {:>12}",
            chart.params().to_string(),
            chart.columns().len(),
            chart.total_boxes(),
            chart.direction().as_str()
        );
    }

    if !summary.scans.is_empty() {
        println!();
        println!("Scan:");
        for delta in summary.scans.iter().filter(|d| d.is_changed()) {
            println!(
                "  {}: {} -> {} columns, +{} boxes, {} -> {}",
                delta.params,
                delta.columns_before,
                delta.columns_after,
                delta.new_boxes,
                delta.direction_before.as_str(),
                delta.direction_after.as_str()
            );
        }
        let unchanged = summary.scans.iter().filter(|d| !d.is_changed()).count();
        println!("  {unchanged} unchanged");
    }

    info!(
        charts = summary.charts.len(),
        points = summary.points_read,
        "done"
    );
}

fn show_chart(path: &Path, csv: bool) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let doc = ChartDocument::from_json(&json)?;
    let interval = doc.interval;
    let chart = doc.into_chart()?;

    if csv {
        print!("{}", export_columns_csv(&chart)?);
    } else {
        println!("{chart}");
        println!("interval: {interval}");
        if let Some(ts) = chart.last_timestamp() {
            println!("last update: {ts}");
        }
        println!("fingerprint: {}", chart.fingerprint());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_cancels_the_run() {
        let cancel = CancelToken::new();
        cancel_on(async { Ok(()) }, cancel.clone())
            .unwrap()
            .join()
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn failed_listener_leaves_the_run_going() {
        let cancel = CancelToken::new();
        let failing = async { Err(std::io::Error::other("no signal driver")) };
        cancel_on(failing, cancel.clone()).unwrap().join().unwrap();
        assert!(!cancel.is_cancelled());
    }
}
