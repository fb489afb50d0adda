//! Run configuration — what to chart, how, and from which point in history.
//!
//! Loadable from TOML or built by the CLI. Validation runs before any price
//! is read, so a bad config never leaves half-updated charts behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use pfchart_core::boxes::DEFAULT_ATR_PERIOD;
use pfchart_core::domain::ParamError;
use pfchart_core::{BoxScale, Interval};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel symbol entry meaning "every symbol the source knows".
pub const ALL_SYMBOLS: &str = "ALL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no symbols requested")]
    NoSymbols,

    #[error("no box sizes requested")]
    NoBoxSizes,

    #[error("no reversal counts requested")]
    NoReversals,

    #[error("box size must be > 0, got {0}")]
    NonPositiveBoxSize(Decimal),

    #[error("reversal boxes must be >= 1")]
    ZeroReversal,

    #[error("ATR period must be >= 1")]
    ZeroAtrPeriod,

    #[error("unknown run mode '{0}' (expected load, update or scan)")]
    UnknownMode(String),

    #[error("mode '{0}' needs a chart store (pass a chart directory or database)")]
    StoreRequired(RunMode),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How existing charts are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Build fresh charts from the whole history.
    #[default]
    Load,
    /// Continue stored charts with points after their last timestamp.
    Update,
    /// Update, then report what changed.
    #[serde(alias = "daily-scan")]
    Scan,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Update => "update",
            Self::Scan => "scan",
        }
    }

    /// Whether charts are seeded from the store.
    pub fn resumes(self) -> bool {
        matches!(self, Self::Update | Self::Scan)
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "update" => Ok(Self::Update),
            "scan" | "daily-scan" => Ok(Self::Scan),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbols after splitting comma lists and resolving the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolSelection {
    /// Every symbol the price source knows.
    All,
    /// Upper-cased, de-duplicated, in request order.
    Listed(Vec<String>),
}

/// Everything a chart run needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Symbols; entries may be comma-separated lists or `ALL`.
    pub symbols: Vec<String>,

    /// Nominal box sizes. May be empty for a scan, which then charts
    /// whatever the store already holds.
    #[serde(default)]
    pub box_sizes: Vec<Decimal>,

    #[serde(default = "default_reversals")]
    pub reversals: Vec<u32>,

    /// Base scale name: `linear` or `percent`.
    #[serde(default = "default_scale")]
    pub scale: String,

    /// Size boxes from the ATR instead of a fixed grid.
    #[serde(default)]
    pub use_atr: bool,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// Ignore prices dated before this day.
    #[serde(default)]
    pub begin_date: Option<NaiveDate>,

    #[serde(default = "default_interval")]
    pub interval: Interval,

    #[serde(default)]
    pub mode: RunMode,

    /// Run symbols on the rayon pool; off gives a deterministic serial run.
    /// Live runs always give each symbol its own thread.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_reversals() -> Vec<u32> {
    vec![1]
}

fn default_scale() -> String {
    "linear".to_string()
}

fn default_atr_period() -> usize {
    DEFAULT_ATR_PERIOD
}

fn default_interval() -> Interval {
    Interval::Eod
}

fn default_parallel() -> bool {
    true
}

impl RunConfig {
    /// Minimal config: load `symbols` with one box size and reversal on a linear grid.
    pub fn new(symbols: Vec<String>, box_sizes: Vec<Decimal>, reversals: Vec<u32>) -> Self {
        Self {
            symbols,
            box_sizes,
            reversals,
            scale: default_scale(),
            use_atr: false,
            atr_period: DEFAULT_ATR_PERIOD,
            begin_date: None,
            interval: Interval::Eod,
            mode: RunMode::Load,
            parallel: true,
        }
    }

    /// Load a run config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a run config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The concrete scale for every chart of this run.
    pub fn box_scale(&self) -> Result<BoxScale, ConfigError> {
        Ok(BoxScale::from_name(&self.scale, self.use_atr)?)
    }

    /// Split comma lists, upper-case, de-duplicate and detect `ALL`.
    pub fn symbol_selection(&self) -> SymbolSelection {
        let mut listed: Vec<String> = Vec::new();
        for entry in self.symbols.iter().flat_map(|e| e.split(',')) {
            let symbol = entry.trim().to_ascii_uppercase();
            if symbol.is_empty() {
                continue;
            }
            if symbol == ALL_SYMBOLS {
                return SymbolSelection::All;
            }
            if !listed.contains(&symbol) {
                listed.push(symbol);
            }
        }
        SymbolSelection::Listed(listed)
    }

    /// Check the config is runnable. `has_store` says whether a chart store was supplied.
    pub fn validate(&self, has_store: bool) -> Result<(), ConfigError> {
        if let SymbolSelection::Listed(symbols) = self.symbol_selection() {
            if symbols.is_empty() {
                return Err(ConfigError::NoSymbols);
            }
        }
        if self.box_sizes.is_empty() && self.mode != RunMode::Scan {
            return Err(ConfigError::NoBoxSizes);
        }
        if let Some(bad) = self.box_sizes.iter().find(|b| **b <= Decimal::ZERO) {
            return Err(ConfigError::NonPositiveBoxSize(*bad));
        }
        if self.reversals.is_empty() {
            return Err(ConfigError::NoReversals);
        }
        if self.reversals.contains(&0) {
            return Err(ConfigError::ZeroReversal);
        }
        if self.use_atr && self.atr_period == 0 {
            return Err(ConfigError::ZeroAtrPeriod);
        }
        self.box_scale()?;
        if self.mode.resumes() && !has_store {
            return Err(ConfigError::StoreRequired(self.mode));
        }
        Ok(())
    }
}
