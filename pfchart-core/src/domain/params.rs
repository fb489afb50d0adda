//! Chart parameters — the identity of a point-and-figure series.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for chart parameters and their textual forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("box size must be > 0, got {0}")]
    NonPositiveBoxSize(Decimal),

    #[error("reversal boxes must be >= 1, got {0}")]
    ZeroReversal(u32),

    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("unknown scale '{0}' (expected linear or percent)")]
    UnknownScale(String),

    #[error("unknown interval '{0}' (expected eod or live)")]
    UnknownInterval(String),
}

/// Mapping from raw value to box index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxScale {
    /// Fixed arithmetic box.
    Linear,
    /// Geometric box: each step multiplies by `1 + box_size`.
    Percent,
    /// Linear grid whose box is `box_size × ATR`.
    AtrLinear,
    /// Geometric grid whose step is `box_size × ATR / value`.
    AtrPercent,
}

impl BoxScale {
    /// Combine a base scale name with the volatility-adaptive flag.
    pub fn from_name(name: &str, use_atr: bool) -> Result<Self, ParamError> {
        match (name.trim().to_ascii_lowercase().as_str(), use_atr) {
            ("linear", false) => Ok(Self::Linear),
            ("linear", true) => Ok(Self::AtrLinear),
            ("percent", false) => Ok(Self::Percent),
            ("percent", true) => Ok(Self::AtrPercent),
            _ => Err(ParamError::UnknownScale(name.to_string())),
        }
    }

    /// Base scale name used in file names. ATR modes report their base scale.
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear | Self::AtrLinear => "linear",
            Self::Percent | Self::AtrPercent => "percent",
        }
    }

    /// Distinct key used by the relational store.
    pub fn key(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Percent => "percent",
            Self::AtrLinear => "atr_linear",
            Self::AtrPercent => "atr_percent",
        }
    }

    pub fn is_percent(self) -> bool {
        matches!(self, Self::Percent | Self::AtrPercent)
    }

    pub fn is_atr(self) -> bool {
        matches!(self, Self::AtrLinear | Self::AtrPercent)
    }
}

impl FromStr for BoxScale {
    type Err = ParamError;

    /// Parses the store key form (`linear`, `percent`, `atr_linear`, `atr_percent`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "percent" => Ok(Self::Percent),
            "atr_linear" => Ok(Self::AtrLinear),
            "atr_percent" => Ok(Self::AtrPercent),
            _ => Err(ParamError::UnknownScale(s.to_string())),
        }
    }
}

impl fmt::Display for BoxScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Sampling interval of the price history a chart was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Batch end-of-day history.
    Eod,
    /// Live streamed prices.
    Live,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eod => "eod",
            Self::Live => "live",
        }
    }
}

impl FromStr for Interval {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eod" => Ok(Self::Eod),
            "live" => Ok(Self::Live),
            _ => Err(ParamError::UnknownInterval(s.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters identifying one chart series.
///
/// The symbol is upper-cased at construction so equality is case-insensitive,
/// and `box_size` compares numerically (`10 == 10.0`). Deserialization goes
/// through the same validation as [`ChartParams::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawChartParams")]
pub struct ChartParams {
    symbol: String,
    box_size: Decimal,
    reversal_boxes: u32,
    scale: BoxScale,
}

#[derive(Deserialize)]
struct RawChartParams {
    symbol: String,
    box_size: Decimal,
    reversal_boxes: u32,
    scale: BoxScale,
}

impl TryFrom<RawChartParams> for ChartParams {
    type Error = ParamError;

    fn try_from(raw: RawChartParams) -> Result<Self, Self::Error> {
        ChartParams::new(raw.symbol, raw.box_size, raw.reversal_boxes, raw.scale)
    }
}

impl ChartParams {
    pub fn new(
        symbol: impl AsRef<str>,
        box_size: Decimal,
        reversal_boxes: u32,
        scale: BoxScale,
    ) -> Result<Self, ParamError> {
        let symbol = symbol.as_ref().trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(ParamError::EmptySymbol);
        }
        if box_size <= Decimal::ZERO {
            return Err(ParamError::NonPositiveBoxSize(box_size));
        }
        if reversal_boxes < 1 {
            return Err(ParamError::ZeroReversal(reversal_boxes));
        }
        Ok(Self {
            symbol,
            box_size: box_size.normalize(),
            reversal_boxes,
            scale,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn box_size(&self) -> Decimal {
        self.box_size
    }

    pub fn reversal_boxes(&self) -> u32 {
        self.reversal_boxes
    }

    pub fn scale(&self) -> BoxScale {
        self.scale
    }

    /// Box size without trailing zeros: `10`, `0.1`, `0.01`.
    pub fn box_size_label(&self) -> String {
        self.box_size.normalize().to_string()
    }
}

impl fmt::Display for ChartParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = if self.scale.is_percent() { "%" } else { "" };
        write!(
            f,
            "{} {}{}X{} {}",
            self.symbol,
            self.box_size_label(),
            pct,
            self.reversal_boxes,
            self.scale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn symbol_is_case_insensitive() {
        let a = ChartParams::new("spy", dec!(10), 3, BoxScale::Linear).unwrap();
        let b = ChartParams::new("SpY", dec!(10.0), 3, BoxScale::Linear).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.symbol(), "SPY");
    }

    #[test]
    fn rejects_non_positive_box_size() {
        assert_eq!(
            ChartParams::new("SPY", dec!(0), 3, BoxScale::Linear),
            Err(ParamError::NonPositiveBoxSize(dec!(0)))
        );
        assert!(ChartParams::new("SPY", dec!(-1), 3, BoxScale::Linear).is_err());
    }

    #[test]
    fn rejects_zero_reversal() {
        assert_eq!(
            ChartParams::new("SPY", dec!(1), 0, BoxScale::Linear),
            Err(ParamError::ZeroReversal(0))
        );
    }

    #[test]
    fn rejects_empty_symbol() {
        assert_eq!(
            ChartParams::new("  ", dec!(1), 1, BoxScale::Linear),
            Err(ParamError::EmptySymbol)
        );
    }

    #[test]
    fn scale_from_name_combines_atr_flag() {
        assert_eq!(BoxScale::from_name("Linear", false).unwrap(), BoxScale::Linear);
        assert_eq!(BoxScale::from_name("percent", true).unwrap(), BoxScale::AtrPercent);
        assert!(BoxScale::from_name("log", false).is_err());
        assert_eq!(BoxScale::AtrPercent.name(), "percent");
        assert_eq!("atr_linear".parse::<BoxScale>().unwrap(), BoxScale::AtrLinear);
    }

    #[test]
    fn box_size_label_strips_trailing_zeros() {
        let p = ChartParams::new("SPY", dec!(0.100), 1, BoxScale::Linear).unwrap();
        assert_eq!(p.box_size_label(), "0.1");
        let p = ChartParams::new("SPY", dec!(10.00), 1, BoxScale::Linear).unwrap();
        assert_eq!(p.box_size_label(), "10");
    }

    #[test]
    fn deserialization_validates() {
        let bad = r#"{"symbol":"spy","box_size":"0","reversal_boxes":3,"scale":"linear"}"#;
        assert!(serde_json::from_str::<ChartParams>(bad).is_err());

        let good = r#"{"symbol":"spy","box_size":"0.5","reversal_boxes":3,"scale":"atr_percent"}"#;
        let p: ChartParams = serde_json::from_str(good).unwrap();
        assert_eq!(p.symbol(), "SPY");
        assert_eq!(p.scale(), BoxScale::AtrPercent);
    }

    #[test]
    fn interval_parses_case_insensitively() {
        assert_eq!("EOD".parse::<Interval>().unwrap(), Interval::Eod);
        assert_eq!("live".parse::<Interval>().unwrap(), Interval::Live);
        assert!("weekly".parse::<Interval>().is_err());
    }
}
