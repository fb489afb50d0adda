//! Deterministic synthetic daily closes, for demos and offline runs.
//!
//! Same symbol and date range always yields the same series: the RNG is
//! seeded from the symbol's blake3 hash.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use pfchart_core::PricePoint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::{PriceSource, PriceStream, SourceError, VecStream};

const START_PRICE: f64 = 100.0;
const CLOSE_HOUR: u32 = 21;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    symbols: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
}

impl SyntheticSource {
    pub fn new(symbols: &[&str], start: NaiveDate, end: NaiveDate) -> Self {
        let mut symbols: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .collect();
        symbols.sort();
        symbols.dedup();
        Self {
            symbols,
            start,
            end,
        }
    }

    /// Weekday random walk with ±3% daily moves, cents precision.
    pub fn series(&self, symbol: &str) -> Vec<PricePoint> {
        let mut rng = StdRng::from_seed(*blake3::hash(symbol.as_bytes()).as_bytes());
        let cent = Decimal::new(1, 2);

        let mut points = Vec::new();
        let mut price = START_PRICE;
        let mut current = self.start;
        while current <= self.end {
            if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                current += Duration::days(1);
                continue;
            }

            let open = price;
            let close = price * (1.0 + rng.gen_range(-0.03..0.03));
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let to_cents = |v: f64| {
                Decimal::from_f64(v)
                    .map(|d| d.round_dp(2).max(cent))
                    .unwrap_or(cent)
            };

            if let Some(ts) = current.and_hms_opt(CLOSE_HOUR, 0, 0) {
                points.push(
                    PricePoint::new(ts.and_utc(), to_cents(close))
                        .with_range(to_cents(high), to_cents(low)),
                );
            }
            price = close;
            current += Duration::days(1);
        }
        points
    }
}

impl PriceSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn known_symbols(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.symbols.clone())
    }

    fn open(
        &self,
        symbol: &str,
        begin: Option<NaiveDate>,
    ) -> Result<Box<dyn PriceStream>, SourceError> {
        let key = symbol.trim().to_ascii_uppercase();
        if !self.symbols.contains(&key) {
            return Err(SourceError::SymbolNotFound { symbol: key });
        }
        Ok(Box::new(VecStream::new(self.series(&key), begin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SyntheticSource {
        SyntheticSource::new(
            &["spy", "QQQ"],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    #[test]
    fn deterministic_per_symbol() {
        let s = source();
        assert_eq!(s.series("SPY"), s.series("SPY"));
        assert_ne!(s.series("SPY"), s.series("QQQ"));
    }

    #[test]
    fn weekdays_only_and_increasing() {
        let points = source().series("SPY");
        assert!(!points.is_empty());
        assert!(points
            .iter()
            .all(|p| !matches!(p.timestamp.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(points.iter().all(|p| p.value > Decimal::ZERO && p.value.scale() <= 2));
        assert!(points.iter().all(|p| p.is_sane()));
    }

    #[test]
    fn unknown_symbol() {
        assert!(matches!(
            source().open("IWM", None),
            Err(SourceError::SymbolNotFound { .. })
        ));
        assert_eq!(source().known_symbols().unwrap(), vec!["QQQ", "SPY"]);
    }
}
