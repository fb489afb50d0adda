use std::collections::BTreeMap;

use chrono::NaiveDate;
use pfchart_core::PricePoint;

use super::{PriceSource, PriceStream, SourceError, VecStream};

/// Fixed price histories held in memory, keyed by upper-cased symbol.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: BTreeMap<String, Vec<PricePoint>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, points: Vec<PricePoint>) -> Self {
        self.insert(symbol, points);
        self
    }

    pub fn insert(&mut self, symbol: &str, points: Vec<PricePoint>) {
        self.series.insert(symbol.trim().to_ascii_uppercase(), points);
    }
}

impl PriceSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn known_symbols(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.series.keys().cloned().collect())
    }

    fn open(
        &self,
        symbol: &str,
        begin: Option<NaiveDate>,
    ) -> Result<Box<dyn PriceStream>, SourceError> {
        let points = self
            .series
            .get(&symbol.to_ascii_uppercase())
            .ok_or_else(|| SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;
        Ok(Box::new(VecStream::new(points.clone(), begin)))
    }
}
