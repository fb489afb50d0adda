//! Chart job expansion: the cross product of symbols, box sizes and reversals.

use pfchart_core::domain::ParamError;
use pfchart_core::{BoxScale, ChartParams};
use rust_decimal::Decimal;

/// Parameter grid for one run. Every combination shares the run's scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamGrid {
    pub symbols: Vec<String>,
    pub box_sizes: Vec<Decimal>,
    pub reversals: Vec<u32>,
    pub scale: BoxScale,
}

impl ParamGrid {
    pub fn new(
        symbols: Vec<String>,
        box_sizes: Vec<Decimal>,
        reversals: Vec<u32>,
        scale: BoxScale,
    ) -> Self {
        Self {
            symbols,
            box_sizes,
            reversals,
            scale,
        }
    }

    /// Total number of charts in this grid.
    pub fn size(&self) -> usize {
        self.symbols.len() * self.box_sizes.len() * self.reversals.len()
    }

    /// Every combination, symbol-major. Duplicate box sizes (`10` vs `10.0`)
    /// collapse to one chart.
    pub fn generate(&self) -> Result<Vec<ChartParams>, ParamError> {
        let mut params: Vec<ChartParams> = Vec::with_capacity(self.size());
        for symbol in &self.symbols {
            for &box_size in &self.box_sizes {
                for &reversal in &self.reversals {
                    let p = ChartParams::new(symbol, box_size, reversal, self.scale)?;
                    if !params.contains(&p) {
                        params.push(p);
                    }
                }
            }
        }
        Ok(params)
    }
}
