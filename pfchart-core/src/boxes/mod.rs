//! Box grids — mapping between values and box indices.
//!
//! Linear: `index = floor(value / box_size)`.
//! Percent: boundaries at `reference × ratio^k`, `ratio = 1 + fraction`; a
//! value's index is the largest `k` whose boundary does not exceed it.
//!
//! All boundary arithmetic is exact `Decimal`; floats are only used to seed
//! the percent index search, which is then corrected against exact boundaries.

pub mod atr;

pub use atr::{true_range, AtrWindow, DEFAULT_ATR_PERIOD};

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("box size must be > 0, got {0}")]
    NonPositiveBox(Decimal),

    #[error("percent grid requires a positive value, got {0}")]
    NonPositiveValue(Decimal),

    #[error("box arithmetic overflowed")]
    Overflow,
}

/// A concrete box grid for one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxGrid {
    Linear { box_size: Decimal },
    Percent { reference: Decimal, ratio: Decimal },
}

impl BoxGrid {
    pub fn linear(box_size: Decimal) -> Result<Self, GridError> {
        if box_size <= Decimal::ZERO {
            return Err(GridError::NonPositiveBox(box_size));
        }
        Ok(Self::Linear { box_size })
    }

    /// Geometric grid anchored at `reference` with step `1 + fraction`.
    pub fn percent(reference: Decimal, fraction: Decimal) -> Result<Self, GridError> {
        if fraction <= Decimal::ZERO {
            return Err(GridError::NonPositiveBox(fraction));
        }
        if reference <= Decimal::ZERO {
            return Err(GridError::NonPositiveValue(reference));
        }
        let ratio = Decimal::ONE
            .checked_add(fraction)
            .ok_or(GridError::Overflow)?;
        Ok(Self::Percent { reference, ratio })
    }

    /// Index of the box containing `value`.
    pub fn index_for(&self, value: Decimal) -> Result<i64, GridError> {
        match *self {
            Self::Linear { box_size } => value
                .checked_div(box_size)
                .ok_or(GridError::Overflow)?
                .floor()
                .to_i64()
                .ok_or(GridError::Overflow),
            Self::Percent { reference, ratio } => {
                if value <= Decimal::ZERO {
                    return Err(GridError::NonPositiveValue(value));
                }
                let mut k = estimate_steps(value, reference, ratio);
                while self.lower_bound(k + 1)? <= value {
                    k += 1;
                }
                while self.lower_bound(k)? > value {
                    k -= 1;
                }
                Ok(k)
            }
        }
    }

    /// Lower boundary of box `index`.
    pub fn lower_bound(&self, index: i64) -> Result<Decimal, GridError> {
        match *self {
            Self::Linear { box_size } => Decimal::from(index)
                .checked_mul(box_size)
                .ok_or(GridError::Overflow),
            Self::Percent { reference, ratio } => {
                let factor = ratio
                    .checked_powi(index.unsigned_abs() as i64)
                    .ok_or(GridError::Overflow)?;
                if index >= 0 {
                    reference.checked_mul(factor)
                } else {
                    reference.checked_div(factor)
                }
                .ok_or(GridError::Overflow)
            }
        }
    }

    /// `(lower, upper)` boundaries of box `index`.
    pub fn boundaries(&self, index: i64) -> Result<(Decimal, Decimal), GridError> {
        Ok((self.lower_bound(index)?, self.lower_bound(index + 1)?))
    }
}

/// Float estimate of `log_ratio(value / reference)`, floored. Zero if not finite.
fn estimate_steps(value: Decimal, reference: Decimal, ratio: Decimal) -> i64 {
    let (Some(v), Some(r), Some(s)) = (value.to_f64(), reference.to_f64(), ratio.to_f64()) else {
        return 0;
    };
    let est = ((v / r).ln() / s.ln()).floor();
    if est.is_finite() && est.abs() < 1e9 {
        est as i64
    } else {
        0
    }
}
