//! Average True Range window for volatility-adaptive box sizes.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! Without a high/low range the TR degenerates to |value-prev_close|.
//! ATR is the simple mean of the last `period` TR samples; it is not ready
//! until the window is full.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::GridError;
use crate::domain::{PricePoint, PriceRange};

pub const DEFAULT_ATR_PERIOD: usize = 14;

/// True range of one point given the previous close.
///
/// TR of the very first point is `high - low` when a range is known,
/// and undefined otherwise.
pub fn true_range(
    range: Option<PriceRange>,
    value: Decimal,
    prev_close: Option<Decimal>,
) -> Result<Option<Decimal>, GridError> {
    let diff = |a: Decimal, b: Decimal| a.checked_sub(b).map(|d| d.abs()).ok_or(GridError::Overflow);
    Ok(match (range, prev_close) {
        (Some(r), None) => Some(diff(r.high, r.low)?),
        (Some(r), Some(pc)) => Some(
            diff(r.high, r.low)?
                .max(diff(r.high, pc)?)
                .max(diff(r.low, pc)?),
        ),
        (None, Some(pc)) => Some(diff(value, pc)?),
        (None, None) => None,
    })
}

/// Rolling TR window. Persisted with the chart so resumed runs continue
/// from the exact same volatility state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtrWindow {
    period: usize,
    samples: VecDeque<Decimal>,
    prev_close: Option<Decimal>,
}

impl AtrWindow {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            samples: VecDeque::with_capacity(period),
            prev_close: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.period
    }

    /// Feed one point into the window. On overflow the window is untouched.
    pub fn update(&mut self, point: &PricePoint) -> Result<(), GridError> {
        if let Some(tr) = true_range(point.range, point.value, self.prev_close)? {
            if self.samples.len() == self.period {
                self.samples.pop_front();
            }
            self.samples.push_back(tr);
        }
        self.prev_close = Some(point.value);
        Ok(())
    }

    /// Mean TR over the window, `None` until `period` samples have been seen.
    pub fn average(&self) -> Result<Option<Decimal>, GridError> {
        if !self.is_ready() {
            return Ok(None);
        }
        let sum = self
            .samples
            .iter()
            .try_fold(Decimal::ZERO, |acc, tr| acc.checked_add(*tr))
            .ok_or(GridError::Overflow)?;
        sum.checked_div(Decimal::from(self.period))
            .map(Some)
            .ok_or(GridError::Overflow)
    }

    /// Structural check for windows coming back from storage.
    pub fn is_valid(&self) -> bool {
        self.period >= 1
            && self.samples.len() <= self.period
            && self.samples.iter().all(|s| *s >= Decimal::ZERO)
    }
}

impl Default for AtrWindow {
    fn default() -> Self {
        Self::new(DEFAULT_ATR_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn points(data: &[(Decimal, Decimal, Decimal)]) -> Vec<PricePoint> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                PricePoint::new(base + Duration::days(i as i64), close).with_range(high, low)
            })
            .collect()
    }

    #[test]
    fn true_range_basic() {
        let r = |h, l| Some(PriceRange { high: h, low: l });
        assert_eq!(
            true_range(r(dec!(105), dec!(95)), dec!(102), None).unwrap(),
            Some(dec!(10))
        );
        assert_eq!(
            true_range(r(dec!(108), dec!(100)), dec!(106), Some(dec!(102))).unwrap(),
            Some(dec!(8))
        );
        assert_eq!(
            true_range(r(dec!(107), dec!(98)), dec!(99), Some(dec!(106))).unwrap(),
            Some(dec!(9))
        );
    }

    #[test]
    fn true_range_gap_up() {
        let r = Some(PriceRange { high: dec!(115), low: dec!(108) });
        assert_eq!(true_range(r, dec!(112), Some(dec!(100))).unwrap(), Some(dec!(15)));
    }

    #[test]
    fn true_range_without_range_uses_close_to_close() {
        assert_eq!(true_range(None, dec!(97), Some(dec!(100))).unwrap(), Some(dec!(3)));
        assert_eq!(true_range(None, dec!(97), None).unwrap(), None);
    }

    #[test]
    fn average_is_simple_mean_of_window() {
        let mut w = AtrWindow::new(3);
        let pts = points(&[
            (dec!(105), dec!(95), dec!(102)),  // TR = 10
            (dec!(108), dec!(100), dec!(106)), // TR = 8
            (dec!(107), dec!(98), dec!(99)),   // TR = 9
            (dec!(103), dec!(97), dec!(101)),  // TR = 6
        ]);
        w.update(&pts[0]).unwrap();
        w.update(&pts[1]).unwrap();
        assert_eq!(w.average().unwrap(), None);
        w.update(&pts[2]).unwrap();
        assert_eq!(w.average().unwrap(), Some(dec!(9)));
        w.update(&pts[3]).unwrap();
        // window is now [8, 9, 6]
        assert_eq!(w.average().unwrap(), Some(dec!(23) / dec!(3)));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn close_only_window_skips_first_point() {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut w = AtrWindow::new(2);
        w.update(&PricePoint::new(base, dec!(100))).unwrap();
        assert!(w.is_empty());
        w.update(&PricePoint::new(base + Duration::days(1), dec!(104))).unwrap();
        w.update(&PricePoint::new(base + Duration::days(2), dec!(102))).unwrap();
        assert_eq!(w.average().unwrap(), Some(dec!(3)));
    }

    #[test]
    fn overflowing_range_is_an_error() {
        let r = Some(PriceRange { high: Decimal::MAX, low: Decimal::MIN });
        assert_eq!(true_range(r, dec!(1), None), Err(GridError::Overflow));
        assert_eq!(
            true_range(None, Decimal::MIN, Some(Decimal::MAX)),
            Err(GridError::Overflow)
        );
    }

    #[test]
    fn overflowing_sum_is_an_error_and_leaves_window_intact() {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut w = AtrWindow::new(2);
        w.update(&PricePoint::new(base, Decimal::ZERO)).unwrap();
        w.update(&PricePoint::new(base + Duration::days(1), Decimal::MAX)).unwrap();
        w.update(&PricePoint::new(base + Duration::days(2), Decimal::ZERO)).unwrap();
        // two samples of Decimal::MAX
        assert_eq!(w.average(), Err(GridError::Overflow));

        let mut w = AtrWindow::new(2);
        w.update(&PricePoint::new(base, Decimal::MAX)).unwrap();
        let before = w.clone();
        let wild = PricePoint::new(base + Duration::days(1), Decimal::MIN);
        assert_eq!(w.update(&wild), Err(GridError::Overflow));
        assert_eq!(w, before);
    }

    #[test]
    fn zero_period_is_clamped() {
        assert_eq!(AtrWindow::new(0).period(), 1);
        assert_eq!(AtrWindow::default().period(), DEFAULT_ATR_PERIOD);
    }

    #[test]
    fn validity_check() {
        let good = AtrWindow::new(2);
        assert!(good.is_valid());
        let json = r#"{"period":1,"samples":["1","2"],"prev_close":null}"#;
        let bad: AtrWindow = serde_json::from_str(json).unwrap();
        assert!(!bad.is_valid());
    }
}
