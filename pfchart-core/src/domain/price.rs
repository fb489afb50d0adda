//! PricePoint — the unit of price history fed into charts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Intraperiod high/low, used for true range when a source provides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub high: Decimal,
    pub low: Decimal,
}

/// One observed price for a symbol at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<PriceRange>,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, value: Decimal) -> Self {
        Self {
            timestamp,
            value,
            range: None,
        }
    }

    pub fn with_range(mut self, high: Decimal, low: Decimal) -> Self {
        self.range = Some(PriceRange { high, low });
        self
    }

    /// Range sanity: high >= low and the value lies inside the range.
    pub fn is_sane(&self) -> bool {
        match self.range {
            None => true,
            Some(r) => r.high >= r.low && self.value <= r.high && self.value >= r.low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn range_sanity() {
        assert!(PricePoint::new(ts(), dec!(100)).is_sane());
        assert!(PricePoint::new(ts(), dec!(100))
            .with_range(dec!(101), dec!(99))
            .is_sane());
        assert!(!PricePoint::new(ts(), dec!(100))
            .with_range(dec!(99), dec!(101))
            .is_sane());
        assert!(!PricePoint::new(ts(), dec!(105))
            .with_range(dec!(101), dec!(99))
            .is_sane());
    }

    #[test]
    fn serialization_omits_missing_range() {
        let json = serde_json::to_string(&PricePoint::new(ts(), dec!(1.5))).unwrap();
        assert!(!json.contains("range"));
        let back: PricePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, dec!(1.5));
    }
}
