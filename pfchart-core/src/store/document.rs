//! ChartDocument — the persisted form of a chart.
//!
//! Carries every piece of ingest state, so reconstruction needs no replay.
//! Unknown (newer) schema versions are rejected before the body is decoded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::boxes::AtrWindow;
use crate::chart::Chart;
use crate::domain::{ChartDirection, ChartParams, Column, Interval};
use crate::fingerprint::ChartFingerprint;

/// Current document schema version. Bump on breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartDocument {
    pub schema_version: u32,
    pub params: ChartParams,
    pub interval: Interval,
    pub current_direction: ChartDirection,
    pub last_box_index: i64,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_value_seen: Option<Decimal>,
    pub first_value: Option<Decimal>,
    pub anchor_level: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr: Option<AtrWindow>,
    pub columns: Vec<Column>,
    pub fingerprint: ChartFingerprint,
}

#[derive(Deserialize)]
struct VersionHeader {
    schema_version: u32,
}

impl ChartDocument {
    pub fn from_chart(chart: &Chart, interval: Interval) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            params: chart.params.clone(),
            interval,
            current_direction: chart.direction,
            last_box_index: chart.last_box_index,
            last_timestamp: chart.last_timestamp,
            last_value_seen: chart.last_value_seen,
            first_value: chart.first_value,
            anchor_level: chart.anchor_level,
            atr: chart.atr.clone(),
            columns: chart.columns.clone(),
            fingerprint: chart.fingerprint(),
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode, refusing documents written by a newer schema.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let header: VersionHeader = serde_json::from_str(json)?;
        if header.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: header.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuild the chart, checking the document is internally consistent.
    pub fn into_chart(self) -> Result<Chart, StoreError> {
        let key = self.params.to_string();
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.clone(),
            reason,
        };

        let expected = ChartFingerprint::of(&self.params, &self.columns);
        if expected != self.fingerprint {
            return Err(corrupt(format!(
                "fingerprint {} does not match content {}",
                self.fingerprint, expected
            )));
        }

        let last_dir = self.columns.last().map(|c| ChartDirection::from(c.direction()));
        if last_dir.unwrap_or_default() != self.current_direction {
            return Err(corrupt(format!(
                "direction {} disagrees with the open column",
                self.current_direction.as_str()
            )));
        }
        if self
            .columns
            .windows(2)
            .any(|w| w[0].direction() == w[1].direction())
        {
            return Err(corrupt("adjacent columns share a direction".into()));
        }
        if let Some(end) = self.columns.last().and_then(Column::last_box) {
            // Fixed grids keep the open column's end as the last box.
            if !self.params.scale().is_atr() && end != self.last_box_index {
                return Err(corrupt(format!(
                    "last box {} is not the open column's end {}",
                    self.last_box_index, end
                )));
            }
        }

        match (&self.atr, self.params.scale().is_atr()) {
            (Some(window), true) if !window.is_valid() => {
                return Err(corrupt("ATR window is malformed".into()));
            }
            (None, true) => return Err(corrupt("ATR scale without an ATR window".into())),
            (Some(_), false) => return Err(corrupt("ATR window on a fixed scale".into())),
            _ => {}
        }

        Ok(Chart {
            params: self.params,
            columns: self.columns,
            direction: self.current_direction,
            last_box_index: self.last_box_index,
            last_value_seen: self.last_value_seen,
            last_timestamp: self.last_timestamp,
            first_value: self.first_value,
            anchor_level: self.anchor_level,
            atr: self.atr,
        })
    }
}
