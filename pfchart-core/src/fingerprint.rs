//! Chart fingerprinting — deterministic content identity of a chart.
//!
//! The fingerprint covers params and columns only, the same fields chart
//! equality compares, so two equal charts always share a fingerprint.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{ChartParams, Column};

/// BLAKE3 hex digest of a chart's params and columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartFingerprint(pub String);

impl ChartFingerprint {
    pub fn of(params: &ChartParams, columns: &[Column]) -> Self {
        // Field order is fixed by the struct definitions, so the JSON is canonical.
        let canonical = serde_json::json!({
            "params": params,
            "columns": columns,
        });
        Self(blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChartFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
