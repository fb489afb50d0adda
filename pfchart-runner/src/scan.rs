//! Scan deltas — what one update run did to a stored chart.

use pfchart_core::{Chart, ChartDirection, ChartParams};
use serde::Serialize;

/// Chart state captured before a scan ingests anything.
#[derive(Debug, Clone)]
pub struct ScanBaseline {
    columns: usize,
    total_boxes: usize,
    direction: ChartDirection,
    last_box_index: i64,
}

impl ScanBaseline {
    pub fn of(chart: &Chart) -> Self {
        Self {
            columns: chart.columns().len(),
            total_boxes: chart.total_boxes(),
            direction: chart.direction(),
            last_box_index: chart.last_box_index(),
        }
    }
}

/// Per-chart report of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanDelta {
    pub params: ChartParams,
    pub columns_before: usize,
    pub columns_after: usize,
    pub direction_before: ChartDirection,
    pub direction_after: ChartDirection,
    /// Boxes added across all columns.
    pub new_boxes: usize,
    pub last_box_before: i64,
    pub last_box_after: i64,
}

impl ScanDelta {
    pub fn between(baseline: &ScanBaseline, chart: &Chart) -> Self {
        Self {
            params: chart.params().clone(),
            columns_before: baseline.columns,
            columns_after: chart.columns().len(),
            direction_before: baseline.direction,
            direction_after: chart.direction(),
            new_boxes: chart.total_boxes().saturating_sub(baseline.total_boxes),
            last_box_before: baseline.last_box_index,
            last_box_after: chart.last_box_index(),
        }
    }

    pub fn direction_changed(&self) -> bool {
        self.direction_before != self.direction_after
    }

    pub fn is_changed(&self) -> bool {
        self.columns_after != self.columns_before
            || self.new_boxes > 0
            || self.direction_changed()
    }
}
