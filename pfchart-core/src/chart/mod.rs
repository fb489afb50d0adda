//! Chart — the point-and-figure state machine.
//!
//! A chart owns its columns and the minimum state needed to place the next
//! value: direction, last box index, the reference value of a percent grid,
//! the price level of the last box and (for volatility-adaptive scales) the
//! ATR window. All of it round-trips through the stores, so a chart seeded
//! from storage continues exactly where the stored run left off.
//!
//! Ingestion contract:
//! - timestamps are strictly increasing; a rejected value mutates nothing
//! - the first value only establishes the reference
//! - a column opens once the value leaves the reference box
//! - the open column extends on any continuation
//! - a reversal needs `reversal_boxes` boxes against the last box, and the
//!   new column starts one box beyond it

pub mod naming;

pub use naming::chart_file_name;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::boxes::{AtrWindow, BoxGrid, GridError, DEFAULT_ATR_PERIOD};
use crate::domain::{ChartDirection, ChartParams, Column, Direction, ParamError, PricePoint};
use crate::fingerprint::ChartFingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("invalid chart parameters: {0}")]
    InvalidParams(#[from] ParamError),

    #[error("{symbol}: timestamp {got} is not after last accepted {last}")]
    OrderingViolation {
        symbol: String,
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("{symbol}: value {value} cannot be placed on a {scale} grid")]
    InvalidValue {
        symbol: String,
        value: Decimal,
        scale: String,
    },

    #[error("{symbol}: box arithmetic overflowed at value {value}")]
    Overflow { symbol: String, value: Decimal },
}

/// What an accepted value did to the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The first value of the series: recorded as the reference.
    FirstValue,
    /// Accepted and recorded as seen; columns and direction untouched.
    NoChange,
    /// The first column was opened.
    Opened(Direction),
    /// The open column grew by `boxes`.
    Extended { boxes: usize },
    /// A new column in the given direction was opened.
    Reversed(Direction),
}

impl IngestOutcome {
    pub fn changed_columns(&self) -> bool {
        !matches!(self, Self::FirstValue | Self::NoChange)
    }
}

/// Placement decided for one value, before anything is mutated.
enum Move {
    Stay,
    Open { direction: Direction, from: i64, to: i64 },
    Extend { to: i64 },
    Reverse { direction: Direction, from: i64, to: i64 },
}

#[derive(Debug, Clone)]
pub struct Chart {
    pub(crate) params: ChartParams,
    pub(crate) columns: Vec<Column>,
    pub(crate) direction: ChartDirection,
    pub(crate) last_box_index: i64,
    pub(crate) last_value_seen: Option<Decimal>,
    pub(crate) last_timestamp: Option<DateTime<Utc>>,
    pub(crate) first_value: Option<Decimal>,
    pub(crate) anchor_level: Option<Decimal>,
    pub(crate) atr: Option<AtrWindow>,
}

impl Chart {
    /// Empty chart. Volatility-adaptive scales get an ATR window of the default period.
    pub fn new(params: ChartParams) -> Self {
        Self::with_atr_period(params, DEFAULT_ATR_PERIOD)
    }

    pub fn with_atr_period(params: ChartParams, atr_period: usize) -> Self {
        let atr = params.scale().is_atr().then(|| AtrWindow::new(atr_period));
        Self {
            params,
            columns: Vec::new(),
            direction: ChartDirection::Undetermined,
            last_box_index: 0,
            last_value_seen: None,
            last_timestamp: None,
            first_value: None,
            anchor_level: None,
            atr,
        }
    }

    pub fn params(&self) -> &ChartParams {
        &self.params
    }

    pub fn symbol(&self) -> &str {
        self.params.symbol()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The open column, if any.
    pub fn current_column(&self) -> Option<&Column> {
        self.columns.last()
    }

    pub fn direction(&self) -> ChartDirection {
        self.direction
    }

    pub fn last_box_index(&self) -> i64 {
        self.last_box_index
    }

    pub fn last_value_seen(&self) -> Option<Decimal> {
        self.last_value_seen
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    pub fn first_value(&self) -> Option<Decimal> {
        self.first_value
    }

    pub fn anchor_level(&self) -> Option<Decimal> {
        self.anchor_level
    }

    pub fn atr_window(&self) -> Option<&AtrWindow> {
        self.atr.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn total_boxes(&self) -> usize {
        self.columns.iter().map(Column::len).sum()
    }

    pub fn fingerprint(&self) -> ChartFingerprint {
        ChartFingerprint::of(&self.params, &self.columns)
    }

    /// Ingest a bare value.
    pub fn ingest(
        &mut self,
        value: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<IngestOutcome, ChartError> {
        self.ingest_point(&PricePoint::new(timestamp, value))
    }

    /// Ingest one price point. On error the chart is left exactly as it was.
    pub fn ingest_point(&mut self, point: &PricePoint) -> Result<IngestOutcome, ChartError> {
        if let Some(last) = self.last_timestamp {
            if point.timestamp <= last {
                return Err(ChartError::OrderingViolation {
                    symbol: self.params.symbol().to_string(),
                    last,
                    got: point.timestamp,
                });
            }
        }
        let value = point.value;
        if self.params.scale().is_percent() && value <= Decimal::ZERO {
            return Err(self.invalid_value(value));
        }

        let mut atr = self.atr.clone();
        if let Some(window) = atr.as_mut() {
            window.update(point).map_err(|e| self.grid_error(value, e))?;
        }
        let grid = self.grid_with(atr.as_ref(), value)?;

        let outcome = match self.first_value {
            None => {
                // The reference box is only known once a grid exists.
                let placed = match grid {
                    Some(g) => {
                        let index = self.index_on(&g, value)?;
                        Some((index, self.lower_on(&g, index, value)?))
                    }
                    None => None,
                };
                if let Some((index, anchor)) = placed {
                    self.last_box_index = index;
                    self.anchor_level = Some(anchor);
                }
                self.first_value = Some(value);
                IngestOutcome::FirstValue
            }
            Some(first) => match grid {
                None => IngestOutcome::NoChange,
                Some(g) => {
                    let new_index = self.index_on(&g, value)?;
                    let last = self.current_last_index(&g, first, value)?;
                    let step = self.plan(last, new_index);
                    let target = match step {
                        Move::Stay => None,
                        Move::Open { to, .. } | Move::Extend { to } | Move::Reverse { to, .. } => {
                            Some(to)
                        }
                    };
                    let anchor = match target {
                        Some(to) => Some(self.lower_on(&g, to, value)?),
                        None => None,
                    };
                    self.apply(step, last, anchor)
                }
            },
        };

        self.atr = atr;
        self.last_value_seen = Some(value);
        self.last_timestamp = Some(point.timestamp);
        Ok(outcome)
    }

    /// Box index of `value` under the chart's current grid.
    ///
    /// `None` while a volatility-adaptive chart has no usable ATR yet.
    pub fn box_index_for(&self, value: Decimal) -> Result<Option<i64>, ChartError> {
        if self.params.scale().is_percent() && value <= Decimal::ZERO {
            return Err(self.invalid_value(value));
        }
        match self.grid_with(self.atr.as_ref(), value)? {
            Some(g) => Ok(Some(self.index_on(&g, value)?)),
            None => Ok(None),
        }
    }

    /// `(lower, upper)` of box `index` under the chart's current grid.
    pub fn box_boundaries_for(&self, index: i64) -> Result<Option<(Decimal, Decimal)>, ChartError> {
        let value = self
            .last_value_seen
            .or(self.first_value)
            .unwrap_or(self.params.box_size());
        match self.grid_with(self.atr.as_ref(), value)? {
            Some(g) => g
                .boundaries(index)
                .map(Some)
                .map_err(|e| self.grid_error(value, e)),
            None => Ok(None),
        }
    }

    /// Grid in effect for `value`. `None` when an ATR scale has no usable ATR.
    fn grid_with(
        &self,
        atr: Option<&AtrWindow>,
        value: Decimal,
    ) -> Result<Option<BoxGrid>, ChartError> {
        use crate::domain::BoxScale;

        let box_size = self.params.box_size();
        let reference = self.first_value.unwrap_or(value);
        let grid = match self.params.scale() {
            BoxScale::Linear => BoxGrid::linear(box_size),
            BoxScale::Percent => BoxGrid::percent(reference, box_size),
            BoxScale::AtrLinear | BoxScale::AtrPercent => {
                let average = match atr {
                    Some(window) => window.average().map_err(|e| self.grid_error(value, e))?,
                    None => None,
                };
                let Some(avg) = average else {
                    return Ok(None);
                };
                if avg <= Decimal::ZERO {
                    return Ok(None);
                }
                let effective = box_size
                    .checked_mul(avg)
                    .ok_or_else(|| self.overflow(value))?;
                if self.params.scale() == BoxScale::AtrLinear {
                    BoxGrid::linear(effective)
                } else {
                    let fraction = effective
                        .checked_div(value)
                        .ok_or_else(|| self.overflow(value))?;
                    if fraction <= Decimal::ZERO {
                        return Ok(None);
                    }
                    BoxGrid::percent(reference, fraction)
                }
            }
        };
        grid.map(Some).map_err(|e| self.grid_error(value, e))
    }

    /// The last box index expressed on grid `g`.
    ///
    /// Fixed grids keep the stored index. Volatility-adaptive grids move with
    /// the ATR, so the index is re-derived from the last box's price level.
    fn current_last_index(&self, g: &BoxGrid, first: Decimal, value: Decimal) -> Result<i64, ChartError> {
        if !self.params.scale().is_atr() {
            return Ok(self.last_box_index);
        }
        let level = self.anchor_level.unwrap_or(first);
        self.index_on(g, level).map_err(|_| self.overflow(value))
    }

    fn plan(&self, last: i64, new: i64) -> Move {
        let reversal = i64::from(self.params.reversal_boxes());
        match self.direction {
            ChartDirection::Undetermined if new > last => Move::Open {
                direction: Direction::Up,
                from: last,
                to: new,
            },
            ChartDirection::Undetermined if new < last => Move::Open {
                direction: Direction::Down,
                from: last,
                to: new,
            },
            ChartDirection::Undetermined => Move::Stay,
            ChartDirection::Up if new > last => Move::Extend { to: new },
            ChartDirection::Up if new <= last.saturating_sub(reversal) => Move::Reverse {
                direction: Direction::Down,
                from: last - 1,
                to: new,
            },
            ChartDirection::Down if new < last => Move::Extend { to: new },
            ChartDirection::Down if new >= last.saturating_add(reversal) => Move::Reverse {
                direction: Direction::Up,
                from: last + 1,
                to: new,
            },
            ChartDirection::Up | ChartDirection::Down => Move::Stay,
        }
    }

    fn apply(&mut self, step: Move, last: i64, anchor: Option<Decimal>) -> IngestOutcome {
        let outcome = match step {
            Move::Stay => return IngestOutcome::NoChange,
            Move::Open { direction, from, to } => {
                self.columns.push(Column::spanning(direction, from, to));
                self.direction = direction.into();
                self.last_box_index = to;
                IngestOutcome::Opened(direction)
            }
            Move::Extend { to } => {
                // Volatility-adaptive grids may have re-derived `last`; keep the
                // column's own end as the extension start.
                let boxes = match self.columns.last_mut() {
                    Some(column) => column.extend_to(to),
                    None => 0,
                };
                self.last_box_index = to;
                if boxes == 0 {
                    // the target sits inside the column drawn on a finer grid
                    self.anchor_level = anchor;
                    return IngestOutcome::NoChange;
                }
                IngestOutcome::Extended { boxes }
            }
            Move::Reverse { direction, from, to } => {
                debug!(
                    symbol = self.params.symbol(),
                    params = %self.params,
                    from = last,
                    to,
                    direction = direction.as_str(),
                    "reversal"
                );
                self.columns.push(Column::spanning(direction, from, to));
                self.direction = direction.into();
                self.last_box_index = to;
                IngestOutcome::Reversed(direction)
            }
        };
        self.anchor_level = anchor;
        outcome
    }

    fn index_on(&self, g: &BoxGrid, value: Decimal) -> Result<i64, ChartError> {
        g.index_for(value).map_err(|e| self.grid_error(value, e))
    }

    fn lower_on(&self, g: &BoxGrid, index: i64, value: Decimal) -> Result<Decimal, ChartError> {
        g.lower_bound(index).map_err(|e| self.grid_error(value, e))
    }

    fn grid_error(&self, value: Decimal, e: GridError) -> ChartError {
        match e {
            GridError::Overflow => self.overflow(value),
            GridError::NonPositiveBox(_) | GridError::NonPositiveValue(_) => self.invalid_value(value),
        }
    }

    fn invalid_value(&self, value: Decimal) -> ChartError {
        ChartError::InvalidValue {
            symbol: self.params.symbol().to_string(),
            value,
            scale: self.params.scale().to_string(),
        }
    }

    fn overflow(&self, value: Decimal) -> ChartError {
        ChartError::Overflow {
            symbol: self.params.symbol().to_string(),
            value,
        }
    }
}

/// Charts are the same series in the same shape: params and columns match.
impl PartialEq for Chart {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params && self.columns == other.columns
    }
}

impl Eq for Chart {}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} columns, direction {}",
            self.params,
            self.columns.len(),
            self.direction.as_str()
        )?;
        for (i, column) in self.columns.iter().enumerate() {
            let mark = match column.direction() {
                Direction::Up => 'X',
                Direction::Down => 'O',
            };
            let (Some(first), Some(last)) = (column.first_box(), column.last_box()) else {
                continue;
            };
            writeln!(f, "{:>4} {} {:>6} -> {:<6} ({} boxes)", i, mark, first, last, column.len())?;
        }
        Ok(())
    }
}
