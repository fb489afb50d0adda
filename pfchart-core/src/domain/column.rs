//! Column — a maximal run of same-direction box movement.

use serde::{Deserialize, Serialize};

/// Direction of a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Box-index increment when moving in this direction.
    pub fn step(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Direction of the chart as a whole, including the state before any column exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartDirection {
    #[default]
    Undetermined,
    Up,
    Down,
}

impl ChartDirection {
    pub fn column_direction(self) -> Option<Direction> {
        match self {
            Self::Undetermined => None,
            Self::Up => Some(Direction::Up),
            Self::Down => Some(Direction::Down),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undetermined => "undetermined",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl From<Direction> for ChartDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Up => Self::Up,
            Direction::Down => Self::Down,
        }
    }
}

/// One point-and-figure column: a direction and the box indices it touched.
///
/// Invariant: `boxes` is non-empty and strictly monotonic in `direction`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawColumn")]
pub struct Column {
    direction: Direction,
    boxes: Vec<i64>,
}

#[derive(Deserialize)]
struct RawColumn {
    direction: Direction,
    boxes: Vec<i64>,
}

impl TryFrom<RawColumn> for Column {
    type Error = String;

    fn try_from(raw: RawColumn) -> Result<Self, Self::Error> {
        let direction = raw.direction;
        Column::from_parts(direction, raw.boxes).ok_or_else(|| {
            format!(
                "{} column boxes must be non-empty and strictly monotonic",
                direction.as_str()
            )
        })
    }
}

impl Column {
    /// Column covering `from..=to`, stepping in `direction`.
    ///
    /// Callers guarantee `to` lies at or beyond `from` in `direction`.
    pub(crate) fn spanning(direction: Direction, from: i64, to: i64) -> Self {
        let boxes = match direction {
            Direction::Up => (from..=to).collect(),
            Direction::Down => (to..=from).rev().collect(),
        };
        Self { direction, boxes }
    }

    /// Rebuild a column from stored parts, checking the monotonic invariant.
    pub fn from_parts(direction: Direction, boxes: Vec<i64>) -> Option<Self> {
        let column = Self { direction, boxes };
        column.is_well_formed().then_some(column)
    }

    /// Append every box after the current end up to and including `to`.
    /// Returns the number of boxes appended.
    pub(crate) fn extend_to(&mut self, to: i64) -> usize {
        let Some(end) = self.last_box() else {
            return 0;
        };
        let before = self.boxes.len();
        match self.direction {
            Direction::Up => self.boxes.extend(end + 1..=to),
            Direction::Down => self.boxes.extend((to..end).rev()),
        }
        self.boxes.len() - before
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn boxes(&self) -> &[i64] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn first_box(&self) -> Option<i64> {
        self.boxes.first().copied()
    }

    /// The box most recently reached (top of an up column, bottom of a down column).
    pub fn last_box(&self) -> Option<i64> {
        self.boxes.last().copied()
    }

    pub fn top(&self) -> Option<i64> {
        self.boxes.iter().copied().max()
    }

    pub fn bottom(&self) -> Option<i64> {
        self.boxes.iter().copied().min()
    }

    fn is_well_formed(&self) -> bool {
        !self.boxes.is_empty()
            && self.boxes.windows(2).all(|w| match self.direction {
                Direction::Up => w[1] > w[0],
                Direction::Down => w[1] < w[0],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanning_up_and_down() {
        assert_eq!(Column::spanning(Direction::Up, 10, 13).boxes(), &[10, 11, 12, 13]);
        assert_eq!(Column::spanning(Direction::Down, 12, 9).boxes(), &[12, 11, 10, 9]);
        assert_eq!(Column::spanning(Direction::Down, -1, -3).boxes(), &[-1, -2, -3]);
    }

    #[test]
    fn extend_appends_only_new_boxes() {
        let mut up = Column::spanning(Direction::Up, 10, 11);
        assert_eq!(up.extend_to(14), 3);
        assert_eq!(up.boxes(), &[10, 11, 12, 13, 14]);

        let mut down = Column::spanning(Direction::Down, 5, 4);
        assert_eq!(down.extend_to(1), 3);
        assert_eq!(down.boxes(), &[5, 4, 3, 2, 1]);
    }

    #[test]
    fn from_parts_checks_monotonicity() {
        assert!(Column::from_parts(Direction::Up, vec![1, 2, 3]).is_some());
        assert!(Column::from_parts(Direction::Up, vec![1, 1, 2]).is_none());
        assert!(Column::from_parts(Direction::Down, vec![3, 4]).is_none());
        assert!(Column::from_parts(Direction::Down, vec![]).is_none());
    }

    #[test]
    fn deserialization_checks_monotonicity() {
        let good: Column = serde_json::from_str(r#"{"direction":"down","boxes":[3,2]}"#).unwrap();
        assert_eq!(good.boxes(), &[3, 2]);
        assert!(serde_json::from_str::<Column>(r#"{"direction":"up","boxes":[3,2]}"#).is_err());
    }

    #[test]
    fn top_and_bottom() {
        let c = Column::spanning(Direction::Down, 8, 5);
        assert_eq!(c.top(), Some(8));
        assert_eq!(c.bottom(), Some(5));
        assert_eq!(c.last_box(), Some(5));
    }
}
