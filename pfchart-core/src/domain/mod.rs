//! Domain types for point-and-figure charts

pub mod column;
pub mod params;
pub mod price;

pub use column::{ChartDirection, Column, Direction};
pub use params::{BoxScale, ChartParams, Interval, ParamError};
pub use price::{PricePoint, PriceRange};

/// Symbol type alias
pub type Symbol = String;
