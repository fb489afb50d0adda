//! Artifact naming: `{SYMBOL}_{box}{%}X{reversal}_{scale}[_{interval}].{ext}`.

use crate::domain::{ChartParams, Interval};

/// File name for a chart artifact.
///
/// The interval suffix is only written for end-of-day charts; live charts
/// carry none.
pub fn chart_file_name(params: &ChartParams, interval: Interval, ext: &str) -> String {
    let pct = if params.scale().is_percent() { "%" } else { "" };
    let suffix = match interval {
        Interval::Eod => format!("_{}", interval.as_str()),
        Interval::Live => String::new(),
    };
    format!(
        "{}_{}{}X{}_{}{}.{}",
        params.symbol(),
        params.box_size_label(),
        pct,
        params.reversal_boxes(),
        params.scale().name(),
        suffix,
        ext
    )
}
