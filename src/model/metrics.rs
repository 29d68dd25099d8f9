//! Joins attendance with quotation data and derives the summary numbers.

use crate::model::aggregate::DateAggregate;
use crate::model::filter::SheetDate;
use crate::model::number::{round2, safe_div, serialize_metric};
use serde::Serialize;

/// Which joined dates are meaningful for a metric.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum JoinFilter {
    /// Both the measure and attendance must be positive.
    #[default]
    BothPositive,
    /// Only the measure must be positive.
    CostPositive,
    /// Only attendance must be positive.
    AttendancePositive,
    /// Keep every date of the measure.
    All,
}

impl JoinFilter {
    fn keep(&self, record: &JoinedRecord) -> bool {
        match self {
            JoinFilter::BothPositive => record.boxes > 0.0 && record.present > 0.0,
            JoinFilter::CostPositive => record.boxes > 0.0,
            JoinFilter::AttendancePositive => record.present > 0.0,
            JoinFilter::All => true,
        }
    }
}

/// A quotation measure and attendance on the same date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRecord {
    #[serde(rename = "Date")]
    pub date: SheetDate,
    #[serde(rename = "NoOfBoxes", serialize_with = "serialize_metric")]
    pub boxes: f64,
    #[serde(rename = "NoOfPresents", serialize_with = "serialize_metric")]
    pub present: f64,
}

/// Emits one record per date of `measure`, oldest first, with the attendance of that date (zero if
/// there is none), keeping the records `filter` accepts.
pub fn join(
    measure: &DateAggregate,
    attendance: &DateAggregate,
    filter: JoinFilter,
) -> Vec<JoinedRecord> {
    measure
        .iter()
        .map(|(date, boxes)| JoinedRecord {
            date: date.clone(),
            boxes,
            present: attendance.get(date).unwrap_or_default(),
        })
        .filter(|r| filter.keep(r))
        .collect()
}

/// The sum of the values divided by the number of strictly positive values. Zero days are
/// non-operating days and are left out of the denominator.
pub fn average_positive(agg: &DateAggregate) -> f64 {
    agg.positive_totals().average()
}

/// The average of the `n` most recent dates, after dropping zero days.
pub fn trailing_average(agg: &DateAggregate, n: usize) -> f64 {
    let recent: Vec<f64> = agg
        .iter()
        .rev()
        .filter(|(_, v)| *v > 0.0)
        .take(n)
        .map(|(_, v)| v)
        .collect();
    safe_div(recent.iter().sum(), recent.len() as f64)
}

/// `(latest - baseline) / baseline * 100` rounded to two places. `None` when the baseline is zero.
pub fn percentage_change(baseline: f64, latest: f64) -> Option<f64> {
    if baseline == 0.0 {
        return None;
    }
    let change = (latest - baseline) / baseline * 100.0;
    change.is_finite().then(|| round2(change))
}

/// Formats with exactly two decimals, e.g. `12.50`.
pub fn fixed2(value: f64) -> String {
    format_num::format_num!(".2f", value)
}
