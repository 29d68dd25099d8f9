//! The data pipeline: worksheet values are normalized into records, filtered, folded into per-date
//! aggregates and reduced to metrics. Nothing in here talks to the network.
mod aggregate;
mod filter;
mod metrics;
mod month;
mod number;
mod record;

pub use aggregate::{
    attendance_by_department, column_by_date, column_total, counter_for, worksheet_attendance,
    AttendanceSchema, DateAggregate, PositiveTotals, DEPARTMENT, TIME,
};
pub use filter::{
    is_month_title, parse_sheet_date, NumericRule, RowFilter, Sentinels, SheetDate, DATE,
};
#[cfg(test)]
pub use filter::{Sentinel, SentinelMatch};
pub use metrics::{
    average_positive, fixed2, join, percentage_change, trailing_average, JoinFilter, JoinedRecord,
};
pub use month::{latest_titles, MonthKey};
pub use number::{number_or_zero, parse_number, serialize_metric, Metric};
pub use record::{clean_title, Record, Worksheet};
