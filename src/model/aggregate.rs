//! Folds normalized records into per-date numbers.

use crate::model::filter::{RowFilter, SheetDate, DATE};
use crate::model::number::{number_or_zero, parse_number, safe_div, Metric};
use crate::model::record::{Record, Worksheet};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub const TIME: &str = "Time";
pub const TOTAL: &str = "Total";
pub const PRESENT: &str = "Present";
pub const DEPARTMENT: &str = "Department";

/// A mapping from sheet date to a number, ordered chronologically. Serializes as a JSON object
/// keyed by the date text from the sheet.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DateAggregate(BTreeMap<SheetDate, f64>);

impl DateAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to the running total for `date`, creating it at zero if needed.
    pub fn add(&mut self, date: SheetDate, value: f64) {
        *self.0.entry(date).or_insert(0.0) += value;
    }

    pub fn get(&self, date: &SheetDate) -> Option<f64> {
        self.0.get(date).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&SheetDate, f64)> + '_ {
        self.0.iter().map(|(d, v)| (d, *v))
    }

    /// Drops every date whose value is not strictly positive.
    pub fn retain_positive(&mut self) {
        self.0.retain(|_, v| *v > 0.0);
    }

    /// The sum and the number of dates over strictly positive values only.
    pub fn positive_totals(&self) -> PositiveTotals {
        self.0
            .values()
            .filter(|v| **v > 0.0)
            .fold(PositiveTotals::default(), |mut acc, v| {
                acc.sum += v;
                acc.days += 1;
                acc
            })
    }
}

impl FromIterator<(SheetDate, f64)> for DateAggregate {
    fn from_iter<T: IntoIterator<Item = (SheetDate, f64)>>(iter: T) -> Self {
        let mut agg = Self::new();
        for (date, value) in iter {
            agg.add(date, value);
        }
        agg
    }
}

impl Serialize for DateAggregate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (date, value) in &self.0 {
            map.serialize_entry(date.as_str(), &Metric(*value))?;
        }
        map.end()
    }
}

/// A sum and the number of days that went into it.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PositiveTotals {
    pub sum: f64,
    pub days: usize,
}

impl PositiveTotals {
    pub fn average(&self) -> f64 {
        safe_div(self.sum, self.days as f64)
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            days: self.days + other.days,
        }
    }
}

/// Counts how many people a single attendance row stands for.
pub trait AttendanceCounter: Send + Sync {
    /// Returns `None` when the row should not create an entry for its date at all.
    fn count(&self, record: &Record) -> Option<f64>;
}

/// One row per person per day, with their punch in the `Time` column.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerPunch;

impl AttendanceCounter for PerPunch {
    fn count(&self, record: &Record) -> Option<f64> {
        if record.get(TIME).is_empty() {
            None
        } else {
            Some(1.0)
        }
    }
}

/// One row per department per day holding the headcount in `Present`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreAggregated;

impl AttendanceCounter for PreAggregated {
    fn count(&self, record: &Record) -> Option<f64> {
        Some(parse_number(record.get(PRESENT)).unwrap_or_default())
    }
}

/// The shape of an attendance sheet.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AttendanceSchema {
    PerPunch,
    PreAggregated,
}

impl AttendanceSchema {
    /// Both `Total` and `Present` columns mean the sheet is pre-aggregated.
    pub fn detect(worksheet: &Worksheet) -> Self {
        if worksheet.has_header(TOTAL) && worksheet.has_header(PRESENT) {
            AttendanceSchema::PreAggregated
        } else {
            AttendanceSchema::PerPunch
        }
    }

    pub fn counter(&self) -> &'static dyn AttendanceCounter {
        match self {
            AttendanceSchema::PerPunch => &PerPunch,
            AttendanceSchema::PreAggregated => &PreAggregated,
        }
    }
}

/// Picks the counting strategy for a worksheet once, by looking at its headers.
pub fn counter_for(worksheet: &Worksheet) -> &'static dyn AttendanceCounter {
    AttendanceSchema::detect(worksheet).counter()
}

/// Present people per date.
pub fn attendance_by_date(
    records: &[Record],
    filter: &RowFilter<'_>,
    counter: &dyn AttendanceCounter,
) -> DateAggregate {
    let mut agg = DateAggregate::new();
    for record in records.iter().filter(|r| filter.has_valid_date(r)) {
        if let Some(count) = counter.count(record) {
            if let Some(date) = SheetDate::parse(record.get(DATE)) {
                agg.add(date, count);
            }
        }
    }
    agg
}

/// Present people per date for a whole worksheet, detecting its schema.
pub fn worksheet_attendance(worksheet: &Worksheet, filter: &RowFilter<'_>) -> DateAggregate {
    attendance_by_date(&worksheet.records(), filter, counter_for(worksheet))
}

/// The sum of `column` per date over the rows `filter` accepts. Non-numeric cells add zero.
pub fn column_by_date(records: &[Record], filter: &RowFilter<'_>, column: &str) -> DateAggregate {
    filter
        .apply(records)
        .into_iter()
        .filter_map(|r| SheetDate::parse(r.get(DATE)).map(|d| (d, number_or_zero(r.get(column)))))
        .collect()
}

/// The sum of `column` over the rows `filter` accepts.
pub fn column_total(records: &[Record], filter: &RowFilter<'_>, column: &str) -> f64 {
    filter
        .apply(records)
        .into_iter()
        .map(|r| number_or_zero(r.get(column)))
        .sum()
}

/// Present people per department and date.
pub fn attendance_by_department(
    records: &[Record],
    filter: &RowFilter<'_>,
    counter: &dyn AttendanceCounter,
) -> BTreeMap<String, DateAggregate> {
    let mut departments: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for record in records {
        departments
            .entry(record.get(DEPARTMENT).to_string())
            .or_default()
            .push(record.clone());
    }
    departments
        .into_iter()
        .map(|(department, rows)| (department, attendance_by_date(&rows, filter, counter)))
        .collect()
}
