//! Decides which worksheets are month sheets and which rows hold usable data.

use crate::model::number::parse_number;
use crate::model::record::{clean_title, Record};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// The header of the date column in both attendance and quotation sheets.
pub const DATE: &str = "Date";

/// The date format used in the sheets.
const DATE_FORMAT: &str = "%m/%d/%Y";

/// Returns true if `title`, once cleaned, looks like `March 2024`: letters, one space, four
/// digits. Summary tabs and templates fail this test.
pub fn is_month_title(title: &str) -> bool {
    let cleaned = clean_title(title);
    let Some((name, year)) = cleaned.split_once(' ') else {
        return false;
    };
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphabetic())
        && year.len() == 4
        && year.chars().all(|c| c.is_ascii_digit())
}

/// Parses a sheet date such as `03/01/2024` (month first).
pub fn parse_sheet_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// A date as it appears in a sheet, along with its parsed value. The text is kept for output.
/// Equality and ordering only look at the calendar date, so `3/1/2024` and `03/01/2024` are the
/// same key.
#[derive(Debug, Clone)]
pub struct SheetDate {
    date: NaiveDate,
    text: String,
}

impl SheetDate {
    pub fn parse(s: &str) -> Option<Self> {
        parse_sheet_date(s).map(|date| Self {
            date,
            text: s.trim().to_string(),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for SheetDate {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
    }
}

impl Eq for SheetDate {}

impl Hash for SheetDate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.date.hash(state)
    }
}

impl Ord for SheetDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date.cmp(&other.date)
    }
}

impl PartialOrd for SheetDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for SheetDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for SheetDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.text)
    }
}

/// How a sentinel value is compared with a date cell.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelMatch {
    #[default]
    Exact,
    Contains,
}

serde_plain::derive_display_from_serialize!(SentinelMatch);
serde_plain::derive_fromstr_from_deserialize!(SentinelMatch);

/// A marker that shows up in the date column of rows that are not data, e.g. `TOTAL (PKR)`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Sentinel {
    value: String,
    #[serde(rename = "match", default)]
    match_kind: SentinelMatch,
}

impl Sentinel {
    pub fn new(value: impl Into<String>, match_kind: SentinelMatch) -> Self {
        Self {
            value: value.into(),
            match_kind,
        }
    }

    /// Compares case-insensitively after trimming both sides.
    pub fn matches(&self, cell: &str) -> bool {
        let cell = cell.trim().to_lowercase();
        let value = self.value.trim().to_lowercase();
        match self.match_kind {
            SentinelMatch::Exact => cell == value,
            SentinelMatch::Contains => cell.contains(&value),
        }
    }
}

/// The list of sentinel markers. This is configuration so that new conventions can be added
/// without touching the aggregation code.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sentinels(Vec<Sentinel>);

impl Sentinels {
    pub fn new(sentinels: Vec<Sentinel>) -> Self {
        Self(sentinels)
    }

    pub fn matches(&self, cell: &str) -> bool {
        self.0.iter().any(|s| s.matches(cell))
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self(vec![
            Sentinel::new("TOTAL (PKR)", SentinelMatch::Exact),
            Sentinel::new("Sunday Excluded", SentinelMatch::Contains),
        ])
    }
}

/// What a row's numeric column must hold for the row to count.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum NumericRule {
    /// The column is not looked at.
    #[default]
    Any,
    /// The cell must not be blank.
    NonEmpty,
    /// The cell must parse as a number other than zero.
    NonZero,
}

/// Selects the usable rows of a worksheet.
#[derive(Debug, Clone)]
pub struct RowFilter<'a> {
    sentinels: &'a Sentinels,
    column: Option<(&'a str, NumericRule)>,
    skip_last: bool,
}

impl<'a> RowFilter<'a> {
    /// A filter that only checks the date column.
    pub fn new(sentinels: &'a Sentinels) -> Self {
        Self {
            sentinels,
            column: None,
            skip_last: false,
        }
    }

    /// Also require `column` to satisfy `rule`.
    pub fn numeric(mut self, column: &'a str, rule: NumericRule) -> Self {
        self.column = Some((column, rule));
        self
    }

    /// Always drop the last row. Older sheets keep a running total there.
    pub fn skip_last(mut self) -> Self {
        self.skip_last = true;
        self
    }

    /// True if the date column is non-empty, is not a sentinel and parses.
    pub fn has_valid_date(&self, record: &Record) -> bool {
        let date = record.get(DATE);
        !date.is_empty() && !self.sentinels.matches(date) && parse_sheet_date(date).is_some()
    }

    pub fn is_valid(&self, record: &Record) -> bool {
        if !self.has_valid_date(record) {
            return false;
        }
        match self.column {
            None | Some((_, NumericRule::Any)) => true,
            Some((column, NumericRule::NonEmpty)) => !record.get(column).is_empty(),
            Some((column, NumericRule::NonZero)) => {
                matches!(parse_number(record.get(column)), Some(n) if n != 0.0)
            }
        }
    }

    /// Returns the usable rows, in sheet order.
    pub fn apply<'r>(&self, records: &'r [Record]) -> Vec<&'r Record> {
        let end = if self.skip_last {
            records.len().saturating_sub(1)
        } else {
            records.len()
        };
        records[..end]
            .iter()
            .filter(|r| self.is_valid(r))
            .collect()
    }
}
