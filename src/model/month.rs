//! Month sheets are titled like `March 2024`. This module turns those titles into sortable keys and
//! walks from one month to the previous one.

use crate::model::filter::is_month_title;
use crate::model::record::clean_title;
use anyhow::{anyhow, bail};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One of the twelve months. Parsing is case-insensitive and the serialized form is lowercase.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

impl Month {
    /// Zero-based, January is 0.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        MONTHS.get(index).copied()
    }

    /// The month of a calendar date.
    pub fn of(date: NaiveDate) -> Self {
        // month0 is always in 0..12
        MONTHS[date.month0() as usize % 12]
    }

    /// The English name with a leading capital, as used in sheet titles.
    pub fn name(&self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name().to_lowercase())
    }
}

impl FromStr for Month {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MONTHS
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| anyhow!("'{s}' is not the name of a month"))
    }
}

/// The `{month, year}` of a month sheet. Orders chronologically.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    month: Month,
    year: i32,
}

impl MonthKey {
    pub fn new(month: Month, year: i32) -> Self {
        Self { month, year }
    }

    /// The month that contains `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self::new(Month::of(date), date.year())
    }

    /// Parses a worksheet title such as `March 2024` or ` march  2024`.
    pub fn parse(title: &str) -> anyhow::Result<Self> {
        if !is_month_title(title) {
            bail!("'{title}' is not a month sheet title");
        }
        let cleaned = clean_title(title);
        let (month, year) = cleaned
            .split_once(' ')
            .ok_or_else(|| anyhow!("'{title}' is not a month sheet title"))?;
        Ok(Self {
            month: month.parse()?,
            year: year.parse()?,
        })
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month before this one. January rolls back to December of the previous year.
    pub fn previous(&self) -> Self {
        match self.month.index() {
            0 => Self::new(Month::December, self.year - 1),
            // index - 1 is always a valid month here
            i => Self::new(Month::from_index(i - 1).unwrap_or(Month::January), self.year),
        }
    }

    /// The title a sheet for this month would have, e.g. `December 2024`.
    pub fn title(&self) -> String {
        format!("{} {}", self.month.name(), self.year)
    }
}

impl Ord for MonthKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then_with(|| self.month.cmp(&other.month))
    }
}

impl PartialOrd for MonthKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title())
    }
}

/// Sorts titles newest first and returns up to `n` of them. Titles that are not month titles are
/// dropped.
pub fn latest_titles<S: AsRef<str>>(titles: &[S], n: usize) -> Vec<String> {
    let mut keyed: Vec<(MonthKey, &str)> = titles
        .iter()
        .filter_map(|t| MonthKey::parse(t.as_ref()).ok().map(|k| (k, t.as_ref())))
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    keyed
        .into_iter()
        .take(n)
        .map(|(_, t)| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month_key() {
        let key = MonthKey::parse("March 2024").unwrap();
        assert_eq!(key.month(), Month::March);
        assert_eq!(key.year(), 2024);

        let key = MonthKey::parse("  sePTember   2023").unwrap();
        assert_eq!(key, MonthKey::new(Month::September, 2023));

        assert!(MonthKey::parse("Smarch 2024").is_err());
        assert!(MonthKey::parse("Summary").is_err());
    }

    #[test]
    fn test_previous_wraps_year() {
        let key = MonthKey::parse("January 2025").unwrap().previous();
        assert_eq!(key.month(), Month::December);
        assert_eq!(key.month().to_string(), "december");
        assert_eq!(key.year(), 2024);
        assert_eq!(key.title(), "December 2024");
    }

    #[test]
    fn test_previous_same_year() {
        let key = MonthKey::new(Month::July, 2024).previous();
        assert_eq!(key, MonthKey::new(Month::June, 2024));
    }

    #[test]
    fn test_ordering() {
        assert!(MonthKey::new(Month::December, 2023) < MonthKey::new(Month::January, 2024));
        assert!(MonthKey::new(Month::March, 2024) > MonthKey::new(Month::February, 2024));
    }

    #[test]
    fn test_latest_titles() {
        let titles = vec![
            "January 2024",
            "Summary",
            "December 2023",
            "March 2024",
            "February 2024",
        ];
        assert_eq!(
            latest_titles(&titles, 3),
            vec!["March 2024", "February 2024", "January 2024"]
        );
        assert_eq!(latest_titles(&titles, 10).len(), 4);
        assert!(latest_titles(&titles, 0).is_empty());
    }

    #[test]
    fn test_month_of_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(MonthKey::of(date).title(), "June 2024");
    }
}
