//! Converts the raw cell grid of a worksheet into string-keyed records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trims surrounding whitespace and collapses internal runs of whitespace to a single space.
pub fn clean_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One tab of a spreadsheet document after it has been downloaded.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    id: i64,
    title: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Worksheet {
    /// Creates a `Worksheet` from the values of a tab, where the first row holds the headers.
    /// Headers are trimmed. A tab without any rows has no headers and no data.
    pub fn from_values(id: i64, title: impl Into<String>, values: Vec<Vec<String>>) -> Self {
        let mut rows = values.into_iter();
        let headers = rows
            .next()
            .map(|header_row| header_row.iter().map(|h| h.trim().to_string()).collect())
            .unwrap_or_default();
        Self {
            id,
            title: title.into(),
            headers,
            rows: rows.collect(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// The data rows, i.e. everything below the header row, exactly as they were downloaded.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn has_header(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == header)
    }

    pub fn header_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Normalizes every data row. No row is dropped here.
    pub fn records(&self) -> Vec<Record> {
        normalize(&self.headers, &self.rows)
    }
}

/// A spreadsheet row as a map from (trimmed) header name to (trimmed) cell value. Every header of
/// the worksheet is present; cells that were missing from the row are empty strings.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    /// Returns the value under `header`, or an empty string if there is no such header.
    pub fn get(&self, header: &str) -> &str {
        self.0.get(header).map(String::as_str).unwrap_or("")
    }

    pub fn has(&self, header: &str) -> bool {
        self.0.contains_key(header)
    }

    /// Sets a field, e.g. a status computed from the other fields.
    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.0.insert(header.into(), value.into());
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Pairs each row's cells positionally with `headers`. If a header is repeated, the right-most
/// column wins.
pub fn normalize<H, C>(headers: &[H], rows: &[Vec<C>]) -> Vec<Record>
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    rows.iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(ix, header)| {
                    let value = row.get(ix).map(|c| c.as_ref().trim()).unwrap_or("");
                    (header.as_ref().trim().to_string(), value.to_string())
                })
                .collect()
        })
        .collect()
}
