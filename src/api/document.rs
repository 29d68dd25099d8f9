//! An opened spreadsheet document and the ways of picking worksheets out of it.

use crate::api::Spreadsheets;
use crate::error::{Error, Result};
use crate::model::{
    clean_title, is_month_title, latest_titles, MonthKey, Record, RowFilter, Worksheet,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The metadata of one tab of a document.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorksheetInfo {
    id: i64,
    index: i64,
    title: String,
}

impl WorksheetInfo {
    pub fn new(id: i64, index: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            index,
            title: title.into(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn title_matches(&self, title: &str) -> bool {
        clean_title(&self.title).to_lowercase() == clean_title(title).to_lowercase()
    }
}

/// Rows collected by walking backwards from one month sheet into earlier ones.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TrailingWindow {
    /// Oldest first.
    pub rows: Vec<Record>,
    /// False when the walk ran out of sheets before enough rows were found.
    pub complete: bool,
}

/// A spreadsheet document whose worksheet list has been fetched.
#[derive(Clone)]
pub struct Document {
    id: String,
    worksheets: Vec<WorksheetInfo>,
    sheets: Arc<dyn Spreadsheets>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("worksheets", &self.worksheets)
            .finish()
    }
}

impl Document {
    /// Fetches the worksheet list of document `id`.
    pub async fn open(sheets: Arc<dyn Spreadsheets>, id: &str) -> Result<Self> {
        let mut worksheets = sheets.worksheets(id).await?;
        worksheets.sort_by_key(|w| w.index);
        debug!("Opened document {id} with {} worksheets", worksheets.len());
        Ok(Self {
            id: id.to_string(),
            worksheets,
            sheets,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// All worksheets in tab order.
    pub fn worksheets(&self) -> &[WorksheetInfo] {
        &self.worksheets
    }

    /// Finds a worksheet by title, ignoring case and extra whitespace.
    pub fn by_title(&self, title: &str) -> Option<&WorksheetInfo> {
        self.worksheets.iter().find(|w| w.title_matches(title))
    }

    pub fn by_id(&self, id: i64) -> Option<&WorksheetInfo> {
        self.worksheets.iter().find(|w| w.id == id)
    }

    /// Interprets `id_or_title` as a numeric worksheet id if it is one and such a worksheet
    /// exists, otherwise as a title.
    pub fn select(&self, id_or_title: &str) -> Result<&WorksheetInfo> {
        id_or_title
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|id| self.by_id(id))
            .or_else(|| self.by_title(id_or_title))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Worksheet '{id_or_title}' not found in document '{}'",
                    self.id
                ))
            })
    }

    /// The worksheet for the month before `info`'s month, if `info` is a month sheet and the
    /// previous month exists in this document.
    pub fn previous_month(&self, info: &WorksheetInfo) -> Option<&WorksheetInfo> {
        let previous = MonthKey::parse(info.title()).ok()?.previous();
        self.by_title(&previous.title())
    }

    /// Worksheets whose titles look like `March 2024`, in tab order.
    pub fn month_sheets(&self) -> Vec<&WorksheetInfo> {
        self.worksheets
            .iter()
            .filter(|w| is_month_title(w.title()))
            .collect()
    }

    /// Downloads the contents of a worksheet.
    pub async fn load(&self, info: &WorksheetInfo) -> Result<Worksheet> {
        let values = self.sheets.values(&self.id, info.title()).await?;
        Ok(Worksheet::from_values(info.id(), info.title(), values))
    }

    /// Selects by id or title, then downloads.
    pub async fn worksheet(&self, id_or_title: &str) -> Result<Worksheet> {
        let info = self.select(id_or_title)?;
        self.load(info).await
    }

    /// Downloads every month sheet. A sheet that fails to load is logged and skipped.
    pub async fn load_month_sheets(&self) -> Vec<Worksheet> {
        let mut loaded = Vec::new();
        for info in self.month_sheets() {
            match self.load(info).await {
                Ok(worksheet) => loaded.push(worksheet),
                Err(e) => warn!("Skipping worksheet '{}': {e}", info.title()),
            }
        }
        loaded
    }

    /// The `n` most recent month sheets, newest first. When `required_column` is given, sheets
    /// without that header are passed over. Sheets that fail to load are skipped.
    pub async fn latest(&self, n: usize, required_column: Option<&str>) -> Vec<Worksheet> {
        let titles: Vec<&str> = self.month_sheets().iter().map(|w| w.title()).collect();
        let mut found = Vec::new();
        for title in latest_titles(&titles, titles.len()) {
            if found.len() == n {
                break;
            }
            let Some(info) = self.by_title(&title) else {
                continue;
            };
            let worksheet = match self.load(info).await {
                Ok(worksheet) => worksheet,
                Err(e) => {
                    warn!("Skipping worksheet '{title}': {e}");
                    continue;
                }
            };
            if let Some(column) = required_column {
                if !worksheet.has_header(column) {
                    debug!("Worksheet '{title}' has no '{column}' column");
                    continue;
                }
            }
            found.push(worksheet);
        }
        found
    }

    /// Starting at `start`, takes the last `n` rows that `filter` accepts, then keeps stepping to
    /// the previous month's sheet until `n` rows have been collected. The walk stops early when
    /// a title is not a month title, the previous month has no sheet, or an earlier sheet fails
    /// to load. Only a failure to load `start` itself is an error.
    pub async fn trailing_window(
        &self,
        start: &WorksheetInfo,
        n: usize,
        filter: &RowFilter<'_>,
    ) -> Result<TrailingWindow> {
        let mut rows: Vec<Record> = Vec::new();
        let mut current = Some(start);
        while let Some(info) = current {
            let records = match self.load(info).await {
                Ok(worksheet) => worksheet.records(),
                Err(e) if info != start => {
                    warn!(
                        "Unable to load worksheet '{}', stopping with {} rows: {e}",
                        info.title(),
                        rows.len()
                    );
                    break;
                }
                Err(e) => return Err(e),
            };
            let valid = filter.apply(&records);
            let take_from = valid.len().saturating_sub(n - rows.len().min(n));
            let mut collected: Vec<Record> =
                valid[take_from..].iter().map(|r| (*r).clone()).collect();
            collected.append(&mut rows);
            rows = collected;
            if rows.len() >= n {
                break;
            }
            current = self.previous_month(info);
            if current.is_none() {
                debug!(
                    "No sheet before '{}', stopping with {} rows",
                    info.title(),
                    rows.len()
                );
            }
        }
        let complete = rows.len() >= n;
        if rows.len() > n {
            rows.drain(..rows.len() - n);
        }
        Ok(TrailingWindow { rows, complete })
    }
}
