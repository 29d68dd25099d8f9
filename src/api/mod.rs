//! The spreadsheet collaborator. `Spreadsheets` is the seam: `GoogleSheets` talks to the Google
//! Sheets API and `TestSheets` serves documents from memory.

mod document;
mod files;
mod google;
mod oauth;
mod test_sheets;

use crate::error::{ErrorType, IntoResult, Result};
use crate::Config;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub use document::{Document, WorksheetInfo};
pub(crate) use oauth::TokenProvider;
pub use test_sheets::TestSheets;
#[cfg(test)]
pub use test_sheets::{DEMO_ATTENDANCE, DEMO_QUOTATION};

// Read access to the sheets is all that is needed.
const OAUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets.readonly"];

/// When this environment variable is set to a non-empty value the app serves the built-in demo
/// documents instead of calling Google.
pub const TEST_MODE_ENV: &str = "MEAL_ANALYTICS_TEST_MODE";

/// Read access to spreadsheet documents.
#[async_trait::async_trait]
pub trait Spreadsheets: Send + Sync {
    /// Lists the tabs of the document. A missing document is an `ErrorType::NotFound` error.
    async fn worksheets(&self, document_id: &str) -> Result<Vec<WorksheetInfo>>;

    /// Returns every row of the tab titled `title`, the header row first. A missing tab is an
    /// `ErrorType::NotFound` error.
    async fn values(&self, document_id: &str, title: &str) -> Result<Vec<Vec<String>>>;
}

/// Where spreadsheet data comes from.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Google,
    Testing,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

impl Mode {
    /// `Mode::Testing` if `MEAL_ANALYTICS_TEST_MODE` is set and non-empty, otherwise
    /// `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Google,
        }
    }
}

/// Creates the `Spreadsheets` implementation for `mode`.
pub async fn spreadsheets(config: &Config, mode: Mode) -> Result<Arc<dyn Spreadsheets>> {
    match mode {
        Mode::Google => {
            let token_provider =
                TokenProvider::load(config.client_secret_path(), config.token_path())
                    .await
                    .pub_result(ErrorType::Config)?;
            Ok(Arc::new(google::GoogleSheets::new(token_provider)))
        }
        Mode::Testing => {
            info!("Serving the built-in demo documents");
            Ok(Arc::new(TestSheets::seeded()?))
        }
    }
}
