//! Implements the `Spreadsheets` trait using the `sheets::Client` to read Google sheets.

use crate::api::{Spreadsheets, TokenProvider, WorksheetInfo};
use crate::error::{Error, ErrorType, IntoResult, Result};
use sheets::types::{DateTimeRenderOption, Dimension, ValueRenderOption};
use sheets::ClientError;
use tokio::sync::Mutex;
use tracing::trace;

/// Reads documents through the Google Sheets API. Every call asks the `TokenProvider` for a fresh
/// access token, so a long-running server keeps working after the first token expires.
pub(super) struct GoogleSheets {
    token_provider: Mutex<TokenProvider>,
}

impl GoogleSheets {
    pub(super) fn new(token_provider: TokenProvider) -> Self {
        Self {
            token_provider: Mutex::new(token_provider),
        }
    }

    async fn client(&self) -> Result<sheets::Client> {
        let mut token_provider = self.token_provider.lock().await;
        let access_token = token_provider
            .token_with_refresh()
            .await
            .pub_result(ErrorType::Sheets)?;

        // Only the access token is needed for API calls, we handle refreshing ourselves.
        Ok(sheets::Client::new(
            String::new(),
            String::new(),
            String::new(),
            access_token.to_string(),
            String::new(),
        ))
    }
}

#[async_trait::async_trait]
impl Spreadsheets for GoogleSheets {
    async fn worksheets(&self, document_id: &str) -> Result<Vec<WorksheetInfo>> {
        trace!("worksheets for {document_id}");
        let client = self.client().await?;
        let response = client
            .spreadsheets()
            .get(document_id, false, &[])
            .await
            .map_err(|e| classify(e, &format!("document '{document_id}'")))?;

        Ok(response
            .body
            .sheets
            .into_iter()
            .filter_map(|sheet| sheet.properties)
            .map(|p| WorksheetInfo::new(p.sheet_id, p.index, p.title))
            .collect())
    }

    async fn values(&self, document_id: &str, title: &str) -> Result<Vec<Vec<String>>> {
        trace!("values for {document_id} '{title}'");
        let client = self.client().await?;
        let response = client
            .spreadsheets()
            .values_get(
                document_id,
                &range(title),
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(|e| classify(e, &format!("worksheet '{title}'")))?;
        Ok(response.body.values)
    }
}

/// The A1 range covering every column of a tab. Quotes inside the title are doubled.
fn range(title: &str) -> String {
    format!("'{}'!A:ZZ", title.replace('\'', "''"))
}

/// A 404 from Google is a missing document or tab. Anything else is a failure to talk to Google.
fn classify(e: ClientError, what: &str) -> Error {
    let not_found = matches!(&e, ClientError::HttpError { status, .. } if status.as_u16() == 404);
    let error_type = if not_found {
        ErrorType::NotFound
    } else {
        ErrorType::Sheets
    };
    Error::new(
        error_type,
        map_client_error(e).context(format!("Unable to read {what}")),
    )
}

fn map_client_error(e: ClientError) -> anyhow::Error {
    let error_name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { status, .. } => format!("HttpError {status}"),
        ClientError::Other(_) => "Other".to_string(),
    };
    anyhow::Error::new(e).context(error_name)
}
