//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::api::{Spreadsheets, TestSheets, WorksheetInfo};
use crate::error::{Error, ErrorType, Result};
use crate::model::clean_title;
use crate::Config;
use anyhow::anyhow;
use tempfile::TempDir;

/// Test environment that sets up a home directory with a default Config.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a home directory holding a client secret and a default `config.json`.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("meal-analytics");
        let secret_path = temp_dir.path().join("client_secret.json");

        // Create minimal client_secret.json
        let secret_content = r#"{
            "installed": {
                "client_id": "test-client-id",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"],
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;
        std::fs::write(&secret_path, secret_content).unwrap();

        let config = Config::create(&root, Some(&secret_path), None)
            .await
            .unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }
}

/// Serves documents from a `TestSheets` but fails to download the listed tabs, the way a Google
/// request can fail for one tab while the rest of the document loads.
pub struct FailingSheets {
    inner: TestSheets,
    broken: Vec<String>,
}

impl FailingSheets {
    pub fn new(inner: TestSheets, broken: &[&str]) -> Self {
        Self {
            inner,
            broken: broken.iter().map(|t| clean_title(t).to_lowercase()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl Spreadsheets for FailingSheets {
    async fn worksheets(&self, document_id: &str) -> Result<Vec<WorksheetInfo>> {
        self.inner.worksheets(document_id).await
    }

    async fn values(&self, document_id: &str, title: &str) -> Result<Vec<Vec<String>>> {
        if self.broken.contains(&clean_title(title).to_lowercase()) {
            return Err(Error::new(
                ErrorType::Internal,
                anyhow!("The service is currently unavailable"),
            ));
        }
        self.inner.values(document_id, title).await
    }
}
