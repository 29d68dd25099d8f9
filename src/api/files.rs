//! Serialization and deserialization structures for Google OAuth credential files.
//! - `client_secret.json`: OAuth 2.0 client credentials from Google Cloud Console
//! - `token.json`: the access and refresh tokens obtained for those credentials

use crate::api::OAUTH_SCOPES;
use crate::error::Res;
use crate::utils;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Read-write access to sheets implies read access.
const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Holds the `path` of a JSON file along with its deserialized `data`, so that the data can be
/// changed and written back to the same place.
#[derive(Default, Debug, Clone)]
pub(super) struct File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    path: PathBuf,
    data: F,
}

impl<F> File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    /// Load data from a file and create a File instance
    pub(super) async fn load(path: impl Into<PathBuf>) -> Res<Self> {
        let path = path.into();
        let data: F = utils::deserialize(&path).await?;
        Ok(Self { path, data })
    }

    /// Save the current data to the file
    pub(super) async fn save(&self) -> Res<()> {
        let json =
            serde_json::to_string_pretty(&self.data).context("Failed to serialize data to JSON")?;
        utils::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, Permissions::from_mode(0o600))
                .context("Failed to set file permissions")?;
        }

        Ok(())
    }

    pub(super) fn data(&self) -> &F {
        &self.data
    }

    pub(super) fn data_mut(&mut self) -> &mut F {
        &mut self.data
    }
}

/// Represents the structure of the `client_secret.json` file downloaded from Google Cloud Console.
/// Google wraps desktop application credentials in an "installed" object.
///
/// Example:
/// ```json
/// {
///   "installed": {
///     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
///     "client_secret": "YOUR_CLIENT_SECRET",
///     "redirect_uris": ["http://localhost"],
///     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
///     "token_uri": "https://oauth2.googleapis.com/token"
///   }
/// }
/// ```
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct SecretFile {
    installed: InstalledCredentials,
}

impl SecretFile {
    pub(crate) async fn load(path: &Path) -> Res<SecretFile> {
        let secret: SecretFile = utils::deserialize(path)
            .await
            .context("Unable to read the client secret file")?;
        if secret.installed.client_id.is_empty() {
            bail!("The client secret file at {} has no client_id", path.display());
        }
        Ok(secret)
    }

    pub(super) fn client_id(&self) -> &str {
        &self.installed.client_id
    }

    pub(super) fn client_secret(&self) -> &str {
        &self.installed.client_secret
    }

    pub(super) fn token_uri(&self) -> &str {
        &self.installed.token_uri
    }
}

/// The actual OAuth credentials nested within the `client_secret.json` file.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    #[serde(default)]
    auth_uri: String,
    /// Google's OAuth token endpoint, used to refresh the access token.
    token_uri: String,
}

/// The saved result of an earlier consent flow. Only refreshing happens in this app; the consent
/// itself is obtained elsewhere and the file is copied into the home directory by `init`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct TokenFile {
    scopes: Vec<String>,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    id_token: Option<String>,
}

impl TokenFile {
    /// Checks that the token was granted every scope this app needs.
    pub(super) fn validate_scopes(&self) -> Res<()> {
        let found_scopes: HashSet<&str> = self.scopes.iter().map(|s| s.as_str()).collect();
        for &required_scope in OAUTH_SCOPES {
            if !found_scopes.contains(required_scope) && !found_scopes.contains(SPREADSHEETS_SCOPE)
            {
                bail!("OAuth scope '{required_scope}' is missing.");
            }
        }
        Ok(())
    }

    pub(super) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(super) fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub(super) fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check if the token is expired or will expire soon (within 5 minutes)
    pub(super) fn is_expired(&self) -> bool {
        let now = Utc::now();
        let buffer = chrono::Duration::minutes(5);
        self.expires_at <= now + buffer
    }

    /// Google only sometimes rotates the refresh token, so `None` keeps the old one.
    pub(super) fn update(
        &mut self,
        access_token: String,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) {
        self.access_token = access_token;
        self.expires_at = expires_at;
        if let Some(rt) = refresh_token {
            self.refresh_token = rt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SECRET_JSON: &str = r#"
{
    "installed": {
        "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
        "client_secret": "YOUR_CLIENT_SECRET",
        "redirect_uris": ["http://localhost"],
        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
        "token_uri": "https://oauth2.googleapis.com/token"
    }
}
"#;

    fn token_json(scope: &str) -> String {
        format!(
            r#"{{
                "scopes": ["{scope}"],
                "access_token": "abc12",
                "refresh_token": "xyz89",
                "expires_at": "2025-01-01T00:00:00Z",
                "id_token": null
            }}"#
        )
    }

    #[tokio::test]
    async fn test_client_secret_load() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("client_secret.json");
        utils::write(&p, SECRET_JSON).await.unwrap();
        let secret = SecretFile::load(&p).await.unwrap();
        assert_eq!(secret.client_id(), "YOUR_CLIENT_ID.apps.googleusercontent.com");
        assert_eq!(secret.client_secret(), "YOUR_CLIENT_SECRET");
        assert_eq!(secret.token_uri(), "https://oauth2.googleapis.com/token");
    }

    #[tokio::test]
    async fn test_client_secret_missing_client_id() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("client_secret.json");
        let json = r#"{"installed": {"client_id": "", "client_secret": "s", "token_uri": "t"}}"#;
        utils::write(&p, json).await.unwrap();
        let message = SecretFile::load(&p).await.unwrap_err().to_string();
        assert!(message.contains("no client_id"));
    }

    #[tokio::test]
    async fn test_token_file_scopes() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("token.json");

        utils::write(&p, token_json("https://www.googleapis.com/auth/drive.readonly"))
            .await
            .unwrap();
        let token = File::<TokenFile>::load(&p).await.unwrap();
        let message = token.data().validate_scopes().unwrap_err().to_string();
        assert!(message.contains("spreadsheets.readonly"));

        utils::write(&p, token_json(SPREADSHEETS_SCOPE)).await.unwrap();
        let token = File::<TokenFile>::load(&p).await.unwrap();
        token.data().validate_scopes().unwrap();
    }

    #[tokio::test]
    async fn test_token_file_update_and_save() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("token.json");
        utils::write(&p, token_json(OAUTH_SCOPES[0])).await.unwrap();

        let mut token = File::<TokenFile>::load(&p).await.unwrap();
        assert!(token.data().is_expired());
        let later = Utc::now() + chrono::Duration::hours(1);
        token.data_mut().update("new-access".to_string(), later, None);
        token.save().await.unwrap();

        let reloaded = File::<TokenFile>::load(&p).await.unwrap();
        assert_eq!(reloaded.data().access_token(), "new-access");
        assert_eq!(reloaded.data().refresh_token(), "xyz89");
        assert!(!reloaded.data().is_expired());
    }
}
