//! Keeps the Google OAuth access token fresh.
//!
//! The consent flow is not run here. `token.json` is produced once, elsewhere, and from then on the
//! refresh token it holds is exchanged for new access tokens whenever the current one is about to
//! expire. The refreshed token is written back to `token.json`.

use crate::api::files::{File, SecretFile, TokenFile};
use crate::error::Res;
use anyhow::Context;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Google does not always say how long a token lives; it is normally an hour.
const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

/// Provides an access token, refreshing it through the OAuth token endpoint when it has expired.
#[derive(Debug)]
pub(crate) struct TokenProvider {
    secret: SecretFile,
    token: File<TokenFile>,
    http: reqwest::Client,
}

impl TokenProvider {
    /// Loads the client secret and the saved token.
    pub(crate) async fn load(
        secret_path: impl AsRef<Path>,
        token_path: impl AsRef<Path>,
    ) -> Res<Self> {
        let secret = SecretFile::load(secret_path.as_ref()).await?;
        let token_path = token_path.as_ref();
        let token: File<TokenFile> = File::load(token_path).await.with_context(|| {
            format!(
                "Unable to load the OAuth token from {}. Authorize the app and save the token there",
                token_path.display()
            )
        })?;
        token.data().validate_scopes()?;

        // The token endpoint must not be allowed to redirect us elsewhere.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Unable to build the HTTP client for OAuth")?;

        Ok(Self {
            secret,
            token,
            http,
        })
    }

    /// The current access token, which may have expired.
    pub(crate) fn token(&self) -> &str {
        self.token.data().access_token()
    }

    /// The access token, refreshed first if it has expired or is about to.
    pub(crate) async fn token_with_refresh(&mut self) -> Res<&str> {
        if self.token.data().is_expired() {
            self.refresh().await?;
        }
        Ok(self.token())
    }

    async fn refresh(&mut self) -> Res<()> {
        debug!("Refreshing the OAuth access token");
        let token_url = TokenUrl::new(self.secret.token_uri().to_string())
            .context("The client secret has an invalid token_uri")?;
        let client = BasicClient::new(ClientId::new(self.secret.client_id().to_string()))
            .set_client_secret(ClientSecret::new(self.secret.client_secret().to_string()))
            .set_token_uri(token_url);

        let refresh_token = RefreshToken::new(self.token.data().refresh_token().to_string());
        let response = client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .context("Failed to refresh the OAuth access token")?;

        let expires_in = response.expires_in().unwrap_or(DEFAULT_EXPIRES_IN);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).context("Token lifetime out of range")?;
        self.token.data_mut().update(
            response.access_token().secret().to_string(),
            expires_at,
            response.refresh_token().map(|t| t.secret().to_string()),
        );
        self.token
            .save()
            .await
            .context("Unable to save the refreshed token")?;
        info!(
            "Refreshed the OAuth access token, valid until {}",
            self.token.data().expires_at()
        );
        Ok(())
    }
}
