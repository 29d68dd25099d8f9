use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where `init` put things.
#[derive(Debug, Clone, Serialize)]
pub struct InitLayout {
    pub home: PathBuf,
    pub config: PathBuf,
    pub secrets: PathBuf,
}

/// Creates the home directory, its secrets directory and:
/// - Creates an initial `config.json` file with default settings
/// - Moves `secret_file` and `token_file`, when given, into the secrets directory.
///
/// # Arguments
/// - `home` - The directory that will be the home directory, e.g. `$HOME/meal-analytics`
/// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON.
/// - `token_file` - A token JSON holding a refresh token for those credentials.
///
/// # Errors
/// - Returns an error if any file operations fail or the home directory is already initialized.
pub async fn init(
    home: &Path,
    secret_file: Option<&Path>,
    token_file: Option<&Path>,
) -> Result<Out<InitLayout>> {
    let config = Config::create(home, secret_file, token_file)
        .await
        .context("Unable to create the home directory and config")
        .pub_result(ErrorType::Config)?;
    let layout = InitLayout {
        home: config.root().to_path_buf(),
        config: config.config_path().to_path_buf(),
        secrets: config.secrets().to_path_buf(),
    };
    Ok(Out::new(
        format!("Successfully created '{}'", config.root().display()),
        layout,
    ))
}
