//! Configuration file handling.
//!
//! The configuration file is stored at `$MEAL_ANALYTICS_HOME/config.json`. It holds the port to
//! serve on, where the cache lives, where the Google credentials are and the rules the analytics
//! use to read the sheets.

use crate::error::Res;
use crate::model::Sentinels;
use crate::utils;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "meal-analytics";
const CONFIG_VERSION: u8 = 1;
const DEFAULT_PORT: u16 = 3000;
const SECRETS: &str = ".secrets";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const TOKEN_JSON: &str = "token.json";
const CONFIG_JSON: &str = "config.json";
const BASELINE_MONTH: &str = "June 2024";
const STAFF_DEPARTMENT: &str = "Main Library";
const STAFF_EXCLUDED_IDS: [&str; 2] = ["142", "170"];
const OTHER_EXPENSE_KEYWORDS: [&str; 3] = ["cleaning", "wifi", "ice"];

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to the home directory and from there it loads `config.json`. It provides paths to other
/// items that are either configurable or are expected in a certain location within the home
/// directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory, its `.secrets` subdirectory and an initial `config.json` with
    /// default settings.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the home directory, e.g. `$HOME/meal-analytics`
    /// - `secret_file` - The OAuth 2.0 client credentials downloaded from Google. When given, it is
    ///   moved into the secrets directory.
    /// - `token_file` - An OAuth token previously obtained for those credentials. When given, it is
    ///   moved into the secrets directory.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or if a `config.json` already exists.
    pub async fn create(
        dir: impl Into<PathBuf>,
        secret_file: Option<&Path>,
        token_file: Option<&Path>,
    ) -> Res<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!("A config file already exists at '{}'", config_path.display());
        }

        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;
        if let Some(secret_file) = secret_file {
            utils::rename(secret_file, secrets.join(CLIENT_SECRET_JSON)).await?;
        }
        if let Some(token_file) = token_file {
            utils::rename(token_file, secrets.join(TOKEN_JSON)).await?;
        }

        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
        })
    }

    /// This will
    /// - validate that the home directory exists and that the config file exists
    /// - load the config file
    /// - validate that the secrets directory exists
    pub async fn load(home: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The home directory is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let config = Self {
            secrets: root.join(SECRETS),
            root,
            config_path,
            config_file,
        };
        if !config.secrets.is_dir() {
            bail!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
        }
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn port(&self) -> u16 {
        self.config_file.port
    }

    /// `None` means the in-process cache is used.
    pub fn redis_url(&self) -> Option<&str> {
        self.config_file.redis_url.as_deref()
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.config_file.sentinels
    }

    pub fn trailing_window(&self) -> WindowPolicy {
        self.config_file.trailing_window
    }

    pub fn baseline_month(&self) -> &str {
        &self.config_file.baseline_month
    }

    pub fn staff(&self) -> &Staff {
        &self.config_file.staff
    }

    pub fn other_expense_keywords(&self) -> &[String] {
        &self.config_file.other_expense_keywords
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves the relative
    /// path against the home directory.
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve_secrets_file_path(self.config_file.client_secret_path())
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path
    /// against the home directory.
    pub fn token_path(&self) -> PathBuf {
        self.resolve_secrets_file_path(self.config_file.token_path())
    }

    fn resolve_secrets_file_path(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }
}

/// What a trailing window does when the sheets run out before the window is full.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Return the rows that were found and flag that data is missing.
    #[default]
    Partial,
    /// Return no rows at all.
    Strict,
}

serde_plain::derive_display_from_serialize!(WindowPolicy);
serde_plain::derive_fromstr_from_deserialize!(WindowPolicy);

/// Which attendance rows belong to staff rather than students.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub department: String,
    /// AC-No values that are in the staff department but are not tracked, e.g. guards.
    pub excluded_ids: Vec<String>,
}

impl Default for Staff {
    fn default() -> Self {
        Self {
            department: STAFF_DEPARTMENT.to_string(),
            excluded_ids: STAFF_EXCLUDED_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Represents the serialization and deserialization format of the configuration file. Everything
/// except `app_name` and `config_version` may be left out.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "meal-analytics",
///   "config_version": 1,
///   "port": 3000,
///   "redis_url": "redis://127.0.0.1:6379",
///   "client_secret_path": ".secrets/client_secret.json",
///   "token_path": ".secrets/token.json",
///   "sentinels": [
///     {"value": "TOTAL (PKR)", "match": "exact"},
///     {"value": "Sunday Excluded", "match": "contains"}
///   ],
///   "trailing_window": "partial",
///   "baseline_month": "June 2024",
///   "staff": {"department": "Main Library", "excluded_ids": ["142", "170"]},
///   "other_expense_keywords": ["cleaning", "wifi", "ice"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "meal-analytics"
    app_name: String,

    config_version: u8,

    #[serde(default = "default_port")]
    port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    redis_url: Option<String>,

    /// Path to the OAuth 2.0 client credentials file (relative to the home directory or absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,

    /// Path to the OAuth token file (relative to the home directory or absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,

    /// Date cells that mark a non-data row.
    #[serde(default)]
    sentinels: Sentinels,

    #[serde(default)]
    trailing_window: WindowPolicy,

    /// The month that attendance growth is measured from.
    #[serde(default = "default_baseline_month")]
    baseline_month: String,

    #[serde(default)]
    staff: Staff,

    /// Expense names containing any of these count as other expenses rather than salaries.
    #[serde(default = "default_other_expense_keywords")]
    other_expense_keywords: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

pub(crate) fn default_baseline_month() -> String {
    BASELINE_MONTH.to_string()
}

pub(crate) fn default_other_expense_keywords() -> Vec<String> {
    OTHER_EXPENSE_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            port: DEFAULT_PORT,
            redis_url: None,
            client_secret_path: None,
            token_path: None,
            sentinels: Sentinels::default(),
            trailing_window: WindowPolicy::default(),
            baseline_month: default_baseline_month(),
            staff: Staff::default(),
            other_expense_keywords: default_other_expense_keywords(),
        }
    }
}

impl ConfigFile {
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version == CONFIG_VERSION,
            "Unsupported config_version {} in config file, expected {}",
            config.config_version,
            CONFIG_VERSION
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }

    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN_JSON))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Sentinel, SentinelMatch};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("meal_home");
        let secret_source_file = dir.path().join("x.json");
        let secret_content = "12345";
        utils::write(&secret_source_file, secret_content)
            .await
            .unwrap();

        let config = Config::create(&home_dir, Some(&secret_source_file), None)
            .await
            .unwrap();

        let found_secret_content = utils::read(&config.client_secret_path()).await.unwrap();
        assert_eq!(secret_content, found_secret_content);
        assert!(!secret_source_file.exists());
        assert!(config.secrets().is_dir());
        assert_eq!(config.port(), DEFAULT_PORT);
        assert!(config.redis_url().is_none());

        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.config_file, config.config_file);
        assert_eq!(loaded.token_path(), config.secrets().join(TOKEN_JSON));
    }

    #[tokio::test]
    async fn test_config_create_twice() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path(), None, None).await.unwrap();
        let e = Config::create(dir.path(), None, None).await.unwrap_err();
        assert!(e.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_config_load_missing() {
        let dir = TempDir::new().unwrap();
        let e = Config::load(dir.path()).await.unwrap_err();
        assert!(e.to_string().contains("The config file is missing"));
    }

    #[test]
    fn test_config_file_default() {
        let config = ConfigFile::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.baseline_month, "June 2024");
        assert_eq!(config.trailing_window, WindowPolicy::Partial);
        assert_eq!(config.staff.excluded_ids, vec!["142", "170"]);
        assert_eq!(
            config.client_secret_path(),
            PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON)
        );
        assert_eq!(config.token_path(), PathBuf::from(SECRETS).join(TOKEN_JSON));
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "meal-analytics",
            "config_version": 1,
            "redis_url": "redis://127.0.0.1:6379",
            "trailing_window": "strict",
            "sentinels": [{"value": "GRAND TOTAL"}]
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.trailing_window, WindowPolicy::Strict);
        assert_eq!(
            config.sentinels,
            Sentinels::new(vec![Sentinel::new("GRAND TOTAL", SentinelMatch::Exact)])
        );
        assert_eq!(config.other_expense_keywords, vec!["cleaning", "wifi", "ice"]);
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{"app_name": "some-other-app", "config_version": 1}"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_config_file_serialization_omits_none_fields() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("client_secret_path"));
        assert!(!json.contains("token_path"));
        assert!(!json.contains("redis_url"));
    }
}
