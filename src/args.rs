//! These structs provide the CLI interface for the meal-analytics CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// meal-analytics: An HTTP service that reports on school attendance and meal deliveries.
///
/// The numbers come from two Google spreadsheet documents: an attendance document with one tab
/// per month, and a quotation document holding the boxes delivered, meal costs and expenses.
/// Results are cached, in Redis when it is configured and in memory otherwise.
///
/// Run `meal-analytics init` once to create the home directory, then `meal-analytics serve`.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory and its default configuration.
    ///
    /// The Google OAuth client secret and an authorized token (a JSON file holding a
    /// `refresh_token`) can be passed now, in which case they are moved into the `.secrets`
    /// directory, or copied there by hand later.
    Init(InitArgs),
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Remove every cached analytics result.
    FlushCache,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the configuration and secrets are held. Defaults to ~/meal-analytics
    #[arg(long, env = "MEAL_ANALYTICS_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// (Not shown): Args for the `meal-analytics init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The path to your downloaded OAuth client credentials. The file is moved into the secrets
    /// directory.
    #[arg(long)]
    client_secret: Option<PathBuf>,

    /// The path to an OAuth token file holding a refresh token. The file is moved into the
    /// secrets directory.
    #[arg(long)]
    token: Option<PathBuf>,
}

impl InitArgs {
    pub fn new(client_secret: Option<PathBuf>, token: Option<PathBuf>) -> Self {
        Self {
            client_secret,
            token,
        }
    }

    pub fn client_secret(&self) -> Option<&Path> {
        self.client_secret.as_deref()
    }

    pub fn token(&self) -> Option<&Path> {
        self.token.as_deref()
    }
}

/// (Not shown): Args for the `meal-analytics serve` command.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// The port to listen on, overriding `port` in config.json.
    #[arg(long)]
    port: Option<u16>,
}

impl ServeArgs {
    pub fn new(port: Option<u16>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("meal-analytics"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or MEAL_ANALYTICS_HOME instead of relying on the default \
                home directory.",
            );
            PathBuf::from("meal-analytics")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
