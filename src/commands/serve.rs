use crate::analytics::{Options, Services};
use crate::api::{self, Mode};
use crate::commands::Out;
use crate::{cache, server, Config, Result};
use tracing::info;

/// Runs the HTTP server until it is told to stop. `port` overrides the configured port.
pub async fn serve(config: Config, mode: Mode, port: Option<u16>) -> Result<Out<()>> {
    let sheets = api::spreadsheets(&config, mode).await?;
    let cache = cache::connect(&config).await?;
    let services = Services::new(sheets, cache, Options::from(&config));
    let port = port.unwrap_or_else(|| config.port());
    info!("Serving analytics from '{}' in {mode} mode", config.root().display());
    server::serve(services, port).await?;
    Ok("The server has stopped".into())
}
