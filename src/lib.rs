mod analytics;
mod api;
pub mod args;
mod cache;
pub mod commands;
mod config;
mod error;
mod model;
mod server;
mod utils;

#[cfg(test)]
mod test;

pub use analytics::{Endpoint, Options, Params, Services};
pub use api::{Mode, Spreadsheets, TestSheets};
pub use cache::{Cache, MemoryCache, RedisCache};
pub use config::{Config, Staff, WindowPolicy};
pub use error::{Error, ErrorType, IntoResult, Result};
