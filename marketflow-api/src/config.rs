//! Server configuration
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file is loaded first).

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;

use marketflow_core::Mode;
use marketflow_feeds::FeedEndpoint;
use marketflow_services::CoordinatorConfig;

const DEFAULT_FEED_ADDRESSES: &str =
    "Source1=127.0.0.1:40101,Source2=127.0.0.1:40102,Source3=127.0.0.1:40103";

#[derive(Parser, Debug, Clone)]
#[command(name = "marketflow")]
#[command(about = "Real-time market price aggregation service")]
pub struct Cli {
    /// HTTP port to listen on
    #[arg(
        long,
        env = "SERVER_PORT",
        default_value = "8080",
        value_parser = clap::value_parser!(u16).range(1024..)
    )]
    pub port: u16,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "data/marketflow.db")]
    pub database_path: PathBuf,

    /// Live feed endpoints (comma-separated `Source=host:port`)
    #[arg(long, env = "FEED_ADDRESSES", default_value = DEFAULT_FEED_ADDRESSES)]
    pub feed_addresses: String,

    /// Initial data mode (live or test)
    #[arg(long, env = "DATA_MODE", default_value = "live", value_parser = Mode::from_str)]
    pub mode: Mode,
}

impl Cli {
    pub fn coordinator_config(&self) -> anyhow::Result<CoordinatorConfig> {
        let live_endpoints = FeedEndpoint::parse_list(&self.feed_addresses)
            .context("Invalid FEED_ADDRESSES")?;

        Ok(CoordinatorConfig {
            live_endpoints,
            ..CoordinatorConfig::default()
        })
    }
}
