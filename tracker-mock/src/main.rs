/// CoinSpark Tracker Mock
///
/// A lightweight JSON-RPC server answering `coinspark_assets_get_qty` from a
/// fixture file, and serving asset web pages and contracts from a directory.
/// Designed for local wallet development.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracker_mock::{run_server, Fixture};

#[derive(Debug)]
struct Config {
    // Data
    fixture_path: PathBuf,
    pages_dir: Option<PathBuf>,

    // Server
    server_host: String,
    server_port: u16,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let fixture_path = env::var("TRACKER_FIXTURE")
            .context("TRACKER_FIXTURE environment variable not set")?
            .into();

        let pages_dir = env::var("TRACKER_PAGES_DIR").ok().map(PathBuf::from);

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3100".to_string())
            .parse()
            .context("Invalid SERVER_PORT")?;

        Ok(Self {
            fixture_path,
            pages_dir,
            server_host,
            server_port,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting tracker mock...");

    let config = Config::from_env().context("Failed to load configuration")?;

    log::info!("Fixture: {}", config.fixture_path.display());
    if let Some(dir) = &config.pages_dir {
        log::info!("Pages directory: {}", dir.display());
    }

    let fixture = Arc::new(
        Fixture::load(&config.fixture_path).context("Failed to load tracker fixture")?,
    );

    run_server(fixture, config.pages_dir, config.server_host, config.server_port)
        .await
        .context("Server error")?;

    Ok(())
}
