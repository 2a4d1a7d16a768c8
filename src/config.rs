/// Asset store configuration from environment variables
///
/// Controls where the registry and ledger files live, which Esplora
/// endpoint serves blocks, and the network timeouts used while
/// validating assets and querying trackers.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AssetsError;

#[derive(Clone, Debug)]
pub struct AssetsConfig {
    /// Path prefix shared by the registry (`.csassets`, `.csfiles/`) and ledger (`.csbalances`)
    pub data_prefix: PathBuf,
    /// Esplora API base URL
    pub esplora_url: String,
    /// Timeout for fetching an asset web page
    pub web_page_timeout: Duration,
    /// Timeout for downloading contracts, icons and images
    pub download_timeout: Duration,
    /// Timeout for tracker JSON-RPC requests
    pub tracker_timeout: Duration,
    /// Depth (in blocks) beyond which an unanswered output is assumed empty
    pub max_unknown_depth: u32,
    /// How long a locally created transaction is tracked before giving up
    pub tracked_tx_expiry: Duration,
}

impl AssetsConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables (all optional):
    /// - `COINSPARK_DATA_PREFIX`: store path prefix (default `./coinspark`)
    /// - `ESPLORA_URL`: Esplora API endpoint
    /// - `COINSPARK_WEB_PAGE_TIMEOUT`: seconds (default 15)
    /// - `COINSPARK_DOWNLOAD_TIMEOUT`: seconds (default 30)
    /// - `COINSPARK_TRACKER_TIMEOUT`: seconds (default 15)
    /// - `COINSPARK_MAX_UNKNOWN_DEPTH`: blocks (default 5000)
    /// - `COINSPARK_TRACKED_TX_EXPIRY`: seconds (default 60)
    ///
    /// A `.env` file in the working directory is honoured.
    pub fn from_env() -> Result<Self, AssetsError> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let data_prefix = env::var("COINSPARK_DATA_PREFIX")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_prefix);

        let esplora_url = env::var("ESPLORA_URL").unwrap_or(defaults.esplora_url);
        log::info!("Esplora URL: {}", esplora_url);

        let config = Self {
            data_prefix,
            esplora_url,
            web_page_timeout: seconds_var("COINSPARK_WEB_PAGE_TIMEOUT", defaults.web_page_timeout)?,
            download_timeout: seconds_var("COINSPARK_DOWNLOAD_TIMEOUT", defaults.download_timeout)?,
            tracker_timeout: seconds_var("COINSPARK_TRACKER_TIMEOUT", defaults.tracker_timeout)?,
            max_unknown_depth: match env::var("COINSPARK_MAX_UNKNOWN_DEPTH") {
                Ok(value) => value.trim().parse().map_err(|_| {
                    AssetsError::Config(format!("invalid COINSPARK_MAX_UNKNOWN_DEPTH: {}", value))
                })?,
                Err(_) => defaults.max_unknown_depth,
            },
            tracked_tx_expiry: seconds_var("COINSPARK_TRACKED_TX_EXPIRY", defaults.tracked_tx_expiry)?,
        };

        log::info!("Asset data prefix: {}", config.data_prefix.display());
        Ok(config)
    }

    /// Configuration rooted at a custom prefix (for testing)
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            data_prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Registry file path (`<prefix>.csassets`)
    pub fn registry_path(&self) -> PathBuf {
        suffixed(&self.data_prefix, ".csassets")
    }

    /// Directory holding cached asset files (`<prefix>.csfiles/`)
    pub fn files_dir(&self) -> PathBuf {
        suffixed(&self.data_prefix, ".csfiles")
    }

    /// Ledger file path (`<prefix>.csbalances`)
    pub fn ledger_path(&self) -> PathBuf {
        suffixed(&self.data_prefix, ".csbalances")
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            data_prefix: PathBuf::from("./coinspark"),
            esplora_url: "https://blockstream.info/api".to_string(),
            web_page_timeout: Duration::from_secs(15),
            download_timeout: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(15),
            max_unknown_depth: 5000,
            tracked_tx_expiry: Duration::from_secs(60),
        }
    }
}

fn seconds_var(name: &str, default: Duration) -> Result<Duration, AssetsError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| AssetsError::Config(format!("invalid {}: {}", name, value))),
        Err(_) => Ok(default),
    }
}

fn suffixed(prefix: &std::path::Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}
