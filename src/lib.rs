//! CoinSpark Assets: colored-coin asset registry and balance ledger
//!
//! This crate keeps the wallet-side view of colored-coin assets: which
//! assets the wallet knows, whether their issuer details check out, and how
//! many units of each sit on every tracked transaction output.
//!
//! # Architecture
//!
//! - **Asset Registry**: persisted asset records, resolved against the chain
//!   and validated against the issuer's web page and contract
//! - **Balance Ledger**: persisted (output, asset) quantities reconciled with
//!   tracker servers, with local calculation for our own transactions
//! - **Contract Scanner**: rejects contract documents that embed files or URLs
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use coinspark_assets::{AssetRegistry, AssetsConfig, BalanceLedger, Collaborators};
//!
//! let config = AssetsConfig::from_env()?;
//! let registry = Arc::new(AssetRegistry::open(config.clone(), collaborators, None)?);
//! let ledger = BalanceLedger::open(config, registry.clone(), None)?;
//!
//! registry.validate_assets(false)?;
//! ledger.calculate_balances(false, None)?;
//! ```

// Public modules
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod ledger;
pub mod protocol;
pub mod registry;
pub mod scanner;

// Re-exports for convenience
pub use chain::{ChainSource, EsploraChain};
pub use config::AssetsConfig;
pub use error::{AssetsError, ServerError};
pub use events::{AssetEvent, CallbackSink, EventSink};
pub use http::{Downloaded, HttpClient, MimeType, ReqwestClient};
pub use ledger::{Balance, BalanceEntry, BalanceLedger, BalanceState};
pub use protocol::{AssetRef, GenesisRecord, ProtocolCodec, TransferList};
pub use registry::{Asset, AssetRegistry, AssetSource, AssetState, Collaborators};
pub use scanner::{scan_contract, ContractState};

// Re-export commonly used Bitcoin types
pub use bitcoin::{OutPoint, Transaction, Txid};

// Common result type
pub type Result<T> = std::result::Result<T, AssetsError>;
