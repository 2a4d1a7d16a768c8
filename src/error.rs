//! Error types for the asset registry and balance ledger
//!
//! Store-level failures (file I/O, corrupted records) surface as
//! [`AssetsError`]. Network failures are mapped onto the closed
//! [`ServerError`] taxonomy so callers can turn them into asset or
//! balance state transitions instead of aborting.

use thiserror::Error;

/// Core error type for registry and ledger operations
#[derive(Error, Debug)]
pub enum AssetsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Asset not found: {0}")]
    AssetNotFound(u32),

    #[error("Duplicate asset: {0}")]
    DuplicateAsset(String),

    #[error("Transaction output not found: {0}")]
    TxOutNotFound(String),

    #[error("Corrupted store {path} at offset {offset}")]
    Corrupted { path: String, offset: u64 },

    #[error("Quantity out of range: {0}")]
    QuantityOutOfRange(u64),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AssetsError {
    /// Create a corrupted-store error
    pub fn corrupted(path: impl Into<String>, offset: u64) -> Self {
        Self::Corrupted {
            path: path.into(),
            offset,
        }
    }

    /// Create an invalid-record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }
}

/// Closed set of remote-call failures
///
/// Numeric codes match the ones used on the wire by tracker servers
/// (negative values are JSON-RPC error codes).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerError {
    #[error("Unknown error")]
    Unknown,
    #[error("Response is not a JSON object")]
    ResponseNotObject,
    #[error("Response id does not match request id")]
    ResponseWrongId,
    #[error("Cannot parse response")]
    ResponseParseError,
    #[error("Result not found in response")]
    ResponseResultNotFound,
    #[error("Result is not a JSON object")]
    ResponseResultNotObject,
    #[error("Invalid response")]
    ResponseInvalid,
    #[error("Response hash mismatch")]
    ResponseHashMismatch,
    #[error("Server not found")]
    ServerNotFound,
    #[error("Server redirected the request")]
    ServerRedirect,
    #[error("Server HTTP error")]
    ServerHttpError,
    #[error("Server fatal error")]
    ServerFatalError,
    #[error("Cannot connect to server")]
    ServerCannotConnect,
    #[error("JSON-RPC parse error")]
    ParseError,
    #[error("JSON-RPC invalid request")]
    InvalidRequest,
    #[error("JSON-RPC method not found")]
    MethodNotFound,
    #[error("JSON-RPC invalid params")]
    InvalidParams,
    #[error("JSON-RPC internal error")]
    InternalError,
    #[error("Asset not found on tracker")]
    AssetNotFound,
    #[error("Transaction output not found on tracker")]
    TxOutNotFound,
}

impl ServerError {
    /// Numeric code of this error
    pub fn code(&self) -> i32 {
        match self {
            Self::Unknown => 1,
            Self::ResponseNotObject => 100,
            Self::ResponseWrongId => 101,
            Self::ResponseParseError => 103,
            Self::ResponseResultNotFound => 104,
            Self::ResponseResultNotObject => 105,
            Self::ResponseInvalid => 106,
            Self::ResponseHashMismatch => 107,
            Self::ServerNotFound => 190,
            Self::ServerRedirect => 300,
            Self::ServerHttpError => 400,
            Self::ServerFatalError => 500,
            Self::ServerCannotConnect => 501,
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::AssetNotFound => -10000,
            Self::TxOutNotFound => -10001,
        }
    }

    /// Decode a numeric code; unknown codes map to [`ServerError::Unknown`]
    pub fn from_code(code: i64) -> Self {
        match code {
            100 => Self::ResponseNotObject,
            101 => Self::ResponseWrongId,
            103 => Self::ResponseParseError,
            104 => Self::ResponseResultNotFound,
            105 => Self::ResponseResultNotObject,
            106 => Self::ResponseInvalid,
            107 => Self::ResponseHashMismatch,
            190 => Self::ServerNotFound,
            300 => Self::ServerRedirect,
            400 => Self::ServerHttpError,
            500 => Self::ServerFatalError,
            501 => Self::ServerCannotConnect,
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -10000 => Self::AssetNotFound,
            -10001 => Self::TxOutNotFound,
            _ => Self::Unknown,
        }
    }

    /// Map an HTTP status code onto the taxonomy
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            300..=399 => Some(Self::ServerRedirect),
            404 => Some(Self::ServerNotFound),
            400..=499 => Some(Self::ServerHttpError),
            _ => Some(Self::ServerFatalError),
        }
    }
}
