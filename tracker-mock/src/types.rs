/// Tracker JSON-RPC request and response types
///
/// These match what wallets send to a CoinSpark asset tracker so the mock can
/// stand in for a real one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GET_QTY_METHOD: &str = "coinspark_assets_get_qty";

/// Key of the native bitcoin quantities in a `get_qty` result
pub const NATIVE_KEY: &str = "BTC";

// JSON-RPC error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const ASSET_NOT_FOUND: i64 = -10000;
pub const TXOUT_NOT_FOUND: i64 = -10001;

/// JSON-RPC request envelope
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Parameters of `coinspark_assets_get_qty`
#[derive(Debug, Clone, Deserialize)]
pub struct GetQtyParams {
    pub assets: Vec<String>,
    pub txouts: Vec<TxOutParam>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutParam {
    pub txid: String,
    pub vout: u32,
}

/// JSON-RPC response envelope; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Quantity of one asset at one output, as stored in the fixture file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRow {
    pub txid: String,
    pub vout: u32,
    pub qty: u64,
    #[serde(default)]
    pub spent: bool,
}

/// One row of a `get_qty` answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QtyRow {
    pub txid: String,
    pub vout: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl QtyRow {
    pub fn found(row: &FixtureRow) -> Self {
        Self {
            txid: row.txid.clone(),
            vout: row.vout,
            qty: Some(row.qty),
            spent: Some(u8::from(row.spent)),
            error: None,
        }
    }

    pub fn missing(txout: &TxOutParam) -> Self {
        Self {
            txid: txout.txid.clone(),
            vout: txout.vout,
            qty: None,
            spent: None,
            error: Some(RpcError::new(TXOUT_NOT_FOUND, "Output not found")),
        }
    }
}
