//! Tracker JSON-RPC client
//!
//! One `coinspark_assets_get_qty` request names the genesis txids of the
//! assets a server tracks and the outputs being asked about. The result
//! object maps each genesis txid (and `BTC` for native values) to an array
//! of per-output answers.

use std::time::Duration;

use bitcoin::OutPoint;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ServerError;
use crate::http::HttpClient;

pub const GET_QTY_METHOD: &str = "coinspark_assets_get_qty";

/// Result key carrying native currency values
pub const NATIVE_KEY: &str = "BTC";

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    jsonrpc: &'static str,
    method: &'static str,
    params: Params<'a>,
}

#[derive(Debug, Serialize)]
struct Params<'a> {
    assets: &'a [String],
    txouts: Vec<TxOutParam>,
}

#[derive(Debug, Serialize)]
struct TxOutParam {
    txid: String,
    vout: u32,
}

/// Answer for one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerRow {
    Quantity { qty: u64, spent: bool },
    /// The tracker reported an error or no quantity
    Error,
}

/// Validated `result` object of a tracker response
#[derive(Debug, Clone)]
pub struct TrackerAnswer {
    result: Map<String, Value>,
}

fn quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn spent(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_i64().map_or(false, |n| n > 0),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

impl TrackerAnswer {
    /// Answer for `txout` under `key` (a genesis txid or [`NATIVE_KEY`])
    pub fn row(&self, key: &str, txout: &OutPoint) -> Option<TrackerRow> {
        let txid = txout.txid.to_string();
        self.result
            .get(key)?
            .as_array()?
            .iter()
            .filter_map(Value::as_object)
            .find(|entry| {
                entry
                    .get("txid")
                    .and_then(Value::as_str)
                    .map_or(false, |t| t.eq_ignore_ascii_case(&txid))
                    && entry.get("vout").and_then(Value::as_u64) == Some(u64::from(txout.vout))
            })
            .map(|entry| {
                if entry.get("error").map_or(false, |e| !e.is_null()) {
                    return TrackerRow::Error;
                }
                match entry.get("qty").and_then(quantity) {
                    Some(qty) => TrackerRow::Quantity {
                        qty,
                        spent: spent(entry.get("spent")),
                    },
                    None => TrackerRow::Error,
                }
            })
    }
}

/// Request body for `assets` and `txouts`
pub fn request_body(id: u64, assets: &[String], txouts: &[OutPoint]) -> String {
    let request = Request {
        id,
        jsonrpc: "2.0",
        method: GET_QTY_METHOD,
        params: Params {
            assets,
            txouts: txouts
                .iter()
                .map(|out| TxOutParam {
                    txid: out.txid.to_string(),
                    vout: out.vout,
                })
                .collect(),
        },
    };
    serde_json::json!(request).to_string()
}

/// Validate a response to the request with `id`
pub fn parse_response(body: &str, id: u64) -> Result<TrackerAnswer, ServerError> {
    let value: Value = serde_json::from_str(body).map_err(|_| ServerError::ResponseParseError)?;
    let object = value.as_object().ok_or(ServerError::ResponseNotObject)?;

    if object.get("id").and_then(Value::as_u64) != Some(id) {
        return Err(ServerError::ResponseWrongId);
    }
    if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64);
        let message = error.get("message").and_then(Value::as_str).unwrap_or("");
        log::warn!("Tracker: query error {:?} {}", code, message);
        return Err(code.map_or(ServerError::Unknown, ServerError::from_code));
    }
    match object.get("result") {
        Some(Value::Object(result)) => Ok(TrackerAnswer {
            result: result.clone(),
        }),
        Some(_) => Err(ServerError::ResponseResultNotObject),
        None => Err(ServerError::ResponseResultNotFound),
    }
}

/// Ask one tracker about `txouts` of `assets`
pub fn query(
    http: &dyn HttpClient,
    url: &str,
    timeout: Duration,
    assets: &[String],
    txouts: &[OutPoint],
) -> Result<TrackerAnswer, ServerError> {
    let id = chrono::Utc::now().timestamp().max(0) as u64;
    let body = request_body(id, assets, txouts);
    log::debug!("Tracker {}: {}", url, body);

    let response = http.post(
        url,
        timeout,
        &body,
        &[("Content-Type", "application/json")],
    );
    if let Some(error) = response.error {
        return Err(error);
    }
    parse_response(&response.text(), id)
}
