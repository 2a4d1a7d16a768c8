/// Axum HTTP handlers for the tracker endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::fixture::Fixture;
use crate::types::*;

/// Shared application state
pub type AppState = Arc<Fixture>;

/// Errors outside the JSON-RPC envelope
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, message).into_response()
    }
}

/// POST /
/// JSON-RPC endpoint; only `coinspark_assets_get_qty` is served
pub async fn json_rpc(
    State(fixture): State<AppState>,
    body: String,
) -> Result<Json<RpcResponse>, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("Empty request body".to_string()));
    }
    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Unparseable request: {}", e);
            return Ok(Json(RpcResponse::error(
                Value::Null,
                RpcError::new(PARSE_ERROR, "Parse error"),
            )));
        }
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(_) => {
            return Ok(Json(RpcResponse::error(
                id,
                RpcError::new(INVALID_REQUEST, "Invalid request"),
            )))
        }
    };

    if request.method != GET_QTY_METHOD {
        log::info!("Unsupported method {}", request.method);
        return Ok(Json(RpcResponse::error(
            request.id,
            RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {}", request.method)),
        )));
    }
    let params: GetQtyParams = match serde_json::from_value(request.params) {
        Ok(params) => params,
        Err(e) => {
            return Ok(Json(RpcResponse::error(
                request.id,
                RpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)),
            )))
        }
    };

    log::info!(
        "get_qty: {} assets, {} outputs",
        params.assets.len(),
        params.txouts.len()
    );
    let response = match fixture.get_qty(&params) {
        Ok(result) => RpcResponse::result(request.id, result),
        Err(error) => RpcResponse::error(request.id, error),
    };
    Ok(Json(response))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
