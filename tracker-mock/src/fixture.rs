/// Canned asset quantities loaded from a JSON file
///
/// The file maps genesis txids (and `BTC`) to lists of
/// `{txid, vout, qty, spent}` rows.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::*;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cannot read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct Fixture {
    assets: HashMap<String, Vec<FixtureRow>>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let contents = std::fs::read_to_string(path)?;
        let fixture = Self::from_json(&contents)?;
        log::info!(
            "Loaded fixture {} with {} assets",
            path.display(),
            fixture.assets.len()
        );
        Ok(fixture)
    }

    pub fn from_json(contents: &str) -> Result<Self, FixtureError> {
        let raw: HashMap<String, Vec<FixtureRow>> = serde_json::from_str(contents)?;
        let assets = raw
            .into_iter()
            .map(|(key, rows)| (normalize(&key), rows))
            .collect();
        Ok(Self { assets })
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Answer a `get_qty` call
    ///
    /// Every requested asset must be known. Native quantities are always
    /// included when the fixture has them.
    pub fn get_qty(&self, params: &GetQtyParams) -> Result<Value, RpcError> {
        let mut result = Map::new();
        for asset in &params.assets {
            let key = normalize(asset);
            let Some(rows) = self.assets.get(&key) else {
                log::debug!("Unknown asset {}", asset);
                return Err(RpcError::new(
                    ASSET_NOT_FOUND,
                    format!("Asset not found: {}", asset),
                ));
            };
            result.insert(asset.clone(), answer_rows(rows, &params.txouts));
        }
        if let Some(rows) = self.assets.get(NATIVE_KEY) {
            result.insert(NATIVE_KEY.to_string(), answer_rows(rows, &params.txouts));
        }
        Ok(Value::Object(result))
    }
}

fn normalize(key: &str) -> String {
    if key.eq_ignore_ascii_case(NATIVE_KEY) {
        NATIVE_KEY.to_string()
    } else {
        key.to_ascii_lowercase()
    }
}

fn answer_rows(rows: &[FixtureRow], txouts: &[TxOutParam]) -> Value {
    let answer: Vec<QtyRow> = txouts
        .iter()
        .map(|txout| {
            rows.iter()
                .find(|row| row.vout == txout.vout && row.txid.eq_ignore_ascii_case(&txout.txid))
                .map_or_else(|| QtyRow::missing(txout), QtyRow::found)
        })
        .collect();
    serde_json::json!(answer)
}
