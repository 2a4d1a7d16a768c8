//! Issuer-published asset specification
//!
//! The asset web page embeds a JSON object wrapped as
//! `_bitcoin_asset_specification_({...})`. The same field names are reused
//! by the registry's own asset records.

use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};

use crate::http::add_http_if_missing;
use crate::protocol::AssetHashFields;

const SPECIFICATION_MARKER: &str = "_bitcoin_asset_specification_(";

/// Fields published by the issuer on the asset web page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSpecs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_url: Option<String>,
    /// Tracker servers; published either as one string or as an array
    #[serde(
        default,
        rename = "coinspark_tracker_url",
        deserialize_with = "tracker_urls",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tracker_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, rename = "format_1", skip_serializing_if = "Option::is_none")]
    pub format_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(
        default,
        alias = "redemption_irl",
        skip_serializing_if = "Option::is_none"
    )]
    pub redemption_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<serde_json::Value>),
}

fn tracker_urls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let urls = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(values) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    };
    Ok(urls.iter().map(|url| add_http_if_missing(url)).collect())
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().map_or(false, |s| !s.trim().is_empty())
}

fn valid_url(url: &str) -> bool {
    reqwest::Url::parse(url).is_ok()
}

impl AssetSpecs {
    /// Parse the JSON object published on an asset web page
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether every field needed for validation is present and well formed
    pub fn has_required_fields(&self) -> bool {
        if !(present(&self.name)
            && present(&self.name_short)
            && present(&self.issuer)
            && present(&self.description)
            && present(&self.units))
        {
            return false;
        }
        match self.contract_url.as_deref() {
            Some(url) if valid_url(url) => {}
            Some(url) => {
                log::info!("Asset details: malformed contract URL {}", url);
                return false;
            }
            None => return false,
        }
        if self.tracker_urls.is_empty() {
            return false;
        }
        if let Some(url) = self.tracker_urls.iter().find(|url| !valid_url(url)) {
            log::info!("Asset details: malformed tracker URL {}", url);
            return false;
        }
        true
    }

    /// One of the published trackers, chosen at random
    pub fn random_tracker_url(&self) -> Option<&str> {
        self.tracker_urls
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    /// Fields bound into the genesis asset hash
    pub fn hash_fields(&self) -> AssetHashFields<'_> {
        AssetHashFields {
            name: self.name.as_deref().unwrap_or_default(),
            issuer: self.issuer.as_deref().unwrap_or_default(),
            description: self.description.as_deref().unwrap_or_default(),
            units: self.units.as_deref().unwrap_or_default(),
            issue_date: self.issue_date.as_deref().unwrap_or_default(),
            expiry_date: self.expiry_date.as_deref(),
            interest_rate: self.interest_rate,
            multiple: self.multiple,
        }
    }
}

/// Locate the specification JSON inside an asset web page
///
/// Parentheses are balanced outside of double-quoted strings, where a
/// backslash escapes the next character.
pub fn extract_specification(page: &str) -> Option<&str> {
    let start = page.find(SPECIFICATION_MARKER)? + SPECIFICATION_MARKER.len();
    let tail = &page.as_bytes()[start..];

    let mut depth = 1;
    let mut in_quotes = false;
    let mut in_escape = false;
    for (pos, &b) in tail.iter().enumerate() {
        if in_escape {
            in_escape = false;
            continue;
        }
        if b == b'"' {
            in_quotes = !in_quotes;
        }
        if in_quotes {
            if b == b'\\' {
                in_escape = true;
            }
        } else if b == b'(' {
            depth += 1;
        } else if b == b')' {
            depth -= 1;
            if depth == 0 {
                return (pos > 0).then(|| &page[start..start + pos]);
            }
        }
    }
    None
}
