//! Persisted form of an asset and the layout of its cached files

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::{AssetSource, AssetState};
use super::specs::AssetSpecs;
use crate::http::{cached_file_path, MimeType};
use crate::scanner::ContractState;

/// JSON record stored for every asset in the registry file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(flatten)]
    pub specs: AssetSpecs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_state: Option<AssetState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_source: Option<AssetSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_contract_state: Option<ContractState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen_txid: Option<String>,
    #[serde(default = "visible_default")]
    pub visible: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsi_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsi_vout: Option<u32>,
    /// Genesis metadata, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_ref_block: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_ref_offset: Option<u32>,
    /// Txid prefix, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_ref_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_failures: u32,
    /// Cached file types, stored as extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_contract_mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_mime: Option<String>,
}

fn visible_default() -> u8 {
    1
}

impl AssetRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A downloaded file and its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub path: PathBuf,
    pub mime: MimeType,
}

/// Naming of cached asset files inside `<prefix>.csfiles/`
#[derive(Debug, Clone)]
pub struct AssetFiles {
    dir: PathBuf,
}

impl AssetFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn named(&self, asset_id: u32, suffix: &str) -> PathBuf {
        self.dir.join(format!("asset{:06}{}", asset_id, suffix))
    }

    pub fn json_path(&self, asset_id: u32) -> PathBuf {
        self.named(asset_id, ".json")
    }

    pub fn valid_json_path(&self, asset_id: u32) -> PathBuf {
        self.named(asset_id, "_valid.json")
    }

    /// Prefix passed to downloads; the MIME extension is appended
    pub fn contract_prefix(&self, asset_id: u32) -> PathBuf {
        self.named(asset_id, "_contract")
    }

    pub fn valid_contract_prefix(&self, asset_id: u32) -> PathBuf {
        self.named(asset_id, "_valid_contract")
    }

    pub fn icon_prefix(&self, asset_id: u32) -> PathBuf {
        self.named(asset_id, "_icon")
    }

    pub fn image_prefix(&self, asset_id: u32) -> PathBuf {
        self.named(asset_id, "_image")
    }

    /// Cached file at `prefix` with the extension of `extension`, if it exists
    pub fn existing(&self, prefix: &Path, extension: Option<&str>) -> Option<CachedFile> {
        let mime = MimeType::from_extension(extension?)?;
        let path = cached_file_path(prefix, mime);
        path.exists().then_some(CachedFile { path, mime })
    }

    /// Existing path, if any
    pub fn existing_path(path: PathBuf) -> Option<PathBuf> {
        path.exists().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_names() {
        let files = AssetFiles::new("/data/wallet.csfiles");
        assert_eq!(
            files.json_path(12),
            PathBuf::from("/data/wallet.csfiles/asset000012.json")
        );
        assert_eq!(
            files.valid_json_path(12),
            PathBuf::from("/data/wallet.csfiles/asset000012_valid.json")
        );
        assert_eq!(
            cached_file_path(&files.valid_contract_prefix(3), MimeType::Pdf),
            PathBuf::from("/data/wallet.csfiles/asset000003_valid_contract.pdf")
        );
    }

    #[test]
    fn test_existing_file_lookup() {
        let dir = TempDir::new().unwrap();
        let files = AssetFiles::new(dir.path());
        let prefix = files.contract_prefix(1);
        assert!(files.existing(&prefix, Some(".pdf")).is_none());

        std::fs::write(cached_file_path(&prefix, MimeType::Pdf), b"%PDF").unwrap();
        let cached = files.existing(&prefix, Some(".pdf")).unwrap();
        assert_eq!(cached.mime, MimeType::Pdf);
        assert!(files.existing(&prefix, None).is_none());
        assert!(files.existing(&prefix, Some(".bogus")).is_none());
    }

    #[test]
    fn test_record_keys() {
        let record = AssetRecord {
            specs: AssetSpecs {
                name: Some("Gold".to_string()),
                ..Default::default()
            },
            asset_state: Some(AssetState::HashMismatch),
            asset_source: Some(AssetSource::Transfer),
            visible: 0,
            asset_ref_block: Some(100),
            asset_ref_offset: Some(81),
            asset_ref_prefix: Some("abcd".to_string()),
            valid_failures: 4,
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["name"], "Gold");
        assert_eq!(value["asset_state"], "HASH_MISMATCH");
        assert_eq!(value["asset_source"], "TRANSFER");
        assert_eq!(value["visible"], 0);
        assert_eq!(value["asset_ref_prefix"], "abcd");
        assert_eq!(value["valid_failures"], 4);

        let parsed = AssetRecord::from_json(r#"{"name":"Gold","redemption_irl":"http://r"}"#).unwrap();
        assert_eq!(parsed.visible, 1);
        assert_eq!(parsed.specs.redemption_url.as_deref(), Some("http://r"));
    }
}
