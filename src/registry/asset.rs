//! A single asset and its validation lifecycle
//!
//! Validation runs in stages: resolve the asset reference to a genesis
//! transaction, fetch the issuer's specification from the asset web page,
//! download and scan the contract, then check the asset hash committed in
//! the genesis. Each stage that fails leaves the asset in a state that
//! names the failure, and the failure counter drives the retry backoff.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::{OutPoint, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{AssetFiles, AssetRecord, CachedFile};
use super::specs::{extract_specification, AssetSpecs};
use crate::chain::{
    offset_of_transaction, transaction_by_offset, txid_display_bytes, ChainSource,
};
use crate::config::AssetsConfig;
use crate::events::{AssetEvent, Events};
use crate::http::{cached_file_path, HttpClient};
use crate::protocol::{AssetRef, GenesisRecord, ProtocolCodec, TXID_PREFIX_LEN};
use crate::scanner::{scan_contract, ContractState};

/// Validation state of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetState {
    Invalid,
    /// Neither asset reference nor genesis is known
    NoKey,
    /// Only the asset reference is known
    AssetRefOnly,
    BlockNotFound,
    /// No transaction at the referenced offset, or its txid prefix differs
    TxNotFound,
    GenesisNotFound,
    NotValidatedYet,
    AssetWebPageNotFound,
    AssetSpecsNotFound,
    AssetSpecsNotParsed,
    RequiredFieldMissing,
    ContractNotFound,
    ContractInvalid,
    HashMismatch,
    /// Revalidation requested
    Refresh,
    Valid,
    /// Another asset has the same genesis txid or reference
    Duplicate,
}

/// How the wallet learned about an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetSource {
    Genesis,
    Transfer,
    Manual,
}

/// Downloaded files of an asset: the current copy and the last valid one
#[derive(Debug, Clone, Default)]
pub struct AssetFileSet {
    pub json: Option<PathBuf>,
    pub valid_json: Option<PathBuf>,
    pub contract: Option<CachedFile>,
    pub valid_contract: Option<CachedFile>,
    pub icon: Option<CachedFile>,
    pub image: Option<CachedFile>,
}

/// Collaborators used while validating an asset
pub(crate) struct ValidationContext<'a> {
    pub chain: &'a dyn ChainSource,
    pub http: &'a dyn HttpClient,
    pub codec: &'a dyn ProtocolCodec,
    pub files: &'a AssetFiles,
    pub config: &'a AssetsConfig,
    pub events: &'a Events,
}

#[derive(Debug, Clone)]
pub struct Asset {
    id: u32,
    date_created: DateTime<Utc>,
    state: AssetState,
    /// Working copy of `state` while a validation pass runs
    validation_state: AssetState,
    source: AssetSource,
    contract_state: ContractState,
    visible: bool,
    gen_txid: Option<Txid>,
    genesis: Option<Arc<dyn GenesisRecord>>,
    asset_ref: Option<AssetRef>,
    first_spent: Option<OutPoint>,
    valid_checked: Option<DateTime<Utc>>,
    valid_failures: u32,
    specs: AssetSpecs,
    files: AssetFileSet,
}

impl Asset {
    fn with_state(state: AssetState, source: AssetSource) -> Self {
        Self {
            id: 0,
            date_created: Utc::now(),
            state,
            validation_state: state,
            source,
            contract_state: ContractState::Unknown,
            visible: true,
            gen_txid: None,
            genesis: None,
            asset_ref: None,
            first_spent: None,
            valid_checked: None,
            valid_failures: 0,
            specs: AssetSpecs::default(),
            files: AssetFileSet::default(),
        }
    }

    /// Asset created by the wallet from its own genesis transaction
    ///
    /// When the block height is known the reference is set with an
    /// unresolved offset.
    pub fn from_genesis(txid: Txid, genesis: Arc<dyn GenesisRecord>, block: u32) -> Self {
        let mut asset = Self::with_state(AssetState::NotValidatedYet, AssetSource::Genesis);
        asset.gen_txid = Some(txid);
        asset.genesis = Some(genesis);
        if block > 0 {
            let display = txid_display_bytes(&txid);
            let mut prefix = [0u8; TXID_PREFIX_LEN];
            prefix.copy_from_slice(&display[..TXID_PREFIX_LEN]);
            asset.asset_ref = Some(AssetRef::new(block, 0, prefix));
        }
        asset
    }

    /// Asset known only by its reference, seen in a transfer or added manually
    pub fn from_asset_ref(asset_ref: AssetRef, source: AssetSource) -> Self {
        let mut asset = Self::with_state(AssetState::AssetRefOnly, source);
        asset.asset_ref = Some(asset_ref);
        asset
    }

    /// Rebuild an asset from its stored record
    ///
    /// File paths are derived from the id and kept only if the files still
    /// exist. A valid asset whose valid contract copy has disappeared is
    /// demoted.
    pub fn from_record(
        id: u32,
        record: AssetRecord,
        files: &AssetFiles,
        codec: &dyn ProtocolCodec,
    ) -> Self {
        let state = record.asset_state.unwrap_or(AssetState::NoKey);
        let mut asset = Self::with_state(state, record.asset_source.unwrap_or(AssetSource::Manual));
        asset.id = id;
        if let Some(created) = record.date_created {
            asset.date_created = created;
        }
        asset.contract_state = record.asset_contract_state.unwrap_or_default();
        asset.visible = record.visible != 0;
        asset.gen_txid = record
            .gen_txid
            .as_deref()
            .and_then(|s| Txid::from_str(s).ok());
        asset.genesis = record
            .genesis
            .as_deref()
            .and_then(|h| hex::decode(h).ok())
            .and_then(|bytes| codec.decode_genesis(&bytes));
        asset.first_spent = record
            .fsi_txid
            .as_deref()
            .and_then(|s| Txid::from_str(s).ok())
            .map(|txid| OutPoint::new(txid, record.fsi_vout.unwrap_or(0)));
        asset.asset_ref = record.asset_ref_block.map(|block| {
            let mut prefix = [0u8; TXID_PREFIX_LEN];
            if let Some(bytes) = record.asset_ref_prefix.as_deref().and_then(|h| hex::decode(h).ok()) {
                let n = bytes.len().min(TXID_PREFIX_LEN);
                prefix[..n].copy_from_slice(&bytes[..n]);
            }
            AssetRef::new(block, record.asset_ref_offset.unwrap_or(0), prefix)
        });
        asset.valid_checked = record.valid_checked;
        asset.valid_failures = record.valid_failures;
        asset.specs = record.specs;

        if id > 0 {
            asset.files = AssetFileSet {
                json: AssetFiles::existing_path(files.json_path(id)),
                valid_json: AssetFiles::existing_path(files.valid_json_path(id)),
                contract: files.existing(&files.contract_prefix(id), record.contract_mime.as_deref()),
                valid_contract: files.existing(
                    &files.valid_contract_prefix(id),
                    record.valid_contract_mime.as_deref(),
                ),
                icon: files.existing(&files.icon_prefix(id), record.icon_mime.as_deref()),
                image: files.existing(&files.image_prefix(id), record.image_mime.as_deref()),
            };
            if asset.state == AssetState::Valid && asset.files.valid_contract.is_none() {
                log::warn!("Asset {}: contract file missing, revalidating", id);
                asset.state = AssetState::ContractNotFound;
                asset.validation_state = AssetState::ContractNotFound;
                asset.valid_checked = Some(Utc::now());
                asset.valid_failures = 1;
            }
        }
        asset
    }

    /// Record persisted in the registry file
    pub fn to_record(&self) -> AssetRecord {
        let extension = |file: &Option<CachedFile>| {
            file.as_ref().map(|f| f.mime.extension().to_string())
        };
        AssetRecord {
            specs: self.specs.clone(),
            asset_id: (self.id > 0).then_some(self.id),
            date_created: Some(self.date_created),
            asset_state: Some(self.state),
            asset_source: Some(self.source),
            asset_contract_state: Some(self.contract_state),
            gen_txid: self.gen_txid.map(|t| t.to_string()),
            visible: u8::from(self.visible),
            fsi_txid: self.first_spent.map(|o| o.txid.to_string()),
            fsi_vout: self.first_spent.map(|o| o.vout),
            genesis: self.genesis.as_ref().map(|g| hex::encode(g.encode())),
            asset_ref_block: self.asset_ref.map(|r| r.block),
            asset_ref_offset: self.asset_ref.map(|r| r.tx_offset),
            asset_ref_prefix: self.asset_ref.map(|r| hex::encode(r.txid_prefix)),
            valid_checked: self.valid_checked,
            valid_failures: self.valid_failures,
            contract_mime: extension(&self.files.contract),
            valid_contract_mime: extension(&self.files.valid_contract),
            icon_mime: extension(&self.files.icon),
            image_mime: extension(&self.files.image),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn state(&self) -> AssetState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: AssetState) {
        self.state = state;
        self.validation_state = state;
    }

    /// Request revalidation on the next pass
    pub fn set_refresh_state(&mut self) {
        self.set_state(AssetState::Refresh);
    }

    pub fn source(&self) -> AssetSource {
        self.source
    }

    pub fn contract_state(&self) -> ContractState {
        self.contract_state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn gen_txid(&self) -> Option<Txid> {
        self.gen_txid
    }

    pub fn genesis(&self) -> Option<&Arc<dyn GenesisRecord>> {
        self.genesis.as_ref()
    }

    pub fn asset_ref(&self) -> Option<AssetRef> {
        self.asset_ref
    }

    pub(crate) fn set_asset_ref(&mut self, asset_ref: Option<AssetRef>) {
        self.asset_ref = asset_ref;
    }

    /// Whether the reference is resolved to a transaction offset
    pub fn is_asset_ref_valid(&self) -> bool {
        self.asset_ref.map_or(false, |r| r.is_resolved())
    }

    pub fn first_spent(&self) -> Option<OutPoint> {
        self.first_spent
    }

    pub fn valid_checked(&self) -> Option<DateTime<Utc>> {
        self.valid_checked
    }

    pub fn valid_failures(&self) -> u32 {
        self.valid_failures
    }

    pub fn specs(&self) -> &AssetSpecs {
        &self.specs
    }

    pub fn name(&self) -> Option<&str> {
        self.specs.name.as_deref()
    }

    pub fn tracker_urls(&self) -> &[String] {
        &self.specs.tracker_urls
    }

    pub fn files(&self) -> &AssetFileSet {
        &self.files
    }

    /// Canonical web page derived from the genesis and its first spent input
    pub fn asset_web_page_url(&self) -> Option<String> {
        let genesis = self.genesis.as_ref()?;
        let first_spent = self.first_spent?;
        genesis.asset_web_page_url(&first_spent.txid.to_string(), first_spent.vout)
    }

    /// Issuer home page derived from the genesis domain
    pub fn domain_url(&self) -> Option<String> {
        self.genesis.as_ref()?.domain_url()
    }

    /// Seconds until the next validation attempt is due
    pub fn next_validation_interval(&self, now: DateTime<Utc>) -> u64 {
        let Some(checked) = self.valid_checked else {
            return 0;
        };
        let elapsed = (now - checked).num_seconds();

        let interval: i64 = if self.genesis.is_some() {
            match self.validation_state {
                AssetState::NotValidatedYet | AssetState::Refresh | AssetState::Invalid => {
                    return 0
                }
                AssetState::Valid => 86400,
                _ => match self.valid_failures {
                    0..=59 => 0,
                    60..=199 => 1800,
                    _ => 86400,
                },
            }
        } else {
            match self.validation_state {
                AssetState::TxNotFound | AssetState::GenesisNotFound => {
                    match self.valid_failures {
                        0..=9 => 0,
                        10..=19 => 600,
                        _ => 86400,
                    }
                }
                _ => return 0,
            }
        };
        (interval - elapsed).max(0) as u64
    }

    /// Resolve the transaction offset of a reference that only has a block height
    pub(crate) fn validate_asset_ref(&mut self, chain: &dyn ChainSource) -> bool {
        if self.genesis.is_none() {
            return false;
        }
        let (Some(mut asset_ref), Some(txid)) = (self.asset_ref, self.gen_txid) else {
            return false;
        };
        if asset_ref.tx_offset > 0 || asset_ref.block == 0 {
            return false;
        }

        log::info!("Asset {}: resolving asset reference {}", self.id, asset_ref);
        let Some(block) = chain.block_at(asset_ref.block) else {
            log::info!("Asset {}: cannot find block at height {}", self.id, asset_ref.block);
            return false;
        };
        let offset = offset_of_transaction(&block, &txid);
        if offset == 0 {
            log::info!(
                "Asset {}: transaction {} not in block {}",
                self.id,
                txid,
                block.block_hash()
            );
            return false;
        }
        asset_ref.tx_offset = offset;
        self.asset_ref = Some(asset_ref);
        true
    }

    /// Load the genesis transaction named by the asset reference
    fn validate_genesis(&mut self, ctx: &ValidationContext<'_>) -> bool {
        let initial = self.validation_state;
        if self.genesis.is_some() && self.first_spent.is_some() {
            return false;
        }
        let Some(asset_ref) = self.asset_ref else {
            self.validation_state = AssetState::NoKey;
            return self.validation_state != initial;
        };

        ctx.events.emit(AssetEvent::AssetValidationStarted(self.id));
        self.validation_state = AssetState::NotValidatedYet;
        log::info!("Asset {}: retrieving genesis for {}", self.id, asset_ref);

        let Some(block) = ctx.chain.block_at(asset_ref.block) else {
            log::info!("Asset {}: cannot find block at height {}", self.id, asset_ref.block);
            self.validation_state = AssetState::BlockNotFound;
            return self.validation_state != initial;
        };
        let Some(tx) = transaction_by_offset(&block, asset_ref.tx_offset) else {
            log::info!(
                "Asset {}: no transaction at offset {} in block {}",
                self.id,
                asset_ref.tx_offset,
                block.block_hash()
            );
            self.validation_state = AssetState::TxNotFound;
            return self.validation_state != initial;
        };

        let txid = tx.compute_txid();
        let display = txid_display_bytes(&txid);
        if display[..TXID_PREFIX_LEN] != asset_ref.txid_prefix {
            log::info!(
                "Asset {}: txid prefix mismatch, need {}, found {}",
                self.id,
                hex::encode(asset_ref.txid_prefix),
                hex::encode(&display[..TXID_PREFIX_LEN])
            );
            self.validation_state = AssetState::TxNotFound;
            return self.validation_state != initial;
        }

        self.gen_txid = Some(txid);
        self.genesis = ctx.codec.genesis_of(tx);
        match tx.input.first() {
            Some(input) => self.first_spent = Some(input.previous_output),
            None => self.genesis = None,
        }
        self.validation_state = if self.genesis.is_some() {
            AssetState::NotValidatedYet
        } else {
            AssetState::GenesisNotFound
        };
        self.validation_state != initial
    }

    /// Fetch, parse and verify the issuer specification and contract
    fn validate_details(&mut self, ctx: &ValidationContext<'_>, now: DateTime<Utc>) -> bool {
        if self.validation_state == AssetState::NoKey {
            return false;
        }
        let valid = self.genesis.is_some() && self.fetch_specs(ctx) && self.check_asset_details(ctx);

        self.valid_checked = Some(now);
        if valid {
            self.valid_failures = 0;
            self.validation_state = AssetState::Valid;
        } else {
            self.valid_failures += 1;
        }
        true
    }

    fn fetch_specs(&mut self, ctx: &ValidationContext<'_>) -> bool {
        let Some(url) = self.asset_web_page_url() else {
            return false;
        };
        log::info!("Asset {}: fetching asset details from {}", self.id, url);

        let page = ctx.http.fetch(&url, ctx.config.web_page_timeout, None);
        if let Some(error) = page.error {
            log::info!("Asset {}: cannot fetch web page: {}", self.id, error);
            self.validation_state = AssetState::AssetWebPageNotFound;
            return false;
        }
        let text = page.text();
        let Some(json) = extract_specification(&text) else {
            log::info!("Asset {}: asset specification not found", self.id);
            self.validation_state = AssetState::AssetSpecsNotFound;
            return false;
        };

        let json_path = ctx.files.json_path(self.id);
        if let Err(e) = fs::write(&json_path, json) {
            log::warn!("Asset {}: cannot save specification: {}", self.id, e);
            return false;
        }
        self.files.json = Some(json_path);

        match AssetSpecs::parse(json) {
            Ok(specs) => {
                self.specs = specs;
                if !self.specs.has_required_fields() {
                    self.validation_state = AssetState::RequiredFieldMissing;
                    return false;
                }
                true
            }
            Err(e) => {
                log::info!("Asset {}: cannot parse specification: {}", self.id, e);
                self.validation_state = AssetState::AssetSpecsNotParsed;
                false
            }
        }
    }

    fn download(&self, ctx: &ValidationContext<'_>, url: &str, prefix: &std::path::Path) -> Option<CachedFile> {
        log::info!("Asset {}: downloading {}", self.id, url);
        let downloaded = ctx.http.fetch(url, ctx.config.download_timeout, Some(prefix));
        if let Some(error) = downloaded.error {
            log::info!("Asset {}: cannot download {}: {}", self.id, url, error);
            return None;
        }
        Some(CachedFile {
            path: downloaded.file_path?,
            mime: downloaded.mime_type?,
        })
    }

    fn check_asset_details(&mut self, ctx: &ValidationContext<'_>) -> bool {
        if !self.specs.has_required_fields() {
            return false;
        }
        let Some(contract_url) = self.specs.contract_url.clone() else {
            return false;
        };
        match self.download(ctx, &contract_url, &ctx.files.contract_prefix(self.id)) {
            Some(contract) => self.files.contract = Some(contract),
            None => {
                self.validation_state = AssetState::ContractNotFound;
                return false;
            }
        }

        if let Some(url) = self.specs.icon_url.clone().filter(|u| !u.is_empty()) {
            if let Some(icon) = self.download(ctx, &url, &ctx.files.icon_prefix(self.id)) {
                self.files.icon = Some(icon);
            }
        }
        if let Some(url) = self.specs.image_url.clone().filter(|u| !u.is_empty()) {
            if let Some(image) = self.download(ctx, &url, &ctx.files.image_prefix(self.id)) {
                self.files.image = Some(image);
            }
        }

        self.check_contract_and_asset_hash(ctx)
    }

    fn read_contract(&self) -> Option<Vec<u8>> {
        let contract = self.files.contract.as_ref()?;
        match fs::read(&contract.path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                log::info!("Asset {}: cannot read contract: {}", self.id, e);
                None
            }
        }
    }

    fn check_contract_and_asset_hash(&mut self, ctx: &ValidationContext<'_>) -> bool {
        let Some(genesis) = self.genesis.clone() else {
            return false;
        };
        if !self.specs.has_required_fields() {
            return false;
        }

        let contract = self.read_contract();
        self.contract_state = contract
            .as_deref()
            .map_or(ContractState::CannotParse, scan_contract);
        let Some(contract) = contract.filter(|_| self.contract_state.is_ok()) else {
            log::info!("Asset {}: contract rejected: {:?}", self.id, self.contract_state);
            self.validation_state = AssetState::ContractInvalid;
            return false;
        };

        let hash = ctx.codec.calc_asset_hash(&self.specs.hash_fields(), &contract);
        if !genesis.validate_asset_hash(&hash) {
            log::info!("Asset {}: asset hash mismatch", self.id);
            self.validation_state = AssetState::HashMismatch;
            return false;
        }

        if let Err(e) = self.promote_valid_files(ctx.files) {
            log::warn!("Asset {}: cannot promote valid files: {}", self.id, e);
            return false;
        }
        true
    }

    /// Copy the current specification and contract over the last valid ones
    ///
    /// Both files are staged next to their targets and renamed into place
    /// only once every copy succeeded.
    fn promote_valid_files(&mut self, files: &AssetFiles) -> crate::Result<()> {
        let mut staged = Vec::new();
        if let Some(json) = &self.files.json {
            staged.push((json.clone(), files.valid_json_path(self.id)));
        }
        if let Some(contract) = &self.files.contract {
            let target = cached_file_path(&files.valid_contract_prefix(self.id), contract.mime);
            staged.push((contract.path.clone(), target));
        }

        let mut renames = Vec::with_capacity(staged.len());
        for (source, target) in &staged {
            let tmp = staging_path(target);
            if let Err(e) = fs::copy(source, &tmp) {
                for (tmp, _) in &renames {
                    let _ = fs::remove_file(tmp);
                }
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
            renames.push((tmp, target));
        }
        for (tmp, target) in renames {
            fs::rename(&tmp, target)?;
        }

        if self.files.json.is_some() {
            self.files.valid_json = Some(files.valid_json_path(self.id));
        }
        if let Some(contract) = &self.files.contract {
            self.files.valid_contract = Some(CachedFile {
                path: cached_file_path(&files.valid_contract_prefix(self.id), contract.mime),
                mime: contract.mime,
            });
        }
        Ok(())
    }

    /// Run one validation pass; returns whether the asset needs saving
    pub(crate) fn validate(&mut self, ctx: &ValidationContext<'_>, force: bool) -> bool {
        self.validation_state = self.state;
        let mut update = self.validate_genesis(ctx);

        let now = Utc::now();
        if update || force || self.next_validation_interval(now) == 0 {
            ctx.events.emit(AssetEvent::AssetValidationStarted(self.id));
            update |= self.validate_details(ctx, now);
        }

        update |= self.state != self.validation_state;
        self.state = self.validation_state;
        update
    }

    /// Paths of every cached file, for deletion
    pub(crate) fn cached_paths(&self) -> Vec<PathBuf> {
        let f = &self.files;
        [&f.contract, &f.valid_contract, &f.icon, &f.image]
            .into_iter()
            .flatten()
            .map(|c| c.path.clone())
            .chain(f.json.iter().cloned())
            .chain(f.valid_json.iter().cloned())
            .collect()
    }
}

/// `<target>.new`, renamed over `target` once written
fn staging_path(target: &Path) -> PathBuf {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".new");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use chrono::Duration;

    #[derive(Debug)]
    struct StubGenesis;

    impl GenesisRecord for StubGenesis {
        fn encode(&self) -> Vec<u8> {
            vec![1, 2, 3]
        }
        fn apply(&self, outputs_regular: &[bool]) -> Vec<u64> {
            vec![0; outputs_regular.len()]
        }
        fn calc_min_fee(&self, _: &[u64], _: &[bool]) -> u64 {
            0
        }
        fn asset_web_page_url(&self, txid: &str, vout: u32) -> Option<String> {
            Some(format!("http://issuer.example/{}-{}", &txid[..4], vout))
        }
        fn validate_asset_hash(&self, _: &[u8]) -> bool {
            true
        }
        fn domain_url(&self) -> Option<String> {
            Some("http://issuer.example".to_string())
        }
    }

    fn txid(n: u8) -> Txid {
        Txid::from_byte_array([n; 32])
    }

    fn asset_with(state: AssetState, failures: u32, checked_secs_ago: i64, now: DateTime<Utc>) -> Asset {
        let mut asset = Asset::from_genesis(txid(1), Arc::new(StubGenesis), 0);
        asset.set_state(state);
        asset.valid_failures = failures;
        asset.valid_checked = Some(now - Duration::seconds(checked_secs_ago));
        asset
    }

    #[test]
    fn test_constructors() {
        let asset = Asset::from_genesis(txid(0xab), Arc::new(StubGenesis), 1000);
        assert_eq!(asset.state(), AssetState::NotValidatedYet);
        assert_eq!(asset.source(), AssetSource::Genesis);
        let asset_ref = asset.asset_ref().unwrap();
        assert_eq!(asset_ref.block, 1000);
        assert_eq!(asset_ref.tx_offset, 0);
        assert_eq!(asset_ref.txid_prefix, [0xab, 0xab]);
        assert!(!asset.is_asset_ref_valid());

        let asset = Asset::from_genesis(txid(1), Arc::new(StubGenesis), 0);
        assert!(asset.asset_ref().is_none());

        let asset = Asset::from_asset_ref(AssetRef::new(5, 81, [1, 2]), AssetSource::Transfer);
        assert_eq!(asset.state(), AssetState::AssetRefOnly);
        assert!(asset.is_asset_ref_valid());
        assert!(asset.genesis().is_none());
    }

    #[test]
    fn test_interval_without_check_is_zero() {
        let asset = Asset::from_genesis(txid(1), Arc::new(StubGenesis), 0);
        assert_eq!(asset.next_validation_interval(Utc::now()), 0);
    }

    #[test]
    fn test_interval_failure_tiers() {
        let now = Utc::now();
        let at_45 = asset_with(AssetState::HashMismatch, 45, 5, now);
        assert_eq!(at_45.next_validation_interval(now), 0);

        let at_70 = asset_with(AssetState::HashMismatch, 70, 5, now);
        assert_eq!(at_70.next_validation_interval(now), 1795);

        let at_250 = asset_with(AssetState::HashMismatch, 250, 5, now);
        assert_eq!(at_250.next_validation_interval(now), 86395);

        let valid = asset_with(AssetState::Valid, 0, 86400 + 10, now);
        assert_eq!(valid.next_validation_interval(now), 0);
    }

    #[test]
    fn test_interval_refresh_is_immediate() {
        let now = Utc::now();
        for state in [AssetState::Refresh, AssetState::NotValidatedYet, AssetState::Invalid] {
            let asset = asset_with(state, 500, 1, now);
            assert_eq!(asset.next_validation_interval(now), 0);
        }
    }

    #[test]
    fn test_interval_without_genesis() {
        let now = Utc::now();
        let mut asset = Asset::from_asset_ref(AssetRef::new(5, 81, [1, 2]), AssetSource::Manual);
        asset.valid_checked = Some(now - Duration::seconds(100));

        asset.set_state(AssetState::TxNotFound);
        asset.valid_failures = 9;
        assert_eq!(asset.next_validation_interval(now), 0);
        asset.valid_failures = 15;
        assert_eq!(asset.next_validation_interval(now), 500);
        asset.valid_failures = 25;
        assert_eq!(asset.next_validation_interval(now), 86300);

        asset.set_state(AssetState::BlockNotFound);
        assert_eq!(asset.next_validation_interval(now), 0);
    }

    #[test]
    fn test_interval_non_increasing_over_time() {
        let now = Utc::now();
        for failures in [0, 70, 250] {
            let mut previous = u64::MAX;
            for ago in [0, 10, 600, 1800, 3600, 90000] {
                let asset = asset_with(AssetState::ContractNotFound, failures, ago, now);
                let interval = asset.next_validation_interval(now);
                assert!(interval <= previous);
                previous = interval;
            }
        }
    }

    #[test]
    fn test_web_page_url_needs_first_spent() {
        let mut asset = Asset::from_genesis(txid(0x12), Arc::new(StubGenesis), 0);
        assert!(asset.asset_web_page_url().is_none());
        asset.first_spent = Some(OutPoint::new(txid(0x12), 3));
        assert_eq!(
            asset.asset_web_page_url().as_deref(),
            Some("http://issuer.example/1212-3")
        );
        assert_eq!(asset.domain_url().as_deref(), Some("http://issuer.example"));
    }
}
