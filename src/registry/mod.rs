//! Asset Registry
//!
//! Persisted catalog of known assets:
//! - `<prefix>.csassets`: versioned header followed by `{id, length, JSON}` records
//! - `<prefix>.csfiles/`: cached specifications, contracts, icons and images
//!
//! Assets are indexed by id, genesis txid and resolved asset reference. A
//! second asset claiming an already indexed txid or reference is flagged
//! [`AssetState::Duplicate`] and left for the ledger's duplicate sweep.

mod asset;
mod record;
mod specs;

pub use asset::{Asset, AssetFileSet, AssetSource, AssetState};
pub use record::{AssetFiles, AssetRecord, CachedFile};
pub use specs::{extract_specification, AssetSpecs};

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::Txid;
use chrono::Utc;

use crate::chain::ChainSource;
use crate::config::AssetsConfig;
use crate::error::AssetsError;
use crate::events::{AssetEvent, EventSink, Events};
use crate::http::HttpClient;
use crate::protocol::{AssetRef, ProtocolCodec};
use crate::Result;
use asset::ValidationContext;

const REGISTRY_VERSION: u32 = 0;
const HEADER_SIZE: usize = 8;
const RECORD_HEADER_SIZE: usize = 8;

/// External services the registry validates against
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainSource>,
    pub http: Arc<dyn HttpClient>,
    pub codec: Arc<dyn ProtocolCodec>,
}

#[derive(Default)]
struct RegistryInner {
    assets: BTreeMap<u32, Asset>,
    by_txid: HashMap<Txid, u32>,
    by_ref: HashMap<String, u32>,
    max_id: u32,
}

impl RegistryInner {
    /// Id already holding the txid or reference of `asset`, other than `ignore_id`
    fn find(&self, asset: &Asset, ignore_id: u32) -> Option<u32> {
        let by_txid = asset
            .gen_txid()
            .and_then(|txid| self.by_txid.get(&txid).copied())
            .filter(|&id| id != ignore_id);
        by_txid.or_else(|| {
            asset
                .asset_ref()
                .filter(AssetRef::is_resolved)
                .and_then(|r| self.by_ref.get(&r.to_string()).copied())
                .filter(|&id| id != ignore_id)
        })
    }

    /// Add the index entries of `asset`
    ///
    /// On a collision the asset with the higher id is flagged duplicate and
    /// the key stays with the older one.
    fn index(&mut self, asset: &mut Asset) {
        let id = asset.id();
        self.by_txid.retain(|_, v| *v != id);
        self.by_ref.retain(|_, v| *v != id);

        let mut newer = Vec::new();
        if let Some(txid) = asset.gen_txid() {
            match self.by_txid.get(&txid).copied() {
                Some(other) if other < id => {
                    log::warn!("Asset {}: genesis {} already used by asset {}", id, txid, other);
                    asset.set_state(AssetState::Duplicate);
                }
                Some(other) if other > id => {
                    newer.push(other);
                    self.by_txid.insert(txid, id);
                }
                _ => {
                    self.by_txid.insert(txid, id);
                }
            }
        }
        if let Some(asset_ref) = asset.asset_ref().filter(AssetRef::is_resolved) {
            let key = asset_ref.to_string();
            match self.by_ref.get(&key).copied() {
                Some(other) if other < id => {
                    log::warn!("Asset {}: reference {} already used by asset {}", id, key, other);
                    asset.set_state(AssetState::Duplicate);
                }
                Some(other) if other > id => {
                    newer.push(other);
                    self.by_ref.insert(key, id);
                }
                _ => {
                    self.by_ref.insert(key, id);
                }
            }
        }

        for other in newer {
            if let Some(duplicate) = self.assets.get_mut(&other) {
                log::warn!("Asset {}: same genesis as older asset {}", other, id);
                duplicate.set_state(AssetState::Duplicate);
            }
        }
    }
}

pub struct AssetRegistry {
    config: AssetsConfig,
    path: PathBuf,
    files: AssetFiles,
    collaborators: Collaborators,
    events: Events,
    inner: Mutex<RegistryInner>,
    validating: AtomicBool,
}

impl AssetRegistry {
    /// Open (or create) the registry at the configured prefix
    pub fn open(
        config: AssetsConfig,
        collaborators: Collaborators,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self> {
        let path = config.registry_path();
        let files = AssetFiles::new(config.files_dir());
        fs::create_dir_all(files.dir())?;

        let inner = load(&path, &files, collaborators.codec.as_ref())?;
        log::info!(
            "Asset registry opened: {} ({} assets)",
            path.display(),
            inner.assets.len()
        );

        Ok(Self {
            config,
            path,
            files,
            collaborators,
            events: Events::new(sink),
            inner: Mutex::new(inner),
            validating: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout of the cached asset files
    pub fn files(&self) -> &AssetFiles {
        &self.files
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn config(&self) -> &AssetsConfig {
        &self.config
    }

    pub fn asset_ids(&self) -> Vec<u32> {
        self.inner.lock().unwrap().assets.keys().copied().collect()
    }

    pub fn get_asset(&self, asset_id: u32) -> Option<Asset> {
        self.inner.lock().unwrap().assets.get(&asset_id).cloned()
    }

    /// Id of another asset with the same genesis txid or asset reference
    pub fn find_asset(&self, asset: &Asset, ignore_id: u32) -> Option<u32> {
        self.inner.lock().unwrap().find(asset, ignore_id)
    }

    /// Add a new asset and return its id
    pub fn insert_asset(&self, mut asset: Asset) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.find(&asset, 0) {
            return Err(AssetsError::DuplicateAsset(format!(
                "same genesis or reference as asset {}",
                existing
            )));
        }

        inner.max_id += 1;
        let id = inner.max_id;
        asset.set_id(id);
        inner.index(&mut asset);
        inner.assets.insert(id, asset);

        self.save_or_reload(&mut inner)?;
        drop(inner);

        log::info!("Asset {} inserted", id);
        self.events.emit(AssetEvent::AssetInserted(id));
        Ok(id)
    }

    /// Store a modified copy of an existing asset
    pub fn update_asset(&self, asset: &Asset) -> Result<()> {
        let id = asset.id();
        let mut inner = self.inner.lock().unwrap();
        self.store_locked(&mut inner, asset.clone())?;
        drop(inner);

        self.events.emit(AssetEvent::AssetUpdated(id));
        Ok(())
    }

    fn store_locked(&self, inner: &mut RegistryInner, mut asset: Asset) -> Result<()> {
        let id = asset.id();
        if !inner.assets.contains_key(&id) {
            return Err(AssetsError::AssetNotFound(id));
        }
        inner.index(&mut asset);
        inner.assets.insert(id, asset);
        self.save_or_reload(inner)
    }

    /// Remove an asset and its cached files
    pub fn delete_asset(&self, asset_id: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(asset) = inner.assets.remove(&asset_id) else {
            return Err(AssetsError::AssetNotFound(asset_id));
        };
        inner.by_txid.retain(|_, v| *v != asset_id);
        inner.by_ref.retain(|_, v| *v != asset_id);

        self.save_or_reload(&mut inner)?;
        drop(inner);

        for path in asset.cached_paths() {
            if let Err(e) = fs::remove_file(&path) {
                log::debug!("Cannot remove {}: {}", path.display(), e);
            }
        }
        log::info!("Asset {} deleted", asset_id);
        self.events.emit(AssetEvent::AssetDeleted(asset_id));
        Ok(())
    }

    /// Set the asset reference once it is known
    ///
    /// The duplicate check and the index update happen under one lock.
    pub fn set_asset_reference(&self, asset_id: u32, asset_ref: AssetRef) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mut asset = inner
            .assets
            .get(&asset_id)
            .cloned()
            .ok_or(AssetsError::AssetNotFound(asset_id))?;
        if asset_ref.is_resolved() {
            if let Some(&other) = inner.by_ref.get(&asset_ref.to_string()) {
                if other != asset_id {
                    return Err(AssetsError::DuplicateAsset(asset_ref.to_string()));
                }
            }
        }
        asset.set_asset_ref(Some(asset_ref));
        self.store_locked(&mut inner, asset)?;
        drop(inner);

        self.events.emit(AssetEvent::AssetUpdated(asset_id));
        Ok(())
    }

    pub fn clear_asset_reference(&self, asset_id: u32) -> Result<()> {
        let mut asset = self
            .get_asset(asset_id)
            .ok_or(AssetsError::AssetNotFound(asset_id))?;
        asset.set_asset_ref(None);
        self.update_asset(&asset)
    }

    pub fn set_asset_visibility(&self, asset_id: u32, visible: bool) -> Result<()> {
        let mut asset = self
            .get_asset(asset_id)
            .ok_or(AssetsError::AssetNotFound(asset_id))?;
        asset.set_visible(visible);
        self.update_asset(&asset)?;
        self.events.emit(AssetEvent::AssetVisibilityChanged(asset_id));
        Ok(())
    }

    fn context(&self) -> ValidationContext<'_> {
        ValidationContext {
            chain: self.collaborators.chain.as_ref(),
            http: self.collaborators.http.as_ref(),
            codec: self.collaborators.codec.as_ref(),
            files: &self.files,
            config: &self.config,
            events: &self.events,
        }
    }

    /// Revalidate one asset immediately
    pub fn refresh_asset(&self, asset_id: u32) -> Result<Asset> {
        let mut asset = self
            .get_asset(asset_id)
            .ok_or(AssetsError::AssetNotFound(asset_id))?;
        asset.set_refresh_state();
        asset.validate_asset_ref(self.collaborators.chain.as_ref());
        asset.validate(&self.context(), true);

        self.update_asset(&asset)?;
        self.events.emit(AssetEvent::AssetValidationCompleted(asset_id));
        self.get_asset(asset_id)
            .ok_or(AssetsError::AssetNotFound(asset_id))
    }

    /// Validate every asset that is due; returns the number of updated assets
    ///
    /// A call made while another sweep is running does nothing. Network
    /// calls run without holding the registry lock.
    pub fn validate_assets(&self, force: bool) -> Result<usize> {
        if self
            .validating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Asset validation already in progress");
            return Ok(0);
        }
        let result = self.validate_all(force);
        self.validating.store(false, Ordering::Release);
        result
    }

    pub fn is_validating(&self) -> bool {
        self.validating.load(Ordering::Acquire)
    }

    fn validate_all(&self, force: bool) -> Result<usize> {
        let ctx = self.context();
        let mut updated = 0;
        for asset_id in self.asset_ids() {
            let Some(mut asset) = self.get_asset(asset_id) else {
                continue;
            };
            if asset.state() == AssetState::Duplicate {
                continue;
            }
            let mut update = asset.validate_asset_ref(ctx.chain);
            update |= asset.validate(&ctx, force);
            if !update {
                continue;
            }

            match self.update_asset(&asset) {
                Ok(()) => updated += 1,
                Err(AssetsError::AssetNotFound(_)) => {
                    log::debug!("Asset {} deleted during validation", asset_id);
                    continue;
                }
                Err(e) => return Err(e),
            }
            log::info!("Asset {} validated: {:?}", asset_id, asset.state());
            self.events
                .emit(AssetEvent::AssetValidationCompleted(asset_id));
        }
        Ok(updated)
    }

    fn save_or_reload(&self, inner: &mut RegistryInner) -> Result<()> {
        if let Err(e) = save(&self.path, inner) {
            log::warn!("Cannot save asset registry {}: {}", self.path.display(), e);
            match load(&self.path, &self.files, self.collaborators.codec.as_ref()) {
                Ok(reloaded) => *inner = reloaded,
                Err(reload) => log::error!("Cannot reload asset registry: {}", reload),
            }
            return Err(e);
        }
        Ok(())
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn load(path: &Path, files: &AssetFiles, codec: &dyn ProtocolCodec) -> Result<RegistryInner> {
    let mut inner = RegistryInner::default();
    if !path.exists() {
        return Ok(inner);
    }
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_SIZE {
        log::warn!("Asset registry {} has no header, starting empty", path.display());
        truncate(path, 0);
        return Ok(inner);
    }
    let version = read_u32(&bytes, 0);
    if version != REGISTRY_VERSION {
        return Err(AssetsError::corrupted(path.display().to_string(), 0));
    }
    inner.max_id = read_u32(&bytes, 4);

    let mut records = BTreeMap::new();
    let mut offset = HEADER_SIZE;
    while offset < bytes.len() {
        if bytes.len() - offset < RECORD_HEADER_SIZE {
            break;
        }
        let id = read_u32(&bytes, offset);
        let len = read_u32(&bytes, offset + 4) as usize;
        let start = offset + RECORD_HEADER_SIZE;
        if len > bytes.len() - start {
            break;
        }
        if len > 0 {
            let json = String::from_utf8_lossy(&bytes[start..start + len]);
            match AssetRecord::from_json(&json) {
                Ok(record) => {
                    records.insert(id, record);
                }
                Err(e) => {
                    log::warn!("Asset registry: bad record for asset {}: {}", id, e);
                    break;
                }
            }
        }
        offset = start + len;
    }
    if offset < bytes.len() {
        log::warn!(
            "Asset registry {}: dropping corrupted tail at offset {}",
            path.display(),
            offset
        );
        truncate(path, offset as u64);
    }

    for (id, record) in records {
        let mut asset = Asset::from_record(id, record, files, codec);
        inner.max_id = inner.max_id.max(id);
        inner.index(&mut asset);
        inner.assets.insert(id, asset);
    }
    Ok(inner)
}

fn truncate(path: &Path, len: u64) {
    let result = OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(len));
    if let Err(e) = result {
        log::warn!("Cannot truncate {}: {}", path.display(), e);
    }
}

/// Write the whole registry to `<path>.new`, then rename over `path`
fn save(path: &Path, inner: &RegistryInner) -> Result<()> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&REGISTRY_VERSION.to_le_bytes());
    buffer.extend_from_slice(&inner.max_id.to_le_bytes());
    for (id, asset) in &inner.assets {
        let json = asset.to_record().to_json()?;
        buffer.extend_from_slice(&id.to_le_bytes());
        buffer.extend_from_slice(&(json.len() as u32).to_le_bytes());
        buffer.extend_from_slice(json.as_bytes());
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".new");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&buffer)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    log::debug!("Asset registry saved: {} assets", inner.assets.len());
    Ok(())
}
