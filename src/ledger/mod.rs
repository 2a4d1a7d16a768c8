//! Balance Ledger
//!
//! Persisted map of (transaction output, asset) to quantity:
//! - rows are appended per output group and rewritten in place
//! - asset additions and removals are recorded as sentinels and folded in by defragmentation
//! - reconciliation queries trackers and computes our own pending transactions locally
//!
//! Network calls run without holding the ledger lock; only building the
//! work list and applying the results are locked.

mod codec;
mod entry;
mod store;
mod tracked;
pub mod tracker;

pub use codec::{
    decode_balance, decode_row, encode_balance, encode_row, GroupCode, GroupHeader, BALANCE_SIZE,
    HEADER_SIZE, ROW_SIZE,
};
pub use entry::{Balance, BalanceEntry, BalanceState};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::{OutPoint, Transaction, Txid};
use chrono::{DateTime, Utc};

use crate::config::AssetsConfig;
use crate::events::{AssetEvent, EventSink, Events};
use crate::registry::{AssetRegistry, AssetState};
use crate::Result;
use entry::BalanceUpdate;
use store::{LedgerFile, LedgerState};
use tracked::TrackedTransaction;
use tracker::{TrackerAnswer, TrackerRow, NATIVE_KEY};

pub struct BalanceLedger {
    config: AssetsConfig,
    file: LedgerFile,
    registry: Arc<AssetRegistry>,
    events: Events,
    state: Mutex<LedgerState>,
    tracked: Mutex<Vec<TrackedTransaction>>,
    calculating: AtomicBool,
}

impl BalanceLedger {
    /// Open (or create) the ledger at the configured prefix
    pub fn open(
        config: AssetsConfig,
        registry: Arc<AssetRegistry>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self> {
        let file = LedgerFile::new(config.ledger_path());
        let state = file.load()?;
        Ok(Self {
            config,
            file,
            registry,
            events: Events::new(sink),
            state: Mutex::new(state),
            tracked: Mutex::new(Vec::new()),
            calculating: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Start tracking a new output
    ///
    /// Without `asset_ids` a row is created for every asset in the registry.
    /// `known` seeds rows: the native row (asset 0) becomes `Valid`, asset
    /// rows become `Own`, and a negative value marks an unconfirmed quantity
    /// stored as `NeverChecked`.
    pub fn insert_txout(
        &self,
        txout: OutPoint,
        asset_ids: Option<&[u32]>,
        known: &BTreeMap<u32, i64>,
    ) -> Result<()> {
        let ids = match asset_ids {
            Some(ids) => ids.to_vec(),
            None => self.registry.asset_ids(),
        };
        let now = Utc::now();

        let mut state = self.state.lock().unwrap();
        if state.groups.contains_key(&txout) {
            log::info!("Balance ledger: {} already tracked", txout);
            return Ok(());
        }

        let mut entries = BTreeMap::new();
        let native = match known.get(&0) {
            Some(&sats) => BalanceEntry::new(BalanceState::Valid, Some(sats.unsigned_abs()), now),
            None => BalanceEntry::default(),
        };
        entries.insert(0, native);
        for &asset_id in ids.iter().filter(|&&id| id > 0) {
            entries.entry(asset_id).or_insert_with(|| match known.get(&asset_id) {
                Some(&qty) if qty < 0 => {
                    BalanceEntry::new(BalanceState::NeverChecked, Some(qty.unsigned_abs()), now)
                }
                Some(&qty) => BalanceEntry::new(BalanceState::Own, Some(qty as u64), now),
                None => BalanceEntry::default(),
            });
        }

        let offset = state.file_size;
        let group = self.file.write_group(offset, &txout, &entries).map_err(|e| {
            log::warn!("Balance ledger: cannot insert {}: {}", txout, e);
            e
        })?;
        state.file_size = offset + group.stored_size();
        state.groups.insert(txout, group);
        log::info!("Balance ledger: {} inserted with {} rows", txout, entries.len());
        Ok(())
    }

    /// Stop tracking an output; its rows are reclaimed by defragmentation
    pub fn delete_txout(&self, txout: &OutPoint) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(group) = state.groups.get(txout) else {
            log::info!("Balance ledger: {} not tracked", txout);
            return Ok(());
        };
        let header = GroupHeader::txout(txout, group.rows.len() as u32, GroupCode::Deleted);
        let (offset, size) = (group.offset, group.stored_size());
        self.file.write_header(offset, &header)?;

        state.dead_size += size;
        state.groups.remove(txout);
        log::info!("Balance ledger: {} deleted", txout);
        Ok(())
    }

    /// Schedule rows for `asset_id` in every output
    pub fn insert_asset(&self, asset_id: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.insert_asset_locked(&mut state, asset_id)
    }

    fn insert_asset_locked(&self, state: &mut LedgerState, asset_id: u32) -> Result<()> {
        if state.new_assets.contains(&asset_id) {
            return Ok(());
        }
        self.file.write_header(
            state.file_size,
            &GroupHeader::sentinel(asset_id, GroupCode::NewAsset),
        )?;
        state.file_size += HEADER_SIZE as u64;
        state.deleted_assets.retain(|&id| id != asset_id);
        state.new_assets.push(asset_id);
        log::info!("Balance ledger: asset {} inserted", asset_id);
        Ok(())
    }

    /// Schedule removal of every row of `asset_id`
    pub fn delete_asset(&self, asset_id: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.deleted_assets.contains(&asset_id) {
            return Ok(());
        }
        self.file.write_header(
            state.file_size,
            &GroupHeader::sentinel(asset_id, GroupCode::DeletedAsset),
        )?;
        state.file_size += HEADER_SIZE as u64;
        state.new_assets.retain(|&id| id != asset_id);
        state.deleted_assets.push(asset_id);
        log::info!("Balance ledger: asset {} deleted", asset_id);
        Ok(())
    }

    pub fn txouts(&self) -> Vec<OutPoint> {
        self.state.lock().unwrap().groups.keys().copied().collect()
    }

    /// Balances of every live asset at `txout`
    pub fn txout_balances(&self, txout: &OutPoint) -> Vec<Balance> {
        let state = self.state.lock().unwrap();
        let Some(group) = state.groups.get(txout) else {
            return Vec::new();
        };
        let mut balances: Vec<Balance> = group
            .rows
            .iter()
            .filter(|(asset_id, _)| !state.deleted_assets.contains(asset_id))
            .map(|(&asset_id, row)| Balance::new(*txout, asset_id, &row.entry))
            .collect();
        for &asset_id in &state.new_assets {
            if !group.rows.contains_key(&asset_id) {
                balances.push(Balance::new(*txout, asset_id, &BalanceEntry::default()));
            }
        }
        balances
    }

    pub fn balance(&self, txout: &OutPoint, asset_id: u32) -> Option<Balance> {
        let state = self.state.lock().unwrap();
        let row = state.groups.get(txout)?.rows.get(&asset_id)?;
        Some(Balance::new(*txout, asset_id, &row.entry))
    }

    /// Balances of `asset_id` across all outputs
    pub fn asset_balances(&self, asset_id: u32) -> Vec<Balance> {
        let state = self.state.lock().unwrap();
        let is_new = state.new_assets.contains(&asset_id);
        if state.deleted_assets.contains(&asset_id) && !is_new {
            return Vec::new();
        }
        state
            .groups
            .iter()
            .filter_map(|(txout, group)| match group.rows.get(&asset_id) {
                Some(row) => Some(Balance::new(*txout, asset_id, &row.entry)),
                None if is_new => Some(Balance::new(*txout, asset_id, &BalanceEntry::default())),
                None => None,
            })
            .collect()
    }

    /// Remember a transaction created by this wallet for local calculation
    pub fn add_tracked_transaction(&self, tx: Transaction) {
        let mut tracked = self.tracked.lock().unwrap();
        let txid = tx.compute_txid();
        if tracked.iter().all(|t| t.txid() != txid) {
            log::info!("Balance ledger: tracking transaction {}", txid);
            tracked.push(TrackedTransaction::new(tx, Utc::now()));
        }
    }

    pub fn tracked_transactions(&self) -> Vec<Txid> {
        self.tracked.lock().unwrap().iter().map(|t| t.txid()).collect()
    }

    fn refresh_rows<F>(&self, state: &mut LedgerState, select: F) -> Result<()>
    where
        F: Fn(&OutPoint, u32) -> bool,
    {
        let now = Utc::now();
        let mut updates = Vec::new();
        for (txout, group) in &state.groups {
            let native = group.native_qty();
            for (&asset_id, row) in &group.rows {
                if asset_id == 0
                    || state.deleted_assets.contains(&asset_id)
                    || !select(txout, asset_id)
                {
                    continue;
                }
                let mut entry = row.entry.clone();
                entry.set_quantity(BalanceState::Refresh, None, now);
                updates.push(BalanceUpdate::new(*txout, asset_id, entry, Some(row.offset), native));
            }
        }
        apply_updates(&self.file, state, &updates)
    }

    /// Re-query every asset row of one output
    pub fn refresh_txout(&self, txout: &OutPoint) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.groups.contains_key(txout) {
            log::info!("Balance ledger: {} not tracked", txout);
            return Ok(());
        }
        log::info!("Balance ledger: refreshing {}", txout);
        self.refresh_rows(&mut state, |out, _| out == txout)
    }

    /// Re-query one asset everywhere and add its missing rows
    pub fn refresh_asset(&self, asset_id: u32) -> Result<()> {
        if asset_id == 0 {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if state.deleted_assets.contains(&asset_id) && !state.new_assets.contains(&asset_id) {
            return Ok(());
        }
        log::info!("Balance ledger: refreshing asset {}", asset_id);
        self.refresh_rows(&mut state, |_, id| id == asset_id)?;
        self.insert_asset_locked(&mut state, asset_id)?;
        self.defragment_locked(&mut state)
    }

    pub fn refresh_all(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        log::info!("Balance ledger: refreshing all");
        self.refresh_rows(&mut state, |_, _| true)
    }

    /// Rewrite the file compactly and reload it
    pub fn defragment(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.defragment_locked(&mut state)
    }

    fn defragment_locked(&self, state: &mut LedgerState) -> Result<()> {
        self.file.rewrite(state)?;
        *state = self.file.load()?;
        Ok(())
    }

    pub fn is_calculating(&self) -> bool {
        self.calculating.load(Ordering::Acquire)
    }

    /// Run one reconciliation cycle
    ///
    /// Returns `false` without doing anything when a cycle is already
    /// running. `depths` maps txids to their depth in the chain.
    pub fn calculate_balances(
        &self,
        defragment: bool,
        depths: Option<&HashMap<Txid, u32>>,
    ) -> Result<bool> {
        if self
            .calculating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Balance calculation already in progress");
            return Ok(false);
        }
        let _guard = CalculatingGuard(&self.calculating);
        self.run_calculation(defragment, depths).map(|_| true)
    }

    fn run_calculation(&self, defragment: bool, depths: Option<&HashMap<Txid, u32>>) -> Result<()> {
        self.check_duplicates()?;

        let now = Utc::now();
        let mut updates = {
            let mut state = self.state.lock().unwrap();
            if defragment || state.needs_defragment() {
                self.defragment_locked(&mut state)?;
            }
            let mut updates = update_list(&state, now);
            for tracked in self.tracked.lock().unwrap().iter_mut() {
                tracked.add_input_updates(&mut updates, &self.registry);
            }
            updates
        };

        self.reconcile_remote(&mut updates, depths, now);

        {
            let codec = self.registry.collaborators().codec.clone();
            let mut tracked = self.tracked.lock().unwrap();
            for t in tracked.iter_mut() {
                t.apply_input_balances(
                    &mut updates,
                    &self.registry,
                    codec.as_ref(),
                    &self.events,
                    self.config.tracked_tx_expiry,
                    now,
                );
            }
            tracked.retain(|t| !t.should_remove());
        }

        let mut state = self.state.lock().unwrap();
        apply_updates(&self.file, &mut state, &updates)?;
        log::info!("Balance ledger: synchronization completed");
        Ok(())
    }

    /// Fold duplicate assets into the asset they duplicate
    fn check_duplicates(&self) -> Result<()> {
        for asset_id in self.registry.asset_ids() {
            let Some(asset) = self.registry.get_asset(asset_id) else {
                continue;
            };
            if asset.state() != AssetState::Duplicate {
                continue;
            }
            match self.registry.find_asset(&asset, asset_id) {
                Some(original) => {
                    log::info!(
                        "Balance ledger: asset {} duplicates asset {}",
                        asset_id,
                        original
                    );
                    self.insert_asset(original)?;
                    self.delete_asset(asset_id)?;
                    self.registry.delete_asset(asset_id)?;
                }
                None => log::error!("Balance ledger: no original for duplicate asset {}", asset_id),
            }
        }
        Ok(())
    }

    fn reconcile_remote(
        &self,
        updates: &mut [BalanceUpdate],
        depths: Option<&HashMap<Txid, u32>>,
        now: DateTime<Utc>,
    ) {
        let http = self.registry.collaborators().http.clone();

        let mut servers: Vec<String> = Vec::new();
        let mut assets: BTreeMap<u32, (String, usize)> = BTreeMap::new();
        for update in updates.iter() {
            if update.asset_id == 0 || assets.contains_key(&update.asset_id) {
                continue;
            }
            let Some(asset) = self.registry.get_asset(update.asset_id) else {
                continue;
            };
            let (Some(gen_txid), Some(url)) = (asset.gen_txid(), asset.specs().random_tracker_url())
            else {
                continue;
            };
            let server = match servers.iter().position(|s| s == url) {
                Some(server) => server,
                None => {
                    servers.push(url.to_string());
                    servers.len() - 1
                }
            };
            assets.insert(update.asset_id, (gen_txid.to_string(), server));
        }

        for (server, url) in servers.iter().enumerate() {
            let keys: Vec<String> = assets
                .values()
                .filter(|(_, s)| *s == server)
                .map(|(key, _)| key.clone())
                .collect();

            let mut txouts: Vec<OutPoint> = Vec::new();
            for update in updates.iter_mut() {
                if assets.get(&update.asset_id).map_or(false, |(_, s)| *s == server) {
                    update.snapshot();
                    update.server = Some(server);
                    if !txouts.contains(&update.txout) {
                        txouts.push(update.txout);
                    }
                }
            }
            if txouts.is_empty() {
                continue;
            }

            match tracker::query(http.as_ref(), url, self.config.tracker_timeout, &keys, &txouts) {
                Ok(answer) => {
                    for update in updates.iter_mut() {
                        if update.server == Some(server) {
                            let key = &assets[&update.asset_id].0;
                            self.apply_answer(update, &answer, key, depths, now);
                        } else if update.asset_id == 0
                            && update.server.is_none()
                            && txouts.contains(&update.txout)
                        {
                            apply_native_answer(update, &answer, now);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Tracker {}: {}", url, e);
                    for update in updates.iter_mut().filter(|u| u.server == Some(server)) {
                        update.old = None;
                        update.server = None;
                    }
                }
            }
        }
    }

    fn apply_answer(
        &self,
        update: &mut BalanceUpdate,
        answer: &TrackerAnswer,
        key: &str,
        depths: Option<&HashMap<Txid, u32>>,
        now: DateTime<Utc>,
    ) {
        if update.native_qty.is_none() {
            match answer.row(NATIVE_KEY, &update.txout) {
                Some(TrackerRow::Quantity { qty, .. }) if qty <= i64::MAX as u64 => {
                    update.native_qty = Some(qty);
                }
                Some(TrackerRow::Quantity { qty, .. }) => {
                    log::warn!("Tracker: native quantity {} out of range for {}", qty, update.txout);
                }
                _ => {}
            }
        }

        let entry = &mut update.entry;
        match answer.row(key, &update.txout) {
            Some(TrackerRow::Quantity { qty, .. }) if qty > i64::MAX as u64 => {
                log::warn!("Tracker: quantity {} out of range for {}", qty, update.txout);
                let state = match entry.state {
                    BalanceState::Own | BalanceState::Calculated => entry.state,
                    _ => BalanceState::Unknown,
                };
                entry.set_quantity(state, entry.quantity, now);
            }
            Some(TrackerRow::Quantity { qty, spent: true }) => {
                entry.set_quantity(BalanceState::Spent, Some(qty), now);
            }
            Some(TrackerRow::Quantity { qty, .. }) if qty > 0 => {
                entry.set_quantity(BalanceState::Valid, Some(qty), now);
                self.events.emit(AssetEvent::BalanceValid {
                    txout: update.txout,
                    asset_id: update.asset_id,
                    quantity: qty,
                });
            }
            Some(TrackerRow::Quantity { qty, .. }) => {
                entry.set_quantity(BalanceState::Zero, Some(qty), now);
            }
            Some(TrackerRow::Error) | None => {
                let state = match entry.state {
                    BalanceState::Own | BalanceState::Calculated => entry.state,
                    _ => BalanceState::Unknown,
                };
                entry.set_quantity(state, entry.quantity, now);

                let depth = depths.and_then(|d| d.get(&update.txout.txid)).copied();
                if depth.map_or(false, |d| d > self.config.max_unknown_depth) {
                    log::info!(
                        "Balance ledger: {} asset {} is {} blocks deep, assuming zero",
                        update.txout,
                        update.asset_id,
                        depth.unwrap_or_default()
                    );
                    entry.set_quantity(BalanceState::Zero, Some(0), now);
                }
            }
        }
        log::debug!(
            "Balance ledger: update {} asset {}: {:?} {:?} failures {}",
            update.txout,
            update.asset_id,
            update.entry.state,
            update.entry.quantity,
            update.entry.failures
        );
    }
}

/// Write modified rows in place, restoring earlier rows if a write fails
///
/// The rollback only covers rows written by this batch and is not
/// crash safe: a crash in the middle leaves the batch partially applied.
fn apply_updates(
    ledger: &LedgerFile,
    state: &mut LedgerState,
    updates: &[BalanceUpdate],
) -> Result<()> {
    let pending: Vec<&BalanceUpdate> = updates.iter().filter(|u| u.needs_write()).collect();
    if pending.is_empty() {
        return Ok(());
    }
    let mut file = ledger.open_for_update()?;

    let mut written: Vec<(OutPoint, u32, u64, BalanceEntry)> = Vec::new();
    let mut failure = None;
    for update in pending {
        let Some(offset) = update.row_offset else {
            continue;
        };
        let Some(row) = state
            .groups
            .get_mut(&update.txout)
            .and_then(|g| g.rows.get_mut(&update.asset_id))
            .filter(|row| row.offset == offset)
        else {
            log::debug!(
                "Balance ledger: {} asset {} moved, skipping update",
                update.txout,
                update.asset_id
            );
            continue;
        };
        if let Err(e) = LedgerFile::write_balance(&mut file, offset, &update.entry) {
            failure = Some(e);
            break;
        }
        let previous = std::mem::replace(&mut row.entry, update.entry.clone());
        written.push((update.txout, update.asset_id, offset, previous));
    }

    let Some(error) = failure else {
        log::debug!("Balance ledger: {} rows written", written.len());
        return Ok(());
    };

    log::error!(
        "Balance ledger: write failed ({}), rolling back {} rows",
        error,
        written.len()
    );
    for (txout, asset_id, offset, previous) in written.into_iter().rev() {
        if let Err(e) = LedgerFile::write_balance(&mut file, offset, &previous) {
            log::error!("Balance ledger: rollback of {} asset {} failed: {}", txout, asset_id, e);
        }
        if let Some(row) = state
            .groups
            .get_mut(&txout)
            .and_then(|g| g.rows.get_mut(&asset_id))
        {
            row.entry = previous;
        }
    }
    Err(error)
}

/// Clears the in-progress flag when a calculation ends, including by unwinding
struct CalculatingGuard<'a>(&'a AtomicBool);

impl Drop for CalculatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Rows due for a tracker query
fn update_list(state: &LedgerState, now: DateTime<Utc>) -> Vec<BalanceUpdate> {
    let mut updates = Vec::new();
    for (txout, group) in &state.groups {
        let native = group.native_qty();
        for (&asset_id, row) in &group.rows {
            if row.entry.is_due(now) {
                updates.push(BalanceUpdate::new(
                    *txout,
                    asset_id,
                    row.entry.clone(),
                    Some(row.offset),
                    native,
                ));
            }
        }
    }
    updates
}

fn apply_native_answer(update: &mut BalanceUpdate, answer: &TrackerAnswer, now: DateTime<Utc>) {
    if let Some(TrackerRow::Quantity { qty, .. }) = answer.row(NATIVE_KEY, &update.txout) {
        if qty <= i64::MAX as u64 {
            update.snapshot();
            update.native_qty = Some(qty);
            update.entry.set_quantity(BalanceState::Valid, Some(qty), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetsError;
    use bitcoin::hashes::Hash;
    use tempfile::TempDir;

    fn txout(n: u8) -> OutPoint {
        OutPoint::new(Txid::from_byte_array([n; 32]), 0)
    }

    fn update(state: &LedgerState, txout: OutPoint, asset_id: u32, qty: u64) -> BalanceUpdate {
        let row = &state.groups[&txout].rows[&asset_id];
        let mut update = BalanceUpdate::new(txout, asset_id, row.entry.clone(), Some(row.offset), None);
        update.snapshot();
        update
            .entry
            .set_quantity(BalanceState::Valid, Some(qty), Utc::now());
        update
    }

    #[test]
    fn test_failed_write_rolls_back_batch() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::new(dir.path().join("w.csbalances"));
        let now = Utc::now();
        let mut rows = BTreeMap::new();
        rows.insert(0, BalanceEntry::default());
        rows.insert(3, BalanceEntry::new(BalanceState::Own, Some(12), now));
        let first = file.write_group(0, &txout(1), &rows).unwrap();
        file.write_group(first.stored_size(), &txout(2), &rows).unwrap();

        let mut state = file.load().unwrap();
        let before = state.groups[&txout(1)].rows[&3].entry.clone();

        // the second row cannot be encoded, so the first must be restored
        let updates = vec![
            update(&state, txout(1), 3, 40),
            update(&state, txout(2), 3, u64::MAX),
        ];
        let result = apply_updates(&file, &mut state, &updates);
        assert!(matches!(result, Err(AssetsError::QuantityOutOfRange(_))));

        assert_eq!(state.groups[&txout(1)].rows[&3].entry, before);
        let reloaded = file.load().unwrap();
        for n in [1, 2] {
            let entry = &reloaded.groups[&txout(n)].rows[&3].entry;
            assert_eq!(entry.state, BalanceState::Own);
            assert_eq!(entry.quantity, Some(12));
        }
    }

    #[test]
    fn test_batch_is_written_in_place() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::new(dir.path().join("w.csbalances"));
        let mut rows = BTreeMap::new();
        rows.insert(0, BalanceEntry::default());
        rows.insert(3, BalanceEntry::default());
        file.write_group(0, &txout(1), &rows).unwrap();

        let mut state = file.load().unwrap();
        let updates = vec![update(&state, txout(1), 3, 40)];
        apply_updates(&file, &mut state, &updates).unwrap();

        let reloaded = file.load().unwrap();
        let entry = &reloaded.groups[&txout(1)].rows[&3].entry;
        assert_eq!(entry.state, BalanceState::Valid);
        assert_eq!(entry.quantity, Some(40));
        assert_eq!(state.groups[&txout(1)].rows[&3].entry, *entry);
    }

    #[test]
    fn test_calculating_flag_cleared_on_unwind() {
        let flag = AtomicBool::new(true);
        let result = std::panic::catch_unwind(|| {
            let _guard = CalculatingGuard(&flag);
            panic!("calculation failed");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }
}
