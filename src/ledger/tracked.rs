//! Local balance calculation for transactions created by this wallet
//!
//! Trackers learn about a new transaction only after it propagates. Until
//! then the outputs of our own transactions are computed from the input
//! balances with the protocol rules, and stored as `Calculated`.

use std::collections::BTreeMap;
use std::time::Duration;

use bitcoin::{Transaction, Txid};
use chrono::{DateTime, Utc};

use super::entry::{BalanceEntry, BalanceState, BalanceUpdate};
use crate::events::{AssetEvent, Events};
use crate::protocol::ProtocolCodec;
use crate::registry::{Asset, AssetRegistry, AssetState};

/// Positions of the rows of one asset inside the update list
#[derive(Debug)]
struct Transfers {
    inputs: Vec<usize>,
    outputs: Vec<Option<usize>>,
    valid: bool,
}

#[derive(Debug)]
pub(crate) struct TrackedTransaction {
    tx: Transaction,
    txid: Txid,
    entered: DateTime<Utc>,
    assets: BTreeMap<u32, Transfers>,
    remove: bool,
}

fn trackable(asset: &Asset) -> bool {
    asset.state() == AssetState::Valid && asset.is_asset_ref_valid()
}

fn pending(state: BalanceState) -> bool {
    matches!(state, BalanceState::NeverChecked | BalanceState::Unknown)
}

impl TrackedTransaction {
    pub fn new(tx: Transaction, now: DateTime<Utc>) -> Self {
        let txid = tx.compute_txid();
        Self {
            tx,
            txid,
            entered: now,
            assets: BTreeMap::new(),
            remove: false,
        }
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn should_remove(&self) -> bool {
        self.remove
    }

    /// Find our pending output rows and queue the spent inputs for querying
    pub fn add_input_updates(&mut self, updates: &mut Vec<BalanceUpdate>, registry: &AssetRegistry) {
        self.assets.clear();
        let n_outputs = self.tx.output.len();

        for (index, update) in updates.iter().enumerate() {
            if !pending(update.entry.state) || update.txout.txid != self.txid {
                continue;
            }
            let vout = update.txout.vout as usize;
            if vout >= n_outputs {
                continue;
            }
            if !self.assets.contains_key(&update.asset_id) {
                if !registry.get_asset(update.asset_id).map_or(false, |a| trackable(&a)) {
                    continue;
                }
                self.assets.insert(
                    update.asset_id,
                    Transfers {
                        inputs: Vec::new(),
                        outputs: vec![None; n_outputs],
                        valid: !self.tx.is_coinbase(),
                    },
                );
            }
            if let Some(transfers) = self.assets.get_mut(&update.asset_id) {
                transfers.outputs[vout] = Some(index);
            }
        }

        self.remove = true;
        for (asset_id, transfers) in self.assets.iter_mut() {
            if !transfers.valid {
                continue;
            }
            self.remove = false;
            for input in &self.tx.input {
                transfers.inputs.push(updates.len());
                updates.push(BalanceUpdate::new(
                    input.previous_output,
                    *asset_id,
                    BalanceEntry::default(),
                    None,
                    None,
                ));
            }
        }
    }

    /// Compute output balances from the queried inputs
    pub fn apply_input_balances(
        &mut self,
        updates: &mut [BalanceUpdate],
        registry: &AssetRegistry,
        codec: &dyn ProtocolCodec,
        events: &Events,
        expiry: Duration,
        now: DateTime<Utc>,
    ) {
        let n_inputs = self.tx.input.len();
        let output_sats: Vec<u64> = self.tx.output.iter().map(|o| o.value.to_sat()).collect();
        let outputs_regular = codec.outputs_regular(&self.tx);
        let total_output: i128 = output_sats.iter().map(|&sats| i128::from(sats)).sum();
        let metadata = codec.metadata(&self.tx);

        for (asset_id, transfers) in self.assets.iter_mut() {
            let asset = registry.get_asset(*asset_id).filter(trackable);
            let Some((asset_ref, genesis)) = asset
                .as_ref()
                .and_then(|a| Some((a.asset_ref()?, a.genesis()?.clone())))
            else {
                transfers.valid = false;
                continue;
            };
            if !transfers.valid {
                continue;
            }

            let mut input_qty = Vec::with_capacity(n_inputs);
            let mut total_input: u64 = 0;
            for &index in &transfers.inputs {
                let input = &updates[index];
                match (input.entry.state.is_final(), input.entry.quantity, input.native_qty) {
                    (true, Some(qty), Some(sats)) => match total_input.checked_add(sats) {
                        Some(total) => {
                            input_qty.push(qty);
                            total_input = total;
                        }
                        None => {
                            log::warn!("Tracked {}: input value overflow", self.txid);
                            transfers.valid = false;
                            break;
                        }
                    },
                    _ => {
                        transfers.valid = false;
                        break;
                    }
                }
            }
            if !transfers.valid {
                log::debug!("Tracked {}: inputs of asset {} not known yet", self.txid, asset_id);
                continue;
            }

            let fee = i128::from(total_input) - total_output;
            let mut output_qty = vec![0u64; output_sats.len()];
            if let Some(metadata) = &metadata {
                if let Some(genesis_record) = codec.decode_genesis(metadata) {
                    let min_fee = genesis_record.calc_min_fee(&output_sats, &outputs_regular);
                    if fee >= i128::from(min_fee) {
                        output_qty = genesis_record.apply(&outputs_regular);
                    }
                }
                if let Some(list) = codec.decode_transfers(metadata, n_inputs, output_sats.len()) {
                    let min_fee = list.calc_min_fee(n_inputs, &output_sats, &outputs_regular);
                    output_qty = if fee >= i128::from(min_fee) {
                        list.apply(&asset_ref, genesis.as_ref(), &input_qty, &outputs_regular)
                    } else {
                        list.apply_none(&asset_ref, genesis.as_ref(), &input_qty, &outputs_regular)
                    };
                }
            }

            for (vout, slot) in transfers.outputs.iter().enumerate() {
                let Some(index) = *slot else { continue };
                let update = &mut updates[index];
                if !pending(update.entry.state) {
                    continue;
                }
                let qty = output_qty.get(vout).copied().unwrap_or(0);
                update.snapshot();
                update
                    .entry
                    .set_quantity(BalanceState::Calculated, Some(qty), now);
                if qty > 0 {
                    events.emit(AssetEvent::BalanceValid {
                        txout: update.txout,
                        asset_id: update.asset_id,
                        quantity: qty,
                    });
                }
                log::info!(
                    "Balance ledger: calculated {}-{} asset {}: {}",
                    update.txout.txid,
                    update.txout.vout,
                    update.asset_id,
                    qty
                );
            }
        }

        let fresh = (now - self.entered).num_seconds() < expiry.as_secs() as i64;
        let unresolved = updates
            .iter()
            .any(|u| u.txout.txid == self.txid && pending(u.entry.state));
        self.remove = !(fresh && unresolved);
    }
}
