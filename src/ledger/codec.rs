//! Bit-exact layout of the `.csbalances` file
//!
//! All packed codes are produced and consumed here; the rest of the ledger
//! works with [`GroupCode`], [`BalanceState`] and [`BalanceEntry`].

use bitcoin::OutPoint;
use chrono::{DateTime, TimeZone, Utc};

use super::entry::{BalanceEntry, BalanceState};
use crate::chain::{txid_display_bytes, txid_from_display_bytes};
use crate::error::AssetsError;
use crate::Result;

/// Output group header: hash, index, coded size
pub const HEADER_SIZE: usize = 40;
/// Asset id followed by a balance row
pub const ROW_SIZE: usize = 20;
pub const BALANCE_SIZE: usize = 16;

const SIZE_MASK: u32 = 0x00FF_FFFF;

/// Kind of record introduced by a group header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCode {
    TxOut,
    Deleted,
    /// Sentinel: add a row for this asset to every group at defragmentation
    NewAsset,
    /// Sentinel: drop this asset's rows at defragmentation
    DeletedAsset,
}

impl GroupCode {
    fn code(self) -> u8 {
        match self {
            Self::TxOut => 0,
            Self::Deleted => 1,
            Self::NewAsset => 2,
            Self::DeletedAsset => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::TxOut),
            1 => Some(Self::Deleted),
            2 => Some(Self::NewAsset),
            3 => Some(Self::DeletedAsset),
            _ => None,
        }
    }
}

fn pack(low: u32, code: u8) -> u32 {
    (low & SIZE_MASK) | (u32::from(code) << 24)
}

fn unpack(coded: u32) -> (u32, u8) {
    (coded & SIZE_MASK, (coded >> 24) as u8)
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// Decoded output group header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHeader {
    pub hash: [u8; 32],
    pub index: u32,
    pub rows: u32,
    pub code: GroupCode,
}

impl GroupHeader {
    pub fn txout(txout: &OutPoint, rows: u32, code: GroupCode) -> Self {
        Self {
            hash: txid_display_bytes(&txout.txid),
            index: txout.vout,
            rows,
            code,
        }
    }

    /// Sentinel header carrying an asset id in place of the output index
    pub fn sentinel(asset_id: u32, code: GroupCode) -> Self {
        Self {
            hash: [0u8; 32],
            index: asset_id,
            rows: 0,
            code,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.hash == [0u8; 32]
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(txid_from_display_bytes(self.hash), self.index)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..32].copy_from_slice(&self.hash);
        out[32..36].copy_from_slice(&self.index.to_le_bytes());
        out[36..40].copy_from_slice(&pack(self.rows, self.code.code()).to_le_bytes());
        out
    }

    /// `None` for an unknown group code
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Option<Self> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let (rows, code) = unpack(u32_at(bytes, 36));
        Some(Self {
            hash,
            index: u32_at(bytes, 32),
            rows,
            code: GroupCode::from_code(code)?,
        })
    }
}

fn state_code(entry: &BalanceEntry) -> u8 {
    match entry.state {
        BalanceState::Zero => 0,
        BalanceState::Valid => 1,
        BalanceState::Unknown => 2,
        BalanceState::Spent => 3,
        BalanceState::NeverChecked => 4,
        BalanceState::Refresh if entry.quantity.is_none() => 5,
        BalanceState::Refresh => 6,
        BalanceState::Deleted => 7,
        BalanceState::Own => 8,
        BalanceState::Calculated => 9,
    }
}

/// Serialize the 16-byte balance row
///
/// Confirmed quantities beyond the signed 64-bit range are rejected.
pub fn encode_balance(entry: &BalanceEntry) -> Result<[u8; BALANCE_SIZE]> {
    let quantity = match entry.state {
        BalanceState::Zero | BalanceState::Deleted => 0,
        _ => entry.quantity.unwrap_or(0),
    };
    if matches!(entry.state, BalanceState::Valid | BalanceState::Zero) {
        let checked = entry.quantity.unwrap_or(0);
        if checked > i64::MAX as u64 {
            return Err(AssetsError::QuantityOutOfRange(checked));
        }
    }
    let timestamp = entry
        .checked
        .map_or(0, |checked| checked.timestamp().clamp(0, u32::MAX as i64) as u32);

    let mut out = [0u8; BALANCE_SIZE];
    out[..8].copy_from_slice(&quantity.to_le_bytes());
    out[8..12].copy_from_slice(&timestamp.to_le_bytes());
    out[12..16].copy_from_slice(&pack(entry.failures, state_code(entry)).to_le_bytes());
    Ok(out)
}

/// Parse a 16-byte balance row; `None` for an unknown state code
pub fn decode_balance(bytes: &[u8]) -> Option<BalanceEntry> {
    let mut qty = [0u8; 8];
    qty.copy_from_slice(&bytes[..8]);
    let quantity = u64::from_le_bytes(qty);
    let timestamp = u32_at(bytes, 8);
    let (failures, code) = unpack(u32_at(bytes, 12));

    let (state, quantity) = match code {
        0 => (BalanceState::Zero, Some(0)),
        1 => (BalanceState::Valid, Some(quantity)),
        2 => (BalanceState::Unknown, Some(quantity)),
        3 => (BalanceState::Spent, Some(quantity)),
        4 => (BalanceState::NeverChecked, Some(quantity)),
        5 => (BalanceState::Refresh, None),
        6 => (BalanceState::Refresh, Some(quantity)),
        7 => (BalanceState::Deleted, None),
        8 => (BalanceState::Own, Some(quantity)),
        9 => (BalanceState::Calculated, Some(quantity)),
        _ => return None,
    };
    let checked = match state {
        BalanceState::NeverChecked | BalanceState::Refresh | BalanceState::Deleted => None,
        _ if timestamp == 0 => None,
        _ => Utc.timestamp_opt(i64::from(timestamp), 0).single(),
    };
    Some(BalanceEntry {
        quantity,
        checked,
        failures,
        state,
    })
}

/// Serialize an asset row: id followed by the balance
pub fn encode_row(asset_id: u32, entry: &BalanceEntry) -> Result<[u8; ROW_SIZE]> {
    let mut out = [0u8; ROW_SIZE];
    out[..4].copy_from_slice(&asset_id.to_le_bytes());
    out[4..].copy_from_slice(&encode_balance(entry)?);
    Ok(out)
}

pub fn decode_row(bytes: &[u8]) -> Option<(u32, BalanceEntry)> {
    Some((u32_at(bytes, 0), decode_balance(&bytes[4..ROW_SIZE])?))
}

/// Whole-second timestamp, as stored on disk
pub fn stored_time(time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0).single()
}
