//! File access for the `.csbalances` ledger
//!
//! The file is a sequence of output groups, each a 40-byte header followed
//! by 20-byte rows. Groups are appended, deleted groups are overwritten in
//! place with a tombstone header, and single balances are rewritten at the
//! row offset remembered on load.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bitcoin::OutPoint;

use super::codec::{
    decode_row, encode_balance, encode_row, GroupCode, GroupHeader, HEADER_SIZE, ROW_SIZE,
};
use super::entry::{BalanceEntry, BalanceState};
use crate::Result;

/// A stored balance and the file offset of its row
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub offset: u64,
    pub entry: BalanceEntry,
}

/// All rows of one transaction output
#[derive(Debug, Clone)]
pub(crate) struct TxOutGroup {
    pub offset: u64,
    pub rows: BTreeMap<u32, Row>,
}

impl TxOutGroup {
    /// Confirmed native currency value of the output
    pub fn native_qty(&self) -> Option<u64> {
        self.rows
            .get(&0)
            .filter(|row| row.entry.state == BalanceState::Valid)
            .and_then(|row| row.entry.quantity)
    }

    pub fn stored_size(&self) -> u64 {
        (HEADER_SIZE + self.rows.len() * ROW_SIZE) as u64
    }
}

/// In-memory image of the ledger file
#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    pub groups: BTreeMap<OutPoint, TxOutGroup>,
    /// Assets to add to every group at the next defragmentation
    pub new_assets: Vec<u32>,
    /// Assets whose rows are dropped at the next defragmentation
    pub deleted_assets: Vec<u32>,
    pub file_size: u64,
    /// Bytes taken by tombstoned groups
    pub dead_size: u64,
}

impl LedgerState {
    pub fn needs_defragment(&self) -> bool {
        !self.new_assets.is_empty()
            || !self.deleted_assets.is_empty()
            || self.dead_size * 2 > self.file_size
    }
}

fn encode_group(
    txout: &OutPoint,
    entries: &BTreeMap<u32, BalanceEntry>,
) -> Result<Vec<u8>> {
    let header = GroupHeader::txout(txout, entries.len() as u32, GroupCode::TxOut);
    let mut bytes = Vec::with_capacity(HEADER_SIZE + entries.len() * ROW_SIZE);
    bytes.extend_from_slice(&header.encode());
    for (asset_id, entry) in entries {
        bytes.extend_from_slice(&encode_row(*asset_id, entry)?);
    }
    Ok(bytes)
}

pub(crate) struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file; a corrupted tail is cut off
    pub fn load(&self) -> Result<LedgerState> {
        let mut state = LedgerState::default();
        if !self.path.exists() {
            return Ok(state);
        }
        let bytes = fs::read(&self.path)?;
        let len = bytes.len();

        let mut offset = 0usize;
        'groups: while offset + HEADER_SIZE <= len {
            let mut raw = [0u8; HEADER_SIZE];
            raw.copy_from_slice(&bytes[offset..offset + HEADER_SIZE]);
            let Some(header) = GroupHeader::decode(&raw) else {
                break;
            };
            let size = header.rows as usize * ROW_SIZE;
            let rows_start = offset + HEADER_SIZE;
            if rows_start + size > len {
                break;
            }

            if header.is_sentinel() {
                let asset_id = header.index;
                match header.code {
                    GroupCode::NewAsset => {
                        state.deleted_assets.retain(|&id| id != asset_id);
                        state.new_assets.push(asset_id);
                    }
                    GroupCode::DeletedAsset => {
                        state.new_assets.retain(|&id| id != asset_id);
                        state.deleted_assets.push(asset_id);
                    }
                    _ => {}
                }
            } else if header.code == GroupCode::TxOut {
                let mut rows = BTreeMap::new();
                for i in 0..header.rows as usize {
                    let row_offset = rows_start + i * ROW_SIZE;
                    let Some((asset_id, entry)) = decode_row(&bytes[row_offset..row_offset + ROW_SIZE])
                    else {
                        break 'groups;
                    };
                    rows.insert(
                        asset_id,
                        Row {
                            offset: row_offset as u64,
                            entry,
                        },
                    );
                }
                state.groups.insert(
                    header.outpoint(),
                    TxOutGroup {
                        offset: offset as u64,
                        rows,
                    },
                );
            } else {
                state.dead_size += (HEADER_SIZE + size) as u64;
            }
            offset = rows_start + size;
        }

        if offset < len {
            log::warn!(
                "Balance ledger {}: corrupted at offset {}, truncating",
                self.path.display(),
                offset
            );
            OpenOptions::new()
                .write(true)
                .open(&self.path)
                .and_then(|file| file.set_len(offset as u64))?;
        }
        state.file_size = offset as u64;
        log::info!(
            "Balance ledger opened: {} ({} outputs)",
            self.path.display(),
            state.groups.len()
        );
        Ok(state)
    }

    fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Write a new output group at `offset`
    pub fn write_group(
        &self,
        offset: u64,
        txout: &OutPoint,
        entries: &BTreeMap<u32, BalanceEntry>,
    ) -> Result<TxOutGroup> {
        let bytes = encode_group(txout, entries)?;
        self.write_at(offset, &bytes)?;

        let rows_start = offset + HEADER_SIZE as u64;
        let rows = entries
            .iter()
            .enumerate()
            .map(|(i, (asset_id, entry))| {
                let row = Row {
                    offset: rows_start + (i * ROW_SIZE) as u64,
                    entry: entry.clone(),
                };
                (*asset_id, row)
            })
            .collect();
        Ok(TxOutGroup { offset, rows })
    }

    /// Write a header with no rows (tombstone or sentinel)
    pub fn write_header(&self, offset: u64, header: &GroupHeader) -> Result<()> {
        self.write_at(offset, &header.encode())
    }

    pub fn open_for_update(&self) -> Result<File> {
        Ok(OpenOptions::new().write(true).open(&self.path)?)
    }

    /// Overwrite the balance part of the row at `row_offset`
    pub fn write_balance(file: &mut File, row_offset: u64, entry: &BalanceEntry) -> Result<()> {
        let bytes = encode_balance(entry)?;
        file.seek(SeekFrom::Start(row_offset + 4))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Rewrite the file compactly through `<path>.new`
    ///
    /// Deleted and zero rows are dropped except the native currency row,
    /// rows of deleted assets are dropped and every group gains a fresh row
    /// for each newly added asset.
    pub fn rewrite(&self, state: &LedgerState) -> Result<()> {
        let mut buffer = Vec::new();
        for (txout, group) in &state.groups {
            let mut entries: BTreeMap<u32, BalanceEntry> = group
                .rows
                .iter()
                .filter(|(asset_id, row)| {
                    **asset_id == 0
                        || (!matches!(row.entry.state, BalanceState::Deleted | BalanceState::Zero)
                            && !state.deleted_assets.contains(asset_id))
                })
                .map(|(asset_id, row)| (*asset_id, row.entry.clone()))
                .collect();
            for asset_id in &state.new_assets {
                if !group.rows.contains_key(asset_id) {
                    entries.insert(*asset_id, BalanceEntry::default());
                }
            }
            if !entries.is_empty() {
                buffer.extend_from_slice(&encode_group(txout, &entries)?);
            }
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".new");
        let tmp = PathBuf::from(tmp);
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&buffer)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        log::info!("Balance ledger defragmented: {} bytes", buffer.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;
    use chrono::Utc;
    use tempfile::TempDir;

    fn txout(n: u8, vout: u32) -> OutPoint {
        OutPoint::new(Txid::from_byte_array([n; 32]), vout)
    }

    fn entries(ids: &[u32]) -> BTreeMap<u32, BalanceEntry> {
        ids.iter().map(|&id| (id, BalanceEntry::default())).collect()
    }

    #[test]
    fn test_group_offsets_survive_reload() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::new(dir.path().join("w.csbalances"));

        let first = file.write_group(0, &txout(1, 0), &entries(&[0, 5])).unwrap();
        let second = file
            .write_group(first.stored_size(), &txout(2, 1), &entries(&[0]))
            .unwrap();
        assert_eq!(first.rows[&5].offset, 60);
        assert_eq!(second.offset, 80);

        let state = file.load().unwrap();
        assert_eq!(state.file_size, 80 + 60);
        assert_eq!(state.groups[&txout(1, 0)].rows[&5].offset, 60);
        assert_eq!(state.groups[&txout(2, 1)].offset, 80);
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("w.csbalances");
        let file = LedgerFile::new(&path);
        file.write_group(0, &txout(1, 0), &entries(&[0, 3])).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let good = bytes.len();
        bytes.extend_from_slice(&[0xAA; 25]);
        fs::write(&path, &bytes).unwrap();

        let state = file.load().unwrap();
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.file_size, good as u64);
        assert_eq!(fs::metadata(&path).unwrap().len(), good as u64);
    }

    #[test]
    fn test_sentinels_and_tombstones() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::new(dir.path().join("w.csbalances"));
        let group = file.write_group(0, &txout(1, 0), &entries(&[0, 4])).unwrap();
        let mut offset = group.stored_size();

        file.write_header(
            group.offset,
            &GroupHeader::txout(&txout(1, 0), 2, GroupCode::Deleted),
        )
        .unwrap();
        for (asset_id, code) in [
            (7, GroupCode::NewAsset),
            (8, GroupCode::DeletedAsset),
            (7, GroupCode::DeletedAsset),
        ] {
            file.write_header(offset, &GroupHeader::sentinel(asset_id, code))
                .unwrap();
            offset += HEADER_SIZE as u64;
        }

        let state = file.load().unwrap();
        assert!(state.groups.is_empty());
        assert_eq!(state.dead_size, 80);
        assert!(state.new_assets.is_empty());
        assert_eq!(state.deleted_assets, vec![8, 7]);
    }

    #[test]
    fn test_rewrite_compacts_rows() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::new(dir.path().join("w.csbalances"));
        let now = Utc::now();

        let mut rows = entries(&[0, 2, 3]);
        rows.insert(0, BalanceEntry::new(BalanceState::Zero, Some(0), now));
        rows.insert(2, BalanceEntry::new(BalanceState::Zero, Some(0), now));
        rows.insert(4, BalanceEntry::new(BalanceState::Valid, Some(10), now));
        file.write_group(0, &txout(1, 0), &rows).unwrap();

        let mut state = file.load().unwrap();
        state.deleted_assets.push(3);
        state.new_assets.push(6);
        file.rewrite(&state).unwrap();

        let state = file.load().unwrap();
        let ids: Vec<u32> = state.groups[&txout(1, 0)].rows.keys().copied().collect();
        assert_eq!(ids, vec![0, 4, 6]);
        assert!(state.new_assets.is_empty());
        assert!(state.deleted_assets.is_empty());
    }

    #[test]
    fn test_write_balance_in_place() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::new(dir.path().join("w.csbalances"));
        let group = file.write_group(0, &txout(1, 0), &entries(&[0, 9])).unwrap();

        let now = Utc::now();
        let entry = BalanceEntry::new(BalanceState::Valid, Some(77), now);
        let mut handle = file.open_for_update().unwrap();
        LedgerFile::write_balance(&mut handle, group.rows[&9].offset, &entry).unwrap();
        drop(handle);

        let state = file.load().unwrap();
        let row = &state.groups[&txout(1, 0)].rows[&9];
        assert_eq!(row.entry.state, BalanceState::Valid);
        assert_eq!(row.entry.quantity, Some(77));
    }
}
