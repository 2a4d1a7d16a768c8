//! Block lookups used to resolve asset references
//!
//! An [`AssetRef`](crate::protocol::AssetRef) addresses a genesis
//! transaction by block height and the byte offset of the transaction
//! inside the serialized block. Offsets are computed from consensus
//! sizes: the 80-byte header, the compact-size transaction count, then
//! every preceding transaction.

use std::time::Duration;

use bitcoin::hashes::Hash;
use bitcoin::{Block, Transaction, Txid};

/// Serialized size of a block header
const HEADER_SIZE: u32 = 80;

/// Source of full blocks by height
pub trait ChainSource: Send + Sync {
    fn block_at(&self, height: u32) -> Option<Block>;
}

fn compact_size_len(n: usize) -> u32 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

fn first_tx_offset(block: &Block) -> u32 {
    HEADER_SIZE + compact_size_len(block.txdata.len())
}

/// Transaction starting at `offset` bytes into the serialized block
pub fn transaction_by_offset(block: &Block, offset: u32) -> Option<&Transaction> {
    let mut position = first_tx_offset(block);
    for tx in &block.txdata {
        if position == offset {
            return Some(tx);
        }
        if position > offset {
            return None;
        }
        position += tx.total_size() as u32;
    }
    None
}

/// Byte offset of `txid` inside the serialized block, 0 if it is not there
pub fn offset_of_transaction(block: &Block, txid: &Txid) -> u32 {
    let mut position = first_tx_offset(block);
    for tx in &block.txdata {
        if tx.compute_txid() == *txid {
            return position;
        }
        position += tx.total_size() as u32;
    }
    0
}

/// Txid bytes in the order they are displayed (and stored on disk)
pub fn txid_display_bytes(txid: &Txid) -> [u8; 32] {
    let mut bytes = txid.to_byte_array();
    bytes.reverse();
    bytes
}

/// Inverse of [`txid_display_bytes`]
pub fn txid_from_display_bytes(mut bytes: [u8; 32]) -> Txid {
    bytes.reverse();
    Txid::from_byte_array(bytes)
}

/// [`ChainSource`] over the Esplora REST API
pub struct EsploraChain {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl EsploraChain {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build Esplora client ({}), using defaults", e);
                reqwest::blocking::Client::new()
            });
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn block_hash(&self, height: u32) -> Result<String, String> {
        let url = format!("{}/block-height/{}", self.base_url, height);
        let response = self.client.get(&url).send().map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        Ok(response.text().map_err(|e| e.to_string())?.trim().to_string())
    }

    fn raw_block(&self, hash: &str) -> Result<Block, String> {
        let url = format!("{}/block/{}/raw", self.base_url, hash);
        let response = self.client.get(&url).send().map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let bytes = response.bytes().map_err(|e| e.to_string())?;
        bitcoin::consensus::deserialize(&bytes).map_err(|e| e.to_string())
    }
}

impl ChainSource for EsploraChain {
    fn block_at(&self, height: u32) -> Option<Block> {
        let hash = match self.block_hash(height) {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("Cannot get block hash at height {}: {}", height, e);
                return None;
            }
        };
        match self.raw_block(&hash) {
            Ok(block) => Some(block),
            Err(e) => {
                log::warn!("Cannot get block {}: {}", hash, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::block::{Header, Version as BlockVersion};
    use bitcoin::hashes::sha256d;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, BlockHash, CompactTarget, OutPoint, ScriptBuf, TxIn, TxMerkleNode, TxOut};

    fn tx(tag: u8, outputs: usize) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(
                    Txid::from_raw_hash(sha256d::Hash::hash(&[tag])),
                    0,
                ),
                ..Default::default()
            }],
            output: (0..outputs)
                .map(|i| TxOut {
                    value: Amount::from_sat(1000 + i as u64),
                    script_pubkey: ScriptBuf::new(),
                })
                .collect(),
        }
    }

    fn block(txdata: Vec<Transaction>) -> Block {
        Block {
            header: Header {
                version: BlockVersion::ONE,
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: 0,
                bits: CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata,
        }
    }

    #[test]
    fn test_offsets_follow_serialized_sizes() {
        let txs = vec![tx(1, 1), tx(2, 3), tx(3, 2)];
        let sizes: Vec<u32> = txs.iter().map(|t| t.total_size() as u32).collect();
        let txids: Vec<Txid> = txs.iter().map(|t| t.compute_txid()).collect();
        let block = block(txs);

        assert_eq!(offset_of_transaction(&block, &txids[0]), 81);
        assert_eq!(offset_of_transaction(&block, &txids[1]), 81 + sizes[0]);
        assert_eq!(
            offset_of_transaction(&block, &txids[2]),
            81 + sizes[0] + sizes[1]
        );

        let third = transaction_by_offset(&block, 81 + sizes[0] + sizes[1]).unwrap();
        assert_eq!(third.compute_txid(), txids[2]);
        assert!(transaction_by_offset(&block, 82).is_none());
        assert!(transaction_by_offset(&block, 0).is_none());
    }

    #[test]
    fn test_offset_of_missing_transaction() {
        let block = block(vec![tx(1, 1)]);
        let other = tx(9, 1).compute_txid();
        assert_eq!(offset_of_transaction(&block, &other), 0);
    }

    #[test]
    fn test_display_bytes_match_hex() {
        let txid = tx(4, 1).compute_txid();
        let bytes = txid_display_bytes(&txid);
        assert_eq!(hex::encode(bytes), txid.to_string());
        assert_eq!(txid_from_display_bytes(bytes), txid);
    }

    #[test]
    fn test_compact_size_len() {
        assert_eq!(compact_size_len(1), 1);
        assert_eq!(compact_size_len(0xfd), 3);
        assert_eq!(compact_size_len(0x1_0000), 5);
    }
}
