//! Colored-coin protocol seam
//!
//! The binary genesis and transfer encodings live in an external codec.
//! This module fixes the shape the registry and ledger consume: a
//! [`ProtocolCodec`] that finds and decodes transaction metadata, the
//! decoded [`GenesisRecord`] and [`TransferList`] objects, the compact
//! [`AssetRef`] and the canonical asset hash.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::{Script, Transaction};
use sha2::{Digest, Sha256};

use crate::error::AssetsError;

/// Number of txid bytes kept in an [`AssetRef`]
pub const TXID_PREFIX_LEN: usize = 2;

/// Compact reference to a genesis transaction
///
/// `tx_offset` is the byte offset of the transaction inside its block;
/// 0 means the offset has not been resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetRef {
    pub block: u32,
    pub tx_offset: u32,
    /// First bytes of the txid in display order
    pub txid_prefix: [u8; TXID_PREFIX_LEN],
}

impl AssetRef {
    pub fn new(block: u32, tx_offset: u32, txid_prefix: [u8; TXID_PREFIX_LEN]) -> Self {
        Self {
            block,
            tx_offset,
            txid_prefix,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx_offset != 0
    }

    fn prefix_number(&self) -> u16 {
        u16::from_le_bytes(self.txid_prefix)
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.block, self.tx_offset, self.prefix_number())
    }
}

impl FromStr for AssetRef {
    type Err = AssetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AssetsError::invalid_record(format!("invalid asset reference: {}", s));
        let mut parts = s.trim().split('-');
        let mut next_number = || -> Result<u64, AssetsError> {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .ok_or_else(invalid)
        };
        let block = u32::try_from(next_number()?).map_err(|_| invalid())?;
        let tx_offset = u32::try_from(next_number()?).map_err(|_| invalid())?;
        let prefix = u16::try_from(next_number()?).map_err(|_| invalid())?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(block, tx_offset, prefix.to_le_bytes()))
    }
}

/// Issuer fields bound into a genesis by the asset hash
#[derive(Debug, Clone, Default)]
pub struct AssetHashFields<'a> {
    pub name: &'a str,
    pub issuer: &'a str,
    pub description: &'a str,
    pub units: &'a str,
    pub issue_date: &'a str,
    pub expiry_date: Option<&'a str>,
    pub interest_rate: Option<f64>,
    pub multiple: Option<f64>,
}

/// Canonical SHA-256 asset hash over the issuer fields and the contract
///
/// Each text field is trimmed and NUL-terminated; interest rate (default 0)
/// and multiple (default 1) are written as integers scaled by 10^6.
pub fn asset_hash(fields: &AssetHashFields<'_>, contract: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for text in [
        fields.name,
        fields.issuer,
        fields.description,
        fields.units,
        fields.issue_date,
        fields.expiry_date.unwrap_or(""),
    ] {
        hasher.update(text.trim().as_bytes());
        hasher.update([0u8]);
    }
    for number in [
        fields.interest_rate.unwrap_or(0.0),
        fields.multiple.unwrap_or(1.0),
    ] {
        let scaled = (number * 1_000_000.0 + 0.5).floor() as i64;
        hasher.update(scaled.to_string().as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(contract);
    hasher.update([0u8]);
    hasher.finalize().into()
}

/// Decoded genesis metadata
pub trait GenesisRecord: Send + Sync + fmt::Debug {
    /// Metadata bytes this record was decoded from
    fn encode(&self) -> Vec<u8>;

    /// Quantities issued to each output
    fn apply(&self, outputs_regular: &[bool]) -> Vec<u64>;

    /// Minimum fee (in satoshis) for the issue to take effect
    fn calc_min_fee(&self, output_sats: &[u64], outputs_regular: &[bool]) -> u64;

    /// Asset web page, derived from the genesis creator's first spent input
    fn asset_web_page_url(&self, first_spent_txid: &str, first_spent_vout: u32)
        -> Option<String>;

    /// Whether `hash` matches the (possibly truncated) hash committed in the genesis
    fn validate_asset_hash(&self, hash: &[u8]) -> bool;

    /// Issuer domain, used for display
    fn domain_url(&self) -> Option<String>;
}

/// Decoded transfer list of a single transaction
pub trait TransferList: Send + fmt::Debug {
    /// Minimum fee (in satoshis) for the transfers to take effect
    fn calc_min_fee(&self, n_inputs: usize, output_sats: &[u64], outputs_regular: &[bool]) -> u64;

    /// Per-output quantities of one asset when the transfers apply
    fn apply(
        &self,
        asset_ref: &AssetRef,
        genesis: &dyn GenesisRecord,
        input_qty: &[u64],
        outputs_regular: &[bool],
    ) -> Vec<u64>;

    /// Per-output quantities of one asset when the fee was too low and
    /// only the default routing happens
    fn apply_none(
        &self,
        asset_ref: &AssetRef,
        genesis: &dyn GenesisRecord,
        input_qty: &[u64],
        outputs_regular: &[bool],
    ) -> Vec<u64>;
}

/// Protocol codec consumed by the registry and the ledger
pub trait ProtocolCodec: Send + Sync {
    /// Extract protocol metadata embedded in the transaction outputs
    fn metadata(&self, tx: &Transaction) -> Option<Vec<u8>>;

    /// Whether an output script can carry asset quantities
    fn is_regular(&self, script: &Script) -> bool;

    fn decode_genesis(&self, metadata: &[u8]) -> Option<Arc<dyn GenesisRecord>>;

    fn decode_transfers(
        &self,
        metadata: &[u8],
        n_inputs: usize,
        n_outputs: usize,
    ) -> Option<Box<dyn TransferList>>;

    fn calc_asset_hash(&self, fields: &AssetHashFields<'_>, contract: &[u8]) -> [u8; 32] {
        asset_hash(fields, contract)
    }

    /// Genesis record carried by `tx`, if any
    fn genesis_of(&self, tx: &Transaction) -> Option<Arc<dyn GenesisRecord>> {
        self.metadata(tx)
            .and_then(|metadata| self.decode_genesis(&metadata))
    }

    /// Regular-output flags for every output of `tx`
    fn outputs_regular(&self, tx: &Transaction) -> Vec<bool> {
        tx.output
            .iter()
            .map(|out| self.is_regular(&out.script_pubkey))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_ref_text_form() {
        let asset_ref = AssetRef::new(456789, 65432, [0x34, 0x12]);
        assert_eq!(asset_ref.to_string(), "456789-65432-4660");
        let parsed: AssetRef = "456789-65432-4660".parse().unwrap();
        assert_eq!(parsed, asset_ref);
        assert!(parsed.is_resolved());
    }

    #[test]
    fn test_asset_ref_rejects_garbage() {
        assert!("".parse::<AssetRef>().is_err());
        assert!("1-2".parse::<AssetRef>().is_err());
        assert!("1-2-70000".parse::<AssetRef>().is_err());
        assert!("1-2-3-4".parse::<AssetRef>().is_err());
        assert!("a-b-c".parse::<AssetRef>().is_err());
    }

    #[test]
    fn test_asset_hash_defaults() {
        let contract = b"%PDF-1.4";
        let implicit = AssetHashFields {
            name: "Gold",
            issuer: "Mint",
            description: "One ounce",
            units: "oz",
            issue_date: "2014-01-01",
            ..Default::default()
        };
        let explicit = AssetHashFields {
            expiry_date: Some(""),
            interest_rate: Some(0.0),
            multiple: Some(1.0),
            ..implicit.clone()
        };
        assert_eq!(asset_hash(&implicit, contract), asset_hash(&explicit, contract));
    }

    #[test]
    fn test_asset_hash_trims_fields() {
        let a = AssetHashFields {
            name: "  Gold ",
            ..Default::default()
        };
        let b = AssetHashFields {
            name: "Gold",
            ..Default::default()
        };
        assert_eq!(asset_hash(&a, b"x"), asset_hash(&b, b"x"));
        assert_ne!(asset_hash(&a, b"x"), asset_hash(&b, b"y"));
    }

    #[test]
    fn test_asset_hash_known_layout() {
        let fields = AssetHashFields {
            name: "A",
            issuer: "B",
            description: "C",
            units: "D",
            issue_date: "E",
            expiry_date: None,
            interest_rate: Some(1.5),
            multiple: None,
        };
        let expected: [u8; 32] =
            Sha256::digest(b"A\0B\0C\0D\0E\0\x001500000\x001000000\0contract\0").into();
        assert_eq!(asset_hash(&fields, b"contract"), expected);
    }
}
