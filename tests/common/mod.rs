//! Common test utilities for registry and ledger integration tests
//!
//! This module provides in-memory collaborators:
//! - `MockChain`: blocks by height
//! - `MockCodec`: OP_RETURN metadata with a toy genesis/transfer encoding
//! - `MockHttp`: canned web pages, downloads and tracker answers
//! - `TestEnvironment`: a temp directory with a registry and a ledger

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, Script, ScriptBuf, Transaction, TxIn,
    TxMerkleNode, TxOut, Txid,
};
use coinspark_assets::chain::offset_of_transaction;
use coinspark_assets::http::cached_file_path;
use coinspark_assets::protocol::AssetRef;
use coinspark_assets::{
    AssetEvent, AssetRegistry, AssetsConfig, BalanceLedger, ChainSource, Collaborators,
    Downloaded, GenesisRecord, HttpClient, MimeType, ProtocolCodec, ServerError, TransferList,
};
use serde_json::Value;
use tempfile::TempDir;

pub const ISSUER: &str = "http://issuer.test";
pub const TRACKER: &str = "http://tracker.test";
pub const CONTRACT_URL: &str = "http://issuer.test/contract.pdf";

/// Contract document the scanner accepts
pub const CLEAN_CONTRACT: &[u8] = b"%PDF-1.4\n\
1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n\
2 0 obj\n<</Type /Pages /Kids [3 0 R] /Count 1>>\nendobj\n\
3 0 obj\n<</Type /Page /Parent 2 0 R /Contents 4 0 R>>\nendobj\n\
4 0 obj\n<</Length 5 0 R>>\nstream\nBT /F1 12 Tf (Terms) Tj ET\nendstream\nendobj\n\
5 0 obj\n26\nendobj\n\
trailer\n<</Size 6 /Root 1 0 R>>\n%%EOF\n";

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

// ============================================================================
// Chain
// ============================================================================

#[derive(Default)]
pub struct MockChain {
    blocks: Mutex<HashMap<u32, Block>>,
}

impl MockChain {
    /// Store a block at `height` and return the byte offset of every transaction
    pub fn add_block(&self, height: u32, txdata: Vec<Transaction>) -> Vec<u32> {
        let block = Block {
            header: Header {
                version: BlockVersion::ONE,
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: height,
                bits: CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata,
        };
        let offsets = block
            .txdata
            .iter()
            .map(|tx| offset_of_transaction(&block, &tx.compute_txid()))
            .collect();
        self.blocks.lock().unwrap().insert(height, block);
        offsets
    }
}

impl ChainSource for MockChain {
    fn block_at(&self, height: u32) -> Option<Block> {
        self.blocks.lock().unwrap().get(&height).cloned()
    }
}

// ============================================================================
// Protocol codec
// ============================================================================

/// Genesis metadata: `G`, 8-byte issued quantity, 1-byte "hash accepted" flag
pub fn genesis_metadata(qty: u64, hash_ok: bool) -> Vec<u8> {
    let mut bytes = vec![b'G'];
    bytes.extend_from_slice(&qty.to_le_bytes());
    bytes.push(u8::from(hash_ok));
    bytes
}

/// Transfer metadata: `T` and the output receiving every input unit
pub fn transfer_metadata(target: u8) -> Vec<u8> {
    vec![b'T', target]
}

#[derive(Debug)]
pub struct MockGenesis {
    raw: Vec<u8>,
    qty: u64,
    hash_ok: bool,
}

impl GenesisRecord for MockGenesis {
    fn encode(&self) -> Vec<u8> {
        self.raw.clone()
    }

    fn apply(&self, outputs_regular: &[bool]) -> Vec<u64> {
        let mut qty = vec![0; outputs_regular.len()];
        if let Some(first) = outputs_regular.iter().position(|&r| r) {
            qty[first] = self.qty;
        }
        qty
    }

    fn calc_min_fee(&self, _output_sats: &[u64], _outputs_regular: &[bool]) -> u64 {
        0
    }

    fn asset_web_page_url(&self, first_spent_txid: &str, first_spent_vout: u32) -> Option<String> {
        Some(format!(
            "{}/asset/{}-{}",
            ISSUER,
            &first_spent_txid[..16],
            first_spent_vout
        ))
    }

    fn validate_asset_hash(&self, _hash: &[u8]) -> bool {
        self.hash_ok
    }

    fn domain_url(&self) -> Option<String> {
        Some(ISSUER.to_string())
    }
}

#[derive(Debug)]
pub struct MockTransfers {
    target: usize,
}

impl MockTransfers {
    fn route(&self, target: usize, input_qty: &[u64], outputs_regular: &[bool]) -> Vec<u64> {
        let mut qty = vec![0; outputs_regular.len()];
        if outputs_regular.get(target).copied().unwrap_or(false) {
            qty[target] = input_qty.iter().sum();
        }
        qty
    }
}

impl TransferList for MockTransfers {
    fn calc_min_fee(&self, _n_inputs: usize, _output_sats: &[u64], _outputs_regular: &[bool]) -> u64 {
        1000
    }

    fn apply(
        &self,
        _asset_ref: &AssetRef,
        _genesis: &dyn GenesisRecord,
        input_qty: &[u64],
        outputs_regular: &[bool],
    ) -> Vec<u64> {
        self.route(self.target, input_qty, outputs_regular)
    }

    fn apply_none(
        &self,
        _asset_ref: &AssetRef,
        _genesis: &dyn GenesisRecord,
        input_qty: &[u64],
        outputs_regular: &[bool],
    ) -> Vec<u64> {
        self.route(0, input_qty, outputs_regular)
    }
}

pub struct MockCodec;

impl ProtocolCodec for MockCodec {
    fn metadata(&self, tx: &Transaction) -> Option<Vec<u8>> {
        tx.output
            .iter()
            .filter(|out| out.script_pubkey.is_op_return())
            .find_map(|out| match out.script_pubkey.instructions().nth(1) {
                Some(Ok(Instruction::PushBytes(bytes))) => Some(bytes.as_bytes().to_vec()),
                _ => None,
            })
    }

    fn is_regular(&self, script: &Script) -> bool {
        !script.is_op_return()
    }

    fn decode_genesis(&self, metadata: &[u8]) -> Option<Arc<dyn GenesisRecord>> {
        if metadata.len() != 10 || metadata[0] != b'G' {
            return None;
        }
        let mut qty = [0u8; 8];
        qty.copy_from_slice(&metadata[1..9]);
        Some(Arc::new(MockGenesis {
            raw: metadata.to_vec(),
            qty: u64::from_le_bytes(qty),
            hash_ok: metadata[9] != 0,
        }))
    }

    fn decode_transfers(
        &self,
        metadata: &[u8],
        _n_inputs: usize,
        _n_outputs: usize,
    ) -> Option<Box<dyn TransferList>> {
        match metadata {
            [b'T', target] => Some(Box::new(MockTransfers {
                target: *target as usize,
            })),
            _ => None,
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

pub fn test_txid(tag: u8) -> Txid {
    Txid::from_raw_hash(sha256d::Hash::hash(&[tag, 0xC5]))
}

fn op_return(metadata: &[u8]) -> TxOut {
    let push = PushBytesBuf::try_from(metadata.to_vec()).unwrap();
    TxOut {
        value: Amount::ZERO,
        script_pubkey: Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(push)
            .into_script(),
    }
}

/// Transaction spending `inputs` into outputs of `sats`, with optional metadata appended last
pub fn test_tx(inputs: &[OutPoint], sats: &[u64], metadata: Option<&[u8]>) -> Transaction {
    let mut output: Vec<TxOut> = sats
        .iter()
        .map(|&value| TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new(),
        })
        .collect();
    if let Some(metadata) = metadata {
        output.push(op_return(metadata));
    }
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|&previous_output| TxIn {
                previous_output,
                ..Default::default()
            })
            .collect(),
        output,
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Default)]
pub struct MockHttp {
    pages: Mutex<HashMap<String, (Vec<u8>, MimeType)>>,
    trackers: Mutex<HashMap<String, Value>>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl MockHttp {
    pub fn add_page(&self, url: &str, contents: &[u8], mime: MimeType) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (contents.to_vec(), mime));
    }

    pub fn remove_page(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    /// Answer tracker calls to `url` with this `result` object
    pub fn set_tracker(&self, url: &str, result: Value) {
        self.trackers.lock().unwrap().insert(url.to_string(), result);
    }

    /// Requests posted so far, as parsed JSON bodies
    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().unwrap().clone()
    }
}

impl HttpClient for MockHttp {
    fn fetch(&self, url: &str, _timeout: Duration, dest_prefix: Option<&Path>) -> Downloaded {
        let Some((contents, mime)) = self.pages.lock().unwrap().get(url).cloned() else {
            return Downloaded::failed(ServerError::ServerNotFound, 404);
        };
        let mut downloaded = Downloaded {
            mime_type: Some(mime),
            response_code: 200,
            ..Default::default()
        };
        match dest_prefix {
            Some(prefix) => {
                let path = cached_file_path(prefix, mime);
                std::fs::write(&path, &contents).unwrap();
                downloaded.file_path = Some(path);
            }
            None => downloaded.contents = contents,
        }
        downloaded
    }

    fn post(
        &self,
        url: &str,
        _timeout: Duration,
        body: &str,
        _headers: &[(&str, &str)],
    ) -> Downloaded {
        let request: Value = serde_json::from_str(body).unwrap();
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), request.clone()));

        let Some(result) = self.trackers.lock().unwrap().get(url).cloned() else {
            return Downloaded::failed(ServerError::ServerCannotConnect, 0);
        };
        let response = serde_json::json!({
            "id": request["id"],
            "jsonrpc": "2.0",
            "result": result,
        });
        Downloaded {
            contents: response.to_string().into_bytes(),
            mime_type: Some(MimeType::Json),
            response_code: 200,
            ..Default::default()
        }
    }
}

/// Asset web page embedding a complete specification
pub fn asset_page(name: &str) -> String {
    format!(
        r#"<html><head><script>
_bitcoin_asset_specification_({{
  "name": "{}",
  "name_short": "TST",
  "issuer": "Test Issuer",
  "description": "Units of a test asset",
  "units": "1 unit",
  "issue_date": "2024-01-01T00:00:00Z",
  "contract_url": "{}",
  "coinspark_tracker_url": ["tracker.test"]
}})
</script></head><body>{}</body></html>"#,
        name, CONTRACT_URL, name
    )
}

// ============================================================================
// Environment
// ============================================================================

/// Registry and ledger over a temp directory with mock collaborators
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config: AssetsConfig,
    pub chain: Arc<MockChain>,
    pub http: Arc<MockHttp>,
    pub registry: Arc<AssetRegistry>,
    pub ledger: BalanceLedger,
    pub events: crossbeam_channel::Receiver<AssetEvent>,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        init_logging();
        let temp_dir = TempDir::new()?;
        let config = AssetsConfig::with_prefix(temp_dir.path().join("wallet"));
        let chain = Arc::new(MockChain::default());
        let http = Arc::new(MockHttp::default());
        let (sender, events) = crossbeam_channel::unbounded();

        let registry = Arc::new(AssetRegistry::open(
            config.clone(),
            collaborators(&chain, &http),
            Some(Arc::new(sender.clone())),
        )?);
        let ledger = BalanceLedger::open(config.clone(), registry.clone(), Some(Arc::new(sender)))?;

        Ok(Self {
            temp_dir,
            config,
            chain,
            http,
            registry,
            ledger,
            events,
        })
    }

    pub fn collaborators(&self) -> Collaborators {
        collaborators(&self.chain, &self.http)
    }

    /// Reopen registry and ledger from disk
    pub fn reopen(&mut self) -> anyhow::Result<()> {
        self.registry = Arc::new(AssetRegistry::open(
            self.config.clone(),
            self.collaborators(),
            None,
        )?);
        self.ledger = BalanceLedger::open(self.config.clone(), self.registry.clone(), None)?;
        Ok(())
    }

    pub fn drain_events(&self) -> Vec<AssetEvent> {
        self.events.try_iter().collect()
    }

    /// Publish a genesis in block `height` together with its web page and contract
    ///
    /// Returns the genesis txid and its resolved asset reference.
    pub fn publish_genesis(&self, tag: u8, height: u32, qty: u64, hash_ok: bool) -> (Txid, AssetRef) {
        let funding = OutPoint::new(test_txid(tag), 0);
        let genesis = test_tx(&[funding], &[10_000], Some(&genesis_metadata(qty, hash_ok)));
        let coinbase = test_tx(&[OutPoint::null()], &[50_000], None);
        let txid = genesis.compute_txid();
        let offsets = self.chain.add_block(height, vec![coinbase, genesis]);

        let display = coinspark_assets::chain::txid_display_bytes(&txid);
        let asset_ref = AssetRef::new(height, offsets[1], [display[0], display[1]]);

        let page_url = format!("{}/asset/{}-{}", ISSUER, &funding.txid.to_string()[..16], 0);
        self.http
            .add_page(&page_url, asset_page("Test Asset").as_bytes(), MimeType::Html);
        self.http.add_page(CONTRACT_URL, CLEAN_CONTRACT, MimeType::Pdf);
        (txid, asset_ref)
    }
}

pub fn collaborators(chain: &Arc<MockChain>, http: &Arc<MockHttp>) -> Collaborators {
    Collaborators {
        chain: chain.clone(),
        http: http.clone(),
        codec: Arc::new(MockCodec),
    }
}
