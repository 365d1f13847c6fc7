//! Placeholder `ChainAdapter` wiring. Node I/O, signing, and wire
//! formats are explicitly out of scope for this engine — concrete
//! adapters (an EVM client for Chain-A, a Chain-B node client) are
//! expected to be supplied by the deployer. This stub lets the
//! operator binary start and exercise the rest of the engine end to
//! end against a chain that answers but never actually transacts.
//!
//! TODO: replace with a real adapter once the target chains' RPC/signing
//! stacks are chosen.

use async_trait::async_trait;
use bridge_core::adapter::{Block, BlockHeader, ChainAdapter, ChallengeRecord, ConfirmationOutcome, SourceEvent};
use eyre::Result;

pub struct UnimplementedAdapter {
    name: &'static str,
}

impl UnimplementedAdapter {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn unimplemented(&self) -> eyre::Report {
        eyre::eyre!("chain adapter '{}' is not configured", self.name)
    }
}

#[async_trait]
impl ChainAdapter for UnimplementedAdapter {
    async fn head(&self) -> Result<i64> {
        Err(self.unimplemented())
    }

    async fn submit_lock(&self, _token: &str, _value: &str, _target_recipient: &str) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn submit_release(&self, _token: &str, _value: &str, _target_recipient: &str, _attestation: Option<&str>) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn submit_burn(&self, _token: &str, _value: &str, _target_recipient: &str) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn submit_mint(&self, _token: &str, _value: &str, _target_recipient: &str) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn confirmations(&self, _tx_hash: &str) -> Result<i64> {
        Err(self.unimplemented())
    }

    async fn await_confirmation(&self, _tx_hash: &str) -> Result<(i64, ConfirmationOutcome)> {
        Err(self.unimplemented())
    }

    async fn fetch_events(&self, _from_block: i64, _to_block: i64) -> Result<Vec<SourceEvent>> {
        Ok(Vec::new())
    }

    async fn fetch_block(&self, number: i64) -> Result<Block> {
        Ok(Block {
            header: BlockHeader { number, hash: String::new(), parent_hash: String::new() },
            txs: Vec::new(),
        })
    }

    async fn fetch_challenges(&self, _block_number: i64) -> Result<Vec<ChallengeRecord>> {
        Ok(Vec::new())
    }

    async fn propose_block(&self, _block: &Block, _state_root: &[u8; 32], _tx_root: &[u8; 32]) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn finalize_block(&self, _block_number: i64) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn create_challenge(&self, _block_number: i64, _kind: &str, _data: serde_json::Value) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn respond_to_challenge(&self, _challenge_id: &str, _proof: serde_json::Value) -> Result<String> {
        Err(self.unimplemented())
    }

    async fn is_supported(&self, _token: &str) -> Result<bool> {
        Ok(false)
    }

    async fn balance(&self) -> Result<String> {
        Ok("0".to_string())
    }

    async fn current_principal(&self) -> Result<String> {
        Err(self.unimplemented())
    }

    fn canonical_tx_bytes(&self, tx: &[u8]) -> Vec<u8> {
        tx.to_vec()
    }

    fn canonical_state_descriptor(&self, block: &Block) -> Vec<u8> {
        let mut out = block.header.hash.clone().into_bytes();
        out.extend_from_slice(block.header.parent_hash.as_bytes());
        out
    }
}
