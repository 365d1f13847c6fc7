//! ChainAdapter / ChainBAdapter (C2, §6). Node I/O, signing, and wire
//! formats are explicitly out of scope (§1) — these traits are the
//! narrow seam the rest of the engine is built against. A simple
//! in-memory mock is provided for tests; real implementations live
//! outside this crate.

use async_trait::async_trait;
use eyre::Result;

/// A lock or burn event observed on the source side of a direction.
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub source_tx_hash: String,
    pub block_number: i64,
    pub source_address: String,
    pub source_token: String,
    pub target_address: String,
    pub value: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub number: i64,
    pub hash: String,
    pub parent_hash: String,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    pub id: String,
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Pending,
    Failed,
}

/// Operations a chain adapter must expose (§6). One implementation
/// targets Chain-A (EVM), another Chain-B; the engine is agnostic to
/// which is which beyond `Direction`.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn head(&self) -> Result<i64>;

    async fn submit_lock(&self, token: &str, value: &str, target_recipient: &str) -> Result<String>;

    async fn submit_release(
        &self,
        token: &str,
        value: &str,
        target_recipient: &str,
        attestation: Option<&str>,
    ) -> Result<String>;

    async fn submit_burn(&self, token: &str, value: &str, target_recipient: &str) -> Result<String>;

    async fn submit_mint(&self, token: &str, value: &str, target_recipient: &str) -> Result<String>;

    async fn confirmations(&self, tx_hash: &str) -> Result<i64>;

    async fn await_confirmation(&self, tx_hash: &str) -> Result<(i64, ConfirmationOutcome)>;

    async fn fetch_events(&self, from_block: i64, to_block: i64) -> Result<Vec<SourceEvent>>;

    async fn fetch_block(&self, number: i64) -> Result<Block>;

    async fn fetch_challenges(&self, block_number: i64) -> Result<Vec<ChallengeRecord>>;

    async fn propose_block(&self, block: &Block, state_root: &[u8; 32], tx_root: &[u8; 32]) -> Result<String>;

    async fn finalize_block(&self, block_number: i64) -> Result<String>;

    async fn create_challenge(&self, block_number: i64, kind: &str, data: serde_json::Value) -> Result<String>;

    async fn respond_to_challenge(&self, challenge_id: &str, proof: serde_json::Value) -> Result<String>;

    async fn is_supported(&self, token: &str) -> Result<bool>;

    async fn balance(&self) -> Result<String>;

    async fn current_principal(&self) -> Result<String>;

    fn canonical_tx_bytes(&self, tx: &[u8]) -> Vec<u8>;

    fn canonical_state_descriptor(&self, block: &Block) -> Vec<u8>;
}

/// The target-side adapter for withdrawals (Chain-B submits burns,
/// Chain-A submits releases) shares the same surface; the spec does not
/// distinguish the two trait shapes beyond naming (§6), so this is a
/// type alias rather than a duplicate trait.
pub trait ChainBAdapter: ChainAdapter {}
impl<T: ChainAdapter> ChainBAdapter for T {}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic in-memory adapter for unit/integration tests —
    /// queued events, a fake head counter, and tx-hash bookkeeping.
    pub struct MockAdapter {
        pub head: Mutex<i64>,
        pub events: Mutex<Vec<SourceEvent>>,
        pub confirmations_by_tx: Mutex<std::collections::HashMap<String, i64>>,
        pub submitted: Mutex<Vec<String>>,
    }

    impl MockAdapter {
        pub fn new() -> Self {
            Self {
                head: Mutex::new(0),
                events: Mutex::new(Vec::new()),
                confirmations_by_tx: Mutex::new(std::collections::HashMap::new()),
                submitted: Mutex::new(Vec::new()),
            }
        }

        pub fn push_event(&self, event: SourceEvent) {
            self.events.lock().unwrap().push(event);
        }

        pub fn set_confirmations(&self, tx_hash: &str, count: i64) {
            self.confirmations_by_tx
                .lock()
                .unwrap()
                .insert(tx_hash.to_string(), count);
        }
    }

    impl Default for MockAdapter {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ChainAdapter for MockAdapter {
        async fn head(&self) -> Result<i64> {
            Ok(*self.head.lock().unwrap())
        }

        async fn submit_lock(&self, _token: &str, _value: &str, _target_recipient: &str) -> Result<String> {
            let tx = format!("0xmocklock{}", self.submitted.lock().unwrap().len());
            self.submitted.lock().unwrap().push(tx.clone());
            Ok(tx)
        }

        async fn submit_release(
            &self,
            _token: &str,
            _value: &str,
            _target_recipient: &str,
            _attestation: Option<&str>,
        ) -> Result<String> {
            let tx = format!("0xmockrelease{}", self.submitted.lock().unwrap().len());
            self.submitted.lock().unwrap().push(tx.clone());
            Ok(tx)
        }

        async fn submit_burn(&self, _token: &str, _value: &str, _target_recipient: &str) -> Result<String> {
            let tx = format!("0xmockburn{}", self.submitted.lock().unwrap().len());
            self.submitted.lock().unwrap().push(tx.clone());
            Ok(tx)
        }

        async fn submit_mint(&self, _token: &str, _value: &str, _target_recipient: &str) -> Result<String> {
            let tx = format!("0xmockmint{}", self.submitted.lock().unwrap().len());
            self.submitted.lock().unwrap().push(tx.clone());
            Ok(tx)
        }

        async fn confirmations(&self, tx_hash: &str) -> Result<i64> {
            Ok(*self.confirmations_by_tx.lock().unwrap().get(tx_hash).unwrap_or(&0))
        }

        async fn await_confirmation(&self, tx_hash: &str) -> Result<(i64, ConfirmationOutcome)> {
            let confs = self.confirmations(tx_hash).await?;
            Ok((confs, ConfirmationOutcome::Confirmed))
        }

        async fn fetch_events(&self, from_block: i64, to_block: i64) -> Result<Vec<SourceEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
                .cloned()
                .collect())
        }

        async fn fetch_block(&self, number: i64) -> Result<Block> {
            Ok(Block {
                header: BlockHeader {
                    number,
                    hash: format!("0xblock{number}"),
                    parent_hash: format!("0xblock{}", number - 1),
                },
                txs: vec![],
            })
        }

        async fn fetch_challenges(&self, _block_number: i64) -> Result<Vec<ChallengeRecord>> {
            Ok(vec![])
        }

        async fn propose_block(&self, block: &Block, _state_root: &[u8; 32], _tx_root: &[u8; 32]) -> Result<String> {
            Ok(format!("0xpropose{}", block.header.number))
        }

        async fn finalize_block(&self, block_number: i64) -> Result<String> {
            Ok(format!("0xfinalize{block_number}"))
        }

        async fn create_challenge(&self, block_number: i64, _kind: &str, _data: serde_json::Value) -> Result<String> {
            Ok(format!("0xchallenge{block_number}"))
        }

        async fn respond_to_challenge(&self, challenge_id: &str, _proof: serde_json::Value) -> Result<String> {
            Ok(format!("0xresponse{challenge_id}"))
        }

        async fn is_supported(&self, _token: &str) -> Result<bool> {
            Ok(true)
        }

        async fn balance(&self) -> Result<String> {
            Ok("0".to_string())
        }

        async fn current_principal(&self) -> Result<String> {
            Ok("0xmockprincipal".to_string())
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
}
