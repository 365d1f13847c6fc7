//! Challenge verification (§4.3), grounded on the canceler's approval
//! verifier: recompute the disputed root/hash independently, then
//! dispatch on the challenge's declared kind.

use eyre::Result;

use crate::adapter::{ChainAdapter, ChallengeRecord};
use crate::types::{ChallengeKind, Finalization};

#[derive(Debug, Clone)]
pub struct Verdict {
    pub valid_challenge: bool,
    pub reason: String,
}

/// Recomputes the proposed block's roots from the source chain and
/// compares them against what was actually proposed. A mismatch means
/// the challenge is valid and the proposal must be invalidated.
pub async fn verify(
    source_adapter: &dyn ChainAdapter,
    _target_adapter: &dyn ChainAdapter,
    finalization: &Finalization,
    record: &ChallengeRecord,
) -> Result<Verdict> {
    let block = source_adapter.fetch_block(finalization.block_number).await?;
    let kind = ChallengeKind::from_tag(&record.kind, index_from_data(&record.data));

    let verdict = match kind {
        ChallengeKind::InvalidParentHash => {
            if block.header.parent_hash != finalization.parent_hash {
                Verdict {
                    valid_challenge: true,
                    reason: "parent hash mismatch against recomputed chain history".to_string(),
                }
            } else {
                Verdict { valid_challenge: false, reason: "parent hash matches".to_string() }
            }
        }
        ChallengeKind::InvalidStateRoot => {
            let descriptor = source_adapter.canonical_state_descriptor(&block);
            let recomputed = bridge_types::hash::bytes32_to_hex(&bridge_types::hash::canonical_hash(&descriptor));
            if recomputed != finalization.state_root {
                Verdict { valid_challenge: true, reason: "state root does not match recomputed descriptor".to_string() }
            } else {
                Verdict { valid_challenge: false, reason: "state root matches".to_string() }
            }
        }
        ChallengeKind::InvalidTxRoot => {
            let tx_hashes: Vec<[u8; 32]> = block
                .txs
                .iter()
                .map(|tx| bridge_types::hash::canonical_hash(&source_adapter.canonical_tx_bytes(tx)))
                .collect();
            let recomputed = bridge_types::hash::bytes32_to_hex(&bridge_types::hash::transactions_root(tx_hashes.iter()));
            if recomputed != finalization.transactions_root {
                Verdict { valid_challenge: true, reason: "transactions root does not match recomputed tx list".to_string() }
            } else {
                Verdict { valid_challenge: false, reason: "transactions root matches".to_string() }
            }
        }
        ChallengeKind::InvalidTx(index) => {
            if index >= block.txs.len() {
                Verdict { valid_challenge: true, reason: format!("challenged tx index {index} out of range") }
            } else {
                // Without node-level re-execution this engine can only
                // confirm the transaction exists at the claimed index;
                // a false claim of non-existence is the only case this
                // minimal adapter surface can adjudicate (§1 non-goals:
                // node I/O and execution are out of scope).
                Verdict { valid_challenge: false, reason: "challenged transaction exists at claimed index".to_string() }
            }
        }
        ChallengeKind::Unknown => Verdict { valid_challenge: false, reason: "unrecognized challenge kind".to_string() },
    };

    Ok(verdict)
}

fn index_from_data(data: &serde_json::Value) -> Option<usize> {
    data.get("index").and_then(|v| v.as_u64()).map(|v| v as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use chrono::Utc;

    fn finalization(block_number: i64) -> Finalization {
        Finalization {
            block_number,
            block_hash: format!("0xblock{block_number}"),
            parent_hash: format!("0xblock{}", block_number - 1),
            state_root: "0xstate".to_string(),
            transactions_root: "0xtx".to_string(),
            transaction_count: 0,
            proposer: "0xproposer".to_string(),
            propose_time: Utc::now(),
            expected_finalization_time: Utc::now(),
            state: crate::types::FinalizationState::Proposed,
            challenge_id: None,
            finalization_tx_hash: None,
            finalization_time: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn parent_hash_challenge_fails_when_hashes_match() {
        let source = MockAdapter::new();
        let target = MockAdapter::new();
        let f = finalization(5);
        let record = ChallengeRecord { id: "c1".to_string(), kind: "invalid_parent_hash".to_string(), data: serde_json::json!({}) };
        let verdict = verify(&source, &target, &f, &record).await.unwrap();
        assert!(!verdict.valid_challenge);
    }

    #[tokio::test]
    async fn parent_hash_challenge_succeeds_when_hashes_diverge() {
        let source = MockAdapter::new();
        let target = MockAdapter::new();
        let mut f = finalization(5);
        f.parent_hash = "0xwrong".to_string();
        let record = ChallengeRecord { id: "c1".to_string(), kind: "invalid_parent_hash".to_string(), data: serde_json::json!({}) };
        let verdict = verify(&source, &target, &f, &record).await.unwrap();
        assert!(verdict.valid_challenge);
    }

    #[tokio::test]
    async fn unknown_challenge_kind_is_rejected() {
        let source = MockAdapter::new();
        let target = MockAdapter::new();
        let f = finalization(5);
        let record = ChallengeRecord { id: "c1".to_string(), kind: "bogus".to_string(), data: serde_json::json!({}) };
        let verdict = verify(&source, &target, &f, &record).await.unwrap();
        assert!(!verdict.valid_challenge);
    }
}
