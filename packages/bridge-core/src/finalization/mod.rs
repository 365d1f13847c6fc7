//! Finalization Engine (C6, §4.3): proposes Chain-B blocks to Chain-A,
//! runs the PROPOSED -> CHALLENGED -> FINALIZED/INVALIDATED state
//! machine, and dispatches challenge verification.

pub mod challenge;

use chrono::{Duration as ChronoDuration, Utc};
use eyre::Result;

use crate::adapter::{Block, ChainAdapter};
use crate::config::FinalizationConfig;
use crate::store;
use crate::types::{Finalization, FinalizationState, IncidentKind};

#[derive(Debug, Clone, Default)]
pub struct FinalizationSummary {
    pub proposed: usize,
    pub challenged: usize,
    pub finalized: usize,
    pub invalidated: usize,
}

/// One sweep: propose new Chain-B blocks up to the configured batch
/// size, check outstanding challenges on PROPOSED blocks, and finalize
/// or invalidate blocks whose challenge window has elapsed (§4.3).
pub async fn run_once(
    pool: &sqlx::PgPool,
    source_adapter: &dyn ChainAdapter,
    target_adapter: &dyn ChainAdapter,
    config: &FinalizationConfig,
) -> Result<FinalizationSummary> {
    let mut summary = FinalizationSummary::default();

    let last = store::get_last_proposed_block(pool).await?.unwrap_or(0);
    let head = source_adapter.head().await?;
    let to_block = std::cmp::min(head, last + config.max_blocks_per_batch as i64);

    let mut number = last + 1;
    while number <= to_block {
        if propose(pool, source_adapter, target_adapter, config, number).await? {
            summary.proposed += 1;
        }
        number += 1;
    }

    let proposed = store::get_expired_proposed(pool, Utc::now()).await?;
    for finalization in proposed {
        let challenges = target_adapter.fetch_challenges(finalization.block_number).await?;
        if challenges.is_empty() {
            let tx_hash = target_adapter.finalize_block(finalization.block_number).await?;
            store::mark_finalized(pool, finalization.block_number, &tx_hash, Utc::now()).await?;
            summary.finalized += 1;
            continue;
        }

        let mut invalidated = false;
        let had_challenge = !challenges.is_empty();
        for record in challenges {
            let verdict = challenge::verify(source_adapter, target_adapter, &finalization, &record).await?;
            if verdict.valid_challenge {
                store::set_finalization_state(pool, finalization.block_number, FinalizationState::Invalidated).await?;
                store::set_challenge(pool, finalization.block_number, &record.id).await?;
                store::insert_incident(
                    pool,
                    IncidentKind::ChallengeLost,
                    &format!("block {} invalidated by challenge {}: {}", finalization.block_number, record.id, verdict.reason),
                    "finalization_engine",
                    serde_json::json!({ "block_number": finalization.block_number, "challenge_id": record.id }),
                )
                .await?;
                invalidated = true;
                break;
            }

            target_adapter
                .respond_to_challenge(&record.id, serde_json::json!({ "reason": verdict.reason }))
                .await?;
        }

        if invalidated {
            summary.invalidated += 1;
        } else {
            // Every raised challenge was defended: the proposal stands and
            // the window has already elapsed, so finalize now rather than
            // leaving the block stuck at CHALLENGED (§4.3 "CHALLENGED --win--> FINALIZED").
            if had_challenge {
                summary.challenged += 1;
            }
            let tx_hash = target_adapter.finalize_block(finalization.block_number).await?;
            store::mark_finalized(pool, finalization.block_number, &tx_hash, Utc::now()).await?;
            summary.finalized += 1;
        }
    }

    Ok(summary)
}

/// Proposes one block, idempotent via `insert_finalization_if_absent`
/// (§4.3 "a restart re-proposes the same block harmlessly").
async fn propose(
    pool: &sqlx::PgPool,
    source_adapter: &dyn ChainAdapter,
    target_adapter: &dyn ChainAdapter,
    config: &FinalizationConfig,
    block_number: i64,
) -> Result<bool> {
    let block: Block = source_adapter.fetch_block(block_number).await?;

    let state_root = canonical_state_root(source_adapter, &block);
    let tx_hashes: Vec<[u8; 32]> = block
        .txs
        .iter()
        .map(|tx| bridge_types::hash::canonical_hash(&source_adapter.canonical_tx_bytes(tx)))
        .collect();
    let tx_root = bridge_types::hash::transactions_root(tx_hashes.iter());

    target_adapter.propose_block(&block, &state_root, &tx_root).await?;
    let principal = target_adapter.current_principal().await?;

    let now = Utc::now();
    let finalization = Finalization {
        block_number: block.header.number,
        block_hash: block.header.hash.clone(),
        parent_hash: block.header.parent_hash.clone(),
        state_root: bridge_types::hash::bytes32_to_hex(&state_root),
        transactions_root: bridge_types::hash::bytes32_to_hex(&tx_root),
        transaction_count: block.txs.len() as i32,
        proposer: principal,
        propose_time: now,
        expected_finalization_time: now + ChronoDuration::seconds(config.challenge_window_s),
        state: FinalizationState::Proposed,
        challenge_id: None,
        finalization_tx_hash: None,
        finalization_time: None,
        error: None,
    };

    store::insert_finalization_if_absent(pool, &finalization).await
}

fn canonical_state_root(adapter: &dyn ChainAdapter, block: &Block) -> [u8; 32] {
    let descriptor = adapter.canonical_state_descriptor(block);
    bridge_types::hash::canonical_hash(&descriptor)
}
