//! Event ingestion (C5, §4.1): polls a `ChainAdapter` for new source
//! events over `[last_scanned + 1, min(head, last_scanned + batch_window)]`,
//! resolves each event's token through the TokenMap, and inserts a
//! PENDING Transfer for anything new. `last_scanned` only advances once
//! the whole range's Transfers are durably persisted, in the same
//! transaction (§5 ordering guarantees).

use eyre::Result;
use sqlx::PgPool;

use crate::adapter::ChainAdapter;
use crate::store;
use crate::types::{Direction, NewTransfer};

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub scanned_from: i64,
    pub scanned_to: i64,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected_unmapped_token: usize,
}

/// Runs one ingestion pass for `direction` against `adapter`. On first
/// run (no prior watermark) this only seeds `last_scanned := head`; it
/// never back-scans history (§4.1).
pub async fn ingest(
    pool: &PgPool,
    adapter: &dyn ChainAdapter,
    direction: Direction,
    max_blocks_per_batch: u64,
) -> Result<IngestSummary> {
    let head = adapter.head().await?;

    let last_scanned = match store::get_last_scanned(pool, direction).await? {
        Some(v) => v,
        None => {
            let mut tx = pool.begin().await?;
            store::set_last_scanned_tx(&mut tx, direction, head).await?;
            tx.commit().await?;
            return Ok(IngestSummary {
                scanned_from: head,
                scanned_to: head,
                ..Default::default()
            });
        }
    };

    if last_scanned >= head {
        return Ok(IngestSummary {
            scanned_from: last_scanned,
            scanned_to: last_scanned,
            ..Default::default()
        });
    }

    let from_block = last_scanned + 1;
    let to_block = std::cmp::min(head, last_scanned + max_blocks_per_batch as i64);

    let events = adapter.fetch_events(from_block, to_block).await?;

    let mut news = Vec::with_capacity(events.len());
    let mut rejected_unmapped_token = 0usize;
    for event in events {
        let Some(token_map) = store::get_token_map_by_source(pool, &event.source_token).await? else {
            rejected_unmapped_token += 1;
            continue;
        };
        if direction == Direction::Deposit && !token_map.enabled_for_deposit {
            rejected_unmapped_token += 1;
            continue;
        }
        if direction == Direction::Withdrawal && !token_map.enabled_for_withdrawal {
            rejected_unmapped_token += 1;
            continue;
        }

        news.push(NewTransfer {
            direction,
            source_chain: event_chain_label(direction),
            source_address: event.source_address,
            source_token: event.source_token,
            source_tx_hash: event.source_tx_hash,
            source_block_number: event.block_number,
            target_chain: target_chain_label(direction),
            target_address: event.target_address,
            value: event.value,
            attestation: None,
            metadata: event.metadata,
        });
    }

    let (inserted, duplicates) = store::ingest_batch(pool, direction, &news, to_block).await?;

    Ok(IngestSummary {
        scanned_from: from_block,
        scanned_to: to_block,
        inserted,
        duplicates,
        rejected_unmapped_token,
    })
}

fn event_chain_label(direction: Direction) -> String {
    match direction {
        Direction::Deposit => "chain-a".to_string(),
        Direction::Withdrawal => "chain-b".to_string(),
    }
}

fn target_chain_label(direction: Direction) -> String {
    match direction {
        Direction::Deposit => "chain-b".to_string(),
        Direction::Withdrawal => "chain-a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::adapter::SourceEvent;

    fn event(tx: &str, block: i64, token: &str) -> SourceEvent {
        SourceEvent {
            source_tx_hash: tx.to_string(),
            block_number: block,
            source_address: "0xsender".to_string(),
            source_token: token.to_string(),
            target_address: "0xrecipient".to_string(),
            value: "100".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn chain_labels_flip_with_direction() {
        assert_eq!(event_chain_label(Direction::Deposit), "chain-a");
        assert_eq!(event_chain_label(Direction::Withdrawal), "chain-b");
        assert_eq!(target_chain_label(Direction::Deposit), "chain-b");
        assert_eq!(target_chain_label(Direction::Withdrawal), "chain-a");
    }

    #[tokio::test]
    async fn first_run_seeds_watermark_without_a_database() {
        let adapter = MockAdapter::new();
        *adapter.head.lock().unwrap() = 42;
        adapter.push_event(event("0xabc", 10, "0xtoken"));
        // No pool available in this unit test; this exercises head() and
        // the event plumbing only, the watermark path needs the store
        // crate's integration tests (requires Postgres).
        assert_eq!(adapter.head().await.unwrap(), 42);
        assert_eq!(adapter.fetch_events(0, 42).await.unwrap().len(), 1);
    }
}
