//! The Store (C1): Postgres-backed journal of transfers, finalizations,
//! token maps, incidents, and rate-limit counters. Every query here is
//! the sole source of truth (§5) — the safety in-memory mirrors are
//! optimizations over this table, never a replacement for it.

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{
    Direction, Finalization, FinalizationState, Incident, IncidentKind, NewTransfer,
    RateLimitBucket, TokenMap, Transfer, TransferStatus, TransferTransition,
};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .wrap_err("failed to connect to the store")
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("failed to run store migrations")
}

// ---------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------

const TRANSFER_SELECT: &str = r#"
    id, direction, status,
    source_chain, source_address, source_token, source_tx_hash, source_block_number, source_confirmations,
    target_chain, target_address, target_token, target_tx_hash, target_block_number,
    value, created_at, updated_at, completed_at,
    attestation, last_error, retry_count, next_retry_at, metadata
"#;

/// Inserts a new Transfer in PENDING plus its first journal row, in one
/// transaction. Idempotent on `(direction, source_tx_hash)`: a conflict
/// is a no-op and returns `Ok(None)` so ingestion can count duplicates
/// without treating them as errors (§4.1 "duplicate source event").
pub async fn insert_transfer_if_absent(pool: &PgPool, new: &NewTransfer) -> Result<Option<Uuid>> {
    let mut tx = pool.begin().await.wrap_err("begin insert_transfer_if_absent")?;

    let id = Uuid::new_v4();
    let result = sqlx::query(
        r#"
        INSERT INTO transfers (
            id, direction, status,
            source_chain, source_address, source_token, source_tx_hash, source_block_number, source_confirmations,
            target_chain, target_address, value, attestation, metadata
        ) VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, 0, $8, $9, $10, $11, $12)
        ON CONFLICT (direction, source_tx_hash) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(new.direction)
    .bind(&new.source_chain)
    .bind(&new.source_address)
    .bind(&new.source_token)
    .bind(&new.source_tx_hash)
    .bind(new.source_block_number)
    .bind(&new.target_chain)
    .bind(&new.target_address)
    .bind(&new.value)
    .bind(&new.attestation)
    .bind(&new.metadata)
    .execute(&mut *tx)
    .await
    .wrap_err("insert transfer")?;

    if result.rows_affected() == 0 {
        tx.rollback().await.wrap_err("rollback duplicate transfer insert")?;
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO transfer_transitions (transfer_id, from_status, to_status) VALUES ($1, NULL, 'pending')",
    )
    .bind(id)
    .execute(&mut *tx)
    .await
    .wrap_err("insert initial transition")?;

    tx.commit().await.wrap_err("commit insert_transfer_if_absent")?;
    Ok(Some(id))
}

pub async fn get_transfer(pool: &PgPool, id: Uuid) -> Result<Option<Transfer>> {
    let query = format!("SELECT {TRANSFER_SELECT} FROM transfers WHERE id = $1");
    sqlx::query_as::<_, Transfer>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("get_transfer")
}

pub async fn transfer_exists(pool: &PgPool, direction: Direction, source_tx_hash: &str) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM transfers WHERE direction = $1 AND source_tx_hash = $2)",
    )
    .bind(direction)
    .bind(source_tx_hash)
    .fetch_one(pool)
    .await
    .wrap_err("transfer_exists")?;
    Ok(row.0)
}

/// General-purpose listing for the operator surface (§6 `GET /transfers`):
/// optional direction/status filters, newest-first, paginated.
pub async fn list_transfers(
    pool: &PgPool,
    direction: Option<Direction>,
    status: Option<TransferStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transfer>> {
    let mut builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new(format!("SELECT {TRANSFER_SELECT} FROM transfers WHERE 1 = 1"));
    if let Some(d) = direction {
        builder.push(" AND direction = ");
        builder.push_bind(d);
    }
    if let Some(s) = status {
        builder.push(" AND status = ");
        builder.push_bind(s);
    }
    builder.push(" ORDER BY created_at DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    builder
        .build_query_as::<Transfer>()
        .fetch_all(pool)
        .await
        .wrap_err("list_transfers")
}

/// Fetches PENDING/retryable Transfers oldest-first, bounded by
/// `batch_size` (§4.1 worker pool contract).
pub async fn get_runnable_transfers(pool: &PgPool, direction: Direction, batch_size: i64) -> Result<Vec<Transfer>> {
    let query = format!(
        "SELECT {TRANSFER_SELECT} FROM transfers
         WHERE direction = $1 AND status = 'pending'
         ORDER BY created_at ASC
         LIMIT $2"
    );
    sqlx::query_as::<_, Transfer>(&query)
        .bind(direction)
        .bind(batch_size)
        .fetch_all(pool)
        .await
        .wrap_err("get_runnable_transfers")
}

/// Retryable FAILED rows whose backoff has elapsed (§4.1 retry policy).
pub async fn get_retryable_transfers(pool: &PgPool, direction: Direction, max_retries: i32) -> Result<Vec<Transfer>> {
    let query = format!(
        "SELECT {TRANSFER_SELECT} FROM transfers
         WHERE direction = $1 AND status = 'failed'
           AND retry_count < $2
           AND (next_retry_at IS NULL OR next_retry_at <= now())
         ORDER BY created_at ASC"
    );
    sqlx::query_as::<_, Transfer>(&query)
        .bind(direction)
        .bind(max_retries)
        .fetch_all(pool)
        .await
        .wrap_err("get_retryable_transfers")
}

/// Rows stuck in a non-terminal, non-PENDING status past the stuck
/// threshold (§4.1 worker crash recovery, §4.4 Monitor stuck report).
pub async fn get_stuck_transfers(pool: &PgPool, stuck_before: DateTime<Utc>) -> Result<Vec<Transfer>> {
    let query = format!(
        "SELECT {TRANSFER_SELECT} FROM transfers
         WHERE status IN ('processing', 'confirming', 'finalizing')
           AND updated_at < $1"
    );
    sqlx::query_as::<_, Transfer>(&query)
        .bind(stuck_before)
        .fetch_all(pool)
        .await
        .wrap_err("get_stuck_transfers")
}

/// Conditional state transition: `UPDATE ... WHERE id=? AND status=<expected>`.
/// Returns whether this caller won the row (§5 ordering guarantees) —
/// the loser must back off rather than retry the same write.
pub async fn transition_transfer(
    pool: &PgPool,
    id: Uuid,
    expected: TransferStatus,
    next: TransferStatus,
    touch: impl FnOnce(&mut sqlx::QueryBuilder<'_, sqlx::Postgres>),
) -> Result<bool> {
    let mut tx = pool.begin().await.wrap_err("begin transition_transfer")?;

    let mut builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new("UPDATE transfers SET status = ");
    builder.push_bind(next);
    builder.push(", updated_at = now()");
    touch(&mut builder);
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status = ");
    builder.push_bind(expected);

    let result = builder.build().execute(&mut *tx).await.wrap_err("conditional update")?;
    if result.rows_affected() == 0 {
        tx.rollback().await.wrap_err("rollback lost transition race")?;
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO transfer_transitions (transfer_id, from_status, to_status) VALUES ($1, $2, $3)",
    )
    .bind(id)
    .bind(expected)
    .bind(next)
    .execute(&mut *tx)
    .await
    .wrap_err("insert transition journal row")?;

    tx.commit().await.wrap_err("commit transition_transfer")?;
    Ok(true)
}

pub async fn record_failure(pool: &PgPool, id: Uuid, error: &str, next_retry_at: DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await.wrap_err("begin record_failure")?;
    let existing: Option<TransferStatus> =
        sqlx::query_scalar("SELECT status FROM transfers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .wrap_err("fetch current status")?;
    let Some(from) = existing else {
        return Ok(false);
    };

    let result = sqlx::query(
        "UPDATE transfers
         SET status = 'failed', last_error = $2, retry_count = retry_count + 1,
             next_retry_at = $3, updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .bind(next_retry_at)
    .execute(&mut *tx)
    .await
    .wrap_err("record_failure update")?;

    if result.rows_affected() == 0 {
        tx.rollback().await.wrap_err("rollback record_failure")?;
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO transfer_transitions (transfer_id, from_status, to_status) VALUES ($1, $2, 'failed')",
    )
    .bind(id)
    .bind(from)
    .execute(&mut *tx)
    .await
    .wrap_err("insert failure transition")?;

    tx.commit().await.wrap_err("commit record_failure")?;
    Ok(true)
}

pub async fn get_transfer_transitions(pool: &PgPool, transfer_id: Uuid) -> Result<Vec<TransferTransition>> {
    sqlx::query_as::<_, TransferTransition>(
        "SELECT id, transfer_id, from_status, to_status, at FROM transfer_transitions
         WHERE transfer_id = $1 ORDER BY at ASC",
    )
    .bind(transfer_id)
    .fetch_all(pool)
    .await
    .wrap_err("get_transfer_transitions")
}

pub async fn count_by_status(pool: &PgPool, direction: Direction, status: TransferStatus) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM transfers WHERE direction = $1 AND status = $2",
    )
    .bind(direction)
    .bind(status)
    .fetch_one(pool)
    .await
    .wrap_err("count_by_status")?;
    Ok(row.0)
}

/// Average wall-clock time from creation to completion for Transfers
/// completed since `since`, in milliseconds (§4.4 Monitor sample).
pub async fn avg_processing_time_ms(pool: &PgPool, direction: Direction, since: DateTime<Utc>) -> Result<Option<f64>> {
    let row: (Option<f64>,) = sqlx::query_as(
        "SELECT AVG(EXTRACT(EPOCH FROM (completed_at - created_at)) * 1000)
         FROM transfers
         WHERE direction = $1 AND status = 'completed' AND completed_at >= $2",
    )
    .bind(direction)
    .bind(since)
    .fetch_one(pool)
    .await
    .wrap_err("avg_processing_time_ms")?;
    Ok(row.0)
}

/// Groups recent Transfers by `source_tx_hash`; any group with more than
/// one row is a double-spend candidate (§4.2 fraud detection).
pub async fn find_duplicate_source_tx_hashes(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT source_tx_hash, COUNT(*) FROM transfers
         WHERE created_at >= $1
         GROUP BY source_tx_hash
         HAVING COUNT(*) > 1",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .wrap_err("find_duplicate_source_tx_hashes")?;
    Ok(rows)
}

pub async fn count_recent_by_principal(pool: &PgPool, principal: &str, since: DateTime<Utc>) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM transfers
         WHERE lower(source_address) = lower($1) AND created_at >= $2",
    )
    .bind(principal)
    .bind(since)
    .fetch_one(pool)
    .await
    .wrap_err("count_recent_by_principal")?;
    Ok(row.0)
}

pub async fn has_reverse_direction_pair(
    pool: &PgPool,
    address_a: &str,
    address_b: &str,
    since: DateTime<Utc>,
) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(
            SELECT 1 FROM transfers a
            JOIN transfers b ON lower(a.source_address) = lower($2) AND lower(b.source_address) = lower($1)
            WHERE lower(a.source_address) = lower($1) AND a.direction = 'deposit'
              AND b.direction = 'withdrawal'
              AND a.created_at >= $3 AND b.created_at >= $3
         )",
    )
    .bind(address_a)
    .bind(address_b)
    .bind(since)
    .fetch_one(pool)
    .await
    .wrap_err("has_reverse_direction_pair")?;
    Ok(row.0)
}

// ---------------------------------------------------------------------
// TokenMap
// ---------------------------------------------------------------------

pub async fn get_token_map_by_source(pool: &PgPool, source_token: &str) -> Result<Option<TokenMap>> {
    sqlx::query_as::<_, TokenMap>(
        "SELECT id, source_token, target_token, symbol, source_decimals, target_decimals,
                enabled_for_deposit, enabled_for_withdrawal, min_per_tx, max_per_tx,
                daily_cap, total_deposited, total_withdrawn
         FROM token_maps WHERE source_token = $1",
    )
    .bind(source_token)
    .fetch_optional(pool)
    .await
    .wrap_err("get_token_map_by_source")
}

pub async fn add_deposited(pool: &PgPool, source_token: &str, amount: &bigdecimal::BigDecimal) -> Result<()> {
    sqlx::query(
        "UPDATE token_maps SET total_deposited = (total_deposited::numeric + $2)::text
         WHERE source_token = $1",
    )
    .bind(source_token)
    .bind(amount)
    .execute(pool)
    .await
    .wrap_err("add_deposited")?;
    Ok(())
}

// ---------------------------------------------------------------------
// Finalizations
// ---------------------------------------------------------------------

const FINALIZATION_SELECT: &str = r#"
    block_number, block_hash, parent_hash, state_root, transactions_root, transaction_count,
    proposer, propose_time, expected_finalization_time, state,
    challenge_id, finalization_tx_hash, finalization_time, error
"#;

/// Inserts a PROPOSED finalization. Idempotent on `block_number` (§4.3
/// "re-proposing an existing number is a no-op").
pub async fn insert_finalization_if_absent(pool: &PgPool, f: &Finalization) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO finalizations (
            block_number, block_hash, parent_hash, state_root, transactions_root, transaction_count,
            proposer, propose_time, expected_finalization_time, state
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'proposed')
        ON CONFLICT (block_number) DO NOTHING
        "#,
    )
    .bind(f.block_number)
    .bind(&f.block_hash)
    .bind(&f.parent_hash)
    .bind(&f.state_root)
    .bind(&f.transactions_root)
    .bind(f.transaction_count)
    .bind(&f.proposer)
    .bind(f.propose_time)
    .bind(f.expected_finalization_time)
    .execute(pool)
    .await
    .wrap_err("insert_finalization_if_absent")?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_finalization(pool: &PgPool, block_number: i64) -> Result<Option<Finalization>> {
    let query = format!("SELECT {FINALIZATION_SELECT} FROM finalizations WHERE block_number = $1");
    sqlx::query_as::<_, Finalization>(&query)
        .bind(block_number)
        .fetch_optional(pool)
        .await
        .wrap_err("get_finalization")
}

/// General-purpose listing for the operator surface (§6 `GET /finalizations`).
pub async fn list_finalizations(pool: &PgPool, limit: i64) -> Result<Vec<Finalization>> {
    let query = format!("SELECT {FINALIZATION_SELECT} FROM finalizations ORDER BY block_number DESC LIMIT $1");
    sqlx::query_as::<_, Finalization>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await
        .wrap_err("list_finalizations")
}

pub async fn get_last_proposed_block(pool: &PgPool) -> Result<Option<i64>> {
    let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(block_number) FROM finalizations")
        .fetch_one(pool)
        .await
        .wrap_err("get_last_proposed_block")?;
    Ok(row.0)
}

/// PROPOSED rows whose challenge window has elapsed, for the restart
/// rescan (§4.3 idempotence).
pub async fn get_expired_proposed(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Finalization>> {
    let query = format!(
        "SELECT {FINALIZATION_SELECT} FROM finalizations
         WHERE state = 'proposed' AND expected_finalization_time < $1
         ORDER BY block_number ASC"
    );
    sqlx::query_as::<_, Finalization>(&query)
        .bind(now)
        .fetch_all(pool)
        .await
        .wrap_err("get_expired_proposed")
}

pub async fn set_finalization_state(pool: &PgPool, block_number: i64, state: FinalizationState) -> Result<()> {
    sqlx::query("UPDATE finalizations SET state = $2 WHERE block_number = $1")
        .bind(block_number)
        .bind(state)
        .execute(pool)
        .await
        .wrap_err("set_finalization_state")?;
    Ok(())
}

pub async fn mark_finalized(pool: &PgPool, block_number: i64, tx_hash: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE finalizations SET state = 'finalized', finalization_tx_hash = $2, finalization_time = $3
         WHERE block_number = $1",
    )
    .bind(block_number)
    .bind(tx_hash)
    .bind(at)
    .execute(pool)
    .await
    .wrap_err("mark_finalized")?;
    Ok(())
}

pub async fn set_challenge(pool: &PgPool, block_number: i64, challenge_id: &str) -> Result<()> {
    sqlx::query("UPDATE finalizations SET state = 'challenged', challenge_id = $2 WHERE block_number = $1")
        .bind(block_number)
        .bind(challenge_id)
        .execute(pool)
        .await
        .wrap_err("set_challenge")?;
    Ok(())
}

pub async fn count_finalizations_by_state(pool: &PgPool, state: FinalizationState) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM finalizations WHERE state = $1")
        .bind(state)
        .fetch_one(pool)
        .await
        .wrap_err("count_finalizations_by_state")?;
    Ok(row.0)
}

// ---------------------------------------------------------------------
// Incidents & emergency halt
// ---------------------------------------------------------------------

pub async fn insert_incident(
    pool: &PgPool,
    kind: IncidentKind,
    description: &str,
    source_subsystem: &str,
    data: serde_json::Value,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO incidents (kind, description, source_subsystem, data) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(kind)
    .bind(description)
    .bind(source_subsystem)
    .bind(data)
    .fetch_one(pool)
    .await
    .wrap_err("insert_incident")?;
    Ok(row.0)
}

pub async fn count_unresolved_incidents(pool: &PgPool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM incidents WHERE resolved = false")
        .fetch_one(pool)
        .await
        .wrap_err("count_unresolved_incidents")?;
    Ok(row.0)
}

pub async fn resolve_incident(pool: &PgPool, id: i64, resolver: &str, note: &str) -> Result<()> {
    sqlx::query(
        "UPDATE incidents SET resolved = true, resolver = $2, resolution_note = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(resolver)
    .bind(note)
    .execute(pool)
    .await
    .wrap_err("resolve_incident")?;
    Ok(())
}

pub async fn list_incidents(pool: &PgPool, resolved: Option<bool>, limit: i64) -> Result<Vec<Incident>> {
    match resolved {
        Some(r) => sqlx::query_as::<_, Incident>(
            "SELECT id, kind, description, source_subsystem, data, created_at, resolved, resolver, resolution_note
             FROM incidents WHERE resolved = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(r)
        .bind(limit)
        .fetch_all(pool)
        .await
        .wrap_err("list_incidents"),
        None => sqlx::query_as::<_, Incident>(
            "SELECT id, kind, description, source_subsystem, data, created_at, resolved, resolver, resolution_note
             FROM incidents ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .wrap_err("list_incidents"),
    }
}

pub async fn get_emergency_halt(pool: &PgPool) -> Result<bool> {
    let row: (String,) = sqlx::query_as("SELECT value FROM bridge_state WHERE key = 'emergency_halt'")
        .fetch_one(pool)
        .await
        .wrap_err("get_emergency_halt")?;
    Ok(row.0 == "true")
}

pub async fn set_emergency_halt(pool: &PgPool, halted: bool) -> Result<()> {
    sqlx::query("UPDATE bridge_state SET value = $1 WHERE key = 'emergency_halt'")
        .bind(halted.to_string())
        .execute(pool)
        .await
        .wrap_err("set_emergency_halt")?;
    Ok(())
}

// ---------------------------------------------------------------------
// Rate-limit buckets (mirrored to the store on every mutation, §5)
// ---------------------------------------------------------------------

pub async fn get_rate_limit_bucket(pool: &PgPool, principal: &str, direction: Direction) -> Result<Option<RateLimitBucket>> {
    sqlx::query_as::<_, RateLimitBucket>(
        "SELECT principal, direction, count, window_start, blocked_until
         FROM rate_limit_buckets WHERE principal = $1 AND direction = $2",
    )
    .bind(principal)
    .bind(direction)
    .fetch_optional(pool)
    .await
    .wrap_err("get_rate_limit_bucket")
}

/// All persisted buckets, for restoring `RateLimiter`'s in-memory map on
/// startup (§5 "mirrored to the Store... so a restart preserves intent").
pub async fn list_rate_limit_buckets(pool: &PgPool) -> Result<Vec<RateLimitBucket>> {
    sqlx::query_as::<_, RateLimitBucket>(
        "SELECT principal, direction, count, window_start, blocked_until FROM rate_limit_buckets",
    )
    .fetch_all(pool)
    .await
    .wrap_err("list_rate_limit_buckets")
}

pub async fn upsert_rate_limit_bucket(pool: &PgPool, bucket: &RateLimitBucket) -> Result<()> {
    sqlx::query(
        "INSERT INTO rate_limit_buckets (principal, direction, count, window_start, blocked_until)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (principal, direction) DO UPDATE
         SET count = $3, window_start = $4, blocked_until = $5",
    )
    .bind(&bucket.principal)
    .bind(bucket.direction)
    .bind(bucket.count)
    .bind(bucket.window_start)
    .bind(bucket.blocked_until)
    .execute(pool)
    .await
    .wrap_err("upsert_rate_limit_bucket")?;
    Ok(())
}

// ---------------------------------------------------------------------
// Ingestion watermarks (§4.1: `last_scanned` advances only after the
// whole range is persisted, in the same transaction as the inserts)
// ---------------------------------------------------------------------

fn last_scanned_key(direction: Direction) -> String {
    format!("last_scanned:{direction:?}")
}

/// Inserts a whole batch of ingested Transfers and advances
/// `last_scanned` in one transaction (§4.1, §5 ordering guarantees).
/// Duplicate `(direction, source_tx_hash)` rows are silently skipped
/// and counted in the returned duplicate count (§4.1 "counted for
/// monitoring").
pub async fn ingest_batch(pool: &PgPool, direction: Direction, news: &[NewTransfer], new_last_scanned: i64) -> Result<(usize, usize)> {
    let mut tx = pool.begin().await.wrap_err("begin ingest_batch")?;
    let mut inserted = 0usize;
    let mut duplicates = 0usize;

    for new in news {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO transfers (
                id, direction, status,
                source_chain, source_address, source_token, source_tx_hash, source_block_number, source_confirmations,
                target_chain, target_address, value, attestation, metadata
            ) VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, 0, $8, $9, $10, $11, $12)
            ON CONFLICT (direction, source_tx_hash) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(new.direction)
        .bind(&new.source_chain)
        .bind(&new.source_address)
        .bind(&new.source_token)
        .bind(&new.source_tx_hash)
        .bind(new.source_block_number)
        .bind(&new.target_chain)
        .bind(&new.target_address)
        .bind(&new.value)
        .bind(&new.attestation)
        .bind(&new.metadata)
        .execute(&mut *tx)
        .await
        .wrap_err("ingest_batch insert transfer")?;

        if result.rows_affected() == 0 {
            duplicates += 1;
            continue;
        }
        inserted += 1;

        sqlx::query(
            "INSERT INTO transfer_transitions (transfer_id, from_status, to_status) VALUES ($1, NULL, 'pending')",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .wrap_err("ingest_batch insert transition")?;
    }

    set_last_scanned_tx(&mut tx, direction, new_last_scanned).await?;

    tx.commit().await.wrap_err("commit ingest_batch")?;
    Ok((inserted, duplicates))
}

pub async fn get_last_scanned(pool: &PgPool, direction: Direction) -> Result<Option<i64>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM bridge_state WHERE key = $1")
        .bind(last_scanned_key(direction))
        .fetch_optional(pool)
        .await
        .wrap_err("get_last_scanned")?;
    Ok(row.and_then(|(v,)| v.parse().ok()))
}

/// Sets `last_scanned` in the same transaction as the batch's Transfer
/// inserts, which the ingestion driver performs by calling
/// `insert_transfer_if_absent` for each event and then this function
/// within one `sqlx::Transaction` it owns.
pub async fn set_last_scanned_tx(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, direction: Direction, block: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO bridge_state (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = $2",
    )
    .bind(last_scanned_key(direction))
    .bind(block.to_string())
    .execute(&mut **tx)
    .await
    .wrap_err("set_last_scanned_tx")?;
    Ok(())
}

pub async fn gc_stale_rate_limit_buckets(pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM rate_limit_buckets WHERE window_start < $1 AND count = 0",
    )
    .bind(older_than)
    .execute(pool)
    .await
    .wrap_err("gc_stale_rate_limit_buckets")?;
    Ok(result.rows_affected())
}
