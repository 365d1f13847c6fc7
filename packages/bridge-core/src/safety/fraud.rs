//! Periodic fraud detection (§4.2), independent of admission. The sweep
//! reads the Store directly; the adjacency check below is pure so it
//! can be tested without a database (§9 open question 3: this walks
//! the real `transfer_transitions` journal, not a dummy history).

use chrono::{DateTime, Utc};
use eyre::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store;
use crate::types::{IncidentKind, TransferStatus, TransferTransition};

#[derive(Debug, Clone)]
pub struct FraudFinding {
    pub kind: IncidentKind,
    pub description: String,
    pub data: serde_json::Value,
}

/// Validates one transfer's transition history against the §4.1
/// adjacency list. Returns the first illegal edge found, if any.
pub fn find_invalid_transition(transfer_id: Uuid, history: &[TransferTransition]) -> Option<FraudFinding> {
    for window in history.windows(2) {
        let (prev, next) = (&window[0], &window[1]);
        if next.from_status != Some(prev.to_status) {
            // Journal itself is inconsistent; treat as an invariant break.
            return Some(FraudFinding {
                kind: IncidentKind::InvalidStateTransition,
                description: format!("transition journal inconsistent for transfer {transfer_id}"),
                data: serde_json::json!({ "transfer_id": transfer_id }),
            });
        }
        let legal = prev.to_status.legal_next();
        if !legal.contains(&next.to_status) {
            return Some(FraudFinding {
                kind: IncidentKind::InvalidStateTransition,
                description: format!(
                    "illegal transition {:?} -> {:?} for transfer {transfer_id}",
                    prev.to_status, next.to_status
                ),
                data: serde_json::json!({
                    "transfer_id": transfer_id,
                    "from": format!("{:?}", prev.to_status),
                    "to": format!("{:?}", next.to_status),
                }),
            });
        }
    }
    None
}

/// Runs the full sweep against the Store: double-spend grouping,
/// per-transfer invalid-transition checks, and value-threshold checks
/// are driven from here; suspicious-pattern detection lives alongside
/// admission since it needs the same principal/window data.
pub async fn sweep_double_spend(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<FraudFinding>> {
    let dupes = store::find_duplicate_source_tx_hashes(pool, since).await?;
    Ok(dupes
        .into_iter()
        .map(|(hash, count)| FraudFinding {
            kind: IncidentKind::DoubleSpendAttempt,
            description: format!("{count} transfers share source_tx_hash {hash}"),
            data: serde_json::json!({ "source_tx_hash": hash, "count": count }),
        })
        .collect())
}

pub async fn sweep_invalid_transitions(pool: &PgPool, transfer_ids: &[Uuid]) -> Result<Vec<FraudFinding>> {
    let mut findings = Vec::new();
    for id in transfer_ids {
        let history = store::get_transfer_transitions(pool, *id).await?;
        if let Some(finding) = find_invalid_transition(*id, &history) {
            findings.push(finding);
        }
    }
    Ok(findings)
}

pub fn check_large_transaction(value: &bigdecimal::BigDecimal, threshold: &bigdecimal::BigDecimal) -> Option<FraudFinding> {
    if value > threshold {
        Some(FraudFinding {
            kind: IncidentKind::LargeTransaction,
            description: format!("transfer value {value} exceeds large-transaction threshold {threshold}"),
            data: serde_json::json!({ "value": value.to_string() }),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn transition(id: i64, transfer_id: Uuid, from: Option<TransferStatus>, to: TransferStatus, secs: i64) -> TransferTransition {
        TransferTransition {
            id,
            transfer_id,
            from_status: from,
            to_status: to,
            at: at(secs),
        }
    }

    #[test]
    fn legal_history_raises_nothing() {
        let id = Uuid::new_v4();
        let history = vec![
            transition(1, id, None, TransferStatus::Pending, 0),
            transition(2, id, Some(TransferStatus::Pending), TransferStatus::Processing, 1),
            transition(3, id, Some(TransferStatus::Processing), TransferStatus::Confirming, 2),
        ];
        assert!(find_invalid_transition(id, &history).is_none());
    }

    #[test]
    fn skipping_a_required_state_is_flagged() {
        let id = Uuid::new_v4();
        let history = vec![
            transition(1, id, None, TransferStatus::Pending, 0),
            transition(2, id, Some(TransferStatus::Pending), TransferStatus::Completed, 1),
        ];
        let finding = find_invalid_transition(id, &history).unwrap();
        assert_eq!(finding.kind, IncidentKind::InvalidStateTransition);
    }

    #[test]
    fn retry_edge_from_failed_to_pending_is_legal() {
        let id = Uuid::new_v4();
        let history = vec![
            transition(1, id, None, TransferStatus::Pending, 0),
            transition(2, id, Some(TransferStatus::Pending), TransferStatus::Failed, 1),
            transition(3, id, Some(TransferStatus::Failed), TransferStatus::Pending, 2),
        ];
        assert!(find_invalid_transition(id, &history).is_none());
    }

    #[test]
    fn large_transaction_above_threshold_is_flagged_but_value_equal_is_not() {
        let threshold = bigdecimal::BigDecimal::from_str("1000").unwrap();
        let over = bigdecimal::BigDecimal::from_str("1001").unwrap();
        let equal = bigdecimal::BigDecimal::from_str("1000").unwrap();
        assert!(check_large_transaction(&over, &threshold).is_some());
        assert!(check_large_transaction(&equal, &threshold).is_none());
    }
}
