//! Domain types for the bridge (§3). Status enums derive `sqlx::Type` so
//! the store layer can bind and fetch them directly as Postgres `VARCHAR`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a cross-chain value movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Deposit,
    Withdrawal,
}

/// Transfer Pipeline state machine (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Processing,
    Confirming,
    Finalizing,
    Completed,
    Failed,
}

impl TransferStatus {
    /// Adjacency list for the §4.1 diagram, used both to drive the
    /// worker state machine and to validate the transition journal
    /// during fraud detection (§9 open question 3).
    pub fn legal_next(self) -> &'static [TransferStatus] {
        use TransferStatus::*;
        match self {
            Pending => &[Processing, Failed],
            Processing => &[Confirming, Failed],
            Confirming => &[Finalizing, Failed],
            Finalizing => &[Completed, Failed],
            Completed => &[],
            // FAILED -> PENDING on retry is the only edge back out of a terminal-for-now state.
            Failed => &[Pending],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed)
    }
}

/// One row per cross-chain value movement (§3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub direction: Direction,
    pub status: TransferStatus,

    pub source_chain: String,
    pub source_address: String,
    pub source_token: String,
    pub source_tx_hash: String,
    pub source_block_number: i64,
    pub source_confirmations: i64,

    pub target_chain: String,
    pub target_address: String,
    pub target_token: Option<String>,
    pub target_tx_hash: Option<String>,
    pub target_block_number: Option<i64>,

    /// Base-units value, string-encoded bigint.
    pub value: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub attestation: Option<String>,

    pub last_error: Option<String>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,

    pub metadata: serde_json::Value,
}

/// Fields required to create a new Transfer (PENDING, no side-effect yet).
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub direction: Direction,
    pub source_chain: String,
    pub source_address: String,
    pub source_token: String,
    pub source_tx_hash: String,
    pub source_block_number: i64,
    pub target_chain: String,
    pub target_address: String,
    pub value: String,
    pub attestation: Option<String>,
    pub metadata: serde_json::Value,
}

/// Append-only transition journal row (§3, §9 open question 3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TransferTransition {
    pub id: i64,
    pub transfer_id: Uuid,
    pub from_status: Option<TransferStatus>,
    pub to_status: TransferStatus,
    pub at: DateTime<Utc>,
}

/// Bijective pairing between source-side and target-side token identities.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TokenMap {
    pub id: i64,
    pub source_token: String,
    pub target_token: String,
    pub symbol: String,
    pub source_decimals: i16,
    pub target_decimals: i16,
    pub enabled_for_deposit: bool,
    pub enabled_for_withdrawal: bool,
    pub min_per_tx: String,
    pub max_per_tx: String,
    pub daily_cap: Option<String>,
    pub total_deposited: String,
    pub total_withdrawn: String,
}

/// Finalization Engine state machine (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum FinalizationState {
    Proposed,
    Challenged,
    Finalized,
    Invalidated,
}

/// One row per Chain-B block proposed to Chain-A (§3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Finalization {
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub transactions_root: String,
    pub transaction_count: i32,
    pub proposer: String,
    pub propose_time: DateTime<Utc>,
    pub expected_finalization_time: DateTime<Utc>,
    pub state: FinalizationState,
    pub challenge_id: Option<String>,
    pub finalization_tx_hash: Option<String>,
    pub finalization_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Kind of security incident (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
pub enum IncidentKind {
    BlocklistedAddress,
    DoubleSpendAttempt,
    InvalidStateTransition,
    SuspiciousTransaction,
    LargeTransaction,
    ChallengeLost,
    EmergencyHalt,
}

/// A security event (§3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub kind: IncidentKind,
    pub description: String,
    pub source_subsystem: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolver: Option<String>,
    pub resolution_note: Option<String>,
}

/// Sliding-window rate-limit counter (§4.2).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RateLimitBucket {
    pub principal: String,
    pub direction: Direction,
    pub count: i32,
    pub window_start: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Fraud-detection challenge kinds the Finalization Engine verifies (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    InvalidStateRoot,
    InvalidTxRoot,
    InvalidParentHash,
    InvalidTx(usize),
    Unknown,
}

impl ChallengeKind {
    pub fn from_tag(tag: &str, index: Option<usize>) -> Self {
        match tag {
            "invalid_state_root" => ChallengeKind::InvalidStateRoot,
            "invalid_tx_root" => ChallengeKind::InvalidTxRoot,
            "invalid_parent_hash" => ChallengeKind::InvalidParentHash,
            "invalid_tx" => ChallengeKind::InvalidTx(index.unwrap_or(usize::MAX)),
            _ => ChallengeKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_form_the_expected_diagram() {
        assert_eq!(
            TransferStatus::Pending.legal_next(),
            &[TransferStatus::Processing, TransferStatus::Failed]
        );
        assert_eq!(TransferStatus::Completed.legal_next(), &[] as &[TransferStatus]);
        assert_eq!(TransferStatus::Failed.legal_next(), &[TransferStatus::Pending]);
    }

    #[test]
    fn completed_is_the_only_terminal_status() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(!TransferStatus::Failed.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
    }

    #[test]
    fn challenge_kind_unknown_tags_are_treated_as_invalid_challenge() {
        assert_eq!(ChallengeKind::from_tag("bogus", None), ChallengeKind::Unknown);
    }
}
