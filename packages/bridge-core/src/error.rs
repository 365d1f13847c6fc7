//! Error taxonomy (§7). Matched on by the admission pipeline and the
//! operator HTTP surface; transient adapter errors are recovered locally
//! by the pipeline and never escape as incidents.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("token not supported or not enabled for this direction")]
    UnsupportedToken,

    #[error("recipient address failed the syntactic check for the target chain")]
    InvalidRecipient,

    #[error("signature does not recover to the claimed principal")]
    InvalidSignature,

    #[error("principal is blocklisted")]
    Blocklisted,

    #[error("rate limit exceeded for this principal")]
    RateLimited,

    #[error("value exceeds the configured cap")]
    ValueExceedsCap,

    #[error("emergency halt is active")]
    EmergencyHalt,

    #[error("adapter error: {0}")]
    AdapterError(String),

    #[error("no active token map for this token")]
    TokenMapMissing,

    #[error("failed to create associated token account")]
    AssociatedAccountFailure,

    #[error("finalization was invalidated by a winning challenge")]
    ChallengeLost,

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl BridgeError {
    /// Short string form for user-facing status endpoints (§7: "project
    /// errors to a short string; internal audit logs retain full context").
    pub fn as_kind(&self) -> &'static str {
        match self {
            BridgeError::UnsupportedToken => "unsupported_token",
            BridgeError::InvalidRecipient => "invalid_recipient",
            BridgeError::InvalidSignature => "invalid_signature",
            BridgeError::Blocklisted => "blocklisted",
            BridgeError::RateLimited => "rate_limited",
            BridgeError::ValueExceedsCap => "value_exceeds_cap",
            BridgeError::EmergencyHalt => "emergency_halt",
            BridgeError::AdapterError(_) => "adapter_error",
            BridgeError::TokenMapMissing => "token_map_missing",
            BridgeError::AssociatedAccountFailure => "associated_account_failure",
            BridgeError::ChallengeLost => "challenge_lost",
            BridgeError::InternalInvariant(_) => "internal_invariant",
        }
    }

    /// Admission failures are synchronous and never create a retryable
    /// Transfer row — the remaining kinds are durable, per-Transfer states.
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::UnsupportedToken
                | BridgeError::InvalidRecipient
                | BridgeError::InvalidSignature
                | BridgeError::Blocklisted
                | BridgeError::RateLimited
                | BridgeError::ValueExceedsCap
                | BridgeError::EmergencyHalt
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
