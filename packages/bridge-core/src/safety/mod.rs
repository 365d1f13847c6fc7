//! Safety Controller (C4, §4.2): admission pipeline, rate limiting,
//! allow/block lists, value caps, fraud detection, emergency halt, and
//! signature verification.

pub mod fraud;
pub mod rate_limit;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::Utc;
use eyre::Result as EyreResult;
use sqlx::PgPool;

use crate::cache::{signature_cache_key, KvCache};
use crate::config::SafetyConfig;
use crate::error::{BridgeError, Result};
use crate::store;
use crate::types::{Direction, IncidentKind};
use rate_limit::{Admission, RateLimiter};

/// The emergency-halt flag is the one piece of shared mutable state
/// with real mutual exclusion (§5 locking discipline) — everything else
/// goes through the per-row conditional update in the Store.
pub struct SafetyController {
    config: SafetyConfig,
    halted: Mutex<bool>,
    rate_limiter: Mutex<RateLimiter>,
    allowlist: Mutex<HashSet<String>>,
    blocklist: Mutex<HashSet<String>>,
}

impl SafetyController {
    pub fn new(config: SafetyConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_window_ms, config.rate_limit_max, config.cooldown_ms);
        Self {
            halted: Mutex::new(false),
            rate_limiter: Mutex::new(rate_limiter),
            allowlist: Mutex::new(HashSet::new()),
            blocklist: Mutex::new(HashSet::new()),
            config,
        }
    }

    /// Restores in-memory state from the Store on startup (§5: a
    /// restart preserves the operator's intent), including rate-limit
    /// buckets so cooldowns survive a restart.
    pub async fn load_from_store(&self, pool: &PgPool) -> EyreResult<()> {
        let halted = store::get_emergency_halt(pool).await?;
        *self.halted.lock().unwrap() = halted;

        let buckets = store::list_rate_limit_buckets(pool).await?;
        let mut rate_limiter = self.rate_limiter.lock().unwrap();
        for bucket in buckets {
            rate_limiter.load_bucket(bucket);
        }
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.lock().unwrap()
    }

    pub fn add_to_allowlist(&self, principal: &str) {
        self.allowlist.lock().unwrap().insert(principal.to_lowercase());
    }

    pub fn add_to_blocklist(&self, principal: &str) {
        self.blocklist.lock().unwrap().insert(principal.to_lowercase());
    }

    /// Fixed check order (§4.2): emergency_halt -> allowlist (if
    /// enabled) -> blocklist -> rate_limit -> value_cap. The first
    /// failing rule determines the reject kind.
    pub async fn admit(&self, pool: &PgPool, direction: Direction, principal: &str, value: &str) -> Result<()> {
        if self.is_halted() {
            return Err(BridgeError::EmergencyHalt);
        }

        let normalized = principal.to_lowercase();

        if self.config.allowlist_enabled && !self.allowlist.lock().unwrap().contains(&normalized) {
            return Err(BridgeError::Blocklisted);
        }

        if self.blocklist.lock().unwrap().contains(&normalized) {
            if let Err(e) = store::insert_incident(
                pool,
                IncidentKind::BlocklistedAddress,
                &format!("blocklisted principal {normalized} attempted {direction:?}"),
                "safety_controller",
                serde_json::json!({ "principal": normalized, "direction": format!("{direction:?}") }),
            )
            .await
            {
                tracing::error!(error = %e, "failed to record blocklist incident");
            }
            return Err(BridgeError::Blocklisted);
        }

        let now = Utc::now();
        let (admission, bucket) = self.rate_limiter.lock().unwrap().check(&normalized, direction, now);
        if let Err(e) = store::upsert_rate_limit_bucket(pool, &bucket).await {
            tracing::error!(error = %e, "failed to mirror rate-limit bucket to store");
        }
        if admission == Admission::Blocked {
            return Err(BridgeError::RateLimited);
        }

        let value_big = BigDecimal::from_str(value).map_err(|_| BridgeError::InternalInvariant("non-numeric value".into()))?;
        let cap = BigDecimal::from_str(&self.config.max_value_per_tx)
            .map_err(|_| BridgeError::InternalInvariant("non-numeric max_value_per_tx config".into()))?;
        if value_big > cap {
            return Err(BridgeError::ValueExceedsCap);
        }

        Ok(())
    }

    /// Sets the halt flag, mirrors it to the Store, and raises the
    /// corresponding incident (§4.2).
    pub async fn trigger_emergency_halt(&self, pool: &PgPool, reason: &str) -> EyreResult<()> {
        *self.halted.lock().unwrap() = true;
        store::set_emergency_halt(pool, true).await?;
        store::insert_incident(
            pool,
            IncidentKind::EmergencyHalt,
            reason,
            "safety_controller",
            serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    /// Checks whether the unresolved-incident count has crossed the
    /// emergency threshold and halts if so (§4.2).
    pub async fn check_emergency_threshold(&self, pool: &PgPool) -> EyreResult<()> {
        if self.is_halted() {
            return Ok(());
        }
        let unresolved = store::count_unresolved_incidents(pool).await?;
        if unresolved >= self.config.emergency_threshold {
            self.trigger_emergency_halt(
                pool,
                &format!("unresolved incident count {unresolved} reached threshold {}", self.config.emergency_threshold),
            )
            .await?;
        }
        Ok(())
    }

    /// Explicit, authenticated operator action (§4.2): clears the flag
    /// and resolves the halt incident.
    pub async fn clear_emergency_halt(&self, pool: &PgPool, resolver: &str, note: &str) -> EyreResult<()> {
        *self.halted.lock().unwrap() = false;
        store::set_emergency_halt(pool, false).await?;
        let incidents = store::list_incidents(pool, Some(false), 1000).await?;
        for incident in incidents.into_iter().filter(|i| i.kind == IncidentKind::EmergencyHalt) {
            store::resolve_incident(pool, incident.id, resolver, note).await?;
        }
        Ok(())
    }

    /// Memoized signature verification (§4.2): recovers via the
    /// chain-appropriate scheme and caches the boolean result for 24h.
    pub fn verify_signature(
        &self,
        cache: &mut KvCache,
        chain_is_a: bool,
        message: &[u8],
        signature: &[u8],
        claimed_principal: &str,
    ) -> Result<bool> {
        let msg_hash = bridge_types::hash::keccak256(message);
        let key = signature_cache_key(&msg_hash, signature, claimed_principal);

        if let Some(cached) = cache.get(&key) {
            return Ok(cached == b"1");
        }

        let valid = if chain_is_a {
            let claimed = bridge_types::EvmAddress::from_hex(claimed_principal)
                .map_err(|_| BridgeError::InvalidSignature)?;
            bridge_types::sig::verify_evm_signature(message, signature, &claimed).unwrap_or(false)
        } else {
            // Chain-B principal is assumed to be a hex-encoded ed25519 public key here;
            // the adapter is responsible for any chain-specific address encoding.
            let pubkey = hex::decode(claimed_principal.trim_start_matches("0x")).unwrap_or_default();
            bridge_types::sig::verify_chain_b_signature(message, signature, &pubkey).unwrap_or(false)
        };

        cache.set(&key, if valid { b"1".to_vec() } else { b"0".to_vec() }, Duration::from_secs(86_400));

        if !valid {
            return Err(BridgeError::InvalidSignature);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;

    fn config() -> SafetyConfig {
        SafetyConfig {
            rate_limit_window_ms: 3_600_000,
            rate_limit_max: 20,
            cooldown_ms: 900_000,
            max_value_per_tx: "1000".to_string(),
            daily_cap_enabled: true,
            emergency_threshold: 10,
            allowlist_enabled: false,
            large_transaction_threshold: "500".to_string(),
            suspicious_window_ms: 300_000,
        }
    }

    #[test]
    fn halt_starts_false() {
        let controller = SafetyController::new(config());
        assert!(!controller.is_halted());
    }

    #[test]
    fn signature_cache_hits_skip_recomputation() {
        let controller = SafetyController::new(config());
        let mut cache = KvCache::new(CacheConfig::default());
        let key = signature_cache_key(&bridge_types::hash::keccak256(b"msg"), b"sig", "0xabc");
        cache.set(&key, b"1".to_vec(), Duration::from_secs(60));
        let result = controller.verify_signature(&mut cache, true, b"msg", b"sig", "0xabc");
        assert_eq!(result.unwrap(), true);
    }

    #[test]
    fn signature_cache_negative_hit_returns_invalid_signature() {
        let controller = SafetyController::new(config());
        let mut cache = KvCache::new(CacheConfig::default());
        let key = signature_cache_key(&bridge_types::hash::keccak256(b"msg"), b"sig", "0xabc");
        cache.set(&key, b"0".to_vec(), Duration::from_secs(60));
        let result = controller.verify_signature(&mut cache, true, b"msg", b"sig", "0xabc");
        assert!(matches!(result, Err(BridgeError::InvalidSignature)));
    }
}
