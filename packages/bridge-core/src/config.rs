//! Configuration (§6, §10.1). Loaded from the environment, with an
//! optional `.env` file loaded first and tolerated if absent. Required
//! keys missing from the environment are a hard startup error naming
//! the key; optional keys fall back to the documented defaults below.

use std::env;
use std::fmt;

use eyre::{eyre, Result};

#[derive(Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub chain_a: ChainAConfig,
    pub chain_b: ChainBConfig,
    pub pool: PoolConfig,
    pub poll: PollConfig,
    pub retry: RetryConfig,
    pub confirmations: ConfirmationsConfig,
    pub finalization: FinalizationConfig,
    pub safety: SafetyConfig,
    pub monitor: MonitorConfig,
    pub operator_bind_addr: String,
    pub operator_auth_token: String,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[redacted]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Clone)]
pub struct ChainAConfig {
    pub rpc_url: String,
    pub bridge_address: String,
    pub private_key: String,
}

impl fmt::Debug for ChainAConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainAConfig")
            .field("rpc_url", &self.rpc_url)
            .field("bridge_address", &self.bridge_address)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

#[derive(Clone)]
pub struct ChainBConfig {
    pub lcd_url: String,
    pub bridge_address: String,
    pub mnemonic: String,
}

impl fmt::Debug for ChainBConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBConfig")
            .field("lcd_url", &self.lcd_url)
            .field("bridge_address", &self.bridge_address)
            .field("mnemonic", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub deposit_workers: usize,
    pub withdrawal_workers: usize,
    pub finalization_workers: usize,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub batch_size: i64,
    pub max_blocks_per_batch: u64,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max: u32,
    pub delay_ms: u64,
    pub stuck_threshold_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ConfirmationsConfig {
    pub source: i64,
    pub target: i64,
}

#[derive(Debug, Clone)]
pub struct FinalizationConfig {
    pub period_ms: u64,
    pub challenge_window_s: i64,
    pub max_blocks_per_batch: u64,
}

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub rate_limit_window_ms: i64,
    pub rate_limit_max: i32,
    pub cooldown_ms: i64,
    pub max_value_per_tx: String,
    pub daily_cap_enabled: bool,
    pub emergency_threshold: i64,
    pub allowlist_enabled: bool,
    pub large_transaction_threshold: String,
    pub suspicious_window_ms: i64,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sample_interval_ms: u64,
    pub failure_rate_threshold: f64,
    pub avg_processing_time_threshold_ms: i64,
    pub stuck_threshold_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Best-effort: a missing .env is normal in production.
        let _ = dotenvy::dotenv();
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        Ok(Config {
            database: DatabaseConfig {
                url: require_env("DATABASE_URL")?,
                max_connections: optional_env("DATABASE_MAX_CONNECTIONS", 10),
            },
            chain_a: ChainAConfig {
                rpc_url: require_env("CHAIN_A_RPC_URL")?,
                bridge_address: require_env("CHAIN_A_BRIDGE_ADDRESS")?,
                private_key: require_env("CHAIN_A_PRIVATE_KEY")?,
            },
            chain_b: ChainBConfig {
                lcd_url: require_env("CHAIN_B_LCD_URL")?,
                bridge_address: require_env("CHAIN_B_BRIDGE_ADDRESS")?,
                mnemonic: require_env("CHAIN_B_MNEMONIC")?,
            },
            pool: PoolConfig {
                deposit_workers: optional_env("POOL_DEPOSIT_WORKERS", default_workers()),
                withdrawal_workers: optional_env("POOL_WITHDRAWAL_WORKERS", default_workers()),
                finalization_workers: optional_env("POOL_FINALIZATION_WORKERS", 1),
            },
            poll: PollConfig {
                interval_ms: optional_env("POLL_INTERVAL_MS", 5_000),
                batch_size: optional_env("POLL_BATCH_SIZE", 50),
                max_blocks_per_batch: optional_env("POLL_MAX_BLOCKS_PER_BATCH", 2_000),
            },
            retry: RetryConfig {
                max: optional_env("RETRY_MAX", 5),
                delay_ms: optional_env("RETRY_DELAY_MS", 30_000),
                stuck_threshold_ms: optional_env("STUCK_THRESHOLD_MS", 600_000),
            },
            confirmations: ConfirmationsConfig {
                source: optional_env("CONFIRMATIONS_SOURCE", 12),
                target: optional_env("CONFIRMATIONS_TARGET", 32),
            },
            finalization: FinalizationConfig {
                period_ms: optional_env("FINALIZATION_PERIOD_MS", 15_000),
                challenge_window_s: optional_env("FINALIZATION_CHALLENGE_WINDOW_S", 3_600),
                max_blocks_per_batch: optional_env("FINALIZATION_MAX_BLOCKS_PER_BATCH", 100),
            },
            safety: SafetyConfig {
                rate_limit_window_ms: optional_env("SAFETY_RATE_LIMIT_WINDOW_MS", 3_600_000),
                rate_limit_max: optional_env("SAFETY_RATE_LIMIT_MAX", 20),
                cooldown_ms: optional_env("SAFETY_COOLDOWN_MS", 900_000),
                max_value_per_tx: env::var("SAFETY_MAX_VALUE_PER_TX")
                    .unwrap_or_else(|_| "1000000000000000000000".to_string()),
                daily_cap_enabled: optional_env("SAFETY_DAILY_CAP_ENABLED", true),
                emergency_threshold: optional_env("SAFETY_EMERGENCY_THRESHOLD", 10),
                allowlist_enabled: optional_env("SAFETY_ALLOWLIST_ENABLED", false),
                large_transaction_threshold: env::var("SAFETY_LARGE_TRANSACTION_THRESHOLD")
                    .unwrap_or_else(|_| "100000000000000000000".to_string()),
                suspicious_window_ms: optional_env("SAFETY_SUSPICIOUS_WINDOW_MS", 300_000),
            },
            monitor: MonitorConfig {
                sample_interval_ms: optional_env("MONITOR_SAMPLE_INTERVAL_MS", 60_000),
                failure_rate_threshold: optional_env("MONITOR_FAILURE_RATE_THRESHOLD", 0.1),
                avg_processing_time_threshold_ms: optional_env(
                    "MONITOR_AVG_PROCESSING_TIME_THRESHOLD_MS",
                    300_000,
                ),
                stuck_threshold_ms: optional_env("MONITOR_STUCK_THRESHOLD_MS", 600_000),
            },
            operator_bind_addr: env::var("OPERATOR_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            operator_auth_token: require_env("OPERATOR_AUTH_TOKEN")?,
        })
    }

    /// Cross-field validation, run once after load. Fails fast with a
    /// descriptive error rather than letting a bad config surface later
    /// as a confusing runtime failure.
    pub fn validate(&self) -> Result<()> {
        if self.pool.deposit_workers == 0 || self.pool.withdrawal_workers == 0 {
            return Err(eyre!("pool worker counts must be non-zero"));
        }
        if self.confirmations.source <= 0 || self.confirmations.target <= 0 {
            return Err(eyre!("confirmation counts must be positive"));
        }
        if self.safety.rate_limit_window_ms <= 0 {
            return Err(eyre!("safety.rate_limit.window_ms must be positive"));
        }
        if self.finalization.challenge_window_s <= 0 {
            return Err(eyre!("finalization.challenge_window_s must be positive"));
        }
        if self.retry.max == 0 {
            return Err(eyre!("retry.max must be at least 1"));
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| eyre!("{key} environment variable is required"))
}

fn optional_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".into(),
                max_connections: 10,
            },
            chain_a: ChainAConfig {
                rpc_url: "http://localhost:8545".into(),
                bridge_address: "0xbridge".into(),
                private_key: "0xsecretkey".into(),
            },
            chain_b: ChainBConfig {
                lcd_url: "http://localhost:1317".into(),
                bridge_address: "chain1".into(),
                mnemonic: "correct horse battery staple".into(),
            },
            pool: PoolConfig {
                deposit_workers: 2,
                withdrawal_workers: 2,
                finalization_workers: 1,
            },
            poll: PollConfig {
                interval_ms: 5_000,
                batch_size: 50,
                max_blocks_per_batch: 2_000,
            },
            retry: RetryConfig {
                max: 5,
                delay_ms: 30_000,
                stuck_threshold_ms: 600_000,
            },
            confirmations: ConfirmationsConfig { source: 12, target: 32 },
            finalization: FinalizationConfig {
                period_ms: 15_000,
                challenge_window_s: 3_600,
                max_blocks_per_batch: 100,
            },
            safety: SafetyConfig {
                rate_limit_window_ms: 3_600_000,
                rate_limit_max: 20,
                cooldown_ms: 900_000,
                max_value_per_tx: "1000".into(),
                daily_cap_enabled: true,
                emergency_threshold: 10,
                allowlist_enabled: false,
                large_transaction_threshold: "500".into(),
                suspicious_window_ms: 300_000,
            },
            monitor: MonitorConfig {
                sample_interval_ms: 60_000,
                failure_rate_threshold: 0.1,
                avg_processing_time_threshold_ms: 300_000,
                stuck_threshold_ms: 600_000,
            },
            operator_bind_addr: "0.0.0.0:8080".into(),
            operator_auth_token: "test-token".into(),
        }
    }

    #[test]
    fn validate_accepts_a_sane_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut c = base_config();
        c.pool.deposit_workers = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_confirmations() {
        let mut c = base_config();
        c.confirmations.source = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = base_config();
        assert!(!format!("{:?}", c.chain_a).contains(&c.chain_a.private_key));
        assert!(!format!("{:?}", c.chain_b).contains(&c.chain_b.mnemonic));
        assert!(format!("{:?}", c.database).contains("[redacted]"));
    }
}
