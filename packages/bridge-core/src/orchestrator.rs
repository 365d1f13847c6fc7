//! Orchestrator (C8, §4.5): owns the lifecycle of the ingestion,
//! worker, finalization, and monitor loops, grounded on the operator's
//! `main.rs` shutdown-channel pattern but packaged as a reusable type
//! instead of free functions in `main`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapter::ChainAdapter;
use crate::cache::KvCache;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::monitor::Monitor;
use crate::pipeline::retry::RetryPolicy;
use crate::safety::SafetyController;
use crate::types::Direction;
use crate::{finalization, pipeline, store};

/// Adapters and shared state the orchestrator drives loops against.
/// `chain_a`/`chain_b` are boxed trait objects so the crate stays
/// agnostic to the concrete RPC/signing implementation (§1 non-goal).
pub struct Engine {
    pub pool: PgPool,
    pub chain_a: Arc<dyn ChainAdapter>,
    pub chain_b: Arc<dyn ChainAdapter>,
    pub safety: Arc<SafetyController>,
    pub monitor: Arc<Monitor>,
    pub cache: Arc<std::sync::Mutex<KvCache>>,
    pub config: Config,
    pub metrics: Arc<Metrics>,
}

pub struct Orchestrator {
    engine: Arc<Engine>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Takes a shared `Engine` so callers (e.g. the operator's HTTP
    /// handlers) can hold their own reference alongside the orchestrator.
    pub fn new(engine: Arc<Engine>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            running: AtomicBool::new(false),
            shutdown,
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Idempotent: a second call while already running is a no-op
    /// (§4.5 "start/stop are idempotent").
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.engine.safety.load_from_store(&self.engine.pool).await?;

        let mut handles = self.handles.lock().unwrap();
        handles.push(self.spawn_ingestion_loop(Direction::Deposit));
        handles.push(self.spawn_ingestion_loop(Direction::Withdrawal));
        handles.push(self.spawn_worker_loop(Direction::Deposit));
        handles.push(self.spawn_worker_loop(Direction::Withdrawal));
        handles.push(self.spawn_finalization_loop());
        handles.push(self.spawn_monitor_loop());

        Ok(())
    }

    /// Signals all loops to stop and waits up to `timeout` for them to
    /// drain before giving up (§4.5 worker-draining with timeout).
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown.send(true);

        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!("orchestrator stop timed out waiting for loops to drain");
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn spawn_ingestion_loop(&self, direction: Direction) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let interval = Duration::from_millis(engine.config.poll.interval_ms);
            loop {
                let adapter: &dyn ChainAdapter = match direction {
                    Direction::Deposit => engine.chain_a.as_ref(),
                    Direction::Withdrawal => engine.chain_b.as_ref(),
                };
                match pipeline::ingestion::ingest(&engine.pool, adapter, direction, engine.config.poll.max_blocks_per_batch).await {
                    Ok(summary) if summary.inserted > 0 || summary.rejected_unmapped_token > 0 => {
                        engine.metrics.transfers_ingested_total.inc_by(summary.inserted as u64);
                        tracing::info!(?direction, inserted = summary.inserted, duplicates = summary.duplicates, "ingestion pass");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(?direction, error = %e, "ingestion pass failed"),
                }

                if wait_or_shutdown(&mut shutdown, interval).await {
                    break;
                }
            }
        })
    }

    fn spawn_worker_loop(&self, direction: Direction) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let retry_policy = RetryPolicy::new(engine.config.retry.max, engine.config.retry.delay_ms);
            let stuck_threshold = chrono::Duration::milliseconds(engine.config.retry.stuck_threshold_ms as i64);
            let interval = Duration::from_millis(engine.config.poll.interval_ms);
            loop {
                let (source_adapter, target_adapter): (&dyn ChainAdapter, &dyn ChainAdapter) = match direction {
                    Direction::Deposit => (engine.chain_a.as_ref(), engine.chain_b.as_ref()),
                    Direction::Withdrawal => (engine.chain_b.as_ref(), engine.chain_a.as_ref()),
                };
                match pipeline::worker::run_once(
                    &engine.pool,
                    direction,
                    source_adapter,
                    target_adapter,
                    &engine.safety,
                    &retry_policy,
                    &engine.config.confirmations,
                    engine.config.poll.batch_size,
                    stuck_threshold,
                )
                .await
                {
                    Ok(summary) if summary.advanced > 0 || summary.failed > 0 => {
                        engine.metrics.transfers_completed_total.inc_by(summary.completed as u64);
                        engine.metrics.transfers_failed_total.inc_by(summary.failed as u64);
                        tracing::info!(?direction, advanced = summary.advanced, completed = summary.completed, failed = summary.failed, "worker pass");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(?direction, error = %e, "worker pass failed"),
                }

                if let Err(e) = engine.safety.check_emergency_threshold(&engine.pool).await {
                    tracing::error!(error = %e, "emergency threshold check failed");
                }
                engine.metrics.emergency_halt_active.set(engine.safety.is_halted() as i64);

                if wait_or_shutdown(&mut shutdown, interval).await {
                    break;
                }
            }
        })
    }

    fn spawn_finalization_loop(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let interval = Duration::from_millis(engine.config.finalization.period_ms);
            loop {
                match finalization::run_once(&engine.pool, engine.chain_b.as_ref(), engine.chain_a.as_ref(), &engine.config.finalization).await {
                    Ok(summary) if summary.proposed > 0 || summary.finalized > 0 || summary.invalidated > 0 => {
                        engine.metrics.finalizations_proposed_total.inc_by(summary.proposed as u64);
                        engine.metrics.finalizations_finalized_total.inc_by(summary.finalized as u64);
                        engine.metrics.finalizations_invalidated_total.inc_by(summary.invalidated as u64);
                        tracing::info!(proposed = summary.proposed, finalized = summary.finalized, invalidated = summary.invalidated, "finalization pass");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "finalization pass failed"),
                }

                if wait_or_shutdown(&mut shutdown, interval).await {
                    break;
                }
            }
        })
    }

    fn spawn_monitor_loop(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let interval = Duration::from_millis(engine.config.monitor.sample_interval_ms);
            loop {
                let mut pending_total = 0i64;
                for direction in [Direction::Deposit, Direction::Withdrawal] {
                    match engine.monitor.sample(&engine.pool, direction).await {
                        Ok((sample, alerts)) => {
                            pending_total += sample.pending;
                            if !alerts.is_empty() {
                                tracing::warn!(?direction, count = alerts.len(), "monitor raised alerts");
                            }
                        }
                        Err(e) => tracing::error!(?direction, error = %e, "monitor sample failed"),
                    }
                }
                engine.metrics.pending_transfers.set(pending_total);

                if wait_or_shutdown(&mut shutdown, interval).await {
                    break;
                }
            }
        })
    }

    /// Drops any idle rate-limit buckets and flushes the signature
    /// cache's expired entries (§4.5 "flush counters on shutdown").
    pub async fn flush(&self) -> Result<()> {
        store::gc_stale_rate_limit_buckets(&self.engine.pool, chrono::Utc::now() - chrono::Duration::days(1)).await?;
        self.engine.cache.lock().unwrap().clear();
        Ok(())
    }
}

/// Waits for `interval` or an earlier shutdown signal. Returns true if
/// shutdown fired.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = shutdown.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_is_idempotent_on_the_running_flag() {
        let flag = AtomicBool::new(false);
        assert!(!flag.swap(true, Ordering::SeqCst));
        assert!(flag.swap(true, Ordering::SeqCst));
    }
}
