//! Prometheus metrics (§10.2). A per-instance `Registry` owned by the
//! `Engine` and shared with the operator surface's `AppState`, following
//! the canceler's `server.rs` pattern rather than the reference
//! operator's `lazy_static!` globals — this is the one spot the two
//! reference implementations diverge, and the canceler's is the one
//! worth keeping. Living in this crate (rather than the operator binary)
//! lets the processing loops that actually observe state transitions
//! increment these counters directly.

use prometheus::{IntCounter, IntGauge, Registry};

pub struct Metrics {
    pub transfers_ingested_total: IntCounter,
    pub transfers_completed_total: IntCounter,
    pub transfers_failed_total: IntCounter,
    pub pending_transfers: IntGauge,
    pub finalizations_proposed_total: IntCounter,
    pub finalizations_finalized_total: IntCounter,
    pub finalizations_invalidated_total: IntCounter,
    pub emergency_halt_active: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transfers_ingested_total = IntCounter::new("bridge_transfers_ingested_total", "Total transfers ingested")
            .expect("constant metric name is valid");
        let transfers_completed_total = IntCounter::new("bridge_transfers_completed_total", "Total transfers completed")
            .expect("constant metric name is valid");
        let transfers_failed_total = IntCounter::new("bridge_transfers_failed_total", "Total transfers that hit a failure")
            .expect("constant metric name is valid");
        let pending_transfers = IntGauge::new("bridge_pending_transfers", "Current PENDING transfer count")
            .expect("constant metric name is valid");
        let finalizations_proposed_total = IntCounter::new("bridge_finalizations_proposed_total", "Total blocks proposed")
            .expect("constant metric name is valid");
        let finalizations_finalized_total = IntCounter::new("bridge_finalizations_finalized_total", "Total blocks finalized")
            .expect("constant metric name is valid");
        let finalizations_invalidated_total = IntCounter::new("bridge_finalizations_invalidated_total", "Total blocks invalidated by a winning challenge")
            .expect("constant metric name is valid");
        let emergency_halt_active = IntGauge::new("bridge_emergency_halt_active", "1 if the emergency halt flag is set")
            .expect("constant metric name is valid");

        for metric in [&transfers_ingested_total, &transfers_completed_total, &transfers_failed_total] {
            registry.register(Box::new(metric.clone())).expect("metric registration must not be called twice");
        }
        for metric in [&finalizations_proposed_total, &finalizations_finalized_total, &finalizations_invalidated_total] {
            registry.register(Box::new(metric.clone())).expect("metric registration must not be called twice");
        }
        for metric in [&pending_transfers, &emergency_halt_active] {
            registry.register(Box::new(metric.clone())).expect("metric registration must not be called twice");
        }

        Self {
            transfers_ingested_total,
            transfers_completed_total,
            transfers_failed_total,
            pending_transfers,
            finalizations_proposed_total,
            finalizations_finalized_total,
            finalizations_invalidated_total,
            emergency_halt_active,
            registry,
        }
    }
}
