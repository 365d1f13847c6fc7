//! Monitor (C7, §4.4): periodic sampling of transfer throughput and
//! finalization health, raising incidents when thresholds are crossed.
//! Independent of the Safety Controller's admission-time checks.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eyre::Result;
use sqlx::PgPool;

use crate::config::MonitorConfig;
use crate::store;
use crate::types::{Direction, FinalizationState, TransferStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub source: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub completed_recent: i64,
    pub avg_processing_time_ms: Option<f64>,
    pub failure_rate: f64,
    pub proposed_finalizations: i64,
    pub challenged_finalizations: i64,
}

/// Dedupes identical `(severity, title, source)` alerts raised within
/// the last hour (§4.4 "do not re-raise the same alert every sample").
pub struct Monitor {
    config: MonitorConfig,
    recent_alerts: Mutex<HashMap<(String, &'static str), DateTime<Utc>>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config, recent_alerts: Mutex::new(HashMap::new()) }
    }

    /// Samples one direction and returns both the raw sample and any
    /// newly-raised (non-deduped) alerts.
    pub async fn sample(&self, pool: &PgPool, direction: Direction) -> Result<(Sample, Vec<Alert>)> {
        let since = Utc::now() - ChronoDuration::milliseconds(self.config.sample_interval_ms as i64 * 10);

        let pending = store::count_by_status(pool, direction, TransferStatus::Pending).await?;
        let processing = store::count_by_status(pool, direction, TransferStatus::Processing).await?;
        let failed = store::count_by_status(pool, direction, TransferStatus::Failed).await?;
        let completed_recent = store::count_by_status(pool, direction, TransferStatus::Completed).await?;
        let avg_processing_time_ms = store::avg_processing_time_ms(pool, direction, since).await?;

        let total_recent = (pending + processing + failed + completed_recent).max(1);
        let failure_rate = failed as f64 / total_recent as f64;

        let proposed_finalizations = store::count_finalizations_by_state(pool, FinalizationState::Proposed).await?;
        let challenged_finalizations = store::count_finalizations_by_state(pool, FinalizationState::Challenged).await?;

        let sample = Sample {
            pending,
            processing,
            failed,
            completed_recent,
            avg_processing_time_ms,
            failure_rate,
            proposed_finalizations,
            challenged_finalizations,
        };

        let mut alerts = Vec::new();
        if failure_rate > self.config.failure_rate_threshold {
            self.raise(
                &mut alerts,
                Severity::Critical,
                format!("{direction:?} failure rate {failure_rate:.2} exceeds threshold {:.2}", self.config.failure_rate_threshold),
                "monitor.failure_rate",
            );
        }
        if let Some(avg) = avg_processing_time_ms {
            if avg > self.config.avg_processing_time_threshold_ms as f64 {
                self.raise(
                    &mut alerts,
                    Severity::Warning,
                    format!("{direction:?} average processing time {avg:.0}ms exceeds threshold"),
                    "monitor.processing_time",
                );
            }
        }
        if challenged_finalizations > 0 {
            self.raise(
                &mut alerts,
                Severity::Warning,
                format!("{challenged_finalizations} finalization(s) under active challenge"),
                "monitor.finalization_challenged",
            );
        }

        let stuck_before = Utc::now() - ChronoDuration::milliseconds(self.config.stuck_threshold_ms as i64);
        let stuck = store::get_stuck_transfers(pool, stuck_before).await?;
        if !stuck.is_empty() {
            self.raise(
                &mut alerts,
                Severity::Warning,
                format!("{} transfer(s) stuck past threshold", stuck.len()),
                "monitor.stuck_transfers",
            );
        }

        Ok((sample, alerts))
    }

    /// Alerts are independent of incidents (§4.4): the Monitor dedupes and
    /// hands them back to the caller to dispatch, it does not write to the
    /// Incident table — that table is reserved for the Safety Controller's
    /// admission/fraud findings that feed `check_emergency_threshold`.
    fn raise(&self, alerts: &mut Vec<Alert>, severity: Severity, title: String, source: &'static str) {
        let key = (title.clone(), source);
        let now = Utc::now();
        {
            let mut recent = self.recent_alerts.lock().unwrap();
            if let Some(last) = recent.get(&key) {
                if now - *last < ChronoDuration::hours(1) {
                    return;
                }
            }
            recent.insert(key, now);
        }

        alerts.push(Alert { severity, title, source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MonitorConfig {
        MonitorConfig {
            sample_interval_ms: 60_000,
            failure_rate_threshold: 0.5,
            avg_processing_time_threshold_ms: 600_000,
            stuck_threshold_ms: 1_800_000,
        }
    }

    #[test]
    fn monitor_starts_with_no_recent_alerts() {
        let monitor = Monitor::new(config());
        assert!(monitor.recent_alerts.lock().unwrap().is_empty());
    }
}
