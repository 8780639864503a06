//! Health checking: `HealthCheckable`, `HealthStatus`/`HealthState`, and
//! a background-polling `HealthChecker`.
//!
//! Same status/state shape, same timeout-guarded polling loop, same
//! consecutive-failure tracking used elsewhere in this workspace, but
//! adapted to check pipelines (anything that can report its own
//! readiness — a downstream dependency, a storage backend) rather than
//! pooled resource instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use stagekit_error::StagekitError;

/// The result of one health check.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// The health state.
    pub state: HealthState,
    /// How long the check took, if measured.
    pub latency: Option<Duration>,
    /// Free-form diagnostic metadata.
    pub metadata: HashMap<String, String>,
}

/// The possible states a health check can report.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthState {
    /// Fully operational.
    Healthy,
    /// Operational but impaired.
    Degraded {
        /// Human-readable cause.
        reason: String,
        /// Impact on the 0.0 (none) to 1.0 (fully degraded) scale.
        performance_impact: f64,
    },
    /// Not operational.
    Unhealthy {
        /// Human-readable cause.
        reason: String,
        /// Whether the component is expected to recover on its own.
        recoverable: bool,
    },
    /// No check has succeeded yet.
    Unknown,
}

impl HealthStatus {
    /// A healthy status with no metadata.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            state: HealthState::Healthy,
            latency: None,
            metadata: HashMap::new(),
        }
    }

    /// An unhealthy, recoverable status.
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self {
            state: HealthState::Unhealthy {
                reason: reason.into(),
                recoverable: true,
            },
            latency: None,
            metadata: HashMap::new(),
        }
    }

    /// A degraded status, clamping `performance_impact` into `0.0..=1.0`.
    pub fn degraded(reason: impl Into<String>, performance_impact: f64) -> Self {
        Self {
            state: HealthState::Degraded {
                reason: reason.into(),
                performance_impact: performance_impact.clamp(0.0, 1.0),
            },
            latency: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach measured latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this status is good enough to keep routing work to the
    /// component: healthy, or degraded below 0.8 impact.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        match &self.state {
            HealthState::Healthy => true,
            HealthState::Degraded { performance_impact, .. } => *performance_impact < 0.8,
            HealthState::Unhealthy { .. } | HealthState::Unknown => false,
        }
    }

    /// A numeric score, 0.0 (unhealthy) to 1.0 (healthy), for ranking or
    /// alerting thresholds.
    #[must_use]
    pub fn score(&self) -> f64 {
        match &self.state {
            HealthState::Healthy => 1.0,
            HealthState::Degraded { performance_impact, .. } => 1.0 - performance_impact,
            HealthState::Unhealthy { .. } => 0.0,
            HealthState::Unknown => 0.5,
        }
    }
}

/// A component that can report its own health — a pipeline, a cache
/// backend, a dispatcher connection, anything the operator wants
/// watched.
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Perform a health check.
    async fn health_check(&self) -> Result<HealthStatus, StagekitError>;

    /// Recommended interval between checks.
    fn health_check_interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Timeout applied to a single check.
    fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}

/// One recorded health observation for a monitored instance.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    /// The logical component name (e.g. a pipeline name).
    pub component: String,
    /// The monitored instance's identifier.
    pub instance_id: Uuid,
    /// The most recent status.
    pub status: HealthStatus,
    /// When the check ran.
    pub checked_at: chrono::DateTime<chrono::Utc>,
    /// Consecutive non-[`HealthStatus::is_usable`] results.
    pub consecutive_failures: u32,
}

/// Background health-checker configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between polls, used when the checked component doesn't
    /// declare its own via [`HealthCheckable::health_check_interval`].
    pub default_interval: Duration,
    /// Consecutive unusable results before the component is considered
    /// down for alerting purposes.
    pub failure_threshold: u32,
    /// Timeout applied to each poll, when the component doesn't declare
    /// its own.
    pub check_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(30),
            failure_threshold: 3,
            check_timeout: Duration::from_secs(5),
        }
    }
}

/// Polls registered [`HealthCheckable`] instances in the background and
/// keeps their latest status available for readiness probes.
#[derive(Debug)]
pub struct HealthChecker {
    config: HealthCheckConfig,
    records: Arc<DashMap<Uuid, HealthRecord>>,
    shutdown: Arc<RwLock<bool>>,
}

impl HealthChecker {
    /// Build a checker with the given polling configuration.
    #[must_use]
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            records: Arc::new(DashMap::new()),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Start polling `instance` under `instance_id`, labeled by
    /// `component` in records and log lines. Runs in a spawned task
    /// until [`HealthChecker::shutdown`] is called or
    /// [`HealthChecker::stop_monitoring`] removes this instance.
    pub fn start_monitoring<T: HealthCheckable + 'static>(
        &self,
        instance_id: Uuid,
        component: String,
        instance: Arc<T>,
    ) {
        let interval = instance.health_check_interval();
        let timeout = instance.health_check_timeout();
        let failure_threshold = self.config.failure_threshold;
        let records = Arc::clone(&self.records);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let mut consecutive_failures = 0u32;

            loop {
                if *shutdown.read().await {
                    break;
                }

                let check = tokio::time::timeout(timeout, instance.health_check()).await;
                let status = Self::process_check_result(check, &mut consecutive_failures);

                records.insert(
                    instance_id,
                    HealthRecord {
                        component: component.clone(),
                        instance_id,
                        status,
                        checked_at: chrono::Utc::now(),
                        consecutive_failures,
                    },
                );

                if consecutive_failures >= failure_threshold {
                    tracing::warn!(
                        component = %component,
                        instance = %instance_id,
                        consecutive_failures,
                        "health check failing"
                    );
                }

                tokio::time::sleep(interval).await;
            }

            records.remove(&instance_id);
        });
    }

    fn process_check_result(
        result: Result<Result<HealthStatus, StagekitError>, tokio::time::error::Elapsed>,
        consecutive_failures: &mut u32,
    ) -> HealthStatus {
        match result {
            Ok(Ok(status)) if status.is_usable() => {
                *consecutive_failures = 0;
                status
            }
            Ok(Ok(status)) => {
                *consecutive_failures += 1;
                status
            }
            Ok(Err(err)) => {
                *consecutive_failures += 1;
                HealthStatus::unhealthy(format!("health check failed: {err}"))
            }
            Err(_) => {
                *consecutive_failures += 1;
                HealthStatus::unhealthy("health check timed out")
            }
        }
    }

    /// Stop polling and drop the record for `instance_id`.
    pub fn stop_monitoring(&self, instance_id: &Uuid) {
        self.records.remove(instance_id);
    }

    /// The latest recorded health for `instance_id`, if it has been
    /// checked at least once.
    #[must_use]
    pub fn health(&self, instance_id: &Uuid) -> Option<HealthRecord> {
        self.records.get(instance_id).map(|r| r.value().clone())
    }

    /// All currently monitored instances' latest records.
    #[must_use]
    pub fn all_health(&self) -> Vec<HealthRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Aggregate status: healthy only if every monitored instance is
    /// usable; the worst-scoring instance's status otherwise.
    #[must_use]
    pub fn aggregate_status(&self) -> HealthStatus {
        let records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        if records.is_empty() {
            return HealthStatus {
                state: HealthState::Unknown,
                latency: None,
                metadata: HashMap::new(),
            };
        }
        records
            .into_iter()
            .map(|r| r.status)
            .min_by(|a, b| a.score().total_cmp(&b.score()))
            .expect("records is non-empty, checked above")
    }

    /// Stop every running polling loop. Already-spawned tasks observe
    /// this on their next iteration and remove their own records.
    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyCheck(Arc<AtomicU32>);

    #[async_trait]
    impl HealthCheckable for FlakyCheck {
        async fn health_check(&self) -> Result<HealthStatus, StagekitError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(HealthStatus::healthy())
            } else {
                Ok(HealthStatus::unhealthy("degraded downstream"))
            }
        }

        fn health_check_interval(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    #[tokio::test]
    async fn start_monitoring_records_status_over_time() {
        let checker = HealthChecker::new(HealthCheckConfig::default());
        let calls = Arc::new(AtomicU32::new(0));
        let id = Uuid::new_v4();
        checker.start_monitoring(id, "downstream".to_string(), Arc::new(FlakyCheck(calls)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let record = checker.health(&id).expect("at least one check ran");
        assert_eq!(record.component, "downstream");

        checker.shutdown().await;
    }

    #[test]
    fn usability_thresholds() {
        assert!(HealthStatus::healthy().is_usable());
        assert!(HealthStatus::degraded("slow", 0.5).is_usable());
        assert!(!HealthStatus::degraded("very slow", 0.9).is_usable());
        assert!(!HealthStatus::unhealthy("down").is_usable());
    }

    #[test]
    fn aggregate_status_is_unknown_with_no_instances() {
        let checker = HealthChecker::new(HealthCheckConfig::default());
        assert_eq!(checker.aggregate_status().state, HealthState::Unknown);
    }
}
