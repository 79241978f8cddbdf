//! Health reporting for liveness and readiness probes

use serde::Serialize;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::core_space::storage::SqlStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn to_http_status(&self) -> u16 {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms: latency.as_millis() as u64,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            latency_ms: latency.as_millis() as u64,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            latency_ms: latency.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    /// Unix millis
    pub checked_at: u64,
    pub components: Vec<ComponentHealth>,
}

/// Probes the database and reports process uptime
#[derive(Clone)]
pub struct HealthChecker {
    store: SqlStore,
    started: Instant,
    version: String,
    slow_threshold: Duration,
}

impl HealthChecker {
    pub fn new(store: SqlStore, version: impl Into<String>) -> Self {
        Self {
            store,
            started: Instant::now(),
            version: version.into(),
            slow_threshold: Duration::from_millis(500),
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Blocking: runs a query against the pool
    pub fn check_store(&self) -> ComponentHealth {
        let start = Instant::now();
        let outcome = self.store.ping();
        let elapsed = start.elapsed();

        match outcome {
            Err(e) => ComponentHealth::unhealthy("store", e.to_string(), elapsed),
            Ok(()) if elapsed > self.slow_threshold => {
                ComponentHealth::degraded("store", format!("ping took {:?}", elapsed), elapsed)
            }
            Ok(()) => ComponentHealth::healthy("store", elapsed),
        }
    }

    pub fn check_health(&self) -> HealthReport {
        let components = vec![self.check_store()];
        let status = if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            version: self.version.clone(),
            uptime_seconds: self.started.elapsed().as_secs(),
            checked_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            components,
        }
    }

    pub fn readiness_check(&self) -> bool {
        self.check_health().status != HealthStatus::Unhealthy
    }

    pub fn liveness_check(&self) -> bool {
        true
    }
}
