//! Application state shared across all request handlers.

use std::sync::atomic::AtomicU64;
use std::time::Instant;

use kudo_config::KudoConfig;
use kudo_core::StoreRegistry;

use crate::audit::AuditLog;
use crate::metrics::PrometheusMetrics;

/// Shared application state threaded through Axum handlers.
///
/// Wrapped in `Arc` and shared via Axum's `State` extractor. The server is
/// otherwise stateless: every mutation goes through the engine against the
/// store registry.
pub struct AppState {
    /// Edge store + subject directory.
    pub registry: StoreRegistry,
    /// Full configuration.
    pub config: KudoConfig,
    /// Server start time (for uptime metric).
    pub start_time: Instant,
    /// Request counters for the JSON metrics endpoint.
    pub total_requests: AtomicU64,
    pub total_toggles: AtomicU64,
    pub total_count_queries: AtomicU64,
    /// Prometheus metrics (optional, enabled by default).
    pub prometheus: Option<PrometheusMetrics>,
    /// Immutable append-only audit log of engagement mutations.
    pub audit_log: AuditLog,
}

impl AppState {
    pub fn new(registry: StoreRegistry, config: KudoConfig) -> Self {
        let audit_log = AuditLog::new(config.audit.max_entries, config.audit.retention_secs);
        Self {
            registry,
            config,
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_toggles: AtomicU64::new(0),
            total_count_queries: AtomicU64::new(0),
            prometheus: Some(PrometheusMetrics::new()),
            audit_log,
        }
    }
}
