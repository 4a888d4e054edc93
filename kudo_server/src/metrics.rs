//! Prometheus metrics instrumentation for the Kudo server.
//!
//! Exposes metrics in the Prometheus text exposition format at `GET /metrics`.
//! Tracks request latency histograms, counters for engagement operations,
//! and gauges for store state.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::state::AppState;

/// Label set for request-level metrics (method + path + status).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub path: String,
    pub status: String,
}

/// All Prometheus metrics for the Kudo server.
pub struct PrometheusMetrics {
    /// Prometheus registry holding all metrics.
    pub registry: Registry,

    // -- Counters --
    /// Total HTTP requests processed.
    pub http_requests_total: Family<RequestLabels, Counter>,
    /// Total toggle operations.
    pub toggles_total: Counter,
    /// Toggles that created an edge (like).
    pub likes_created_total: Counter,
    /// Toggles that removed an edge (unlike).
    pub likes_removed_total: Counter,
    /// Total count queries (single + batched).
    pub count_queries_total: Counter,

    // -- Histograms --
    /// HTTP request duration in seconds.
    pub http_request_duration_seconds: Family<RequestLabels, Histogram>,

    // -- Gauges --
    /// Server uptime in seconds (updated on each scrape).
    pub uptime_seconds: Gauge,
    /// Total edge count in the store (updated on each scrape).
    pub edges_total: Gauge,
}

/// Create latency histogram buckets.
/// Covers: 1ms, 2.5ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
fn make_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.5, 13))
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    /// Create a new PrometheusMetrics with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "kudo_http_requests_total",
            "Total number of HTTP requests processed",
            http_requests_total.clone(),
        );

        let toggles_total = Counter::default();
        registry.register(
            "kudo_toggles_total",
            "Total number of toggle operations",
            toggles_total.clone(),
        );

        let likes_created_total = Counter::default();
        registry.register(
            "kudo_likes_created_total",
            "Total number of toggles that created an edge",
            likes_created_total.clone(),
        );

        let likes_removed_total = Counter::default();
        registry.register(
            "kudo_likes_removed_total",
            "Total number of toggles that removed an edge",
            likes_removed_total.clone(),
        );

        let count_queries_total = Counter::default();
        registry.register(
            "kudo_count_queries_total",
            "Total number of count queries",
            count_queries_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<RequestLabels, Histogram>::new_with_constructor(make_histogram);
        registry.register(
            "kudo_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let uptime_seconds = Gauge::default();
        registry.register(
            "kudo_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds.clone(),
        );

        let edges_total = Gauge::default();
        registry.register(
            "kudo_edges_total",
            "Total number of engagement edges in the store",
            edges_total.clone(),
        );

        Self {
            registry,
            http_requests_total,
            toggles_total,
            likes_created_total,
            likes_removed_total,
            count_queries_total,
            http_request_duration_seconds,
            uptime_seconds,
            edges_total,
        }
    }
}

/// Normalize a request path for metric labels.
/// Replaces path parameters with placeholders to avoid high cardinality.
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    let mut normalized = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            normalized.push(*part);
            continue;
        }
        if i > 0 {
            let prev = parts[i - 1];
            if prev == "likes" && *part != "count" && *part != "counts" {
                normalized.push(":id");
                continue;
            }
            if (prev == "count" || prev == "subjects" || prev == "actors")
                && *part != "counts"
                && *part != "likes"
            {
                normalized.push(":id");
                continue;
            }
        }
        normalized.push(part);
    }
    normalized.join("/")
}

/// Middleware recording per-request counters and latency histograms.
pub async fn track_metrics(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    state.total_requests.fetch_add(1, Ordering::Relaxed);

    let response = next.run(request).await;

    if let Some(prom) = &state.prometheus {
        let labels = RequestLabels {
            method,
            path,
            status: response.status().as_u16().to_string(),
        };
        prom.http_requests_total.get_or_create(&labels).inc();
        prom.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(start.elapsed().as_secs_f64());
    }

    response
}

/// `GET /metrics` — Prometheus text exposition format.
pub async fn metrics_text_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(prom) = &state.prometheus else {
        return (StatusCode::OK, String::new()).into_response();
    };

    // Gauges are refreshed at scrape time.
    prom.uptime_seconds
        .set(state.start_time.elapsed().as_secs() as i64);
    match state.registry.edges().total_edges() {
        Ok(n) => {
            prom.edges_total.set(n as i64);
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to read edge total for metrics scrape");
        }
    }

    let mut buffer = String::new();
    if let Err(err) = encode(&mut buffer, &prom.registry) {
        tracing::error!(error = %err, "failed to encode Prometheus metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_collapses_ids() {
        assert_eq!(normalize_path("/api/v1/likes/goal-42"), "/api/v1/likes/:id");
        assert_eq!(
            normalize_path("/api/v1/likes/count/goal-42"),
            "/api/v1/likes/count/:id"
        );
        assert_eq!(normalize_path("/api/v1/likes/counts"), "/api/v1/likes/counts");
        assert_eq!(
            normalize_path("/api/v1/subjects/goal-42"),
            "/api/v1/subjects/:id"
        );
        assert_eq!(
            normalize_path("/api/v1/actors/alice/likes"),
            "/api/v1/actors/:id/likes"
        );
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }
}
