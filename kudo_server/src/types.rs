//! Request and response types for the Kudo REST API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// ---------------------------------------------------------------------------
// Engagement
// ---------------------------------------------------------------------------

/// Response of the toggle endpoint: the pair's new state plus a fresh count.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ToggleResponse {
    /// Subject the toggle applied to (echoed back).
    pub subject_id: String,
    /// Whether the caller likes the subject after the flip.
    pub liked: bool,
    /// Total like count after the flip.
    pub count: u64,
}

/// Response of the status endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub subject_id: String,
    /// Whether the caller likes the subject. Always `false` for anonymous
    /// callers; only `count` is authoritative then.
    pub liked: bool,
    pub count: u64,
}

/// Response of the single-subject count endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CountResponse {
    pub subject_id: String,
    pub count: u64,
}

/// Body of the batched count endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CountsRequest {
    /// Subject ids to count. Must be non-empty, well-formed, and within
    /// `limits.max_batch_subjects`.
    pub subject_ids: Vec<String>,
}

/// Response of the batched count endpoint.
///
/// Every requested id is present as a key, 0 when the subject has no likes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CountsResponse {
    pub counts: HashMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Collaborator primitives
// ---------------------------------------------------------------------------

/// Response of subject registration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterSubjectResponse {
    pub subject_id: String,
    pub registered: bool,
}

/// Response of subject unregistration + edge purge.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurgeSubjectResponse {
    pub subject_id: String,
    /// Whether the subject was registered before this call.
    pub existed: bool,
    /// Number of edges deleted along with the subject.
    pub removed_edges: u64,
}

/// Response of an actor edge purge.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurgeActorResponse {
    pub actor_id: String,
    /// Number of edges deleted.
    pub removed_edges: u64,
}

// ---------------------------------------------------------------------------
// Health & metrics
// ---------------------------------------------------------------------------

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage_backend: String,
    pub auth_enabled: bool,
}

/// JSON metrics response (Prometheus text format is served at `/metrics`).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    pub total_requests: u64,
    pub total_toggles: u64,
    pub total_count_queries: u64,
    pub total_edges: u64,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Query parameters of the audit endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Only entries at or after this unix timestamp.
    pub from: Option<u64>,
    /// Only entries at or before this unix timestamp.
    pub to: Option<u64>,
    /// Substring match on the action (e.g. "like", "purge").
    pub action: Option<String>,
    /// Exact match on the acting actor id.
    pub actor: Option<String>,
}
