//! Axum route handlers for the Kudo REST API.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use kudo_core::{engine, ActorId, SubjectId};

use crate::audit::{AuditEntry, AuditFilter};
use crate::auth::{require_actor, require_role, AuthContext};
use crate::error::{ApiError, AppError};
use crate::state::AppState;
use crate::types::*;

/// Record a toggle outcome in Prometheus metrics.
fn record_toggle(state: &AppState, liked: bool) {
    if let Some(prom) = &state.prometheus {
        prom.toggles_total.inc();
        if liked {
            prom.likes_created_total.inc();
        } else {
            prom.likes_removed_total.inc();
        }
    }
}

/// Record a count query in Prometheus metrics.
fn record_count_query(state: &AppState) {
    state.total_count_queries.fetch_add(1, Ordering::Relaxed);
    if let Some(prom) = &state.prometheus {
        prom.count_queries_total.inc();
    }
}

// ---------------------------------------------------------------------------
// Health & Metrics
// ---------------------------------------------------------------------------

/// Health check endpoint returning server status.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        storage_backend: "lmdb".into(),
        auth_enabled: state.config.auth.enabled,
    })
}

/// Server metrics including operation counts and uptime.
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    tag = "Health",
    responses(
        (status = 200, description = "Operation counters and uptime", body = MetricsResponse)
    )
)]
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsResponse>, AppError> {
    let total_edges = state
        .registry
        .edges()
        .total_edges()
        .map_err(|e| AppError::internal(format!("Failed to read edge total: {}", e)))?;

    Ok(Json(MetricsResponse {
        total_requests: state.total_requests.load(Ordering::Relaxed),
        total_toggles: state.total_toggles.load(Ordering::Relaxed),
        total_count_queries: state.total_count_queries.load(Ordering::Relaxed),
        total_edges,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// ---------------------------------------------------------------------------
// Engagement
// ---------------------------------------------------------------------------

/// Toggle the caller's like on a subject.
///
/// Atomically flips the (actor, subject) edge and returns the new state with
/// a fresh count. Requires an authenticated actor.
#[utoipa::path(
    post,
    path = "/api/v1/likes/{subject_id}",
    tag = "Likes",
    params(
        ("subject_id" = String, Path, description = "Subject to toggle")
    ),
    responses(
        (status = 200, description = "New engagement state", body = ToggleResponse),
        (status = 400, description = "Malformed subject id", body = ApiError),
        (status = 401, description = "No authenticated actor", body = ApiError),
        (status = 404, description = "Subject does not exist", body = ApiError),
        (status = 503, description = "Store unavailable", body = ApiError)
    )
)]
pub async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subject_id): Path<String>,
) -> Result<Json<ToggleResponse>, AppError> {
    let actor = require_actor(&auth)?.clone();
    state.total_toggles.fetch_add(1, Ordering::Relaxed);

    let outcome = engine::toggle(&state.registry, &actor, &subject_id)?;

    record_toggle(&state, outcome.liked);
    state.audit_log.append(AuditEntry::now(
        if outcome.liked { "like" } else { "unlike" },
        Some(actor.to_string()),
        Some(subject_id.clone()),
        auth.token_name.clone(),
    ));

    Ok(Json(ToggleResponse {
        subject_id,
        liked: outcome.liked,
        count: outcome.count,
    }))
}

/// Combined per-actor status and total count for one subject.
///
/// Anonymous callers always get `liked: false`; only the count is
/// authoritative for them. Never an auth error.
#[utoipa::path(
    get,
    path = "/api/v1/likes/{subject_id}",
    tag = "Likes",
    params(
        ("subject_id" = String, Path, description = "Subject to check")
    ),
    responses(
        (status = 200, description = "Current status and count", body = StatusResponse),
        (status = 400, description = "Malformed subject id", body = ApiError),
        (status = 503, description = "Store unavailable", body = ApiError)
    )
)]
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subject_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let view = engine::status(&state.registry, auth.actor.as_ref(), &subject_id)?;
    Ok(Json(StatusResponse {
        subject_id,
        liked: view.liked,
        count: view.count,
    }))
}

/// Like count for a single subject. Public.
#[utoipa::path(
    get,
    path = "/api/v1/likes/count/{subject_id}",
    tag = "Likes",
    params(
        ("subject_id" = String, Path, description = "Subject to count")
    ),
    responses(
        (status = 200, description = "Current count", body = CountResponse),
        (status = 400, description = "Malformed subject id", body = ApiError)
    )
)]
pub async fn count_handler(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<CountResponse>, AppError> {
    record_count_query(&state);
    let count = engine::count_for(&state.registry, &subject_id)?;
    Ok(Json(CountResponse { subject_id, count }))
}

/// Like counts for a batch of subjects. Public.
///
/// The whole batch is validated before any lookup: an empty list, a
/// malformed id, or an oversized batch rejects the entire request. Every
/// requested id is present in the response, 0 when it has no likes.
#[utoipa::path(
    post,
    path = "/api/v1/likes/counts",
    tag = "Likes",
    request_body = CountsRequest,
    responses(
        (status = 200, description = "Complete id → count mapping", body = CountsResponse),
        (status = 400, description = "Empty, oversized, or malformed batch", body = ApiError)
    )
)]
pub async fn counts_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CountsRequest>,
) -> Result<Json<CountsResponse>, AppError> {
    let max = state.config.limits.max_batch_subjects;
    if body.subject_ids.len() > max {
        return Err(AppError::bad_request(format!(
            "Batch of {} subject ids exceeds the limit of {}",
            body.subject_ids.len(),
            max
        )));
    }
    record_count_query(&state);

    let counts = engine::count_for_many(&state.registry, &body.subject_ids)?;
    let counts = counts
        .into_iter()
        .map(|(subject, n)| (subject.to_string(), n))
        .collect();

    Ok(Json(CountsResponse { counts }))
}

// ---------------------------------------------------------------------------
// Collaborator primitives
// ---------------------------------------------------------------------------

/// Register a subject as likeable. Idempotent. Called by the content store
/// when content is created.
#[utoipa::path(
    put,
    path = "/api/v1/subjects/{subject_id}",
    tag = "Subjects",
    params(
        ("subject_id" = String, Path, description = "Subject to register")
    ),
    responses(
        (status = 200, description = "Subject registered", body = RegisterSubjectResponse),
        (status = 400, description = "Malformed subject id", body = ApiError),
        (status = 403, description = "Admin role required", body = ApiError)
    )
)]
pub async fn register_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subject_id): Path<String>,
) -> Result<Json<RegisterSubjectResponse>, AppError> {
    require_role(&auth, kudo_config::AuthRole::Admin)?;
    let subject =
        SubjectId::parse(subject_id.as_str()).map_err(|e| AppError::bad_request(e.to_string()))?;

    state
        .registry
        .subjects()
        .register(&subject)
        .map_err(|e| AppError::unavailable(format!("Subject registration failed: {}", e)))?;

    state.audit_log.append(AuditEntry::now(
        "subject.register",
        None,
        Some(subject_id.clone()),
        auth.token_name.clone(),
    ));

    Ok(Json(RegisterSubjectResponse {
        subject_id,
        registered: true,
    }))
}

/// Unregister a subject and purge every edge referencing it. Called by the
/// content store when content is permanently deleted.
#[utoipa::path(
    delete,
    path = "/api/v1/subjects/{subject_id}",
    tag = "Subjects",
    params(
        ("subject_id" = String, Path, description = "Subject to unregister and purge")
    ),
    responses(
        (status = 200, description = "Subject purged", body = PurgeSubjectResponse),
        (status = 400, description = "Malformed subject id", body = ApiError),
        (status = 403, description = "Admin role required", body = ApiError)
    )
)]
pub async fn unregister_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subject_id): Path<String>,
) -> Result<Json<PurgeSubjectResponse>, AppError> {
    require_role(&auth, kudo_config::AuthRole::Admin)?;
    let subject =
        SubjectId::parse(subject_id.as_str()).map_err(|e| AppError::bad_request(e.to_string()))?;

    let existed = state
        .registry
        .subjects()
        .unregister(&subject)
        .map_err(|e| AppError::unavailable(format!("Subject unregistration failed: {}", e)))?;
    let removed_edges = state
        .registry
        .edges()
        .remove_all_for_subject(&subject)
        .map_err(|e| AppError::unavailable(format!("Edge purge failed: {}", e)))?;

    state.audit_log.append(AuditEntry::now(
        "subject.purge",
        None,
        Some(subject_id.clone()),
        auth.token_name.clone(),
    ));
    tracing::info!(subject = %subject, removed_edges, "subject unregistered and purged");

    Ok(Json(PurgeSubjectResponse {
        subject_id,
        existed,
        removed_edges,
    }))
}

/// Purge every edge created by an actor. Called by the identity provider
/// when an account is permanently removed.
#[utoipa::path(
    delete,
    path = "/api/v1/actors/{actor_id}/likes",
    tag = "Actors",
    params(
        ("actor_id" = String, Path, description = "Actor whose edges to purge")
    ),
    responses(
        (status = 200, description = "Edges purged", body = PurgeActorResponse),
        (status = 400, description = "Malformed actor id", body = ApiError),
        (status = 403, description = "Admin role required", body = ApiError)
    )
)]
pub async fn purge_actor_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(actor_id): Path<String>,
) -> Result<Json<PurgeActorResponse>, AppError> {
    require_role(&auth, kudo_config::AuthRole::Admin)?;
    let actor =
        ActorId::parse(actor_id.as_str()).map_err(|e| AppError::bad_request(e.to_string()))?;

    let removed_edges = state
        .registry
        .edges()
        .remove_all_for_actor(&actor)
        .map_err(|e| AppError::unavailable(format!("Edge purge failed: {}", e)))?;

    state.audit_log.append(AuditEntry::now(
        "actor.purge",
        Some(actor_id.clone()),
        None,
        auth.token_name.clone(),
    ));
    tracing::info!(actor = %actor, removed_edges, "actor edges purged");

    Ok(Json(PurgeActorResponse {
        actor_id,
        removed_edges,
    }))
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Query the engagement audit trail.
#[utoipa::path(
    get,
    path = "/api/v1/audit",
    tag = "Audit",
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Matching audit entries, oldest first", body = [AuditEntry]),
        (status = 403, description = "Admin role required", body = ApiError)
    )
)]
pub async fn audit_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    require_role(&auth, kudo_config::AuthRole::Admin)?;

    let filter = AuditFilter {
        from: params.from,
        to: params.to,
        action: params.action,
        actor: params.actor,
    };
    Ok(Json(state.audit_log.query(&filter)))
}
