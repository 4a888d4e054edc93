//! OpenAPI specification generation for the Kudo REST API.
//!
//! Uses utoipa to generate the spec from annotated handlers and types.
//! The spec is served at `/api/v1/openapi.json` and Swagger UI at `/swagger-ui`.

use utoipa::OpenApi;

use crate::audit::AuditEntry;
use crate::error::ApiError;
use crate::handlers;
use crate::types::*;

/// OpenAPI specification for the Kudo REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kudo API",
        description = "Engagement service — toggle likes on content subjects, \
                       read per-actor status, and query aggregate counts.",
        version = "0.3.0",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8620", description = "Local development server")
    ),
    tags(
        (name = "Health", description = "Server health and metrics endpoints"),
        (name = "Likes", description = "Engagement operations — toggle, status, and count queries"),
        (name = "Subjects", description = "Content-store collaborator hooks — subject registration and purge"),
        (name = "Actors", description = "Identity-provider collaborator hooks — actor edge purge"),
        (name = "Audit", description = "Append-only audit trail of engagement mutations")
    ),
    paths(
        handlers::health_handler,
        handlers::metrics_handler,
        handlers::toggle_handler,
        handlers::status_handler,
        handlers::count_handler,
        handlers::counts_handler,
        handlers::register_subject_handler,
        handlers::unregister_subject_handler,
        handlers::purge_actor_handler,
        handlers::audit_handler,
    ),
    components(schemas(
        ApiError,
        AuditEntry,
        ToggleResponse,
        StatusResponse,
        CountResponse,
        CountsRequest,
        CountsResponse,
        RegisterSubjectResponse,
        PurgeSubjectResponse,
        PurgeActorResponse,
        HealthResponse,
        MetricsResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/api/v1/likes/{subject_id}"));
        assert!(json.contains("/api/v1/likes/counts"));
    }
}
