//! Bearer-token authentication middleware and helpers.
//!
//! When `auth.enabled` is true in config, actor- and admin-gated requests
//! must include `Authorization: Bearer <token>`. The middleware resolves the
//! token to an [`AuthContext`] (role + actor id) and stores it as a request
//! extension for handlers to inspect. Requests with no token at all pass
//! through as anonymous — the public read endpoints (counts, health,
//! metrics) are usable without credentials, and the gated handlers reject
//! anonymous callers themselves.
//!
//! When `auth.enabled` is false (development mode), the actor id is taken
//! from the `X-Kudo-Actor` header and every caller is treated as admin.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use kudo_config::AuthRole;
use kudo_core::ActorId;

use crate::error::AppError;
use crate::state::AppState;

/// Resolved identity attached to the request as an extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Role of the caller. Anonymous callers have the `Actor` role with no
    /// actor id: they can use public reads but nothing gated.
    pub role: AuthRole,
    /// The actor this request acts as, when an identity was presented.
    pub actor: Option<ActorId>,
    /// Name of the token used (for audit logging).
    pub token_name: Option<String>,
}

impl AuthContext {
    /// Context for requests that presented no credentials.
    pub fn anonymous() -> Self {
        Self {
            role: AuthRole::Actor,
            actor: None,
            token_name: None,
        }
    }
}

/// Authentication middleware.
///
/// Always injects an [`AuthContext`]; only a presented-but-invalid token is
/// rejected here. Authorization (which role a route needs) happens in the
/// handlers via [`require_role`] and [`require_actor`].
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !state.config.auth.enabled {
        // Development mode: trust the X-Kudo-Actor header, everyone is admin.
        let actor = request
            .headers()
            .get("X-Kudo-Actor")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| ActorId::parse(v).ok());
        request.extensions_mut().insert(AuthContext {
            role: AuthRole::Admin,
            actor,
            token_name: None,
        });
        return next.run(request).await;
    }

    match extract_bearer_token(request.headers()) {
        None => {
            request.extensions_mut().insert(AuthContext::anonymous());
            next.run(request).await
        }
        Some(token) => match state.config.auth.authenticate(token) {
            None => AppError::unauthenticated("Invalid or revoked bearer token.").into_response(),
            Some((role, actor_id, token_name)) => {
                let actor = actor_id.and_then(|id| ActorId::parse(id).ok());
                request.extensions_mut().insert(AuthContext {
                    role,
                    actor,
                    token_name: Some(token_name),
                });
                next.run(request).await
            }
        },
    }
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Require the caller to have at least the given role.
pub fn require_role(ctx: &AuthContext, required: AuthRole) -> Result<(), AppError> {
    if ctx.role.has_privilege(required) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "Insufficient permissions. Required role: {}, your role: {}.",
            required.as_str(),
            ctx.role.as_str()
        )))
    }
}

/// Require an authenticated actor identity.
///
/// Toggle and per-actor status need a known actor; anonymous and
/// service-only admin tokens are rejected.
pub fn require_actor(ctx: &AuthContext) -> Result<&ActorId, AppError> {
    ctx.actor.as_ref().ok_or_else(|| {
        AppError::unauthenticated(
            "This operation requires an authenticated actor. \
             Use: Authorization: Bearer <actor-token>",
        )
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok-123"));
        assert_eq!(extract_bearer_token(&headers), Some("tok-123"));

        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.remove("authorization");
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_require_actor_rejects_anonymous() {
        let ctx = AuthContext::anonymous();
        assert!(require_actor(&ctx).is_err());

        let ctx = AuthContext {
            role: AuthRole::Actor,
            actor: Some(ActorId::parse("alice").unwrap()),
            token_name: Some("alice-phone".into()),
        };
        assert_eq!(require_actor(&ctx).unwrap().as_str(), "alice");
    }

    #[test]
    fn test_require_role_ordering() {
        let admin = AuthContext {
            role: AuthRole::Admin,
            actor: None,
            token_name: Some("content-store".into()),
        };
        assert!(require_role(&admin, AuthRole::Admin).is_ok());
        assert!(require_role(&admin, AuthRole::Actor).is_ok());

        let actor = AuthContext {
            role: AuthRole::Actor,
            actor: Some(ActorId::parse("alice").unwrap()),
            token_name: None,
        };
        assert!(require_role(&actor, AuthRole::Admin).is_err());
    }
}
