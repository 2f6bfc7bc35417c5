//! Caller identity.
//!
//! Handlers extract an [`AuthContext`] from the bearer token and hand it to
//! the services explicitly; nothing below the HTTP layer reads request state.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::models::Role;
use crate::state::AppState;
use crate::utils::error::AppError;

pub mod jwt;

pub use jwt::{issue_token, validate_token, Claims};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the caller holds one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role '{}' may not perform this action",
                self.role
            )))
        }
    }

    /// Admins manage every event; organizers only their own.
    pub fn require_event_manager(&self, organizer_id: Uuid) -> Result<(), AppError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Organizer if self.user_id == organizer_id => Ok(()),
            Role::Organizer => Err(AppError::Forbidden(
                "organizers may only manage their own events".into(),
            )),
            Role::Attendee => Err(AppError::Forbidden(
                "only organizers and admins may manage events".into(),
            )),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::AuthError("Missing or malformed bearer token".into()))?;

        let claims = validate_token(token, &state.config.jwt_secret)
            .map_err(|_| AppError::AuthError("Invalid or expired token".into()))?;

        Ok(AuthContext::new(claims.sub, claims.role))
    }
}

/// Identity for routes that also serve anonymous callers. A present but
/// invalid token is still rejected.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuth(pub Option<AuthContext>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if parts.headers.get("authorization").is_none() {
            return Ok(MaybeAuth(None));
        }
        AuthContext::from_request_parts(parts, state)
            .await
            .map(|ctx| MaybeAuth(Some(ctx)))
    }
}
