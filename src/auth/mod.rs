use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use diesel::prelude::*;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::models::{User, ROLE_ADMIN, ROLE_SEMI_ADMIN};
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated user context extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }

    /// Strictly the admin role: bypasses all task-level authorization.
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Dashboard read scope, held by admin and semi_admin.
    pub fn has_admin_privileges(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_SEMI_ADMIN
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Authentication required"
                })),
            ))
    }
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Validate the bearer token, resolve the user row and attach the
/// authenticated context to the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("Missing bearer token");
    };

    let claims = match decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    ) {
        Ok(data) => data.claims,
        Err(_) => return unauthorized("Invalid token"),
    };

    let Ok(user_id) = claims.sub.parse::<Uuid>() else {
        return unauthorized("Invalid token subject");
    };

    let Ok(mut conn) = state.conn.get() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Database unavailable" })),
        )
            .into_response();
    };

    let user: Option<User> = match users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .optional()
    {
        Ok(user) => user,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("Query error: {e}") })),
            )
                .into_response();
        }
    };

    let Some(user) = user else {
        return unauthorized("Unknown user");
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from_user(&user));

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::ROLE_EMPLOYEE;
    use crate::tests::test_util;

    fn actor(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            name: "Actor".to_string(),
            email: "actor@example.com".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn admin_bypass_is_role_admin_only() {
        test_util::setup();
        assert!(actor(ROLE_ADMIN).is_admin());
        assert!(!actor(ROLE_SEMI_ADMIN).is_admin());
        assert!(!actor(ROLE_EMPLOYEE).is_admin());
    }

    #[test]
    fn dashboard_scope_includes_semi_admin() {
        test_util::setup();
        assert!(actor(ROLE_ADMIN).has_admin_privileges());
        assert!(actor(ROLE_SEMI_ADMIN).has_admin_privileges());
        assert!(!actor(ROLE_EMPLOYEE).has_admin_privileges());
    }
}
