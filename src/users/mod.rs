use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::models::{User, UserResponse, ROLE_EMPLOYEE, USER_ROLES};
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub photo_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetUserRoleRequest {
    pub role: String,
}

fn get_conn(
    state: &AppState,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    (StatusCode, String),
> {
    state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))
}

fn hash_password(password: &str) -> Result<String, (StatusCode, String)> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash error: {e}")))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    if !actor.is_admin() {
        return Err((StatusCode::FORBIDDEN, "Access denied".to_string()));
    }

    let role = req.role.unwrap_or_else(|| ROLE_EMPLOYEE.to_string());
    if !USER_ROLES.contains(&role.as_str()) {
        return Err((StatusCode::BAD_REQUEST, format!("Invalid role: {role}")));
    }
    if req.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let mut conn = get_conn(&state)?;

    let existing: i64 = users::table
        .filter(users::email.eq(&req.email))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if existing > 0 {
        return Err((StatusCode::CONFLICT, "Email already registered".to_string()));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: req.name,
        email: req.email,
        password_hash: hash_password(&req.password)?,
        role,
        photo_path: req.photo_path,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(user.into()))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _actor: AuthenticatedUser,
) -> Result<Json<Vec<UserResponse>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;

    let rows: Vec<User> = users::table
        .order(users::name.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;

    let user: User = users::table
        .filter(users::id.eq(id))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    Ok(Json(user.into()))
}

pub async fn set_user_role(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetUserRoleRequest>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    if !actor.is_admin() {
        return Err((StatusCode::FORBIDDEN, "Access denied".to_string()));
    }
    if !USER_ROLES.contains(&req.role.as_str()) {
        return Err((StatusCode::BAD_REQUEST, format!("Invalid role: {}", req.role)));
    }

    let mut conn = get_conn(&state)?;

    let updated = diesel::update(users::table.filter(users::id.eq(id)))
        .set((users::role.eq(&req.role), users::updated_at.eq(Utc::now())))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
    }

    let user: User = users::table
        .filter(users::id.eq(id))
        .first(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(user.into()))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    get_user(State(state), actor.clone(), Path(actor.user_id)).await
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/role", put(set_user_role))
        .route("/api/me", get(me))
}
