pub mod activity;
pub mod policy;
pub mod store;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::schema::{task_activities, task_attachments, task_collaborators, task_comments, tasks, users};
use crate::shared::state::AppState;
use crate::tasks::store::StoreError;

pub const STATUS_NOT_STARTED: &str = "not_started";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";

pub const TASK_STATUSES: [&str; 4] = [
    STATUS_NOT_STARTED,
    STATUS_IN_PROGRESS,
    STATUS_COMPLETED,
    STATUS_CANCELLED,
];

pub const PRIORITY_LOW: &str = "low";
pub const PRIORITY_MEDIUM: &str = "medium";
pub const PRIORITY_HIGH: &str = "high";

pub const TASK_PRIORITIES: [&str; 3] = [PRIORITY_LOW, PRIORITY_MEDIUM, PRIORITY_HIGH];

pub const ATTACHMENT_FILE: &str = "file";
pub const ATTACHMENT_IMAGE: &str = "image";
pub const ATTACHMENT_LINK: &str = "link";

pub const ATTACHMENT_KINDS: [&str; 3] = [ATTACHMENT_FILE, ATTACHMENT_IMAGE, ATTACHMENT_LINK];

// Database model - matches schema exactly
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = task_collaborators)]
pub struct TaskCollaborator {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub permission: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = task_activities)]
pub struct TaskActivity {
    pub id: Uuid,
    pub task_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = task_comments)]
pub struct TaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = task_attachments)]
pub struct TaskAttachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploader_id: Option<Uuid>,
    pub kind: String,
    pub storage_path: Option<String>,
    pub external_url: Option<String>,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CollaboratorInput {
    pub user_id: Uuid,
    pub permission: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncCollaboratorsRequest {
    pub collaborators: Vec<CollaboratorInput>,
}

#[derive(Debug, Serialize)]
pub struct SyncCollaboratorsResponse {
    pub collaborators: Vec<TaskCollaborator>,
    pub newly_added: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentRequest {
    pub kind: String,
    pub display_name: String,
    pub storage_path: Option<String>,
    pub external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub collaborators: Vec<TaskCollaborator>,
    pub comments: Vec<TaskComment>,
    pub attachments: Vec<TaskAttachment>,
}

#[derive(Debug, Serialize)]
pub struct TaskStats {
    pub total_tasks: i64,
    pub not_started: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub overdue: i64,
    pub total_users: i64,
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        StoreError::Invalid(message) => (StatusCode::BAD_REQUEST, message),
        StoreError::Database(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {e}"),
        ),
    }
}

fn forbidden() -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, "Access denied".to_string())
}

/// Load the task and the actor's collaborator link; 404 if the task does
/// not exist (a distinct condition from denial).
fn load_task_context(
    conn: &mut diesel::PgConnection,
    actor: &AuthenticatedUser,
    task_id: Uuid,
) -> Result<(Task, Option<policy::Permission>), (StatusCode, String)> {
    let task = store::load_task(conn, task_id)
        .map_err(store_error)?
        .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))?;
    let link = store::collaborator_permission(conn, task_id, actor.user_id)
        .map_err(store_error)?;
    Ok((task, link))
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

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;

    if !policy::can_create(&actor) {
        return Err(forbidden());
    }

    let task = store::create_task(
        &mut conn,
        &actor,
        store::NewTaskInput {
            title: req.title,
            description: req.description,
            priority: req.priority,
            due_date: req.due_date,
        },
    )
    .map_err(store_error)?;

    Ok(Json(task))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;

    let tasks = store::list_tasks(
        &mut conn,
        &actor,
        &store::TaskFilters {
            status: query.status,
            priority: query.priority,
            search: query.search,
            limit: query.limit,
            offset: query.offset,
        },
    )
    .map_err(store_error)?;

    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_view(&actor, &task, link) {
        return Err(forbidden());
    }

    Ok(Json(task))
}

pub async fn get_task_detail(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetail>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_view(&actor, &task, link) {
        return Err(forbidden());
    }

    let collaborators = store::list_collaborators(&mut conn, id).map_err(store_error)?;
    let comments = store::list_comments(&mut conn, id).map_err(store_error)?;
    let attachments = store::list_attachments(&mut conn, id).map_err(store_error)?;

    Ok(Json(TaskDetail {
        task,
        collaborators,
        comments,
        attachments,
    }))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_edit(&actor, &task, link) {
        return Err(forbidden());
    }

    let (updated, _changes) = store::update_task(
        &mut conn,
        &actor,
        &task,
        store::TaskChanges {
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
        },
    )
    .map_err(store_error)?;

    Ok(Json(updated))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, _link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_delete(&actor, &task) {
        return Err(forbidden());
    }

    store::delete_task(&mut conn, &actor, &task).map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_collaborators(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskCollaborator>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_view(&actor, &task, link) {
        return Err(forbidden());
    }

    let collaborators = store::list_collaborators(&mut conn, id).map_err(store_error)?;
    Ok(Json(collaborators))
}

pub async fn sync_collaborators(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SyncCollaboratorsRequest>,
) -> Result<Json<SyncCollaboratorsResponse>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_edit(&actor, &task, link) {
        return Err(forbidden());
    }

    let entries = req
        .collaborators
        .into_iter()
        .map(|entry| store::CollaboratorEntry {
            user_id: entry.user_id,
            permission: entry.permission,
        })
        .collect();

    let newly_added =
        store::sync_collaborators(&mut conn, &actor, &task, entries).map_err(store_error)?;
    let collaborators = store::list_collaborators(&mut conn, id).map_err(store_error)?;

    Ok(Json(SyncCollaboratorsResponse {
        collaborators,
        newly_added,
    }))
}

pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskActivity>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_view(&actor, &task, link) {
        return Err(forbidden());
    }

    let activities = activity::list_for_task(&mut conn, id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(activities))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskComment>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_view(&actor, &task, link) {
        return Err(forbidden());
    }

    let comments = store::list_comments(&mut conn, id).map_err(store_error)?;
    Ok(Json(comments))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<Json<TaskComment>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_comment(&actor, &task, link) {
        return Err(forbidden());
    }

    let comment = store::add_comment(
        &mut conn,
        &actor,
        &task,
        store::NewCommentInput {
            body: req.body,
            parent_id: req.parent_id,
        },
    )
    .map_err(store_error)?;

    Ok(Json(comment))
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskAttachment>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_view(&actor, &task, link) {
        return Err(forbidden());
    }

    let attachments = store::list_attachments(&mut conn, id).map_err(store_error)?;
    Ok(Json(attachments))
}

pub async fn add_attachment(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateAttachmentRequest>,
) -> Result<Json<TaskAttachment>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_edit(&actor, &task, link) {
        return Err(forbidden());
    }

    let attachment = store::add_attachment(
        &mut conn,
        &actor,
        &task,
        store::NewAttachmentInput {
            kind: req.kind,
            display_name: req.display_name,
            storage_path: req.storage_path,
            external_url: req.external_url,
        },
    )
    .map_err(store_error)?;

    Ok(Json(attachment))
}

pub async fn remove_attachment(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path((id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let (task, link) = load_task_context(&mut conn, &actor, id)?;

    if !policy::can_edit(&actor, &task, link) {
        return Err(forbidden());
    }

    store::remove_attachment(&mut conn, &actor, &task, attachment_id).map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dashboard counters. Requires admin privileges (admin or semi_admin);
/// this is a read scope, not the authorization bypass.
pub async fn get_task_stats(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
) -> Result<Json<TaskStats>, (StatusCode, String)> {
    if !actor.has_admin_privileges() {
        return Err(forbidden());
    }

    let mut conn = get_conn(&state)?;

    let count_status = |conn: &mut diesel::PgConnection, status: &str| -> i64 {
        tasks::table
            .filter(tasks::status.eq(status))
            .count()
            .get_result(conn)
            .unwrap_or(0)
    };

    let total_tasks: i64 = tasks::table.count().get_result(&mut conn).unwrap_or(0);
    let not_started = count_status(&mut conn, STATUS_NOT_STARTED);
    let in_progress = count_status(&mut conn, STATUS_IN_PROGRESS);
    let completed = count_status(&mut conn, STATUS_COMPLETED);
    let cancelled = count_status(&mut conn, STATUS_CANCELLED);

    let today = Utc::now().date_naive();
    let overdue: i64 = tasks::table
        .filter(tasks::status.ne(STATUS_COMPLETED))
        .filter(tasks::status.ne(STATUS_CANCELLED))
        .filter(tasks::due_date.lt(today))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    let total_users: i64 = users::table.count().get_result(&mut conn).unwrap_or(0);

    Ok(Json(TaskStats {
        total_tasks,
        not_started,
        in_progress,
        completed,
        cancelled,
        overdue,
        total_users,
    }))
}

pub fn configure_tasks_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/stats", get(get_task_stats))
        .route(
            "/api/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/full", get(get_task_detail))
        .route(
            "/api/tasks/:id/collaborators",
            get(list_collaborators).put(sync_collaborators),
        )
        .route("/api/tasks/:id/activities", get(list_activities))
        .route(
            "/api/tasks/:id/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/api/tasks/:id/attachments",
            get(list_attachments).post(add_attachment),
        )
        .route(
            "/api/tasks/:id/attachments/:attachment_id",
            delete(remove_attachment),
        )
}
