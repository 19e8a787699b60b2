//! Personal journaling: one journal per user per calendar date, each
//! holding colored notes. Entirely separate from the task subsystem and
//! always scoped to the authenticated user; admin roles get no special
//! access here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::schema::{journal_notes, journals};
use crate::shared::state::AppState;

pub const MOODS: [&str; 5] = ["great", "good", "neutral", "bad", "awful"];

const DEFAULT_NOTE_COLOR: &str = "#ffffff";

// Database model - matches schema exactly
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = journals)]
pub struct Journal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entry_date: NaiveDate,
    pub mood: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = journal_notes)]
pub struct JournalNote {
    pub id: Uuid,
    pub journal_id: Uuid,
    pub title: String,
    pub content: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertJournalRequest {
    pub mood: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: String,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JournalWithNotes {
    pub journal: Journal,
    pub notes: Vec<JournalNote>,
}

fn parse_date(value: &str) -> Result<NaiveDate, (StatusCode, String)> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid date: {value}")))
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

fn load_journal(
    conn: &mut PgConnection,
    user_id: Uuid,
    date: NaiveDate,
) -> Result<Option<Journal>, (StatusCode, String)> {
    journals::table
        .filter(journals::user_id.eq(user_id))
        .filter(journals::entry_date.eq(date))
        .first(conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))
}

/// Fetch-or-create the journal for (user, date); unique per pair.
fn ensure_journal(
    conn: &mut PgConnection,
    user_id: Uuid,
    date: NaiveDate,
) -> Result<Journal, (StatusCode, String)> {
    if let Some(journal) = load_journal(conn, user_id, date)? {
        return Ok(journal);
    }

    let now = Utc::now();
    let journal = Journal {
        id: Uuid::new_v4(),
        user_id,
        entry_date: date,
        mood: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(journals::table)
        .values(&journal)
        .on_conflict((journals::user_id, journals::entry_date))
        .do_nothing()
        .execute(conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    // Re-read in case a concurrent request won the insert.
    load_journal(conn, user_id, date)?
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Journal vanished".to_string()))
}

pub async fn list_journals(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
) -> Result<Json<Vec<Journal>>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;

    let entries: Vec<Journal> = journals::table
        .filter(journals::user_id.eq(actor.user_id))
        .order(journals::entry_date.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(entries))
}

pub async fn get_journal(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(date): Path<String>,
) -> Result<Json<JournalWithNotes>, (StatusCode, String)> {
    let date = parse_date(&date)?;
    let mut conn = get_conn(&state)?;

    let journal = load_journal(&mut conn, actor.user_id, date)?
        .ok_or((StatusCode::NOT_FOUND, "No journal for that date".to_string()))?;

    let notes: Vec<JournalNote> = journal_notes::table
        .filter(journal_notes::journal_id.eq(journal.id))
        .order(journal_notes::created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(JournalWithNotes { journal, notes }))
}

pub async fn upsert_journal(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(date): Path<String>,
    Json(req): Json<UpsertJournalRequest>,
) -> Result<Json<Journal>, (StatusCode, String)> {
    let date = parse_date(&date)?;

    if let Some(mood) = &req.mood {
        if !MOODS.contains(&mood.as_str()) {
            return Err((StatusCode::BAD_REQUEST, format!("Invalid mood: {mood}")));
        }
    }

    let mut conn = get_conn(&state)?;
    let journal = ensure_journal(&mut conn, actor.user_id, date)?;

    let now = Utc::now();
    diesel::update(journals::table.filter(journals::id.eq(journal.id)))
        .set((
            journals::mood.eq(req.mood.as_deref()),
            journals::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    let journal = load_journal(&mut conn, actor.user_id, date)?
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Journal vanished".to_string()))?;
    Ok(Json(journal))
}

pub async fn add_note(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(date): Path<String>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<JournalNote>, (StatusCode, String)> {
    let date = parse_date(&date)?;

    if req.title.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title must not be empty".to_string()));
    }

    let mut conn = get_conn(&state)?;
    let journal = ensure_journal(&mut conn, actor.user_id, date)?;

    let now = Utc::now();
    let note = JournalNote {
        id: Uuid::new_v4(),
        journal_id: journal.id,
        title: req.title,
        content: req.content,
        color: req.color.unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(journal_notes::table)
        .values(&note)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(note))
}

/// Load a note and verify it belongs to a journal owned by the actor.
fn load_owned_note(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    note_id: Uuid,
) -> Result<JournalNote, (StatusCode, String)> {
    let note: JournalNote = journal_notes::table
        .filter(journal_notes::id.eq(note_id))
        .first(conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Note not found".to_string()))?;

    let owner: Uuid = journals::table
        .filter(journals::id.eq(note.journal_id))
        .select(journals::user_id)
        .first(conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    if owner != actor.user_id {
        return Err((StatusCode::FORBIDDEN, "Access denied".to_string()));
    }

    Ok(note)
}

pub async fn update_note(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<JournalNote>, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let note = load_owned_note(&mut conn, &actor, note_id)?;

    let title = req.title.unwrap_or(note.title);
    if title.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title must not be empty".to_string()));
    }
    let content = req.content.unwrap_or(note.content);
    let color = req.color.unwrap_or(note.color);
    let now = Utc::now();

    diesel::update(journal_notes::table.filter(journal_notes::id.eq(note_id)))
        .set((
            journal_notes::title.eq(&title),
            journal_notes::content.eq(&content),
            journal_notes::color.eq(&color),
            journal_notes::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    Ok(Json(JournalNote {
        id: note.id,
        journal_id: note.journal_id,
        title,
        content,
        color,
        created_at: note.created_at,
        updated_at: now,
    }))
}

pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = get_conn(&state)?;
    let note = load_owned_note(&mut conn, &actor, note_id)?;

    diesel::delete(journal_notes::table.filter(journal_notes::id.eq(note.id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_journal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/journals", get(list_journals))
        .route("/api/journals/:date", get(get_journal).put(upsert_journal))
        .route("/api/journals/:date/notes", post(add_note))
        .route(
            "/api/journal-notes/:id",
            put(update_note).delete(delete_note),
        )
}
