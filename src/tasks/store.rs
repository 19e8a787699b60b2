//! Persistence layer for tasks, comments, attachments and collaborator
//! links.
//!
//! Every mutation runs in one transaction together with the audit rows and
//! queued notification events it produces, so a committed change is never
//! visible without its log entry.

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::notify::{self, EventKind};
use crate::shared::schema::{
    task_activities, task_attachments, task_collaborators, task_comments, tasks, users,
};
use crate::tasks::activity;
use crate::tasks::policy::{Permission, COLLABORATOR_PERMISSIONS};
use crate::tasks::{
    Task, TaskAttachment, TaskCollaborator, TaskComment, ATTACHMENT_KINDS, ATTACHMENT_LINK,
    PRIORITY_MEDIUM, STATUS_COMPLETED, STATUS_NOT_STARTED, TASK_PRIORITIES, TASK_STATUSES,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewTaskInput {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Partial change set applied against the pre-update snapshot.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct CollaboratorEntry {
    pub user_id: Uuid,
    pub permission: String,
}

#[derive(Debug, Clone)]
pub struct NewCommentInput {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewAttachmentInput {
    pub kind: String,
    pub display_name: String,
    pub storage_path: Option<String>,
    pub external_url: Option<String>,
}

fn validate_status(status: &str) -> StoreResult<()> {
    if TASK_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!("invalid status: {status}")))
    }
}

fn validate_priority(priority: &str) -> StoreResult<()> {
    if TASK_PRIORITIES.contains(&priority) {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!("invalid priority: {priority}")))
    }
}

/// Resolve the storage columns for an attachment: links carry an external
/// URL, files and images a storage path, never both.
pub fn attachment_fields(
    kind: &str,
    storage_path: Option<String>,
    external_url: Option<String>,
) -> StoreResult<(Option<String>, Option<String>)> {
    if !ATTACHMENT_KINDS.contains(&kind) {
        return Err(StoreError::Invalid(format!("invalid attachment kind: {kind}")));
    }

    if kind == ATTACHMENT_LINK {
        match (storage_path, external_url) {
            (None, Some(url)) => Ok((None, Some(url))),
            _ => Err(StoreError::Invalid(
                "link attachments require an external URL and no storage path".to_string(),
            )),
        }
    } else {
        match (storage_path, external_url) {
            (Some(path), None) => Ok((Some(path), None)),
            _ => Err(StoreError::Invalid(
                "file and image attachments require a storage path and no URL".to_string(),
            )),
        }
    }
}

/// Deduplicate collaborator entries by user, keeping the last permission
/// given for a user (last write wins) and the first-seen order.
pub fn dedupe_entries(entries: Vec<CollaboratorEntry>) -> Vec<CollaboratorEntry> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut by_user: std::collections::HashMap<Uuid, String> = std::collections::HashMap::new();

    for entry in entries {
        if !by_user.contains_key(&entry.user_id) {
            order.push(entry.user_id);
        }
        by_user.insert(entry.user_id, entry.permission);
    }

    order
        .into_iter()
        .map(|user_id| CollaboratorEntry {
            user_id,
            permission: by_user.remove(&user_id).unwrap_or_default(),
        })
        .collect()
}

pub fn load_task(conn: &mut PgConnection, task_id: Uuid) -> StoreResult<Option<Task>> {
    Ok(tasks::table
        .filter(tasks::id.eq(task_id))
        .first(conn)
        .optional()?)
}

/// The collaborator permission the user holds on the task, if any.
pub fn collaborator_permission(
    conn: &mut PgConnection,
    task_id: Uuid,
    user_id: Uuid,
) -> StoreResult<Option<Permission>> {
    let stored: Option<String> = task_collaborators::table
        .filter(task_collaborators::task_id.eq(task_id))
        .filter(task_collaborators::user_id.eq(user_id))
        .select(task_collaborators::permission)
        .first(conn)
        .optional()?;

    // Unknown stored values degrade to view; the write path rejects them.
    Ok(stored.map(|value| Permission::parse(&value).unwrap_or(Permission::View)))
}

pub fn list_collaborators(
    conn: &mut PgConnection,
    task_id: Uuid,
) -> StoreResult<Vec<TaskCollaborator>> {
    Ok(task_collaborators::table
        .filter(task_collaborators::task_id.eq(task_id))
        .order(task_collaborators::created_at.asc())
        .load(conn)?)
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Tasks visible to the viewer: owned or collaborated on; admins see all.
pub fn list_tasks(
    conn: &mut PgConnection,
    viewer: &AuthenticatedUser,
    filters: &TaskFilters,
) -> StoreResult<Vec<Task>> {
    let mut query = tasks::table.into_boxed();

    if !viewer.is_admin() {
        let collaborating: Vec<Uuid> = task_collaborators::table
            .filter(task_collaborators::user_id.eq(viewer.user_id))
            .select(task_collaborators::task_id)
            .load(conn)?;
        query = query.filter(
            tasks::owner_id
                .eq(viewer.user_id)
                .or(tasks::id.eq_any(collaborating)),
        );
    }

    if let Some(status) = &filters.status {
        query = query.filter(tasks::status.eq(status.clone()));
    }
    if let Some(priority) = &filters.priority {
        query = query.filter(tasks::priority.eq(priority.clone()));
    }
    if let Some(search) = &filters.search {
        let pattern = format!("%{search}%");
        query = query.filter(
            tasks::title
                .ilike(pattern.clone())
                .or(tasks::description.ilike(pattern)),
        );
    }

    Ok(query
        .order(tasks::created_at.desc())
        .limit(filters.limit.unwrap_or(50))
        .offset(filters.offset.unwrap_or(0))
        .load(conn)?)
}

/// Create a task owned by the actor, with its audit row and the
/// task-created notification event in the same transaction.
pub fn create_task(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    input: NewTaskInput,
) -> StoreResult<Task> {
    if input.title.trim().is_empty() {
        return Err(StoreError::Invalid("title must not be empty".to_string()));
    }
    let priority = input.priority.unwrap_or_else(|| PRIORITY_MEDIUM.to_string());
    validate_priority(&priority)?;

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        title: input.title,
        description: input.description,
        status: STATUS_NOT_STARTED.to_string(),
        priority,
        due_date: input.due_date,
        owner_id: actor.user_id,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::insert_into(tasks::table).values(&task).execute(conn)?;
        activity::record(
            conn,
            task.id,
            Some(actor.user_id),
            &activity::created_description(),
        )?;
        notify::enqueue_event(conn, task.id, Some(actor.user_id), &EventKind::TaskCreated)?;
        Ok(())
    })?;

    Ok(task)
}

/// Apply a partial change set against the current snapshot. Returns the
/// updated row plus the audit descriptions generated from the diff.
pub fn update_task(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    old: &Task,
    changes: TaskChanges,
) -> StoreResult<(Task, Vec<String>)> {
    let mut updated = old.clone();
    if let Some(title) = changes.title {
        if title.trim().is_empty() {
            return Err(StoreError::Invalid("title must not be empty".to_string()));
        }
        updated.title = title;
    }
    if let Some(description) = changes.description {
        updated.description = Some(description);
    }
    if let Some(status) = changes.status {
        validate_status(&status)?;
        updated.status = status;
    }
    if let Some(priority) = changes.priority {
        validate_priority(&priority)?;
        updated.priority = priority;
    }
    if let Some(due_date) = changes.due_date {
        updated.due_date = Some(due_date);
    }
    updated.updated_at = Utc::now();

    let descriptions = activity::diff_descriptions(old, &updated);
    let completed = old.status != STATUS_COMPLETED && updated.status == STATUS_COMPLETED;

    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::update(tasks::table.filter(tasks::id.eq(old.id)))
            .set((
                tasks::title.eq(&updated.title),
                tasks::description.eq(updated.description.as_deref()),
                tasks::status.eq(&updated.status),
                tasks::priority.eq(&updated.priority),
                tasks::due_date.eq(updated.due_date),
                tasks::updated_at.eq(updated.updated_at),
            ))
            .execute(conn)?;

        for description in &descriptions {
            activity::record(conn, old.id, Some(actor.user_id), description)?;
        }

        if completed {
            notify::enqueue_event(conn, old.id, Some(actor.user_id), &EventKind::TaskCompleted)?;
        }
        Ok(())
    })?;

    Ok((updated, descriptions))
}

/// Delete a task and its children. The deletion audit row is written first
/// so it is the last entry observable before the cascade removes the log.
pub fn delete_task(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    task: &Task,
) -> StoreResult<()> {
    conn.transaction::<_, StoreError, _>(|conn| {
        activity::record(
            conn,
            task.id,
            Some(actor.user_id),
            &activity::deleted_description(&task.title),
        )?;

        diesel::delete(task_activities::table.filter(task_activities::task_id.eq(task.id)))
            .execute(conn)?;
        diesel::delete(task_comments::table.filter(task_comments::task_id.eq(task.id)))
            .execute(conn)?;
        diesel::delete(task_attachments::table.filter(task_attachments::task_id.eq(task.id)))
            .execute(conn)?;
        diesel::delete(
            task_collaborators::table.filter(task_collaborators::task_id.eq(task.id)),
        )
        .execute(conn)?;
        diesel::delete(tasks::table.filter(tasks::id.eq(task.id))).execute(conn)?;
        Ok(())
    })?;

    Ok(())
}

/// Replace the collaborator set with the given (user, permission) pairs.
/// Returns the user ids that were newly granted access; only those feed
/// the collaborators-added notification event. Last write wins.
pub fn sync_collaborators(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    task: &Task,
    entries: Vec<CollaboratorEntry>,
) -> StoreResult<Vec<Uuid>> {
    let entries = dedupe_entries(entries);

    for entry in &entries {
        if !COLLABORATOR_PERMISSIONS.contains(&entry.permission.as_str()) {
            return Err(StoreError::Invalid(format!(
                "invalid permission: {}",
                entry.permission
            )));
        }
    }

    let user_ids: Vec<Uuid> = entries.iter().map(|entry| entry.user_id).collect();
    let known: i64 = users::table
        .filter(users::id.eq_any(&user_ids))
        .count()
        .get_result(conn)?;
    if known != user_ids.len() as i64 {
        return Err(StoreError::Invalid("unknown user in collaborator set".to_string()));
    }

    let existing: Vec<Uuid> = task_collaborators::table
        .filter(task_collaborators::task_id.eq(task.id))
        .select(task_collaborators::user_id)
        .load(conn)?;

    let added: Vec<Uuid> = user_ids
        .iter()
        .copied()
        .filter(|id| !existing.contains(id))
        .collect();

    let now = Utc::now();
    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::delete(
            task_collaborators::table
                .filter(task_collaborators::task_id.eq(task.id))
                .filter(task_collaborators::user_id.ne_all(&user_ids)),
        )
        .execute(conn)?;

        for entry in &entries {
            let row = TaskCollaborator {
                id: Uuid::new_v4(),
                task_id: task.id,
                user_id: entry.user_id,
                permission: entry.permission.clone(),
                created_at: now,
            };
            diesel::insert_into(task_collaborators::table)
                .values(&row)
                .on_conflict((task_collaborators::task_id, task_collaborators::user_id))
                .do_update()
                .set(task_collaborators::permission.eq(&entry.permission))
                .execute(conn)?;
        }

        if !added.is_empty() {
            notify::enqueue_event(
                conn,
                task.id,
                Some(actor.user_id),
                &EventKind::CollaboratorsAdded {
                    added: added.clone(),
                },
            )?;
        }
        Ok(())
    })?;

    Ok(added)
}

/// Add a comment, optionally as a single-level reply.
pub fn add_comment(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    task: &Task,
    input: NewCommentInput,
) -> StoreResult<TaskComment> {
    if input.body.trim().is_empty() {
        return Err(StoreError::Invalid("comment body must not be empty".to_string()));
    }

    if let Some(parent_id) = input.parent_id {
        let parent: Option<TaskComment> = task_comments::table
            .filter(task_comments::id.eq(parent_id))
            .first(conn)
            .optional()?;
        let Some(parent) = parent else {
            return Err(StoreError::NotFound);
        };
        if parent.task_id != task.id {
            return Err(StoreError::Invalid(
                "parent comment belongs to another task".to_string(),
            ));
        }
        if parent.parent_id.is_some() {
            return Err(StoreError::Invalid("replies cannot be nested further".to_string()));
        }
    }

    let now = Utc::now();
    let comment = TaskComment {
        id: Uuid::new_v4(),
        task_id: task.id,
        author_id: Some(actor.user_id),
        body: input.body,
        parent_id: input.parent_id,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::insert_into(task_comments::table)
            .values(&comment)
            .execute(conn)?;
        activity::record(
            conn,
            task.id,
            Some(actor.user_id),
            &activity::comment_description(),
        )?;
        notify::enqueue_event(conn, task.id, Some(actor.user_id), &EventKind::CommentAdded)?;
        Ok(())
    })?;

    Ok(comment)
}

pub fn list_comments(conn: &mut PgConnection, task_id: Uuid) -> StoreResult<Vec<TaskComment>> {
    Ok(task_comments::table
        .filter(task_comments::task_id.eq(task_id))
        .order(task_comments::created_at.asc())
        .load(conn)?)
}

pub fn add_attachment(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    task: &Task,
    input: NewAttachmentInput,
) -> StoreResult<TaskAttachment> {
    if input.display_name.trim().is_empty() {
        return Err(StoreError::Invalid("display name must not be empty".to_string()));
    }
    let (storage_path, external_url) =
        attachment_fields(&input.kind, input.storage_path, input.external_url)?;

    let attachment = TaskAttachment {
        id: Uuid::new_v4(),
        task_id: task.id,
        uploader_id: Some(actor.user_id),
        kind: input.kind,
        storage_path,
        external_url,
        display_name: input.display_name,
        created_at: Utc::now(),
    };

    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::insert_into(task_attachments::table)
            .values(&attachment)
            .execute(conn)?;
        activity::record(
            conn,
            task.id,
            Some(actor.user_id),
            &activity::attachment_added_description(&attachment.display_name),
        )?;
        Ok(())
    })?;

    Ok(attachment)
}

pub fn remove_attachment(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    task: &Task,
    attachment_id: Uuid,
) -> StoreResult<()> {
    let attachment: Option<TaskAttachment> = task_attachments::table
        .filter(task_attachments::id.eq(attachment_id))
        .filter(task_attachments::task_id.eq(task.id))
        .first(conn)
        .optional()?;
    let Some(attachment) = attachment else {
        return Err(StoreError::NotFound);
    };

    conn.transaction::<_, StoreError, _>(|conn| {
        diesel::delete(task_attachments::table.filter(task_attachments::id.eq(attachment.id)))
            .execute(conn)?;
        activity::record(
            conn,
            task.id,
            Some(actor.user_id),
            &activity::attachment_removed_description(&attachment.display_name),
        )?;
        Ok(())
    })?;

    Ok(())
}

pub fn list_attachments(
    conn: &mut PgConnection,
    task_id: Uuid,
) -> StoreResult<Vec<TaskAttachment>> {
    Ok(task_attachments::table
        .filter(task_attachments::task_id.eq(task_id))
        .order(task_attachments::created_at.asc())
        .load(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ATTACHMENT_FILE, ATTACHMENT_IMAGE};
    use crate::tests::test_util;

    #[test]
    fn link_attachments_carry_url_only() {
        test_util::setup();
        let fields = attachment_fields(
            ATTACHMENT_LINK,
            None,
            Some("https://example.com/doc".to_string()),
        )
        .unwrap();
        assert_eq!(fields, (None, Some("https://example.com/doc".to_string())));

        assert!(attachment_fields(ATTACHMENT_LINK, Some("/tmp/x".to_string()), None).is_err());
    }

    #[test]
    fn file_attachments_carry_path_only() {
        test_util::setup();
        let fields =
            attachment_fields(ATTACHMENT_FILE, Some("uploads/report.pdf".to_string()), None)
                .unwrap();
        assert_eq!(fields, (Some("uploads/report.pdf".to_string()), None));

        assert!(attachment_fields(
            ATTACHMENT_IMAGE,
            None,
            Some("https://example.com/pic.png".to_string())
        )
        .is_err());
    }

    #[test]
    fn unknown_attachment_kind_is_rejected() {
        test_util::setup();
        assert!(attachment_fields("video", Some("/tmp/x".to_string()), None).is_err());
    }

    #[test]
    fn duplicate_collaborator_entries_keep_last_permission() {
        test_util::setup();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let deduped = dedupe_entries(vec![
            CollaboratorEntry {
                user_id: user,
                permission: "view".to_string(),
            },
            CollaboratorEntry {
                user_id: other,
                permission: "comment".to_string(),
            },
            CollaboratorEntry {
                user_id: user,
                permission: "edit".to_string(),
            },
        ]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].user_id, user);
        assert_eq!(deduped[0].permission, "edit");
        assert_eq!(deduped[1].user_id, other);
        assert_eq!(deduped[1].permission, "comment");
    }
}
