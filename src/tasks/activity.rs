//! Append-only audit trail for tasks.
//!
//! One row per tracked mutation, attributed to the acting user and skipped
//! when no authenticated actor is present. Rows are never updated or
//! reordered and read back newest-first.

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::shared::schema::task_activities;
use crate::tasks::{Task, TaskActivity};

pub fn created_description() -> String {
    "created this task.".to_string()
}

pub fn deleted_description(title: &str) -> String {
    format!("deleted task: {title}")
}

pub fn comment_description() -> String {
    "added a comment.".to_string()
}

pub fn attachment_added_description(display_name: &str) -> String {
    format!("added attachment: '{display_name}'")
}

pub fn attachment_removed_description(display_name: &str) -> String {
    format!("removed attachment: '{display_name}'")
}

/// Diff two task snapshots into one description per changed field of
/// interest. Fields outside the audited set (priority, due date) change
/// silently.
pub fn diff_descriptions(old: &Task, new: &Task) -> Vec<String> {
    let mut descriptions = Vec::new();

    if old.status != new.status {
        descriptions.push(format!(
            "changed status from '{}' to '{}'",
            old.status, new.status
        ));
    }
    if old.title != new.title {
        descriptions.push(format!("updated title to '{}'", new.title));
    }
    if old.description != new.description {
        descriptions.push("updated description".to_string());
    }

    descriptions
}

/// Append one activity row. A missing actor skips the row entirely.
pub fn record(
    conn: &mut PgConnection,
    task_id: Uuid,
    actor_id: Option<Uuid>,
    description: &str,
) -> QueryResult<()> {
    let Some(actor_id) = actor_id else {
        return Ok(());
    };

    let row = TaskActivity {
        id: Uuid::new_v4(),
        task_id,
        actor_id: Some(actor_id),
        description: description.to_string(),
        created_at: Utc::now(),
    };

    diesel::insert_into(task_activities::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

/// Activities for a task, newest first.
pub fn list_for_task(conn: &mut PgConnection, task_id: Uuid) -> QueryResult<Vec<TaskActivity>> {
    task_activities::table
        .filter(task_activities::task_id.eq(task_id))
        .order(task_activities::created_at.desc())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{PRIORITY_HIGH, PRIORITY_MEDIUM, STATUS_IN_PROGRESS, STATUS_NOT_STARTED};
    use crate::tests::test_util;

    fn snapshot() -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            title: "Ship v2".to_string(),
            description: Some("first cut".to_string()),
            status: STATUS_NOT_STARTED.to_string(),
            priority: PRIORITY_MEDIUM.to_string(),
            due_date: None,
            owner_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unchanged_snapshot_yields_no_rows() {
        test_util::setup();
        let old = snapshot();
        let new = old.clone();
        assert!(diff_descriptions(&old, &new).is_empty());
    }

    #[test]
    fn status_change_echoes_old_and_new() {
        test_util::setup();
        let old = snapshot();
        let mut new = old.clone();
        new.status = STATUS_IN_PROGRESS.to_string();
        assert_eq!(
            diff_descriptions(&old, &new),
            vec!["changed status from 'not_started' to 'in_progress'".to_string()]
        );
    }

    #[test]
    fn description_change_does_not_echo_value() {
        test_util::setup();
        let old = snapshot();
        let mut new = old.clone();
        new.description = Some("rewritten".to_string());
        assert_eq!(
            diff_descriptions(&old, &new),
            vec!["updated description".to_string()]
        );
    }

    #[test]
    fn each_changed_field_yields_its_own_row() {
        test_util::setup();
        let old = snapshot();
        let mut new = old.clone();
        new.status = STATUS_IN_PROGRESS.to_string();
        new.title = "Ship v3".to_string();
        new.description = Some("rewritten".to_string());
        let descriptions = diff_descriptions(&old, &new);
        assert_eq!(
            descriptions,
            vec![
                "changed status from 'not_started' to 'in_progress'".to_string(),
                "updated title to 'Ship v3'".to_string(),
                "updated description".to_string(),
            ]
        );
    }

    #[test]
    fn priority_changes_are_not_audited() {
        test_util::setup();
        let old = snapshot();
        let mut new = old.clone();
        new.priority = PRIORITY_HIGH.to_string();
        assert!(diff_descriptions(&old, &new).is_empty());
    }
}
