//! Durable notification queue worker.
//!
//! A single background consumer polls `notification_jobs` for due work.
//! Event jobs resolve the recipient set from current state and fan out one
//! delivery job per recipient; delivery jobs send a single email. Failed
//! jobs are retried with exponential backoff until the attempt budget is
//! exhausted, then parked as failed with the last error kept for
//! inspection. Nothing here ever reports back to the request that caused
//! the event.

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::notify::mailer::Mailer;
use crate::notify::{
    compute_recipients, EventKind, NotificationJob, JOB_DONE, JOB_FAILED, JOB_PENDING,
    KIND_COLLABORATORS_ADDED, KIND_COMMENT_ADDED, KIND_TASK_COMPLETED, KIND_TASK_CREATED,
};
use crate::shared::models::{User, ROLE_ADMIN};
use crate::shared::schema::{notification_jobs, task_collaborators, tasks, users};
use crate::shared::state::AppState;
use crate::tasks::Task;

const POLL_SECONDS: u64 = 5;
const BATCH_SIZE: i64 = 25;
pub const MAX_ATTEMPTS: i32 = 5;

/// Retry delay after the given number of failed attempts: 60s doubling.
pub fn backoff_seconds(attempts: i32) -> i64 {
    60 * 2_i64.pow(attempts.saturating_sub(1).max(0) as u32)
}

/// Spawn the background consumer. Runs for the lifetime of the process.
pub fn spawn_worker(state: Arc<AppState>) {
    tokio::spawn(async move {
        info!("Starting notification worker");
        let mailer = Mailer::new(state.config.email.clone());
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(POLL_SECONDS));

        loop {
            interval.tick().await;

            match run_due_jobs(&state, &mailer) {
                Ok(0) => {}
                Ok(count) => debug!("Processed {count} notification jobs"),
                Err(e) => error!("Error processing notification jobs: {e}"),
            }
        }
    });
}

/// Process every due job once. Returns the number of jobs handled.
pub fn run_due_jobs(state: &AppState, mailer: &Mailer) -> Result<usize> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let due: Vec<NotificationJob> = notification_jobs::table
        .filter(notification_jobs::status.eq(JOB_PENDING))
        .filter(notification_jobs::run_at.le(now))
        .order(notification_jobs::run_at.asc())
        .limit(BATCH_SIZE)
        .load(&mut conn)?;

    let count = due.len();
    for job in due {
        let outcome = if job.recipient_id.is_none() {
            fan_out_event(&mut conn, &job)
        } else {
            deliver(&mut conn, mailer, &job)
        };

        match outcome {
            Ok(()) => {
                mark_done(&mut conn, job.id)?;
            }
            Err(e) => {
                warn!("Notification job {} failed: {e}", job.id);
                mark_retry(&mut conn, &job, &e.to_string())?;
            }
        }
    }

    Ok(count)
}

/// Resolve the recipient set for an event job and enqueue one delivery job
/// per recipient. State is read at run time, not at enqueue time.
fn fan_out_event(conn: &mut PgConnection, job: &NotificationJob) -> Result<()> {
    let Some(task) = load_task(conn, job.task_id)? else {
        // Task deleted while the job was queued; nothing to notify.
        return Ok(());
    };

    let event = EventKind::from_parts(&job.kind, &job.payload)
        .ok_or_else(|| anyhow!("unknown event kind: {}", job.kind))?;

    let collaborator_ids: Vec<Uuid> = task_collaborators::table
        .filter(task_collaborators::task_id.eq(task.id))
        .select(task_collaborators::user_id)
        .load(conn)?;

    let admin_ids: Vec<Uuid> = users::table
        .filter(users::role.eq(ROLE_ADMIN))
        .select(users::id)
        .load(conn)?;

    let recipients = compute_recipients(
        &event,
        task.owner_id,
        &collaborator_ids,
        &admin_ids,
        job.actor_id,
    );

    let now = Utc::now();
    let deliveries: Vec<NotificationJob> = recipients
        .into_iter()
        .map(|recipient_id| NotificationJob {
            id: Uuid::new_v4(),
            task_id: job.task_id,
            kind: job.kind.clone(),
            recipient_id: Some(recipient_id),
            actor_id: job.actor_id,
            payload: serde_json::json!({}),
            status: JOB_PENDING.to_string(),
            attempts: 0,
            run_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
        .collect();

    if !deliveries.is_empty() {
        diesel::insert_into(notification_jobs::table)
            .values(&deliveries)
            .execute(conn)?;
    }

    Ok(())
}

/// Send one email for a delivery job, re-resolving task and recipient so a
/// delayed run sees current data. A vanished task or recipient completes
/// the job as a no-op.
fn deliver(conn: &mut PgConnection, mailer: &Mailer, job: &NotificationJob) -> Result<()> {
    let Some(task) = load_task(conn, job.task_id)? else {
        return Ok(());
    };

    let recipient_id = job
        .recipient_id
        .ok_or_else(|| anyhow!("delivery job without recipient"))?;

    let Some(recipient) = load_user(conn, recipient_id)? else {
        return Ok(());
    };

    let actor_name = match job.actor_id {
        Some(actor_id) => load_user(conn, actor_id)?
            .map(|user| user.name)
            .unwrap_or_else(|| "Someone".to_string()),
        None => "Someone".to_string(),
    };

    let (subject, body) = render_email(&job.kind, &task, &actor_name, &recipient.name);
    mailer.send(&recipient.email, &subject, &body)?;
    Ok(())
}

/// Subject and plain-text body for a delivery.
pub fn render_email(
    kind: &str,
    task: &Task,
    actor_name: &str,
    recipient_name: &str,
) -> (String, String) {
    let (subject, line) = match kind {
        KIND_TASK_CREATED => (
            format!("New task: {}", task.title),
            format!("{} created the task '{}'.", actor_name, task.title),
        ),
        KIND_COLLABORATORS_ADDED => (
            format!("You were added to a task: {}", task.title),
            format!("{} shared the task '{}' with you.", actor_name, task.title),
        ),
        KIND_COMMENT_ADDED => (
            format!("New comment on: {}", task.title),
            format!("{} commented on the task '{}'.", actor_name, task.title),
        ),
        KIND_TASK_COMPLETED => (
            format!("Task completed: {}", task.title),
            format!(
                "{} marked the task '{}' as completed.",
                actor_name, task.title
            ),
        ),
        other => (
            format!("Update on task: {}", task.title),
            format!("{} updated the task '{}' ({other}).", actor_name, task.title),
        ),
    };

    let body = format!("Hi {recipient_name},\n\n{line}\n\nThe taskserver team");
    (subject, body)
}

fn mark_done(conn: &mut PgConnection, job_id: Uuid) -> QueryResult<usize> {
    diesel::update(notification_jobs::table.filter(notification_jobs::id.eq(job_id)))
        .set((
            notification_jobs::status.eq(JOB_DONE),
            notification_jobs::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
}

/// Bump the attempt counter and either reschedule with backoff or park the
/// job as failed once the budget is spent.
fn mark_retry(conn: &mut PgConnection, job: &NotificationJob, error: &str) -> QueryResult<usize> {
    let attempts = job.attempts + 1;
    let now = Utc::now();

    if attempts >= MAX_ATTEMPTS {
        error!(
            "Notification job {} exhausted {} attempts, marking failed",
            job.id, attempts
        );
        diesel::update(notification_jobs::table.filter(notification_jobs::id.eq(job.id)))
            .set((
                notification_jobs::status.eq(JOB_FAILED),
                notification_jobs::attempts.eq(attempts),
                notification_jobs::last_error.eq(error),
                notification_jobs::updated_at.eq(now),
            ))
            .execute(conn)
    } else {
        let run_at = now + Duration::seconds(backoff_seconds(attempts));
        diesel::update(notification_jobs::table.filter(notification_jobs::id.eq(job.id)))
            .set((
                notification_jobs::attempts.eq(attempts),
                notification_jobs::last_error.eq(error),
                notification_jobs::run_at.eq(run_at),
                notification_jobs::updated_at.eq(now),
            ))
            .execute(conn)
    }
}

fn load_task(conn: &mut PgConnection, task_id: Uuid) -> QueryResult<Option<Task>> {
    tasks::table
        .filter(tasks::id.eq(task_id))
        .first(conn)
        .optional()
}

fn load_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Option<User>> {
    users::table
        .filter(users::id.eq(user_id))
        .first(conn)
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{PRIORITY_LOW, STATUS_COMPLETED};
    use crate::tests::test_util;

    #[test]
    fn backoff_doubles_from_sixty_seconds() {
        test_util::setup();
        assert_eq!(backoff_seconds(1), 60);
        assert_eq!(backoff_seconds(2), 120);
        assert_eq!(backoff_seconds(3), 240);
        assert_eq!(backoff_seconds(4), 480);
    }

    #[test]
    fn completion_email_names_actor_and_task() {
        test_util::setup();
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: "Ship v2".to_string(),
            description: None,
            status: STATUS_COMPLETED.to_string(),
            priority: PRIORITY_LOW.to_string(),
            due_date: None,
            owner_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };

        let (subject, body) = render_email(KIND_TASK_COMPLETED, &task, "Ana", "Ben");
        assert_eq!(subject, "Task completed: Ship v2");
        assert!(body.contains("Hi Ben,"));
        assert!(body.contains("Ana marked the task 'Ship v2' as completed."));
    }
}
