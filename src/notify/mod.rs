//! Notification fan-out for task state transitions.
//!
//! Mutation paths enqueue a durable event job carrying identifiers only
//! (task id, event kind, actor id). The background worker resolves current
//! state when the job runs and fans out one delivery job per recipient, so
//! a delayed delivery never operates on a stale snapshot and one failing
//! recipient never blocks the rest.

pub mod mailer;
pub mod queue;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::shared::schema::notification_jobs;

pub const KIND_TASK_CREATED: &str = "task_created";
pub const KIND_COLLABORATORS_ADDED: &str = "collaborators_added";
pub const KIND_COMMENT_ADDED: &str = "comment_added";
pub const KIND_TASK_COMPLETED: &str = "task_completed";

pub const JOB_PENDING: &str = "pending";
pub const JOB_DONE: &str = "done";
pub const JOB_FAILED: &str = "failed";

// Database model - matches schema exactly
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = notification_jobs)]
pub struct NotificationJob {
    pub id: Uuid,
    pub task_id: Uuid,
    pub kind: String,
    /// None for event jobs; set on the per-recipient delivery jobs an
    /// event job fans out into.
    pub recipient_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A qualifying state transition on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    TaskCreated,
    CollaboratorsAdded { added: Vec<Uuid> },
    CommentAdded,
    TaskCompleted,
}

impl EventKind {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => KIND_TASK_CREATED,
            Self::CollaboratorsAdded { .. } => KIND_COLLABORATORS_ADDED,
            Self::CommentAdded => KIND_COMMENT_ADDED,
            Self::TaskCompleted => KIND_TASK_COMPLETED,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::CollaboratorsAdded { added } => serde_json::json!({ "added": added }),
            _ => serde_json::json!({}),
        }
    }

    pub fn from_parts(kind: &str, payload: &serde_json::Value) -> Option<Self> {
        match kind {
            KIND_TASK_CREATED => Some(Self::TaskCreated),
            KIND_COMMENT_ADDED => Some(Self::CommentAdded),
            KIND_TASK_COMPLETED => Some(Self::TaskCompleted),
            KIND_COLLABORATORS_ADDED => {
                let added = payload
                    .get("added")?
                    .as_array()?
                    .iter()
                    .filter_map(|value| value.as_str())
                    .filter_map(|value| value.parse::<Uuid>().ok())
                    .collect();
                Some(Self::CollaboratorsAdded { added })
            }
            _ => None,
        }
    }
}

/// Compute the recipient set for an event from current state.
///
/// The actor never receives their own notification and each user appears
/// at most once, whatever combination of collaborator, owner and admin
/// they happen to be.
pub fn compute_recipients(
    event: &EventKind,
    owner_id: Uuid,
    collaborator_ids: &[Uuid],
    admin_ids: &[Uuid],
    actor_id: Option<Uuid>,
) -> Vec<Uuid> {
    let candidates: Vec<Uuid> = match event {
        EventKind::TaskCreated => admin_ids.to_vec(),
        EventKind::CollaboratorsAdded { added } => added
            .iter()
            .copied()
            .filter(|id| *id != owner_id)
            .collect(),
        EventKind::CommentAdded => collaborator_ids.to_vec(),
        EventKind::TaskCompleted => {
            let mut all = collaborator_ids.to_vec();
            all.push(owner_id);
            all.extend_from_slice(admin_ids);
            all
        }
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|id| Some(*id) != actor_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Enqueue the durable event job for a qualifying transition. Called from
/// the store inside the mutating transaction so the event commits with the
/// change it describes.
pub fn enqueue_event(
    conn: &mut PgConnection,
    task_id: Uuid,
    actor_id: Option<Uuid>,
    event: &EventKind,
) -> QueryResult<()> {
    let now = Utc::now();
    let job = NotificationJob {
        id: Uuid::new_v4(),
        task_id,
        kind: event.kind_str().to_string(),
        recipient_id: None,
        actor_id,
        payload: event.payload(),
        status: JOB_PENDING.to_string(),
        attempts: 0,
        run_at: now,
        last_error: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(notification_jobs::table)
        .values(&job)
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util;

    #[test]
    fn task_created_notifies_admins_except_creator() {
        test_util::setup();
        let creator = Uuid::new_v4();
        let other_admin = Uuid::new_v4();
        let recipients = compute_recipients(
            &EventKind::TaskCreated,
            creator,
            &[],
            &[creator, other_admin],
            Some(creator),
        );
        assert_eq!(recipients, vec![other_admin]);
    }

    #[test]
    fn collaborators_added_skips_the_owner() {
        test_util::setup();
        let owner = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let invited = Uuid::new_v4();
        let recipients = compute_recipients(
            &EventKind::CollaboratorsAdded {
                added: vec![owner, invited],
            },
            owner,
            &[],
            &[],
            Some(actor),
        );
        assert_eq!(recipients, vec![invited]);
    }

    #[test]
    fn only_newly_added_collaborators_qualify() {
        test_util::setup();
        // The store reports only the delta, so a re-granted user never
        // reaches the event payload in the first place.
        let owner = Uuid::new_v4();
        let b = Uuid::new_v4();
        let recipients = compute_recipients(
            &EventKind::CollaboratorsAdded { added: vec![b] },
            owner,
            &[],
            &[],
            Some(owner),
        );
        assert_eq!(recipients, vec![b]);
    }

    #[test]
    fn comment_notifies_collaborators_minus_author() {
        test_util::setup();
        let owner = Uuid::new_v4();
        let author = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let recipients = compute_recipients(
            &EventKind::CommentAdded,
            owner,
            &[author, reader],
            &[],
            Some(author),
        );
        assert_eq!(recipients, vec![reader]);
    }

    #[test]
    fn completion_unions_and_deduplicates() {
        test_util::setup();
        let owner = Uuid::new_v4();
        let completer = Uuid::new_v4();
        let collaborator_admin = Uuid::new_v4();
        let plain_admin = Uuid::new_v4();
        let recipients = compute_recipients(
            &EventKind::TaskCompleted,
            owner,
            &[completer, collaborator_admin],
            &[collaborator_admin, plain_admin],
            Some(completer),
        );
        // collaborator_admin is both collaborator and admin: exactly once.
        assert_eq!(recipients, vec![collaborator_admin, owner, plain_admin]);
    }

    #[test]
    fn completion_by_owner_excludes_owner() {
        test_util::setup();
        let owner = Uuid::new_v4();
        let collaborator = Uuid::new_v4();
        let recipients = compute_recipients(
            &EventKind::TaskCompleted,
            owner,
            &[collaborator],
            &[],
            Some(owner),
        );
        assert_eq!(recipients, vec![collaborator]);
    }

    #[test]
    fn payload_round_trips_collaborator_ids() {
        test_util::setup();
        let added = vec![Uuid::new_v4(), Uuid::new_v4()];
        let event = EventKind::CollaboratorsAdded {
            added: added.clone(),
        };
        let parsed = EventKind::from_parts(event.kind_str(), &event.payload());
        assert_eq!(parsed, Some(EventKind::CollaboratorsAdded { added }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        test_util::setup();
        assert_eq!(
            EventKind::from_parts("task_reopened", &serde_json::json!({})),
            None
        );
    }
}
