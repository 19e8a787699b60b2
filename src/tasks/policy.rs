//! Capability checks for tasks.
//!
//! Pure functions of (actor, task owner, collaborator link). The admin-role
//! override is evaluated first in every check; callers map a `false` result
//! to an access-denied response.

use crate::auth::AuthenticatedUser;
use crate::tasks::Task;

pub const PERMISSION_VIEW: &str = "view";
pub const PERMISSION_COMMENT: &str = "comment";
pub const PERMISSION_EDIT: &str = "edit";

pub const COLLABORATOR_PERMISSIONS: [&str; 3] =
    [PERMISSION_VIEW, PERMISSION_COMMENT, PERMISSION_EDIT];

/// Collaborator permission level, ordered by increasing capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    View,
    Comment,
    Edit,
}

impl Permission {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            PERMISSION_VIEW => Some(Self::View),
            PERMISSION_COMMENT => Some(Self::Comment),
            PERMISSION_EDIT => Some(Self::Edit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => PERMISSION_VIEW,
            Self::Comment => PERMISSION_COMMENT,
            Self::Edit => PERMISSION_EDIT,
        }
    }
}

pub fn can_view(actor: &AuthenticatedUser, task: &Task, link: Option<Permission>) -> bool {
    if actor.is_admin() {
        return true;
    }
    task.owner_id == actor.user_id || link.is_some()
}

pub fn can_edit(actor: &AuthenticatedUser, task: &Task, link: Option<Permission>) -> bool {
    if actor.is_admin() {
        return true;
    }
    task.owner_id == actor.user_id || link == Some(Permission::Edit)
}

pub fn can_comment(actor: &AuthenticatedUser, task: &Task, link: Option<Permission>) -> bool {
    if actor.is_admin() {
        return true;
    }
    task.owner_id == actor.user_id
        || matches!(link, Some(Permission::Comment) | Some(Permission::Edit))
}

/// Only the owner may delete; collaborators cannot, regardless of level.
pub fn can_delete(actor: &AuthenticatedUser, task: &Task) -> bool {
    if actor.is_admin() {
        return true;
    }
    task.owner_id == actor.user_id
}

pub fn can_create(_actor: &AuthenticatedUser) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{ROLE_ADMIN, ROLE_EMPLOYEE, ROLE_SEMI_ADMIN};
    use crate::tasks::{PRIORITY_MEDIUM, STATUS_NOT_STARTED};
    use crate::tests::test_util;
    use chrono::Utc;
    use uuid::Uuid;

    fn actor(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            name: "Actor".to_string(),
            email: "actor@example.com".to_string(),
            role: role.to_string(),
        }
    }

    fn task_owned_by(owner_id: Uuid) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            title: "Ship v2".to_string(),
            description: None,
            status: STATUS_NOT_STARTED.to_string(),
            priority: PRIORITY_MEDIUM.to_string(),
            due_date: None,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_holds_every_capability() {
        test_util::setup();
        let owner = actor(ROLE_EMPLOYEE);
        let task = task_owned_by(owner.user_id);
        assert!(can_view(&owner, &task, None));
        assert!(can_comment(&owner, &task, None));
        assert!(can_edit(&owner, &task, None));
        assert!(can_delete(&owner, &task));
    }

    #[test]
    fn non_collaborator_sees_nothing() {
        test_util::setup();
        let stranger = actor(ROLE_EMPLOYEE);
        let task = task_owned_by(Uuid::new_v4());
        assert!(!can_view(&stranger, &task, None));
        assert!(!can_comment(&stranger, &task, None));
        assert!(!can_edit(&stranger, &task, None));
        assert!(!can_delete(&stranger, &task));
    }

    #[test]
    fn view_collaborator_cannot_comment_until_raised() {
        test_util::setup();
        let collaborator = actor(ROLE_EMPLOYEE);
        let task = task_owned_by(Uuid::new_v4());
        assert!(can_view(&collaborator, &task, Some(Permission::View)));
        assert!(!can_comment(&collaborator, &task, Some(Permission::View)));
        assert!(can_comment(&collaborator, &task, Some(Permission::Comment)));
        assert!(can_comment(&collaborator, &task, Some(Permission::Edit)));
    }

    #[test]
    fn edit_collaborator_cannot_delete() {
        test_util::setup();
        let collaborator = actor(ROLE_EMPLOYEE);
        let task = task_owned_by(Uuid::new_v4());
        assert!(can_edit(&collaborator, &task, Some(Permission::Edit)));
        assert!(!can_delete(&collaborator, &task));
    }

    #[test]
    fn comment_collaborator_cannot_edit() {
        test_util::setup();
        let collaborator = actor(ROLE_EMPLOYEE);
        let task = task_owned_by(Uuid::new_v4());
        assert!(!can_edit(&collaborator, &task, Some(Permission::Comment)));
    }

    #[test]
    fn admin_bypasses_every_check() {
        test_util::setup();
        let admin = actor(ROLE_ADMIN);
        let task = task_owned_by(Uuid::new_v4());
        assert!(can_view(&admin, &task, None));
        assert!(can_comment(&admin, &task, None));
        assert!(can_edit(&admin, &task, None));
        assert!(can_delete(&admin, &task));
    }

    #[test]
    fn semi_admin_gets_no_bypass() {
        test_util::setup();
        let semi = actor(ROLE_SEMI_ADMIN);
        let task = task_owned_by(Uuid::new_v4());
        assert!(!can_view(&semi, &task, None));
        assert!(!can_delete(&semi, &task));
    }

    #[test]
    fn permission_ordering() {
        test_util::setup();
        assert!(Permission::View < Permission::Comment);
        assert!(Permission::Comment < Permission::Edit);
        assert_eq!(Permission::parse("edit"), Some(Permission::Edit));
        assert_eq!(Permission::parse("owner"), None);
    }
}
