use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::users;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SEMI_ADMIN: &str = "semi_admin";
pub const ROLE_EMPLOYEE: &str = "employee";

pub const USER_ROLES: [&str; 3] = [ROLE_ADMIN, ROLE_SEMI_ADMIN, ROLE_EMPLOYEE];

// Database model - matches schema exactly
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Strictly the admin role: full authorization bypass and
    /// admin notification fan-out.
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Elevated read scope for dashboards. Held by admin and semi_admin;
    /// does not bypass task-level authorization.
    pub fn has_admin_privileges(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_SEMI_ADMIN
    }
}

/// API-facing view of a user, without the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            photo_path: user.photo_path,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util;

    fn user_with_role(role: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            photo_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_role_has_both_scopes() {
        test_util::setup();
        let user = user_with_role(ROLE_ADMIN);
        assert!(user.is_admin());
        assert!(user.has_admin_privileges());
    }

    #[test]
    fn semi_admin_has_privileges_but_no_bypass() {
        test_util::setup();
        let user = user_with_role(ROLE_SEMI_ADMIN);
        assert!(!user.is_admin());
        assert!(user.has_admin_privileges());
    }

    #[test]
    fn employee_has_neither() {
        test_util::setup();
        let user = user_with_role(ROLE_EMPLOYEE);
        assert!(!user.is_admin());
        assert!(!user.has_admin_privileges());
    }
}
