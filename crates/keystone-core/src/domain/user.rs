use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Email;

/// User entity - an account that can sign in and hold roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user with generated ID and timestamps.
    pub fn new(email: Email, password_hash: String, full_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash,
            full_name,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether the name changed. Blank names are ignored.
    pub fn rename(&mut self, full_name: &str) -> bool {
        let full_name = full_name.trim();
        if full_name.is_empty() || full_name == self.full_name {
            return false;
        }
        self.full_name = full_name.to_owned();
        self.touch();
        true
    }

    pub fn change_email(&mut self, email: Email) -> bool {
        if email.as_str() == self.email {
            return false;
        }
        self.email = email.into();
        self.touch();
        true
    }

    pub fn change_password(&mut self, password_hash: String) {
        self.password_hash = password_hash;
        self.touch();
    }

    pub fn activate(&mut self) -> bool {
        self.set_active(true)
    }

    pub fn deactivate(&mut self) -> bool {
        self.set_active(false)
    }

    fn set_active(&mut self, active: bool) -> bool {
        if self.is_active == active {
            return false;
        }
        self.is_active = active;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(
            Email::parse("ana@example.com").unwrap(),
            "hash".into(),
            "Ana".into(),
        )
    }

    #[test]
    fn test_new_user_is_active() {
        let user = user();
        assert!(user.is_active);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_mutators_report_changes() {
        let mut user = user();
        let created = user.updated_at;
        assert!(!user.rename("  "));
        assert!(!user.rename("Ana"));
        assert!(user.rename("Ana Maria"));
        assert!(!user.change_email(Email::parse("ana@example.com").unwrap()));
        assert!(user.deactivate());
        assert!(!user.deactivate());
        assert!(user.activate());
        assert!(user.updated_at >= created);
    }
}
