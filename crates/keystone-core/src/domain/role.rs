use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A named permission group users can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: &str, description: Option<String>) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("role name must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn rename(&mut self, name: &str) -> Result<bool, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("role name must not be empty"));
        }
        if name == self.name {
            return Ok(false);
        }
        self.name = name.to_owned();
        self.updated_at = Utc::now();
        Ok(true)
    }

    pub fn describe(&mut self, description: Option<String>) -> bool {
        if self.description == description {
            return false;
        }
        self.description = description;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_is_rejected() {
        assert!(Role::new("   ", None).is_err());
        assert_eq!(Role::new(" admin ", None).unwrap().name, "admin");
    }

    #[test]
    fn test_rename_reports_change() {
        let mut role = Role::new("admin", None).unwrap();
        assert!(!role.rename("admin").unwrap());
        assert!(role.rename("owner").unwrap());
        assert!(role.rename("").is_err());
        assert_eq!(role.name, "owner");
    }
}
