use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Contact, Role, User};
use crate::error::DomainError;

/// Window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

/// Generic repository trait defining standard CRUD operations.
///
/// Repositories never commit. Their writes become durable only when the
/// enclosing work scope exits successfully.
#[async_trait]
pub trait BaseRepository<T, ID>: Send + Sync {
    /// Find an entity by its unique ID.
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, DomainError>;

    /// Insert or update, returning the entity as storage now holds it.
    async fn save(&self, entity: T) -> Result<T, DomainError>;

    /// Delete an entity by its ID. Deleting a missing entity is a no-op.
    async fn delete(&self, id: ID) -> Result<(), DomainError>;

    /// List entities in storage order. Records that cannot be turned back
    /// into entities are skipped.
    async fn find_all(&self, page: Page) -> Result<Vec<T>, DomainError>;
}

/// User repository with domain-specific methods.
#[async_trait]
pub trait UserRepository: BaseRepository<User, Uuid> {
    /// Find a user by their email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError>;

    /// Link a user to a role. Linking twice is a no-op.
    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError>;

    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError>;

    async fn roles_of(&self, user_id: Uuid) -> Result<Vec<Role>, DomainError>;
}

#[async_trait]
pub trait RoleRepository: BaseRepository<Role, Uuid> {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, DomainError>;
}

#[async_trait]
pub trait ContactRepository: BaseRepository<Contact, Uuid> {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Contact>, DomainError>;
}
