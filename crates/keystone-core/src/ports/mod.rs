//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod repository;
mod storage;

pub use auth::{PasswordError, PasswordHasher};
pub use repository::{BaseRepository, ContactRepository, Page, RoleRepository, UserRepository};
pub use storage::{Repositories, SessionFactory, StorageSession};
