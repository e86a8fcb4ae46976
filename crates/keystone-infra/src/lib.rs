//! # Keystone Infrastructure
//!
//! Storage backends for the ports defined in `keystone-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - In-memory engine only, no external dependencies
//! - `postgres` - PostgreSQL storage via SeaORM
//! - `auth` - Argon2 password hashing

pub mod database;
pub mod memory;

#[cfg(feature = "auth")]
pub mod auth;

// Re-exports - always available
pub use database::DatabaseConfig;
pub use memory::{MemorySession, MemorySessionFactory, MemoryStore, Operation};

#[cfg(feature = "postgres")]
pub use database::{SeaOrmSession, SeaOrmSessionFactory};

#[cfg(feature = "auth")]
pub use auth::Argon2PasswordHasher;

#[cfg(test)]
mod tests;
