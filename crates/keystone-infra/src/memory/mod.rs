//! In-memory storage engine.
//!
//! A transactional, constraint-checking stand-in for PostgreSQL. It needs no
//! external services, reports failures with PostgreSQL's codes and wording,
//! and can be told to fail specific operations.

mod records;
mod repository;
pub mod schema;
mod session;
mod store;
mod tables;

pub use records::{
    ContactRecord, MemoryContactRepository, MemoryRoleRepository, MemoryUserRepository, RoleRecord,
    UserRecord,
};
pub use repository::{MemoryRepository, RecordMapping};
pub use schema::{Row, RowError, Value, Values};
pub use session::MemorySession;
pub use store::{MemorySessionFactory, MemoryStore, Operation};
