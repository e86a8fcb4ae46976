//! Storage session ports.
//!
//! A [`SessionFactory`] hands out one [`StorageSession`] per work scope. The
//! session owns a single connection and transaction; the repositories it binds
//! share that transaction and never commit on their own.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ContactRepository, RoleRepository, UserRepository};
use crate::error::ScopeError;
use crate::failure::StorageFailure;

/// Opens storage sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: StorageSession;

    async fn open(&self) -> Result<Self::Session, StorageFailure>;
}

/// One connection to storage plus its transaction state.
///
/// A transaction begins implicitly with the first statement after open,
/// commit or rollback. Commit and rollback without an open transaction are
/// no-ops.
#[async_trait]
pub trait StorageSession: Send + Sync + 'static {
    /// Backend-specific handle for statements outside the repositories.
    type Handle: Send + Sync;

    /// Repositories sharing this session's transaction.
    fn bind(&self) -> Repositories;

    fn handle(&self) -> Result<&Self::Handle, ScopeError>;

    async fn commit(&self) -> Result<(), StorageFailure>;

    async fn rollback(&self) -> Result<(), StorageFailure>;

    /// Return the connection. Any open transaction is discarded. Once
    /// released, every operation on the session or its repositories fails.
    fn release(&self);
}

/// The repository set bound to one session.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub contacts: Arc<dyn ContactRepository>,
}
