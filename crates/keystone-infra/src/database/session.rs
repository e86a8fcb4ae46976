use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keystone_core::ports::{Repositories, SessionFactory, StorageSession};
use keystone_core::{ScopeError, StorageFailure};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, ExecResult, QueryResult, Statement,
    TransactionTrait,
};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::connections::{self, DatabaseConfig};
use super::failure::DbResultExt;
use super::repositories::{SeaOrmContactRepository, SeaOrmRoleRepository, SeaOrmUserRepository};

/// Opens [`SeaOrmSession`]s over one connection pool.
#[derive(Clone)]
pub struct SeaOrmSessionFactory {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmSessionFactory {
    pub fn new(db: impl Into<Arc<DatabaseConnection>>) -> Self {
        Self { db: db.into() }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageFailure> {
        let db = connections::connect(config).await.or_failure()?;
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl SessionFactory for SeaOrmSessionFactory {
    type Session = SeaOrmSession;

    async fn open(&self) -> Result<SeaOrmSession, StorageFailure> {
        Ok(SeaOrmSession::new(Arc::clone(&self.db)))
    }
}

/// A pooled connection with a lazily started transaction.
///
/// Repositories bound to the session share its transaction. The transaction
/// begins with the first statement after open, commit or rollback.
#[derive(Clone)]
pub struct SeaOrmSession {
    db: Arc<DatabaseConnection>,
    released: Arc<AtomicBool>,
    transaction: Arc<Mutex<Option<DatabaseTransaction>>>,
}

impl SeaOrmSession {
    fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            released: Arc::new(AtomicBool::new(false)),
            transaction: Arc::new(Mutex::new(None)),
        }
    }

    /// The open transaction, started if necessary.
    pub(crate) async fn transaction(&self) -> Result<MappedMutexGuard<'_, DatabaseTransaction>, StorageFailure> {
        if self.released.load(Ordering::SeqCst) {
            return Err(session_closed());
        }
        let mut slot = self.transaction.lock().await;
        if slot.is_none() {
            *slot = Some(self.db.begin().await.or_failure()?);
            tracing::debug!("database transaction started");
        }
        MutexGuard::try_map(slot, Option::as_mut).map_err(|_| session_closed())
    }

    pub async fn execute(&self, statement: Statement) -> Result<ExecResult, StorageFailure> {
        let tx = self.transaction().await?;
        tx.execute(statement).await.or_failure()
    }

    pub async fn query_all(&self, statement: Statement) -> Result<Vec<QueryResult>, StorageFailure> {
        let tx = self.transaction().await?;
        tx.query_all(statement).await.or_failure()
    }
}

fn session_closed() -> StorageFailure {
    StorageFailure::programming("storage session is closed").with_origin("keystone_infra::database::SeaOrmSession")
}

#[async_trait]
impl StorageSession for SeaOrmSession {
    type Handle = SeaOrmSession;

    fn bind(&self) -> Repositories {
        Repositories {
            users: Arc::new(SeaOrmUserRepository::new(self.clone())),
            roles: Arc::new(SeaOrmRoleRepository::new(self.clone())),
            contacts: Arc::new(SeaOrmContactRepository::new(self.clone())),
        }
    }

    fn handle(&self) -> Result<&SeaOrmSession, ScopeError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ScopeError::NotActive);
        }
        Ok(self)
    }

    async fn commit(&self) -> Result<(), StorageFailure> {
        if self.released.load(Ordering::SeqCst) {
            return Err(session_closed());
        }
        let transaction = self.transaction.lock().await.take();
        match transaction {
            Some(tx) => {
                tx.commit().await.or_failure()?;
                tracing::debug!("database transaction committed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn rollback(&self) -> Result<(), StorageFailure> {
        let transaction = self.transaction.lock().await.take();
        match transaction {
            Some(tx) => {
                tx.rollback().await.or_failure()?;
                tracing::debug!("database transaction rolled back");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping an open DatabaseTransaction rolls it back.
        match self.transaction.try_lock() {
            Ok(mut slot) => {
                if slot.take().is_some() {
                    tracing::debug!("discarding open database transaction");
                }
            }
            Err(_) => tracing::warn!("session released while a statement was in flight"),
        }
    }
}
