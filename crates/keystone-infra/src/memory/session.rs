use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use keystone_core::ports::{Repositories, StorageSession};
use keystone_core::{ScopeError, StorageFailure};
use uuid::Uuid;

use super::records::{MemoryContactRepository, MemoryRoleRepository, MemoryUserRepository};
use super::schema::{self, Row, TableSchema, Value, Values};
use super::store::{MemoryStore, Operation, lock};
use super::tables::{Change, ORIGIN, Tables};

#[derive(Debug)]
struct Transaction {
    working: Tables,
    changes: Vec<Change>,
}

#[derive(Debug, Default)]
struct SessionState {
    released: bool,
    transaction: Option<Transaction>,
}

/// One connection to a [`MemoryStore`].
///
/// The first statement after open, commit or rollback snapshots the committed
/// tables; writes go to that private copy and a change log, so other sessions
/// never see uncommitted data. Cloning shares the connection.
#[derive(Debug, Clone)]
pub struct MemorySession {
    store: Arc<MemoryStore>,
    state: Arc<Mutex<SessionState>>,
}

impl MemorySession {
    pub(crate) fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    fn with_transaction<R>(
        &self,
        operation: Operation,
        table: &str,
        work: impl FnOnce(&mut Transaction) -> Result<R, StorageFailure>,
    ) -> Result<R, StorageFailure> {
        let mut state = lock(&self.state);
        if state.released {
            return Err(session_closed());
        }
        self.store.check_fault(operation, Some(table))?;
        let store = &self.store;
        let transaction = state.transaction.get_or_insert_with(|| Transaction {
            working: store.snapshot(),
            changes: Vec::new(),
        });
        work(transaction)
    }

    fn write(&self, change: Change) -> Result<(), StorageFailure> {
        let table = match &change {
            Change::Insert(schema, _) | Change::Update(schema, _) | Change::Delete(schema, _) => schema.name,
        };
        self.with_transaction(Operation::Write, table, |tx| {
            tx.working.apply(&change)?;
            tx.changes.push(change);
            Ok(())
        })
    }

    pub fn fetch(&self, schema: &TableSchema, id: Uuid) -> Result<Option<Row>, StorageFailure> {
        self.with_transaction(Operation::Read, schema.name, |tx| {
            Ok(tx.working.get(schema.name, id).cloned())
        })
    }

    /// Rows matching all `conditions`, in insertion order.
    pub fn select(
        &self,
        schema: &TableSchema,
        conditions: &[(&'static str, Value)],
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StorageFailure> {
        self.with_transaction(Operation::Read, schema.name, |tx| {
            let matching = tx.working.select(schema.name, conditions).skip(skip);
            Ok(match limit {
                Some(limit) => matching.take(limit).cloned().collect(),
                None => matching.cloned().collect(),
            })
        })
    }

    pub fn insert(&self, schema: &'static TableSchema, id: Uuid, values: Values) -> Result<Row, StorageFailure> {
        let now = Utc::now();
        let row = Row {
            id,
            created_at: now,
            updated_at: now,
            values,
        };
        self.write(Change::Insert(schema, row.clone()))?;
        Ok(row)
    }

    /// Replace the values of an existing row, keeping `created_at`.
    pub fn update(&self, schema: &'static TableSchema, existing: &Row, values: Values) -> Result<Row, StorageFailure> {
        let row = Row {
            id: existing.id,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            values,
        };
        self.write(Change::Update(schema, row.clone()))?;
        Ok(row)
    }

    /// Deletes the row and, through foreign keys, its dependents.
    pub fn delete(&self, schema: &'static TableSchema, id: Uuid) -> Result<(), StorageFailure> {
        self.write(Change::Delete(schema, id))
    }

    /// Number of visible rows in `table`.
    pub fn count(&self, table: &str) -> Result<usize, StorageFailure> {
        let schema = schema::table(table).ok_or_else(|| {
            StorageFailure::programming(format!("relation \"{table}\" does not exist"))
                .with_code("42P01")
                .with_origin(ORIGIN)
        })?;
        self.with_transaction(Operation::Read, schema.name, |tx| Ok(tx.working.rows(schema.name).len()))
    }

    pub fn in_transaction(&self) -> bool {
        lock(&self.state).transaction.is_some()
    }
}

fn session_closed() -> StorageFailure {
    StorageFailure::programming("storage session is closed").with_origin(ORIGIN)
}

#[async_trait]
impl StorageSession for MemorySession {
    type Handle = MemorySession;

    fn bind(&self) -> Repositories {
        Repositories {
            users: Arc::new(MemoryUserRepository::new(self.clone())),
            roles: Arc::new(MemoryRoleRepository::new(self.clone())),
            contacts: Arc::new(MemoryContactRepository::new(self.clone())),
        }
    }

    fn handle(&self) -> Result<&MemorySession, ScopeError> {
        if lock(&self.state).released {
            return Err(ScopeError::NotActive);
        }
        Ok(self)
    }

    async fn commit(&self) -> Result<(), StorageFailure> {
        let transaction = {
            let mut state = lock(&self.state);
            if state.released {
                return Err(session_closed());
            }
            state.transaction.take()
        };
        // A failed commit still ends the transaction.
        self.store.check_fault(Operation::Commit, None)?;
        match transaction {
            Some(transaction) => {
                self.store.commit(&transaction.changes)?;
                tracing::debug!(changes = transaction.changes.len(), "memory transaction committed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn rollback(&self) -> Result<(), StorageFailure> {
        self.store.check_fault(Operation::Rollback, None)?;
        if let Some(transaction) = lock(&self.state).transaction.take() {
            tracing::debug!(changes = transaction.changes.len(), "memory transaction rolled back");
        }
        Ok(())
    }

    fn release(&self) {
        let mut state = lock(&self.state);
        if state.released {
            return;
        }
        state.released = true;
        state.transaction = None;
        self.store.session_released();
        tracing::debug!(open_sessions = self.store.open_sessions(), "memory session released");
    }
}
