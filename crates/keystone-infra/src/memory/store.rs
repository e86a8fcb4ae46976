//! Shared committed state of the in-memory engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use keystone_core::StorageFailure;
use keystone_core::ports::SessionFactory;

use super::schema::{Row, TableSchema};
use super::session::MemorySession;
use super::tables::{Change, Tables};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Storage operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Read,
    Write,
    Commit,
    Rollback,
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    table: Option<&'static str>,
    failure: StorageFailure,
}

/// Committed tables shared by every session, plus test hooks.
///
/// # Example
/// ```ignore
/// let store = Arc::new(MemoryStore::new());
/// store.fail_next(Operation::Commit, StorageFailure::operational("server closed the connection"));
/// let uow = UnitOfWork::new(Arc::new(MemorySessionFactory::new(store.clone())));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Tables>,
    faults: Mutex<Vec<Fault>>,
    open_sessions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `operation` on any table with `failure`.
    pub fn fail_next(&self, operation: Operation, failure: StorageFailure) {
        lock(&self.faults).push(Fault {
            operation,
            table: None,
            failure,
        });
    }

    /// Fail the next `operation` touching `table` with `failure`.
    pub fn fail_next_on(&self, operation: Operation, table: &'static str, failure: StorageFailure) {
        lock(&self.faults).push(Fault {
            operation,
            table: Some(table),
            failure,
        });
    }

    /// Sessions opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Committed rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.committed).rows(table).to_vec()
    }

    /// Store a row as committed without any constraint checks. Meant for
    /// fixtures that need data the engine would normally refuse.
    pub fn seed(&self, schema: &'static TableSchema, row: Row) {
        lock(&self.committed).seed(schema, row);
    }

    pub(crate) fn check_fault(&self, operation: Operation, table: Option<&str>) -> Result<(), StorageFailure> {
        let mut faults = lock(&self.faults);
        let position = faults.iter().position(|fault| {
            fault.operation == operation
                && match (fault.table, table) {
                    (None, _) => true,
                    (Some(wanted), Some(actual)) => wanted == actual,
                    (Some(_), None) => false,
                }
        });
        match position {
            Some(index) => Err(faults.remove(index).failure),
            None => Ok(()),
        }
    }

    pub(crate) fn snapshot(&self) -> Tables {
        lock(&self.committed).clone()
    }

    /// Replay a change log atomically: either every change lands or none.
    pub(crate) fn commit(&self, changes: &[Change]) -> Result<(), StorageFailure> {
        let mut committed = lock(&self.committed);
        let mut next = committed.clone();
        for change in changes {
            next.apply(change)?;
        }
        *committed = next;
        Ok(())
    }

    fn session_opened(&self) {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn session_released(&self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Opens [`MemorySession`]s over one [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemorySessionFactory {
    store: Arc<MemoryStore>,
}

impl MemorySessionFactory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl SessionFactory for MemorySessionFactory {
    type Session = MemorySession;

    async fn open(&self) -> Result<MemorySession, StorageFailure> {
        self.store.check_fault(Operation::Open, None)?;
        self.store.session_opened();
        tracing::debug!(open_sessions = self.store.open_sessions(), "memory session opened");
        Ok(MemorySession::new(Arc::clone(&self.store)))
    }
}
