use std::marker::PhantomData;

use async_trait::async_trait;
use keystone_core::ports::{BaseRepository, Page};
use keystone_core::{DomainError, ErrorMapper, StorageFailure};
use uuid::Uuid;

use super::schema::{Row, RowError, TableSchema, Value, Values};
use super::session::MemorySession;

/// How an entity is laid out in a table.
pub trait RecordMapping: Send + Sync + 'static {
    type Entity: Send + Sync + 'static;

    const SCHEMA: &'static TableSchema;

    fn id(entity: &Self::Entity) -> Uuid;

    /// Copy the entity's fields into `values`.
    fn populate(entity: &Self::Entity, values: &mut Values);

    fn reconstruct(row: &Row) -> Result<Self::Entity, RowError>;
}

/// Generic repository over one in-memory table.
pub struct MemoryRepository<M> {
    pub(crate) session: MemorySession,
    _mapping: PhantomData<fn() -> M>,
}

pub(crate) fn storage_error(failure: StorageFailure) -> DomainError {
    ErrorMapper::wrap(failure.into())
}

impl<M: RecordMapping> MemoryRepository<M> {
    pub fn new(session: MemorySession) -> Self {
        Self {
            session,
            _mapping: PhantomData,
        }
    }

    fn reconstruct(row: &Row) -> Result<M::Entity, DomainError> {
        M::reconstruct(row).map_err(|err| {
            DomainError::persistence(format!(
                "stored {} row {} is malformed: {err}",
                M::SCHEMA.name,
                row.id
            ))
            .with_cause(err)
        })
    }

    /// Conditions whose value is `None` are ignored.
    fn conditions(filter: &[(&'static str, Option<Value>)]) -> Vec<(&'static str, Value)> {
        filter
            .iter()
            .filter_map(|(column, value)| value.clone().map(|value| (*column, value)))
            .collect()
    }

    pub(crate) async fn find_one_by(
        &self,
        filter: &[(&'static str, Option<Value>)],
    ) -> Result<Option<M::Entity>, DomainError> {
        let rows = self
            .session
            .select(M::SCHEMA, &Self::conditions(filter), 0, None)
            .map_err(storage_error)?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => Self::reconstruct(row).map(Some),
            _ => Err(storage_error(StorageFailure::driver(format!(
                "multiple rows were found in {} where one was expected",
                M::SCHEMA.name
            )))),
        }
    }

    /// Rows that fail to reconstruct are logged and skipped.
    pub(crate) async fn find_many_by(
        &self,
        filter: &[(&'static str, Option<Value>)],
        page: Page,
    ) -> Result<Vec<M::Entity>, DomainError> {
        let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        let rows = self
            .session
            .select(M::SCHEMA, &Self::conditions(filter), skip, Some(limit))
            .map_err(storage_error)?;

        Ok(rows
            .iter()
            .filter_map(|row| match M::reconstruct(row) {
                Ok(entity) => Some(entity),
                Err(err) => {
                    tracing::warn!(table = M::SCHEMA.name, id = %row.id, error = %err, "skipping malformed row");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl<M: RecordMapping> BaseRepository<M::Entity, Uuid> for MemoryRepository<M> {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<M::Entity>, DomainError> {
        let row = self.session.fetch(M::SCHEMA, id).map_err(storage_error)?;
        row.as_ref().map(Self::reconstruct).transpose()
    }

    async fn save(&self, entity: M::Entity) -> Result<M::Entity, DomainError> {
        let id = M::id(&entity);
        tracing::debug!(table = M::SCHEMA.name, %id, "saving record");

        let existing = self.session.fetch(M::SCHEMA, id).map_err(storage_error)?;
        let stored = match existing {
            Some(row) => {
                let mut values = row.values.clone();
                M::populate(&entity, &mut values);
                self.session.update(M::SCHEMA, &row, values)
            }
            None => {
                let mut values = Values::new();
                M::populate(&entity, &mut values);
                self.session.insert(M::SCHEMA, id, values)
            }
        }
        .map_err(storage_error)?;

        Self::reconstruct(&stored)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let exists = self.session.fetch(M::SCHEMA, id).map_err(storage_error)?.is_some();
        if exists {
            tracing::debug!(table = M::SCHEMA.name, %id, "deleting record");
            self.session.delete(M::SCHEMA, id).map_err(storage_error)?;
        }
        Ok(())
    }

    async fn find_all(&self, page: Page) -> Result<Vec<M::Entity>, DomainError> {
        self.find_many_by(&[], page).await
    }
}
