use std::marker::PhantomData;

use async_trait::async_trait;
use keystone_core::ports::{BaseRepository, Page};
use keystone_core::{DomainError, ErrorMapper, StorageFailure};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait,
    IntoActiveModel, PrimaryKeyTrait, QueryFilter, QuerySelect,
};
use uuid::Uuid;

use super::failure::into_failure;
use super::session::SeaOrmSession;

/// How a domain entity maps onto a SeaORM entity.
pub trait EntityMapping: EntityTrait {
    type Domain: Send + Sync + 'static;

    fn id_column() -> Self::Column;

    fn id_of(entity: &Self::Domain) -> Uuid;

    /// Copy the entity's fields into `active`. The key column is set by the
    /// caller; `created_at` and `updated_at` are left to storage.
    fn populate(active: &mut Self::ActiveModel, entity: &Self::Domain);

    fn reconstruct(model: Self::Model) -> Result<Self::Domain, DomainError>;
}

/// Generic PostgreSQL repository bound to one session.
pub struct SeaOrmRepository<E> {
    pub(crate) session: SeaOrmSession,
    _entity: PhantomData<fn() -> E>,
}

pub(crate) fn storage_error(failure: StorageFailure) -> DomainError {
    ErrorMapper::wrap(failure.into())
}

pub(crate) fn db_error(err: DbErr) -> DomainError {
    storage_error(into_failure(err))
}

/// Conditions whose value is `None` are ignored.
pub(crate) fn condition<C: ColumnTrait>(filters: Vec<(C, Option<sea_orm::Value>)>) -> Condition {
    filters
        .into_iter()
        .fold(Condition::all(), |condition, (column, value)| match value {
            Some(value) => condition.add(column.eq(value)),
            None => condition,
        })
}

impl<E> SeaOrmRepository<E>
where
    E: EntityMapping,
{
    pub fn new(session: SeaOrmSession) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    fn reconstruct(model: E::Model) -> Result<E::Domain, DomainError> {
        E::reconstruct(model).map_err(|err| {
            DomainError::persistence(format!("stored {} row is malformed: {err}", E::default().table_name()))
                .with_cause(err)
        })
    }

    pub(crate) async fn find_one_by(&self, condition: Condition) -> Result<Option<E::Domain>, DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        let model = E::find().filter(condition).one(&*tx).await.map_err(db_error)?;
        model.map(Self::reconstruct).transpose()
    }

    /// Rows that fail to reconstruct are logged and skipped.
    pub(crate) async fn find_many_by(&self, condition: Condition, page: Page) -> Result<Vec<E::Domain>, DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        let models = E::find()
            .filter(condition)
            .offset(page.skip)
            .limit(page.limit)
            .all(&*tx)
            .await
            .map_err(db_error)?;

        Ok(models
            .into_iter()
            .filter_map(|model| match E::reconstruct(model) {
                Ok(entity) => Some(entity),
                Err(err) => {
                    tracing::warn!(table = E::default().table_name(), error = %err, "skipping malformed row");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl<E> BaseRepository<E::Domain, Uuid> for SeaOrmRepository<E>
where
    E: EntityMapping,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + Sync,
    E::PrimaryKey: PrimaryKeyTrait<ValueType = Uuid>,
{
    async fn find_by_id(&self, id: Uuid) -> Result<Option<E::Domain>, DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        let model = E::find_by_id(id).one(&*tx).await.map_err(db_error)?;
        model.map(Self::reconstruct).transpose()
    }

    async fn save(&self, entity: E::Domain) -> Result<E::Domain, DomainError> {
        let id = E::id_of(&entity);
        tracing::debug!(table = E::default().table_name(), %id, "saving record");

        let tx = self.session.transaction().await.map_err(storage_error)?;
        let existing = E::find_by_id(id).one(&*tx).await.map_err(db_error)?;

        // RETURNING hands back the row as stored, defaults and hooks included.
        let stored = match existing {
            Some(model) => {
                let mut active = model.into_active_model();
                E::populate(&mut active, &entity);
                active.update(&*tx).await
            }
            None => {
                let mut active = <E::ActiveModel as ActiveModelTrait>::default();
                active.set(E::id_column(), id.into());
                E::populate(&mut active, &entity);
                active.insert(&*tx).await
            }
        }
        .map_err(db_error)?;

        Self::reconstruct(stored)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        let result = E::delete_by_id(id).exec(&*tx).await.map_err(db_error)?;
        if result.rows_affected > 0 {
            tracing::debug!(table = E::default().table_name(), %id, "record deleted");
        }
        Ok(())
    }

    async fn find_all(&self, page: Page) -> Result<Vec<E::Domain>, DomainError> {
        self.find_many_by(Condition::all(), page).await
    }
}
