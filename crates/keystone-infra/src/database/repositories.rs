//! PostgreSQL repository implementations.

use async_trait::async_trait;
use chrono::Utc;
use keystone_core::DomainError;
use keystone_core::domain::{Contact, ContactDetails, Email, Role, User, mask_email};
use keystone_core::ports::{ContactRepository, Page, RoleRepository, UserRepository};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use super::entity::{contact, role, user, user_role};
use super::repository::{EntityMapping, SeaOrmRepository, condition, db_error, storage_error};

/// PostgreSQL user repository.
pub type SeaOrmUserRepository = SeaOrmRepository<user::Entity>;

/// PostgreSQL role repository.
pub type SeaOrmRoleRepository = SeaOrmRepository<role::Entity>;

/// PostgreSQL contact repository.
pub type SeaOrmContactRepository = SeaOrmRepository<contact::Entity>;

impl EntityMapping for user::Entity {
    type Domain = User;

    fn id_column() -> user::Column {
        user::Column::Id
    }

    fn id_of(entity: &User) -> Uuid {
        entity.id
    }

    fn populate(active: &mut user::ActiveModel, user: &User) {
        active.email = Set(user.email.clone());
        active.password_hash = Set(user.password_hash.clone());
        active.full_name = Set(user.full_name.clone());
        active.is_active = Set(user.is_active);
    }

    fn reconstruct(model: user::Model) -> Result<User, DomainError> {
        Email::parse(&model.email)?;
        Ok(User {
            id: model.id,
            email: model.email,
            password_hash: model.password_hash,
            full_name: model.full_name,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

impl EntityMapping for role::Entity {
    type Domain = Role;

    fn id_column() -> role::Column {
        role::Column::Id
    }

    fn id_of(entity: &Role) -> Uuid {
        entity.id
    }

    fn populate(active: &mut role::ActiveModel, role: &Role) {
        active.name = Set(role.name.clone());
        active.description = Set(role.description.clone());
    }

    fn reconstruct(model: role::Model) -> Result<Role, DomainError> {
        Ok(Role {
            id: model.id,
            name: model.name,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

impl EntityMapping for contact::Entity {
    type Domain = Contact;

    fn id_column() -> contact::Column {
        contact::Column::Id
    }

    fn id_of(entity: &Contact) -> Uuid {
        entity.id
    }

    fn populate(active: &mut contact::ActiveModel, contact: &Contact) {
        let details = &contact.details;
        active.user_id = Set(contact.user_id);
        active.phone = Set(details.phone.clone());
        active.address = Set(details.address.clone());
        active.city = Set(details.city.clone());
        active.country = Set(details.country.clone());
        active.zip_code = Set(details.zip_code.clone());
    }

    fn reconstruct(model: contact::Model) -> Result<Contact, DomainError> {
        Ok(Contact {
            id: model.id,
            user_id: model.user_id,
            details: ContactDetails {
                phone: model.phone,
                address: model.address,
                city: model.city,
                country: model.country,
                zip_code: model.zip_code,
            },
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl UserRepository for SeaOrmUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        tracing::debug!(email = %mask_email(email), "finding user by email");
        self.find_one_by(condition(vec![(user::Column::Email, Some(email.into()))]))
            .await
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        let existing = user_role::Entity::find_by_id((user_id, role_id))
            .one(&*tx)
            .await
            .map_err(db_error)?;
        if existing.is_some() {
            return Ok(());
        }

        let link = user_role::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
            assigned_at: Set(Utc::now().into()),
        };
        user_role::Entity::insert(link)
            .exec_without_returning(&*tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        user_role::Entity::delete_by_id((user_id, role_id))
            .exec(&*tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn roles_of(&self, user_id: Uuid) -> Result<Vec<Role>, DomainError> {
        let tx = self.session.transaction().await.map_err(storage_error)?;
        let models = role::Entity::find()
            .inner_join(user_role::Entity)
            .filter(user_role::Column::UserId.eq(user_id))
            .all(&*tx)
            .await
            .map_err(db_error)?;

        Ok(models
            .into_iter()
            .filter_map(|model| {
                let id = model.id;
                role::Entity::reconstruct(model)
                    .inspect_err(|err| tracing::warn!(%id, error = %err, "skipping malformed role row"))
                    .ok()
            })
            .collect())
    }
}

#[async_trait]
impl RoleRepository for SeaOrmRoleRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, DomainError> {
        self.find_one_by(condition(vec![(role::Column::Name, Some(name.into()))]))
            .await
    }
}

#[async_trait]
impl ContactRepository for SeaOrmContactRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Contact>, DomainError> {
        self.find_one_by(condition(vec![(contact::Column::UserId, Some(user_id.into()))]))
            .await
    }
}

impl SeaOrmContactRepository {
    /// Contacts filtered by location; `None` leaves a field unconstrained.
    pub async fn find_by_location(
        &self,
        city: Option<&str>,
        country: Option<&str>,
        page: Page,
    ) -> Result<Vec<Contact>, DomainError> {
        self.find_many_by(
            condition(vec![
                (contact::Column::City, city.map(Into::into)),
                (contact::Column::Country, country.map(Into::into)),
            ]),
            page,
        )
        .await
    }
}
