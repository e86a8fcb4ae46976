//! Entity mappings and entity-specific queries for the in-memory engine.

use async_trait::async_trait;
use keystone_core::DomainError;
use keystone_core::domain::{Contact, ContactDetails, Email, Role, User, mask_email};
use keystone_core::ports::{ContactRepository, Page, RoleRepository, UserRepository};
use uuid::Uuid;

use super::repository::{MemoryRepository, RecordMapping, storage_error};
use super::schema::{CONTACTS, ROLES, Row, RowError, TableSchema, USER_ROLES, USERS, Value, Values};

pub struct UserRecord;
pub struct RoleRecord;
pub struct ContactRecord;

pub type MemoryUserRepository = MemoryRepository<UserRecord>;
pub type MemoryRoleRepository = MemoryRepository<RoleRecord>;
pub type MemoryContactRepository = MemoryRepository<ContactRecord>;

impl RecordMapping for UserRecord {
    type Entity = User;
    const SCHEMA: &'static TableSchema = &USERS;

    fn id(entity: &User) -> Uuid {
        entity.id
    }

    fn populate(user: &User, values: &mut Values) {
        values.insert("email", user.email.clone().into());
        values.insert("password_hash", user.password_hash.clone().into());
        values.insert("full_name", user.full_name.clone().into());
        values.insert("is_active", user.is_active.into());
    }

    fn reconstruct(row: &Row) -> Result<User, RowError> {
        let email = row.text("email")?;
        Email::parse(&email).map_err(|err| RowError::Invalid {
            column: "email",
            reason: err.to_string(),
        })?;
        Ok(User {
            id: row.id,
            email,
            password_hash: row.text("password_hash")?,
            full_name: row.text("full_name")?,
            is_active: row.flag("is_active")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl RecordMapping for RoleRecord {
    type Entity = Role;
    const SCHEMA: &'static TableSchema = &ROLES;

    fn id(entity: &Role) -> Uuid {
        entity.id
    }

    fn populate(role: &Role, values: &mut Values) {
        values.insert("name", role.name.clone().into());
        values.insert("description", role.description.clone().into());
    }

    fn reconstruct(row: &Row) -> Result<Role, RowError> {
        Ok(Role {
            id: row.id,
            name: row.text("name")?,
            description: row.optional_text("description")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl RecordMapping for ContactRecord {
    type Entity = Contact;
    const SCHEMA: &'static TableSchema = &CONTACTS;

    fn id(entity: &Contact) -> Uuid {
        entity.id
    }

    fn populate(contact: &Contact, values: &mut Values) {
        let details = &contact.details;
        values.insert("user_id", contact.user_id.into());
        values.insert("phone", details.phone.clone().into());
        values.insert("address", details.address.clone().into());
        values.insert("city", details.city.clone().into());
        values.insert("country", details.country.clone().into());
        values.insert("zip_code", details.zip_code.clone().into());
    }

    fn reconstruct(row: &Row) -> Result<Contact, RowError> {
        Ok(Contact {
            id: row.id,
            user_id: row.uuid("user_id")?,
            details: ContactDetails {
                phone: row.text("phone")?,
                address: row.optional_text("address")?,
                city: row.optional_text("city")?,
                country: row.optional_text("country")?,
                zip_code: row.optional_text("zip_code")?,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl MemoryUserRepository {
    fn links(&self, user_id: Uuid, role_id: Option<Uuid>) -> Result<Vec<Row>, DomainError> {
        let mut conditions = vec![("user_id", Value::from(user_id))];
        if let Some(role_id) = role_id {
            conditions.push(("role_id", Value::from(role_id)));
        }
        self.session
            .select(&USER_ROLES, &conditions, 0, None)
            .map_err(storage_error)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        tracing::debug!(email = %mask_email(email), "finding user by email");
        self.find_one_by(&[("email", Some(email.into()))]).await
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError> {
        if !self.links(user_id, Some(role_id))?.is_empty() {
            return Ok(());
        }
        let mut values = Values::new();
        values.insert("user_id", user_id.into());
        values.insert("role_id", role_id.into());
        self.session
            .insert(&USER_ROLES, Uuid::new_v4(), values)
            .map_err(storage_error)?;
        Ok(())
    }

    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError> {
        for link in self.links(user_id, Some(role_id))? {
            self.session.delete(&USER_ROLES, link.id).map_err(storage_error)?;
        }
        Ok(())
    }

    async fn roles_of(&self, user_id: Uuid) -> Result<Vec<Role>, DomainError> {
        let mut roles = Vec::new();
        for link in self.links(user_id, None)? {
            let role_id = link.uuid("role_id").map_err(|err| DomainError::persistence(err.to_string()))?;
            let Some(row) = self.session.fetch(&ROLES, role_id).map_err(storage_error)? else {
                continue;
            };
            match RoleRecord::reconstruct(&row) {
                Ok(role) => roles.push(role),
                Err(err) => tracing::warn!(id = %row.id, error = %err, "skipping malformed role row"),
            }
        }
        Ok(roles)
    }
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, DomainError> {
        self.find_one_by(&[("name", Some(name.into()))]).await
    }
}

#[async_trait]
impl ContactRepository for MemoryContactRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Contact>, DomainError> {
        self.find_one_by(&[("user_id", Some(user_id.into()))]).await
    }
}

impl MemoryContactRepository {
    /// Contacts filtered by location; `None` leaves a field unconstrained.
    pub async fn find_by_location(
        &self,
        city: Option<&str>,
        country: Option<&str>,
        page: Page,
    ) -> Result<Vec<Contact>, DomainError> {
        self.find_many_by(
            &[
                ("city", city.map(Value::from)),
                ("country", country.map(Value::from)),
            ],
            page,
        )
        .await
    }
}
