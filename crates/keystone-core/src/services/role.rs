use uuid::Uuid;

use crate::domain::Role;
use crate::error::DomainError;
use crate::failure::Failure;
use crate::ports::{Page, SessionFactory};
use crate::uow::UnitOfWork;

#[derive(Debug, Clone, Default)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub struct RoleService<F: SessionFactory> {
    uow: UnitOfWork<F>,
}

impl<F: SessionFactory> RoleService<F> {
    pub fn new(uow: UnitOfWork<F>) -> Self {
        Self { uow }
    }

    pub async fn create_role(&self, name: &str, description: Option<String>) -> Result<Role, DomainError> {
        let role = Role::new(name, description)?;

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.roles().find_by_name(&role.name).await?.is_some() {
                        return Err(Failure::Domain(DomainError::conflict("name", role.name.clone())));
                    }
                    let role = scope.roles().save(role).await?;
                    tracing::info!(role_id = %role.id, name = %role.name, "role created");
                    Ok(role)
                })
            })
            .await
    }

    pub async fn get_role(&self, id: Uuid) -> Result<Role, DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let role = scope.roles().find_by_id(id).await?;
                    Ok(role.ok_or_else(|| DomainError::not_found("Role", id))?)
                })
            })
            .await
    }

    pub async fn list_roles(&self, page: Page) -> Result<Vec<Role>, DomainError> {
        self.uow
            .run(move |scope| Box::pin(async move { Ok(scope.roles().find_all(page).await?) }))
            .await
    }

    pub async fn update_role(&self, id: Uuid, changes: RoleChanges) -> Result<Role, DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let mut role = scope
                        .roles()
                        .find_by_id(id)
                        .await?
                        .ok_or_else(|| DomainError::not_found("Role", id))?;

                    let mut changed = false;
                    if let Some(name) = changes.name.as_deref() {
                        if let Some(owner) = scope.roles().find_by_name(name.trim()).await? {
                            if owner.id != role.id {
                                return Err(Failure::Domain(DomainError::conflict("name", name.trim())));
                            }
                        }
                        changed |= role.rename(name)?;
                    }
                    if changes.description.is_some() {
                        changed |= role.describe(changes.description);
                    }

                    if !changed {
                        return Ok(role);
                    }
                    Ok(scope.roles().save(role).await?)
                })
            })
            .await
    }

    pub async fn delete_role(&self, id: Uuid) -> Result<(), DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.roles().find_by_id(id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("Role", id)));
                    }
                    scope.roles().delete(id).await?;
                    Ok(())
                })
            })
            .await
    }
}
