//! User account use cases.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Email, Role, User, mask_email};
use crate::error::DomainError;
use crate::failure::Failure;
use crate::ports::{Page, PasswordHasher, SessionFactory};
use crate::uow::UnitOfWork;

const MIN_PASSWORD_LEN: usize = 8;

/// Optional field updates for [`UserService::update_user`].
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
}

pub struct UserService<F: SessionFactory> {
    uow: UnitOfWork<F>,
    hasher: Arc<dyn PasswordHasher>,
}

impl<F: SessionFactory> UserService<F> {
    pub fn new(uow: UnitOfWork<F>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { uow, hasher }
    }

    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<User, DomainError> {
        // Validate input
        let email = Email::parse(email)?;
        validate_password(password)?;

        let password_hash = self.hasher.hash(password)?;
        let user = User::new(email, password_hash, full_name.trim().to_owned());

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.users().find_by_email(&user.email).await?.is_some() {
                        return Err(Failure::Domain(DomainError::conflict(
                            "email",
                            user.email.clone(),
                        )));
                    }
                    let user = scope.users().save(user).await?;
                    tracing::info!(user_id = %user.id, email = %mask_email(&user.email), "user created");
                    Ok(user)
                })
            })
            .await
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User, DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let user = scope.users().find_by_id(id).await?;
                    Ok(user.ok_or_else(|| DomainError::not_found("User", id))?)
                })
            })
            .await
    }

    pub async fn list_users(&self, page: Page) -> Result<Vec<User>, DomainError> {
        self.uow
            .run(move |scope| Box::pin(async move { Ok(scope.users().find_all(page).await?) }))
            .await
    }

    /// Apply `changes`; storage is written only when something changed.
    pub async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, DomainError> {
        let email = changes.email.as_deref().map(Email::parse).transpose()?;

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let mut user = scope
                        .users()
                        .find_by_id(id)
                        .await?
                        .ok_or_else(|| DomainError::not_found("User", id))?;

                    let mut changed = false;
                    if let Some(email) = email {
                        if let Some(owner) = scope.users().find_by_email(email.as_str()).await? {
                            if owner.id != user.id {
                                return Err(Failure::Domain(DomainError::conflict(
                                    "email",
                                    email.as_str(),
                                )));
                            }
                        }
                        changed |= user.change_email(email);
                    }
                    if let Some(full_name) = changes.full_name.as_deref() {
                        changed |= user.rename(full_name);
                    }
                    match changes.is_active {
                        Some(true) => changed |= user.activate(),
                        Some(false) => changed |= user.deactivate(),
                        None => {}
                    }

                    if !changed {
                        return Ok(user);
                    }
                    Ok(scope.users().save(user).await?)
                })
            })
            .await
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.users().find_by_id(id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("User", id)));
                    }
                    scope.users().delete(id).await?;
                    tracing::info!(user_id = %id, "user deleted");
                    Ok(())
                })
            })
            .await
    }

    /// Unknown email and wrong password fail the same way; an inactive account
    /// is reported as such.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, DomainError> {
        let email = email.trim().to_owned();
        let password = password.to_owned();
        let hasher = Arc::clone(&self.hasher);

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let Some(user) = scope.users().find_by_email(&email).await? else {
                        tracing::debug!(email = %mask_email(&email), "login for unknown email");
                        return Err(Failure::Domain(invalid_credentials()));
                    };
                    if !hasher.verify(&password, &user.password_hash).map_err(DomainError::from)? {
                        return Err(Failure::Domain(invalid_credentials()));
                    }
                    if !user.is_active {
                        return Err(Failure::Domain(DomainError::unauthorized("account is inactive")));
                    }
                    Ok(user)
                })
            })
            .await
    }

    pub async fn change_password(
        &self,
        id: Uuid,
        current: &str,
        new_password: &str,
    ) -> Result<(), DomainError> {
        validate_password(new_password)?;
        let current = current.to_owned();
        let new_hash = self.hasher.hash(new_password)?;
        let hasher = Arc::clone(&self.hasher);

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let mut user = scope
                        .users()
                        .find_by_id(id)
                        .await?
                        .ok_or_else(|| DomainError::not_found("User", id))?;
                    if !hasher.verify(&current, &user.password_hash).map_err(DomainError::from)? {
                        return Err(Failure::Domain(invalid_credentials()));
                    }
                    user.change_password(new_hash);
                    scope.users().save(user).await?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.users().find_by_id(user_id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("User", user_id)));
                    }
                    if scope.roles().find_by_id(role_id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("Role", role_id)));
                    }
                    scope.users().assign_role(user_id, role_id).await?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.users().find_by_id(user_id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("User", user_id)));
                    }
                    if scope.roles().find_by_id(role_id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("Role", role_id)));
                    }
                    scope.users().remove_role(user_id, role_id).await?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn roles_of(&self, user_id: Uuid) -> Result<Vec<Role>, DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.users().find_by_id(user_id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("User", user_id)));
                    }
                    Ok(scope.users().roles_of(user_id).await?)
                })
            })
            .await
    }
}

fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn invalid_credentials() -> DomainError {
    DomainError::unauthorized("invalid email or password")
}
