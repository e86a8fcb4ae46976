use uuid::Uuid;

use crate::domain::{Contact, ContactDetails};
use crate::error::DomainError;
use crate::failure::Failure;
use crate::ports::{Page, SessionFactory};
use crate::uow::UnitOfWork;

pub struct ContactService<F: SessionFactory> {
    uow: UnitOfWork<F>,
}

impl<F: SessionFactory> ContactService<F> {
    pub fn new(uow: UnitOfWork<F>) -> Self {
        Self { uow }
    }

    /// Create the user's contact profile, or update the existing one.
    /// A missing user surfaces as a referential integrity error from storage.
    pub async fn save_contact(&self, user_id: Uuid, details: ContactDetails) -> Result<Contact, DomainError> {
        if details.phone.trim().is_empty() {
            return Err(DomainError::validation("phone must not be empty"));
        }

        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let contact = match scope.contacts().find_by_user_id(user_id).await? {
                        Some(mut existing) => {
                            if !existing.update_details(details) {
                                return Ok(existing);
                            }
                            existing
                        }
                        None => Contact::new(user_id, details),
                    };
                    Ok(scope.contacts().save(contact).await?)
                })
            })
            .await
    }

    pub async fn get_contact(&self, id: Uuid) -> Result<Contact, DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    let contact = scope.contacts().find_by_id(id).await?;
                    Ok(contact.ok_or_else(|| DomainError::not_found("Contact", id))?)
                })
            })
            .await
    }

    pub async fn get_contact_for_user(&self, user_id: Uuid) -> Result<Option<Contact>, DomainError> {
        self.uow
            .run(move |scope| Box::pin(async move { Ok(scope.contacts().find_by_user_id(user_id).await?) }))
            .await
    }

    pub async fn list_contacts(&self, page: Page) -> Result<Vec<Contact>, DomainError> {
        self.uow
            .run(move |scope| Box::pin(async move { Ok(scope.contacts().find_all(page).await?) }))
            .await
    }

    pub async fn delete_contact(&self, id: Uuid) -> Result<(), DomainError> {
        self.uow
            .run(move |scope| {
                Box::pin(async move {
                    if scope.contacts().find_by_id(id).await?.is_none() {
                        return Err(Failure::Domain(DomainError::not_found("Contact", id)));
                    }
                    scope.contacts().delete(id).await?;
                    Ok(())
                })
            })
            .await
    }
}
