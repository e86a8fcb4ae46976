//! The unit of work.
//!
//! [`UnitOfWork::begin`] opens a session and returns a [`WorkScope`]; the
//! scope is the only way to reach repositories, and [`WorkScope::exit`]
//! consumes it, so a finished scope cannot be used again. Exiting commits on
//! success and rolls back on failure, then releases the session. Dropping a
//! scope without exiting releases the session and discards its transaction.
//!
//! Scopes never nest into one transaction: each `begin` opens an independent
//! session.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{DomainError, ScopeError};
use crate::failure::Failure;
use crate::mapper::ErrorMapper;
use crate::ports::{
    ContactRepository, Repositories, RoleRepository, SessionFactory, StorageSession,
    UserRepository,
};

/// Entry point for transactional work.
pub struct UnitOfWork<F: SessionFactory> {
    factory: Arc<F>,
}

impl<F: SessionFactory> Clone for UnitOfWork<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<F: SessionFactory> UnitOfWork<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Enter a new scope with a fresh session.
    pub async fn begin(&self) -> Result<WorkScope<F::Session>, DomainError> {
        let session = self
            .factory
            .open()
            .await
            .map_err(|failure| ErrorMapper::wrap(failure.into()))?;
        let repositories = session.bind();
        tracing::debug!("work scope entered");
        Ok(WorkScope {
            session,
            repositories,
            closed: false,
        })
    }

    /// Run `work` inside a new scope and exit it with the outcome.
    ///
    /// ```ignore
    /// let user = uow
    ///     .run(|scope| Box::pin(async move { Ok(scope.users().save(user).await?) }))
    ///     .await?;
    /// ```
    pub async fn run<T, W>(&self, work: W) -> Result<T, DomainError>
    where
        T: Send,
        W: for<'s> FnOnce(&'s WorkScope<F::Session>) -> BoxFuture<'s, Result<T, Failure>> + Send,
    {
        let scope = self.begin().await?;
        let outcome = work(&scope).await;
        scope.exit(outcome).await
    }
}

/// An entered unit of work.
pub struct WorkScope<S: StorageSession> {
    session: S,
    repositories: Repositories,
    closed: bool,
}

impl<S: StorageSession> WorkScope<S> {
    pub fn users(&self) -> &dyn UserRepository {
        self.repositories.users.as_ref()
    }

    pub fn roles(&self) -> &dyn RoleRepository {
        self.repositories.roles.as_ref()
    }

    pub fn contacts(&self) -> &dyn ContactRepository {
        self.repositories.contacts.as_ref()
    }

    /// Make the current work durable without leaving the scope. The next
    /// statement starts a new transaction.
    pub async fn commit(&self) -> Result<(), DomainError> {
        self.session
            .commit()
            .await
            .map_err(|failure| ErrorMapper::wrap(failure.into()))
    }

    /// Discard the current work without leaving the scope.
    pub async fn rollback(&self) -> Result<(), DomainError> {
        self.session
            .rollback()
            .await
            .map_err(|failure| ErrorMapper::wrap(failure.into()))
    }

    /// The raw storage handle, for work the repositories don't cover.
    pub fn handle(&self) -> Result<&S::Handle, ScopeError> {
        self.session.handle()
    }

    /// Run an operation against the raw storage handle. Failures are mapped
    /// like any repository failure.
    pub async fn direct<T, Op>(&self, op: Op) -> Result<T, DomainError>
    where
        Op: for<'h> FnOnce(&'h S::Handle) -> BoxFuture<'h, Result<T, Failure>>,
    {
        let handle = self
            .session
            .handle()
            .map_err(|err| ErrorMapper::wrap(anyhow::Error::new(err).into()))?;
        op(handle).await.map_err(ErrorMapper::wrap)
    }

    /// Finish the scope. `Ok` commits; `Err` rolls back and re-raises the
    /// failure, classified. The session is released either way.
    pub async fn exit<T>(mut self, outcome: Result<T, Failure>) -> Result<T, DomainError> {
        let result = match outcome {
            Ok(value) => match self.session.commit().await {
                Ok(()) => {
                    tracing::debug!("work scope committed");
                    Ok(value)
                }
                Err(failure) => {
                    tracing::error!(error = %failure, "commit failed");
                    Err(ErrorMapper::wrap(failure.into()))
                }
            },
            Err(failure) => match self.session.rollback().await {
                Ok(()) => {
                    tracing::warn!(error = %failure, "work scope rolled back");
                    Err(ErrorMapper::wrap(failure))
                }
                Err(rollback_failure) => {
                    tracing::error!(
                        error = %rollback_failure,
                        original = %failure,
                        "rollback failed"
                    );
                    Err(ErrorMapper::wrap(rollback_failure.into())
                        .with_note(format!("Rollback was triggered by: {failure}")))
                }
            },
        };
        self.close();
        result
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.release();
        }
    }
}

impl<S: StorageSession> Drop for WorkScope<S> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("work scope dropped without exit; discarding its transaction");
            self.close();
        }
    }
}
