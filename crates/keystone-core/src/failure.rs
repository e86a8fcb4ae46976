//! Native failures, before classification.
//!
//! Storage adapters report what went wrong as a [`StorageFailure`]; anything
//! a work body can fail with is a [`Failure`]. Only the error mapper turns
//! either into a [`DomainError`].

use std::backtrace::Backtrace;
use std::fmt;

use thiserror::Error;

use crate::error::DomainError;

/// Coarse family of a native storage failure, mirroring the SQLSTATE classes
/// a relational driver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Constraint violations (class 23).
    Integrity,
    /// Malformed or out-of-range values (class 22).
    Data,
    /// The backend could not be reached or refused to work.
    Operational,
    /// A statement or connection deadline elapsed.
    Timeout,
    /// The statement itself was wrong (class 42).
    Programming,
    /// Any other driver failure.
    Driver,
}

/// A failure reported by a storage backend.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StorageFailure {
    category: FailureCategory,
    code: Option<String>,
    message: String,
    origin: String,
    trace: String,
}

impl StorageFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            code: None,
            message: message.into(),
            origin: "storage".to_owned(),
            trace: Backtrace::capture().to_string(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Integrity, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Data, message)
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Operational, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Timeout, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Programming, message)
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Driver, message)
    }

    /// Attach the five-character SQLSTATE reported by the backend.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Name of the native error type this failure was converted from.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn category(&self) -> FailureCategory {
        self.category
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }
}

/// Anything a unit of work body may fail with.
#[derive(Debug)]
pub enum Failure {
    /// Already classified; passes through the mapper untouched.
    Domain(DomainError),
    Storage(StorageFailure),
    /// A failure nothing in the persistence layer knows about.
    Other(anyhow::Error),
}

impl Failure {
    pub fn other(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Other(anyhow::Error::msg(message))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(err) => err.fmt(f),
            Self::Storage(err) => err.fmt(f),
            Self::Other(err) => err.fmt(f),
        }
    }
}

impl From<DomainError> for Failure {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<StorageFailure> for Failure {
    fn from(err: StorageFailure) -> Self {
        Self::Storage(err)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

impl From<tokio::time::error::Elapsed> for Failure {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Storage(StorageFailure::timeout(err.to_string()).with_origin("tokio::time::error::Elapsed"))
    }
}
