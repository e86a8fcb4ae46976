//! Domain-level error types.
//!
//! Every failure that leaves the persistence layer is a [`DomainError`]: a
//! classified [`ErrorKind`] plus optional diagnostics describing the native
//! failure it was mapped from. Diagnostics never change the classification.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// The classification of a domain failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Conflict on {field}: '{value}' is already in use")]
    Conflict {
        field: String,
        value: String,
        constraint: Option<String>,
    },

    #[error("Invalid credentials: {0}")]
    Unauthorized(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Referenced {entity} '{key}' does not exist")]
    ReferentialIntegrity {
        entity: String,
        key: String,
        constraint: Option<String>,
    },

    #[error("Value '{value}' for field '{field}' violates constraint '{constraint}'")]
    CheckConstraint {
        field: String,
        value: String,
        constraint: String,
    },

    #[error("Operation '{operation}' timed out")]
    Timeout { operation: String },

    #[error("Storage unreachable: {0}")]
    Connectivity(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Unexpected error: {0}")]
    Unclassified(String),
}

/// How a caller is expected to treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A recoverable business condition the caller should branch on.
    Expected,
    /// The storage backend could not serve the request.
    Unavailable,
    /// Nothing recognised the failure; treat it as a defect.
    Bug,
}

impl ErrorKind {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Validation(_)
            | Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::Unauthorized(_)
            | Self::ReferentialIntegrity { .. }
            | Self::CheckConstraint { .. } => Disposition::Expected,
            Self::Permission(_)
            | Self::Timeout { .. }
            | Self::Connectivity(_)
            | Self::Persistence(_) => Disposition::Unavailable,
            Self::Unclassified(_) => Disposition::Bug,
        }
    }

    /// Whether repeating the same operation may succeed. Retrying is the
    /// caller's decision; nothing in the persistence layer retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connectivity(_))
    }
}

/// What the mapper preserved about the native failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub original_type: String,
    pub original_message: String,
    pub trace: String,
}

impl Diagnostics {
    /// Human-readable lines suitable for logs.
    pub fn notes(&self) -> Vec<String> {
        vec![
            format!(
                "Original failure: {}: {}",
                self.original_type, self.original_message
            ),
            format!("Original trace:\n{}", self.trace),
        ]
    }
}

type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// A classified failure produced by the domain or by the error mapper.
#[derive(Debug)]
pub struct DomainError {
    kind: ErrorKind,
    diagnostics: Option<Box<Diagnostics>>,
    notes: Vec<String>,
    cause: Option<Cause>,
}

impl DomainError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            diagnostics: None,
            notes: Vec::new(),
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation(message.into()))
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::new(ErrorKind::NotFound {
            entity,
            key: key.to_string(),
        })
    }

    pub fn conflict(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict {
            field: field.into(),
            value: value.into(),
            constraint: None,
        })
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized(message.into()))
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence(message.into()))
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified(message.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_deref()
    }

    /// Free-form context attached while the error travelled up.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(Box::new(diagnostics));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl From<ErrorKind> for DomainError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl StdError for DomainError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// Misuse of a work scope or storage session. These are programming errors
/// and deliberately not part of the domain taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("storage session is not active")]
    NotActive,
}
