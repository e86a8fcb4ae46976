//! # Keystone Core
//!
//! The domain layer of Keystone: entities, the domain error taxonomy, the
//! error mapper, storage ports and the unit of work that ties them together.
//! This crate contains no storage driver code.

pub mod domain;
pub mod error;
pub mod failure;
pub mod mapper;
pub mod ports;
pub mod services;
pub mod uow;

pub use error::{Diagnostics, Disposition, DomainError, ErrorKind, ScopeError};
pub use failure::{Failure, FailureCategory, StorageFailure};
pub use mapper::ErrorMapper;
pub use uow::{UnitOfWork, WorkScope};
