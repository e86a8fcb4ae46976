//! PostgreSQL persistence through SeaORM.

mod connections;

#[cfg(feature = "postgres")]
pub mod entity;
#[cfg(feature = "postgres")]
pub mod failure;
#[cfg(feature = "postgres")]
mod repositories;
#[cfg(feature = "postgres")]
mod repository;
#[cfg(feature = "postgres")]
mod session;

pub use connections::{ConfigError, DatabaseConfig};

#[cfg(feature = "postgres")]
pub use connections::connect;
#[cfg(feature = "postgres")]
pub use failure::{DbResultExt, into_failure};
#[cfg(feature = "postgres")]
pub use repositories::{SeaOrmContactRepository, SeaOrmRoleRepository, SeaOrmUserRepository};
#[cfg(feature = "postgres")]
pub use repository::{EntityMapping, SeaOrmRepository};
#[cfg(feature = "postgres")]
pub use session::{SeaOrmSession, SeaOrmSessionFactory};
