//! Schema for the Keystone PostgreSQL backend.
//!
//! Constraint names follow PostgreSQL's defaults (`users_email_key`,
//! `contacts_user_id_fkey`, ...) because the error mapper reads them back
//! out of violation messages.

pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_create_tables::Migration)]
    }
}
