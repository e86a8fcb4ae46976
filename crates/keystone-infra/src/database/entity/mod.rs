//! SeaORM entities for the persisted layout.

pub mod contact;
pub mod role;
pub mod user;
pub mod user_role;
