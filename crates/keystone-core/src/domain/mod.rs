//! Domain entities - the core business objects.

mod contact;
mod email;
mod role;
mod user;

pub use contact::{Contact, ContactDetails};
pub use email::{Email, mask_email};
pub use role::Role;
pub use user::User;
