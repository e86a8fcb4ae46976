//! Use cases. Each public operation runs in its own unit of work.

mod contact;
mod role;
mod user;

pub use contact::ContactService;
pub use role::{RoleChanges, RoleService};
pub use user::{UserChanges, UserService};
