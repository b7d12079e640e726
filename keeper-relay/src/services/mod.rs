//! Business rules over the relay storage.

pub mod users;
pub mod vaults;

pub use users::UserService;
pub use vaults::VaultService;
