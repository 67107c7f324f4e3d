//! Service handlers.

pub mod admin;

pub use admin::{AdminError, AdminResult, GrantAdministration};
