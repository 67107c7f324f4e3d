//! rsauthz-storage: Storage abstraction layer
//!
//! This crate provides the persistence side of role and permission
//! administration, including:
//! - Record types (permissions, roles, assignments, resource permissions,
//!   delegations, templates)
//! - DataStore trait for storage operations
//! - In-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsauthz-storage               │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - Records & DataStore trait    │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - StorageError                 │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{
    DataStore, Delegation, Effect, Permission, PermissionTemplate, ResourcePermission,
    ResourcePermissionFilter, Role, RolePermission, UserRole,
};
