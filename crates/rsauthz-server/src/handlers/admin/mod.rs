//! Grant administration with cache invalidation.
//!
//! Every mutation of authorization data goes through
//! [`GrantAdministration`], which wraps the store write in an explicit
//! pre-hook (input validation) and post-hook (audit event, then decision
//! cache invalidation):
//!
//! | Mutation                               | Invalidates              |
//! |----------------------------------------|--------------------------|
//! | assign / unassign role                 | the user                 |
//! | grant / revoke role permission         | every member of the role |
//! | apply template to role                 | every member of the role |
//! | grant / update / revoke resource perm. | the user(s) named        |
//! | bulk grant                             | every user named         |
//! | transfer resource permissions          | both users               |
//! | create / revoke delegation             | the delegate             |
//! | deactivate permission                  | everyone                 |
//!
//! Invalidation happens strictly after the commit; together with the
//! cache's generation check this keeps a concurrent check from re-caching
//! a decision computed from pre-mutation data.

mod service;
mod types;

pub use service::GrantAdministration;
pub use types::{
    AdminError, AdminResult, DelegationRequest, ResourcePermissionGrant, RoleAssignment,
    RolePermissionGrant, MAX_BULK_SIZE,
};
