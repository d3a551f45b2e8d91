//! Roles and permissions for gated operations
//!
//! Authentication happens elsewhere; services receive an [`Actor`] and check
//! the permission they need before mutating anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::identifiers::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Sales,
    Accountant,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create and transition quotes, invoices and delivery notes
    ManageDocuments,
    /// Post manual journal entries
    ManualJournal,
    /// Create, edit, deactivate and delete accounts
    ManageAccounts,
    /// Override lifecycle restrictions (edit a sent quote, void a paid invoice)
    ForceTransition,
    /// Read ledger reports
    ViewReports,
}

impl Role {
    pub fn has_permission(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Role::Admin => true,
            Role::Accountant => matches!(
                permission,
                ManualJournal | ManageAccounts | ViewReports | ManageDocuments
            ),
            Role::Sales => permission == ManageDocuments,
            Role::Viewer => permission == ViewReports,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Viewer => "viewer",
            Role::Sales => "sales",
            Role::Accountant => "accountant",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Raised when an actor lacks a permission
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("User {user_id} with role {role} lacks permission {permission:?}")]
pub struct AccessDenied {
    pub user_id: UserId,
    pub role: Role,
    pub permission: Permission,
}

/// The authenticated user performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// System actor used by batch jobs (outbox processing, seeding)
    pub fn system() -> Self {
        Self {
            user_id: UserId::from_uuid(uuid::Uuid::nil()),
            role: Role::Admin,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn ensure(&self, permission: Permission) -> Result<(), AccessDenied> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AccessDenied {
                user_id: self.user_id,
                role: self.role,
                permission,
            })
        }
    }
}
