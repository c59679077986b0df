//! Role definitions.

use crate::{
    error::{Error, Result},
    permission::Permission,
};
use std::sync::Arc;

/// A role is a named, weighted bundle of granted permissions and allowed path patterns.
#[derive(Debug, Clone, Default)]
pub struct Role {
    /// Identifier, assigned once by the caller or by the store on save.
    id: Option<u64>,
    /// Human-readable name of the role.
    name: String,
    /// Rank of the role against other roles.
    weight: i32,
    /// Path patterns this role may access.
    paths: Vec<String>,
    /// Permissions granted by this role.
    permissions: Vec<Arc<Permission>>,
}

impl Role {
    /// Create a blank role without an id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a blank role with a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get the role's identifier.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Assign the role's identifier.
    ///
    /// Fails when a different id has already been assigned.
    pub fn set_id(&mut self, id: u64) -> Result<()> {
        match self.id {
            Some(current) if current != id => Err(Error::IdAlreadySet {
                kind: "role",
                current,
                requested: id,
            }),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Get the role's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the role's name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Get the role's weight.
    pub fn weight(&self) -> i32 {
        self.weight
    }

    /// Set the role's weight.
    pub fn set_weight(&mut self, weight: i32) {
        self.weight = weight;
    }

    /// Get the path patterns allowed by this role.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Replace the path patterns allowed by this role.
    pub fn set_paths(&mut self, paths: impl IntoIterator<Item = impl Into<String>>) {
        self.paths.clear();
        for path in paths {
            let path = path.into();
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
    }

    /// Get the permissions granted by this role.
    pub fn permissions(&self) -> &[Arc<Permission>] {
        &self.permissions
    }

    /// Replace the permissions granted by this role.
    pub fn set_permissions(&mut self, permissions: impl IntoIterator<Item = Arc<Permission>>) {
        self.permissions.clear();
        for permission in permissions {
            if !self.permissions.contains(&permission) {
                self.permissions.push(permission);
            }
        }
    }

    /// Check if this role grants the permission with the provided code.
    pub fn is_permission_granted(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p.code() == code)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
