//! User accounts and their role based authorization checks.

use crate::{
    error::{Error, Result},
    matcher::PathMatcher,
    role::Role,
};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, OnceLock},
};

/// A user account holding credentials, profile fields, roles and preferences.
#[derive(Debug, Clone, Default)]
pub struct User {
    /// Identifier, assigned once by the caller or by the store on save.
    id: Option<u64>,
    username: String,
    /// Digest after save, plaintext while the password is changed.
    password: String,
    password_changed: bool,
    display_name: Option<String>,
    email: Option<String>,
    email_confirmed: bool,
    image: Option<String>,
    active: bool,
    super_user: bool,
    roles: Vec<Arc<Role>>,
    preferences: BTreeMap<String, Value>,
    /// Flattened permission codes of all roles, built on first use.
    permission_codes: OnceLock<BTreeSet<String>>,
    /// Flattened path patterns of all roles, built on first use.
    paths: OnceLock<Vec<String>>,
}

impl User {
    /// Weight of a super user, ranking above every role.
    pub const SUPER_USER_WEIGHT: i32 = i32::MAX;

    /// Create a blank user without an id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user with a username and a new plaintext password.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut user = Self::new();
        user.set_username(username);
        user.set_password(password);
        user
    }

    /// Rebuild a user from persisted credentials; the password is not marked as changed.
    pub(crate) fn restore(username: String, password: String) -> Self {
        Self {
            username,
            password,
            ..Self::default()
        }
    }

    /// Get the user's identifier.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Assign the user's identifier.
    ///
    /// Fails when a different id has already been assigned.
    pub fn set_id(&mut self, id: u64) -> Result<()> {
        match self.id {
            Some(current) if current != id => Err(Error::IdAlreadySet {
                kind: "user",
                current,
                requested: id,
            }),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Get the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Set the username.
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// Get the password, a digest once the user has been saved.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Set a new plaintext password; it is hashed when the user is saved.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
        self.password_changed = true;
    }

    /// Check if the password was changed since this user was loaded or saved.
    pub fn is_password_changed(&self) -> bool {
        self.password_changed
    }

    /// Replace a changed plaintext password with its stored form.
    pub(crate) fn store_password(&mut self, stored: String) {
        self.password = stored;
        self.password_changed = false;
    }

    /// Get the display name, falling back to the username.
    pub fn display_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }

    /// Get the display name as set, without the username fallback.
    pub fn raw_display_name(&self) -> Option<&str> {
        self.display_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Set the display name.
    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = Some(display_name.into());
    }

    /// Get the email address.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|email| !email.is_empty())
    }

    /// Set the email address. A new address is never confirmed.
    pub fn set_email(&mut self, email: Option<String>) {
        self.email = email.filter(|email| !email.is_empty());
        self.email_confirmed = false;
    }

    /// Check if the email address is confirmed.
    pub fn is_email_confirmed(&self) -> bool {
        self.email_confirmed
    }

    /// Set whether the email address is confirmed. Ignored while there is no address.
    pub fn set_email_confirmed(&mut self, confirmed: bool) {
        self.email_confirmed = confirmed && self.email().is_some();
    }

    /// Get the path of the user's image.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|image| !image.is_empty())
    }

    /// Set the path of the user's image.
    pub fn set_image(&mut self, image: Option<String>) {
        self.image = image;
    }

    /// Check if the account is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Set whether the account is active.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Check if this is a super user.
    pub fn is_super_user(&self) -> bool {
        self.super_user
    }

    /// Set whether this is a super user.
    pub fn set_super_user(&mut self, super_user: bool) {
        self.super_user = super_user;
    }

    /// Get the roles of this user.
    pub fn roles(&self) -> &[Arc<Role>] {
        &self.roles
    }

    /// Replace the roles of this user.
    pub fn set_roles(&mut self, roles: impl IntoIterator<Item = Arc<Role>>) {
        self.roles.clear();
        for role in roles {
            if !self.roles.iter().any(|r| Arc::ptr_eq(r, &role) || same_role(r, &role)) {
                self.roles.push(role);
            }
        }

        self.permission_codes = OnceLock::new();
        self.paths = OnceLock::new();
    }

    /// Get the highest weight of this user's roles.
    ///
    /// A super user always ranks highest; a user without roles has weight 0.
    pub fn role_weight(&self) -> i32 {
        if self.super_user {
            return Self::SUPER_USER_WEIGHT;
        }

        self.roles
            .iter()
            .map(|role| role.weight())
            .fold(0, i32::max)
    }

    /// Check if one of the user's roles grants the permission with the provided code.
    pub fn is_permission_granted(&self, code: &str) -> bool {
        self.permission_codes
            .get_or_init(|| {
                self.roles
                    .iter()
                    .flat_map(|role| role.permissions())
                    .map(|permission| permission.code().to_string())
                    .collect()
            })
            .contains(code)
    }

    /// Get the path patterns allowed by all roles of this user.
    pub fn allowed_paths(&self) -> &[String] {
        self.paths.get_or_init(|| {
            let mut paths: Vec<String> = Vec::new();
            for path in self.roles.iter().flat_map(|role| role.paths()) {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
            paths
        })
    }

    /// Check if the user may access a path through one of their roles.
    pub fn is_path_allowed(
        &self,
        path: &str,
        method: Option<&str>,
        matcher: &dyn PathMatcher,
    ) -> bool {
        matcher.matches(path, method, self.allowed_paths())
    }

    /// Get all preferences.
    pub fn preferences(&self) -> &BTreeMap<String, Value> {
        &self.preferences
    }

    /// Get a preference.
    pub fn preference(&self, name: &str) -> Option<&Value> {
        self.preferences.get(name)
    }

    /// Get a preference or a default when it is not set.
    pub fn preference_or<'a>(&'a self, name: &str, default: &'a Value) -> &'a Value {
        self.preferences.get(name).unwrap_or(default)
    }

    /// Set a preference; a null value removes it.
    pub fn set_preference(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.preferences.remove(&name);
        } else {
            self.preferences.insert(name, value);
        }
    }
}

fn same_role(a: &Role, b: &Role) -> bool {
    a.id().is_some() && a.id() == b.id()
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.username)
    }
}
