//! Security model implementation.
//!
//! This module contains [`GenericSecurityModel`], the single source of truth for users,
//! roles, permissions and secured paths during the lifetime of a process.
//!
//! # Caching
//!
//! Each collection is loaded from the [`SecurityStore`] at most once, on the first
//! operation that needs it. Mutations update the cache, hand the full collection to the
//! store and replace the cache with what the store returns, since the store assigns
//! ids to new entities.
//!
//! # Referential integrity
//!
//! Roles only reference registered permissions and users only reference existing roles.
//! Whenever roles or permissions change, the dependent cached collection is relinked to
//! the new objects, and references to deleted entities are dropped and persisted.
//!
//! # Thread Safety
//!
//! The model has no internal locking. Every operation takes `&mut self`; share a model
//! between threads behind a lock of your choice.

#[cfg(feature = "audit")]
use log::info;

use crate::{
    chain::ChainableModel,
    error::{Error, Result},
    events::{EventPublisher, SecurityEvent},
    filter::{self, FilterOptions},
    hash::PasswordHash,
    permission::Permission,
    role::Role,
    storage::{
        MemoryStore, PermissionMap, RoleMap, SecurityStore, UserMap, relink_role_permissions,
        relink_user_roles,
    },
    user::User,
};
use std::{any::Any, collections::BTreeSet, sync::Arc};

/// Configuration for the security model.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelConfig {
    /// Refuse to save changed passwords when no hash algorithm is configured.
    ///
    /// When false, such passwords are stored as plaintext and a warning is logged.
    pub require_password_hash: bool,
}

/// Security model backed by a pluggable store.
pub struct GenericSecurityModel<S = MemoryStore>
where
    S: SecurityStore,
{
    store: S,
    config: ModelConfig,
    hasher: Option<Box<dyn PasswordHash>>,
    events: Option<Box<dyn EventPublisher>>,
    // `None` means not loaded yet
    users: Option<UserMap>,
    roles: Option<RoleMap>,
    permissions: Option<PermissionMap>,
    secured_paths: Option<Vec<String>>,
}

impl GenericSecurityModel<MemoryStore> {
    /// Create a new model with default configuration and memory storage.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), ModelConfig::default())
    }
}

impl Default for GenericSecurityModel<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for GenericSecurityModel<S>
where
    S: SecurityStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericSecurityModel")
            .field("store", &std::any::type_name::<S>())
            .field("config", &self.config)
            .field("has_hasher", &self.hasher.is_some())
            .field("has_events", &self.events.is_some())
            .field("users_loaded", &self.users.is_some())
            .field("roles_loaded", &self.roles.is_some())
            .field("permissions_loaded", &self.permissions.is_some())
            .field("paths_loaded", &self.secured_paths.is_some())
            .finish()
    }
}

impl<S> GenericSecurityModel<S>
where
    S: SecurityStore,
{
    /// Create a new model with a custom store.
    pub fn with_store(store: S, config: ModelConfig) -> Self {
        Self {
            store,
            config,
            hasher: None,
            events: None,
            users: None,
            roles: None,
            permissions: None,
            secured_paths: None,
        }
    }

    /// Hash changed passwords with the provided algorithm.
    pub fn with_hasher(mut self, hasher: impl PasswordHash + 'static) -> Self {
        self.hasher = Some(Box::new(hasher));
        self
    }

    /// Publish security events to the provided publisher.
    pub fn with_event_publisher(mut self, events: impl EventPublisher + 'static) -> Self {
        self.events = Some(Box::new(events));
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check if the model is ready to work.
    pub fn ping(&self) -> bool {
        self.store.ping()
    }

    fn load_users(&mut self) -> Result<&mut UserMap> {
        let users = match self.users.take() {
            Some(users) => users,
            None => {
                let mut users = self.store.users()?;
                if let Some(roles) = &self.roles {
                    relink_user_roles(&mut users, roles);
                }
                users
            }
        };

        Ok(self.users.insert(users))
    }

    fn load_roles(&mut self) -> Result<&mut RoleMap> {
        let roles = match self.roles.take() {
            Some(roles) => roles,
            None => {
                let mut roles = self.store.roles()?;
                if let Some(permissions) = &self.permissions {
                    relink_role_permissions(&mut roles, permissions);
                }
                roles
            }
        };

        Ok(self.roles.insert(roles))
    }

    fn load_permissions(&mut self) -> Result<&mut PermissionMap> {
        let permissions = match self.permissions.take() {
            Some(permissions) => permissions,
            None => self.store.permissions()?,
        };

        Ok(self.permissions.insert(permissions))
    }

    /// Persist the roles and relink the cached users to the stored role objects.
    ///
    /// Users that lost a deleted role are persisted as well.
    fn persist_roles(&mut self, roles: Vec<Role>) -> Result<RoleMap> {
        let roles = self.store.set_roles(roles)?;
        self.roles = Some(roles.clone());

        let orphaned = match &mut self.users {
            Some(users) => relink_user_roles(users, &roles)
                .then(|| users.values().cloned().collect::<Vec<User>>()),
            None => None,
        };
        if let Some(users) = orphaned {
            self.users = Some(self.store.set_users(users)?);
        }

        Ok(roles)
    }

    // ---- Users ----

    /// Create a new, unsaved user.
    pub fn create_user(&self) -> User {
        User::new()
    }

    /// Get a user by id.
    pub fn user_by_id(&mut self, id: u64) -> Result<Option<User>> {
        Ok(self.load_users()?.get(&id).cloned())
    }

    /// Get a user by username, ignoring case.
    pub fn user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        Ok(self
            .load_users()?
            .values()
            .find(|user| filter::equals(user.username(), username))
            .cloned())
    }

    /// Get a user by email address, ignoring case.
    pub fn user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        Ok(self
            .load_users()?
            .values()
            .find(|user| {
                user.email()
                    .is_some_and(|user_email| filter::equals(user_email, email))
            })
            .cloned())
    }

    /// Get the users matching the filter options, in id order.
    pub fn users(&mut self, options: &FilterOptions) -> Result<Vec<User>> {
        let users = self.load_users()?;
        let matching = users
            .values()
            .filter(|user| options.matches_user(user))
            .cloned();

        Ok(options.paginate(matching))
    }

    /// Count the users matching the filter options, ignoring pagination.
    pub fn count_users(&mut self, options: &FilterOptions) -> Result<usize> {
        let users = self.load_users()?;
        Ok(users
            .values()
            .filter(|user| options.matches_user(user))
            .count())
    }

    /// Save a user.
    ///
    /// Fails when another user holds the same username or email address, ignoring case.
    /// Roles are matched by id against the registered roles; unknown roles are dropped.
    /// A changed password is announced to the event publisher and hashed before it is
    /// stored. On success `user` carries its assigned id, roles and stored password.
    pub fn save_user(&mut self, user: &mut User) -> Result<()> {
        let registered = self.load_roles()?;
        let linked: Vec<Arc<Role>> = user
            .roles()
            .iter()
            .filter_map(|role| role.id().and_then(|id| registered.get(&id).cloned()))
            .collect();
        user.set_roles(linked);

        let id = user.id();
        let users = self.load_users()?;

        for existing in users.values() {
            if existing.id() == id {
                continue;
            }

            if filter::equals(existing.username(), user.username()) {
                return Err(Error::UsernameExists(user.username().to_string()));
            }

            if let Some(email) = user.email()
                && existing
                    .email()
                    .is_some_and(|existing_email| filter::equals(existing_email, email))
            {
                return Err(Error::EmailExists(email.to_string()));
            }
        }

        let known: BTreeSet<u64> = users.keys().copied().collect();
        let mut all: Vec<User> = users
            .values()
            .filter(|existing| id.is_none() || existing.id() != id)
            .cloned()
            .collect();

        if user.is_password_changed() {
            self.store_changed_password(user)?;
        }
        all.push(user.clone());

        let users = self.store.set_users(all)?;
        if id.is_none()
            && let Some(new_id) = users.keys().copied().find(|id| !known.contains(id))
        {
            user.set_id(new_id)?;
        }
        self.users = Some(users);

        #[cfg(feature = "audit")]
        info!("User '{}' saved with id {:?}", user.username(), user.id());

        Ok(())
    }

    fn store_changed_password(&self, user: &mut User) -> Result<()> {
        if self.hasher.is_none() && self.config.require_password_hash {
            return Err(Error::InvalidConfiguration(
                "No password hash algorithm configured".to_string(),
            ));
        }

        if let Some(events) = &self.events {
            events.publish(&SecurityEvent::PasswordUpdate {
                user_id: user.id(),
                username: user.username().to_string(),
                password: user.password().to_string(),
            });
        }

        let stored = match &self.hasher {
            Some(hasher) => hasher.hash(user.password()),
            None => {
                log::warn!(
                    "No password hash algorithm configured, storing the password of '{}' as plaintext",
                    user.username()
                );
                user.password().to_string()
            }
        };

        user.store_password(stored);
        Ok(())
    }

    /// Delete a user. Unknown or unsaved users are ignored.
    pub fn delete_user(&mut self, user: &User) -> Result<()> {
        let Some(id) = user.id() else {
            return Ok(());
        };

        let users = self.load_users()?;
        if !users.contains_key(&id) {
            return Ok(());
        }

        let remaining: Vec<User> = users
            .values()
            .filter(|existing| existing.id() != Some(id))
            .cloned()
            .collect();
        self.users = Some(self.store.set_users(remaining)?);

        #[cfg(feature = "audit")]
        info!("User '{}' deleted", user.username());

        Ok(())
    }

    /// Replace the roles of a user and persist them.
    ///
    /// Roles are matched by id against the registered roles; unknown roles are ignored.
    pub fn set_roles_to_user(&mut self, user: &User, roles: &[Arc<Role>]) -> Result<()> {
        let id = user
            .id()
            .ok_or_else(|| Error::UserNotFound(user.username().to_string()))?;

        let registered = self.load_roles()?;
        let linked: Vec<Arc<Role>> = roles
            .iter()
            .filter_map(|role| role.id().and_then(|id| registered.get(&id).cloned()))
            .collect();

        let users = self.load_users()?;
        if !users.contains_key(&id) {
            return Err(Error::UserNotFound(user.username().to_string()));
        }

        let all: Vec<User> = users
            .values()
            .map(|existing| {
                let mut existing = existing.clone();
                if existing.id() == Some(id) {
                    existing.set_roles(linked.iter().cloned());
                }
                existing
            })
            .collect();
        self.users = Some(self.store.set_users(all)?);

        #[cfg(feature = "audit")]
        info!(
            "Roles of user '{}' set to {:?}",
            user.username(),
            linked.iter().map(|role| role.name()).collect::<Vec<_>>()
        );

        Ok(())
    }

    // ---- Roles ----

    /// Create a new, unsaved role.
    pub fn create_role(&self) -> Role {
        Role::new()
    }

    /// Get a role by id.
    pub fn role_by_id(&mut self, id: u64) -> Result<Option<Arc<Role>>> {
        Ok(self.load_roles()?.get(&id).cloned())
    }

    /// Get a role by name, ignoring case.
    pub fn role_by_name(&mut self, name: &str) -> Result<Option<Arc<Role>>> {
        Ok(self
            .load_roles()?
            .values()
            .find(|role| filter::equals(role.name(), name))
            .cloned())
    }

    /// Get the roles matching the filter options, in id order.
    pub fn roles(&mut self, options: &FilterOptions) -> Result<Vec<Arc<Role>>> {
        let roles = self.load_roles()?;
        let matching = roles
            .values()
            .filter(|role| options.matches_role(role))
            .cloned();

        Ok(options.paginate(matching))
    }

    /// Count the roles matching the filter options, ignoring pagination.
    pub fn count_roles(&mut self, options: &FilterOptions) -> Result<usize> {
        let roles = self.load_roles()?;
        Ok(roles
            .values()
            .filter(|role| options.matches_role(role))
            .count())
    }

    /// Save a role.
    ///
    /// Permissions are matched against the registry; unregistered ones are dropped.
    /// On success `role` carries its assigned id.
    pub fn save_role(&mut self, role: &mut Role) -> Result<()> {
        let registry = self.load_permissions()?;
        let granted: Vec<Arc<Permission>> = role
            .permissions()
            .iter()
            .filter_map(|permission| registry.get(permission.code()).cloned())
            .collect();
        role.set_permissions(granted);

        let id = role.id();
        let roles = self.load_roles()?;
        let known: BTreeSet<u64> = roles.keys().copied().collect();
        let mut all: Vec<Role> = roles
            .values()
            .filter(|existing| id.is_none() || existing.id() != id)
            .map(|existing| existing.as_ref().clone())
            .collect();
        all.push(role.clone());

        let roles = self.persist_roles(all)?;
        if id.is_none()
            && let Some(new_id) = roles.keys().copied().find(|id| !known.contains(id))
        {
            role.set_id(new_id)?;
        }

        #[cfg(feature = "audit")]
        info!("Role '{}' saved with id {:?}", role.name(), role.id());

        Ok(())
    }

    /// Delete a role and remove it from every user. Unknown or unsaved roles are ignored.
    pub fn delete_role(&mut self, role: &Role) -> Result<()> {
        let Some(id) = role.id() else {
            return Ok(());
        };

        let roles = self.load_roles()?;
        if !roles.contains_key(&id) {
            return Ok(());
        }

        let remaining: Vec<Role> = roles
            .values()
            .filter(|existing| existing.id() != Some(id))
            .map(|existing| existing.as_ref().clone())
            .collect();

        self.load_users()?;
        self.persist_roles(remaining)?;

        #[cfg(feature = "audit")]
        info!("Role '{}' deleted", role.name());

        Ok(())
    }

    fn update_role(&mut self, role: &Role, update: impl FnOnce(&mut Role)) -> Result<()> {
        let id = role
            .id()
            .ok_or_else(|| Error::RoleNotFound(role.name().to_string()))?;

        let roles = self.load_roles()?;
        if !roles.contains_key(&id) {
            return Err(Error::RoleNotFound(role.name().to_string()));
        }

        let mut update = Some(update);
        let all: Vec<Role> = roles
            .values()
            .map(|existing| {
                let mut existing = existing.as_ref().clone();
                if existing.id() == Some(id)
                    && let Some(update) = update.take()
                {
                    update(&mut existing);
                }
                existing
            })
            .collect();

        self.persist_roles(all)?;
        Ok(())
    }

    /// Replace the path patterns allowed by a role and persist them.
    pub fn set_allowed_paths_to_role(&mut self, role: &Role, paths: &[String]) -> Result<()> {
        self.update_role(role, |existing| existing.set_paths(paths.iter().cloned()))?;

        #[cfg(feature = "audit")]
        info!("Allowed paths of role '{}' set to {:?}", role.name(), paths);

        Ok(())
    }

    /// Replace the permissions granted by a role and persist them.
    ///
    /// Codes are resolved against the permission registry; unknown codes are ignored.
    pub fn set_granted_permissions_to_role<I, C>(&mut self, role: &Role, codes: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<str>,
    {
        let registry = self.load_permissions()?;
        let granted: Vec<Arc<Permission>> = codes
            .into_iter()
            .filter_map(|code| registry.get(code.as_ref()).cloned())
            .collect();

        #[cfg(feature = "audit")]
        let codes: Vec<String> = granted.iter().map(|p| p.code().to_string()).collect();

        self.update_role(role, |existing| existing.set_permissions(granted))?;

        #[cfg(feature = "audit")]
        info!("Granted permissions of role '{}' set to {:?}", role.name(), codes);

        Ok(())
    }

    // ---- Permissions ----

    /// Get all registered permissions, in code order.
    pub fn permissions(&mut self) -> Result<Vec<Arc<Permission>>> {
        Ok(self.load_permissions()?.values().cloned().collect())
    }

    /// Get a registered permission by code.
    pub fn permission(&mut self, code: &str) -> Result<Option<Arc<Permission>>> {
        Ok(self.load_permissions()?.get(code).cloned())
    }

    /// Check if a permission is registered.
    pub fn has_permission(&mut self, code: &str) -> Result<bool> {
        Ok(self.load_permissions()?.contains_key(code))
    }

    /// Register a permission.
    pub fn add_permission(&mut self, code: &str) -> Result<()> {
        self.add_permission_with_description(code, code)
    }

    /// Register a permission with a description, replacing any permission with the
    /// same code.
    pub fn add_permission_with_description(&mut self, code: &str, description: &str) -> Result<()> {
        let mut registry = self.load_permissions()?.clone();
        registry.insert(
            code.to_string(),
            Arc::new(Permission::with_description(code, description)),
        );
        self.store_permissions(registry)?;

        #[cfg(feature = "audit")]
        info!("Permission '{code}' registered");

        Ok(())
    }

    /// Unregister a permission and revoke it from every role.
    pub fn delete_permission(&mut self, code: &str) -> Result<()> {
        let mut registry = self.load_permissions()?.clone();
        if registry.remove(code).is_none() {
            return Ok(());
        }
        self.store_permissions(registry)?;

        #[cfg(feature = "audit")]
        info!("Permission '{code}' deleted");

        Ok(())
    }

    /// Persist the registry and relink the roles to it.
    fn store_permissions(&mut self, registry: PermissionMap) -> Result<()> {
        self.store.set_permissions(registry.clone())?;

        let mut roles = self.load_roles()?.clone();
        let revoked = relink_role_permissions(&mut roles, &registry);
        self.permissions = Some(registry);

        if revoked {
            let all: Vec<Role> = roles.values().map(|role| role.as_ref().clone()).collect();
            self.persist_roles(all)?;
        } else {
            if let Some(users) = &mut self.users {
                relink_user_roles(users, &roles);
            }
            self.roles = Some(roles);
        }

        Ok(())
    }

    // ---- Secured paths ----

    /// Get the path patterns secured for anonymous users.
    pub fn secured_paths(&mut self) -> Result<Vec<String>> {
        let paths = match self.secured_paths.take() {
            Some(paths) => paths,
            None => self.store.secured_paths()?,
        };

        Ok(self.secured_paths.insert(paths).clone())
    }

    /// Replace the path patterns secured for anonymous users.
    pub fn set_secured_paths(&mut self, paths: Vec<String>) -> Result<()> {
        self.store.set_secured_paths(paths.clone())?;
        self.secured_paths = Some(paths);

        #[cfg(feature = "audit")]
        info!("Secured paths updated");

        Ok(())
    }
}

impl<S> ChainableModel for GenericSecurityModel<S>
where
    S: SecurityStore + 'static,
{
    fn owns_user(&self, user: &dyn Any) -> bool {
        user.is::<User>()
    }

    fn owns_role(&self, role: &dyn Any) -> bool {
        role.is::<Role>() || role.is::<Arc<Role>>()
    }

    fn owns_permission(&self, permission: &dyn Any) -> bool {
        permission.is::<Permission>() || permission.is::<Arc<Permission>>()
    }

    fn ping(&self) -> bool {
        self.store.ping()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
