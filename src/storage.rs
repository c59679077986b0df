//! Storage abstractions for persisting security data.
//!
//! A store loads and saves whole collections. It owns identifier allocation: every
//! user or role handed to [`SecurityStore::set_users`] or [`SecurityStore::set_roles`]
//! without an id gets the next id of its kind and is keyed under it in the returned
//! collection.

use crate::{
    error::{Error, Result},
    permission::Permission,
    role::Role,
    user::User,
};
use std::{collections::BTreeMap, sync::Arc};

/// Users keyed by id.
pub type UserMap = BTreeMap<u64, User>;

/// Roles keyed by id.
pub type RoleMap = BTreeMap<u64, Arc<Role>>;

/// Permissions keyed by code.
pub type PermissionMap = BTreeMap<String, Arc<Permission>>;

/// Trait for loading and saving the security collections.
///
/// Every setter replaces the full collection and persists it before returning.
/// Implementations report write failures as errors and never drop data silently.
pub trait SecurityStore: Send + Sync {
    /// Check if the store is ready to work.
    fn ping(&self) -> bool;

    /// Load all users with their roles resolved.
    fn users(&mut self) -> Result<UserMap>;

    /// Replace and persist all users, assigning ids where missing.
    fn set_users(&mut self, users: Vec<User>) -> Result<UserMap>;

    /// Load all roles with their permissions resolved.
    fn roles(&mut self) -> Result<RoleMap>;

    /// Replace and persist all roles, assigning ids where missing.
    fn set_roles(&mut self, roles: Vec<Role>) -> Result<RoleMap>;

    /// Load the permission registry.
    fn permissions(&mut self) -> Result<PermissionMap>;

    /// Replace and persist the permission registry.
    fn set_permissions(&mut self, permissions: PermissionMap) -> Result<()>;

    /// Load the path patterns secured for anonymous users.
    fn secured_paths(&mut self) -> Result<Vec<String>>;

    /// Replace and persist the path patterns secured for anonymous users.
    fn set_secured_paths(&mut self, paths: Vec<String>) -> Result<()>;
}

/// The four collections held by a store.
#[derive(Debug, Clone, Default)]
pub struct SecurityData {
    pub users: UserMap,
    pub roles: RoleMap,
    pub permissions: PermissionMap,
    pub secured_paths: Vec<String>,
}

/// Entities carrying a once-assignable numeric id.
pub trait Identified {
    fn id(&self) -> Option<u64>;

    fn set_id(&mut self, id: u64) -> Result<()>;
}

impl Identified for User {
    fn id(&self) -> Option<u64> {
        User::id(self)
    }

    fn set_id(&mut self, id: u64) -> Result<()> {
        User::set_id(self, id)
    }
}

impl Identified for Role {
    fn id(&self) -> Option<u64> {
        Role::id(self)
    }

    fn set_id(&mut self, id: u64) -> Result<()> {
        Role::set_id(self, id)
    }
}

/// Per-kind id counters.
///
/// Counters start at 1 and are pushed past every id observed, so allocation stays
/// monotonic across restarts as long as the loaded ids are observed first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSequence {
    next_user: u64,
    next_role: u64,
}

impl Default for IdSequence {
    fn default() -> Self {
        Self {
            next_user: 1,
            next_role: 1,
        }
    }
}

impl IdSequence {
    /// Create counters starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id handed out to a user.
    pub fn next_user_id(&self) -> u64 {
        self.next_user
    }

    /// Next id handed out to a role.
    pub fn next_role_id(&self) -> u64 {
        self.next_role
    }

    /// Record an existing user id.
    pub fn observe_user(&mut self, id: u64) {
        self.next_user = self.next_user.max(id.saturating_add(1));
    }

    /// Record an existing role id.
    pub fn observe_role(&mut self, id: u64) {
        self.next_role = self.next_role.max(id.saturating_add(1));
    }

    /// Key users by id, assigning new ids to users without one.
    pub fn assign_users(&mut self, users: Vec<User>) -> Result<UserMap> {
        assign(&mut self.next_user, users)
    }

    /// Key roles by id, assigning new ids to roles without one.
    pub fn assign_roles(&mut self, roles: Vec<Role>) -> Result<RoleMap> {
        Ok(assign(&mut self.next_role, roles)?
            .into_iter()
            .map(|(id, role)| (id, Arc::new(role)))
            .collect())
    }
}

fn assign<T: Identified>(next: &mut u64, items: Vec<T>) -> Result<BTreeMap<u64, T>> {
    let mut keyed = BTreeMap::new();
    let mut pending = Vec::new();

    for item in items {
        match item.id() {
            Some(id) => {
                *next = (*next).max(id.saturating_add(1));
                keyed.insert(id, item);
            }
            None => pending.push(item),
        }
    }

    for mut item in pending {
        let id = *next;
        let following = id
            .checked_add(1)
            .ok_or_else(|| Error::Storage("Identifier space exhausted".to_string()))?;
        item.set_id(id)?;
        *next = following;
        keyed.insert(id, item);
    }

    Ok(keyed)
}

/// A role as loaded from storage, with permissions still as bare codes.
#[derive(Debug, Clone)]
pub struct RoleRecord {
    pub role: Role,
    pub permission_codes: Vec<String>,
}

/// A user as loaded from storage, with roles still as bare ids.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub role_ids: Vec<u64>,
}

/// Rebuild the object graph from flat records.
///
/// Roles get their permission objects from the registry first; users are then linked
/// to the resolved roles. References to unknown codes or ids are dropped. The returned
/// sequence is seeded past every loaded id.
pub fn resolve(
    permissions: PermissionMap,
    roles: Vec<RoleRecord>,
    users: Vec<UserRecord>,
    secured_paths: Vec<String>,
) -> (SecurityData, IdSequence) {
    let mut ids = IdSequence::new();

    let mut role_map = RoleMap::new();
    for RoleRecord {
        mut role,
        permission_codes,
    } in roles
    {
        let Some(id) = role.id() else {
            log::warn!("Skipping role '{}' without an id", role.name());
            continue;
        };

        let granted: Vec<Arc<Permission>> = permission_codes
            .iter()
            .filter_map(|code| {
                let permission = permissions.get(code).cloned();
                if permission.is_none() {
                    log::warn!("Role {id} references unknown permission '{code}'");
                }
                permission
            })
            .collect();
        role.set_permissions(granted);

        ids.observe_role(id);
        role_map.insert(id, Arc::new(role));
    }

    let mut user_map = UserMap::new();
    for UserRecord { mut user, role_ids } in users {
        let Some(id) = user.id() else {
            log::warn!("Skipping user '{}' without an id", user.username());
            continue;
        };

        let roles: Vec<Arc<Role>> = role_ids
            .iter()
            .filter_map(|role_id| {
                let role = role_map.get(role_id).cloned();
                if role.is_none() {
                    log::warn!("User {id} references unknown role {role_id}");
                }
                role
            })
            .collect();
        user.set_roles(roles);

        ids.observe_user(id);
        user_map.insert(id, user);
    }

    let data = SecurityData {
        users: user_map,
        roles: role_map,
        permissions,
        secured_paths,
    };

    (data, ids)
}

/// Point every role at the registry's permission objects.
///
/// Returns true when a role lost a permission that is no longer registered.
pub fn relink_role_permissions(roles: &mut RoleMap, permissions: &PermissionMap) -> bool {
    let mut removed = false;

    for role in roles.values_mut() {
        let granted: Vec<Arc<Permission>> = role
            .permissions()
            .iter()
            .filter_map(|permission| permissions.get(permission.code()).cloned())
            .collect();

        let unchanged = granted.len() == role.permissions().len()
            && granted
                .iter()
                .zip(role.permissions())
                .all(|(a, b)| Arc::ptr_eq(a, b));
        if unchanged {
            continue;
        }

        removed |= granted.len() != role.permissions().len();
        Arc::make_mut(role).set_permissions(granted);
    }

    removed
}

/// Point every user at the current role objects.
///
/// Returns true when a user lost a role that no longer exists.
pub fn relink_user_roles(users: &mut UserMap, roles: &RoleMap) -> bool {
    let mut removed = false;

    for user in users.values_mut() {
        let linked: Vec<Arc<Role>> = user
            .roles()
            .iter()
            .filter_map(|role| role.id().and_then(|id| roles.get(&id).cloned()))
            .collect();

        let unchanged = linked.len() == user.roles().len()
            && linked
                .iter()
                .zip(user.roles())
                .all(|(a, b)| Arc::ptr_eq(a, b));
        if unchanged {
            continue;
        }

        removed |= linked.len() != user.roles().len();
        user.set_roles(linked);
    }

    removed
}

/// In-memory store. Nothing survives the process, but ids are allocated exactly as a
/// durable store would.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: SecurityData,
    ids: IdSequence,
}

impl MemoryStore {
    /// Create an empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory store seeded with existing data.
    pub fn with_data(data: SecurityData) -> Self {
        let mut ids = IdSequence::new();
        for id in data.users.keys() {
            ids.observe_user(*id);
        }
        for id in data.roles.keys() {
            ids.observe_role(*id);
        }

        Self { data, ids }
    }

    /// Get the number of stored users.
    pub fn user_count(&self) -> usize {
        self.data.users.len()
    }

    /// Get the number of stored roles.
    pub fn role_count(&self) -> usize {
        self.data.roles.len()
    }

    /// Get the id sequence.
    pub fn ids(&self) -> &IdSequence {
        &self.ids
    }
}

impl SecurityStore for MemoryStore {
    fn ping(&self) -> bool {
        true
    }

    fn users(&mut self) -> Result<UserMap> {
        Ok(self.data.users.clone())
    }

    fn set_users(&mut self, users: Vec<User>) -> Result<UserMap> {
        self.data.users = self.ids.assign_users(users)?;
        Ok(self.data.users.clone())
    }

    fn roles(&mut self) -> Result<RoleMap> {
        Ok(self.data.roles.clone())
    }

    fn set_roles(&mut self, roles: Vec<Role>) -> Result<RoleMap> {
        self.data.roles = self.ids.assign_roles(roles)?;
        relink_user_roles(&mut self.data.users, &self.data.roles);
        Ok(self.data.roles.clone())
    }

    fn permissions(&mut self) -> Result<PermissionMap> {
        Ok(self.data.permissions.clone())
    }

    fn set_permissions(&mut self, permissions: PermissionMap) -> Result<()> {
        self.data.permissions = permissions;
        Ok(())
    }

    fn secured_paths(&mut self) -> Result<Vec<String>> {
        Ok(self.data.secured_paths.clone())
    }

    fn set_secured_paths(&mut self, paths: Vec<String>) -> Result<()> {
        self.data.secured_paths = paths;
        Ok(())
    }
}
