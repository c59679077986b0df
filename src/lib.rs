//! # Security Model
//!
//! This crate provides an in-process authorization data store: users, roles, permissions
//! and secured paths, managed by a lazily cached security model on top of a pluggable
//! store.
//!
//! ## Features
//!
//! - Users with credentials, profile data, activation and super user flags
//! - Weighted roles granting permissions and allowed path patterns
//! - Permission registry with referential integrity towards roles
//! - Secured paths for anonymous access control
//! - Filtering and pagination of users and roles
//! - Memory and XML backed stores with sequential id allocation
//! - Password hashing and password update events
//! - Chaining of several models
//! - Audit logging of mutations
//!
//! ## Quick Start
//!
//! ```rust
//! use security_model::{FilterOptions, GenericSecurityModel, GlobPathMatcher, User};
//!
//! // Initialize the model with memory storage
//! let mut model = GenericSecurityModel::new();
//!
//! // Register permissions
//! model.add_permission("article.edit")?;
//!
//! // Define a role granting a permission and a path
//! let mut editor = model.create_role();
//! editor.set_name("editor");
//! editor.set_weight(10);
//! model.save_role(&mut editor)?;
//! model.set_granted_permissions_to_role(&editor, ["article.edit"])?;
//! model.set_allowed_paths_to_role(&editor, &["/articles/**".to_string()])?;
//!
//! // Save a user and assign the role
//! let mut alice = User::with_credentials("alice", "secret");
//! model.save_user(&mut alice)?;
//! let editor = model.role_by_name("editor")?.expect("role was saved");
//! model.set_roles_to_user(&alice, &[editor])?;
//!
//! // Check authorization
//! let alice = model.user_by_username("ALICE")?.expect("user was saved");
//! assert!(alice.is_permission_granted("article.edit"));
//! assert!(alice.is_path_allowed("/articles/1/edit", None, &GlobPathMatcher::new()));
//! assert_eq!(model.count_users(&FilterOptions::new().query("ali"))?, 1);
//! # Ok::<(), security_model::Error>(())
//! ```
//!
//! ## Audit Logging
//!
//! When the `audit` feature is enabled, the model logs every mutation using the
//! standard Rust logging framework. To enable logging:
//!
//! ```rust
//! use security_model::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,security_model=debug
//! ```
//!
//! The following events are logged:
//! - User and role saves and deletions
//! - Role assignments, allowed paths and granted permissions
//! - Permission registrations and deletions
//! - Password updates (at debug level, without the password)
//! - Dangling references found while loading (at warn level)
//!

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    env_logger::init();
}

pub mod chain;
pub mod error;
pub mod events;
pub mod filter;
pub mod hash;
pub mod matcher;
pub mod model;
pub mod permission;
pub mod role;
pub mod storage;
pub mod user;

#[cfg(feature = "persistence")]
pub mod xml_storage;

#[cfg(test)]
mod property_tests;

// Re-export main types for convenience
pub use crate::{
    chain::{ChainableModel, ModelChain},
    error::{Error, Result},
    events::{EventPublisher, LogEventPublisher, SecurityEvent},
    filter::FilterOptions,
    hash::{PasswordHash, Sha256Hash},
    matcher::{GlobPathMatcher, PathMatcher},
    model::{GenericSecurityModel, ModelConfig},
    permission::Permission,
    role::Role,
    storage::{MemoryStore, SecurityStore},
    user::User,
};

#[cfg(feature = "persistence")]
pub use crate::xml_storage::{XmlStore, XmlStoreConfig};
