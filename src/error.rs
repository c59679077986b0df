//! Error types for the security model.

use thiserror::Error;

/// The main error type for security model operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Another user already holds this username.
    #[error("Username '{0}' already exists")]
    UsernameExists(String),

    /// Another user already holds this email address.
    #[error("Email address '{0}' already exists")]
    EmailExists(String),

    /// An entity id can only be assigned once.
    #[error("Could not set the id of the {kind} to {requested}: already set to {current}")]
    IdAlreadySet {
        kind: &'static str,
        current: u64,
        requested: u64,
    },

    /// The user is not known to the model.
    #[error("User '{0}' not found")]
    UserNotFound(String),

    /// The role is not known to the model.
    #[error("Role '{0}' not found")]
    RoleNotFound(String),

    /// The persisted document could not be interpreted.
    #[error("Malformed security document: {0}")]
    MalformedDocument(String),

    /// Reading or writing the backing store failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// XML syntax error.
    #[cfg(feature = "persistence")]
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid XML attribute.
    #[cfg(feature = "persistence")]
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// Storage operation failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type alias for security model operations.
pub type Result<T> = std::result::Result<T, Error>;
