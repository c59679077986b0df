//! Event notification collaborator.

/// Events emitted by the security model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    /// A user's password is about to be hashed and stored.
    ///
    /// Carries the plaintext so listeners can, for example, propagate it to another
    /// system before it is replaced by its digest.
    PasswordUpdate {
        user_id: Option<u64>,
        username: String,
        password: String,
    },
}

impl SecurityEvent {
    /// Event name of a password update.
    pub const PASSWORD_UPDATE: &'static str = "security.password.update";

    /// Get the name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            SecurityEvent::PasswordUpdate { .. } => Self::PASSWORD_UPDATE,
        }
    }
}

/// Receives security events.
///
/// Publishing is fire-and-forget: implementations must not block for long and cannot
/// fail the operation that triggered the event.
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    fn publish(&self, event: &SecurityEvent);
}

/// Publisher writing events to the log at debug level. Passwords are never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventPublisher;

impl EventPublisher for LogEventPublisher {
    fn publish(&self, event: &SecurityEvent) {
        match event {
            SecurityEvent::PasswordUpdate {
                user_id, username, ..
            } => {
                log::debug!(
                    "Event '{}' for user '{}' ({:?})",
                    event.name(),
                    username,
                    user_id
                );
            }
        }
    }
}
