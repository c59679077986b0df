//! Chaining of several security models.
//!
//! An application may combine models that each manage their own kind of users, for
//! example a local model next to a directory service. A [`ModelChain`] asks each model
//! in order whether it owns an entity and hands the entity to the first one that does.
//!
//! The chain only resolves ownership. To run an operation, take the owner mutably and
//! downcast it to its concrete model type:
//!
//! ```rust
//! use security_model::{GenericSecurityModel, ModelChain, User};
//!
//! let mut chain = ModelChain::new().with_model(GenericSecurityModel::new());
//! let mut alice = User::with_credentials("alice", "secret");
//!
//! if let Some(model) = chain
//!     .user_owner_mut(&alice)
//!     .and_then(|owner| owner.as_any_mut().downcast_mut::<GenericSecurityModel>())
//! {
//!     model.save_user(&mut alice)?;
//! }
//! assert_eq!(alice.id(), Some(1));
//! # Ok::<(), security_model::Error>(())
//! ```

use std::any::Any;

/// A model that can take part in a [`ModelChain`].
pub trait ChainableModel: Send + Sync {
    /// Check if the user belongs to this model.
    fn owns_user(&self, user: &dyn Any) -> bool;

    /// Check if the role belongs to this model.
    fn owns_role(&self, role: &dyn Any) -> bool;

    /// Check if the permission belongs to this model.
    fn owns_permission(&self, permission: &dyn Any) -> bool;

    /// Check if the model is ready to work.
    fn ping(&self) -> bool;

    /// Get the model as `Any`, to reach its concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Get the model as mutable `Any`, to run operations on its concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered list of models.
#[derive(Default)]
pub struct ModelChain {
    models: Vec<Box<dyn ChainableModel>>,
}

impl ModelChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a model to the chain.
    pub fn add_model(&mut self, model: impl ChainableModel + 'static) {
        self.models.push(Box::new(model));
    }

    /// Append a model to the chain, builder style.
    pub fn with_model(mut self, model: impl ChainableModel + 'static) -> Self {
        self.add_model(model);
        self
    }

    /// Get the models in chain order.
    pub fn models(&self) -> &[Box<dyn ChainableModel>] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Get the first model owning the user.
    pub fn user_owner(&self, user: &dyn Any) -> Option<&dyn ChainableModel> {
        self.find(|model| model.owns_user(user))
    }

    /// Get the first model owning the role.
    pub fn role_owner(&self, role: &dyn Any) -> Option<&dyn ChainableModel> {
        self.find(|model| model.owns_role(role))
    }

    /// Get the first model owning the permission.
    pub fn permission_owner(&self, permission: &dyn Any) -> Option<&dyn ChainableModel> {
        self.find(|model| model.owns_permission(permission))
    }

    /// Get the first model owning the user, mutably.
    pub fn user_owner_mut(&mut self, user: &dyn Any) -> Option<&mut dyn ChainableModel> {
        self.find_mut(|model| model.owns_user(user))
    }

    /// Get the first model owning the role, mutably.
    pub fn role_owner_mut(&mut self, role: &dyn Any) -> Option<&mut dyn ChainableModel> {
        self.find_mut(|model| model.owns_role(role))
    }

    /// Get the first model owning the permission, mutably.
    pub fn permission_owner_mut(
        &mut self,
        permission: &dyn Any,
    ) -> Option<&mut dyn ChainableModel> {
        self.find_mut(|model| model.owns_permission(permission))
    }

    /// Check if every model in the chain is ready.
    pub fn ping(&self) -> bool {
        self.models.iter().all(|model| model.ping())
    }

    fn find(&self, owns: impl Fn(&dyn ChainableModel) -> bool) -> Option<&dyn ChainableModel> {
        self.models
            .iter()
            .map(|model| model.as_ref())
            .find(|model| owns(*model))
    }

    fn find_mut(
        &mut self,
        owns: impl Fn(&dyn ChainableModel) -> bool,
    ) -> Option<&mut dyn ChainableModel> {
        let index = self.models.iter().position(|model| owns(model.as_ref()))?;
        Some(self.models[index].as_mut())
    }
}

impl std::fmt::Debug for ModelChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelChain")
            .field("models", &self.models.len())
            .finish()
    }
}
