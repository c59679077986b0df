//! Permission definitions.

/// A permission is an atomic, named capability such as `article.edit`.
///
/// Permissions are immutable once constructed and compare by code only, so two
/// permissions with the same code but different descriptions are equal.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Permission {
    /// Unique code of the permission.
    code: String,
    /// Human-readable description, defaults to the code.
    description: String,
}

impl Permission {
    /// Create a new permission whose description is its code.
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            description: code.clone(),
            code,
        }
    }

    /// Create a new permission with a description.
    ///
    /// An empty description falls back to the code.
    pub fn with_description(code: impl Into<String>, description: impl Into<String>) -> Self {
        let code = code.into();
        let description = description.into();
        let description = if description.is_empty() {
            code.clone()
        } else {
            description
        };

        Self { code, description }
    }

    /// Get the code of this permission.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the description of this permission.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Permission {}

impl std::hash::Hash for Permission {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_permission_creation() {
        let permission = Permission::new("article.edit");
        assert_eq!(permission.code(), "article.edit");
        assert_eq!(permission.description(), "article.edit");
    }

    #[test]
    fn test_permission_description() {
        let permission = Permission::with_description("article.edit", "Edit articles");
        assert_eq!(permission.description(), "Edit articles");

        let permission = Permission::with_description("article.edit", "");
        assert_eq!(permission.description(), "article.edit");
    }

    #[test]
    fn test_permission_equality_by_code() {
        let a = Permission::with_description("article.edit", "Edit");
        let b = Permission::with_description("article.edit", "Something else");
        assert_eq!(a, b);
        assert_ne!(a, Permission::new("article.view"));

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_permission_display() {
        assert_eq!(Permission::new("article.view").to_string(), "article.view");
    }
}
