//! Filtering and pagination of users and roles.

use crate::{role::Role, user::User};

/// Options to filter a user or role listing.
///
/// Every text filter is a case-insensitive substring match; empty filters are ignored.
/// Pagination is applied after filtering and is ignored when counting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterOptions {
    /// Free text matched against username, display name and email of users, or the
    /// name of roles.
    pub query: Option<String>,
    /// Display name of users, name of roles.
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    /// 1-based page number, defaults to the first page.
    pub page: Option<usize>,
    /// Maximum number of results per page.
    pub limit: Option<usize>,
}

impl FilterOptions {
    /// Create options matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the free text query.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the name filter.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the username filter.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the email filter.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the page.
    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the page size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if a user passes the text filters.
    pub fn matches_user(&self, user: &User) -> bool {
        let username = user.username();
        let name = user.display_name();
        let email = user.email().unwrap_or_default();

        if let Some(query) = active(&self.query)
            && !contains(username, query)
            && !contains(name, query)
            && !contains(email, query)
        {
            return false;
        }

        active(&self.name).is_none_or(|filter| contains(name, filter))
            && active(&self.username).is_none_or(|filter| contains(username, filter))
            && active(&self.email).is_none_or(|filter| contains(email, filter))
    }

    /// Check if a role passes the text filters.
    pub fn matches_role(&self, role: &Role) -> bool {
        active(&self.query).is_none_or(|filter| contains(role.name(), filter))
            && active(&self.name).is_none_or(|filter| contains(role.name(), filter))
    }

    /// Apply pagination to already filtered items.
    pub fn paginate<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        match self.limit {
            Some(limit) => {
                let page = self.page.unwrap_or(1).max(1);
                items
                    .into_iter()
                    .skip((page - 1).saturating_mul(limit))
                    .take(limit)
                    .collect()
            }
            None => items.into_iter().collect(),
        }
    }
}

fn active(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().filter(|value| !value.is_empty())
}

/// Case-insensitive substring test.
pub(crate) fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Case-insensitive equality.
pub(crate) fn equals(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
