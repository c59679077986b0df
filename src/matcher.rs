//! Path matching for allowed and secured path patterns.

use regex::Regex;

/// Decides whether a request path and method match one of a set of path patterns.
///
/// The matcher owns the pattern syntax and the method semantics; users and the model
/// only supply the candidate patterns.
pub trait PathMatcher {
    /// Check whether `path` requested with `method` matches any of `patterns`.
    fn matches(&self, path: &str, method: Option<&str>, patterns: &[String]) -> bool;
}

/// Glob-style matcher.
///
/// Patterns look like `/admin/**` or `[GET,POST] /articles/*`. A single `*` matches
/// within one path segment, `**` matches across segments. The optional bracketed
/// method list restricts the pattern to those methods; a request without a method
/// never matches a method-restricted pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobPathMatcher;

impl GlobPathMatcher {
    /// Create a new glob matcher.
    pub fn new() -> Self {
        Self
    }

    /// Check a single pattern.
    pub fn matches_pattern(&self, path: &str, method: Option<&str>, pattern: &str) -> bool {
        let (methods, pattern) = split_methods(pattern.trim());

        if let Some(methods) = methods {
            let Some(method) = method else {
                return false;
            };
            if !methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
                return false;
            }
        }

        match compile(pattern) {
            Some(regex) => regex.is_match(path),
            None => false,
        }
    }
}

impl PathMatcher for GlobPathMatcher {
    fn matches(&self, path: &str, method: Option<&str>, patterns: &[String]) -> bool {
        patterns
            .iter()
            .any(|pattern| self.matches_pattern(path, method, pattern))
    }
}

fn split_methods(pattern: &str) -> (Option<Vec<&str>>, &str) {
    if let Some(rest) = pattern.strip_prefix('[')
        && let Some((methods, path)) = rest.split_once(']')
    {
        let methods = methods
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect();
        return (Some(methods), path.trim());
    }

    (None, pattern)
}

fn compile(pattern: &str) -> Option<Regex> {
    let mut expression = String::from("^");
    let mut rest = pattern;

    while let Some(index) = rest.find('*') {
        expression.push_str(&regex::escape(&rest[..index]));
        rest = &rest[index..];
        if rest.starts_with("**") {
            expression.push_str(".*");
            rest = &rest[2..];
        } else {
            expression.push_str("[^/]*");
            rest = &rest[1..];
        }
    }
    expression.push_str(&regex::escape(rest));
    expression.push('$');

    Regex::new(&expression).ok()
}
