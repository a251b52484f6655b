//! Scope sets and the scope evaluator.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::OAuthError;

/// An order-independent set of scope names.
///
/// Parsed from and displayed as the space-delimited form used on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a space-delimited scope string. Repeated whitespace is ignored.
    pub fn parse(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_string).collect())
    }

    pub fn from_optional(raw: Option<&str>) -> Self {
        raw.map(Self::parse).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn insert(&mut self, scope: impl Into<String>) {
        self.0.insert(scope.into());
    }

    pub fn remove(&mut self, scope: &str) -> bool {
        self.0.remove(scope)
    }

    fn difference<'a>(&'a self, other: &'a ScopeSet) -> Vec<&'a str> {
        self.0.difference(&other.0).map(String::as_str).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Display for ScopeSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(" "))
    }
}

/// Narrow a requested scope set against the scopes a client may receive.
///
/// An empty request is granted the full allowed set. Anything outside the
/// allowed set rejects the whole request; scopes are never silently dropped.
pub fn clip(requested: &ScopeSet, allowed: &ScopeSet) -> Result<ScopeSet, OAuthError> {
    if requested.is_empty() {
        return Ok(allowed.clone());
    }

    if !requested.is_subset(allowed) {
        let excess = requested.difference(allowed);
        tracing::debug!("Rejected scopes outside allowed set: {:?}", excess);
        return Err(OAuthError::InvalidScope(format!(
            "scope not permitted: {}",
            excess.join(" ")
        )));
    }

    Ok(requested.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(raw: &str) -> ScopeSet {
        ScopeSet::parse(raw)
    }

    #[test]
    fn test_parse_is_order_independent() {
        assert_eq!(set("read write"), set("write  read"));
        assert_eq!(set("read write").to_string(), "read write");
    }

    #[test]
    fn test_clip_rejects_excess_scope() {
        let err = clip(&set("read write"), &set("read")).unwrap_err();
        assert!(matches!(err, OAuthError::InvalidScope(ref s) if s.contains("write")));
    }

    #[test]
    fn test_clip_empty_request_grants_allowed() {
        assert_eq!(clip(&ScopeSet::new(), &set("read write")).unwrap(), set("read write"));
    }

    #[test]
    fn test_clip_subset_passes_through() {
        assert_eq!(clip(&set("write"), &set("read write")).unwrap(), set("write"));
    }

    #[test]
    fn test_serde_as_list() {
        let json = serde_json::to_string(&set("write read")).unwrap();
        assert_eq!(json, r#"["read","write"]"#);
    }
}
