//! Property keys
//!
//! A PropertyKey names a property and remembers which type declared it.
//! Keys compare and hash by name only, so a subtype that re-declares an
//! inherited property does not produce a second entry in a view.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Name of a property plus its declaring type
#[derive(Debug, Clone)]
pub struct PropertyKey {
    name: Arc<str>,
    declaring_type: Option<Arc<str>>,
}

impl PropertyKey {
    /// Key without a declaring type
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            declaring_type: None,
        }
    }

    /// Key declared by `type_name`
    pub fn declared_by(type_name: &str, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            declaring_type: Some(Arc::from(type_name)),
        }
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simple name of the declaring type, if known
    pub fn declaring_type(&self) -> Option<&str> {
        self.declaring_type.as_deref()
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        PropertyKey::new(name)
    }
}

impl AsRef<str> for PropertyKey {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_declaring_type() {
        let a = PropertyKey::declared_by("Person", "name");
        let b = PropertyKey::declared_by("User", "name");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_accessors() {
        let key = PropertyKey::declared_by("Person", "email");
        assert_eq!(key.name(), "email");
        assert_eq!(key.declaring_type(), Some("Person"));
        assert_eq!(PropertyKey::new("id").declaring_type(), None);
        assert_eq!(key.to_string(), "email");
    }
}
