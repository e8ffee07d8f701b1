//! Security context handed to validators, converters, notions and listeners

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission scope of a security context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessScope {
    /// Unrestricted access; used for internal commit processing
    SuperUser,
    /// Authenticated user
    Authenticated,
    /// Anonymous access
    Public,
}

/// Identity and permission scope of the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityContext {
    user: Option<String>,
    scope: AccessScope,
}

impl SecurityContext {
    /// Context with unrestricted access
    pub fn super_user() -> Self {
        Self {
            user: None,
            scope: AccessScope::SuperUser,
        }
    }

    /// Context of an authenticated user
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            scope: AccessScope::Authenticated,
        }
    }

    /// Anonymous context
    pub fn public() -> Self {
        Self {
            user: None,
            scope: AccessScope::Public,
        }
    }

    /// User name, if any
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Permission scope
    pub fn scope(&self) -> AccessScope {
        self.scope
    }

    /// True for the super-user context
    pub fn is_super_user(&self) -> bool {
        self.scope == AccessScope::SuperUser
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.user, self.scope) {
            (_, AccessScope::SuperUser) => write!(f, "superuser"),
            (Some(user), _) => write!(f, "user:{}", user),
            (None, _) => write!(f, "anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts() {
        assert!(SecurityContext::super_user().is_super_user());

        let alice = SecurityContext::for_user("alice");
        assert_eq!(alice.user(), Some("alice"));
        assert_eq!(alice.scope(), AccessScope::Authenticated);
        assert_eq!(alice.to_string(), "user:alice");

        assert_eq!(SecurityContext::public().to_string(), "anonymous");
    }
}
