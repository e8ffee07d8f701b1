//! Core types for stratagraph
//!
//! This module defines the foundational types:
//! - NodeId / RelationshipId: store-native identities of graph objects
//! - TxnId: identifier of one attempted commit
//! - EntityType: a type name together with its explicit ancestor chain
//! - Type-name normalization and pluralization used for registry keys

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Store-native identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Store-native identity of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

impl RelationshipId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of one attempted commit
///
/// Allocated monotonically by the change interceptor. Listeners receive it
/// with every event so they can correlate the events of one transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Entity type with its explicit ancestor chain
///
/// The chain is computed once when the type is derived and stored inline:
/// `chain[0]` is the type itself, the last element is the root. Every
/// inheritance-aware registry lookup is a linear scan over [`ancestors`].
///
/// ```
/// use stratagraph_core::EntityType;
///
/// let node = EntityType::root("AbstractNode");
/// let person = EntityType::derive("Person", &node);
/// let user = EntityType::derive("User", &person);
///
/// let chain: Vec<&str> = user.ancestors().collect();
/// assert_eq!(chain, vec!["User", "Person", "AbstractNode"]);
/// assert!(user.is_subtype_of(&node));
/// ```
///
/// [`ancestors`]: EntityType::ancestors
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityType {
    chain: SmallVec<[Arc<str>; 4]>,
}

impl EntityType {
    /// Create a type without a supertype
    pub fn root(name: &str) -> Self {
        let mut chain = SmallVec::new();
        chain.push(Arc::from(name));
        Self { chain }
    }

    /// Create a subtype of `parent`
    pub fn derive(name: &str, parent: &EntityType) -> Self {
        let mut chain = SmallVec::with_capacity(parent.chain.len() + 1);
        chain.push(Arc::from(name));
        chain.extend(parent.chain.iter().cloned());
        Self { chain }
    }

    /// Simple (declared) name of the type
    pub fn name(&self) -> &str {
        &self.chain[0]
    }

    /// Lowercased name used as registry map key
    pub fn normalized_name(&self) -> String {
        normalize_type_name(self.name())
    }

    /// Direct supertype, if any
    pub fn supertype(&self) -> Option<EntityType> {
        if self.chain.len() > 1 {
            Some(Self {
                chain: self.chain[1..].iter().cloned().collect(),
            })
        } else {
            None
        }
    }

    /// Type names from this type up to the root, exact type first
    pub fn ancestors(&self) -> impl Iterator<Item = &str> + '_ {
        self.chain.iter().map(|s| s.as_ref())
    }

    /// Type names from the root down to this type
    pub fn ancestors_root_first(&self) -> impl Iterator<Item = &str> + '_ {
        self.chain.iter().rev().map(|s| s.as_ref())
    }

    /// Number of types in the chain (a root has depth 1)
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// True if `other` is this type or one of its ancestors
    pub fn is_subtype_of(&self, other: &EntityType) -> bool {
        self.chain.iter().any(|name| name.as_ref() == other.name())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lowercase a type name for use as a registry key
pub fn normalize_type_name(name: &str) -> String {
    name.to_lowercase()
}

/// Normalize and pluralize a type name
///
/// Trailing "y" becomes "ies"; otherwise "s" is appended unless the name
/// already ends in "s".
///
/// ```
/// use stratagraph_core::types::pluralize;
///
/// assert_eq!(pluralize("Company"), "companies");
/// assert_eq!(pluralize("Item"), "items");
/// assert_eq!(pluralize("Bus"), "bus");
/// ```
pub fn pluralize(name: &str) -> String {
    let converted = normalize_type_name(name);

    if let Some(stem) = converted.strip_suffix('y') {
        format!("{}ies", stem)
    } else if converted.ends_with('s') {
        converted
    } else {
        format!("{}s", converted)
    }
}

/// Registry key for a type name, optionally pluralized
pub fn convert_name(name: &str, plural: bool) -> String {
    if plural {
        pluralize(name)
    } else {
        normalize_type_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_root_type() {
        let t = EntityType::root("AbstractNode");
        assert_eq!(t.name(), "AbstractNode");
        assert_eq!(t.normalized_name(), "abstractnode");
        assert_eq!(t.depth(), 1);
        assert!(t.supertype().is_none());
    }

    #[test]
    fn test_derived_chain() {
        let root = EntityType::root("AbstractNode");
        let person = EntityType::derive("Person", &root);
        let user = EntityType::derive("User", &person);

        assert_eq!(user.depth(), 3);
        assert_eq!(user.supertype(), Some(person.clone()));
        assert_eq!(person.supertype(), Some(root.clone()));
        assert_eq!(
            user.ancestors_root_first().collect::<Vec<_>>(),
            vec!["AbstractNode", "Person", "User"]
        );
    }

    #[test]
    fn test_is_subtype_of() {
        let root = EntityType::root("AbstractNode");
        let person = EntityType::derive("Person", &root);
        let folder = EntityType::derive("Folder", &root);

        assert!(person.is_subtype_of(&person));
        assert!(person.is_subtype_of(&root));
        assert!(!person.is_subtype_of(&folder));
        assert!(!root.is_subtype_of(&person));
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("Company"), "companies");
        assert_eq!(pluralize("Item"), "items");
        assert_eq!(pluralize("Bus"), "bus");
        assert_eq!(pluralize("Folder"), "folders");
    }

    #[test]
    fn test_convert_name() {
        assert_eq!(convert_name("Company", false), "company");
        assert_eq!(convert_name("Company", true), "companies");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(NodeId(7).to_string(), "n7");
        assert_eq!(RelationshipId(3).to_string(), "r3");
        assert_eq!(TxnId(12).to_string(), "txn-12");
    }

    proptest! {
        #[test]
        fn prop_plural_is_lowercase(name in "[A-Za-z]{1,16}") {
            let plural = pluralize(&name);
            prop_assert_eq!(plural.clone(), plural.to_lowercase());
        }

        #[test]
        fn prop_plural_ends_in_s(name in "[A-Za-z]{1,16}") {
            prop_assert!(pluralize(&name).ends_with('s'));
        }

        #[test]
        fn prop_plural_keeps_stem(name in "[a-xz]{1,16}") {
            // names not ending in 'y' keep their full lowercase stem
            let plural = pluralize(&name);
            prop_assert!(plural.starts_with(&name));
        }
    }
}
