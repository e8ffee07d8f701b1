//! Static relation definitions between entity types

use crate::notion::Notion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a relationship as seen from the source type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// source -[rel]-> target
    Outgoing,
    /// source <-[rel]- target
    Incoming,
    /// either direction
    Both,
}

/// Multiplicity of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// One source, one target
    OneToOne,
    /// One source, many targets
    OneToMany,
    /// Many sources, one target
    ManyToOne,
    /// Many sources, many targets
    ManyToMany,
}

impl Cardinality {
    /// True if the source side sees a collection of targets
    pub fn is_collection(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::ManyToMany
    }
}

/// (source type, property) → (target type, relationship type, direction,
/// cardinality, notion)
///
/// Type names are stored normalized (lowercase); the property name is
/// lowercased as well so lookups are case-insensitive.
#[derive(Clone)]
pub struct RelationDefinition {
    source_type: String,
    property: String,
    target_type: String,
    rel_type: String,
    direction: Direction,
    cardinality: Cardinality,
    notion: Notion,
}

impl RelationDefinition {
    pub(crate) fn new(
        source_type: String,
        property: String,
        target_type: String,
        rel_type: String,
        direction: Direction,
        cardinality: Cardinality,
        notion: Notion,
    ) -> Self {
        Self {
            source_type,
            property,
            target_type,
            rel_type,
            direction,
            cardinality,
            notion,
        }
    }

    /// Normalized source type name
    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    /// Lowercased property name on the source type
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Normalized target type name
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Relationship type stored in the graph
    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    /// Direction as seen from the source
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Multiplicity
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Notion used to (de)serialize the related entities
    pub fn notion(&self) -> &Notion {
        &self.notion
    }
}

impl fmt::Debug for RelationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDefinition")
            .field("source_type", &self.source_type)
            .field("property", &self.property)
            .field("target_type", &self.target_type)
            .field("rel_type", &self.rel_type)
            .field("direction", &self.direction)
            .field("cardinality", &self.cardinality)
            .field("notion", &self.notion)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_cardinalities() {
        assert!(Cardinality::OneToMany.is_collection());
        assert!(Cardinality::ManyToMany.is_collection());
        assert!(!Cardinality::OneToOne.is_collection());
        assert!(!Cardinality::ManyToOne.is_collection());
        assert_eq!(Cardinality::default(), Cardinality::ManyToMany);
    }
}
