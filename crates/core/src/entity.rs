//! Typed graph objects
//!
//! The store hands out raw identities; the entity factory turns them into
//! these typed views using the metadata registry. Listeners, notions and
//! validators only ever see typed objects.

use crate::types::{EntityType, NodeId, RelationshipId};
use crate::value::{PropertyMap, Value};
use std::fmt;

/// Property name under which the store keeps a node's raw type name
pub const TYPE_PROPERTY: &str = "type";

/// Property name under which notions expose the node id
pub const ID_PROPERTY: &str = "id";

/// Common read access to nodes and relationships
pub trait GraphObject {
    /// Type name of the object (entity type for nodes, relationship type for
    /// relationships)
    fn type_name(&self) -> &str;

    /// Raw numeric identity in the store
    fn raw_id(&self) -> u64;

    /// All properties of the object
    fn properties(&self) -> &PropertyMap;

    /// Single property value, `None` if unset
    fn property(&self, key: &str) -> Option<&Value> {
        self.properties().get(key)
    }
}

/// Node rehydrated into its entity type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedNode {
    id: NodeId,
    entity_type: EntityType,
    properties: PropertyMap,
}

impl TypedNode {
    /// Create a typed node
    pub fn new(id: NodeId, entity_type: EntityType, properties: PropertyMap) -> Self {
        Self {
            id,
            entity_type,
            properties,
        }
    }

    /// Store identity
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Entity type including its ancestor chain
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Set a property, returning the previous value
    pub fn set_property(&mut self, key: &str, value: Value) -> Option<Value> {
        self.properties.insert(key.to_string(), value)
    }

    /// Remove a property, returning the previous value
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Consume the node, returning its properties
    pub fn into_properties(self) -> PropertyMap {
        self.properties
    }
}

impl GraphObject for TypedNode {
    fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    fn raw_id(&self) -> u64 {
        self.id.as_u64()
    }

    fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

impl fmt::Display for TypedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity_type, self.id)
    }
}

/// Relationship rehydrated with its endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRelationship {
    id: RelationshipId,
    rel_type: String,
    start: NodeId,
    end: NodeId,
    properties: PropertyMap,
}

impl TypedRelationship {
    /// Create a typed relationship
    pub fn new(
        id: RelationshipId,
        rel_type: impl Into<String>,
        start: NodeId,
        end: NodeId,
        properties: PropertyMap,
    ) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            start,
            end,
            properties,
        }
    }

    /// Store identity
    pub fn id(&self) -> RelationshipId {
        self.id
    }

    /// Relationship type name
    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    /// Start node
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// End node
    pub fn end(&self) -> NodeId {
        self.end
    }

    /// The endpoint opposite to `node`, if `node` is an endpoint
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }
}

impl GraphObject for TypedRelationship {
    fn type_name(&self) -> &str {
        &self.rel_type
    }

    fn raw_id(&self) -> u64 {
        self.id.as_u64()
    }

    fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

impl fmt::Display for TypedRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[{}:{}]->({})",
            self.start, self.id, self.rel_type, self.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityType {
        EntityType::derive("Person", &EntityType::root("AbstractNode"))
    }

    #[test]
    fn test_node_properties() {
        let mut node = TypedNode::new(NodeId(1), person(), PropertyMap::new());
        assert_eq!(node.set_property("name", Value::from("alice")), None);
        assert_eq!(
            node.set_property("name", Value::from("bob")),
            Some(Value::from("alice"))
        );
        assert_eq!(node.property("name"), Some(&Value::from("bob")));
        assert_eq!(node.type_name(), "Person");
        assert_eq!(node.raw_id(), 1);
        assert_eq!(node.to_string(), "Person(n1)");
    }

    #[test]
    fn test_relationship_other_node() {
        let rel = TypedRelationship::new(
            RelationshipId(9),
            "OWNS",
            NodeId(1),
            NodeId(2),
            PropertyMap::new(),
        );
        assert_eq!(rel.other_node(NodeId(1)), Some(NodeId(2)));
        assert_eq!(rel.other_node(NodeId(2)), Some(NodeId(1)));
        assert_eq!(rel.other_node(NodeId(3)), None);
        assert_eq!(rel.type_name(), "OWNS");
    }
}
