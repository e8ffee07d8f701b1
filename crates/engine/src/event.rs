//! Domain events delivered to listeners
//!
//! Events borrow the typed objects built for one dispatch and live only for
//! the duration of that dispatch.

use std::fmt;
use stratagraph_core::{NodeId, PropertyKey, PropertyMap, TypedNode, TypedRelationship, Value};

/// Typed notification about one step of a commit
#[derive(Debug, Clone, Copy)]
pub enum DomainEvent<'a> {
    /// Commit processing started
    Begin,
    /// A property of an existing or new node changed
    PropertyModified {
        /// Owning node
        entity: &'a TypedNode,
        /// Changed key
        key: &'a PropertyKey,
        /// Previously committed value
        old: Option<&'a Value>,
        /// New value, `None` for a removal
        new: Option<&'a Value>,
    },
    /// A relationship was created
    RelationshipCreated(&'a TypedRelationship),
    /// A relationship was deleted
    RelationshipDeleted(&'a TypedRelationship),
    /// A node was created
    GraphObjectCreated(&'a TypedNode),
    /// A node that existed before this commit was modified
    GraphObjectModified(&'a TypedNode),
    /// A node was deleted
    GraphObjectDeleted {
        /// Identity the node had
        id: NodeId,
        /// Properties the node had before deletion
        removed: &'a PropertyMap,
    },
    /// Every event of the commit was delivered
    Commit,
    /// The commit was rolled back
    Rollback,
    /// Nodes were read by a traversal (outside the commit path)
    Visited(&'a [TypedNode]),
}

/// Discriminant of a [`DomainEvent`], for matching and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`DomainEvent::Begin`]
    Begin,
    /// See [`DomainEvent::PropertyModified`]
    PropertyModified,
    /// See [`DomainEvent::RelationshipCreated`]
    RelationshipCreated,
    /// See [`DomainEvent::RelationshipDeleted`]
    RelationshipDeleted,
    /// See [`DomainEvent::GraphObjectCreated`]
    GraphObjectCreated,
    /// See [`DomainEvent::GraphObjectModified`]
    GraphObjectModified,
    /// See [`DomainEvent::GraphObjectDeleted`]
    GraphObjectDeleted,
    /// See [`DomainEvent::Commit`]
    Commit,
    /// See [`DomainEvent::Rollback`]
    Rollback,
    /// See [`DomainEvent::Visited`]
    Visited,
}

impl DomainEvent<'_> {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::Begin => EventKind::Begin,
            DomainEvent::PropertyModified { .. } => EventKind::PropertyModified,
            DomainEvent::RelationshipCreated(_) => EventKind::RelationshipCreated,
            DomainEvent::RelationshipDeleted(_) => EventKind::RelationshipDeleted,
            DomainEvent::GraphObjectCreated(_) => EventKind::GraphObjectCreated,
            DomainEvent::GraphObjectModified(_) => EventKind::GraphObjectModified,
            DomainEvent::GraphObjectDeleted { .. } => EventKind::GraphObjectDeleted,
            DomainEvent::Commit => EventKind::Commit,
            DomainEvent::Rollback => EventKind::Rollback,
            DomainEvent::Visited(_) => EventKind::Visited,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Begin => "begin",
            EventKind::PropertyModified => "propertyModified",
            EventKind::RelationshipCreated => "relationshipCreated",
            EventKind::RelationshipDeleted => "relationshipDeleted",
            EventKind::GraphObjectCreated => "graphObjectCreated",
            EventKind::GraphObjectModified => "graphObjectModified",
            EventKind::GraphObjectDeleted => "graphObjectDeleted",
            EventKind::Commit => "commit",
            EventKind::Rollback => "rollback",
            EventKind::Visited => "visited",
        };
        write!(f, "{}", name)
    }
}
