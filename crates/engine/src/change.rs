//! Change set handed to the pre-commit hook
//!
//! `TransactionData` is what the store reports for one pending commit:
//! node and relationship creations and deletions plus every property
//! assignment and removal with its previously committed value. Entries keep
//! the order in which the store recorded them.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use stratagraph_core::{NodeId, PropertyKey, PropertyMap, RelationshipId, Value};

/// Store-level view of a relationship
///
/// Deleted relationships are reported as records because the store no
/// longer holds them by the time listeners run.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    /// Store identity
    pub id: RelationshipId,
    /// Relationship type name
    pub rel_type: String,
    /// Start node
    pub start: NodeId,
    /// End node
    pub end: NodeId,
    /// Properties at the time of the change
    pub properties: PropertyMap,
}

/// One property assignment or removal on a node
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    /// Node owning the property
    pub entity: NodeId,
    /// Property key
    pub key: PropertyKey,
    /// Previously committed value, `None` if the property was unset
    pub previous: Option<Value>,
    /// New value, `None` for a removal
    pub value: Option<Value>,
}

impl PropertyEntry {
    /// True for a removal
    pub fn is_removal(&self) -> bool {
        self.value.is_none()
    }
}

/// All changes of one pending commit
///
/// Property entries are kept in recording order, keyed by a sequence
/// number, with an index from (node, property) to the latest entry.
#[derive(Debug, Clone, Default)]
pub struct TransactionData {
    created_nodes: Vec<NodeId>,
    created_index: FxHashSet<NodeId>,
    deleted_nodes: Vec<NodeId>,
    deleted_index: FxHashSet<NodeId>,
    created_relationships: Vec<RelationshipRecord>,
    deleted_relationships: Vec<RelationshipRecord>,
    properties: BTreeMap<u64, PropertyEntry>,
    property_index: FxHashMap<(NodeId, String), u64>,
    next_seq: u64,
}

impl TransactionData {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node creation
    pub fn create_node(&mut self, id: NodeId) {
        if self.created_index.insert(id) {
            self.created_nodes.push(id);
        }
    }

    /// Record a node deletion
    pub fn delete_node(&mut self, id: NodeId) {
        if self.deleted_index.insert(id) {
            self.deleted_nodes.push(id);
        }
    }

    /// Record a relationship creation
    pub fn create_relationship(&mut self, record: RelationshipRecord) {
        self.created_relationships.push(record);
    }

    /// Record a relationship deletion
    pub fn delete_relationship(&mut self, record: RelationshipRecord) {
        self.deleted_relationships.push(record);
    }

    /// Forget a node created in this commit, with every write to it
    ///
    /// Returns false, leaving the change set untouched, if the node was not
    /// created in this commit.
    pub fn discard_node(&mut self, id: NodeId) -> bool {
        if !self.created_index.remove(&id) {
            return false;
        }
        self.created_nodes.retain(|n| *n != id);

        let properties = &mut self.properties;
        self.property_index.retain(|(node, _), seq| {
            if *node == id {
                properties.remove(seq);
                false
            } else {
                true
            }
        });
        true
    }

    /// Forget a relationship created in this commit
    ///
    /// Returns false if the relationship was not created in this commit.
    pub fn discard_relationship(&mut self, id: RelationshipId) -> bool {
        let before = self.created_relationships.len();
        self.created_relationships.retain(|r| r.id != id);
        self.created_relationships.len() != before
    }

    fn push_entry(&mut self, entry: PropertyEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.property_index
            .insert((entry.entity, entry.key.name().to_string()), seq);
        self.properties.insert(seq, entry);
    }

    /// Record a property assignment
    pub fn assign_property(
        &mut self,
        entity: NodeId,
        key: PropertyKey,
        previous: Option<Value>,
        value: Value,
    ) {
        self.push_entry(PropertyEntry {
            entity,
            key,
            previous,
            value: Some(value),
        });
    }

    /// Record a property removal with its previously committed value
    pub fn remove_property(&mut self, entity: NodeId, key: PropertyKey, previous: Value) {
        self.push_entry(PropertyEntry {
            entity,
            key,
            previous: Some(previous),
            value: None,
        });
    }

    /// Record a write of `key` on `entity`, `None` for a removal
    ///
    /// A write to a property already written in this commit is folded into
    /// the earlier entry, which keeps the previously committed value.
    /// `current` is the value before this write and is only used for the
    /// first write of the property. A property set and removed again within
    /// the commit leaves no entry.
    pub fn record_write(
        &mut self,
        entity: NodeId,
        key: PropertyKey,
        current: Option<Value>,
        value: Option<Value>,
    ) {
        let index_key = (entity, key.name().to_string());
        let earlier = self.property_index.get(&index_key).copied();

        // an assignment overwritten by an assignment keeps its position
        if let (Some(value), Some(seq)) = (&value, earlier) {
            if let Some(entry) = self.properties.get_mut(&seq) {
                if !entry.is_removal() {
                    entry.value = Some(value.clone());
                    return;
                }
            }
        }

        let previous = match earlier {
            Some(seq) => {
                self.property_index.remove(&index_key);
                self.properties.remove(&seq).and_then(|entry| entry.previous)
            }
            None => current,
        };

        match (value, previous) {
            (Some(value), previous) => self.assign_property(entity, key, previous, value),
            (None, Some(previous)) => self.remove_property(entity, key, previous),
            (None, None) => {}
        }
    }

    /// Nodes created in this commit
    pub fn created_nodes(&self) -> &[NodeId] {
        &self.created_nodes
    }

    /// Nodes deleted in this commit
    pub fn deleted_nodes(&self) -> &[NodeId] {
        &self.deleted_nodes
    }

    /// Relationships created in this commit
    pub fn created_relationships(&self) -> &[RelationshipRecord] {
        &self.created_relationships
    }

    /// Relationships deleted in this commit
    pub fn deleted_relationships(&self) -> &[RelationshipRecord] {
        &self.deleted_relationships
    }

    /// Property assignments in recording order
    pub fn assigned_properties(&self) -> impl Iterator<Item = &PropertyEntry> + '_ {
        self.properties.values().filter(|e| !e.is_removal())
    }

    /// Property removals in recording order
    pub fn removed_properties(&self) -> impl Iterator<Item = &PropertyEntry> + '_ {
        self.properties.values().filter(|e| e.is_removal())
    }

    /// Latest entry for `key` on `entity`
    pub fn property_entry(&self, entity: NodeId, key: &str) -> Option<&PropertyEntry> {
        self.property_index
            .get(&(entity, key.to_string()))
            .and_then(|seq| self.properties.get(seq))
    }

    /// Check if a node was created in this commit
    pub fn is_created(&self, id: NodeId) -> bool {
        self.created_index.contains(&id)
    }

    /// Check if a node was deleted in this commit
    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.deleted_index.contains(&id)
    }

    /// Every node created, deleted or written in this commit
    pub fn touched_nodes(&self) -> BTreeSet<NodeId> {
        self.created_nodes
            .iter()
            .chain(&self.deleted_nodes)
            .copied()
            .chain(self.properties.values().map(|e| e.entity))
            .collect()
    }

    /// Last committed properties of every deleted node
    ///
    /// Built from the removal entries; a deleted node without removals maps
    /// to an empty snapshot.
    pub fn deletion_snapshots(&self) -> BTreeMap<NodeId, PropertyMap> {
        let mut snapshots: BTreeMap<NodeId, PropertyMap> = self
            .deleted_nodes
            .iter()
            .map(|id| (*id, PropertyMap::new()))
            .collect();
        for entry in self.removed_properties() {
            if let (Some(snapshot), Some(previous)) =
                (snapshots.get_mut(&entry.entity), &entry.previous)
            {
                snapshot.insert(entry.key.name().to_string(), previous.clone());
            }
        }
        snapshots
    }

    /// Check if the change set is empty
    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.created_relationships.is_empty()
            && self.deleted_relationships.is_empty()
            && self.properties.is_empty()
    }
}
