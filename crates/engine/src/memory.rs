//! In-memory reference store adapter
//!
//! `MemoryGraph` keeps committed nodes and relationships in ordered maps.
//! A `MemoryTransaction` works on a private copy of the committed state and
//! records every change as `TransactionData`. On commit the change interceptor
//! runs over that copy; if it lets the commit proceed, the recorded changes
//! are applied to the current committed state under the state lock,
//! otherwise the copy is discarded.
//!
//! Commits are first-committer-wins. A transaction whose changes rest on
//! something another transaction has since committed over (a property it
//! wrote, a node it wrote to or deleted, a relationship it deleted, an
//! endpoint of a relationship it created) fails with `Conflict` and is
//! rolled back. The check runs before dispatch and again under the state
//! lock when the changes are applied.
//!
//! Writes go through the registry: read-only and write-once checks, the
//! property converter, then the validator. A uniqueness permit taken by the
//! validator covers only the check-and-write of one property: under the
//! permit the value is checked against the committed state and the values
//! other open transactions have claimed, and is then claimed for this
//! transaction. Claims are dropped when the transaction commits or ends.

use crate::change::{RelationshipRecord, TransactionData};
use crate::factory::EntityFactory;
use crate::interceptor::{ChangeInterceptor, CommitOutcome, CommitSummary};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratagraph_concurrency::TransactionContext;
use stratagraph_core::{
    EntityType, GraphObject, NodeId, PropertyKey, PropertyMap, RelationshipId, SecurityContext,
    StrataError, StrataResult, TxnId, TypedNode, TypedRelationship, Value, TYPE_PROPERTY,
};
use stratagraph_registry::{MetadataRegistry, NodeResolver, UniquenessLookup, ValidationContext};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: BTreeMap<NodeId, PropertyMap>,
    relationships: BTreeMap<RelationshipId, RelationshipRecord>,
}

/// Unique value written by an open transaction
#[derive(Debug, Clone)]
struct Claim {
    entity_type: EntityType,
    value: Value,
}

type ClaimTable = BTreeMap<TxnId, BTreeMap<(NodeId, String), Claim>>;

/// Drops the claims of one transaction when it ends
struct ClaimGuard<'g> {
    claims: &'g Mutex<ClaimTable>,
    txn_id: TxnId,
}

impl ClaimGuard<'_> {
    fn claim(&self, node: NodeId, entity_type: &EntityType, key: &PropertyKey, value: &Value) {
        self.claims.lock().entry(self.txn_id).or_default().insert(
            (node, key.name().to_string()),
            Claim {
                entity_type: entity_type.clone(),
                value: value.clone(),
            },
        );
    }

    fn release(&self, node: NodeId, key: Option<&PropertyKey>) {
        if let Some(claims) = self.claims.lock().get_mut(&self.txn_id) {
            claims.retain(|(n, k), _| *n != node || key.map_or(false, |key| key.name() != k));
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.txn_id);
    }
}

/// Read view of one state resolved through the registry
struct StateView<'a> {
    registry: &'a MetadataRegistry,
    state: &'a GraphState,
}

impl StateView<'_> {
    fn entity_type(&self, properties: &PropertyMap) -> Option<EntityType> {
        properties
            .get(TYPE_PROPERTY)
            .and_then(Value::as_str)
            .and_then(|raw| self.registry.entity_type_for_raw_type(raw))
            .cloned()
    }

    fn typed(&self, id: NodeId, properties: &PropertyMap) -> Option<TypedNode> {
        self.entity_type(properties)
            .map(|ty| TypedNode::new(id, ty, properties.clone()))
    }

    fn all_nodes(&self) -> impl Iterator<Item = TypedNode> + '_ {
        self.state
            .nodes
            .iter()
            .filter_map(|(id, props)| self.typed(*id, props))
    }
}

impl EntityFactory for StateView<'_> {
    fn instantiate_node(&self, id: NodeId) -> StrataResult<Option<TypedNode>> {
        Ok(self
            .state
            .nodes
            .get(&id)
            .and_then(|props| self.typed(id, props)))
    }

    fn instantiate_relationship(
        &self,
        record: &RelationshipRecord,
    ) -> StrataResult<Option<TypedRelationship>> {
        Ok(Some(TypedRelationship::new(
            record.id,
            record.rel_type.clone(),
            record.start,
            record.end,
            record.properties.clone(),
        )))
    }
}

impl UniquenessLookup for StateView<'_> {
    fn nodes_with_value(
        &self,
        type_name: Option<&str>,
        key: &PropertyKey,
        value: &Value,
    ) -> StrataResult<Vec<NodeId>> {
        Ok(self
            .all_nodes()
            .filter(|node| {
                type_name.map_or(true, |name| node.entity_type().ancestors().any(|a| a == name))
            })
            .filter(|node| node.property(key.name()) == Some(value))
            .map(|node| node.id())
            .collect())
    }
}

/// Uniqueness lookup of one open transaction
///
/// Nodes the transaction touched are read from its working copy, every
/// other node from the committed state at the time of the lookup. Values
/// claimed by other open transactions count as held.
struct TransactionLookup<'a> {
    registry: &'a MetadataRegistry,
    committed: &'a RwLock<GraphState>,
    claims: &'a Mutex<ClaimTable>,
    txn_id: TxnId,
    working: &'a GraphState,
    touched: BTreeSet<NodeId>,
}

impl UniquenessLookup for TransactionLookup<'_> {
    fn nodes_with_value(
        &self,
        type_name: Option<&str>,
        key: &PropertyKey,
        value: &Value,
    ) -> StrataResult<Vec<NodeId>> {
        let mut holders = StateView {
            registry: self.registry,
            state: self.working,
        }
        .nodes_with_value(type_name, key, value)?;
        holders.retain(|id| self.touched.contains(id));

        {
            let committed = self.committed.read();
            let current = StateView {
                registry: self.registry,
                state: &committed,
            }
            .nodes_with_value(type_name, key, value)?;
            holders.extend(current.into_iter().filter(|id| !self.touched.contains(id)));
        }

        let claims = self.claims.lock();
        let claimed = claims
            .iter()
            .filter(|(txn, _)| **txn != self.txn_id)
            .flat_map(|(_, claims)| claims.iter())
            .filter(|((_, k), claim)| {
                k == key.name()
                    && claim.value == *value
                    && type_name.map_or(true, |name| claim.entity_type.ancestors().any(|a| a == name))
            })
            .map(|((node, _), _)| *node);
        holders.extend(claimed);

        holders.sort();
        holders.dedup();
        Ok(holders)
    }
}

fn find_nodes_in(
    view: &StateView<'_>,
    entity_type: Option<&EntityType>,
    properties: &PropertyMap,
) -> Vec<TypedNode> {
    view.all_nodes()
        .filter(|node| entity_type.map_or(true, |t| node.entity_type().is_subtype_of(t)))
        .filter(|node| {
            properties
                .iter()
                .all(|(k, v)| node.property(k) == Some(v))
        })
        .collect()
}

/// In-memory graph store driving the change interceptor
pub struct MemoryGraph {
    registry: Arc<MetadataRegistry>,
    state: RwLock<GraphState>,
    claims: Mutex<ClaimTable>,
    next_node_id: AtomicU64,
    next_relationship_id: AtomicU64,
}

impl MemoryGraph {
    /// Create an empty graph resolving types through `registry`
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(GraphState::default()),
            claims: Mutex::new(ClaimTable::new()),
            next_node_id: AtomicU64::new(1),
            next_relationship_id: AtomicU64::new(1),
        }
    }

    /// Registry used for typing and validation
    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// Begin a transaction dispatched under the super-user context
    pub fn begin<'g>(&'g self, interceptor: &'g ChangeInterceptor) -> MemoryTransaction<'g> {
        self.begin_with(interceptor, interceptor.begin_transaction())
    }

    /// Begin a transaction writing and dispatching under `security`
    pub fn begin_as<'g>(
        &'g self,
        interceptor: &'g ChangeInterceptor,
        security: SecurityContext,
    ) -> MemoryTransaction<'g> {
        self.begin_with(interceptor, interceptor.begin_transaction_as(security))
    }

    fn begin_with<'g>(
        &'g self,
        interceptor: &'g ChangeInterceptor,
        ctx: TransactionContext,
    ) -> MemoryTransaction<'g> {
        let claims = ClaimGuard {
            claims: &self.claims,
            txn_id: ctx.txn_id(),
        };
        MemoryTransaction {
            graph: self,
            interceptor,
            txn_id: ctx.txn_id(),
            security: ctx.security().clone(),
            ctx: Some(ctx),
            working: self.state.read().clone(),
            data: TransactionData::new(),
            claims,
        }
    }

    /// Committed node
    pub fn node(&self, id: NodeId) -> Option<TypedNode> {
        let state = self.state.read();
        let view = StateView {
            registry: &self.registry,
            state: &state,
        };
        state.nodes.get(&id).and_then(|props| view.typed(id, props))
    }

    /// Committed relationship
    pub fn relationship(&self, id: RelationshipId) -> Option<RelationshipRecord> {
        self.state.read().relationships.get(&id).cloned()
    }

    /// Committed relationships with `node` as an endpoint
    pub fn relationships_of(&self, node: NodeId) -> Vec<RelationshipRecord> {
        self.state
            .read()
            .relationships
            .values()
            .filter(|r| r.start == node || r.end == node)
            .cloned()
            .collect()
    }

    /// Number of committed nodes
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Number of committed relationships
    pub fn relationship_count(&self) -> usize {
        self.state.read().relationships.len()
    }

    /// Apply the changes of a dispatched commit
    ///
    /// Property writes are applied one by one onto the current committed
    /// state; new nodes and relationships are copied from `working`.
    fn apply(&self, working: &GraphState, data: &TransactionData) -> StrataResult<()> {
        let mut state = self.state.write();
        check_conflicts(&state, data)?;

        for id in data.created_nodes() {
            if let Some(props) = working.nodes.get(id) {
                state.nodes.insert(*id, props.clone());
            }
        }
        for entry in data.assigned_properties().chain(data.removed_properties()) {
            if data.is_created(entry.entity) || data.is_deleted(entry.entity) {
                continue;
            }
            if let Some(props) = state.nodes.get_mut(&entry.entity) {
                match &entry.value {
                    Some(value) => {
                        props.insert(entry.key.name().to_string(), value.clone());
                    }
                    None => {
                        props.remove(entry.key.name());
                    }
                }
            }
        }
        for record in data.created_relationships() {
            if let Some(current) = working.relationships.get(&record.id) {
                state.relationships.insert(record.id, current.clone());
            }
        }
        for record in data.deleted_relationships() {
            state.relationships.remove(&record.id);
        }
        for id in data.deleted_nodes() {
            state.nodes.remove(id);
        }
        Ok(())
    }
}

/// Changes of `data` that no longer fit the committed `state`
fn check_conflicts(state: &GraphState, data: &TransactionData) -> StrataResult<()> {
    for entry in data.assigned_properties().chain(data.removed_properties()) {
        if data.is_created(entry.entity) {
            continue;
        }
        let Some(props) = state.nodes.get(&entry.entity) else {
            return Err(StrataError::conflict(format!(
                "node {} was deleted by another transaction",
                entry.entity
            )));
        };
        if props.get(entry.key.name()) != entry.previous.as_ref() {
            return Err(StrataError::conflict(format!(
                "{}.{} was changed by another transaction",
                entry.entity, entry.key
            )));
        }
    }

    for (id, snapshot) in data.deletion_snapshots() {
        let Some(props) = state.nodes.get(&id) else {
            return Err(StrataError::conflict(format!(
                "node {} was deleted by another transaction",
                id
            )));
        };
        let changed = props
            .iter()
            .filter(|(name, _)| name.as_str() != TYPE_PROPERTY)
            .count()
            != snapshot.len();
        if changed {
            return Err(StrataError::conflict(format!(
                "node {} was changed by another transaction",
                id
            )));
        }
    }

    let deleted: BTreeSet<RelationshipId> =
        data.deleted_relationships().iter().map(|r| r.id).collect();
    for record in data.deleted_relationships() {
        if !state.relationships.contains_key(&record.id) {
            return Err(StrataError::conflict(format!(
                "relationship {} was deleted by another transaction",
                record.id
            )));
        }
    }
    for id in data.deleted_nodes() {
        if let Some(rel) = state
            .relationships
            .values()
            .find(|r| (r.start == *id || r.end == *id) && !deleted.contains(&r.id))
        {
            return Err(StrataError::conflict(format!(
                "relationship {} to node {} was created by another transaction",
                rel.id, id
            )));
        }
    }
    for record in data.created_relationships() {
        for end in [record.start, record.end] {
            if !data.is_created(end) && !state.nodes.contains_key(&end) {
                return Err(StrataError::conflict(format!(
                    "node {} was deleted by another transaction",
                    end
                )));
            }
        }
    }
    Ok(())
}

impl NodeResolver for MemoryGraph {
    fn node_by_id(&self, id: NodeId) -> StrataResult<Option<TypedNode>> {
        Ok(self.node(id))
    }

    fn find_nodes(
        &self,
        entity_type: Option<&EntityType>,
        properties: &PropertyMap,
    ) -> StrataResult<Vec<TypedNode>> {
        let state = self.state.read();
        let view = StateView {
            registry: &self.registry,
            state: &state,
        };
        Ok(find_nodes_in(&view, entity_type, properties))
    }
}

impl std::fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("nodes", &self.node_count())
            .field("relationships", &self.relationship_count())
            .finish()
    }
}

/// One open transaction on a [`MemoryGraph`]
///
/// Dropping the transaction without committing discards its changes and
/// runs the rollback callback, like [`rollback`](Self::rollback).
pub struct MemoryTransaction<'g> {
    graph: &'g MemoryGraph,
    interceptor: &'g ChangeInterceptor,
    txn_id: TxnId,
    security: SecurityContext,
    /// Taken by the commit or rollback callback
    ctx: Option<TransactionContext>,
    working: GraphState,
    data: TransactionData,
    claims: ClaimGuard<'g>,
}

impl<'g> MemoryTransaction<'g> {
    /// Transaction identifier
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Security context writes and dispatch run under
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    /// Changes recorded so far
    pub fn data(&self) -> &TransactionData {
        &self.data
    }

    fn view(&self) -> StateView<'_> {
        StateView {
            registry: &self.graph.registry,
            state: &self.working,
        }
    }

    /// Node as seen by this transaction
    pub fn node(&self, id: NodeId) -> Option<TypedNode> {
        self.working
            .nodes
            .get(&id)
            .and_then(|props| self.view().typed(id, props))
    }

    /// Nodes of `entity_type` (or subtypes) matching every entry of
    /// `properties`, as seen by this transaction
    pub fn find_nodes(
        &self,
        entity_type: Option<&EntityType>,
        properties: &PropertyMap,
    ) -> Vec<TypedNode> {
        find_nodes_in(&self.view(), entity_type, properties)
    }

    fn require_node(&self, id: NodeId) -> StrataResult<TypedNode> {
        self.node(id)
            .ok_or_else(|| StrataError::not_found(format!("node {}", id)))
    }

    /// Create a node of `entity_type`
    ///
    /// Post-creation transformations registered for the type run before the
    /// node is stored. Every initial property goes through the same checks
    /// as [`set_property`](Self::set_property).
    pub fn create_node(
        &mut self,
        entity_type: &EntityType,
        properties: PropertyMap,
    ) -> StrataResult<TypedNode> {
        if self
            .graph
            .registry
            .entity_type_for_raw_type(entity_type.name())
            .is_none()
        {
            return Err(StrataError::invalid_input(format!(
                "type {} is not defined",
                entity_type
            )));
        }

        let id = NodeId(self.graph.next_node_id.fetch_add(1, Ordering::Relaxed));
        let mut node = TypedNode::new(id, entity_type.clone(), properties);
        for transformation in self.graph.registry.post_creation_transformations(entity_type) {
            transformation.apply(&self.security, &mut node)?;
        }

        let mut initial = node.into_properties();
        initial.remove(TYPE_PROPERTY);
        let mut stored = PropertyMap::new();
        stored.insert(TYPE_PROPERTY.to_string(), Value::from(entity_type.name()));
        self.working.nodes.insert(id, stored);
        self.data.create_node(id);

        for (name, value) in initial {
            self.write_property(id, &PropertyKey::declared_by(entity_type.name(), &name), value, true)?;
        }

        debug!(target: "stratagraph::txn", txn_id = %self.txn_id, node = %id, entity_type = %entity_type, "Node created");
        self.require_node(id)
    }

    /// Set a property; `Null` removes it
    pub fn set_property(&mut self, id: NodeId, key: &PropertyKey, value: Value) -> StrataResult<()> {
        self.write_property(id, key, value, false)
    }

    /// Remove a property
    pub fn remove_property(&mut self, id: NodeId, key: &PropertyKey) -> StrataResult<()> {
        self.write_property(id, key, Value::Null, false)
    }

    fn write_property(
        &mut self,
        id: NodeId,
        key: &PropertyKey,
        value: Value,
        creating: bool,
    ) -> StrataResult<()> {
        if key.name() == TYPE_PROPERTY {
            return Err(StrataError::invalid_input("the type property cannot be written"));
        }
        let node = self.require_node(id)?;
        let ty = node.entity_type();
        let graph = self.graph;
        let registry = &graph.registry;
        let previous = node.property(key.name()).cloned();

        if !creating {
            if registry.is_read_only_property(ty, key) {
                return Err(StrataError::invalid_input(format!(
                    "{}.{} is read-only",
                    ty, key
                )));
            }
            if registry.is_write_once_property(ty, key)
                && previous.as_ref().map_or(false, |v| !v.is_null())
            {
                return Err(StrataError::invalid_input(format!(
                    "{}.{} can only be written once",
                    ty, key
                )));
            }
        }

        let converted = registry.convert_property(ty, key, &self.security, &value)?;

        {
            let lookup = TransactionLookup {
                registry,
                committed: &graph.state,
                claims: &graph.claims,
                txn_id: self.txn_id,
                working: &self.working,
                touched: self.data.touched_nodes(),
            };
            let mut validation =
                ValidationContext::new(&self.security, &lookup, registry.uniqueness());
            registry.validate_property(&mut validation, &node, key, &converted)?;
            // a held permit means a uniqueness check passed; claim before releasing it
            if validation.held_permits() > 0 {
                self.claims.claim(id, ty, key, &converted);
            }
        }
        if converted.is_null() {
            self.claims.release(id, Some(key));
        }

        let props = self
            .working
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StrataError::not_found(format!("node {}", id)))?;
        if converted.is_null() {
            if let Some(old) = props.remove(key.name()) {
                self.data.record_write(id, key.clone(), Some(old), None);
            }
        } else {
            props.insert(key.name().to_string(), converted.clone());
            self.data.record_write(id, key.clone(), previous, Some(converted));
        }
        Ok(())
    }

    /// Create a relationship between two existing nodes
    pub fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: &str,
        properties: PropertyMap,
    ) -> StrataResult<RelationshipId> {
        self.require_node(start)?;
        self.require_node(end)?;

        let id = RelationshipId(self.graph.next_relationship_id.fetch_add(1, Ordering::Relaxed));
        let record = RelationshipRecord {
            id,
            rel_type: rel_type.to_string(),
            start,
            end,
            properties,
        };
        self.working.relationships.insert(id, record.clone());
        self.data.create_relationship(record);
        Ok(id)
    }

    /// Delete a relationship
    pub fn delete_relationship(&mut self, id: RelationshipId) -> StrataResult<()> {
        let record = self
            .working
            .relationships
            .remove(&id)
            .ok_or_else(|| StrataError::not_found(format!("relationship {}", id)))?;
        if !self.data.discard_relationship(id) {
            self.data.delete_relationship(record);
        }
        Ok(())
    }

    /// Delete a node together with its relationships
    ///
    /// Every property except the type is recorded as removed with its last
    /// committed value, which becomes the node's deletion snapshot. A node
    /// created in this transaction is forgotten instead: listeners see
    /// neither its creation nor its deletion.
    pub fn delete_node(&mut self, id: NodeId) -> StrataResult<()> {
        let attached: Vec<RelationshipId> = self
            .working
            .relationships
            .values()
            .filter(|r| r.start == id || r.end == id)
            .map(|r| r.id)
            .collect();
        for rel in attached {
            self.delete_relationship(rel)?;
        }

        let props = self
            .working
            .nodes
            .remove(&id)
            .ok_or_else(|| StrataError::not_found(format!("node {}", id)))?;
        self.claims.release(id, None);
        if self.data.discard_node(id) {
            debug!(target: "stratagraph::txn", txn_id = %self.txn_id, node = %id, "Node created and deleted in one transaction");
            return Ok(());
        }
        for (name, value) in props {
            if name != TYPE_PROPERTY {
                self.data.record_write(id, PropertyKey::new(&name), Some(value), None);
            }
        }
        self.data.delete_node(id);
        Ok(())
    }

    /// Run the pre-commit hook and apply or discard the changes
    ///
    /// # Errors
    ///
    /// The exact failure that vetoed the commit, after the rollback
    /// callback ran. `Conflict` if another transaction committed over
    /// something this one changed; listeners then see the rollback event,
    /// after the commit event if the conflict appeared during dispatch.
    pub fn commit(mut self) -> StrataResult<CommitSummary> {
        let Some(mut ctx) = self.ctx.take() else {
            return Err(StrataError::TransactionContextMissing);
        };

        let stale = check_conflicts(&self.graph.state.read(), &self.data);
        if let Err(conflict) = stale {
            return self.abort(ctx, conflict);
        }

        let dispatched = {
            let view = StateView {
                registry: &self.graph.registry,
                state: &self.working,
            };
            self.interceptor.before_commit(&mut ctx, &self.data, &view)
        };
        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(e) => {
                self.interceptor.after_rollback(ctx)?;
                return Err(e);
            }
        };

        match outcome {
            CommitOutcome::Committed(summary) => {
                if let Err(conflict) = self.graph.apply(&self.working, &self.data) {
                    return self.abort(ctx, conflict);
                }
                self.interceptor.after_commit(ctx)?;
                Ok(summary)
            }
            CommitOutcome::RolledBack { cause, .. } => match self.interceptor.after_rollback(ctx) {
                Err(e) => Err(e),
                Ok(()) => Err(cause),
            },
        }
    }

    fn abort(&self, mut ctx: TransactionContext, conflict: StrataError) -> StrataResult<CommitSummary> {
        warn!(target: "stratagraph::txn", txn_id = %self.txn_id, error = %conflict, "Commit conflict, rolling back");
        ctx.record_failure(conflict.clone());
        self.interceptor.after_rollback(ctx)?;
        Err(conflict)
    }

    /// Discard the changes and run the rollback callback
    pub fn rollback(mut self) -> StrataResult<()> {
        match self.ctx.take() {
            Some(ctx) => self.interceptor.after_rollback(ctx),
            None => Ok(()),
        }
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            if let Err(e) = self.interceptor.after_rollback(ctx) {
                warn!(target: "stratagraph::txn", txn_id = %self.txn_id, error = %e, "Rollback of dropped transaction failed");
            }
        }
    }
}
