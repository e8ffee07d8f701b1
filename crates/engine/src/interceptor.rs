//! Transactional change interceptor
//!
//! Runs inside the store's pre-commit hook. For one pending commit it
//! rehydrates every touched node and relationship into typed objects and
//! delivers the typed events to all listeners, in this order:
//!
//! ```text
//! begin
//! graphObjectCreated      per created node
//! relationshipCreated     per created relationship
//! relationshipDeleted     per deleted relationship
//! graphObjectDeleted      per deleted node, with its last committed properties
//! propertyModified        per assignment / removal on a surviving node
//! graphObjectModified     per modified node not created in this commit
//! commit
//! ```
//!
//! Any failure (listener veto or rehydration) stops dispatch. The failure is
//! recorded in the `TransactionContext`, `before_commit` reports
//! `CommitOutcome::RolledBack`, the store discards the transaction and calls
//! `after_rollback`, which hands the recorded cause back to the caller.
//!
//! ## Lifecycle
//!
//! ```text
//! begin_transaction() -> ctx (Active)
//! before_commit(&mut ctx, data, factory)
//!     Committed(summary) -> store commits  -> after_commit(ctx)
//!     RolledBack{cause}  -> store discards -> after_rollback(ctx) = Err(cause)
//! ```
//!
//! Listener dispatch is synchronous on the committing thread; no lock is
//! held while listeners run.

use crate::change::{RelationshipRecord, TransactionData};
use crate::config::InterceptorConfig;
use crate::event::DomainEvent;
use crate::factory::EntityFactory;
use crate::listener::{GraphObjectListener, ListenerHandle, ListenerSet};
use crate::metrics::{Counters, InterceptorMetrics};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratagraph_concurrency::{TransactionContext, TransactionStatus};
use stratagraph_core::{
    NodeId, PropertyMap, RelationshipId, SecurityContext, StrataError, StrataResult, TxnId,
    TypedNode, TypedRelationship,
};
use tracing::{debug, trace, warn};

/// Result of the pre-commit hook
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Every event was delivered; the store may commit
    Committed(CommitSummary),
    /// Dispatch failed; the store must roll back
    RolledBack {
        /// Transaction that failed
        txn_id: TxnId,
        /// First failure raised during dispatch
        cause: StrataError,
    },
}

impl CommitOutcome {
    /// True for `Committed`
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// What a successful pre-commit dispatch delivered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitSummary {
    /// Transaction identifier
    pub txn_id: TxnId,
    /// Nodes created
    pub created_nodes: BTreeSet<NodeId>,
    /// Pre-existing nodes that received `graphObjectModified`
    pub modified_nodes: BTreeSet<NodeId>,
    /// Nodes deleted
    pub deleted_nodes: BTreeSet<NodeId>,
    /// Relationships created
    pub created_relationships: BTreeSet<RelationshipId>,
    /// Relationships deleted
    pub deleted_relationships: BTreeSet<RelationshipId>,
    /// Events delivered
    pub events_dispatched: u64,
}

/// Pre-commit hook turning store change sets into typed listener events
pub struct ChangeInterceptor {
    listeners: ListenerSet,
    config: InterceptorConfig,
    next_txn_id: AtomicU64,
    counters: Counters,
}

impl ChangeInterceptor {
    /// Create an interceptor with the given configuration
    pub fn new(config: InterceptorConfig) -> Self {
        Self {
            listeners: ListenerSet::new(),
            config,
            next_txn_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Add a listener; returns the handle used to remove it
    pub fn register_listener(&self, listener: Arc<dyn GraphObjectListener>) -> ListenerHandle {
        let handle = self.listeners.register(listener);
        debug!(target: "stratagraph::txn", %handle, "Listener registered");
        handle
    }

    /// Remove a listener; false if the handle is unknown
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.unregister(handle);
        debug!(target: "stratagraph::txn", %handle, removed, "Listener unregistered");
        removed
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Start a transaction dispatched under the super-user context
    pub fn begin_transaction(&self) -> TransactionContext {
        self.begin_transaction_as(SecurityContext::super_user())
    }

    /// Start a transaction dispatched under `security`
    pub fn begin_transaction_as(&self, security: SecurityContext) -> TransactionContext {
        let txn_id = TxnId(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        self.counters.record_begin();
        debug!(target: "stratagraph::txn", %txn_id, %security, "Transaction started");
        TransactionContext::new(txn_id, security)
    }

    /// Pre-commit hook
    ///
    /// Dispatches every event of `data` and reports whether the store may
    /// commit. Listener and rehydration failures are not returned as `Err`:
    /// they are recorded in `ctx` and reported as `RolledBack`.
    ///
    /// # Errors
    ///
    /// `InvalidTransactionState` if `ctx` is not active. Nothing is
    /// dispatched in that case.
    pub fn before_commit(
        &self,
        ctx: &mut TransactionContext,
        data: &TransactionData,
        factory: &dyn EntityFactory,
    ) -> StrataResult<CommitOutcome> {
        ctx.ensure_status(TransactionStatus::Active)?;

        let mut summary = CommitSummary {
            txn_id: ctx.txn_id(),
            ..CommitSummary::default()
        };
        match self.dispatch_commit(ctx, data, factory, &mut summary) {
            Ok(()) => {
                ctx.mark_prepared()?;
                debug!(
                    target: "stratagraph::txn",
                    txn_id = %ctx.txn_id(),
                    events = summary.events_dispatched,
                    "Commit dispatched"
                );
                Ok(CommitOutcome::Committed(summary))
            }
            Err(cause) => {
                warn!(target: "stratagraph::txn", txn_id = %ctx.txn_id(), error = %cause, "Commit vetoed, rolling back");
                ctx.record_failure(cause.clone());
                Ok(CommitOutcome::RolledBack {
                    txn_id: ctx.txn_id(),
                    cause,
                })
            }
        }
    }

    /// Commit callback; consumes the context
    pub fn after_commit(&self, mut ctx: TransactionContext) -> StrataResult<()> {
        ctx.mark_committed()?;
        self.counters.record_commit();
        debug!(target: "stratagraph::txn", txn_id = %ctx.txn_id(), elapsed = ?ctx.elapsed(), "Transaction committed");
        Ok(())
    }

    /// Rollback callback; consumes the context
    ///
    /// Delivers the rollback event (if configured), then returns the failure
    /// recorded by `before_commit`. A rollback the store initiated on its
    /// own has no recorded failure and returns `Ok`. Listener errors during
    /// rollback are logged, never returned.
    pub fn after_rollback(&self, mut ctx: TransactionContext) -> StrataResult<()> {
        let cause = ctx.mark_rolled_back()?;
        self.counters.record_rollback();

        if self.config.dispatch_rollback {
            for listener in self.listeners.snapshot() {
                if let Err(e) = listener.handle(ctx.security(), ctx.txn_id(), &DomainEvent::Rollback)
                {
                    warn!(target: "stratagraph::txn", txn_id = %ctx.txn_id(), error = %e, "Listener failed during rollback");
                }
            }
            self.counters.record_event();
        }

        match cause {
            Some(cause) => {
                warn!(target: "stratagraph::txn", txn_id = %ctx.txn_id(), error = %cause, "Transaction rolled back");
                Err(cause)
            }
            None => {
                debug!(target: "stratagraph::txn", txn_id = %ctx.txn_id(), "Transaction rolled back by store");
                Ok(())
            }
        }
    }

    /// Deliver a `Visited` event for nodes read by a traversal
    ///
    /// Runs outside the commit path: a listener failure is returned to the
    /// caller and nothing is rolled back.
    pub fn notify_visited(
        &self,
        security: &SecurityContext,
        txn_id: TxnId,
        nodes: &[TypedNode],
    ) -> StrataResult<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        for listener in self.listeners.snapshot() {
            listener.handle(security, txn_id, &DomainEvent::Visited(nodes))?;
        }
        self.counters.record_event();
        Ok(())
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> InterceptorMetrics {
        self.counters.snapshot()
    }

    fn dispatch_commit(
        &self,
        ctx: &TransactionContext,
        data: &TransactionData,
        factory: &dyn EntityFactory,
        summary: &mut CommitSummary,
    ) -> StrataResult<()> {
        let listeners = self.listeners.snapshot();
        let listeners = listeners.as_slice();

        self.dispatch(listeners, ctx, &DomainEvent::Begin, summary)?;

        // snapshots first: a deleted node's type cannot be re-derived later
        let removed = data.deletion_snapshots();

        for id in data.created_nodes() {
            if let Some(node) = self.rehydrate_node(factory, *id)? {
                self.dispatch(listeners, ctx, &DomainEvent::GraphObjectCreated(&node), summary)?;
                summary.created_nodes.insert(*id);
            }
        }

        for record in data.created_relationships() {
            if let Some(rel) = self.rehydrate_relationship(factory, record)? {
                self.dispatch(listeners, ctx, &DomainEvent::RelationshipCreated(&rel), summary)?;
                summary.created_relationships.insert(record.id);
            }
        }
        for record in data.deleted_relationships() {
            if let Some(rel) = self.rehydrate_relationship(factory, record)? {
                self.dispatch(listeners, ctx, &DomainEvent::RelationshipDeleted(&rel), summary)?;
                summary.deleted_relationships.insert(record.id);
            }
        }

        let empty = PropertyMap::new();
        for id in data.deleted_nodes() {
            let snapshot = removed.get(id).unwrap_or(&empty);
            self.dispatch(
                listeners,
                ctx,
                &DomainEvent::GraphObjectDeleted {
                    id: *id,
                    removed: snapshot,
                },
                summary,
            )?;
            summary.deleted_nodes.insert(*id);
        }

        // one rehydration per node, in first-touched order
        let mut touched: BTreeMap<NodeId, Option<TypedNode>> = BTreeMap::new();
        let mut modified: Vec<NodeId> = Vec::new();
        let mut modified_index: BTreeSet<NodeId> = BTreeSet::new();
        let changes = data
            .assigned_properties()
            .chain(data.removed_properties())
            .filter(|entry| !data.is_deleted(entry.entity));
        for entry in changes {
            if !touched.contains_key(&entry.entity) {
                let node = self.rehydrate_node(factory, entry.entity)?;
                touched.insert(entry.entity, node);
            }
            let Some(Some(node)) = touched.get(&entry.entity) else {
                continue;
            };
            self.dispatch(
                listeners,
                ctx,
                &DomainEvent::PropertyModified {
                    entity: node,
                    key: &entry.key,
                    old: entry.previous.as_ref(),
                    new: entry.value.as_ref(),
                },
                summary,
            )?;
            if modified_index.insert(entry.entity) {
                modified.push(entry.entity);
            }
        }

        for id in modified {
            if data.is_created(id) {
                continue;
            }
            if let Some(Some(node)) = touched.get(&id) {
                self.dispatch(listeners, ctx, &DomainEvent::GraphObjectModified(node), summary)?;
                summary.modified_nodes.insert(id);
            }
        }

        self.dispatch(listeners, ctx, &DomainEvent::Commit, summary)
    }

    fn dispatch(
        &self,
        listeners: &[Arc<dyn GraphObjectListener>],
        ctx: &TransactionContext,
        event: &DomainEvent<'_>,
        summary: &mut CommitSummary,
    ) -> StrataResult<()> {
        if self.config.trace_events {
            trace!(target: "stratagraph::txn", txn_id = %ctx.txn_id(), event = %event.kind(), "Dispatch");
        }
        for listener in listeners {
            listener.handle(ctx.security(), ctx.txn_id(), event)?;
        }
        summary.events_dispatched += 1;
        self.counters.record_event();
        Ok(())
    }

    fn rehydrate_node(
        &self,
        factory: &dyn EntityFactory,
        id: NodeId,
    ) -> StrataResult<Option<TypedNode>> {
        match factory.instantiate_node(id)? {
            Some(node) => Ok(Some(node)),
            None if self.config.strict_rehydration => Err(StrataError::Rehydration(format!(
                "node {} could not be instantiated",
                id
            ))),
            None => {
                warn!(target: "stratagraph::txn", node = %id, "Node could not be instantiated, skipped");
                Ok(None)
            }
        }
    }

    fn rehydrate_relationship(
        &self,
        factory: &dyn EntityFactory,
        record: &RelationshipRecord,
    ) -> StrataResult<Option<TypedRelationship>> {
        match factory.instantiate_relationship(record)? {
            Some(rel) => Ok(Some(rel)),
            None if self.config.strict_rehydration => Err(StrataError::Rehydration(format!(
                "relationship {} could not be instantiated",
                record.id
            ))),
            None => {
                warn!(target: "stratagraph::txn", relationship = %record.id, "Relationship could not be instantiated, skipped");
                Ok(None)
            }
        }
    }
}

impl Default for ChangeInterceptor {
    fn default() -> Self {
        Self::new(InterceptorConfig::default())
    }
}

impl std::fmt::Debug for ChangeInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeInterceptor")
            .field("listeners", &self.listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use parking_lot::Mutex;
    use stratagraph_core::{EntityType, PropertyKey, Value};

    #[derive(Default)]
    struct StubFactory {
        nodes: BTreeMap<NodeId, TypedNode>,
    }

    impl StubFactory {
        fn with(mut self, id: u64, props: &[(&str, Value)]) -> Self {
            let props = props
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            self.nodes.insert(
                NodeId(id),
                TypedNode::new(NodeId(id), EntityType::root("Person"), props),
            );
            self
        }
    }

    impl EntityFactory for StubFactory {
        fn instantiate_node(&self, id: NodeId) -> StrataResult<Option<TypedNode>> {
            Ok(self.nodes.get(&id).cloned())
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

    fn recorder(interceptor: &ChangeInterceptor) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        interceptor.register_listener(Arc::new(
            move |_: &SecurityContext, _: TxnId, event: &DomainEvent<'_>| -> StrataResult<()> {
                sink.lock().push(event.kind());
                Ok(())
            },
        ));
        seen
    }

    #[test]
    fn test_created_node_gets_no_modified_event() {
        let interceptor = ChangeInterceptor::default();
        let seen = recorder(&interceptor);
        let factory = StubFactory::default().with(1, &[("name", Value::from("bob"))]);

        let mut data = TransactionData::new();
        data.create_node(NodeId(1));
        data.assign_property(NodeId(1), PropertyKey::new("name"), None, Value::from("bob"));

        let mut ctx = interceptor.begin_transaction();
        let outcome = interceptor.before_commit(&mut ctx, &data, &factory).unwrap();
        assert!(outcome.is_committed());
        interceptor.after_commit(ctx).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::Begin,
                EventKind::GraphObjectCreated,
                EventKind::PropertyModified,
                EventKind::Commit
            ]
        );
    }

    #[test]
    fn test_existing_node_modified_once() {
        let interceptor = ChangeInterceptor::default();
        let seen = recorder(&interceptor);
        let factory = StubFactory::default().with(7, &[("a", Value::Int(2))]);

        let mut data = TransactionData::new();
        data.assign_property(NodeId(7), PropertyKey::new("a"), Some(Value::Int(1)), Value::Int(2));
        data.remove_property(NodeId(7), PropertyKey::new("b"), Value::Int(9));

        let mut ctx = interceptor.begin_transaction();
        let outcome = interceptor.before_commit(&mut ctx, &data, &factory).unwrap();
        let CommitOutcome::Committed(summary) = outcome else {
            panic!("expected commit");
        };

        assert_eq!(summary.modified_nodes.len(), 1);
        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::Begin,
                EventKind::PropertyModified,
                EventKind::PropertyModified,
                EventKind::GraphObjectModified,
                EventKind::Commit
            ]
        );
    }

    #[test]
    fn test_veto_rolls_back_with_cause() {
        let interceptor = ChangeInterceptor::default();
        let seen = recorder(&interceptor);
        interceptor.register_listener(Arc::new(
            |_: &SecurityContext, _: TxnId, event: &DomainEvent<'_>| -> StrataResult<()> {
                match event {
                    DomainEvent::GraphObjectCreated(_) => Err(StrataError::vetoed("no new nodes")),
                    _ => Ok(()),
                }
            },
        ));
        let factory = StubFactory::default().with(1, &[]);
        let mut data = TransactionData::new();
        data.create_node(NodeId(1));

        let mut ctx = interceptor.begin_transaction();
        let outcome = interceptor.before_commit(&mut ctx, &data, &factory).unwrap();
        assert!(!outcome.is_committed());
        assert_eq!(ctx.status(), &TransactionStatus::Failed);

        let err = interceptor.after_rollback(ctx).unwrap_err();
        assert_eq!(err, StrataError::vetoed("no new nodes"));
        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::Begin,
                EventKind::GraphObjectCreated,
                EventKind::Rollback
            ]
        );

        let m = interceptor.metrics();
        assert_eq!(m.total_rolled_back, 1);
        assert_eq!(m.active_count, 0);
    }

    #[test]
    fn test_inactive_context_dispatches_nothing() {
        let interceptor = ChangeInterceptor::default();
        let seen = recorder(&interceptor);
        let factory = StubFactory::default();
        let data = TransactionData::new();

        let mut ctx = interceptor.begin_transaction();
        interceptor.before_commit(&mut ctx, &data, &factory).unwrap();

        let err = interceptor.before_commit(&mut ctx, &data, &factory).unwrap_err();
        assert!(matches!(err, StrataError::InvalidTransactionState { .. }));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_strict_rehydration_vetoes() {
        let interceptor = ChangeInterceptor::default();
        let mut data = TransactionData::new();
        data.create_node(NodeId(5));

        let mut ctx = interceptor.begin_transaction();
        let outcome = interceptor
            .before_commit(&mut ctx, &data, &StubFactory::default())
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::RolledBack {
                cause: StrataError::Rehydration(_),
                ..
            }
        ));
    }

    #[test]
    fn test_lenient_rehydration_skips() {
        let interceptor = ChangeInterceptor::new(InterceptorConfig {
            strict_rehydration: false,
            ..InterceptorConfig::default()
        });
        let seen = recorder(&interceptor);
        let mut data = TransactionData::new();
        data.create_node(NodeId(5));
        data.assign_property(NodeId(5), PropertyKey::new("x"), None, Value::Int(1));

        let mut ctx = interceptor.begin_transaction();
        let outcome = interceptor
            .before_commit(&mut ctx, &data, &StubFactory::default())
            .unwrap();
        let CommitOutcome::Committed(summary) = outcome else {
            panic!("expected commit");
        };
        assert!(summary.created_nodes.is_empty());
        assert_eq!(*seen.lock(), vec![EventKind::Begin, EventKind::Commit]);
    }

    #[test]
    fn test_deleted_node_carries_snapshot() {
        let interceptor = ChangeInterceptor::default();
        let removed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&removed);
        interceptor.register_listener(Arc::new(
            move |_: &SecurityContext, _: TxnId, event: &DomainEvent<'_>| -> StrataResult<()> {
                if let DomainEvent::GraphObjectDeleted { removed, .. } = event {
                    *sink.lock() = Some((*removed).clone());
                }
                Ok(())
            },
        ));

        let mut data = TransactionData::new();
        data.remove_property(NodeId(3), PropertyKey::new("status"), Value::from("active"));
        data.delete_node(NodeId(3));

        let mut ctx = interceptor.begin_transaction();
        let outcome = interceptor
            .before_commit(&mut ctx, &data, &StubFactory::default())
            .unwrap();
        assert!(outcome.is_committed());

        let snapshot = removed.lock().clone().unwrap();
        assert_eq!(snapshot.get("status"), Some(&Value::from("active")));
    }

    #[test]
    fn test_store_initiated_rollback_is_ok() {
        let interceptor = ChangeInterceptor::new(InterceptorConfig {
            dispatch_rollback: false,
            ..InterceptorConfig::default()
        });
        let seen = recorder(&interceptor);
        let ctx = interceptor.begin_transaction();
        interceptor.after_rollback(ctx).unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unregistered_listener_not_called() {
        let interceptor = ChangeInterceptor::default();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let handle = interceptor.register_listener(Arc::new(
            move |_: &SecurityContext, _: TxnId, _: &DomainEvent<'_>| -> StrataResult<()> {
                *sink.lock() += 1;
                Ok(())
            },
        ));
        assert!(interceptor.unregister_listener(handle));
        assert_eq!(interceptor.listener_count(), 0);

        let mut ctx = interceptor.begin_transaction();
        interceptor
            .before_commit(&mut ctx, &TransactionData::new(), &StubFactory::default())
            .unwrap();
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn test_visited_failure_is_returned() {
        let interceptor = ChangeInterceptor::default();
        interceptor.register_listener(Arc::new(
            |_: &SecurityContext, _: TxnId, event: &DomainEvent<'_>| -> StrataResult<()> {
                match event {
                    DomainEvent::Visited(nodes) if nodes.len() > 1 => {
                        Err(StrataError::vetoed("too many"))
                    }
                    _ => Ok(()),
                }
            },
        ));
        let node = TypedNode::new(NodeId(1), EntityType::root("Person"), PropertyMap::new());
        let security = SecurityContext::super_user();

        assert!(interceptor
            .notify_visited(&security, TxnId(1), std::slice::from_ref(&node))
            .is_ok());
        assert!(interceptor
            .notify_visited(&security, TxnId(1), &[node.clone(), node])
            .is_err());
    }

    #[test]
    fn test_txn_ids_increase() {
        let interceptor = ChangeInterceptor::default();
        let a = interceptor.begin_transaction();
        let b = interceptor.begin_transaction();
        assert!(b.txn_id() > a.txn_id());
        assert_eq!(interceptor.metrics().active_count, 2);
    }
}
