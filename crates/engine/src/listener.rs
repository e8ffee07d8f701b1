//! Listener registration
//!
//! Listeners may register and unregister at any time. Dispatch works on a
//! snapshot taken when a commit starts, so a listener added mid-commit may
//! miss the remaining events of that commit.

use crate::event::DomainEvent;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratagraph_core::{SecurityContext, StrataResult, TxnId};

/// Receiver of typed domain events
///
/// Returning an error from any commit-path event vetoes the commit.
pub trait GraphObjectListener: Send + Sync {
    /// Handle one event of transaction `txn_id`
    fn handle(
        &self,
        security: &SecurityContext,
        txn_id: TxnId,
        event: &DomainEvent<'_>,
    ) -> StrataResult<()>;
}

impl<F> GraphObjectListener for F
where
    F: Fn(&SecurityContext, TxnId, &DomainEvent<'_>) -> StrataResult<()> + Send + Sync,
{
    fn handle(
        &self,
        security: &SecurityContext,
        txn_id: TxnId,
        event: &DomainEvent<'_>,
    ) -> StrataResult<()> {
        self(security, txn_id, event)
    }
}

/// Token returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Registered listeners in registration order
#[derive(Default)]
pub struct ListenerSet {
    next_handle: AtomicU64,
    listeners: RwLock<Vec<(ListenerHandle, Arc<dyn GraphObjectListener>)>>,
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener at the end of the dispatch order
    pub fn register(&self, listener: Arc<dyn GraphObjectListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((handle, listener));
        handle
    }

    /// Remove a listener; false if the handle is unknown
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Current listeners in registration order
    pub fn snapshot(&self) -> Vec<Arc<dyn GraphObjectListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
