//! Uniqueness coordinator
//!
//! Binary semaphores serializing writes that must be unique per
//! (scope, property). A lock is created lazily the first time a uniqueness
//! validator is registered for its key and lives for the rest of the
//! process.
//!
//! ## Lookup order
//!
//! ```text
//! 1. (Type(type_name), key)  - TypeAndPropertyUniqueness
//! 2. (Global, key)           - GlobalUniqueness
//! 3. none                    - no constraint registered
//! ```
//!
//! Callers acquire before the check-and-write and hold the returned
//! [`UniquenessPermit`] until the write is done. Dropping the permit releases
//! the lock, so every exit path (including a failed validation) releases.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Scope name under which global uniqueness locks are reported
pub const GLOBAL_UNIQUENESS: &str = "global_uniqueness_key";

/// Scope of a uniqueness constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniquenessScope {
    /// Unique among nodes of one type (keyed by the type's simple name)
    Type(String),
    /// Unique across all types
    Global,
}

impl fmt::Display for UniquenessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniquenessScope::Type(name) => write!(f, "{}", name),
            UniquenessScope::Global => write!(f, "{}", GLOBAL_UNIQUENESS),
        }
    }
}

/// Binary semaphore for one (scope, property) pair
pub struct UniquenessLock {
    scope: UniquenessScope,
    key: String,
    held: Mutex<bool>,
    released: Condvar,
}

impl UniquenessLock {
    fn new(scope: UniquenessScope, key: String) -> Self {
        Self {
            scope,
            key,
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Scope of this lock
    pub fn scope(&self) -> &UniquenessScope {
        &self.scope
    }

    /// Property name guarded by this lock
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True while some caller holds the permit
    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }

    /// Block until the single permit is available and take it
    pub fn acquire(self: &Arc<Self>) -> UniquenessPermit {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
        trace!(target: "stratagraph::uniqueness", scope = %self.scope, key = %self.key, "Permit acquired");
        UniquenessPermit {
            lock: Arc::clone(self),
        }
    }

    /// Take the permit if it is free right now
    pub fn try_acquire(self: &Arc<Self>) -> Option<UniquenessPermit> {
        let mut held = self.held.lock();
        if *held {
            return None;
        }
        *held = true;
        Some(UniquenessPermit {
            lock: Arc::clone(self),
        })
    }

    /// Wait at most `timeout` for the permit
    pub fn try_acquire_for(self: &Arc<Self>, timeout: Duration) -> Option<UniquenessPermit> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while *held {
            if self.released.wait_until(&mut held, deadline).timed_out() && *held {
                return None;
            }
        }
        *held = true;
        Some(UniquenessPermit {
            lock: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut held = self.held.lock();
        *held = false;
        drop(held);
        self.released.notify_one();
        trace!(target: "stratagraph::uniqueness", scope = %self.scope, key = %self.key, "Permit released");
    }
}

impl fmt::Debug for UniquenessLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquenessLock")
            .field("scope", &self.scope)
            .field("key", &self.key)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Held permit of a [`UniquenessLock`]; released on drop
#[must_use = "the lock is released as soon as the permit is dropped"]
pub struct UniquenessPermit {
    lock: Arc<UniquenessLock>,
}

impl UniquenessPermit {
    /// Scope of the held lock
    pub fn scope(&self) -> &UniquenessScope {
        self.lock.scope()
    }

    /// Property name of the held lock
    pub fn key(&self) -> &str {
        self.lock.key()
    }
}

impl Drop for UniquenessPermit {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl fmt::Debug for UniquenessPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquenessPermit")
            .field("scope", self.scope())
            .field("key", &self.key())
            .finish()
    }
}

/// Registry of uniqueness locks
///
/// Creation goes through `DashMap::entry`, so two threads registering the
/// same key concurrently end up sharing one lock.
#[derive(Default)]
pub struct UniquenessCoordinator {
    locks: DashMap<(UniquenessScope, String), Arc<UniquenessLock>>,
}

impl UniquenessCoordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the lock for (scope, key), creating it on first use
    pub fn register(&self, scope: UniquenessScope, key: &str) -> Arc<UniquenessLock> {
        let entry = self
            .locks
            .entry((scope.clone(), key.to_string()))
            .or_insert_with(|| {
                debug!(target: "stratagraph::uniqueness", scope = %scope, key = %key, "Uniqueness lock created");
                Arc::new(UniquenessLock::new(scope.clone(), key.to_string()))
            });
        Arc::clone(entry.value())
    }

    /// Lock registered for exactly (scope, key)
    pub fn get(&self, scope: &UniquenessScope, key: &str) -> Option<Arc<UniquenessLock>> {
        self.locks
            .get(&(scope.clone(), key.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Lock guarding `key` for nodes of `type_name`
    ///
    /// Tries the type scope first, then the global scope. `None` means no
    /// uniqueness constraint is registered and the caller proceeds unlocked.
    pub fn lookup(&self, type_name: &str, key: &str) -> Option<Arc<UniquenessLock>> {
        self.get(&UniquenessScope::Type(type_name.to_string()), key)
            .or_else(|| self.get(&UniquenessScope::Global, key))
    }

    /// Look up and block on the lock for (type_name, key)
    pub fn acquire(&self, type_name: &str, key: &str) -> Option<UniquenessPermit> {
        self.lookup(type_name, key).map(|lock| lock.acquire())
    }

    /// Number of registered locks
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no lock has been registered
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl fmt::Debug for UniquenessCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquenessCoordinator")
            .field("locks", &self.locks.len())
            .finish()
    }
}
