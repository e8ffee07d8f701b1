//! Change interception for stratagraph
//!
//! This crate sits between a graph store and application listeners:
//! - TransactionData: the raw change set of one pending commit
//! - ChangeInterceptor: pre-commit hook that rehydrates touched entities and
//!   dispatches typed domain events, turning a listener failure into a rollback
//! - Listener registration and interceptor configuration
//! - MemoryGraph: an in-memory store adapter driving the interceptor
//!
//! The interceptor only knows the store through `EntityFactory`; any store
//! that can report its change set and rehydrate a node by id can host it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod config;
pub mod event;
pub mod factory;
pub mod interceptor;
pub mod listener;
pub mod memory;
pub mod metrics;

pub use change::{PropertyEntry, RelationshipRecord, TransactionData};
pub use config::{InterceptorConfig, CONFIG_FILE_NAME};
pub use event::{DomainEvent, EventKind};
pub use factory::EntityFactory;
pub use interceptor::{ChangeInterceptor, CommitOutcome, CommitSummary};
pub use listener::{GraphObjectListener, ListenerHandle, ListenerSet};
pub use memory::{MemoryGraph, MemoryTransaction};
pub use metrics::InterceptorMetrics;
