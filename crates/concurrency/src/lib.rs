//! Concurrency layer for stratagraph
//!
//! This crate provides the two pieces of shared or per-commit state the
//! mapping core needs:
//! - UniquenessCoordinator: lazily created binary semaphores per
//!   (scope, property) that serialize unique check-and-write sequences
//! - TransactionContext: explicit per-commit state (id, security context,
//!   captured failure) threaded through the commit path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod transaction;
pub mod uniqueness;

pub use transaction::{TransactionContext, TransactionStatus};
pub use uniqueness::{
    UniquenessCoordinator, UniquenessLock, UniquenessPermit, UniquenessScope, GLOBAL_UNIQUENESS,
};
