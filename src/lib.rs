//! stratagraph - typed entity mapping and transactional change notification
//! for graph stores
//!
//! Entity types, relations, views, validators and converters are declared
//! once on a [`RegistryBuilder`] and frozen into a [`MetadataRegistry`]. A
//! store hosts a [`ChangeInterceptor`] in its pre-commit hook: every pending
//! commit is rehydrated into typed objects and delivered to listeners as
//! [`DomainEvent`]s, and a listener failure rolls the commit back.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratagraph::{ChangeInterceptor, EntityType, MemoryGraph, PropertyMap, RegistryBuilder};
//!
//! let person = EntityType::derive("Person", &EntityType::root("AbstractNode"));
//! let mut builder = RegistryBuilder::new();
//! builder.define_type(&person);
//!
//! let graph = MemoryGraph::new(Arc::new(builder.build()));
//! let interceptor = ChangeInterceptor::default();
//!
//! let mut tx = graph.begin(&interceptor);
//! tx.create_node(&person, PropertyMap::new())?;
//! tx.commit()?;
//! ```

pub use stratagraph_concurrency::{
    TransactionContext, TransactionStatus, UniquenessCoordinator, UniquenessLock, UniquenessPermit,
    UniquenessScope,
};
pub use stratagraph_core::*;
pub use stratagraph_engine::*;
pub use stratagraph_registry::*;
