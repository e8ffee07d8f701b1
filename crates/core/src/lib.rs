//! Core types and traits for stratagraph
//!
//! This crate defines the foundational types used throughout the system:
//! - NodeId / RelationshipId / TxnId: identities
//! - EntityType: type name with explicit ancestor chain
//! - PropertyKey: property name plus declaring type
//! - Value / PropertyMap: property values
//! - SecurityContext: caller identity and permission scope
//! - TypedNode / TypedRelationship: rehydrated graph objects
//! - StrataError: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod key;
pub mod security;
pub mod types;
pub mod value;

pub use entity::{GraphObject, TypedNode, TypedRelationship, ID_PROPERTY, TYPE_PROPERTY};
pub use error::{StrataError, StrataResult};
pub use key::PropertyKey;
pub use security::{AccessScope, SecurityContext};
pub use types::{convert_name, normalize_type_name, pluralize, EntityType, NodeId, RelationshipId, TxnId};
pub use value::{PropertyMap, Value};
