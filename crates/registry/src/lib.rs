//! Metadata registry for stratagraph
//!
//! This crate holds the per-type configuration consulted by the mapping core:
//! - RegistryBuilder / MetadataRegistry: two-phase registry (load, then read)
//! - RelationDefinition: (source type, property) -> target, direction, cardinality
//! - Notion: paired encode/decode strategies and their adapters
//! - ValidatorKind / PropertyValidator: property validation, incl. uniqueness
//! - ConverterKind / PropertyConverter: API <-> store value conversion
//! - PropertyGroup, Transformation: composite properties, post-creation hooks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod converter;
pub mod group;
pub mod notion;
pub mod registry;
pub mod relation;
pub mod transformation;
pub mod validator;
pub mod view;

pub use converter::{ConverterFactory, ConverterKind, PropertyConverter};
pub use group::{GroupedProperties, PropertyGroup};
pub use notion::{
    convert_list, Adapter, CollectionConverter, CollectionGetterAdapter, CollectionSetterAdapter,
    DeserializationStrategy, EntityConverter, GetterAdapter, NodeResolver, Notion, SerializationStrategy,
    SetterAdapter,
};
pub use registry::{MetadataRegistry, RegistryBuilder};
pub use relation::{Cardinality, Direction, RelationDefinition};
pub use transformation::Transformation;
pub use validator::{
    PropertyValidator, UniquenessLookup, ValidationContext, ValidatorFactory, ValidatorKind,
};
pub use view::PropertyView;
