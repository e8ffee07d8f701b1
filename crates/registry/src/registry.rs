//! Metadata registry
//!
//! Per-type configuration for the mapping core: property views, validators,
//! converters, read-only and write-once sets, searchable sets, relations,
//! property groups and post-creation transformations.
//!
//! ## Two-phase startup
//!
//! ```text
//! RegistryBuilder   (mutable, single-threaded type loading)
//!       | build()
//!       v
//! MetadataRegistry  (immutable, shared via Arc, lock-free reads)
//! ```
//!
//! Every map is keyed by the normalized (lowercase) type name. Lookups that
//! honor inheritance walk the entity type's explicit ancestor chain, exact
//! type first, and stop at the first type that defines the key. A missing
//! entry is an explicit `None`, never an error.

use crate::converter::{
    BooleanConverter, ConverterFactory, ConverterKind, IntegerConverter, LowercaseConverter,
    PropertyConverter,
};
use crate::group::PropertyGroup;
use crate::notion::Notion;
use crate::relation::{Cardinality, Direction, RelationDefinition};
use crate::transformation::Transformation;
use crate::validator::{
    MatchesAnyValidator, NotEmptyValidator, PropertyValidator, UniquenessValidator,
    ValidationContext, ValidatorFactory, ValidatorKind,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stratagraph_concurrency::{UniquenessCoordinator, UniquenessScope};
use stratagraph_core::{
    convert_name, normalize_type_name, EntityType, PropertyKey, SecurityContext, StrataResult,
    TypedNode, Value,
};
use tracing::{debug, warn};

/// normalized type name -> property name -> entry
type TypeMap<T> = FxHashMap<String, FxHashMap<String, T>>;

/// Registered tables, shared by the builder and the frozen registry
#[derive(Default)]
struct RegistryData {
    types: FxHashMap<String, EntityType>,
    views: TypeMap<Vec<PropertyKey>>,
    relations: BTreeMap<(String, String), RelationDefinition>,
    validators: TypeMap<ValidatorKind>,
    validation_parameters: TypeMap<Value>,
    converters: TypeMap<ConverterKind>,
    conversion_parameters: TypeMap<Value>,
    read_only: FxHashMap<String, FxHashSet<String>>,
    write_once: FxHashMap<String, FxHashSet<String>>,
    searchable: TypeMap<Vec<PropertyKey>>,
    groups: TypeMap<Arc<dyn PropertyGroup>>,
    transformations: FxHashMap<String, Vec<Arc<dyn Transformation>>>,
    validator_factories: FxHashMap<String, ValidatorFactory>,
    converter_factories: FxHashMap<String, ConverterFactory>,
}

fn insert_entry<T>(map: &mut TypeMap<T>, ty: &EntityType, key: &str, value: T) {
    map.entry(ty.normalized_name())
        .or_default()
        .insert(key.to_string(), value);
}

/// First (ancestor name, entry) found walking `ty`'s chain, exact type first
fn find_in_chain<'a, 't, T>(
    map: &'a TypeMap<T>,
    ty: &'t EntityType,
    key: &str,
) -> Option<(&'t str, &'a T)> {
    ty.ancestors().find_map(|name| {
        map.get(&normalize_type_name(name))
            .and_then(|entries| entries.get(key))
            .map(|entry| (name, entry))
    })
}

fn flag_in_chain(map: &FxHashMap<String, FxHashSet<String>>, ty: &EntityType, key: &str) -> bool {
    ty.ancestors().any(|name| {
        map.get(&normalize_type_name(name))
            .map_or(false, |keys| keys.contains(key))
    })
}

fn push_unique(target: &mut Vec<PropertyKey>, keys: impl IntoIterator<Item = PropertyKey>) {
    for key in keys {
        if !target.contains(&key) {
            target.push(key);
        }
    }
}

/// Mutable registry used while entity types are loaded
///
/// Registration is additive and idempotent: registering the same key twice
/// overwrites the earlier mapping.
pub struct RegistryBuilder {
    data: RegistryData,
    uniqueness: Arc<UniquenessCoordinator>,
}

impl RegistryBuilder {
    /// Create an empty builder with its own uniqueness coordinator
    pub fn new() -> Self {
        Self::with_coordinator(Arc::new(UniquenessCoordinator::new()))
    }

    /// Create an empty builder registering locks in `uniqueness`
    pub fn with_coordinator(uniqueness: Arc<UniquenessCoordinator>) -> Self {
        Self {
            data: RegistryData::default(),
            uniqueness,
        }
    }

    /// Make `ty` and its ancestors resolvable by raw type name
    pub fn define_type(&mut self, ty: &EntityType) -> &mut Self {
        let mut current = Some(ty.clone());
        while let Some(t) = current {
            current = t.supertype();
            self.data.types.entry(t.normalized_name()).or_insert(t);
        }
        debug!(target: "stratagraph::registry", entity_type = %ty, "Type defined");
        self
    }

    /// Register a relation with `ManyToMany` cardinality and an object notion
    pub fn register_relation(
        &mut self,
        source: &EntityType,
        property: &str,
        target: &EntityType,
        rel_type: &str,
        direction: Direction,
    ) -> &mut Self {
        self.register_relation_with(
            source,
            property,
            target,
            rel_type,
            direction,
            Cardinality::default(),
            Notion::object(),
        )
    }

    /// Register a relation with explicit cardinality and notion
    ///
    /// The notion is bound to `target`.
    #[allow(clippy::too_many_arguments)]
    pub fn register_relation_with(
        &mut self,
        source: &EntityType,
        property: &str,
        target: &EntityType,
        rel_type: &str,
        direction: Direction,
        cardinality: Cardinality,
        notion: Notion,
    ) -> &mut Self {
        self.define_type(source);
        self.define_type(target);

        let source_name = source.normalized_name();
        let property = property.to_lowercase();
        debug!(
            target: "stratagraph::registry",
            source = %source, property = %property, target_type = %target, rel_type,
            ?direction, ?cardinality,
            "Relation registered"
        );
        let definition = RelationDefinition::new(
            source_name.clone(),
            property.clone(),
            target.normalized_name(),
            rel_type.to_string(),
            direction,
            cardinality,
            notion.bind(target),
        );
        self.data
            .relations
            .insert((source_name, property), definition);
        self
    }

    /// Add `keys` to the `view` of `ty`
    ///
    /// The view is rebuilt as: the same view of every ancestor (root first),
    /// then the keys `ty` already had, then `keys`, without duplicates. The
    /// ancestors' entries are copied, so a later registration on an ancestor
    /// does not change this type's view.
    pub fn register_property_set(
        &mut self,
        ty: &EntityType,
        view: &str,
        keys: impl IntoIterator<Item = PropertyKey>,
    ) -> &mut Self {
        let own_name = ty.normalized_name();
        let mut merged = Vec::new();

        for ancestor in ty.ancestors_root_first().take(ty.depth() - 1) {
            if let Some(inherited) = self
                .data
                .views
                .get(&normalize_type_name(ancestor))
                .and_then(|views| views.get(view))
            {
                push_unique(&mut merged, inherited.iter().cloned());
            }
        }
        let own = self
            .data
            .views
            .entry(own_name)
            .or_default()
            .entry(view.to_string())
            .or_default();
        push_unique(&mut merged, own.drain(..));
        push_unique(&mut merged, keys);

        debug!(target: "stratagraph::registry", entity_type = %ty, view, keys = merged.len(), "Property set registered");
        *own = merged;
        self
    }

    /// Remove `ty`'s entries for `view`
    pub fn clear_property_set(&mut self, ty: &EntityType, view: &str) -> &mut Self {
        if let Some(views) = self.data.views.get_mut(&ty.normalized_name()) {
            views.remove(view);
        }
        self
    }

    /// Register a validator for `key` on `ty`
    ///
    /// Uniqueness kinds create their coordinator lock here.
    pub fn register_property_validator(
        &mut self,
        ty: &EntityType,
        key: &PropertyKey,
        kind: ValidatorKind,
    ) -> &mut Self {
        if let Some(scope) = kind.uniqueness_scope(ty.name()) {
            self.uniqueness.register(scope, key.name());
        }
        debug!(target: "stratagraph::registry", entity_type = %ty, key = %key, kind = %kind, "Validator registered");
        insert_entry(&mut self.data.validators, ty, key.name(), kind);
        self
    }

    /// Register a validator together with its validation parameter
    pub fn register_property_validator_with_parameter(
        &mut self,
        ty: &EntityType,
        key: &PropertyKey,
        kind: ValidatorKind,
        parameter: Value,
    ) -> &mut Self {
        self.register_property_validator(ty, key, kind);
        insert_entry(&mut self.data.validation_parameters, ty, key.name(), parameter);
        self
    }

    /// Register a converter for `key` on `ty`
    pub fn register_property_converter(
        &mut self,
        ty: &EntityType,
        key: &PropertyKey,
        kind: ConverterKind,
    ) -> &mut Self {
        debug!(target: "stratagraph::registry", entity_type = %ty, key = %key, kind = %kind, "Converter registered");
        insert_entry(&mut self.data.converters, ty, key.name(), kind);
        self
    }

    /// Register a converter together with its conversion parameter
    pub fn register_property_converter_with_parameter(
        &mut self,
        ty: &EntityType,
        key: &PropertyKey,
        kind: ConverterKind,
        parameter: Value,
    ) -> &mut Self {
        self.register_property_converter(ty, key, kind);
        insert_entry(&mut self.data.conversion_parameters, ty, key.name(), parameter);
        self
    }

    /// Mark `key` read-only on `ty` and its subtypes
    pub fn register_read_only_property(&mut self, ty: &EntityType, key: &PropertyKey) -> &mut Self {
        self.data
            .read_only
            .entry(ty.normalized_name())
            .or_default()
            .insert(key.name().to_string());
        self
    }

    /// Mark `key` write-once on `ty` and its subtypes
    pub fn register_write_once_property(&mut self, ty: &EntityType, key: &PropertyKey) -> &mut Self {
        self.data
            .write_once
            .entry(ty.normalized_name())
            .or_default()
            .insert(key.name().to_string());
        self
    }

    /// Add `keys` to the searchable set of `ty` for `index`
    pub fn register_searchable_property_set(
        &mut self,
        ty: &EntityType,
        index: &str,
        keys: impl IntoIterator<Item = PropertyKey>,
    ) -> &mut Self {
        let set = self
            .data
            .searchable
            .entry(ty.normalized_name())
            .or_default()
            .entry(index.to_string())
            .or_default();
        push_unique(set, keys);
        self
    }

    /// Register a transformation applied to new nodes of `ty` and subtypes
    pub fn register_post_creation_transformation(
        &mut self,
        ty: &EntityType,
        transformation: Arc<dyn Transformation>,
    ) -> &mut Self {
        self.data
            .transformations
            .entry(ty.normalized_name())
            .or_default()
            .push(transformation);
        self
    }

    /// Register a property group exposed as `key` on `ty`
    pub fn register_property_group(
        &mut self,
        ty: &EntityType,
        key: &PropertyKey,
        group: Arc<dyn PropertyGroup>,
    ) -> &mut Self {
        insert_entry(&mut self.data.groups, ty, key.name(), group);
        self
    }

    /// Register the factory building `ValidatorKind::Named(name)`
    pub fn register_validator_factory(&mut self, name: &str, factory: ValidatorFactory) -> &mut Self {
        self.data
            .validator_factories
            .insert(name.to_string(), factory);
        self
    }

    /// Register the factory building `ConverterKind::Named(name)`
    pub fn register_converter_factory(&mut self, name: &str, factory: ConverterFactory) -> &mut Self {
        self.data
            .converter_factories
            .insert(name.to_string(), factory);
        self
    }

    /// Freeze the registry
    pub fn build(self) -> MetadataRegistry {
        debug!(
            target: "stratagraph::registry",
            types = self.data.types.len(),
            relations = self.data.relations.len(),
            uniqueness_locks = self.uniqueness.len(),
            "Registry built"
        );
        MetadataRegistry {
            data: self.data,
            uniqueness: self.uniqueness,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable per-type configuration, safe for concurrent readers
pub struct MetadataRegistry {
    data: RegistryData,
    uniqueness: Arc<UniquenessCoordinator>,
}

impl MetadataRegistry {
    /// Start a new registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Coordinator holding the uniqueness locks
    pub fn uniqueness(&self) -> &Arc<UniquenessCoordinator> {
        &self.uniqueness
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Entity type for a raw stored type name (case-insensitive)
    pub fn entity_type_for_raw_type(&self, raw_type: &str) -> Option<&EntityType> {
        self.data.types.get(&normalize_type_name(raw_type))
    }

    /// Number of defined types
    pub fn type_count(&self) -> usize {
        self.data.types.len()
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Relation declared for `property` on `ty` or its nearest ancestor
    pub fn relation(&self, ty: &EntityType, property: &str) -> Option<&RelationDefinition> {
        let property = property.to_lowercase();
        ty.ancestors().find_map(|name| {
            self.data
                .relations
                .get(&(normalize_type_name(name), property.clone()))
        })
    }

    /// Relation by raw source type name
    ///
    /// Falls back to an exact-name lookup when the type was never defined.
    pub fn relation_by_name(&self, source_type: &str, property: &str) -> Option<&RelationDefinition> {
        match self.entity_type_for_raw_type(source_type) {
            Some(ty) => self.relation(ty, property),
            None => self
                .data
                .relations
                .get(&(normalize_type_name(source_type), property.to_lowercase())),
        }
    }

    /// Relation from `source` to the type named `target`
    ///
    /// With `plural` set, `target` is compared against the pluralized target
    /// type name (e.g. "companies" for `Company`).
    pub fn relation_between(
        &self,
        source: &EntityType,
        target: &str,
        plural: bool,
    ) -> Option<&RelationDefinition> {
        let wanted = normalize_type_name(target);
        ty_chain(source).find_map(|name| {
            self.relations_declared_on(&name)
                .find(|def| convert_name(def.target_type(), plural) == wanted)
        })
    }

    /// All relations visible on `ty`, ordered by property name
    ///
    /// A subtype's declaration hides an ancestor's for the same property.
    pub fn relations(&self, ty: &EntityType) -> Vec<&RelationDefinition> {
        let mut visible: BTreeMap<&str, &RelationDefinition> = BTreeMap::new();
        for name in ty_chain(ty) {
            for def in self.relations_declared_on(&name) {
                visible.entry(def.property()).or_insert(def);
            }
        }
        visible.into_values().collect()
    }

    fn relations_declared_on<'a>(
        &'a self,
        normalized: &str,
    ) -> impl Iterator<Item = &'a RelationDefinition> + 'a {
        let start = (normalized.to_string(), String::new());
        let owner = normalized.to_string();
        self.data
            .relations
            .range(start..)
            .take_while(move |((source, _), _)| *source == owner)
            .map(|(_, def)| def)
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Keys of `view` on `ty`
    ///
    /// A type that never registered the view sees its nearest ancestor's.
    /// Empty if no type in the chain registered it.
    pub fn property_set(&self, ty: &EntityType, view: &str) -> &[PropertyKey] {
        find_in_chain(&self.data.views, ty, view)
            .map(|(_, keys)| keys.as_slice())
            .unwrap_or(&[])
    }

    /// View labels registered on `ty` itself, sorted
    pub fn views(&self, ty: &EntityType) -> Vec<&str> {
        let mut labels: Vec<&str> = self
            .data
            .views
            .get(&ty.normalized_name())
            .map(|views| views.keys().map(String::as_str).collect())
            .unwrap_or_default();
        labels.sort_unstable();
        labels
    }

    // ========================================================================
    // Validators
    // ========================================================================

    /// Validator kind registered for `key` on `ty` or its nearest ancestor
    pub fn property_validator_kind(&self, ty: &EntityType, key: &PropertyKey) -> Option<&ValidatorKind> {
        find_in_chain(&self.data.validators, ty, key.name()).map(|(_, kind)| kind)
    }

    /// Instantiate the validator for `key` on `ty`
    ///
    /// A kind that cannot be instantiated is logged and treated as absent.
    pub fn property_validator(
        &self,
        ty: &EntityType,
        key: &PropertyKey,
        security: &SecurityContext,
    ) -> Option<Box<dyn PropertyValidator>> {
        let (defining_type, kind) = find_in_chain(&self.data.validators, ty, key.name())?;
        match kind {
            ValidatorKind::GlobalUniqueness => {
                Some(Box::new(UniquenessValidator::new(UniquenessScope::Global)))
            }
            ValidatorKind::TypeAndPropertyUniqueness => Some(Box::new(UniquenessValidator::new(
                UniquenessScope::Type(defining_type.to_string()),
            ))),
            ValidatorKind::NotEmpty => Some(Box::new(NotEmptyValidator)),
            ValidatorKind::MatchesAny => Some(Box::new(MatchesAnyValidator)),
            ValidatorKind::Named(name) => {
                let Some(factory) = self.data.validator_factories.get(name) else {
                    warn!(target: "stratagraph::registry", validator = %name, entity_type = %ty, key = %key, "Unknown validator, ignoring");
                    return None;
                };
                match factory(security) {
                    Ok(validator) => Some(validator),
                    Err(e) => {
                        warn!(target: "stratagraph::registry", validator = %name, entity_type = %ty, key = %key, error = %e, "Unable to instantiate validator, ignoring");
                        None
                    }
                }
            }
        }
    }

    /// Validation parameter for `key` on `ty` or its nearest ancestor
    pub fn property_validation_parameter(&self, ty: &EntityType, key: &PropertyKey) -> Option<&Value> {
        find_in_chain(&self.data.validation_parameters, ty, key.name()).map(|(_, v)| v)
    }

    /// Run the validator registered for `key` against `value` on `node`
    ///
    /// Passes when no validator is registered or it cannot be instantiated.
    pub fn validate_property(
        &self,
        ctx: &mut ValidationContext<'_>,
        node: &TypedNode,
        key: &PropertyKey,
        value: &Value,
    ) -> StrataResult<()> {
        let ty = node.entity_type();
        match self.property_validator(ty, key, ctx.security()) {
            Some(validator) => {
                let parameter = self.property_validation_parameter(ty, key);
                validator.validate(ctx, node, key, value, parameter)
            }
            None => Ok(()),
        }
    }

    // ========================================================================
    // Converters
    // ========================================================================

    /// Converter kind registered for `key` on `ty` or its nearest ancestor
    pub fn property_converter_kind(&self, ty: &EntityType, key: &PropertyKey) -> Option<&ConverterKind> {
        find_in_chain(&self.data.converters, ty, key.name()).map(|(_, kind)| kind)
    }

    /// Instantiate the converter for `key` on `ty`
    ///
    /// A kind that cannot be instantiated is logged and treated as absent.
    pub fn property_converter(
        &self,
        ty: &EntityType,
        key: &PropertyKey,
        security: &SecurityContext,
    ) -> Option<Box<dyn PropertyConverter>> {
        let kind = self.property_converter_kind(ty, key)?;
        let parameter = self.property_conversion_parameter(ty, key);
        match kind {
            ConverterKind::Integer => Some(Box::new(IntegerConverter::new(parameter))),
            ConverterKind::Boolean => Some(Box::new(BooleanConverter)),
            ConverterKind::Lowercase => Some(Box::new(LowercaseConverter)),
            ConverterKind::Named(name) => {
                let Some(factory) = self.data.converter_factories.get(name) else {
                    warn!(target: "stratagraph::registry", converter = %name, entity_type = %ty, key = %key, "Unknown converter, ignoring");
                    return None;
                };
                match factory(security, parameter) {
                    Ok(converter) => Some(converter),
                    Err(e) => {
                        warn!(target: "stratagraph::registry", converter = %name, entity_type = %ty, key = %key, error = %e, "Unable to instantiate converter, ignoring");
                        None
                    }
                }
            }
        }
    }

    /// Conversion parameter for `key` on `ty` or its nearest ancestor
    pub fn property_conversion_parameter(&self, ty: &EntityType, key: &PropertyKey) -> Option<&Value> {
        find_in_chain(&self.data.conversion_parameters, ty, key.name()).map(|(_, v)| v)
    }

    /// Convert an API value for storage; unchanged if no converter applies
    pub fn convert_property(
        &self,
        ty: &EntityType,
        key: &PropertyKey,
        security: &SecurityContext,
        value: &Value,
    ) -> StrataResult<Value> {
        match self.property_converter(ty, key, security) {
            Some(converter) => converter.convert(value),
            None => Ok(value.clone()),
        }
    }

    /// Revert a stored value for the API; unchanged if no converter applies
    pub fn revert_property(
        &self,
        ty: &EntityType,
        key: &PropertyKey,
        security: &SecurityContext,
        value: &Value,
    ) -> StrataResult<Value> {
        match self.property_converter(ty, key, security) {
            Some(converter) => converter.revert(value),
            None => Ok(value.clone()),
        }
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// True if `ty` or any ancestor marked `key` read-only
    pub fn is_read_only_property(&self, ty: &EntityType, key: &PropertyKey) -> bool {
        flag_in_chain(&self.data.read_only, ty, key.name())
    }

    /// True if `ty` or any ancestor marked `key` write-once
    pub fn is_write_once_property(&self, ty: &EntityType, key: &PropertyKey) -> bool {
        flag_in_chain(&self.data.write_once, ty, key.name())
    }

    // ========================================================================
    // Search, groups, transformations
    // ========================================================================

    /// Searchable keys registered on exactly `ty` for `index`
    pub fn searchable_properties(&self, ty: &EntityType, index: &str) -> &[PropertyKey] {
        self.data
            .searchable
            .get(&ty.normalized_name())
            .and_then(|indexes| indexes.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if `key` is searchable on exactly `ty` for `index`
    pub fn is_searchable_property(&self, ty: &EntityType, index: &str, key: &PropertyKey) -> bool {
        self.searchable_properties(ty, index).contains(key)
    }

    /// Property group registered as `key` on exactly `ty`
    pub fn property_group(&self, ty: &EntityType, key: &PropertyKey) -> Option<&Arc<dyn PropertyGroup>> {
        self.data
            .groups
            .get(&ty.normalized_name())
            .and_then(|groups| groups.get(key.name()))
    }

    /// Transformations for new nodes of `ty`, exact type first
    ///
    /// The same transformation registered on several types of the chain is
    /// returned once.
    pub fn post_creation_transformations(&self, ty: &EntityType) -> Vec<Arc<dyn Transformation>> {
        let mut result: Vec<Arc<dyn Transformation>> = Vec::new();
        for name in ty_chain(ty) {
            if let Some(list) = self.data.transformations.get(&name) {
                for t in list {
                    if !result.iter().any(|seen| Arc::ptr_eq(seen, t)) {
                        result.push(Arc::clone(t));
                    }
                }
            }
        }
        result
    }
}

/// Normalized names of `ty`'s chain, exact type first
fn ty_chain(ty: &EntityType) -> impl Iterator<Item = String> + '_ {
    ty.ancestors().map(normalize_type_name)
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("types", &self.data.types.len())
            .field("relations", &self.data.relations.len())
            .field("validators", &self.data.validators.len())
            .field("converters", &self.data.converters.len())
            .field("uniqueness", &self.uniqueness)
            .finish()
    }
}
