//! Notions: paired serialization/deserialization strategies
//!
//! A notion decides how a related entity is represented when it is reached
//! through a relation: as the whole object, as a single identifying
//! property, or as a subset of its properties. The same entity type can be
//! exposed differently from different source types.
//!
//! A notion produces four adapters:
//!
//! ```text
//! getter              &TypedNode      -> Value
//! setter              &Value          -> TypedNode
//! collection getter   &[TypedNode]    -> Vec<Value>
//! collection setter   Option<&[Value]> -> Vec<TypedNode>   (None -> empty)
//! ```
//!
//! Each adapter captures the `SecurityContext` it was built with and uses it
//! for every call; adapters cannot be rebound.
//!
//! A notion can also back a property: [`Notion::entity_converter`] and
//! [`Notion::collection_converter`] store node ids and expose the notion's
//! representation, and plug into the registry as `Named` converters.

use crate::converter::PropertyConverter;
use std::fmt;
use std::sync::Arc;
use stratagraph_core::{
    EntityType, GraphObject, NodeId, PropertyKey, PropertyMap, SecurityContext, StrataError,
    StrataResult, TypedNode, Value, ID_PROPERTY,
};
use tracing::warn;

/// Read access to stored nodes, used when decoding a reduced representation
pub trait NodeResolver: Send + Sync {
    /// Node with the given id
    fn node_by_id(&self, id: NodeId) -> StrataResult<Option<TypedNode>>;

    /// Nodes of `entity_type` (or any subtype; any type if `None`) whose
    /// properties contain every entry of `properties`
    fn find_nodes(
        &self,
        entity_type: Option<&EntityType>,
        properties: &PropertyMap,
    ) -> StrataResult<Vec<TypedNode>>;
}

/// Conversion of a typed node into its reduced representation
pub trait SerializationStrategy: Send + Sync {
    /// Encode `node`
    fn serialize(
        &self,
        security: &SecurityContext,
        target: Option<&EntityType>,
        node: &TypedNode,
    ) -> StrataResult<Value>;
}

/// Conversion of a reduced representation back into a stored node
pub trait DeserializationStrategy: Send + Sync {
    /// Decode `source`, resolving the node through `resolver`
    fn deserialize(
        &self,
        security: &SecurityContext,
        target: Option<&EntityType>,
        resolver: &dyn NodeResolver,
        source: &Value,
    ) -> StrataResult<TypedNode>;
}

/// Conversion from `S` to `T`
pub trait Adapter<S, T> {
    /// Convert one value
    fn adapt(&self, source: S) -> StrataResult<T>;
}

/// Paired encode/decode strategy bound to a target entity type
#[derive(Clone)]
pub struct Notion {
    serialization: Arc<dyn SerializationStrategy>,
    deserialization: Arc<dyn DeserializationStrategy>,
    primary_key: Option<PropertyKey>,
    target: Option<EntityType>,
}

impl Notion {
    /// Combine two strategies into a notion
    ///
    /// `primary_key` is the single property decoding keys on, or `None` if
    /// decoding needs the full representation.
    pub fn new(
        serialization: Arc<dyn SerializationStrategy>,
        deserialization: Arc<dyn DeserializationStrategy>,
        primary_key: Option<PropertyKey>,
    ) -> Self {
        Self {
            serialization,
            deserialization,
            primary_key,
            target: None,
        }
    }

    /// Whole object as an `Object` value, decoded by its `id` entry
    pub fn object() -> Self {
        Self::new(
            Arc::new(ObjectSerialization),
            Arc::new(IdDeserialization),
            None,
        )
    }

    /// Single property value, decoded by looking the value up
    pub fn property(key: PropertyKey) -> Self {
        Self::new(
            Arc::new(PropertySerialization { key: key.clone() }),
            Arc::new(PropertyDeserialization { key: key.clone() }),
            Some(key),
        )
    }

    /// Subset of properties as an `Object` value, decoded by matching all
    pub fn property_set(keys: Vec<PropertyKey>) -> Self {
        Self::new(
            Arc::new(PropertySetSerialization { keys: keys.clone() }),
            Arc::new(PropertySetDeserialization { keys }),
            None,
        )
    }

    /// Copy of this notion bound to `target`
    pub fn bind(&self, target: &EntityType) -> Self {
        let mut bound = self.clone();
        bound.target = Some(target.clone());
        bound
    }

    /// Entity type this notion encodes, once bound
    pub fn target(&self) -> Option<&EntityType> {
        self.target.as_ref()
    }

    /// Property key used to decode by single key, `None` if decoding needs
    /// the full representation
    pub fn primary_key(&self) -> Option<&PropertyKey> {
        self.primary_key.as_ref()
    }

    /// Single-object encoder
    pub fn getter_adapter(&self, security: &SecurityContext) -> GetterAdapter {
        GetterAdapter {
            notion: self.clone(),
            security: security.clone(),
        }
    }

    /// Single-object decoder
    pub fn setter_adapter(
        &self,
        security: &SecurityContext,
        resolver: Arc<dyn NodeResolver>,
    ) -> SetterAdapter {
        SetterAdapter {
            notion: self.clone(),
            security: security.clone(),
            resolver,
        }
    }

    /// Ordered-collection encoder
    pub fn collection_getter_adapter(&self, security: &SecurityContext) -> CollectionGetterAdapter {
        CollectionGetterAdapter {
            inner: self.getter_adapter(security),
        }
    }

    /// Ordered-collection decoder
    pub fn collection_setter_adapter(
        &self,
        security: &SecurityContext,
        resolver: Arc<dyn NodeResolver>,
    ) -> CollectionSetterAdapter {
        CollectionSetterAdapter {
            inner: self.setter_adapter(security, resolver),
        }
    }
}

impl Notion {
    /// Property converter storing the id of one related node
    ///
    /// `convert` decodes the notion representation and stores the node id;
    /// `revert` loads the node and encodes it again. `Null` passes through.
    pub fn entity_converter(
        &self,
        security: &SecurityContext,
        resolver: Arc<dyn NodeResolver>,
    ) -> EntityConverter {
        EntityConverter {
            getter: self.getter_adapter(security),
            setter: self.setter_adapter(security, resolver.clone()),
            resolver,
        }
    }

    /// Property converter storing an array of related node ids
    ///
    /// Both directions fail on the first failing element. `Null` converts
    /// to an empty array.
    pub fn collection_converter(
        &self,
        security: &SecurityContext,
        resolver: Arc<dyn NodeResolver>,
    ) -> CollectionConverter {
        CollectionConverter {
            inner: self.entity_converter(security, resolver),
        }
    }
}

impl fmt::Debug for Notion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notion")
            .field("primary_key", &self.primary_key)
            .field("target", &self.target.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

/// Single-object encoder produced by [`Notion::getter_adapter`]
pub struct GetterAdapter {
    notion: Notion,
    security: SecurityContext,
}

impl GetterAdapter {
    /// Security context captured at construction
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }
}

impl<'a> Adapter<&'a TypedNode, Value> for GetterAdapter {
    fn adapt(&self, source: &'a TypedNode) -> StrataResult<Value> {
        self.notion
            .serialization
            .serialize(&self.security, self.notion.target(), source)
    }
}

/// Single-object decoder produced by [`Notion::setter_adapter`]
pub struct SetterAdapter {
    notion: Notion,
    security: SecurityContext,
    resolver: Arc<dyn NodeResolver>,
}

impl SetterAdapter {
    /// Security context captured at construction
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }
}

impl<'a> Adapter<&'a Value, TypedNode> for SetterAdapter {
    fn adapt(&self, source: &'a Value) -> StrataResult<TypedNode> {
        self.notion.deserialization.deserialize(
            &self.security,
            self.notion.target(),
            self.resolver.as_ref(),
            source,
        )
    }
}

/// Ordered-collection encoder; fails on the first failing element
pub struct CollectionGetterAdapter {
    inner: GetterAdapter,
}

impl<'a> Adapter<&'a [TypedNode], Vec<Value>> for CollectionGetterAdapter {
    fn adapt(&self, source: &'a [TypedNode]) -> StrataResult<Vec<Value>> {
        source.iter().map(|node| self.inner.adapt(node)).collect()
    }
}

/// Ordered-collection decoder; `None` input decodes to an empty list
pub struct CollectionSetterAdapter {
    inner: SetterAdapter,
}

impl<'a> Adapter<Option<&'a [Value]>, Vec<TypedNode>> for CollectionSetterAdapter {
    fn adapt(&self, source: Option<&'a [Value]>) -> StrataResult<Vec<TypedNode>> {
        match source {
            None => Ok(Vec::new()),
            Some(values) => values.iter().map(|value| self.inner.adapt(value)).collect(),
        }
    }
}

fn id_value(id: NodeId) -> StrataResult<Value> {
    i64::try_from(id.as_u64())
        .map(Value::Int)
        .map_err(|_| StrataError::conversion(format!("{} does not fit an integer value", id)))
}

/// Converter produced by [`Notion::entity_converter`]
pub struct EntityConverter {
    getter: GetterAdapter,
    setter: SetterAdapter,
    resolver: Arc<dyn NodeResolver>,
}

impl PropertyConverter for EntityConverter {
    fn convert(&self, source: &Value) -> StrataResult<Value> {
        if source.is_null() {
            return Ok(Value::Null);
        }
        let node = self.setter.adapt(source)?;
        id_value(node.id())
    }

    fn revert(&self, source: &Value) -> StrataResult<Value> {
        let raw = match source {
            Value::Null => return Ok(Value::Null),
            Value::Int(id) if *id >= 0 => *id as u64,
            other => {
                return Err(StrataError::conversion(format!(
                    "stored reference is a {}, not a node id",
                    other.type_name()
                )))
            }
        };
        let node = self
            .resolver
            .node_by_id(NodeId(raw))?
            .ok_or_else(|| StrataError::not_found(format!("node {}", NodeId(raw))))?;
        self.getter.adapt(&node)
    }
}

/// Converter produced by [`Notion::collection_converter`]
pub struct CollectionConverter {
    inner: EntityConverter,
}

impl CollectionConverter {
    fn each(
        &self,
        source: &Value,
        f: impl Fn(&EntityConverter, &Value) -> StrataResult<Value>,
    ) -> StrataResult<Value> {
        match source {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| f(&self.inner, item))
                .collect::<StrataResult<Vec<_>>>()
                .map(Value::Array),
            other => Err(StrataError::conversion(format!(
                "expected an array of references, got {}",
                other.type_name()
            ))),
        }
    }
}

impl PropertyConverter for CollectionConverter {
    fn convert(&self, source: &Value) -> StrataResult<Value> {
        self.each(source, |inner, item| inner.convert(item))
    }

    fn revert(&self, source: &Value) -> StrataResult<Value> {
        self.each(source, |inner, item| inner.revert(item))
    }
}

/// Convert every element with `adapter`, skipping the ones that fail
///
/// A failing element is logged and dropped; the remaining results are still
/// returned in input order.
pub fn convert_list<S, T, A>(source: impl IntoIterator<Item = S>, adapter: &A) -> Vec<T>
where
    A: Adapter<S, T> + ?Sized,
{
    let mut result = Vec::new();
    for (index, item) in source.into_iter().enumerate() {
        match adapter.adapt(item) {
            Ok(converted) => result.push(converted),
            Err(e) => {
                warn!(target: "stratagraph::notion", index, error = %e, "Error in list adapter, element skipped");
            }
        }
    }
    result
}

// ============================================================================
// Built-in strategies
// ============================================================================

fn single_match(mut nodes: Vec<TypedNode>, what: &str) -> StrataResult<TypedNode> {
    match nodes.len() {
        0 => Err(StrataError::not_found(what.to_string())),
        1 => Ok(nodes.remove(0)),
        n => Err(StrataError::invalid_input(format!(
            "{} is ambiguous: {} nodes match",
            what, n
        ))),
    }
}

fn check_target(node: TypedNode, target: Option<&EntityType>) -> StrataResult<TypedNode> {
    match target {
        Some(t) if !node.entity_type().is_subtype_of(t) => Err(StrataError::invalid_input(format!(
            "{} is not a {}",
            node, t
        ))),
        _ => Ok(node),
    }
}

/// Encodes all properties plus `id`
struct ObjectSerialization;

impl SerializationStrategy for ObjectSerialization {
    fn serialize(
        &self,
        _security: &SecurityContext,
        _target: Option<&EntityType>,
        node: &TypedNode,
    ) -> StrataResult<Value> {
        let id = i64::try_from(node.id().as_u64()).map_err(|_| {
            StrataError::conversion(format!("{} does not fit an integer value", node.id()))
        })?;
        let mut object = node.properties().clone();
        object.insert(ID_PROPERTY.to_string(), Value::Int(id));
        Ok(Value::Object(object))
    }
}

/// Decodes `Int(id)` or an object carrying an `id` entry
struct IdDeserialization;

impl DeserializationStrategy for IdDeserialization {
    fn deserialize(
        &self,
        _security: &SecurityContext,
        target: Option<&EntityType>,
        resolver: &dyn NodeResolver,
        source: &Value,
    ) -> StrataResult<TypedNode> {
        let raw = match source {
            Value::Int(id) => Some(*id),
            Value::Object(object) => object.get(ID_PROPERTY).and_then(Value::as_int),
            _ => None,
        };
        let id = raw
            .filter(|id| *id >= 0)
            .map(|id| NodeId(id as u64))
            .ok_or_else(|| {
                StrataError::invalid_input(format!(
                    "cannot decode a node id from {}",
                    source.type_name()
                ))
            })?;
        let node = resolver
            .node_by_id(id)?
            .ok_or_else(|| StrataError::not_found(format!("node {}", id)))?;
        check_target(node, target)
    }
}

/// Encodes one property value (`Null` if unset)
struct PropertySerialization {
    key: PropertyKey,
}

impl SerializationStrategy for PropertySerialization {
    fn serialize(
        &self,
        _security: &SecurityContext,
        _target: Option<&EntityType>,
        node: &TypedNode,
    ) -> StrataResult<Value> {
        Ok(node.property(self.key.name()).cloned().unwrap_or(Value::Null))
    }
}

/// Decodes by finding the unique node holding the value under the key
struct PropertyDeserialization {
    key: PropertyKey,
}

impl DeserializationStrategy for PropertyDeserialization {
    fn deserialize(
        &self,
        _security: &SecurityContext,
        target: Option<&EntityType>,
        resolver: &dyn NodeResolver,
        source: &Value,
    ) -> StrataResult<TypedNode> {
        if source.is_null() {
            return Err(StrataError::invalid_input(format!(
                "cannot decode by {} from null",
                self.key
            )));
        }
        let mut query = PropertyMap::new();
        query.insert(self.key.name().to_string(), source.clone());
        let nodes = resolver.find_nodes(target, &query)?;
        single_match(nodes, &format!("node with {} = {:?}", self.key, source))
    }
}

/// Encodes a subset of properties as an object
struct PropertySetSerialization {
    keys: Vec<PropertyKey>,
}

impl SerializationStrategy for PropertySetSerialization {
    fn serialize(
        &self,
        _security: &SecurityContext,
        _target: Option<&EntityType>,
        node: &TypedNode,
    ) -> StrataResult<Value> {
        let object = self
            .keys
            .iter()
            .map(|key| {
                (
                    key.name().to_string(),
                    node.property(key.name()).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        Ok(Value::Object(object))
    }
}

/// Decodes by matching every key of the set present in the object
struct PropertySetDeserialization {
    keys: Vec<PropertyKey>,
}

impl DeserializationStrategy for PropertySetDeserialization {
    fn deserialize(
        &self,
        _security: &SecurityContext,
        target: Option<&EntityType>,
        resolver: &dyn NodeResolver,
        source: &Value,
    ) -> StrataResult<TypedNode> {
        let object = source.as_object().ok_or_else(|| {
            StrataError::invalid_input(format!(
                "property set notion expects an object, got {}",
                source.type_name()
            ))
        })?;
        let query: PropertyMap = self
            .keys
            .iter()
            .filter_map(|key| {
                object
                    .get(key.name())
                    .filter(|v| !v.is_null())
                    .map(|v| (key.name().to_string(), v.clone()))
            })
            .collect();
        if query.is_empty() {
            return Err(StrataError::invalid_input(
                "property set notion found none of its keys",
            ));
        }
        let nodes = resolver.find_nodes(target, &query)?;
        single_match(nodes, "node matching property set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FixedResolver {
        nodes: Vec<TypedNode>,
        calls: Mutex<usize>,
    }

    impl FixedResolver {
        fn new(nodes: Vec<TypedNode>) -> Arc<Self> {
            Arc::new(Self {
                nodes,
                calls: Mutex::new(0),
            })
        }
    }

    impl NodeResolver for FixedResolver {
        fn node_by_id(&self, id: NodeId) -> StrataResult<Option<TypedNode>> {
            *self.calls.lock() += 1;
            Ok(self.nodes.iter().find(|n| n.id() == id).cloned())
        }

        fn find_nodes(
            &self,
            entity_type: Option<&EntityType>,
            properties: &PropertyMap,
        ) -> StrataResult<Vec<TypedNode>> {
            *self.calls.lock() += 1;
            Ok(self
                .nodes
                .iter()
                .filter(|n| entity_type.map_or(true, |t| n.entity_type().is_subtype_of(t)))
                .filter(|n| properties.iter().all(|(k, v)| n.property(k) == Some(v)))
                .cloned()
                .collect())
        }
    }

    /// Records the security context every call was made with
    struct RecordingSerialization {
        seen: Mutex<Vec<SecurityContext>>,
    }

    impl SerializationStrategy for RecordingSerialization {
        fn serialize(
            &self,
            security: &SecurityContext,
            _target: Option<&EntityType>,
            node: &TypedNode,
        ) -> StrataResult<Value> {
            self.seen.lock().push(security.clone());
            if node.property("broken").is_some() {
                return Err(StrataError::conversion("broken node"));
            }
            Ok(Value::Int(node.id().as_u64() as i64))
        }
    }

    fn person_type() -> EntityType {
        EntityType::derive("Person", &EntityType::root("AbstractNode"))
    }

    fn person(id: u64, name: &str) -> TypedNode {
        let mut props = PropertyMap::new();
        props.insert("name".to_string(), Value::from(name));
        TypedNode::new(NodeId(id), person_type(), props)
    }

    #[test]
    fn test_object_notion_round_trip() {
        let alice = person(1, "alice");
        let resolver = FixedResolver::new(vec![alice.clone()]);
        let notion = Notion::object().bind(&person_type());
        let security = SecurityContext::super_user();

        let encoded = notion.getter_adapter(&security).adapt(&alice).unwrap();
        let object = encoded.as_object().unwrap();
        assert_eq!(object.get("id"), Some(&Value::Int(1)));
        assert_eq!(object.get("name"), Some(&Value::from("alice")));

        let decoded = notion
            .setter_adapter(&security, resolver)
            .adapt(&encoded)
            .unwrap();
        assert_eq!(decoded, alice);
        assert!(notion.primary_key().is_none());
    }

    #[test]
    fn test_property_notion_decodes_by_key() {
        let resolver = FixedResolver::new(vec![person(1, "alice"), person(2, "bob")]);
        let notion = Notion::property(PropertyKey::new("name")).bind(&person_type());
        let security = SecurityContext::super_user();

        assert_eq!(notion.primary_key().map(|k| k.name()), Some("name"));

        let bob = notion
            .setter_adapter(&security, resolver.clone())
            .adapt(&Value::from("bob"))
            .unwrap();
        assert_eq!(bob.id(), NodeId(2));

        let missing = notion
            .setter_adapter(&security, resolver)
            .adapt(&Value::from("carol"));
        assert!(matches!(missing, Err(StrataError::NotFound(_))));
    }

    #[test]
    fn test_property_set_notion() {
        let alice = person(1, "alice");
        let resolver = FixedResolver::new(vec![alice.clone()]);
        let notion = Notion::property_set(vec![PropertyKey::new("name"), PropertyKey::new("age")]);
        let security = SecurityContext::super_user();

        let encoded = notion.getter_adapter(&security).adapt(&alice).unwrap();
        let object = encoded.as_object().unwrap();
        assert_eq!(object.get("age"), Some(&Value::Null));

        let decoded = notion
            .setter_adapter(&security, resolver)
            .adapt(&encoded)
            .unwrap();
        assert_eq!(decoded.id(), NodeId(1));
    }

    #[test]
    fn test_collection_setter_null_input_is_empty() {
        let resolver = FixedResolver::new(vec![]);
        let notion = Notion::object();
        let adapter = notion.collection_setter_adapter(&SecurityContext::public(), resolver.clone());

        let decoded = adapter.adapt(None).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(*resolver.calls.lock(), 0);
    }

    #[test]
    fn test_collection_setter_preserves_order() {
        let resolver = FixedResolver::new(vec![person(1, "a"), person(2, "b"), person(3, "c")]);
        let notion = Notion::object();
        let adapter = notion.collection_setter_adapter(&SecurityContext::super_user(), resolver);

        let input = vec![Value::Int(3), Value::Int(1), Value::Int(2)];
        let ids: Vec<_> = adapter
            .adapt(Some(input.as_slice()))
            .unwrap()
            .iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(ids, vec![NodeId(3), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_convert_list_skips_failures() {
        let strategy = Arc::new(RecordingSerialization {
            seen: Mutex::new(Vec::new()),
        });
        let notion = Notion::new(strategy, Arc::new(IdDeserialization), None);
        let adapter = notion.getter_adapter(&SecurityContext::for_user("alice"));

        let mut broken = person(2, "b");
        broken.set_property("broken", Value::Bool(true));
        let nodes = vec![person(1, "a"), broken, person(3, "c")];

        let result = convert_list(nodes.iter(), &adapter);
        assert_eq!(result, vec![Value::Int(1), Value::Int(3)]);

        // the strict collection adapter aborts instead
        let strict = notion.collection_getter_adapter(&SecurityContext::for_user("alice"));
        assert!(strict.adapt(nodes.as_slice()).is_err());
    }

    #[test]
    fn test_adapter_keeps_construction_context() {
        let strategy = Arc::new(RecordingSerialization {
            seen: Mutex::new(Vec::new()),
        });
        let notion = Notion::new(strategy.clone(), Arc::new(IdDeserialization), None);

        let alice_adapter = notion.getter_adapter(&SecurityContext::for_user("alice"));
        let _bob_adapter = notion.getter_adapter(&SecurityContext::for_user("bob"));

        alice_adapter.adapt(&person(1, "a")).unwrap();
        alice_adapter.adapt(&person(2, "b")).unwrap();

        let seen = strategy.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|s| s.user() == Some("alice")));
    }

    #[test]
    fn test_object_notion_rejects_ids_beyond_int_range() {
        let node = TypedNode::new(NodeId(u64::MAX), person_type(), PropertyMap::new());
        let notion = Notion::object();
        let result = notion.getter_adapter(&SecurityContext::super_user()).adapt(&node);
        assert!(matches!(result, Err(StrataError::Conversion(_))));
    }

    #[test]
    fn test_entity_converter_stores_ids() {
        let resolver = FixedResolver::new(vec![person(1, "alice"), person(2, "bob")]);
        let notion = Notion::property(PropertyKey::new("name")).bind(&person_type());
        let converter = notion.entity_converter(&SecurityContext::super_user(), resolver);

        assert_eq!(converter.convert(&Value::from("bob")).unwrap(), Value::Int(2));
        assert_eq!(converter.revert(&Value::Int(1)).unwrap(), Value::from("alice"));
        assert_eq!(converter.convert(&Value::Null).unwrap(), Value::Null);
        assert!(matches!(
            converter.revert(&Value::Int(9)),
            Err(StrataError::NotFound(_))
        ));
        assert!(matches!(
            converter.revert(&Value::from("bob")),
            Err(StrataError::Conversion(_))
        ));
    }

    #[test]
    fn test_collection_converter() {
        let resolver = FixedResolver::new(vec![person(1, "alice"), person(2, "bob")]);
        let notion = Notion::property(PropertyKey::new("name")).bind(&person_type());
        let converter = notion.collection_converter(&SecurityContext::super_user(), resolver);

        let stored = converter
            .convert(&Value::Array(vec![Value::from("bob"), Value::from("alice")]))
            .unwrap();
        assert_eq!(stored, Value::Array(vec![Value::Int(2), Value::Int(1)]));
        assert_eq!(
            converter.revert(&stored).unwrap(),
            Value::Array(vec![Value::from("bob"), Value::from("alice")])
        );
        assert_eq!(converter.convert(&Value::Null).unwrap(), Value::Array(vec![]));
        assert!(converter
            .convert(&Value::Array(vec![Value::from("carol")]))
            .is_err());
    }

    #[test]
    fn test_notion_converter_registered_by_name() {
        use crate::converter::ConverterKind;
        use crate::registry::RegistryBuilder;

        let resolver: Arc<dyn NodeResolver> = FixedResolver::new(vec![person(1, "alice")]);
        let notion = Notion::property(PropertyKey::new("name")).bind(&person_type());
        let manager = PropertyKey::new("manager");

        let mut builder = RegistryBuilder::new();
        builder.register_converter_factory(
            "person-by-name",
            Arc::new(
                move |security: &SecurityContext,
                      _: Option<&Value>|
                      -> StrataResult<Box<dyn PropertyConverter>> {
                    Ok(Box::new(notion.entity_converter(security, resolver.clone())))
                },
            ),
        );
        builder.register_property_converter(
            &person_type(),
            &manager,
            ConverterKind::Named("person-by-name".into()),
        );
        let registry = builder.build();
        let security = SecurityContext::super_user();

        let stored = registry
            .convert_property(&person_type(), &manager, &security, &Value::from("alice"))
            .unwrap();
        assert_eq!(stored, Value::Int(1));
        assert_eq!(
            registry
                .revert_property(&person_type(), &manager, &security, &stored)
                .unwrap(),
            Value::from("alice")
        );
    }

    #[test]
    fn test_id_decode_checks_target_type() {
        let folder_type = EntityType::derive("Folder", &EntityType::root("AbstractNode"));
        let resolver = FixedResolver::new(vec![person(1, "alice")]);
        let notion = Notion::object().bind(&folder_type);

        let result = notion
            .setter_adapter(&SecurityContext::super_user(), resolver)
            .adapt(&Value::Int(1));
        assert!(matches!(result, Err(StrataError::InvalidInput(_))));
    }
}
