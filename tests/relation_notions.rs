//! Relation notions resolved against a committed MemoryGraph
//!
//! Uses only the `stratagraph` facade.

use std::sync::Arc;
use stratagraph::{
    convert_list, Adapter, Cardinality, ChangeInterceptor, Direction, EntityType, GraphObject,
    MemoryGraph, Notion, NodeResolver, PropertyKey, PropertyMap, RegistryBuilder, SecurityContext,
    StrataError, Value,
};

fn base() -> EntityType {
    EntityType::root("AbstractNode")
}

fn person() -> EntityType {
    EntityType::derive("Person", &base())
}

fn company() -> EntityType {
    EntityType::derive("Company", &base())
}

fn named(name: &str) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("name".to_string(), Value::from(name));
    props
}

struct Fixture {
    graph: Arc<MemoryGraph>,
    alice: u64,
    acme: u64,
}

fn fixture() -> Fixture {
    let mut builder = RegistryBuilder::new();
    builder.register_relation(&person(), "friends", &person(), "KNOWS", Direction::Both);
    builder.register_relation_with(
        &person(),
        "employer",
        &company(),
        "WORKS_AT",
        Direction::Outgoing,
        Cardinality::ManyToOne,
        Notion::property(PropertyKey::new("name")),
    );
    let graph = Arc::new(MemoryGraph::new(Arc::new(builder.build())));
    let interceptor = ChangeInterceptor::default();

    let mut tx = graph.begin(&interceptor);
    let alice = tx.create_node(&person(), named("alice")).unwrap();
    tx.create_node(&person(), named("bob")).unwrap();
    let acme = tx.create_node(&company(), named("acme")).unwrap();
    tx.commit().unwrap();

    Fixture {
        graph,
        alice: alice.id().as_u64(),
        acme: acme.id().as_u64(),
    }
}

#[test]
fn test_property_notion_decodes_by_name() {
    let f = fixture();
    let registry = Arc::clone(f.graph.registry());
    let relation = registry.relation(&person(), "Employer").unwrap();
    assert_eq!(relation.cardinality(), Cardinality::ManyToOne);
    assert_eq!(relation.notion().primary_key(), Some(&PropertyKey::new("name")));

    let security = SecurityContext::for_user("alice");
    let setter = relation.notion().setter_adapter(&security, f.graph.clone());
    let company = setter.adapt(&Value::from("acme")).unwrap();
    assert_eq!(company.id().as_u64(), f.acme);

    // alice exists, but only as a person
    let err = setter.adapt(&Value::from("alice")).unwrap_err();
    assert!(matches!(err, StrataError::NotFound(_)));

    let getter = relation.notion().getter_adapter(&security);
    assert_eq!(getter.adapt(&company).unwrap(), Value::from("acme"));
}

#[test]
fn test_object_notion_round_trips_through_ids() {
    let f = fixture();
    let registry = Arc::clone(f.graph.registry());
    let relation = registry.relation(&person(), "friends").unwrap();
    let security = SecurityContext::super_user();

    let people = f
        .graph
        .find_nodes(Some(&person()), &PropertyMap::new())
        .unwrap();
    let encoded = relation
        .notion()
        .collection_getter_adapter(&security)
        .adapt(people.as_slice())
        .unwrap();
    assert_eq!(encoded.len(), 2);

    let decoded = relation
        .notion()
        .collection_setter_adapter(&security, f.graph.clone())
        .adapt(Some(encoded.as_slice()))
        .unwrap();
    let ids: Vec<u64> = decoded.iter().map(|n| n.id().as_u64()).collect();
    assert!(ids.contains(&f.alice));
    assert_eq!(decoded.len(), 2);
}

#[test]
fn test_null_collection_decodes_empty() {
    let f = fixture();
    let registry = Arc::clone(f.graph.registry());
    let relation = registry.relation(&person(), "friends").unwrap();

    let decoded = relation
        .notion()
        .collection_setter_adapter(&SecurityContext::public(), f.graph.clone())
        .adapt(None)
        .unwrap();
    assert!(decoded.is_empty());
}

#[test]
fn test_list_conversion_skips_failures() {
    let f = fixture();
    let registry = Arc::clone(f.graph.registry());
    let relation = registry.relation(&person(), "friends").unwrap();
    let setter = relation
        .notion()
        .setter_adapter(&SecurityContext::super_user(), f.graph.clone());

    // company id fails the person target check, 9999 does not exist
    let source = vec![
        Value::Int(f.alice as i64),
        Value::Int(f.acme as i64),
        Value::Int(9999),
    ];
    let decoded = convert_list(source.iter(), &setter);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].property("name"), Some(&Value::from("alice")));
}

#[test]
fn test_relation_between_matches_target_name() {
    let f = fixture();
    let registry = f.graph.registry();

    let employer = registry.relation_between(&person(), "Companies", true).unwrap();
    assert_eq!(employer.property(), "employer");
    assert_eq!(employer.rel_type(), "WORKS_AT");

    let friends = registry.relation_between(&person(), "Person", false).unwrap();
    assert_eq!(friends.rel_type(), "KNOWS");

    assert!(registry.relation_between(&person(), "Company", true).is_none());
    assert!(registry.relation_between(&company(), "Person", false).is_none());
}
