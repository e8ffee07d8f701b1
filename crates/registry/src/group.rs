//! Property groups
//!
//! A group exposes several stored properties as one composite value and
//! splits a composite value back into the stored properties.

use stratagraph_core::{GraphObject, PropertyKey, PropertyMap, StrataError, StrataResult, TypedNode, Value};

/// Composite view over several stored properties
pub trait PropertyGroup: Send + Sync {
    /// Read the composite value from `node`
    fn get_grouped(&self, node: &TypedNode) -> StrataResult<Value>;

    /// Write the composite `value` into `node`'s stored properties
    fn set_grouped(&self, node: &mut TypedNode, value: &Value) -> StrataResult<()>;
}

/// Group mapping an object value onto a fixed list of properties
///
/// Reading yields an object with one entry per key (null if unset), or
/// `Null` if none of the keys is set. Writing `Null` removes every key.
#[derive(Debug, Clone)]
pub struct GroupedProperties {
    keys: Vec<PropertyKey>,
}

impl GroupedProperties {
    /// Group over `keys`
    pub fn new(keys: Vec<PropertyKey>) -> Self {
        Self { keys }
    }

    /// Grouped keys in declaration order
    pub fn keys(&self) -> &[PropertyKey] {
        &self.keys
    }
}

impl PropertyGroup for GroupedProperties {
    fn get_grouped(&self, node: &TypedNode) -> StrataResult<Value> {
        if self.keys.iter().all(|k| node.property(k.name()).is_none()) {
            return Ok(Value::Null);
        }
        let object: PropertyMap = self
            .keys
            .iter()
            .map(|k| {
                (
                    k.name().to_string(),
                    node.property(k.name()).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        Ok(Value::Object(object))
    }

    fn set_grouped(&self, node: &mut TypedNode, value: &Value) -> StrataResult<()> {
        match value {
            Value::Null => {
                for key in &self.keys {
                    node.remove_property(key.name());
                }
                Ok(())
            }
            Value::Object(object) => {
                if let Some(unknown) = object
                    .keys()
                    .find(|name| !self.keys.iter().any(|k| k.name() == name.as_str()))
                {
                    return Err(StrataError::invalid_input(format!(
                        "{} is not part of this property group",
                        unknown
                    )));
                }
                for key in &self.keys {
                    match object.get(key.name()) {
                        Some(Value::Null) => {
                            node.remove_property(key.name());
                        }
                        Some(v) => {
                            node.set_property(key.name(), v.clone());
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            other => Err(StrataError::invalid_input(format!(
                "property group expects an object, got {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratagraph_core::{EntityType, NodeId};

    fn address() -> GroupedProperties {
        GroupedProperties::new(vec![PropertyKey::new("street"), PropertyKey::new("city")])
    }

    fn node() -> TypedNode {
        TypedNode::new(NodeId(1), EntityType::root("Person"), PropertyMap::new())
    }

    #[test]
    fn test_unset_group_reads_null() {
        assert_eq!(address().get_grouped(&node()).unwrap(), Value::Null);
    }

    #[test]
    fn test_set_then_get() {
        let group = address();
        let mut n = node();
        let mut value = PropertyMap::new();
        value.insert("city".to_string(), Value::from("Berlin"));
        group.set_grouped(&mut n, &Value::Object(value)).unwrap();

        assert_eq!(n.property("city"), Some(&Value::from("Berlin")));
        let read = group.get_grouped(&n).unwrap();
        let object = read.as_object().unwrap();
        assert_eq!(object.get("street"), Some(&Value::Null));
        assert_eq!(object.get("city"), Some(&Value::from("Berlin")));

        group.set_grouped(&mut n, &Value::Null).unwrap();
        assert!(n.property("city").is_none());
    }

    #[test]
    fn test_rejects_foreign_keys() {
        let mut value = PropertyMap::new();
        value.insert("zip".to_string(), Value::from("10115"));
        assert!(address()
            .set_grouped(&mut node(), &Value::Object(value))
            .is_err());
    }
}
