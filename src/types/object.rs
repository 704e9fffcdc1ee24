//! `object` type: a string-keyed map whose values share one element type

use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::Description;
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::{Map, Value};

use super::any::objects_equal;
use super::{element_description, invalid, Descriptor, FieldKind};

pub struct ObjectType;

struct ObjectKind {
    element: Arc<Descriptor>,
    empty_as_null: bool,
    null_as_empty: bool,
}

impl TypeFactory for ObjectType {
    fn tag(&self) -> &str {
        "object"
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        registry: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let m = &description.modifiers;
        if m.empty_as_null && m.null_as_empty {
            return Err(ModelError::ConflictingModifiers {
                key: key.to_string(),
                first: "emptyAsNull",
                second: "nullAsEmpty",
            });
        }
        let element = registry.resolve(element_description(description), key)?;
        Ok(Box::new(ObjectKind {
            element,
            empty_as_null: m.empty_as_null,
            null_as_empty: m.null_as_empty,
        }))
    }
}

impl FieldKind for ObjectKind {
    fn type_name(&self) -> String {
        format!("object of {}", self.element.type_name())
    }

    fn prepare(&self, value: Value, key: &str, owner: &Model) -> Result<Value> {
        let map = match &value {
            Value::Null => {
                return Ok(if self.null_as_empty {
                    Value::from(Map::new())
                } else {
                    Value::Null
                })
            }
            Value::Object(map) => map,
            _ => return Err(invalid(key, self.type_name(), &value)),
        };

        let mut prepared = Map::with_capacity(map.len());
        for (element, item) in map.iter() {
            let item = self
                .element
                .prepare(item.clone(), key, owner)
                .map_err(|source| ModelError::InvalidObjectElement {
                    key: key.to_string(),
                    element: element.clone(),
                    source: Box::new(source),
                })?;
            prepared.insert(element.clone(), item);
        }

        if self.empty_as_null && prepared.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::from(prepared))
    }

    fn to_json(&self, value: &Value, key: &str, stack: &mut JsonStack) -> Result<Json> {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.element.to_json(v, key, stack)?)))
                .collect::<Result<serde_json::Map<_, _>>>()
                .map(Json::Object),
            other => super::any_to_json(other, key, stack),
        }
    }

    fn clone_value(&self, value: &Value, key: &str, stack: &mut CloneStack) -> Result<Value> {
        match value {
            Value::Object(map) => {
                let mut copy = Map::with_capacity(map.len());
                for (k, v) in map.iter() {
                    copy.insert(k.clone(), self.element.clone_value(v, key, stack)?);
                }
                Ok(Value::from(copy))
            }
            other => super::any_clone(other, key, stack),
        }
    }

    fn equal(
        &self,
        left: &Value,
        right: &Value,
        key: &str,
        stack: &mut EqualStack,
    ) -> Result<bool> {
        match (left, right) {
            (Value::Object(a), Value::Object(b)) => {
                if !stack.enter_values(left, right) {
                    return Ok(true);
                }
                objects_equal(a, b, key, stack, |x, y, k, s| self.element.equal(x, y, k, s))
            }
            _ => super::any_equal(left, right, key, stack),
        }
    }
}
