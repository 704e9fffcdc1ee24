//! `*` type and the shape-generic comparator, projector and cloner

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::{Description, TypeRef};
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::{Map, Value};

use super::FieldKind;

pub struct AnyType;

impl TypeFactory for AnyType {
    fn tag(&self) -> &str {
        "*"
    }

    fn prepare_description(&self, description: &mut Description) {
        if matches!(&description.ty, TypeRef::Tag(tag) if tag == "any") {
            description.ty = TypeRef::Tag("*".to_string());
        }
    }

    fn create(&self, _: &Description, _: &str, _: &TypeRegistry) -> Result<Box<dyn FieldKind>> {
        Ok(Box::new(AnyKind))
    }
}

struct AnyKind;

impl FieldKind for AnyKind {
    fn type_name(&self) -> String {
        "any".to_string()
    }

    fn prepare(&self, value: Value, _key: &str, _owner: &Model) -> Result<Value> {
        Ok(value)
    }
}

/// Structural equality for values whose concrete type is not tracked
pub(crate) fn any_equal(
    left: &Value,
    right: &Value,
    key: &str,
    stack: &mut EqualStack,
) -> Result<bool> {
    match (left, right) {
        (Value::Model(model), other) | (other, Value::Model(model)) => {
            model.equal_with(other, stack)
        }
        (Value::Collection(collection), other) | (other, Value::Collection(collection)) => {
            collection.equal_with(other, stack)
        }
        (Value::Array(a), Value::Array(b)) => {
            if !stack.enter_values(left, right) {
                return Ok(true);
            }
            if a.len() != b.len() {
                return Ok(false);
            }
            for (x, y) in a.iter().zip(b.iter()) {
                if !any_equal(x, y, key, stack)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Object(a), Value::Object(b)) => {
            if !stack.enter_values(left, right) {
                return Ok(true);
            }
            objects_equal(a, b, key, stack, any_equal)
        }
        (Value::Date(a), Value::Date(b)) => Ok(a.timestamp_millis() == b.timestamp_millis()),
        _ => Ok(left == right),
    }
}

/// Same key set and pairwise-equal values
pub(crate) fn objects_equal(
    a: &Map,
    b: &Map,
    key: &str,
    stack: &mut EqualStack,
    equal: impl Fn(&Value, &Value, &str, &mut EqualStack) -> Result<bool>,
) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (name, x) in a {
        match b.get(name) {
            Some(y) => {
                if !equal(x, y, key, stack)? {
                    return Ok(false);
                }
            }
            None => return Ok(false),
        }
    }
    Ok(true)
}

pub(crate) fn any_to_json(value: &Value, key: &str, stack: &mut JsonStack) -> Result<Json> {
    match value {
        Value::Model(model) => model.to_json_with(key, stack),
        Value::Collection(collection) => collection.to_json_with(key, stack),
        Value::Array(items) => items
            .iter()
            .map(|item| any_to_json(item, key, stack))
            .collect::<Result<Vec<_>>>()
            .map(Json::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), any_to_json(v, key, stack)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Json::Object),
        Value::Custom(custom) => Err(ModelError::NoToJsonMethod {
            key: key.to_string(),
            class: custom.type_name().to_string(),
        }),
        other => Ok(other.to_json_lossy()),
    }
}

/// Deep copy; opaque values are shared since nothing describes how to copy them
pub(crate) fn any_clone(value: &Value, key: &str, stack: &mut CloneStack) -> Result<Value> {
    match value {
        Value::Model(model) => model.clone_with(stack).map(Value::Model),
        Value::Collection(collection) => collection.clone_with(stack).map(Value::Collection),
        Value::Array(items) => Ok(Value::array(
            items
                .iter()
                .map(|item| any_clone(item, key, stack))
                .collect::<Result<Vec<_>>>()?,
        )),
        Value::Object(map) => Ok(Value::object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), any_clone(v, key, stack)?)))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}
