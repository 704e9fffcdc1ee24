//! `model` type: a nested record

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::model::{Model, ModelType};
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::{Description, TypeRef};
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::Value;

use super::{invalid, FieldKind};

pub struct ModelRefType;

struct ModelKind {
    model: ModelType,
}

impl TypeFactory for ModelRefType {
    fn tag(&self) -> &str {
        "model"
    }

    fn prepare_description(&self, description: &mut Description) {
        if let TypeRef::Model(model) = &description.ty {
            description.model = Some(model.clone());
            description.ty = TypeRef::Tag("model".to_string());
        }
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        _: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let model = description
            .model
            .clone()
            .ok_or_else(|| ModelError::InvalidDescription {
                key: key.to_string(),
                reason: "model type is not set".to_string(),
            })?;
        Ok(Box::new(ModelKind { model }))
    }
}

impl FieldKind for ModelKind {
    fn type_name(&self) -> String {
        self.model.name().to_string()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        match &value {
            Value::Null => Ok(Value::Null),
            Value::Model(model) if model.model_type().is_a(&self.model) => Ok(value),
            Value::Object(map) => Model::new(&self.model, Value::Object(map.clone()))
                .map(Value::Model)
                .map_err(|source| ModelError::InvalidModel {
                    key: key.to_string(),
                    source: Box::new(source),
                }),
            _ => Err(invalid(key, self.type_name(), &value)),
        }
    }

    fn to_json(&self, value: &Value, key: &str, stack: &mut JsonStack) -> Result<Json> {
        match value {
            Value::Model(model) => model.to_json_with(key, stack),
            other => super::any_to_json(other, key, stack),
        }
    }

    fn clone_value(&self, value: &Value, key: &str, stack: &mut CloneStack) -> Result<Value> {
        match value {
            Value::Model(model) => model.clone_with(stack).map(Value::Model),
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
            (Value::Null, Value::Null) => Ok(true),
            (Value::Null, _) | (_, Value::Null) => Ok(false),
            _ => super::any_equal(left, right, key, stack),
        }
    }
}
