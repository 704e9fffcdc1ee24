//! `custom` type: opaque Rust values checked by type only

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::{Description, TypeRef};
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::{short_type_name, CustomValue, Value};

use super::{invalid, FieldKind};

type JsonFn = Arc<dyn Fn(&CustomValue) -> Json + Send + Sync>;
type CloneFn = Arc<dyn Fn(&CustomValue) -> CustomValue + Send + Sync>;
type EqualFn = Arc<dyn Fn(&CustomValue, &CustomValue) -> bool + Send + Sync>;

/// Declares the Rust type a `custom` field holds.
///
/// JSON projection, cloning and equality are undefined unless supplied; using
/// them without a hook is an error rather than a guess.
#[derive(Clone)]
pub struct CustomClass {
    name: String,
    type_id: TypeId,
    to_json: Option<JsonFn>,
    clone: Option<CloneFn>,
    equal: Option<EqualFn>,
}

impl CustomClass {
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            name: short_type_name::<T>().to_string(),
            type_id: TypeId::of::<T>(),
            to_json: None,
            clone: None,
            equal: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_instance(&self, value: &CustomValue) -> bool {
        value.inner_type_id() == self.type_id
    }

    pub fn with_to_json<T, F>(mut self, project: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Json + Send + Sync + 'static,
    {
        self.to_json = Some(Arc::new(move |value: &CustomValue| {
            value.downcast_ref::<T>().map_or(Json::Null, &project)
        }));
        self
    }

    pub fn with_clone<T, F>(mut self, copy: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.clone = Some(Arc::new(move |value: &CustomValue| {
            match value.downcast_ref::<T>() {
                Some(inner) => CustomValue::new(copy(inner)),
                None => value.clone(),
            }
        }));
        self
    }

    pub fn with_equal<T, F>(mut self, equal: F) -> Self
    where
        T: Any,
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equal = Some(Arc::new(move |a: &CustomValue, b: &CustomValue| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => equal(a, b),
                _ => false,
            }
        }));
        self
    }
}

impl fmt::Debug for CustomClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomClass")
            .field("name", &self.name)
            .field("to_json", &self.to_json.is_some())
            .field("clone", &self.clone.is_some())
            .field("equal", &self.equal.is_some())
            .finish()
    }
}

pub struct CustomClassType;

struct CustomKind {
    class: CustomClass,
}

impl TypeFactory for CustomClassType {
    fn tag(&self) -> &str {
        "custom"
    }

    fn prepare_description(&self, description: &mut Description) {
        if let TypeRef::Custom(class) = &description.ty {
            description.custom = Some(class.clone());
            description.ty = TypeRef::Tag("custom".to_string());
        }
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        _: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let class = description
            .custom
            .clone()
            .ok_or_else(|| ModelError::InvalidDescription {
                key: key.to_string(),
                reason: "custom class is not set".to_string(),
            })?;
        Ok(Box::new(CustomKind { class }))
    }
}

impl FieldKind for CustomKind {
    fn type_name(&self) -> String {
        self.class.name.clone()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        match &value {
            Value::Null => Ok(Value::Null),
            Value::Custom(custom) if self.class.is_instance(custom) => Ok(value),
            _ => Err(invalid(key, self.type_name(), &value)),
        }
    }

    fn to_json(&self, value: &Value, key: &str, _stack: &mut JsonStack) -> Result<Json> {
        let Value::Custom(custom) = value else {
            return Ok(value.to_json_lossy());
        };
        match &self.class.to_json {
            Some(project) => Ok(project(custom)),
            None => Err(ModelError::NoToJsonMethod {
                key: key.to_string(),
                class: self.class.name.clone(),
            }),
        }
    }

    fn clone_value(&self, value: &Value, key: &str, _stack: &mut CloneStack) -> Result<Value> {
        let Value::Custom(custom) = value else {
            return Ok(value.clone());
        };
        match &self.class.clone {
            Some(copy) => Ok(Value::Custom(copy(custom))),
            None => Err(ModelError::NoCloneMethod {
                key: key.to_string(),
                class: self.class.name.clone(),
            }),
        }
    }

    fn equal(
        &self,
        left: &Value,
        right: &Value,
        key: &str,
        _stack: &mut EqualStack,
    ) -> Result<bool> {
        match (left, right) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Custom(a), Value::Custom(b)) => {
                if a.ptr_eq(b) {
                    return Ok(true);
                }
                match &self.class.equal {
                    Some(equal) => Ok(equal(a, b)),
                    None => Err(ModelError::NoEqualMethod {
                        key: key.to_string(),
                        class: self.class.name.clone(),
                    }),
                }
            }
            _ => Ok(false),
        }
    }
}
