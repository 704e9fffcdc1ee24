//! Field types
//!
//! Each built-in type is a `TypeFactory` (registered by tag) producing a
//! configured `FieldKind`. The `Descriptor` wraps a kind with the options every
//! field shares: required/primary/const flags, default, enum values and hooks.
//!
//! Descriptors are immutable once built and shared by every record of a type.

mod any;
mod array;
mod boolean;
mod collection;
mod custom;
mod date;
mod model;
mod number;
mod object;
mod or;
mod string;

pub use any::AnyType;
pub use array::ArrayType;
pub use boolean::BooleanType;
pub use collection::CollectionRefType;
pub use custom::{CustomClass, CustomClassType};
pub use date::DateType;
pub use model::ModelRefType;
pub use number::NumberType;
pub use object::ObjectType;
pub use or::OrType;
pub use string::StringType;

pub(crate) use any::{any_clone, any_equal, any_to_json};

use std::fmt;

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::schema::{DefaultValue, Description, PrepareHook, ToJsonHook, Validator};
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::Value;

/// Behavior of one configured field type
pub trait FieldKind: Send + Sync {
    /// Human-readable type name used in error messages
    fn type_name(&self) -> String;

    /// Coerce and normalize an input value
    fn prepare(&self, value: Value, key: &str, owner: &Model) -> Result<Value>;

    fn to_json(&self, value: &Value, key: &str, stack: &mut JsonStack) -> Result<Json> {
        any_to_json(value, key, stack)
    }

    fn clone_value(&self, value: &Value, key: &str, stack: &mut CloneStack) -> Result<Value> {
        any_clone(value, key, stack)
    }

    fn equal(
        &self,
        left: &Value,
        right: &Value,
        key: &str,
        stack: &mut EqualStack,
    ) -> Result<bool> {
        any_equal(left, right, key, stack)
    }
}

/// Resolved, immutable contract of one field
pub struct Descriptor {
    type_tag: String,
    required: bool,
    primary: bool,
    constant: bool,
    enum_values: Option<Vec<Value>>,
    default: Option<DefaultValue>,
    prepare_hook: Option<PrepareHook>,
    validator: Option<Validator>,
    to_json_hook: Option<ToJsonHook>,
    key_validator: Option<Validator>,
    kind: Box<dyn FieldKind>,
}

impl Descriptor {
    pub(crate) fn new(
        type_tag: String,
        description: &Description,
        kind: Box<dyn FieldKind>,
    ) -> Self {
        Self {
            type_tag,
            required: description.required,
            primary: description.primary,
            constant: description.constant,
            enum_values: description.enum_values.clone(),
            default: description.default.clone(),
            prepare_hook: description.prepare.clone(),
            validator: description.validate.clone(),
            to_json_hook: description.to_json.clone(),
            key_validator: description.key.clone(),
            kind,
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn type_name(&self) -> String {
        self.kind.type_name()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_const(&self) -> bool {
        self.constant
    }

    /// Key check of a wildcard entry (always true when none was declared)
    pub fn accepts_key(&self, key: &str) -> bool {
        self.key_validator
            .as_ref()
            .map_or(true, |validator| validator.check_key(key))
    }

    /// Unprepared default value
    pub fn default_value(&self) -> Value {
        self.default
            .as_ref()
            .map(DefaultValue::produce)
            .unwrap_or(Value::Null)
    }

    /// Full field pipeline: type coercion, prepare hook, enum and custom checks
    pub fn prepare(&self, value: Value, key: &str, owner: &Model) -> Result<Value> {
        let mut value = self.kind.prepare(value, key, owner)?;
        if let Some(hook) = &self.prepare_hook {
            value = hook(value, key, owner)?;
        }
        if value.is_null() {
            return Ok(value);
        }

        if let Some(allowed) = &self.enum_values {
            let mut stack = EqualStack::new();
            let mut found = false;
            for candidate in allowed {
                if any_equal(candidate, &value, key, &mut stack)? {
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(ModelError::NotInEnum {
                    key: key.to_string(),
                    value: value.render(),
                });
            }
        }

        if let Some(validator) = &self.validator {
            if !validator.check(&value) {
                return Err(ModelError::InvalidValue {
                    key: key.to_string(),
                    expected: self.type_name(),
                    value: value.render(),
                });
            }
        }
        Ok(value)
    }

    pub fn to_json(&self, value: &Value, key: &str, stack: &mut JsonStack) -> Result<Json> {
        match &self.to_json_hook {
            Some(hook) => Ok(hook(value)),
            None => self.kind.to_json(value, key, stack),
        }
    }

    pub fn clone_value(&self, value: &Value, key: &str, stack: &mut CloneStack) -> Result<Value> {
        self.kind.clone_value(value, key, stack)
    }

    pub fn equal(
        &self,
        left: &Value,
        right: &Value,
        key: &str,
        stack: &mut EqualStack,
    ) -> Result<bool> {
        self.kind.equal(left, right, key, stack)
    }

    /// Change detection used by `set`: descriptor equality on a fresh stack.
    /// Values whose equality is undefined (opaque values without a hook) only
    /// count as the same when they are the same instance.
    pub(crate) fn is_same(&self, left: &Value, right: &Value, key: &str) -> bool {
        self.equal(left, right, key, &mut EqualStack::new())
            .unwrap_or(false)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("type", &self.type_name())
            .field("required", &self.required)
            .field("primary", &self.primary)
            .field("const", &self.constant)
            .finish()
    }
}

/// Shorthand for the coercion failure of a kind
pub(crate) fn invalid(key: &str, expected: impl Into<String>, value: &Value) -> ModelError {
    ModelError::InvalidValue {
        key: key.to_string(),
        expected: expected.into(),
        value: value.render(),
    }
}

/// Element descriptor of a container description, `*` when none was given
pub(crate) fn element_description(description: &Description) -> Description {
    description
        .element
        .as_deref()
        .cloned()
        .unwrap_or_else(Description::any)
}
