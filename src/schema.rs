//! Field descriptions and resolved schemas
//!
//! A `Description` is what a schema author writes for one field: a type
//! reference plus modifiers and hooks. The registry canonicalizes and resolves
//! it into an immutable `Descriptor`; a `Schema` is the frozen field map of one
//! model type.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as Json;

use crate::collection::CollectionType;
use crate::error::{ModelError, Result};
use crate::model::{Model, ModelType};
use crate::registry::TypeRegistry;
use crate::types::{CustomClass, Descriptor};
use crate::value::Value;

/// Schema key of the wildcard entry governing undeclared field names
pub const WILDCARD: &str = "*";

/// Names that cannot be declared as a primary key: they collide with the
/// record's own surface.
pub const RESERVED_PRIMARY_KEYS: &[&str] = &[
    "data",
    "parent",
    "primaryKey",
    "primaryValue",
    "primary_key",
    "primary_value",
    "models",
    "length",
    "row",
];

/// Field-level prepare hook, run after type coercion
pub type PrepareHook = Arc<dyn Fn(Value, &str, &Model) -> Result<Value> + Send + Sync>;
/// Field-level JSON projection override
pub type ToJsonHook = Arc<dyn Fn(&Value) -> Json + Send + Sync>;
/// Ordering used by sorted arrays
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Raw field declarations of a model type, in declaration order
pub type Fields = IndexMap<String, Description>;

/// A value check: either a predicate or a pattern matched against the
/// value's string form.
#[derive(Clone)]
pub enum Validator {
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
    Pattern(Regex),
}

impl Validator {
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Self::Predicate(f) => f(value),
            Self::Pattern(re) => re.is_match(&value.loose_string()),
        }
    }

    pub fn check_key(&self, key: &str) -> bool {
        match self {
            Self::Predicate(f) => f(&Value::from(key)),
            Self::Pattern(re) => re.is_match(key),
        }
    }

    fn parse(key: &str, json: &Json) -> Result<Self> {
        let pattern = json.as_str().ok_or_else(|| ModelError::InvalidDescription {
            key: key.to_string(),
            reason: format!("validator must be a pattern string, got {json}"),
        })?;
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| ModelError::InvalidDescription {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => write!(f, "Predicate"),
            Self::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
        }
    }
}

/// Default value of a field: a constant or a factory called per record
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Factory(f) => f(),
        }
    }
}

/// What a description says the field holds, before canonicalization
#[derive(Clone)]
pub enum TypeRef {
    /// A registered type tag (`"number"`, `"array"`, `"*"`, ...)
    Tag(String),
    /// Nested record of this type (or a subtype)
    Model(ModelType),
    /// Nested collection of this type
    Collection(CollectionType),
    /// Opaque value of a Rust type
    Custom(CustomClass),
    /// Shorthand for an array of the element description
    List(Box<Description>),
    /// Union of several descriptions, tried in order
    Or(Vec<Description>),
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::Model(m) => write!(f, "model({})", m.name()),
            Self::Collection(c) => write!(f, "collection({})", c.name()),
            Self::Custom(c) => write!(f, "custom({})", c.name()),
            Self::List(inner) => write!(f, "[{:?}]", inner.ty),
            Self::Or(variants) => write!(f, "or({})", variants.len()),
        }
    }
}

/// Type-specific modifiers. Each variant reads the ones that apply to it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Modifiers {
    pub round: Option<u32>,
    pub floor: Option<u32>,
    pub ceil: Option<u32>,
    pub null_as_zero: bool,
    pub zero_as_null: bool,
    pub trim: bool,
    pub lower: bool,
    pub upper: bool,
    pub empty_as_null: bool,
    pub null_as_empty: bool,
    pub null_as_false: bool,
    pub false_as_null: bool,
    pub unique: bool,
    pub sort: bool,
}

/// A raw field description
#[derive(Clone)]
pub struct Description {
    pub(crate) ty: TypeRef,
    pub(crate) required: bool,
    pub(crate) primary: bool,
    pub(crate) constant: bool,
    pub(crate) enum_values: Option<Vec<Value>>,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) prepare: Option<PrepareHook>,
    pub(crate) validate: Option<Validator>,
    pub(crate) to_json: Option<ToJsonHook>,
    pub(crate) key: Option<Validator>,
    pub(crate) element: Option<Box<Description>>,
    pub(crate) model: Option<ModelType>,
    pub(crate) collection: Option<CollectionType>,
    pub(crate) custom: Option<CustomClass>,
    pub(crate) variants: Vec<Description>,
    pub(crate) sort_by: Option<Comparator>,
    pub(crate) modifiers: Modifiers,
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Description")
            .field("ty", &self.ty)
            .field("required", &self.required)
            .field("primary", &self.primary)
            .field("constant", &self.constant)
            .field("modifiers", &self.modifiers)
            .finish_non_exhaustive()
    }
}

impl Description {
    fn with_type(ty: TypeRef) -> Self {
        Self {
            ty,
            required: false,
            primary: false,
            constant: false,
            enum_values: None,
            default: None,
            prepare: None,
            validate: None,
            to_json: None,
            key: None,
            element: None,
            model: None,
            collection: None,
            custom: None,
            variants: Vec::new(),
            sort_by: None,
            modifiers: Modifiers::default(),
        }
    }

    /// Field of a registered type tag
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::with_type(TypeRef::Tag(tag.into()))
    }

    /// Field accepting any value
    pub fn any() -> Self {
        Self::tag(WILDCARD)
    }

    /// Array whose elements follow `element`
    pub fn list(element: impl Into<Description>) -> Self {
        Self::with_type(TypeRef::List(Box::new(element.into())))
    }

    /// Object whose values follow `element`
    pub fn map(element: impl Into<Description>) -> Self {
        Self::tag("object").element(element)
    }

    /// Nested record of `model` (subtypes accepted)
    pub fn model(model: &ModelType) -> Self {
        Self::with_type(TypeRef::Model(model.clone()))
    }

    /// Nested collection of `collection`
    pub fn collection(collection: &CollectionType) -> Self {
        Self::with_type(TypeRef::Collection(collection.clone()))
    }

    /// Opaque value checked by Rust type only
    pub fn custom(class: CustomClass) -> Self {
        Self::with_type(TypeRef::Custom(class))
    }

    /// First of `variants` that accepts the value
    pub fn or(variants: impl IntoIterator<Item = Description>) -> Self {
        Self::with_type(TypeRef::Or(variants.into_iter().collect()))
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.ty
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Value may only be assigned while the record is being constructed
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn enum_values<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    pub fn prepare<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value, &str, &Model) -> Result<Value> + Send + Sync + 'static,
    {
        self.prepare = Some(Arc::new(hook));
        self
    }

    pub fn validate<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Validator::Predicate(Arc::new(check)));
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.validate = Some(Validator::Pattern(pattern));
        self
    }

    pub fn to_json<F>(mut self, project: F) -> Self
    where
        F: Fn(&Value) -> Json + Send + Sync + 'static,
    {
        self.to_json = Some(Arc::new(project));
        self
    }

    /// Key check for wildcard entries
    pub fn key<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.key = Some(Validator::Predicate(Arc::new(check)));
        self
    }

    pub fn key_pattern(mut self, pattern: Regex) -> Self {
        self.key = Some(Validator::Pattern(pattern));
        self
    }

    pub fn element(mut self, element: impl Into<Description>) -> Self {
        self.element = Some(Box::new(element.into()));
        self
    }

    pub fn round(mut self, precision: u32) -> Self {
        self.modifiers.round = Some(precision);
        self
    }

    pub fn floor(mut self, precision: u32) -> Self {
        self.modifiers.floor = Some(precision);
        self
    }

    pub fn ceil(mut self, precision: u32) -> Self {
        self.modifiers.ceil = Some(precision);
        self
    }

    pub fn null_as_zero(mut self) -> Self {
        self.modifiers.null_as_zero = true;
        self
    }

    pub fn zero_as_null(mut self) -> Self {
        self.modifiers.zero_as_null = true;
        self
    }

    pub fn trim(mut self) -> Self {
        self.modifiers.trim = true;
        self
    }

    pub fn lower(mut self) -> Self {
        self.modifiers.lower = true;
        self
    }

    pub fn upper(mut self) -> Self {
        self.modifiers.upper = true;
        self
    }

    pub fn empty_as_null(mut self) -> Self {
        self.modifiers.empty_as_null = true;
        self
    }

    pub fn null_as_empty(mut self) -> Self {
        self.modifiers.null_as_empty = true;
        self
    }

    pub fn null_as_false(mut self) -> Self {
        self.modifiers.null_as_false = true;
        self
    }

    pub fn false_as_null(mut self) -> Self {
        self.modifiers.false_as_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.modifiers.unique = true;
        self
    }

    pub fn sort(mut self) -> Self {
        self.modifiers.sort = true;
        self
    }

    pub fn sort_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        self.sort_by = Some(Arc::new(compare));
        self
    }

    /// Parse a JSON-declared description.
    ///
    /// Accepts a type tag string, a one-element array (array of that element)
    /// or an object with a `type` key plus modifiers.
    pub fn from_json(key: &str, json: &Json) -> Result<Self> {
        match json {
            Json::String(tag) => Ok(Self::tag(tag.clone())),
            Json::Array(items) if items.len() == 1 => {
                Ok(Self::list(Self::from_json(key, &items[0])?))
            }
            Json::Object(map) => {
                let ty = map.get("type").ok_or_else(|| ModelError::InvalidDescription {
                    key: key.to_string(),
                    reason: "missing \"type\"".to_string(),
                })?;
                let mut description = Self::from_json(key, ty)?;
                description.modifiers = serde_json::from_value(json.clone())?;

                let flag = |name: &str| map.get(name).and_then(Json::as_bool).unwrap_or(false);
                description.required = flag("required");
                description.primary = flag("primary");
                description.constant = flag("const");

                if let Some(element) = map.get("element") {
                    description.element = Some(Box::new(Self::from_json(key, element)?));
                }
                if let Some(default) = map.get("default") {
                    description.default = Some(DefaultValue::Value(Value::from(default.clone())));
                }
                if let Some(values) = map.get("enum") {
                    let values = values.as_array().ok_or_else(|| ModelError::InvalidDescription {
                        key: key.to_string(),
                        reason: "\"enum\" must be an array".to_string(),
                    })?;
                    description.enum_values =
                        Some(values.iter().cloned().map(Value::from).collect());
                }
                if let Some(variants) = map.get("or").and_then(Json::as_array) {
                    description.ty = TypeRef::Or(
                        variants
                            .iter()
                            .map(|v| Self::from_json(key, v))
                            .collect::<Result<_>>()?,
                    );
                }
                if let Some(pattern) = map.get("validate") {
                    description.validate = Some(Validator::parse(key, pattern)?);
                }
                if let Some(pattern) = map.get("key") {
                    description.key = Some(Validator::parse(key, pattern)?);
                }
                Ok(description)
            }
            other => Err(ModelError::InvalidDescription {
                key: key.to_string(),
                reason: format!("unsupported description {other}"),
            }),
        }
    }
}

impl From<&str> for Description {
    fn from(tag: &str) -> Self {
        Self::tag(tag)
    }
}

impl From<String> for Description {
    fn from(tag: String) -> Self {
        Self::tag(tag)
    }
}

impl From<&ModelType> for Description {
    fn from(model: &ModelType) -> Self {
        Self::model(model)
    }
}

impl From<ModelType> for Description {
    fn from(model: ModelType) -> Self {
        Self::with_type(TypeRef::Model(model))
    }
}

impl From<&CollectionType> for Description {
    fn from(collection: &CollectionType) -> Self {
        Self::collection(collection)
    }
}

impl From<CustomClass> for Description {
    fn from(class: CustomClass) -> Self {
        Self::custom(class)
    }
}

/// Parse a JSON object of `field -> description` into declared fields
pub fn fields_from_json(json: &Json) -> Result<Fields> {
    let map = json.as_object().ok_or_else(|| ModelError::InvalidDescription {
        key: String::new(),
        reason: "schema must be a JSON object".to_string(),
    })?;
    map.iter()
        .map(|(key, value)| Ok((key.clone(), Description::from_json(key, value)?)))
        .collect()
}

// =============================================================================
// Resolved schema
// =============================================================================

/// Frozen field map of one model type
pub struct Schema {
    fields: IndexMap<String, Arc<Descriptor>>,
    wildcard: Option<Arc<Descriptor>>,
    primary_key: Option<String>,
}

impl Schema {
    /// Resolve every declared field through the registry
    pub fn resolve(model: &str, fields: Fields, registry: &TypeRegistry) -> Result<Self> {
        let mut resolved = IndexMap::new();
        let mut wildcard = None;
        let mut primary_key: Option<String> = None;

        for (key, description) in fields {
            let descriptor = registry.resolve(description, &key)?;
            if key == WILDCARD {
                wildcard = Some(descriptor);
                continue;
            }
            if descriptor.is_primary() {
                if let Some(first) = &primary_key {
                    return Err(ModelError::DuplicatePrimaryKey {
                        model: model.to_string(),
                        first: first.clone(),
                        second: key,
                    });
                }
                primary_key = Some(key.clone());
            }
            resolved.insert(key, descriptor);
        }

        Ok(Self {
            fields: resolved,
            wildcard,
            primary_key,
        })
    }

    pub fn field(&self, key: &str) -> Option<&Arc<Descriptor>> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Arc<Descriptor>)> {
        self.fields.iter()
    }

    pub fn wildcard(&self) -> Option<&Arc<Descriptor>> {
        self.wildcard.as_ref()
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Descriptor governing `key`: the declared field, else the wildcard after
    /// its key check.
    pub fn descriptor_for(&self, key: &str) -> Result<&Arc<Descriptor>> {
        if let Some(descriptor) = self.fields.get(key) {
            return Ok(descriptor);
        }
        match &self.wildcard {
            Some(wildcard) if wildcard.accepts_key(key) => Ok(wildcard),
            Some(_) => Err(ModelError::InvalidKey {
                field: WILDCARD.to_string(),
                key: key.to_string(),
            }),
            None => Err(ModelError::UnknownProperty {
                key: key.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("wildcard", &self.wildcard.is_some())
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_tag_and_list() {
        let d = Description::from_json("a", &json!("number")).unwrap();
        assert!(matches!(d.type_ref(), TypeRef::Tag(t) if t == "number"));

        let d = Description::from_json("a", &json!(["string"])).unwrap();
        match d.type_ref() {
            TypeRef::List(inner) => {
                assert!(matches!(inner.type_ref(), TypeRef::Tag(t) if t == "string"))
            }
            other => panic!("Expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_object_modifiers() {
        let d = Description::from_json(
            "money",
            &json!({"type": "number", "round": 2, "required": true, "nullAsZero": true}),
        )
        .unwrap();
        assert_eq!(d.modifiers().round, Some(2));
        assert!(d.modifiers().null_as_zero);
        assert!(d.required);
    }

    #[test]
    fn test_from_json_rejects_bad_pattern() {
        let err = Description::from_json("code", &json!({"type": "string", "validate": "("}))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidDescription { key, .. } if key == "code"));
    }

    #[test]
    fn test_from_json_requires_type() {
        let err = Description::from_json("x", &json!({"required": true})).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDescription { .. }));
    }

    #[test]
    fn test_fields_from_json_keeps_order() {
        let fields = fields_from_json(&json!({"b": "string", "a": "number", "*": "*"})).unwrap();
        let keys: Vec<_> = fields.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a", "*"]);
    }
}
