//! Model types: named record schemas with hooks and optional inheritance

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::registry;
use crate::schema::{fields_from_json, Description, Fields, Schema};
use crate::value::{Map, Value};

use super::{Data, Model};

/// Cross-field adjustment run on the draft before change detection
pub type ModelPrepareHook = Arc<dyn Fn(&mut Map) -> Result<()> + Send + Sync>;
/// Whole-record validation run on the frozen draft before commit
pub type ModelValidateHook = Arc<dyn Fn(&Data) -> Result<()> + Send + Sync>;

type FieldsFactory = Arc<dyn Fn() -> Fields + Send + Sync>;

struct ModelTypeInner {
    name: String,
    extends: Option<ModelType>,
    data: Option<FieldsFactory>,
    prepare: Option<ModelPrepareHook>,
    validate: Option<ModelValidateHook>,
    schema: OnceLock<Arc<Schema>>,
}

/// A record type. Cheap to clone; identity is the shared allocation.
///
/// The schema is derived on first use and cached for the life of the type.
#[derive(Clone)]
pub struct ModelType(Arc<ModelTypeInner>);

impl ModelType {
    pub fn builder(name: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            name: name.into(),
            extends: None,
            data: None,
            prepare: None,
            validate: None,
        }
    }

    /// Model type whose schema is declared as JSON
    pub fn from_json(name: impl Into<String>, schema: &Json) -> Result<Self> {
        Ok(Self::builder(name).json_schema(schema)?.build())
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn base(&self) -> Option<&ModelType> {
        self.0.extends.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether this type is `other` or inherits from it
    pub fn is_a(&self, other: &ModelType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.ptr_eq(other) {
                return true;
            }
            current = ty.base();
        }
        false
    }

    /// Raw field declarations: the base type's fields overlaid with this type's
    pub fn fields(&self) -> Result<Fields> {
        let inherited = match &self.0.extends {
            Some(base) => Some(base.fields()?),
            None => None,
        };
        match (&self.0.data, inherited) {
            (None, None) => Err(ModelError::SchemaNotDeclared {
                model: self.0.name.clone(),
            }),
            (None, Some(fields)) => Ok(fields),
            (Some(data), inherited) => {
                let mut fields = inherited.unwrap_or_default();
                fields.extend(data());
                Ok(fields)
            }
        }
    }

    /// Resolved schema, derived once and cached
    pub fn schema(&self) -> Result<Arc<Schema>> {
        if let Some(schema) = self.0.schema.get() {
            return Ok(Arc::clone(schema));
        }
        let schema = Schema::resolve(&self.0.name, self.fields()?, &registry::snapshot())?;
        tracing::debug!(model = %self.0.name, fields = schema.len(), "resolved schema");
        Ok(Arc::clone(self.0.schema.get_or_init(|| Arc::new(schema))))
    }

    pub fn primary_key(&self) -> Result<Option<String>> {
        Ok(self.schema()?.primary_key().map(str::to_string))
    }

    /// Construct a record of this type
    pub fn create(&self, input: impl Into<Value>) -> Result<Model> {
        Model::new(self, input)
    }

    /// Union of this type and `others`, tried in that order
    pub fn or(&self, others: &[&ModelType]) -> Description {
        Description::or(
            std::iter::once(self)
                .chain(others.iter().copied())
                .map(Description::model),
        )
    }

    pub(crate) fn prepare_hook(&self) -> Option<&ModelPrepareHook> {
        self.0
            .prepare
            .as_ref()
            .or_else(|| self.base().and_then(ModelType::prepare_hook))
    }

    pub(crate) fn validate_hook(&self) -> Option<&ModelValidateHook> {
        self.0
            .validate
            .as_ref()
            .or_else(|| self.base().and_then(ModelType::validate_hook))
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.0.name)
            .field("extends", &self.0.extends.as_ref().map(ModelType::name))
            .finish()
    }
}

pub struct ModelTypeBuilder {
    name: String,
    extends: Option<ModelType>,
    data: Option<FieldsFactory>,
    prepare: Option<ModelPrepareHook>,
    validate: Option<ModelValidateHook>,
}

impl ModelTypeBuilder {
    /// Inherit `base`'s fields and hooks; subtype instances are accepted
    /// wherever `base` is expected.
    pub fn extends(mut self, base: &ModelType) -> Self {
        self.extends = Some(base.clone());
        self
    }

    /// Schema factory, called once when the schema is first needed. Being
    /// lazy, it may reference the type being declared.
    pub fn data<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Fields + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(factory));
        self
    }

    /// Fixed field declarations
    pub fn fields(self, fields: Fields) -> Self {
        self.data(move || fields.clone())
    }

    /// Field declarations parsed from a JSON object
    pub fn json_schema(self, schema: &Json) -> Result<Self> {
        Ok(self.fields(fields_from_json(schema)?))
    }

    pub fn prepare<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Map) -> Result<()> + Send + Sync + 'static,
    {
        self.prepare = Some(Arc::new(hook));
        self
    }

    pub fn validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Data) -> Result<()> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> ModelType {
        ModelType(Arc::new(ModelTypeInner {
            name: self.name,
            extends: self.extends,
            data: self.data,
            prepare: self.prepare,
            validate: self.validate,
            schema: OnceLock::new(),
        }))
    }
}

/// Build `Fields` from `(name, description)` pairs
pub fn fields<K, D>(entries: impl IntoIterator<Item = (K, D)>) -> Fields
where
    K: Into<String>,
    D: Into<Description>,
{
    entries
        .into_iter()
        .map(|(k, d)| (k.into(), d.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_schema_is_an_error() {
        let ty = ModelType::builder("Empty").build();
        let err = ty.schema().unwrap_err();
        assert!(matches!(err, ModelError::SchemaNotDeclared { model } if model == "Empty"));
    }

    #[test]
    fn test_schema_is_cached() {
        let ty = ModelType::builder("User")
            .data(|| fields([("name", "string")]))
            .build();
        let first = ty.schema().unwrap();
        let second = ty.schema().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_subtype_inherits_and_overrides_fields() {
        let base = ModelType::builder("Base")
            .data(|| {
                fields([
                    ("id", Description::tag("number").primary()),
                    ("name", "string".into()),
                ])
            })
            .build();
        let sub = ModelType::builder("Sub")
            .extends(&base)
            .data(|| {
                fields([
                    ("name", Description::tag("string").required()),
                    ("age", "number".into()),
                ])
            })
            .build();

        let schema = sub.schema().unwrap();
        assert_eq!(schema.len(), 3);
        assert!(schema.field("name").unwrap().is_required());
        assert_eq!(schema.primary_key(), Some("id"));
        assert!(sub.is_a(&base));
        assert!(!base.is_a(&sub));
    }

    #[test]
    fn test_duplicate_primary_key() {
        let ty = ModelType::builder("Twice")
            .data(|| {
                fields([
                    ("a", Description::tag("number").primary()),
                    ("b", Description::tag("number").primary()),
                ])
            })
            .build();
        assert!(matches!(ty.schema(), Err(ModelError::DuplicatePrimaryKey { .. })));
    }

    #[test]
    fn test_from_json_schema() {
        let ty = ModelType::from_json(
            "Product",
            &json!({"sku": {"type": "string", "primary": true}, "tags": ["string"]}),
        )
        .unwrap();
        assert_eq!(ty.primary_key().unwrap(), Some("sku".to_string()));
    }
}
