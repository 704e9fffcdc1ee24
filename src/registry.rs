//! Type Registry
//!
//! Maps type tags to the factories that build field descriptors. Resolution is
//! two-pass: every registered factory first gets a chance, in registration
//! order, to canonicalize the raw description (shorthand such as `[elem]` or a
//! bare model reference), then the factory owning the canonical tag builds
//! the descriptor.

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::error::{ModelError, Result};
use crate::schema::{Description, TypeRef, RESERVED_PRIMARY_KEYS};
use crate::types::{
    AnyType, ArrayType, BooleanType, CollectionRefType, CustomClassType, DateType, Descriptor,
    FieldKind, ModelRefType, NumberType, ObjectType, OrType, StringType,
};

static GLOBAL: LazyLock<RwLock<TypeRegistry>> =
    LazyLock::new(|| RwLock::new(TypeRegistry::with_builtins()));

/// Builds the kind behind one type tag
pub trait TypeFactory: Send + Sync {
    /// Canonical tag this factory constructs
    fn tag(&self) -> &str;

    /// Rewrite shorthand this factory owns into the canonical shape
    fn prepare_description(&self, _description: &mut Description) {}

    /// Build the kind for a canonical description of this factory's tag
    fn create(
        &self,
        description: &Description,
        key: &str,
        registry: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>>;
}

/// Ordered set of type factories
#[derive(Clone, Default)]
pub struct TypeRegistry {
    factories: Vec<Arc<dyn TypeFactory>>,
}

impl TypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in type, in canonicalization order
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(AnyType);
        registry.register(BooleanType);
        registry.register(NumberType);
        registry.register(StringType);
        registry.register(DateType);
        registry.register(ArrayType);
        registry.register(ObjectType);
        registry.register(ModelRefType);
        registry.register(CollectionRefType);
        registry.register(CustomClassType);
        registry.register(OrType);
        registry
    }

    /// Add a factory; a factory with the same tag is replaced in place
    pub fn register(&mut self, factory: impl TypeFactory + 'static) {
        let factory: Arc<dyn TypeFactory> = Arc::new(factory);
        match self.factories.iter().position(|f| f.tag() == factory.tag()) {
            Some(pos) => self.factories[pos] = factory,
            None => self.factories.push(factory),
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.factories.iter().map(|f| f.tag().to_string()).collect()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.iter().any(|f| f.tag() == tag)
    }

    /// Resolve a raw description for field `key` into a frozen descriptor
    pub fn resolve(&self, mut description: Description, key: &str) -> Result<Arc<Descriptor>> {
        for factory in &self.factories {
            factory.prepare_description(&mut description);
        }

        let tag = match &description.ty {
            TypeRef::Tag(tag) => tag.clone(),
            other => {
                return Err(ModelError::UnknownType {
                    key: key.to_string(),
                    tag: format!("{other:?}"),
                })
            }
        };

        let factory = self
            .factories
            .iter()
            .find(|f| f.tag() == tag)
            .ok_or_else(|| ModelError::UnknownType {
                key: key.to_string(),
                tag: tag.clone(),
            })?;

        if description.primary && RESERVED_PRIMARY_KEYS.contains(&key) {
            return Err(ModelError::ReservedPrimaryKey {
                key: key.to_string(),
            });
        }

        let kind = factory
            .create(&description, key, self)
            .map_err(|e| e.for_field(key))?;

        Ok(Arc::new(Descriptor::new(tag, &description, kind)))
    }
}

/// Register a type factory in the process-wide registry (`registerType`)
pub fn register_type(factory: impl TypeFactory + 'static) {
    let tag = factory.tag().to_string();
    GLOBAL.write().register(factory);
    tracing::debug!(tag = %tag, "registered field type");
}

/// Resolve a description against the process-wide registry
pub fn resolve(description: Description, key: &str) -> Result<Arc<Descriptor>> {
    snapshot().resolve(description, key)
}

/// Tags of every type in the process-wide registry, in registration order
pub fn type_tags() -> Vec<String> {
    GLOBAL.read().tags()
}

/// Copy of the process-wide registry; resolution runs against the copy so
/// factories may resolve nested descriptions without holding the lock.
pub(crate) fn snapshot() -> TypeRegistry {
    GLOBAL.read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_builtin_tags_in_order() {
        let tags = TypeRegistry::with_builtins().tags();
        assert_eq!(
            tags,
            vec![
                "*", "boolean", "number", "string", "date", "array", "object", "model",
                "collection", "custom", "or"
            ]
        );
    }

    #[test]
    fn test_unknown_tag() {
        let registry = TypeRegistry::with_builtins();
        let err = registry.resolve(Description::tag("money"), "price").unwrap_err();
        assert!(matches!(
            err,
            ModelError::UnknownType { key, tag } if key == "price" && tag == "money"
        ));
    }

    #[test]
    fn test_reserved_primary_key() {
        let registry = TypeRegistry::with_builtins();
        let err = registry
            .resolve(Description::tag("string").primary(), "data")
            .unwrap_err();
        assert!(matches!(err, ModelError::ReservedPrimaryKey { .. }));
    }

    #[test]
    fn test_list_shorthand_resolves_to_array() {
        let registry = TypeRegistry::with_builtins();
        let descriptor = registry.resolve(Description::list("number"), "ids").unwrap();
        assert_eq!(descriptor.type_tag(), "array");
        assert_eq!(descriptor.type_name(), "array of number");
    }

    #[test]
    fn test_any_alias() {
        let registry = TypeRegistry::with_builtins();
        let descriptor = registry.resolve(Description::tag("any"), "x").unwrap();
        assert_eq!(descriptor.type_tag(), "*");
    }

    #[test]
    fn test_conflicting_modifiers_annotated_with_field() {
        let registry = TypeRegistry::with_builtins();
        let err = registry
            .resolve(Description::tag("number").null_as_zero().zero_as_null(), "qty")
            .unwrap_err();
        assert!(matches!(err, ModelError::ConflictingModifiers { key, .. } if key == "qty"));
    }

    struct UpperType;

    impl TypeFactory for UpperType {
        fn tag(&self) -> &str {
            "upper"
        }

        fn create(
            &self,
            _description: &Description,
            _key: &str,
            _registry: &TypeRegistry,
        ) -> Result<Box<dyn FieldKind>> {
            Ok(Box::new(UpperKind))
        }
    }

    struct UpperKind;

    impl FieldKind for UpperKind {
        fn type_name(&self) -> String {
            "upper".to_string()
        }

        fn prepare(&self, value: Value, _key: &str, _owner: &crate::model::Model) -> Result<Value> {
            Ok(match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            })
        }
    }

    #[test]
    fn test_register_custom_factory() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(UpperType);
        assert!(registry.contains("upper"));
        let descriptor = registry.resolve(Description::tag("upper"), "code").unwrap();
        assert_eq!(descriptor.type_name(), "upper");
    }
}
