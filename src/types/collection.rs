//! `collection` type: a nested collection

use crate::collection::{Collection, CollectionType};
use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::{Description, TypeRef};
use crate::value::Value;

use super::{invalid, FieldKind};

pub struct CollectionRefType;

struct CollectionKind {
    collection: CollectionType,
}

impl TypeFactory for CollectionRefType {
    fn tag(&self) -> &str {
        "collection"
    }

    fn prepare_description(&self, description: &mut Description) {
        if let TypeRef::Collection(collection) = &description.ty {
            description.collection = Some(collection.clone());
            description.ty = TypeRef::Tag("collection".to_string());
        }
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        _: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let collection = description
            .collection
            .clone()
            .ok_or_else(|| ModelError::InvalidDescription {
                key: key.to_string(),
                reason: "collection type is not set".to_string(),
            })?;
        Ok(Box::new(CollectionKind { collection }))
    }
}

impl FieldKind for CollectionKind {
    fn type_name(&self) -> String {
        self.collection.name().to_string()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        match &value {
            Value::Null => Ok(Value::Null),
            Value::Collection(collection)
                if collection.collection_type().is_a(&self.collection) =>
            {
                Ok(value)
            }
            Value::Array(items) => Collection::new(&self.collection, items.iter().cloned())
                .map(Value::Collection)
                .map_err(|source| ModelError::InvalidModel {
                    key: key.to_string(),
                    source: Box::new(source),
                }),
            _ => Err(invalid(key, self.type_name(), &value)),
        }
    }
}
