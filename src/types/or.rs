//! `or` type: the first member type that accepts the value wins

use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::{Description, TypeRef};
use crate::value::Value;

use super::{Descriptor, FieldKind};

pub struct OrType;

struct OrKind {
    variants: Vec<Arc<Descriptor>>,
}

impl TypeFactory for OrType {
    fn tag(&self) -> &str {
        "or"
    }

    fn prepare_description(&self, description: &mut Description) {
        if let TypeRef::Or(variants) = &description.ty {
            description.variants = variants.clone();
            description.ty = TypeRef::Tag("or".to_string());
        }
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        registry: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        if description.variants.is_empty() {
            return Err(ModelError::InvalidDescription {
                key: key.to_string(),
                reason: "\"or\" needs at least one type".to_string(),
            });
        }
        let variants = description
            .variants
            .iter()
            .map(|variant| registry.resolve(variant.clone(), key))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(OrKind { variants }))
    }
}

// Equality, projection and cloning stay shape-generic: which branch accepted
// a value is not remembered after preparation.
impl FieldKind for OrKind {
    fn type_name(&self) -> String {
        self.variants
            .iter()
            .map(|variant| variant.type_name())
            .collect::<Vec<_>>()
            .join(" or ")
    }

    fn prepare(&self, value: Value, key: &str, owner: &Model) -> Result<Value> {
        for variant in &self.variants {
            if let Ok(prepared) = variant.prepare(value.clone(), key, owner) {
                return Ok(prepared);
            }
        }
        Err(ModelError::InvalidValue {
            key: key.to_string(),
            expected: self.type_name(),
            value: value.render(),
        })
    }
}
