//! `array` type

use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::{Comparator, Description, TypeRef};
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::{loose_cmp, Value};

use super::{element_description, invalid, Descriptor, FieldKind};

pub struct ArrayType;

enum Sort {
    None,
    Loose,
    By(Comparator),
}

struct ArrayKind {
    element: Arc<Descriptor>,
    sort: Sort,
    unique: bool,
    empty_as_null: bool,
    null_as_empty: bool,
}

impl TypeFactory for ArrayType {
    fn tag(&self) -> &str {
        "array"
    }

    fn prepare_description(&self, description: &mut Description) {
        if let TypeRef::List(element) = &description.ty {
            let element = element.clone();
            description.ty = TypeRef::Tag("array".to_string());
            description.element = Some(element);
        }
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
        let sort = match (&description.sort_by, m.sort) {
            (Some(compare), _) => Sort::By(Arc::clone(compare)),
            (None, true) => Sort::Loose,
            (None, false) => Sort::None,
        };
        Ok(Box::new(ArrayKind {
            element,
            sort,
            unique: m.unique,
            empty_as_null: m.empty_as_null,
            null_as_empty: m.null_as_empty,
        }))
    }
}

impl ArrayKind {
    fn check_unique(&self, items: &[Value], key: &str) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if item.is_null() {
                continue;
            }
            for earlier in &items[..i] {
                if earlier.is_null() {
                    continue;
                }
                if self.element.equal(earlier, item, key, &mut EqualStack::new())? {
                    return Err(ModelError::NotUnique {
                        key: key.to_string(),
                        value: item.render(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FieldKind for ArrayKind {
    fn type_name(&self) -> String {
        format!("array of {}", self.element.type_name())
    }

    fn prepare(&self, value: Value, key: &str, owner: &Model) -> Result<Value> {
        let items = match &value {
            Value::Null => {
                return Ok(if self.null_as_empty {
                    Value::array([])
                } else {
                    Value::Null
                })
            }
            Value::Array(items) => items,
            _ => return Err(invalid(key, self.type_name(), &value)),
        };

        let mut prepared = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let item = self
                .element
                .prepare(item.clone(), key, owner)
                .map_err(|source| ModelError::InvalidArrayElement {
                    key: key.to_string(),
                    index,
                    source: Box::new(source),
                })?;
            prepared.push(item);
        }

        match &self.sort {
            Sort::None => {}
            Sort::Loose => prepared.sort_by(loose_cmp),
            Sort::By(compare) => prepared.sort_by(|a, b| compare(a, b)),
        }
        if self.unique {
            self.check_unique(&prepared, key)?;
        }
        if self.empty_as_null && prepared.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::array(prepared))
    }

    fn to_json(&self, value: &Value, key: &str, stack: &mut JsonStack) -> Result<Json> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.element.to_json(item, key, stack))
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            other => super::any_to_json(other, key, stack),
        }
    }

    fn clone_value(&self, value: &Value, key: &str, stack: &mut CloneStack) -> Result<Value> {
        match value {
            Value::Array(items) => Ok(Value::array(
                items
                    .iter()
                    .map(|item| self.element.clone_value(item, key, stack))
                    .collect::<Result<Vec<_>>>()?,
            )),
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
            (Value::Array(a), Value::Array(b)) => {
                if !stack.enter_values(left, right) {
                    return Ok(true);
                }
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !self.element.equal(x, y, key, stack)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => super::any_equal(left, right, key, stack),
        }
    }
}
