//! `boolean` type

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::Description;
use crate::value::Value;

use super::{invalid, FieldKind};

pub struct BooleanType;

struct BooleanKind {
    null_as_false: bool,
    false_as_null: bool,
}

impl TypeFactory for BooleanType {
    fn tag(&self) -> &str {
        "boolean"
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        _: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let m = &description.modifiers;
        if m.null_as_false && m.false_as_null {
            return Err(ModelError::ConflictingModifiers {
                key: key.to_string(),
                first: "nullAsFalse",
                second: "falseAsNull",
            });
        }
        Ok(Box::new(BooleanKind {
            null_as_false: m.null_as_false,
            false_as_null: m.false_as_null,
        }))
    }
}

impl FieldKind for BooleanKind {
    fn type_name(&self) -> String {
        "boolean".to_string()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        let flag = match &value {
            Value::Null => {
                return Ok(if self.null_as_false {
                    Value::Bool(false)
                } else {
                    Value::Null
                })
            }
            Value::Bool(b) => *b,
            Value::Number(n) if !n.is_nan() => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => return Err(invalid(key, "boolean", &value)),
        };

        if self.false_as_null && !flag {
            return Ok(Value::Null);
        }
        Ok(Value::Bool(flag))
    }
}
