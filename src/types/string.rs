//! `string` type

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::Description;
use crate::value::{format_date, format_number, Value};

use super::{invalid, FieldKind};

pub struct StringType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    Keep,
    Lower,
    Upper,
}

struct StringKind {
    trim: bool,
    case: Case,
    empty_as_null: bool,
    null_as_empty: bool,
}

impl TypeFactory for StringType {
    fn tag(&self) -> &str {
        "string"
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        _: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let m = &description.modifiers;
        let conflict = |first, second| ModelError::ConflictingModifiers {
            key: key.to_string(),
            first,
            second,
        };
        if m.lower && m.upper {
            return Err(conflict("lower", "upper"));
        }
        if m.empty_as_null && m.null_as_empty {
            return Err(conflict("emptyAsNull", "nullAsEmpty"));
        }

        let case = if m.lower {
            Case::Lower
        } else if m.upper {
            Case::Upper
        } else {
            Case::Keep
        };
        Ok(Box::new(StringKind {
            trim: m.trim,
            case,
            empty_as_null: m.empty_as_null,
            null_as_empty: m.null_as_empty,
        }))
    }
}

impl FieldKind for StringKind {
    fn type_name(&self) -> String {
        "string".to_string()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        let mut text = match &value {
            Value::Null => {
                return Ok(if self.null_as_empty {
                    Value::String(String::new())
                } else {
                    Value::Null
                })
            }
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_finite() => format_number(*n),
            Value::Date(d) => format_date(d),
            _ => return Err(invalid(key, "string", &value)),
        };

        if self.trim {
            text = text.trim().to_string();
        }
        match self.case {
            Case::Lower => text = text.to_lowercase(),
            Case::Upper => text = text.to_uppercase(),
            Case::Keep => {}
        }
        if self.empty_as_null && text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::String(text))
    }
}
