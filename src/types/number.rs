//! `number` type

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::Description;
use crate::value::{parse_number, Value};

use super::{invalid, FieldKind};

pub struct NumberType;

/// Digits beyond this exceed what an `f64` can carry
const MAX_PRECISION: u32 = 15;

#[derive(Debug, Clone, Copy)]
enum Rounding {
    Round(u32),
    Floor(u32),
    Ceil(u32),
}

impl Rounding {
    /// Scale by 10^precision, apply, scale back. Rounding is half-up, so the
    /// result follows binary floating point: 1.005 rounds to 1 at precision 2.
    fn apply(self, n: f64) -> f64 {
        let (precision, op): (u32, fn(f64) -> f64) = match self {
            Self::Round(p) => (p, |x| (x + 0.5).floor()),
            Self::Floor(p) => (p, f64::floor),
            Self::Ceil(p) => (p, f64::ceil),
        };
        let scale = 10f64.powi(precision.min(MAX_PRECISION) as i32);
        let rounded = op(n * scale) / scale;
        if rounded.is_finite() {
            rounded
        } else {
            n
        }
    }

    fn precision(self) -> u32 {
        match self {
            Self::Round(p) | Self::Floor(p) | Self::Ceil(p) => p,
        }
    }
}

struct NumberKind {
    rounding: Option<Rounding>,
    null_as_zero: bool,
    zero_as_null: bool,
}

impl TypeFactory for NumberType {
    fn tag(&self) -> &str {
        "number"
    }

    fn create(
        &self,
        description: &Description,
        key: &str,
        _: &TypeRegistry,
    ) -> Result<Box<dyn FieldKind>> {
        let m = &description.modifiers;
        if m.null_as_zero && m.zero_as_null {
            return Err(ModelError::ConflictingModifiers {
                key: key.to_string(),
                first: "nullAsZero",
                second: "zeroAsNull",
            });
        }

        let candidates = [
            ("round", m.round.map(Rounding::Round)),
            ("floor", m.floor.map(Rounding::Floor)),
            ("ceil", m.ceil.map(Rounding::Ceil)),
        ];
        let mut chosen: Option<(&'static str, Rounding)> = None;
        for (name, rounding) in candidates {
            let Some(rounding) = rounding else { continue };
            if let Some((first, _)) = chosen {
                return Err(ModelError::ConflictingModifiers {
                    key: key.to_string(),
                    first,
                    second: name,
                });
            }
            if rounding.precision() > MAX_PRECISION {
                return Err(ModelError::InvalidDescription {
                    key: key.to_string(),
                    reason: format!("{name} precision must be at most {MAX_PRECISION}"),
                });
            }
            chosen = Some((name, rounding));
        }

        Ok(Box::new(NumberKind {
            rounding: chosen.map(|(_, r)| r),
            null_as_zero: m.null_as_zero,
            zero_as_null: m.zero_as_null,
        }))
    }
}

impl FieldKind for NumberKind {
    fn type_name(&self) -> String {
        "number".to_string()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        let number = match &value {
            Value::Null => {
                return Ok(if self.null_as_zero {
                    Value::Number(0.0)
                } else {
                    Value::Null
                })
            }
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s),
            Value::Date(d) => Some(d.timestamp_millis() as f64),
            _ => None,
        };

        let Some(mut number) = number.filter(|n| n.is_finite()) else {
            return Err(invalid(key, "number", &value));
        };

        if let Some(rounding) = self.rounding {
            number = rounding.apply(number);
        }
        if self.zero_as_null && number == 0.0 {
            return Ok(Value::Null);
        }
        Ok(Value::Number(number))
    }
}
