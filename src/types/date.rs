//! `date` type

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::Result;
use crate::model::Model;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::schema::Description;
use crate::stack::EqualStack;
use crate::value::Value;

use super::{invalid, FieldKind};

pub struct DateType;

struct DateKind;

impl TypeFactory for DateType {
    fn tag(&self) -> &str {
        "date"
    }

    fn create(&self, _: &Description, _: &str, _: &TypeRegistry) -> Result<Box<dyn FieldKind>> {
        Ok(Box::new(DateKind))
    }
}

/// RFC 3339, then naive date-times (read as UTC), then plain dates
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl FieldKind for DateKind {
    fn type_name(&self) -> String {
        "date".to_string()
    }

    fn prepare(&self, value: Value, key: &str, _owner: &Model) -> Result<Value> {
        let date = match &value {
            Value::Null => return Ok(Value::Null),
            Value::Date(d) => Some(*d),
            Value::Number(n) if n.is_finite() => DateTime::from_timestamp_millis(*n as i64),
            Value::String(s) => parse_date(s),
            _ => None,
        };
        date.map(Value::Date)
            .ok_or_else(|| invalid(key, "date", &value))
    }

    fn equal(
        &self,
        left: &Value,
        right: &Value,
        _key: &str,
        _stack: &mut EqualStack,
    ) -> Result<bool> {
        Ok(match (left, right) {
            (Value::Date(a), Value::Date(b)) => a.timestamp_millis() == b.timestamp_millis(),
            (Value::Null, Value::Null) => true,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let iso = parse_date("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(iso.timestamp_millis(), 1_709_287_200_000);
        assert_eq!(parse_date("2024-03-01T10:00:00.000").unwrap(), iso);
        assert_eq!(parse_date("2024-03-01").unwrap().timestamp_millis(), 1_709_251_200_000);
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("2024-13-01").is_none());
    }
}
