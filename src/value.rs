//! Dynamic field values
//!
//! `Value` is the single currency flowing through descriptors: raw input, prepared
//! field data and snapshot contents are all `Value`s. Compound variants are held
//! behind `Arc`, so a prepared array or object can never be mutated after the fact.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::collection::Collection;
use crate::config;
use crate::model::Model;

/// Ordered string-keyed map used for objects, drafts and snapshots
pub type Map = IndexMap<String, Value>;

/// A dynamically typed field value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Arc<[Value]>),
    Object(Arc<Map>),
    Model(Model),
    Collection(Collection),
    Custom(CustomValue),
}

impl Value {
    /// Build a frozen array value
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(items.into_iter().collect::<Vec<_>>().into())
    }

    /// Build a frozen object value
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<[Value]>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Map>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomValue> {
        match self {
            Self::Custom(custom) => Some(custom),
            _ => None,
        }
    }

    /// Short name of the value's shape, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Model(_) => "model",
            Self::Collection(_) => "collection",
            Self::Custom(_) => "custom",
        }
    }

    /// Pointer identity of compound values
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Self::Array(items) => Some(Arc::as_ptr(items) as *const () as usize),
            Self::Object(map) => Some(Arc::as_ptr(map) as *const () as usize),
            Self::Model(model) => Some(model.identity()),
            Self::Collection(collection) => Some(collection.identity()),
            Self::Custom(custom) => Some(custom.identity()),
            _ => None,
        }
    }

    /// Numeric cast used by loose comparisons (`null` is 0, booleans are 0/1)
    pub(crate) fn loose_number(&self) -> Option<f64> {
        match self {
            Self::Null => Some(0.0),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) => Some(*n),
            Self::String(s) => parse_number(s),
            Self::Date(d) => Some(d.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// String coercion (`"" + value`)
    pub(crate) fn loose_string(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Date(d) => format_date(d),
            Self::Array(items) => items
                .iter()
                .map(|item| if item.is_null() { String::new() } else { item.loose_string() })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Model(model) => format!("[object {}]", model.model_type().name()),
            Self::Collection(collection) => {
                format!("[object {}]", collection.collection_type().name())
            }
            Self::Custom(custom) => format!("[object {}]", custom.type_name()),
        }
    }

    /// Best-effort JSON projection, never failing: cycles and opaque values
    /// fall back to their string coercion.
    pub fn to_json_lossy(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Json::String(s.clone()),
            Self::Date(d) => Json::String(format_date(d)),
            Self::Array(items) => Json::Array(items.iter().map(Value::to_json_lossy).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                    .collect(),
            ),
            Self::Model(model) => model
                .to_json()
                .unwrap_or_else(|_| Json::String(self.loose_string())),
            Self::Collection(collection) => collection
                .to_json()
                .unwrap_or_else(|_| Json::String(self.loose_string())),
            Self::Custom(_) => Json::String(self.loose_string()),
        }
    }

    /// Bounded human-readable rendering used in error messages
    pub fn render(&self) -> String {
        let max = config::current().errors.max_value_length;
        match self {
            Self::String(s) => format!("\"{}\"", truncate(s, max)),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::Date(_) => {
                truncate(&self.loose_string(), max)
            }
            Self::Custom(_) => self.loose_string(),
            _ => match serde_json::to_string(&self.to_json_lossy()) {
                Ok(json) => truncate(&json, max),
                Err(_) => self.loose_string(),
            },
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Parse a numeric string the way a numeric cast does: surrounding whitespace is
/// ignored, a blank string is zero, `0x` prefixes are hexadecimal.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    // Rust accepts "inf"/"nan" spellings a numeric cast would not
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Render a number the way a string cast does (`1`, not `1.0`)
pub(crate) fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{n}")
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Integral values project as JSON integers, others as floats
pub(crate) fn number_to_json(n: f64) -> Json {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Json::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// Loose ordering: strings compare lexicographically, everything else through a
/// numeric cast; incomparable pairs (NaN, objects) are treated as equal.
pub fn loose_cmp(a: &Value, b: &Value) -> Ordering {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return x.cmp(y);
    }
    match (a.loose_number(), b.loose_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a.timestamp_millis() == b.timestamp_millis(),
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            (Self::Custom(a), Self::Custom(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Date(d) => write!(f, "Date({})", format_date(d)),
            Self::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Self::Model(model) => write!(f, "Model({})", model.model_type().name()),
            Self::Collection(c) => write!(f, "Collection({})", c.collection_type().name()),
            Self::Custom(custom) => write!(f, "Custom({})", custom.type_name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Self::Number(n as f64)
            }
        })*
    };
}

number_from!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::array(items.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Object(Arc::new(map))
    }
}

impl From<Model> for Value {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<&Model> for Value {
    fn from(model: &Model) -> Self {
        Self::Model(model.clone())
    }
}

impl From<Collection> for Value {
    fn from(collection: Collection) -> Self {
        Self::Collection(collection)
    }
}

impl From<CustomValue> for Value {
    fn from(custom: CustomValue) -> Self {
        Self::Custom(custom)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::array(items.into_iter().map(Value::from)),
            Json::Object(map) => Self::object(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

// =============================================================================
// Opaque values
// =============================================================================

/// An opaque, type-erased value held by a `custom` field.
///
/// Clone is cheap; identity is the identity of the shared allocation.
#[derive(Clone)]
pub struct CustomValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: short_type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn inner_type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_follows_numeric_cast() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number(""), Some(0.0));
        assert_eq!(parse_number("0x10"), Some(16.0));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_format_number_drops_trailing_zero() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
    }

    #[test]
    fn test_from_json_builds_frozen_compounds() {
        let value = Value::from(json!({"a": [1, "2"], "b": null}));
        let map = value.as_object().unwrap();
        assert_eq!(map["a"], Value::from(vec![Value::from(1), Value::from("2")]));
        assert!(map["b"].is_null());
    }

    #[test]
    fn test_render_truncates_long_strings() {
        let long = "x".repeat(80);
        let rendered = Value::from(long).render();
        assert!(rendered.ends_with("...\""));
        assert!(rendered.len() < 60);
    }

    #[test]
    fn test_render_objects_as_compact_json() {
        let value = Value::from(json!({"a": 1}));
        assert_eq!(value.render(), r#"{"a":1}"#);
    }

    #[test]
    fn test_loose_cmp_mixed_types() {
        assert_eq!(loose_cmp(&Value::from("b"), &Value::from("a")), Ordering::Greater);
        assert_eq!(loose_cmp(&Value::from(10), &Value::from("9")), Ordering::Greater);
        assert_eq!(loose_cmp(&Value::from("x"), &Value::from(1)), Ordering::Equal);
    }

    #[test]
    fn test_custom_value_identity() {
        let a = CustomValue::new(5u8);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&CustomValue::new(5u8)));
        assert_eq!(a.downcast_ref::<u8>(), Some(&5));
        assert_eq!(a.type_name(), "u8");
    }
}
