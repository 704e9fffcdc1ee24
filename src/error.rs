//! Error types for the model engine

use thiserror::Error;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model engine errors
///
/// Every validation or coercion failure is raised at the point of detection.
/// Wrapping variants (`InvalidArrayElement`, `InvalidObjectElement`, `InvalidModel`)
/// only add positional context to the child error they carry.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown property: {key}")]
    UnknownProperty { key: String },

    #[error("unknown type \"{tag}\" for field {key}")]
    UnknownType { key: String, tag: String },

    #[error("required field {key} is missing")]
    Required { key: String },

    #[error("cannot assign new value to const field {key}")]
    ConstValue { key: String },

    #[error("invalid {expected} for field {key}: {value}")]
    InvalidValue {
        key: String,
        expected: String,
        value: String,
    },

    #[error("invalid element for array {key} at index {index}: {source}")]
    InvalidArrayElement {
        key: String,
        index: usize,
        #[source]
        source: Box<ModelError>,
    },

    #[error("invalid element for object {key} at key \"{element}\": {source}")]
    InvalidObjectElement {
        key: String,
        element: String,
        #[source]
        source: Box<ModelError>,
    },

    #[error("invalid model for field {key}: {source}")]
    InvalidModel {
        key: String,
        #[source]
        source: Box<ModelError>,
    },

    #[error("invalid key \"{key}\" for field {field}")]
    InvalidKey { field: String, key: String },

    #[error("{key} must contain unique items, duplicate: {value}")]
    NotUnique { key: String, value: String },

    #[error("value {value} for field {key} is not one of the allowed values")]
    NotInEnum { key: String, value: String },

    #[error("invalid element for collection {collection}: {value}")]
    InvalidCollectionElement { collection: String, value: String },

    #[error("cannot convert circular structure to JSON (field {key})")]
    CircularStructure { key: String },

    #[error("{class} has no toJSON method (field {key})")]
    NoToJsonMethod { key: String, class: String },

    #[error("{class} has no clone method (field {key})")]
    NoCloneMethod { key: String, class: String },

    #[error("{class} has no equal method (field {key})")]
    NoEqualMethod { key: String, class: String },

    #[error("field name \"{key}\" is reserved and cannot be the primary key")]
    ReservedPrimaryKey { key: String },

    #[error("{model} declares more than one primary key: {first}, {second}")]
    DuplicatePrimaryKey {
        model: String,
        first: String,
        second: String,
    },

    #[error("model {model} does not declare a data schema")]
    SchemaNotDeclared { model: String },

    #[error("invalid description for field {key}: {reason}")]
    InvalidDescription { key: String, reason: String },

    #[error("field {key} cannot use both {first} and {second}")]
    ConflictingModifiers {
        key: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("{message}")]
    Custom { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ModelError {
    /// Error raised from a user `validate` or `prepare` hook
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// Re-annotate a descriptor construction failure with the owning field name
    pub(crate) fn for_field(self, key: &str) -> Self {
        match self {
            Self::InvalidDescription { reason, .. } => Self::InvalidDescription {
                key: key.to_string(),
                reason,
            },
            Self::UnknownType { tag, .. } => Self::UnknownType {
                key: key.to_string(),
                tag,
            },
            Self::ConflictingModifiers { first, second, .. } => Self::ConflictingModifiers {
                key: key.to_string(),
                first,
                second,
            },
            other => Self::InvalidDescription {
                key: key.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Field key carried by this error, when it has one
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnknownProperty { key }
            | Self::UnknownType { key, .. }
            | Self::Required { key }
            | Self::ConstValue { key }
            | Self::InvalidValue { key, .. }
            | Self::InvalidArrayElement { key, .. }
            | Self::InvalidObjectElement { key, .. }
            | Self::InvalidModel { key, .. }
            | Self::NotUnique { key, .. }
            | Self::NotInEnum { key, .. }
            | Self::CircularStructure { key }
            | Self::NoToJsonMethod { key, .. }
            | Self::NoCloneMethod { key, .. }
            | Self::NoEqualMethod { key, .. }
            | Self::ReservedPrimaryKey { key }
            | Self::InvalidDescription { key, .. }
            | Self::ConflictingModifiers { key, .. } => Some(key),
            Self::InvalidKey { field, .. } => Some(field),
            _ => None,
        }
    }
}
