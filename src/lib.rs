//! Familiar Models
//!
//! A schema-driven, in-memory record engine. A model type declares its fields
//! once; records of that type hold immutable, validated snapshots that change
//! only through atomic `set` transitions with change notifications.
//!
//! ## Features
//!
//! - **Typed fields**: numbers, strings, booleans, dates, arrays, objects,
//!   nested records, collections, opaque Rust values and unions
//! - **Atomic updates**: a failed `set` never leaves a partial change behind
//! - **Change events**: `change:<key>` and `change` after every commit
//! - **Cyclic graphs**: equality, cloning and JSON projection are cycle-safe
//! - **Collections**: ordered record sequences with `add`/`remove` events
//! - **Extensible**: register new field types in the process-wide registry
//!
//! ## Example
//!
//! ```
//! use familiar_models::{fields, Description, Model, ModelType, Value};
//! use serde_json::json;
//!
//! let user = ModelType::builder("User")
//!     .data(|| {
//!         fields([
//!             ("id", Description::tag("number").primary()),
//!             ("name", Description::tag("string").trim().required()),
//!         ])
//!     })
//!     .build();
//!
//! let ann = Model::new(&user, json!({"id": "1", "name": " Ann "})).unwrap();
//! assert_eq!(ann.get("id"), Value::from(1));
//! assert_eq!(ann.get("name"), Value::from("Ann"));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Description ──(registry)──> Descriptor ──> Schema (cached per ModelType)
//!                                               │
//! input ──> prepare ──> model hook ──> diff ──> validate ──> commit ──> events
//! ```

pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod registry;
pub mod schema;
pub mod stack;
pub mod types;
pub mod value;

pub use collection::{Collection, CollectionEvent, CollectionType, RowRef};
pub use config::EngineConfig;
pub use error::{ModelError, Result};
pub use events::{EventEmitter, ListenerId};
pub use model::{fields, ChangeEvent, Data, Model, ModelType, Parent, SetOptions, Walk};
pub use registry::{register_type, TypeFactory, TypeRegistry};
pub use schema::{fields_from_json, Description, Fields, Modifiers, Schema, TypeRef, Validator};
pub use types::{CustomClass, Descriptor, FieldKind};
pub use value::{CustomValue, Map, Value};
