//! Records
//!
//! A `Model` holds an immutable `Data` snapshot that is replaced wholesale by
//! every successful `set`. The pipeline of a change is:
//!
//! 1. copy the current snapshot into a draft
//! 2. prepare each incoming value through its field descriptor
//! 3. run the type's prepare hook, then re-prepare whatever it touched
//! 4. diff the draft against the snapshot using descriptor equality
//! 5. validate the frozen draft and swap it in
//! 6. emit `change:<key>` per changed key, then `change`
//!
//! Any failure before step 5 leaves the record untouched.

mod model_type;
mod walk;

pub use model_type::{fields, ModelPrepareHook, ModelType, ModelTypeBuilder, ModelValidateHook};
pub use walk::Walk;

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::collection::{Collection, WeakCollection};
use crate::error::{ModelError, Result};
use crate::events::{EventEmitter, ListenerId};
use crate::schema::Schema;
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::types::Descriptor;
use crate::value::{Map, Value};

/// Frozen field values of a record. Cloning shares the snapshot.
#[derive(Clone, Default)]
pub struct Data(Arc<Map>);

impl Data {
    fn new(map: Map) -> Self {
        Self(Arc::new(map))
    }

    /// Whether both snapshots are the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn value(&self, key: &str) -> Value {
        self.0.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn to_map(&self) -> Map {
        (*self.0).clone()
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl Deref for Data {
    type Target = Map;

    fn deref(&self) -> &Map {
        &self.0
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Payload of `change` and `change:<key>` events
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub model: Model,
    /// Snapshot before the change
    pub prev: Data,
    /// Changed keys with their new values
    pub changes: Map,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SetOptions {
    /// Run the whole pipeline but stop before committing
    pub only_validate: bool,
    initializing: bool,
}

impl SetOptions {
    pub fn only_validate() -> Self {
        Self {
            only_validate: true,
            initializing: false,
        }
    }

    fn initializing() -> Self {
        Self {
            only_validate: false,
            initializing: true,
        }
    }
}

/// Owner of a record or collection
#[derive(Clone, Debug)]
pub enum Parent {
    Model(Model),
    Collection(Collection),
}

#[derive(Clone)]
pub(crate) enum ParentLink {
    Model(Weak<ModelInner>),
    Collection(WeakCollection),
}

impl ParentLink {
    pub(crate) fn upgrade(&self) -> Option<Parent> {
        match self {
            Self::Model(weak) => weak.upgrade().map(|inner| Parent::Model(Model(inner))),
            Self::Collection(weak) => weak.upgrade().map(Parent::Collection),
        }
    }
}

pub(crate) struct ModelInner {
    model_type: ModelType,
    schema: Arc<Schema>,
    data: RwLock<Data>,
    parent: RwLock<Option<ParentLink>>,
    events: EventEmitter<ChangeEvent>,
}

/// A record: a handle to schema-checked data. Cloning the handle shares the
/// record; use `deep_clone` for an independent copy.
#[derive(Clone)]
pub struct Model(Arc<ModelInner>);

impl Model {
    /// Construct a record from an object (or `Null` for all defaults).
    ///
    /// Defaults are prepared first, required fields without input or default
    /// are injected as `Null` so their check fires, then the input goes
    /// through the regular `set` pipeline. No events are emitted.
    pub fn new(model_type: &ModelType, input: impl Into<Value>) -> Result<Self> {
        let input = into_patch(input.into(), model_type.name())?;
        let model = Self::alloc(model_type, model_type.schema()?);
        model.initialize(input)?;
        Ok(model)
    }

    fn alloc(model_type: &ModelType, schema: Arc<Schema>) -> Self {
        Self(Arc::new(ModelInner {
            model_type: model_type.clone(),
            schema,
            data: RwLock::new(Data::default()),
            parent: RwLock::new(None),
            events: EventEmitter::new(),
        }))
    }

    fn initialize(&self, mut input: Map) -> Result<()> {
        let mut defaults = Map::new();
        for (key, descriptor) in self.0.schema.fields() {
            let value = descriptor.prepare(descriptor.default_value(), key, self)?;
            defaults.insert(key.clone(), value);
        }
        for (key, descriptor) in self.0.schema.fields() {
            let missing = defaults.get(key).map_or(true, Value::is_null);
            if descriptor.is_required() && missing && !input.contains_key(key) {
                input.insert(key.clone(), Value::Null);
            }
        }
        *self.0.data.write() = Data::new(defaults);
        self.apply(input, SetOptions::initializing())
    }

    pub fn model_type(&self) -> &ModelType {
        &self.0.model_type
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.0.schema
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> ParentLink {
        ParentLink::Model(Arc::downgrade(&self.0))
    }

    /// Current snapshot
    pub fn data(&self) -> Data {
        self.0.data.read().clone()
    }

    /// Value of `key`, `Null` when absent
    pub fn get(&self, key: &str) -> Value {
        self.0.data.read().value(key)
    }

    /// Whether `key` is a declared field or accepted by the wildcard
    pub fn has_property(&self, key: &str) -> bool {
        self.0.schema.descriptor_for(key).is_ok()
    }

    /// Whether `key` currently holds a non-null value
    pub fn has_value(&self, key: &str) -> bool {
        !self.get(key).is_null()
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.0.schema.primary_key()
    }

    pub fn primary_value(&self) -> Value {
        self.primary_key()
            .map(|key| self.get(key))
            .unwrap_or(Value::Null)
    }

    /// Direct owner: the record or collection holding this record
    pub fn parent_ref(&self) -> Option<Parent> {
        self.0.parent.read().as_ref().and_then(ParentLink::upgrade)
    }

    /// Owning record, looking through an owning collection
    pub fn parent(&self) -> Option<Model> {
        match self.parent_ref()? {
            Parent::Model(model) => Some(model),
            Parent::Collection(collection) => collection.parent(),
        }
    }

    pub(crate) fn set_parent(&self, parent: Option<ParentLink>) {
        *self.0.parent.write() = parent;
    }

    /// Apply a patch object
    pub fn set(&self, patch: impl Into<Value>) -> Result<()> {
        self.set_with(patch, SetOptions::default())
    }

    pub fn set_key(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let mut patch = Map::new();
        patch.insert(key.into(), value.into());
        self.apply(patch, SetOptions::default())
    }

    pub fn set_with(&self, patch: impl Into<Value>, options: SetOptions) -> Result<()> {
        let patch = into_patch(patch.into(), self.0.model_type.name())?;
        self.apply(patch, options)
    }

    /// Whether `patch` would be accepted; never mutates
    pub fn is_valid(&self, patch: impl Into<Value>) -> bool {
        self.set_with(patch, SetOptions::only_validate()).is_ok()
    }

    fn apply(&self, patch: Map, options: SetOptions) -> Result<()> {
        let schema = Arc::clone(&self.0.schema);
        let prev = self.data();
        let mut draft = prev.to_map();

        for (key, value) in patch {
            let descriptor = schema.descriptor_for(&key)?;
            let value = self.prepare_field(descriptor, &key, value, &prev, options)?;
            draft.insert(key, value);
        }

        if let Some(hook) = self.0.model_type.prepare_hook() {
            let before = draft.clone();
            hook(&mut draft)?;
            let touched: Vec<String> = draft
                .iter()
                .filter(|(key, value)| before.get(*key) != Some(*value))
                .map(|(key, _)| key.clone())
                .collect();
            for key in touched {
                let descriptor = schema.descriptor_for(&key)?;
                let value = draft.get(&key).cloned().unwrap_or(Value::Null);
                let value = self.prepare_field(descriptor, &key, value, &prev, options)?;
                draft.insert(key, value);
            }
        }

        let mut changes = Map::new();
        for (key, value) in &draft {
            let descriptor = schema.descriptor_for(key)?;
            if !descriptor.is_same(prev.get(key).unwrap_or(&Value::Null), value, key) {
                changes.insert(key.clone(), value.clone());
            }
        }
        for key in prev.keys() {
            if !draft.contains_key(key) {
                changes.insert(key.clone(), Value::Null);
            }
        }
        if changes.is_empty() && !options.initializing {
            return Ok(());
        }

        let next = Data::new(draft);
        if let Some(validate) = self.0.model_type.validate_hook() {
            validate(&next)?;
        }
        if options.only_validate {
            return Ok(());
        }

        *self.0.data.write() = next.clone();
        let owner = self.downgrade();
        for (key, value) in next.iter() {
            let fresh = value.identity().is_some()
                && value.identity() != prev.get(key).and_then(Value::identity);
            if options.initializing || fresh {
                adopt(value, &owner);
            }
        }
        tracing::trace!(
            model = %self.0.model_type.name(),
            changed = changes.len(),
            "commit"
        );

        if !options.initializing && !changes.is_empty() {
            let event = ChangeEvent {
                model: self.clone(),
                prev,
                changes,
            };
            for key in event.changes.keys() {
                self.0.events.emit(&format!("change:{key}"), &event);
            }
            self.0.events.emit("change", &event);
        }
        Ok(())
    }

    fn prepare_field(
        &self,
        descriptor: &Descriptor,
        key: &str,
        value: Value,
        prev: &Data,
        options: SetOptions,
    ) -> Result<Value> {
        let value = descriptor.prepare(value, key, self)?;
        if descriptor.is_required() && value.is_null() {
            return Err(ModelError::Required { key: key.to_string() });
        }
        if descriptor.is_const()
            && !options.initializing
            && !descriptor.is_same(prev.get(key).unwrap_or(&Value::Null), &value, key)
        {
            return Err(ModelError::ConstValue { key: key.to_string() });
        }
        Ok(value)
    }

    /// Listen for `change` or `change:<key>`
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.0.events.on(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.0.events.off(id)
    }

    /// JSON projection; fails with `CircularStructure` on a cycle
    pub fn to_json(&self) -> Result<Json> {
        self.to_json_with("", &mut JsonStack::new())
    }

    pub(crate) fn to_json_with(&self, key: &str, stack: &mut JsonStack) -> Result<Json> {
        let id = self.identity();
        if !stack.enter(id) {
            return Err(ModelError::CircularStructure { key: key.to_string() });
        }
        let result = self.project(stack);
        stack.leave(id);
        result
    }

    fn project(&self, stack: &mut JsonStack) -> Result<Json> {
        let data = self.data();
        let mut out = serde_json::Map::with_capacity(data.len());
        for (key, value) in data.iter() {
            let descriptor = self.0.schema.descriptor_for(key)?;
            out.insert(key.clone(), descriptor.to_json(value, key, stack)?);
        }
        Ok(Json::Object(out))
    }

    /// Field-wise equality with another record or a plain object
    pub fn equal(&self, other: impl Into<Value>) -> Result<bool> {
        self.equal_with(&other.into(), &mut EqualStack::new())
    }

    pub(crate) fn equal_with(&self, other: &Value, stack: &mut EqualStack) -> Result<bool> {
        let (other_id, other_data) = match other {
            Value::Model(model) => (model.identity(), model.data()),
            Value::Object(map) => {
                let data = Data(Arc::clone(map));
                (data.identity(), data)
            }
            _ => return Ok(false),
        };
        if !stack.enter(self.identity(), other_id) {
            return Ok(true);
        }

        let data = self.data();
        for (key, value) in data.iter() {
            let descriptor = self.0.schema.descriptor_for(key)?;
            let theirs = other_data.get(key).unwrap_or(&Value::Null);
            if !descriptor.equal(value, theirs, key, stack)? {
                return Ok(false);
            }
        }
        Ok(other_data.keys().all(|key| data.contains_key(key)))
    }

    /// Independent copy of the record and everything it owns. Shared and
    /// cyclic references inside the graph are reproduced, not duplicated.
    pub fn deep_clone(&self) -> Result<Model> {
        self.clone_with(&mut CloneStack::new())
    }

    pub(crate) fn clone_with(&self, stack: &mut CloneStack) -> Result<Model> {
        if let Some(Value::Model(copy)) = stack.get(self.identity()) {
            return Ok(copy);
        }
        let copy = Self::alloc(&self.0.model_type, Arc::clone(&self.0.schema));
        stack.insert(self.identity(), Value::Model(copy.clone()));

        let data = self.data();
        let mut input = Map::with_capacity(data.len());
        for (key, value) in data.iter() {
            let descriptor = self.0.schema.descriptor_for(key)?;
            input.insert(key.clone(), descriptor.clone_value(value, key, stack)?);
        }
        copy.initialize(input)?;
        Ok(copy)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Model");
        out.field("type", &self.0.model_type.name());
        if let Some(key) = self.primary_key() {
            out.field(key, &self.primary_value());
        }
        out.finish_non_exhaustive()
    }
}

/// Point compound values of a freshly committed field at their new owner
pub(crate) fn adopt(value: &Value, owner: &ParentLink) {
    match value {
        Value::Model(model) => model.set_parent(Some(owner.clone())),
        Value::Collection(collection) => collection.set_parent(Some(owner.clone())),
        Value::Array(items) => items.iter().for_each(|item| adopt(item, owner)),
        Value::Object(map) => map.values().for_each(|item| adopt(item, owner)),
        _ => {}
    }
}

fn into_patch(value: Value, context: &str) -> Result<Map> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(Arc::try_unwrap(map).unwrap_or_else(|map| (*map).clone())),
        Value::Model(model) => Ok(model.data().to_map()),
        other => Err(ModelError::InvalidValue {
            key: context.to_string(),
            expected: "object".to_string(),
            value: other.render(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Description;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user_type() -> ModelType {
        ModelType::builder("User")
            .data(|| {
                fields([
                    ("id", Description::tag("number").primary()),
                    ("name", Description::tag("string").required()),
                    ("age", Description::tag("number").default(18)),
                ])
            })
            .build()
    }

    #[test]
    fn test_construction_applies_defaults_and_coercion() {
        let user = Model::new(&user_type(), json!({"id": "7", "name": "Ann"})).unwrap();
        assert_eq!(user.get("id"), Value::Number(7.0));
        assert_eq!(user.get("age"), Value::Number(18.0));
        assert_eq!(user.primary_value(), Value::Number(7.0));
    }

    #[test]
    fn test_construction_requires_fields() {
        let err = Model::new(&user_type(), json!({"id": 1})).unwrap_err();
        assert!(matches!(err, ModelError::Required { key } if key == "name"));
    }

    #[test]
    fn test_unknown_property() {
        let user = Model::new(&user_type(), json!({"name": "Ann"})).unwrap();
        let err = user.set(json!({"nope": 1})).unwrap_err();
        assert!(matches!(err, ModelError::UnknownProperty { key } if key == "nope"));
    }

    #[test]
    fn test_noop_set_keeps_snapshot() {
        let user = Model::new(&user_type(), json!({"name": "Ann"})).unwrap();
        let before = user.data();
        user.set(json!({"name": "Ann", "age": "18"})).unwrap();
        assert!(before.ptr_eq(&user.data()));
    }

    #[test]
    fn test_failed_set_is_atomic() {
        let user = Model::new(&user_type(), json!({"name": "Ann"})).unwrap();
        let before = user.data();
        assert!(user.set(json!({"age": 30, "name": null})).is_err());
        assert!(before.ptr_eq(&user.data()));
        assert_eq!(user.get("age"), Value::Number(18.0));
    }

    #[test]
    fn test_change_events_fire_after_commit() {
        let user = Model::new(&user_type(), json!({"name": "Ann"})).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        user.on("change:name", move |event| {
            assert_eq!(event.model.get("name"), Value::from("Bob"));
            assert_eq!(event.prev.value("name"), Value::from("Ann"));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        user.set_key("name", "Bob").unwrap();
        user.set_key("name", "Bob").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_validate_does_not_commit() {
        let user = Model::new(&user_type(), json!({"name": "Ann"})).unwrap();
        assert!(user.is_valid(json!({"name": "Bob"})));
        assert!(!user.is_valid(json!({"name": null})));
        assert_eq!(user.get("name"), Value::from("Ann"));
    }

    #[test]
    fn test_prepare_hook_output_is_re_prepared() {
        let ty = ModelType::builder("Range")
            .data(|| fields([("low", "number"), ("high", "number")]))
            .prepare(|draft| {
                if draft.get("high").is_some_and(Value::is_null) {
                    let low = draft.get("low").cloned().unwrap_or(Value::Null);
                    draft.insert("high".to_string(), Value::from(low.render()));
                }
                Ok(())
            })
            .build();
        let range = Model::new(&ty, json!({"low": 3})).unwrap();
        assert_eq!(range.get("high"), Value::Number(3.0));
    }

    #[test]
    fn test_validate_hook_blocks_commit() {
        let ty = ModelType::builder("Range")
            .data(|| fields([("low", "number"), ("high", "number")]))
            .validate(|data| {
                let low = data.value("low").as_f64().unwrap_or(0.0);
                let high = data.value("high").as_f64().unwrap_or(0.0);
                if low > high {
                    return Err(ModelError::custom("low must not exceed high"));
                }
                Ok(())
            })
            .build();
        let range = Model::new(&ty, json!({"low": 1, "high": 2})).unwrap();
        assert!(range.set(json!({"low": 5})).is_err());
        assert_eq!(range.get("low"), Value::Number(1.0));
    }

    #[test]
    fn test_const_field() {
        let ty = ModelType::builder("Fixed")
            .data(|| fields([("code", Description::tag("string").constant())]))
            .build();
        let fixed = Model::new(&ty, json!({"code": "A"})).unwrap();
        assert!(fixed.set_key("code", "A").is_ok());
        let err = fixed.set_key("code", "B").unwrap_err();
        assert!(matches!(err, ModelError::ConstValue { key } if key == "code"));
    }

    #[test]
    fn test_nested_record_gets_parent() {
        let child = ModelType::builder("Child")
            .data(|| fields([("name", "string")]))
            .build();
        let child_ref = child.clone();
        let owner = ModelType::builder("Owner")
            .data(move || fields([("child", Description::model(&child_ref))]))
            .build();

        let record = Model::new(&owner, json!({"child": {"name": "c"}})).unwrap();
        let nested = record.get("child").as_model().cloned().unwrap();
        assert!(nested.model_type().ptr_eq(&child));
        assert!(nested.parent().unwrap().ptr_eq(&record));
    }

    fn owner_with_default_child() -> ModelType {
        let child = ModelType::builder("Child")
            .data(|| fields([("name", "string")]))
            .build();
        ModelType::builder("Owner")
            .data(move || {
                fields([(
                    "child",
                    Description::model(&child).default(json!({"name": "d"})),
                )])
            })
            .build()
    }

    fn child_parent(record: &Model) -> Option<Model> {
        record.get("child").as_model().and_then(Model::parent)
    }

    #[test]
    fn test_default_nested_record_gets_parent() {
        let owner = owner_with_default_child();
        let record = Model::new(&owner, json!({})).unwrap();
        assert!(child_parent(&record).unwrap().ptr_eq(&record));
    }

    #[test]
    fn test_nested_record_equal_to_default_gets_parent() {
        let owner = owner_with_default_child();
        let record = Model::new(&owner, json!({"child": {"name": "d"}})).unwrap();
        assert!(child_parent(&record).unwrap().ptr_eq(&record));

        record.set(json!({"child": {"name": "d"}})).unwrap();
        assert!(child_parent(&record).unwrap().ptr_eq(&record));
    }

    #[test]
    fn test_cloned_nested_record_gets_parent() {
        let owner = owner_with_default_child();
        let record = Model::new(&owner, json!({})).unwrap();
        let copy = record.deep_clone().unwrap();
        assert!(child_parent(&copy).unwrap().ptr_eq(&copy));
    }
}
