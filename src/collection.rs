//! Collections: ordered sequences of records of one model type
//!
//! Every insertion path goes through `prepare_row`, which accepts a record of
//! the element type (or a subtype) as-is and constructs one from a plain
//! object. Mutators emit one `add` or `remove` event per affected element,
//! after the backing sequence has been updated and its lock released.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::error::{ModelError, Result};
use crate::events::{EventEmitter, ListenerId};
use crate::model::{Model, ModelType, Parent, ParentLink};
use crate::stack::{CloneStack, EqualStack, JsonStack};
use crate::value::{loose_cmp, Value};

struct CollectionTypeInner {
    name: String,
    model: ModelType,
    extends: Option<CollectionType>,
}

/// A collection type: a name and the model type of its elements
#[derive(Clone)]
pub struct CollectionType(Arc<CollectionTypeInner>);

impl CollectionType {
    pub fn new(name: impl Into<String>, model: &ModelType) -> Self {
        Self(Arc::new(CollectionTypeInner {
            name: name.into(),
            model: model.clone(),
            extends: None,
        }))
    }

    /// Collection type accepted wherever `self` is expected
    pub fn subtype(&self, name: impl Into<String>, model: &ModelType) -> Self {
        Self(Arc::new(CollectionTypeInner {
            name: name.into(),
            model: model.clone(),
            extends: Some(self.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn model_type(&self) -> &ModelType {
        &self.0.model
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_a(&self, other: &CollectionType) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.ptr_eq(other) {
                return true;
            }
            current = ty.0.extends.as_ref();
        }
        false
    }

    pub fn create<I, V>(&self, items: I) -> Result<Collection>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Collection::new(self, items)
    }
}

impl fmt::Debug for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionType")
            .field("name", &self.0.name)
            .field("model", &self.0.model.name())
            .finish()
    }
}

/// Payload of `add` and `remove` events
#[derive(Clone, Debug)]
pub struct CollectionEvent {
    pub collection: Collection,
    pub model: Model,
    /// Position of the element when it was added or removed
    pub index: usize,
}

/// Element to remove: a record by identity or a primary key value
#[derive(Clone, Debug)]
pub enum RowRef {
    Model(Model),
    Id(Value),
}

impl From<Model> for RowRef {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<&Model> for RowRef {
    fn from(model: &Model) -> Self {
        Self::Model(model.clone())
    }
}

impl From<Value> for RowRef {
    fn from(value: Value) -> Self {
        match value {
            Value::Model(model) => Self::Model(model),
            other => Self::Id(other),
        }
    }
}

impl From<&str> for RowRef {
    fn from(id: &str) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<i64> for RowRef {
    fn from(id: i64) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<i32> for RowRef {
    fn from(id: i32) -> Self {
        Self::Id(Value::from(id))
    }
}

pub(crate) struct CollectionInner {
    collection_type: CollectionType,
    models: RwLock<Vec<Model>>,
    parent: RwLock<Option<ParentLink>>,
    events: EventEmitter<CollectionEvent>,
}

/// Non-owning collection handle used for back-references
#[derive(Clone)]
pub(crate) struct WeakCollection(Weak<CollectionInner>);

impl WeakCollection {
    pub(crate) fn upgrade(&self) -> Option<Collection> {
        self.0.upgrade().map(Collection)
    }
}

/// Handle to a shared, mutable sequence of records
#[derive(Clone)]
pub struct Collection(Arc<CollectionInner>);

impl Collection {
    /// Build a collection from records or plain objects. No events are emitted.
    pub fn new<I, V>(collection_type: &CollectionType, items: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let collection = Self::alloc(collection_type);
        let rows = collection.prepare_rows(items)?;
        collection.adopt(&rows);
        *collection.0.models.write() = rows;
        Ok(collection)
    }

    fn alloc(collection_type: &CollectionType) -> Self {
        Self(Arc::new(CollectionInner {
            collection_type: collection_type.clone(),
            models: RwLock::new(Vec::new()),
            parent: RwLock::new(None),
            events: EventEmitter::new(),
        }))
    }

    pub fn collection_type(&self) -> &CollectionType {
        &self.0.collection_type
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn link(&self) -> ParentLink {
        ParentLink::Collection(WeakCollection(Arc::downgrade(&self.0)))
    }

    pub fn parent_ref(&self) -> Option<Parent> {
        self.0.parent.read().as_ref().and_then(ParentLink::upgrade)
    }

    /// Owning record, looking through nested collections
    pub fn parent(&self) -> Option<Model> {
        match self.parent_ref()? {
            Parent::Model(model) => Some(model),
            Parent::Collection(collection) => collection.parent(),
        }
    }

    pub(crate) fn set_parent(&self, parent: Option<ParentLink>) {
        *self.0.parent.write() = parent;
    }

    pub fn len(&self) -> usize {
        self.0.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.models.read().is_empty()
    }

    /// Snapshot of the elements
    pub fn models(&self) -> Vec<Model> {
        self.0.models.read().clone()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Model> {
        self.models().into_iter()
    }

    // =========================================================================
    // Row preparation and bookkeeping
    // =========================================================================

    fn prepare_row(&self, value: Value) -> Result<Model> {
        let model_type = self.0.collection_type.model_type();
        match value {
            Value::Model(model) if model.model_type().is_a(model_type) => Ok(model),
            Value::Object(_) => Model::new(model_type, value),
            other => Err(ModelError::InvalidCollectionElement {
                collection: self.0.collection_type.name().to_string(),
                value: other.render(),
            }),
        }
    }

    fn prepare_rows<I, V>(&self, items: I) -> Result<Vec<Model>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        items
            .into_iter()
            .map(|item| self.prepare_row(item.into()))
            .collect()
    }

    fn adopt(&self, rows: &[Model]) {
        let link = self.link();
        for row in rows {
            row.set_parent(Some(link.clone()));
        }
    }

    /// Drop the back-reference of a removed row if it still points here
    fn release(&self, row: &Model) {
        if matches!(row.parent_ref(), Some(Parent::Collection(owner)) if owner.ptr_eq(self)) {
            row.set_parent(None);
        }
    }

    fn emit(&self, event: &str, model: &Model, index: usize) {
        self.0.events.emit(
            event,
            &CollectionEvent {
                collection: self.clone(),
                model: model.clone(),
                index,
            },
        );
    }

    fn emit_added(&self, rows: &[Model], start: usize) {
        for (offset, row) in rows.iter().enumerate() {
            self.emit("add", row, start + offset);
        }
    }

    fn emit_removed(&self, rows: &[Model], start: usize) {
        for (offset, row) in rows.iter().enumerate() {
            self.emit("remove", row, start + offset);
        }
    }

    /// Replace `start..start + delete_count` with `rows`, returning what was removed
    fn replace_range(
        &self,
        start: usize,
        delete_count: usize,
        rows: Vec<Model>,
    ) -> (usize, Vec<Model>) {
        self.adopt(&rows);
        let (start, removed, orphaned) = {
            let mut models = self.0.models.write();
            let start = start.min(models.len());
            let end = start.saturating_add(delete_count).min(models.len());
            let removed: Vec<Model> = models.splice(start..end, rows.iter().cloned()).collect();
            // rows put back in the same call stay owned
            let orphaned: Vec<Model> = removed
                .iter()
                .filter(|row| !models.iter().any(|kept| kept.ptr_eq(*row)))
                .cloned()
                .collect();
            (start, removed, orphaned)
        };
        for row in &orphaned {
            self.release(row);
        }
        tracing::trace!(
            collection = %self.0.collection_type.name(),
            added = rows.len(),
            removed = removed.len(),
            "mutate"
        );
        self.emit_removed(&removed, start);
        self.emit_added(&rows, start);
        (start, removed)
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Append rows; returns the new length
    pub fn push<I, V>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows = self.prepare_rows(items)?;
        self.replace_range(usize::MAX, 0, rows);
        Ok(self.len())
    }

    /// Prepend rows; returns the new length
    pub fn unshift<I, V>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows = self.prepare_rows(items)?;
        self.replace_range(0, 0, rows);
        Ok(self.len())
    }

    pub fn pop(&self) -> Option<Model> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.replace_range(len - 1, 1, Vec::new()).1.pop()
    }

    pub fn shift(&self) -> Option<Model> {
        self.replace_range(0, 1, Vec::new()).1.into_iter().next()
    }

    /// Remove `delete_count` rows at `start` and insert `items` there
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<Model>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows = self.prepare_rows(items)?;
        Ok(self.replace_range(start, delete_count, rows).1)
    }

    /// Build a row from `input` and append it
    pub fn create(&self, input: impl Into<Value>) -> Result<Model> {
        let row = self.prepare_row(input.into())?;
        self.replace_range(usize::MAX, 0, vec![row.clone()]);
        Ok(row)
    }

    /// Remove the first row matching `row` (by identity, or by primary key
    /// value for a bare id)
    pub fn remove(&self, row: impl Into<RowRef>) -> Option<Model> {
        let index = match row.into() {
            RowRef::Model(model) => self.index_of(&model),
            RowRef::Id(id) => self.position_of_id(&id),
        }?;
        self.replace_range(index, 1, Vec::new()).1.into_iter().next()
    }

    /// Row whose primary key equals `id`
    pub fn get(&self, id: impl Into<Value>) -> Option<Model> {
        let index = self.position_of_id(&id.into())?;
        self.0.models.read().get(index).cloned()
    }

    fn position_of_id(&self, id: &Value) -> Option<usize> {
        let Ok(Some(key)) = self.0.collection_type.model_type().primary_key() else {
            tracing::warn!(
                collection = %self.0.collection_type.name(),
                "lookup by id without a primary key"
            );
            return None;
        };
        self.find_index(|model| same_id(&model.get(&key), id))
    }

    /// Row at `index`; negative indexes count from the end
    pub fn at(&self, index: isize) -> Option<Model> {
        let models = self.0.models.read();
        let index = if index < 0 {
            models.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        models.get(index).cloned()
    }

    /// Replace the row at `index`, or append when `index` is past the end
    pub fn set_at(&self, index: usize, value: impl Into<Value>) -> Result<Model> {
        let row = self.prepare_row(value.into())?;
        let delete_count = usize::from(index < self.len());
        self.replace_range(index, delete_count, vec![row.clone()]);
        Ok(row)
    }

    /// Fill `start..end` with one row built from `value`
    pub fn fill(&self, value: impl Into<Value>, start: usize, end: Option<usize>) -> Result<()> {
        let row = self.prepare_row(value.into())?;
        let len = self.len();
        let end = end.unwrap_or(len).min(len);
        if start >= end {
            return Ok(());
        }
        self.replace_range(start, end - start, vec![row; end - start]);
        Ok(())
    }

    /// Replace every row
    pub fn reset<I, V>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows = self.prepare_rows(items)?;
        self.replace_range(0, usize::MAX, rows);
        Ok(())
    }

    /// Sort in place with a comparator. Emits no events.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Model, &Model) -> Ordering,
    {
        let mut models = self.models();
        models.sort_by(compare);
        *self.0.models.write() = models;
    }

    /// Sort ascending by field values: the first key decides, later keys
    /// break ties.
    pub fn sort_by_keys(&self, keys: &[&str]) {
        self.sort_by(|a, b| {
            keys.iter()
                .map(|key| loose_cmp(&a.get(key), &b.get(key)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    pub fn reverse(&self) {
        self.0.models.write().reverse();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Rows in `start..end` (clamped), as a plain list
    pub fn slice(&self, start: usize, end: Option<usize>) -> Vec<Model> {
        let models = self.0.models.read();
        let end = end.unwrap_or(models.len()).min(models.len());
        models.get(start.min(end)..end).map(<[Model]>::to_vec).unwrap_or_default()
    }

    /// New collection of the same type holding these rows followed by `items`
    pub fn concat<I, V>(&self, items: I) -> Result<Collection>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let result = Self::alloc(&self.0.collection_type);
        let extra = result.prepare_rows(items)?;
        let orphans: Vec<Model> = extra
            .iter()
            .filter(|row| row.parent_ref().is_none())
            .cloned()
            .collect();
        result.adopt(&orphans);
        let mut models = self.models();
        models.extend(extra);
        *result.0.models.write() = models;
        Ok(result)
    }

    pub fn map<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(&Model, usize) -> T,
    {
        self.iter().enumerate().map(|(i, model)| f(&model, i)).collect()
    }

    pub fn filter<F>(&self, mut predicate: F) -> Vec<Model>
    where
        F: FnMut(&Model) -> bool,
    {
        self.iter().filter(|model| predicate(model)).collect()
    }

    pub fn reduce<A, F>(&self, init: A, f: F) -> A
    where
        F: FnMut(A, Model) -> A,
    {
        self.iter().fold(init, f)
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(Model),
    {
        self.iter().for_each(f);
    }

    pub fn find<F>(&self, mut predicate: F) -> Option<Model>
    where
        F: FnMut(&Model) -> bool,
    {
        self.iter().find(|model| predicate(model))
    }

    pub fn find_index<F>(&self, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&Model) -> bool,
    {
        self.iter().position(|model| predicate(&model))
    }

    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.0.models.read().iter().position(|row| row.ptr_eq(model))
    }

    pub fn includes(&self, model: &Model) -> bool {
        self.index_of(model).is_some()
    }

    pub fn every<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&Model) -> bool,
    {
        self.iter().all(|model| predicate(&model))
    }

    pub fn some<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&Model) -> bool,
    {
        self.iter().any(|model| predicate(&model))
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Listen for `add` or `remove`
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&CollectionEvent) + Send + Sync + 'static,
    {
        self.0.events.on(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.0.events.off(id)
    }

    // =========================================================================
    // Projection, cloning, equality
    // =========================================================================

    pub fn to_json(&self) -> Result<Json> {
        self.to_json_with("", &mut JsonStack::new())
    }

    pub(crate) fn to_json_with(&self, key: &str, stack: &mut JsonStack) -> Result<Json> {
        let id = self.identity();
        if !stack.enter(id) {
            return Err(ModelError::CircularStructure { key: key.to_string() });
        }
        let result = self
            .iter()
            .map(|model| model.to_json_with(key, stack))
            .collect::<Result<Vec<_>>>()
            .map(Json::Array);
        stack.leave(id);
        result
    }

    pub fn deep_clone(&self) -> Result<Collection> {
        self.clone_with(&mut CloneStack::new())
    }

    pub(crate) fn clone_with(&self, stack: &mut CloneStack) -> Result<Collection> {
        if let Some(Value::Collection(copy)) = stack.get(self.identity()) {
            return Ok(copy);
        }
        let copy = Self::alloc(&self.0.collection_type);
        stack.insert(self.identity(), Value::Collection(copy.clone()));
        let rows = self
            .iter()
            .map(|model| model.clone_with(stack))
            .collect::<Result<Vec<_>>>()?;
        copy.adopt(&rows);
        *copy.0.models.write() = rows;
        Ok(copy)
    }

    /// Positional equality with another collection or an array
    pub fn equal(&self, other: impl Into<Value>) -> Result<bool> {
        self.equal_with(&other.into(), &mut EqualStack::new())
    }

    pub(crate) fn equal_with(&self, other: &Value, stack: &mut EqualStack) -> Result<bool> {
        let (other_id, theirs): (usize, Vec<Value>) = match other {
            Value::Collection(collection) => (
                collection.identity(),
                collection.iter().map(Value::Model).collect(),
            ),
            Value::Array(items) => match other.identity() {
                Some(id) => (id, items.to_vec()),
                None => return Ok(false),
            },
            _ => return Ok(false),
        };
        if !stack.enter(self.identity(), other_id) {
            return Ok(true);
        }
        let ours = self.models();
        if ours.len() != theirs.len() {
            return Ok(false);
        }
        for (model, other) in ours.iter().zip(&theirs) {
            if !model.equal_with(other, stack)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("type", &self.0.collection_type.name())
            .field("len", &self.len())
            .finish()
    }
}

impl IntoIterator for &Collection {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ids match when equal, or when their string forms agree (`7` and `"7"`)
fn same_id(value: &Value, id: &Value) -> bool {
    if value.is_null() || id.is_null() {
        return false;
    }
    value == id || value.loose_string() == id.loose_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fields;
    use crate::schema::Description;
    use serde_json::json;

    fn people() -> CollectionType {
        let person = ModelType::builder("Person")
            .data(|| {
                fields([
                    ("id", Description::tag("number").primary()),
                    ("name", Description::tag("string")),
                ])
            })
            .build();
        CollectionType::new("People", &person)
    }

    #[test]
    fn test_rows_are_prepared() {
        let ty = people();
        let list = Collection::new(&ty, [json!({"id": "1", "name": "a"})]).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.at(0).unwrap().get("id"), Value::Number(1.0));

        let err = list.push([json!(5)]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidCollectionElement { .. }));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_get_and_remove_by_id() {
        let ty = people();
        let list = Collection::new(&ty, [json!({"id": 1}), json!({"id": 2})]).unwrap();
        assert!(list.get(2).is_some());
        assert!(list.get("2").is_some());
        let removed = list.remove(1).unwrap();
        assert_eq!(removed.get("id"), Value::Number(1.0));
        assert!(removed.parent_ref().is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_negative_at() {
        let ty = people();
        let list = Collection::new(&ty, [json!({"id": 1}), json!({"id": 2})]).unwrap();
        assert_eq!(list.at(-1).unwrap().get("id"), Value::Number(2.0));
        assert!(list.at(-3).is_none());
        assert!(list.at(2).is_none());
    }

    #[test]
    fn test_splice_and_slice() {
        let ty = people();
        let list = Collection::new(&ty, (1..=4).map(|id| json!({ "id": id }))).unwrap();
        let removed = list.splice(1, 2, [json!({"id": 9})]).unwrap();
        assert_eq!(removed.len(), 2);
        let ids: Vec<Value> = list.map(|model, _| model.get("id"));
        assert_eq!(ids, vec![Value::from(1), Value::from(9), Value::from(4)]);
        assert_eq!(list.slice(1, None).len(), 2);
        assert!(list.slice(5, Some(9)).is_empty());
    }

    #[test]
    fn test_sort_by_keys_breaks_ties() {
        let ty = people();
        let list = Collection::new(
            &ty,
            [
                json!({"id": 3, "name": "b"}),
                json!({"id": 1, "name": "b"}),
                json!({"id": 2, "name": "a"}),
            ],
        )
        .unwrap();
        list.sort_by_keys(&["name", "id"]);
        let ids: Vec<Value> = list.map(|model, _| model.get("id"));
        assert_eq!(ids, vec![Value::from(2), Value::from(1), Value::from(3)]);
    }
}
