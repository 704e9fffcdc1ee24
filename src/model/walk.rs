//! Graph traversal over the records reachable from a record

use std::collections::HashSet;

use crate::value::Value;

use super::{Model, ModelType, Parent};

/// Visitor verdict for `Model::walk`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Descend into the visited record
    Continue,
    /// Do not descend into the visited record
    Skip,
    /// Stop the whole walk
    Exit,
}

impl Model {
    /// Depth-first visit of every record reachable from this one through
    /// fields, arrays, objects and collections. Each record is visited once;
    /// the starting record itself is not visited.
    pub fn walk<F>(&self, mut visitor: F)
    where
        F: FnMut(&Model) -> Walk,
    {
        let mut seen = HashSet::from([self.identity()]);
        self.walk_fields(&mut visitor, &mut seen);
    }

    fn walk_fields(
        &self,
        visitor: &mut dyn FnMut(&Model) -> Walk,
        seen: &mut HashSet<usize>,
    ) -> bool {
        self.data()
            .values()
            .all(|value| walk_value(value, visitor, seen))
    }

    pub fn find_child<F>(&self, mut predicate: F) -> Option<Model>
    where
        F: FnMut(&Model) -> bool,
    {
        let mut found = None;
        self.walk(|model| {
            if predicate(model) {
                found = Some(model.clone());
                Walk::Exit
            } else {
                Walk::Continue
            }
        });
        found
    }

    pub fn filter_children<F>(&self, mut predicate: F) -> Vec<Model>
    where
        F: FnMut(&Model) -> bool,
    {
        let mut found = Vec::new();
        self.walk(|model| {
            if predicate(model) {
                found.push(model.clone());
            }
            Walk::Continue
        });
        found
    }

    /// Owning records from the nearest outwards, stopping at a cycle
    pub fn parents(&self) -> Vec<Model> {
        let mut seen = HashSet::from([self.identity()]);
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(model) = current {
            if !seen.insert(model.identity()) {
                break;
            }
            current = model.parent();
            out.push(model);
        }
        out
    }

    pub fn find_parent<F>(&self, mut predicate: F) -> Option<Model>
    where
        F: FnMut(&Model) -> bool,
    {
        self.parents().into_iter().find(|model| predicate(model))
    }

    pub fn filter_parents<F>(&self, mut predicate: F) -> Vec<Model>
    where
        F: FnMut(&Model) -> bool,
    {
        self.parents()
            .into_iter()
            .filter(|model| predicate(model))
            .collect()
    }

    /// Nearest owning record of type `model_type` (or a subtype)
    pub fn find_parent_instance(&self, model_type: &ModelType) -> Option<Model> {
        self.find_parent(|model| model.model_type().is_a(model_type))
    }

    /// Whether the direct owner is a collection
    pub fn in_collection(&self) -> bool {
        matches!(self.parent_ref(), Some(Parent::Collection(_)))
    }
}

fn walk_value(
    value: &Value,
    visitor: &mut dyn FnMut(&Model) -> Walk,
    seen: &mut HashSet<usize>,
) -> bool {
    match value {
        Value::Model(model) => {
            if !seen.insert(model.identity()) {
                return true;
            }
            match visitor(model) {
                Walk::Exit => false,
                Walk::Skip => true,
                Walk::Continue => model.walk_fields(visitor, seen),
            }
        }
        Value::Collection(collection) => collection
            .models()
            .into_iter()
            .all(|model| walk_value(&Value::Model(model), visitor, seen)),
        Value::Array(items) => items.iter().all(|item| walk_value(item, visitor, seen)),
        Value::Object(map) => map.values().all(|item| walk_value(item, visitor, seen)),
        _ => true,
    }
}
