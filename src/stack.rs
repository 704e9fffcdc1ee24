//! Traversal contexts for cyclic graphs
//!
//! One context is created per top-level `equal`, `clone` or `to_json` call and
//! threaded through the recursive descent. Entries are keyed by pointer
//! identity of the compound values being visited.

use std::collections::{HashMap, HashSet};

use crate::value::Value;

/// Remembers every (self, other) pair already compared.
///
/// A pair seen again is treated as equal. This breaks cycles but does not
/// prove the remaining graphs isomorphic: asymmetric cyclic graphs can
/// compare equal.
#[derive(Debug, Default)]
pub struct EqualStack {
    visited: HashSet<(usize, usize)>,
}

impl EqualStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair; returns `false` if it was already visited
    pub fn enter(&mut self, left: usize, right: usize) -> bool {
        self.visited.insert((left, right))
    }

    /// Record a pair of values when both are compound
    pub(crate) fn enter_values(&mut self, left: &Value, right: &Value) -> bool {
        match (left.identity(), right.identity()) {
            (Some(l), Some(r)) => self.enter(l, r),
            _ => true,
        }
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// Maps each original compound value to its clone, so that shared and
/// cyclic references are reproduced in the copy.
#[derive(Debug, Default)]
pub struct CloneStack {
    clones: HashMap<usize, Value>,
}

impl CloneStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, original: usize) -> Option<Value> {
        self.clones.get(&original).cloned()
    }

    pub fn insert(&mut self, original: usize, clone: Value) {
        self.clones.insert(original, clone);
    }
}

/// Active projection path of a `to_json` call
#[derive(Debug, Default)]
pub struct JsonStack {
    active: Vec<usize>,
}

impl JsonStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an identity; returns `false` if it is already being projected
    pub fn enter(&mut self, identity: usize) -> bool {
        if self.active.contains(&identity) {
            return false;
        }
        self.active.push(identity);
        true
    }

    pub fn leave(&mut self, identity: usize) {
        if let Some(pos) = self.active.iter().rposition(|id| *id == identity) {
            self.active.remove(pos);
        }
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_stack_reports_revisits() {
        let mut stack = EqualStack::new();
        assert!(stack.enter(1, 2));
        assert!(!stack.enter(1, 2));
        assert!(stack.enter(2, 1));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_json_stack_allows_repeat_after_leave() {
        let mut stack = JsonStack::new();
        assert!(stack.enter(10));
        assert!(!stack.enter(10));
        stack.leave(10);
        assert!(stack.enter(10));
        assert_eq!(stack.depth(), 1);
    }
}
