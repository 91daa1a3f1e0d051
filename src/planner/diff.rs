//! Diff engine for comparing desired vs remote state.
//!
//! Only fields present in the desired state are compared, and only those
//! that can be changed after creation. The result is ordered by the kind's
//! schema, so the same inputs always produce the same change set.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::resources::{Comparison, DesiredState, FieldMode, RemoteResource};

/// Engine for computing change sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// A single field that differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Field name.
    pub field: &'static str,
    /// Current remote value (`null` when unset).
    pub old: Value,
    /// Desired value.
    pub new: Value,
}

/// Ordered list of changes; empty means no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterates over the changes in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Returns the change for a field, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Returns true if the field changes.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Drops a field from the change set.
    pub fn remove(&mut self, field: &str) -> Option<Change> {
        let index = self.changes.iter().position(|c| c.field == field)?;
        Some(self.changes.remove(index))
    }

    /// Returns the changes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Change] {
        &self.changes
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the changes needed to bring `remote` to `desired`.
    #[must_use]
    pub fn diff(&self, desired: &DesiredState, remote: &RemoteResource) -> ChangeSet {
        let schema = desired.schema();

        desired
            .attributes()
            .iter()
            .filter(|a| a.field.is_compared() && !schema.is_read_only(a.field.name))
            .filter_map(|a| {
                let current = remote.get(a.field.name).unwrap_or(&Value::Null);
                if values_equal(a.field.comparison, &a.value, current) {
                    None
                } else {
                    debug!(
                        "{}: {} differs ({current} -> {})",
                        desired.kind, a.field.name, a.value
                    );
                    Some(Change {
                        field: a.field.name,
                        old: current.clone(),
                        new: a.value.clone(),
                    })
                }
            })
            .collect()
    }

    /// Returns the create-only fields whose desired value differs from the
    /// remote one. These cannot be changed in place and are only reported.
    #[must_use]
    pub fn create_only_drift(&self, desired: &DesiredState, remote: &RemoteResource) -> Vec<&'static str> {
        desired
            .attributes()
            .iter()
            .filter(|a| a.field.mode == FieldMode::CreateOnly)
            .filter(|a| !desired.schema().is_secret(a.field.name))
            .filter(|a| !holds_objects(&a.value))
            .filter(|a| {
                remote
                    .get(a.field.name)
                    .is_some_and(|current| !values_equal(a.field.comparison, &a.value, current))
            })
            .map(|a| a.field.name)
            .collect()
    }
}

/// Nested request shapes (interfaces, VIP addresses) are echoed back
/// differently by the provider and cannot be compared.
fn holds_objects(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Compares a desired value with a remote one.
#[must_use]
pub fn values_equal(comparison: Comparison, desired: &Value, current: &Value) -> bool {
    match comparison {
        Comparison::Exact => desired == current,
        Comparison::Numeric => match (desired.as_f64(), current.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => desired == current,
        },
        Comparison::Set => match (desired, current) {
            (Value::Array(a), Value::Array(b)) => canonical_set(a) == canonical_set(b),
            (Value::Array(a), Value::Null) => a.is_empty(),
            _ => desired == current,
        },
        Comparison::Map => match (desired, current) {
            (Value::Object(a), Value::Null) => a.is_empty(),
            _ => desired == current,
        },
        Comparison::Ordered => match (desired, current) {
            (Value::Array(a), Value::Null) => a.is_empty(),
            _ => desired == current,
        },
    }
}

/// Sorted, de-duplicated rendering of a list used for set equality.
fn canonical_set(values: &[Value]) -> Vec<String> {
    let mut items: Vec<String> = values
        .iter()
        .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from))
        .collect();
    items.sort_unstable();
    items.dedup();
    items
}
