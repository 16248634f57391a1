use crate::{Difference, DifferenceKind, DynEntity, Entity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a property changed between the baseline and the current instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// A single reported difference between a snapshot and the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub name: String,
    pub original_value: Value,
    pub current_value: Value,
    pub change_type: ChangeType,
}

/// Turns comparer differences into property changes.
///
/// A difference where one side is null is dropped when the property is a
/// collection or the other side is a JSON array: collection membership is
/// reconciled by the graph attach step and only reported as `Modified`
/// when both sides were loaded.
pub fn compute_changes(differences: Vec<Difference>) -> Vec<PropertyChange> {
    differences
        .into_iter()
        .filter_map(|d| {
            let one_side_null = d.old.is_null() || d.new.is_null();
            if one_side_null && (d.kind == DifferenceKind::Collection || d.old.is_array() || d.new.is_array()) {
                return None;
            }
            let change_type = if d.old.is_null() {
                ChangeType::Added
            } else if d.new.is_null() {
                ChangeType::Deleted
            } else {
                ChangeType::Modified
            };
            Some(PropertyChange {
                name: d.path,
                original_value: d.old,
                current_value: d.new,
                change_type,
            })
        })
        .collect()
}

/// An entity saved by one repository operation, handed to after-save hooks.
#[derive(Debug, Clone)]
pub struct RepositoryRecord<E> {
    pub item: E,
    pub is_new: bool,
    pub changes: Vec<PropertyChange>,
}

/// Borrowed view of a [`RepositoryRecord`].
#[derive(Debug)]
pub struct RecordRef<'a, T: ?Sized> {
    pub item: &'a T,
    pub is_new: bool,
    pub changes: &'a [PropertyChange],
}

impl<T: ?Sized> Clone for RecordRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for RecordRef<'_, T> {}

impl<E: Entity> RepositoryRecord<E> {
    pub fn new(item: E, is_new: bool, changes: Vec<PropertyChange>) -> Self {
        Self {
            item,
            is_new,
            changes,
        }
    }

    pub fn view(&self) -> RecordRef<'_, E> {
        RecordRef {
            item: &self.item,
            is_new: self.is_new,
            changes: &self.changes,
        }
    }

    /// Type-erased view for polymorphic hooks.
    pub fn erased(&self) -> RecordRef<'_, dyn DynEntity> {
        RecordRef {
            item: &self.item as &dyn DynEntity,
            is_new: self.is_new,
            changes: &self.changes,
        }
    }
}
