//! Layered settings: defaults plus an ordered list of override operations.
//!
//! Studio mappings, route sets and show-style layers are stored as
//! [`ObjectWithOverrides`]. The blueprint supplies the defaults; operators
//! edit the overrides. [`apply_and_validate_overrides`] folds the two into
//! the concrete object the rest of the system uses, reporting any override
//! that no longer applies instead of failing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One operation on a dot-separated path into the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ObjectOverrideOp {
    Set { path: String, value: Value },
    Delete { path: String },
}

impl ObjectOverrideOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Defaults plus override operations, applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectWithOverrides<T> {
    pub defaults: T,
    #[serde(default)]
    pub overrides: Vec<ObjectOverrideOp>,
}

impl<T> ObjectWithOverrides<T> {
    pub fn new(defaults: T) -> Self {
        Self {
            defaults,
            overrides: Vec::new(),
        }
    }

    /// Borrow a helper for recording item-level overrides.
    pub fn helper(&mut self) -> OverrideOpHelper<'_, T> {
        OverrideOpHelper { target: self }
    }
}

impl<T: Default> Default for ObjectWithOverrides<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// The outcome of applying overrides.
#[derive(Debug, Clone)]
pub struct OverrideResult<T> {
    /// The concrete object.
    pub obj: T,
    /// Operations that could not be applied (missing parent, missing
    /// delete target, empty path). They are kept so the UI can show them.
    pub invalid: Vec<ObjectOverrideOp>,
    /// Operations that were applied.
    pub preserve: Vec<ObjectOverrideOp>,
}

/// Apply every override to the defaults.
///
/// A `set` needs its parent path to exist; a `delete` needs its target to
/// exist. Failing operations are reported in
/// [`invalid`](OverrideResult::invalid) and skipped. Returns
/// [`CoreError::Validation`] only if the overridden document no longer
/// deserialises into `T`.
pub fn apply_and_validate_overrides<T>(
    input: &ObjectWithOverrides<T>,
) -> Result<OverrideResult<T>, CoreError>
where
    T: Serialize + DeserializeOwned,
{
    let mut doc = serde_json::to_value(&input.defaults)
        .map_err(|e| CoreError::Internal(format!("Failed to serialise defaults: {e}")))?;

    let mut invalid = Vec::new();
    let mut preserve = Vec::new();

    for op in &input.overrides {
        let segments = split_path(op.path());
        let applied = !segments.is_empty()
            && match op {
                ObjectOverrideOp::Set { value, .. } => set_path(&mut doc, &segments, value.clone()),
                ObjectOverrideOp::Delete { .. } => delete_path(&mut doc, &segments),
            };
        if applied {
            preserve.push(op.clone());
        } else {
            invalid.push(op.clone());
        }
    }

    if !invalid.is_empty() {
        tracing::debug!(count = invalid.len(), "Skipped invalid override operations");
    }

    let obj = serde_json::from_value(doc)
        .map_err(|e| CoreError::Validation(format!("Overrides produce an invalid object: {e}")))?;

    Ok(OverrideResult {
        obj,
        invalid,
        preserve,
    })
}

/// Records overrides against items of a keyed collection
/// (`{ item_id: { ... } }`).
pub struct OverrideOpHelper<'a, T> {
    target: &'a mut ObjectWithOverrides<T>,
}

impl<T: Serialize> OverrideOpHelper<'_, T> {
    /// Set `item_id.sub_path` to `value`.
    ///
    /// Replaces any earlier op on the same path. When the item itself only
    /// exists through a whole-item `set`, that op is edited in place. When
    /// the value equals the default, no override is kept.
    pub fn set_item_value(
        &mut self,
        item_id: &str,
        sub_path: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let path = if sub_path.is_empty() {
            item_id.to_string()
        } else {
            format!("{item_id}.{sub_path}")
        };

        if !sub_path.is_empty() {
            let whole_item = self.target.overrides.iter_mut().find_map(|op| match op {
                ObjectOverrideOp::Set { path, value } if path == item_id => Some(value),
                _ => None,
            });
            if let Some(item_value) = whole_item {
                if set_path(item_value, &split_path(sub_path), value) {
                    return Ok(());
                }
                return Err(CoreError::Validation(format!(
                    "Cannot set \"{sub_path}\" on overridden item \"{item_id}\""
                )));
            }
        }

        self.target.overrides.retain(|op| op.path() != path);

        let defaults = serde_json::to_value(&self.target.defaults)
            .map_err(|e| CoreError::Internal(format!("Failed to serialise defaults: {e}")))?;
        if get_path(&defaults, &split_path(&path)) == Some(&value) {
            return Ok(());
        }

        self.target
            .overrides
            .push(ObjectOverrideOp::Set { path, value });
        Ok(())
    }

    /// Drop every override touching `item_id`, restoring its defaults.
    pub fn reset_item(&mut self, item_id: &str) {
        let prefix = format!("{item_id}.");
        self.target
            .overrides
            .retain(|op| op.path() != item_id && !op.path().starts_with(&prefix));
    }

    /// Remove the item entirely.
    pub fn delete_item(&mut self, item_id: &str) {
        self.reset_item(item_id);
        self.target.overrides.push(ObjectOverrideOp::Delete {
            path: item_id.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn get_path<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(*segment))
}

fn parent_mut<'a>(
    root: &'a mut Value,
    segments: &[&str],
) -> Option<&'a mut serde_json::Map<String, Value>> {
    let (_, parents) = segments.split_last()?;
    let mut node = root;
    for segment in parents {
        node = node.as_object_mut()?.get_mut(*segment)?;
    }
    node.as_object_mut()
}

fn set_path(root: &mut Value, segments: &[&str], value: Value) -> bool {
    let Some(last) = segments.last() else {
        return false;
    };
    match parent_mut(root, segments) {
        Some(parent) => {
            parent.insert((*last).to_string(), value);
            true
        }
        None => false,
    }
}

fn delete_path(root: &mut Value, segments: &[&str]) -> bool {
    let Some(last) = segments.last() else {
        return false;
    };
    parent_mut(root, segments)
        .map(|parent| parent.remove(*last).is_some())
        .unwrap_or(false)
}
