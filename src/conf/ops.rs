//! Structural edits of the configuration tree.
//!
//! A `PUT` or `DELETE` below the root is compiled into an edit program
//! against the current tree, then the candidate is produced by cloning
//! the current root under that program. The current tree is never
//! touched; the candidate owns every node it holds.

use crate::{conf::path, http::types};
use serde_json::Value;

#[derive(Debug, PartialEq)]
pub(crate) enum CompileError {
    /// The addressed path does not exist in the current tree.
    NotFound,
}

#[derive(Debug)]
pub(crate) enum EditAction {
    Replace(Value),
    Remove,
}

/// A compiled edit, consumed once by [`clone_with`].
#[derive(Debug)]
pub(crate) struct EditProgram {
    segments: Vec<String>,
    action: EditAction,
}

/// Compiles `(current_root, path, new_subtree_or_removal)` into an edit
/// program. Replacement may create the final object member; every other
/// step of the path must already exist.
pub(crate) fn compile(
    root: &Value,
    path_str: &str,
    value: Option<Value>,
) -> Result<EditProgram, CompileError> {
    debug_assert!(!path::is_root(path_str));

    let segments: Vec<String> = path::segments(path_str).map(str::to_owned).collect();
    check(root, &segments, value.is_some())?;

    Ok(EditProgram {
        segments,
        action: match value {
            Some(value) => EditAction::Replace(value),
            None => EditAction::Remove,
        },
    })
}

fn check(root: &Value, segments: &[String], is_replace: bool) -> Result<(), CompileError> {
    let mut node = root;

    for (index, segment) in segments.iter().enumerate() {
        let last = index + 1 == segments.len();

        node = match node {
            Value::Object(map) => match map.get(segment.as_str()) {
                Some(next) => next,
                None if last && is_replace => return Ok(()),
                None => return Err(CompileError::NotFound),
            },
            Value::Array(items) => {
                let index =
                    types::slice_to_usize(segment.as_bytes()).ok_or(CompileError::NotFound)?;
                items.get(index).ok_or(CompileError::NotFound)?
            }
            _ => return Err(CompileError::NotFound),
        };
    }

    Ok(())
}

/// Produces the candidate root: a fresh deep clone of `root` with the
/// program's edit applied at its path.
pub(crate) fn clone_with(root: &Value, program: EditProgram) -> Value {
    apply(root, &program.segments, program.action)
}

fn apply(node: &Value, segments: &[String], action: EditAction) -> Value {
    match segments {
        [] => node.clone(),

        [segment] => match node {
            Value::Object(map) => {
                let mut map = map.clone();
                match action {
                    EditAction::Replace(value) => {
                        map.insert(segment.clone(), value);
                    }
                    EditAction::Remove => {
                        map.shift_remove(segment.as_str());
                    }
                }
                Value::Object(map)
            }
            Value::Array(items) => {
                let mut items = items.clone();
                if let Some(index) = types::slice_to_usize(segment.as_bytes()) {
                    match action {
                        EditAction::Replace(value) if index < items.len() => items[index] = value,
                        EditAction::Remove if index < items.len() => {
                            items.remove(index);
                        }
                        _ => {}
                    }
                }
                Value::Array(items)
            }
            other => other.clone(),
        },

        [segment, rest @ ..] => match node {
            Value::Object(map) => {
                let mut out = map.clone();
                if let Some(child) = map.get(segment.as_str()) {
                    out.insert(segment.clone(), apply(child, rest, action));
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let mut out = items.clone();
                if let Some(index) = types::slice_to_usize(segment.as_bytes()) {
                    if let Some(child) = items.get(index) {
                        out[index] = apply(child, rest, action);
                    }
                }
                Value::Array(out)
            }
            other => other.clone(),
        },
    }
}
