//! Path addressing into the configuration tree.
//!
//! A path is a `/`-separated address: object members by name, array
//! elements by decimal index. `/` is the root; one trailing `/` is
//! insignificant.

use crate::http::types;
use serde_json::Value;

/// Strips at most one trailing `/`, except from the root itself.
#[inline]
pub(crate) fn normalize(target: &str) -> &str {
    if target.len() > 1 && target.ends_with('/') {
        &target[..target.len() - 1]
    } else {
        target
    }
}

#[inline(always)]
pub(crate) fn is_root(path: &str) -> bool {
    path == "/"
}

/// Splits a non-root path into its segments.
#[inline]
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

/// Walks `path` down from `root`. `None` when any step misses.
pub(crate) fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if is_root(path) {
        return Some(root);
    }

    let mut node = root;

    for segment in segments(path) {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(types::slice_to_usize(segment.as_bytes())?)?,
            _ => return None,
        };
    }

    Some(node)
}
