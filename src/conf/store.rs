//! The accepted configuration and its atomic exchange.

use serde_json::{json, Value};

/// Owns the tree visible to `GET`. Only the apply serializer exchanges
/// it, and only on the control task.
pub(crate) struct ConfStore {
    current: Value,
}

impl ConfStore {
    /// Nothing persists across restarts; every controller starts from
    /// the empty default.
    #[inline]
    pub(crate) fn startup() -> Self {
        Self {
            current: json!({ "listeners": {}, "applications": {} }),
        }
    }

    #[inline(always)]
    pub(crate) fn current(&self) -> &Value {
        &self.current
    }

    /// Installs an accepted candidate. The previous tree is dropped
    /// whole.
    #[inline]
    pub(crate) fn swap(&mut self, next: Value) {
        self.current = next;
    }
}
