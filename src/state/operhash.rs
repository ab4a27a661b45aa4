//! Interned operator identities.
//!
//! Every reservation keeps a handle to the identity of the oper who
//! placed it. Identities repeat heavily (one oper, many bans), so they
//! are interned with explicit refcounts: `add` and `delete` must pair
//! over a handle's lifecycle, and the entry is dropped at zero.

use std::collections::HashMap;
use std::sync::Arc;

/// A counted handle to an interned operator identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperName(Arc<str>);

impl OperName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The interner. One per process, owned by the store aggregate.
#[derive(Debug, Default)]
pub struct OperHash {
    entries: HashMap<Arc<str>, usize>,
}

impl OperHash {
    /// Intern `name`, bumping its refcount.
    pub fn add(&mut self, name: &str) -> OperName {
        if let Some((key, count)) = self.entries.get_key_value(name) {
            let key = key.clone();
            let count = count + 1;
            self.entries.insert(key.clone(), count);
            return OperName(key);
        }
        let key: Arc<str> = Arc::from(name);
        self.entries.insert(key.clone(), 1);
        OperName(key)
    }

    /// Release one reference; the entry is forgotten at zero.
    pub fn delete(&mut self, handle: &OperName) {
        if let Some(count) = self.entries.get_mut(&handle.0) {
            *count -= 1;
            if *count == 0 {
                self.entries.remove(&handle.0);
            }
        }
    }

    #[cfg(test)]
    fn refcount(&self, name: &str) -> usize {
        self.entries.get(name).copied().unwrap_or(0)
    }
}
