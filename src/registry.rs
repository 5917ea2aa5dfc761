//! Connection registry
//!
//! Owns the id → connection map and the "active" default. The lock is only
//! held for map operations, never across a protocol command.

use crate::connection::Connection;
use crate::error::DebuggerError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of live connections
pub type ConnectionRegistry = Registry<Arc<Connection>>;

struct Inner<T> {
    entries: HashMap<String, T>,
    active: Option<String>,
    next_id: u64,
}

/// Id-keyed map with a default ("active") entry
pub struct Registry<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                active: None,
                next_id: 1,
            }),
        }
    }
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the value built by `make` under `requested` (or a generated id).
    ///
    /// The first entry becomes active. `make` runs under the write lock, so it
    /// must not block.
    pub fn register(
        &self,
        requested: Option<&str>,
        make: impl FnOnce(&str) -> T,
    ) -> Result<(String, T), DebuggerError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let id = match requested {
            Some(id) if inner.entries.contains_key(id) => {
                return Err(DebuggerError::ConnectionExists { id: id.to_string() })
            }
            Some(id) => id.to_string(),
            None => loop {
                let candidate = format!("conn-{}", inner.next_id);
                inner.next_id += 1;
                if !inner.entries.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let value = make(&id);
        inner.entries.insert(id.clone(), value.clone());
        if inner.active.is_none() {
            inner.active = Some(id.clone());
        }
        Ok((id, value))
    }

    /// Look up `id`, or the active entry when `id` is `None`
    pub fn get(&self, id: Option<&str>) -> Option<T> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let key = match id {
            Some(id) => id,
            None => inner.active.as_deref()?,
        };
        inner.entries.get(key).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(id)
    }

    /// Remove `id`. Removing the active entry clears the active pointer.
    pub fn remove(&self, id: &str) -> Option<T> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.entries.remove(id)?;
        if inner.active.as_deref() == Some(id) {
            inner.active = None;
        }
        Some(removed)
    }

    pub fn switch_active(&self, id: &str) -> Result<(), DebuggerError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.entries.contains_key(id) {
            return Err(DebuggerError::not_connected(Some(id)));
        }
        inner.active = Some(id.to_string());
        Ok(())
    }

    pub fn active_id(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.active.clone()
    }

    /// Registered ids, sorted
    pub fn list(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = inner.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove everything, returning the removed values
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.active = None;
        inner.entries.drain().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn registry_with(ids: &[&str]) -> Registry<String> {
        let registry = Registry::new();
        for id in ids {
            registry.register(Some(*id), |id| format!("value-{id}")).unwrap();
        }
        registry
    }

    #[test]
    fn test_first_registered_becomes_active() {
        let registry = registry_with(&["a", "b"]);
        assert_eq!(registry.active_id().as_deref(), Some("a"));
        assert_eq!(registry.get(None).as_deref(), Some("value-a"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let registry: Registry<u32> = Registry::new();
        let (first, _) = registry.register(None, |_| 1).unwrap();
        let (second, _) = registry.register(None, |_| 2).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_generated_id_skips_taken_names() {
        let registry = registry_with(&["conn-1"]);
        let (id, _) = registry.register(None, |id| id.to_string()).unwrap();
        assert_eq!(id, "conn-2");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = registry_with(&["a"]);
        let err = registry.register(Some("a"), |_| String::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionExists);
        assert_eq!(registry.get(Some("a")).as_deref(), Some("value-a"));
    }

    #[test]
    fn test_removing_active_clears_default() {
        let registry = registry_with(&["a", "b"]);
        assert!(registry.remove("a").is_some());
        assert!(registry.active_id().is_none());
        assert!(registry.get(None).is_none());
        // Explicit lookups still work
        assert_eq!(registry.get(Some("b")).as_deref(), Some("value-b"));
    }

    #[test]
    fn test_removing_other_keeps_active() {
        let registry = registry_with(&["a", "b"]);
        registry.remove("b");
        assert_eq!(registry.active_id().as_deref(), Some("a"));
    }

    #[test]
    fn test_register_after_active_removed_becomes_active() {
        let registry = registry_with(&["a"]);
        registry.remove("a");
        registry.register(Some("c"), |_| "value-c".into()).unwrap();
        assert_eq!(registry.get(None).as_deref(), Some("value-c"));
    }

    #[test]
    fn test_switch_active_unknown_fails() {
        let registry = registry_with(&["a"]);
        let err = registry.switch_active("zzz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChromeNotConnected);
        assert_eq!(registry.active_id().as_deref(), Some("a"));
    }

    #[test]
    fn test_switch_active() {
        let registry = registry_with(&["a", "b"]);
        registry.switch_active("b").unwrap();
        assert_eq!(registry.get(None).as_deref(), Some("value-b"));
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = registry_with(&["b", "c", "a"]);
        assert_eq!(registry.list(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = registry_with(&["a", "b"]);
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
        assert!(registry.active_id().is_none());
    }
}
