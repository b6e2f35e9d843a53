//! Insertion-ordered operation registry.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{McpError, McpResult};

/// Metadata that can be stored in a [`Registry`].
pub trait Descriptor: Clone + Send + Sync + 'static {
    /// Human-readable registry name used in logs.
    const KIND: &'static str;

    /// The unique lookup key (tool name, resource URI, ...).
    fn key(&self) -> &str;

    /// Reject malformed descriptors before they are stored.
    fn validate(&self) -> McpResult<()> {
        if self.key().is_empty() {
            return Err(McpError::Configuration(format!(
                "{} descriptor must have a non-empty key",
                Self::KIND
            )));
        }
        Ok(())
    }

    /// The lookup failure reported for an unknown key.
    fn not_found(key: &str) -> McpError;
}

/// What `register` did with the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    Replaced,
}

struct Entry<D, H> {
    descriptor: D,
    handler: H,
}

/// Name → (descriptor, handler) map that remembers insertion order.
///
/// Re-registering a key replaces the entry in place, so `list()` keeps the
/// position of the first registration.
pub struct Registry<D, H> {
    entries: RwLock<Vec<Entry<D, H>>>,
}

impl<D: Descriptor, H: Clone> Default for Registry<D, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Descriptor, H: Clone> Registry<D, H> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, descriptor: D, handler: H) -> McpResult<Registration> {
        descriptor.validate()?;
        let mut entries = self.write()?;
        let key = descriptor.key().to_string();

        if let Some(entry) = entries.iter_mut().find(|e| e.descriptor.key() == key) {
            entry.descriptor = descriptor;
            entry.handler = handler;
            tracing::debug!("Replaced {} '{key}'", D::KIND);
            return Ok(Registration::Replaced);
        }

        entries.push(Entry {
            descriptor,
            handler,
        });
        tracing::debug!("Registered {} '{key}'", D::KIND);
        Ok(Registration::Added)
    }

    pub fn unregister(&self, key: &str) -> McpResult<D> {
        let mut entries = self.write()?;
        let index = entries
            .iter()
            .position(|e| e.descriptor.key() == key)
            .ok_or_else(|| D::not_found(key))?;
        let removed = entries.remove(index);
        tracing::debug!("Unregistered {} '{key}'", D::KIND);
        Ok(removed.descriptor)
    }

    pub fn get(&self, key: &str) -> McpResult<(D, H)> {
        self.read()?
            .iter()
            .find(|e| e.descriptor.key() == key)
            .map(|e| (e.descriptor.clone(), e.handler.clone()))
            .ok_or_else(|| D::not_found(key))
    }

    /// First entry, in insertion order, for which `matcher` yields a value.
    pub fn find_map<T>(&self, mut matcher: impl FnMut(&D) -> Option<T>) -> McpResult<Option<(D, H, T)>> {
        Ok(self.read()?.iter().find_map(|e| {
            matcher(&e.descriptor).map(|found| (e.descriptor.clone(), e.handler.clone(), found))
        }))
    }

    pub fn list(&self) -> McpResult<Vec<D>> {
        Ok(self.read()?.iter().map(|e| e.descriptor.clone()).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read()
            .map(|entries| entries.iter().any(|e| e.descriptor.key() == key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> McpResult<RwLockReadGuard<'_, Vec<Entry<D, H>>>> {
        self.entries
            .read()
            .map_err(|_| McpError::SessionCorrupted(format!("{} registry lock poisoned", D::KIND)))
    }

    fn write(&self) -> McpResult<RwLockWriteGuard<'_, Vec<Entry<D, H>>>> {
        self.entries
            .write()
            .map_err(|_| McpError::SessionCorrupted(format!("{} registry lock poisoned", D::KIND)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Named(String, u32);

    impl Descriptor for Named {
        const KIND: &'static str = "test";

        fn key(&self) -> &str {
            &self.0
        }

        fn not_found(key: &str) -> McpError {
            McpError::ToolNotFound(key.to_string())
        }
    }

    fn named(name: &str, version: u32) -> Named {
        Named(name.to_string(), version)
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let registry: Registry<Named, u32> = Registry::new();
        for (i, name) in ["zeta", "alpha", "mid"].iter().enumerate() {
            registry.register(named(name, 1), i as u32).unwrap();
        }
        let keys: Vec<String> = registry.list().unwrap().into_iter().map(|d| d.0).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_replacement_is_last_write_wins_in_original_position() {
        let registry: Registry<Named, u32> = Registry::new();
        assert_eq!(registry.register(named("a", 1), 10).unwrap(), Registration::Added);
        registry.register(named("b", 1), 20).unwrap();
        assert_eq!(
            registry.register(named("a", 2), 30).unwrap(),
            Registration::Replaced
        );

        let (descriptor, handler) = registry.get("a").unwrap();
        assert_eq!(descriptor, named("a", 2));
        assert_eq!(handler, 30);

        let order: Vec<String> = registry.list().unwrap().into_iter().map(|d| d.0).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_unknown_is_not_found() {
        let registry: Registry<Named, u32> = Registry::new();
        let err = registry.unregister("ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unregister_then_get_fails() {
        let registry: Registry<Named, u32> = Registry::new();
        registry.register(named("x", 1), 1).unwrap();
        assert_eq!(registry.unregister("x").unwrap(), named("x", 1));
        assert!(registry.get("x").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_key_is_configuration_error() {
        let registry: Registry<Named, u32> = Registry::new();
        let err = registry.register(named("", 1), 1).unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
    }

    #[test]
    fn test_find_map_respects_order() {
        let registry: Registry<Named, u32> = Registry::new();
        registry.register(named("first", 5), 1).unwrap();
        registry.register(named("second", 5), 2).unwrap();
        let hit = registry
            .find_map(|d| (d.1 == 5).then_some(()))
            .unwrap()
            .unwrap();
        assert_eq!(hit.1, 1);
    }
}
