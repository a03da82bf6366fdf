//! Processor registry
//!
//! Name → processor map shared by every worker. Lookups are read-locked and
//! cheap; registration happens at startup but is safe at any time.

use crate::error::ProcessorError;
use crate::processor::Processor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    processors: HashMap<String, Arc<dyn Processor>>,
    /// Names in registration order
    order: Vec<String>,
    /// Content type → names, in registration order
    by_type: HashMap<String, Vec<String>>,
}

/// Registry for managing and retrieving processors.
///
/// Cloning is cheap and clones share the same map.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the maps half-updated, so
    // poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a processor under `name`, replacing any previous one.
    ///
    /// A replaced processor moves to the end of the registration order and is
    /// re-indexed by its new content types.
    pub fn register(&self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        let name = name.into();
        let mut inner = self.write();

        if inner.processors.remove(&name).is_some() {
            inner.order.retain(|n| n != &name);
            for names in inner.by_type.values_mut() {
                names.retain(|n| n != &name);
            }
            inner.by_type.retain(|_, names| !names.is_empty());
            tracing::debug!(processor = %name, "Replacing registered processor");
        }

        for content_type in processor.supported_types() {
            inner
                .by_type
                .entry(normalize_content_type(content_type))
                .or_default()
                .push(name.clone());
        }
        inner.order.push(name.clone());
        inner.processors.insert(name, processor);
    }

    /// Get a processor by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.read().processors.get(name).cloned()
    }

    /// Get a processor by name, or a `NotRegistered` error
    pub fn get_or_error(&self, name: &str) -> Result<Arc<dyn Processor>, ProcessorError> {
        self.get(name)
            .ok_or_else(|| ProcessorError::NotRegistered(name.to_string()))
    }

    /// Get a processor by name.
    ///
    /// # Panics
    ///
    /// Panics when nothing is registered under `name`. Prefer
    /// [`Registry::get_or_error`] outside startup code.
    pub fn must_get(&self, name: &str) -> Arc<dyn Processor> {
        match self.get(name) {
            Some(processor) => processor,
            None => panic!("processor not registered: {name}"),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().processors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().processors.keys().cloned().collect();
        names.sort();
        names
    }

    /// All processors declaring `content_type`, in registration order.
    ///
    /// Parameters such as `; charset=...` are ignored.
    pub fn for_content_type(&self, content_type: &str) -> Vec<Arc<dyn Processor>> {
        let inner = self.read();
        inner
            .by_type
            .get(&normalize_content_type(content_type))
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| inner.processors.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.read().processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}
