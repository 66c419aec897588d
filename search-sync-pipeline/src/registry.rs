//! Named lookup of live search factories.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::factory::SearchFactory;

/// Registry of factories by name.
///
/// Entries are weak: a factory dropped without [`SearchFactory::stop`] no
/// longer resolves, and its name can be registered again.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: Mutex<HashMap<String, Weak<SearchFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Weak<SearchFactory>>> {
        // A poisoned map is still consistent: every operation is a single insert or remove.
        self.factories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `factory` under its configured name.
    ///
    /// Fails with a configuration error if a live factory already uses the name.
    pub fn register(&self, factory: &Arc<SearchFactory>) -> Result<(), PipelineError> {
        let name = factory.name().to_string();
        let mut entries = self.entries();
        if entries
            .get(&name)
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            return Err(PipelineError::configuration(format!(
                "A search factory named {} is already registered",
                name
            )));
        }
        entries.insert(name.clone(), Arc::downgrade(factory));
        info!(factory = %name, "Registered search factory");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<SearchFactory>> {
        self.entries().get(name).and_then(Weak::upgrade)
    }

    /// Remove `name`. Returns whether an entry existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.entries().remove(name).is_some();
        if removed {
            debug!(factory = %name, "Unregistered search factory");
        }
        removed
    }

    /// Names of live factories, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut entries = self.entries();
        entries.retain(|_, factory| factory.strong_count() > 0);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}
