//! Name → sink index shared by a logger and its sinks

use super::error::{LoggerError, Result};
use super::sink::{SinkHandle, SinkInfo, SinkShared};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

struct RegistryEntry {
    shared: Arc<SinkShared>,
    handle: Weak<SinkHandle>,
}

impl RegistryEntry {
    fn is_live(&self) -> bool {
        self.shared.is_open() && self.handle.strong_count() > 0
    }
}

/// Sinks of one logger, keyed by their current name
///
/// Entries are removed by the consumer once it processed a sink's close
/// record. A sink's producer mutex may be held while calling into the
/// registry, never the other way around.
#[derive(Default)]
pub(crate) struct Registry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Live, open sink registered under `name`
    ///
    /// The upgraded handle is returned to the caller and dropped outside
    /// the lock, so a last-handle close can never run under it.
    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<SinkHandle>> {
        let handle = {
            let entries = self.entries.read();
            entries.get(name).and_then(|e| e.handle.upgrade())
        };
        handle.filter(|h| h.shared.is_open())
    }

    /// Register a new sink, failing if another live sink owns the name
    pub(crate) fn insert(&self, handle: &Arc<SinkHandle>) -> Result<()> {
        let name = handle.shared.name();
        let mut entries = self.entries.write();
        if entries.get(&name).is_some_and(RegistryEntry::is_live) {
            return Err(LoggerError::SinkNameInUse { name });
        }
        entries.insert(
            name,
            RegistryEntry {
                shared: Arc::clone(&handle.shared),
                handle: Arc::downgrade(handle),
            },
        );
        Ok(())
    }

    /// Move `shared` to `new_name` and update its producer-side name
    pub(crate) fn rename(&self, shared: &Arc<SinkShared>, new_name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(new_name) {
            if !Arc::ptr_eq(&existing.shared, shared) && existing.is_live() {
                return Err(LoggerError::SinkNameInUse {
                    name: new_name.to_string(),
                });
            }
        }

        let old_name = shared.name();
        let entry = match entries.get(&old_name) {
            Some(e) if Arc::ptr_eq(&e.shared, shared) => entries.remove(&old_name),
            _ => None,
        };
        shared.set_registered_name(new_name);
        if let Some(entry) = entry {
            entries.insert(new_name.to_string(), entry);
        }
        Ok(())
    }

    /// Forget `shared`, wherever it is registered
    pub(crate) fn remove(&self, shared: &Arc<SinkShared>) {
        self.entries
            .write()
            .retain(|_, e| !Arc::ptr_eq(&e.shared, shared));
    }

    /// Snapshot of every registered sink, sorted by name
    pub(crate) fn infos(&self) -> Vec<SinkInfo> {
        let mut infos: Vec<SinkInfo> = self
            .entries
            .read()
            .values()
            .map(|e| e.shared.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Shared state of every registered sink whose name passes `filter`
    pub(crate) fn matching<F>(&self, mut filter: F) -> Vec<Arc<SinkShared>>
    where
        F: FnMut(&str) -> bool,
    {
        self.entries
            .read()
            .iter()
            .filter(|(name, _)| filter(name))
            .map(|(_, e)| Arc::clone(&e.shared))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
