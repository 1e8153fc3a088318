// Code Store Module
//
// INTENTION:
// Hold the compiled service definitions keyed by code id, and keep the
// bookkeeping of which live instances were created from each definition and
// which configuration each of them was booted with. That bookkeeping is what
// makes live update possible: re-posting every instance of a code id with
// its recorded boot config.
//
// The store does not create or destroy instances; the Node's lifecycle
// operations do, and report every step here.

use dashmap::DashMap;
use inai_common::logging::Logger;
use inai_common::log_debug;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::services::{ServiceAddress, ServiceDefinition};

/// A compiled definition plus the instances created from it
pub struct CodeEntry {
    definition: Arc<dyn ServiceDefinition>,
    instances: HashSet<ServiceAddress>,
    boot_configs: HashMap<ServiceAddress, Option<Value>>,
}

impl CodeEntry {
    fn new(definition: Arc<dyn ServiceDefinition>) -> Self {
        Self {
            definition,
            instances: HashSet::new(),
            boot_configs: HashMap::new(),
        }
    }
}

impl fmt::Debug for CodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeEntry")
            .field("instances", &self.instances)
            .field("boot_configs", &self.boot_configs)
            .finish()
    }
}

/// Code id -> CodeEntry
pub struct CodeStore {
    entries: DashMap<String, CodeEntry>,
    logger: Arc<Logger>,
}

impl CodeStore {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            entries: DashMap::new(),
            logger,
        }
    }

    /// Install a definition under `code_id`.
    ///
    /// Replacing the definition of an existing entry keeps its instance
    /// bookkeeping. Returns the instances running the previous definition
    /// together with their boot configs, sorted by address.
    pub fn install(
        &self,
        code_id: &str,
        definition: Arc<dyn ServiceDefinition>,
    ) -> Vec<(ServiceAddress, Option<Value>)> {
        let mut entry = self
            .entries
            .entry(code_id.to_string())
            .or_insert_with(|| CodeEntry::new(definition.clone()));
        entry.definition = definition;

        let mut running: Vec<(ServiceAddress, Option<Value>)> = entry
            .instances
            .iter()
            .map(|address| {
                let config = entry.boot_configs.get(address).cloned().flatten();
                (address.clone(), config)
            })
            .collect();
        running.sort_by(|a, b| a.0.cmp(&b.0));

        log_debug!(
            self.logger,
            "installed code '{}' ({} running instances)",
            code_id,
            running.len()
        );
        running
    }

    pub fn definition(&self, code_id: &str) -> Option<Arc<dyn ServiceDefinition>> {
        self.entries.get(code_id).map(|e| e.definition.clone())
    }

    pub fn contains(&self, code_id: &str) -> bool {
        self.entries.contains_key(code_id)
    }

    /// Record `address` as an instance of `code_id` booted with `config`.
    /// Returns false if the code id is unknown.
    pub fn track(&self, code_id: &str, address: &str, config: Option<Value>) -> bool {
        match self.entries.get_mut(code_id) {
            Some(mut entry) => {
                entry.instances.insert(address.to_string());
                entry.boot_configs.insert(address.to_string(), config);
                true
            }
            None => false,
        }
    }

    /// Forget `address` as an instance of `code_id`. Returns whether it was tracked.
    pub fn untrack(&self, code_id: &str, address: &str) -> bool {
        match self.entries.get_mut(code_id) {
            Some(mut entry) => {
                entry.boot_configs.remove(address);
                entry.instances.remove(address)
            }
            None => false,
        }
    }

    /// Move the bookkeeping of an instance from one address to another.
    pub fn rekey(&self, code_id: &str, from: &str, to: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(code_id) else {
            return false;
        };
        if !entry.instances.remove(from) {
            return false;
        }
        let config = entry.boot_configs.remove(from).flatten();
        entry.instances.insert(to.to_string());
        entry.boot_configs.insert(to.to_string(), config);
        true
    }

    /// Whether `address` is a tracked instance of `code_id`.
    pub fn owns(&self, code_id: &str, address: &str) -> bool {
        self.entries
            .get(code_id)
            .map(|e| e.instances.contains(address))
            .unwrap_or(false)
    }

    /// Instances of `code_id` and their boot configs, sorted by address.
    /// `None` for an unknown code id.
    pub fn instances_of(&self, code_id: &str) -> Option<Vec<(ServiceAddress, Option<Value>)>> {
        let entry = self.entries.get(code_id)?;
        let mut instances: Vec<(ServiceAddress, Option<Value>)> = entry
            .instances
            .iter()
            .map(|address| {
                let config = entry.boot_configs.get(address).cloned().flatten();
                (address.clone(), config)
            })
            .collect();
        instances.sort_by(|a, b| a.0.cmp(&b.0));
        Some(instances)
    }

    /// Boot config recorded for an instance.
    pub fn boot_config(&self, code_id: &str, address: &str) -> Option<Value> {
        self.entries
            .get(code_id)
            .and_then(|e| e.boot_configs.get(address).cloned().flatten())
    }

    /// Installed code ids, sorted.
    pub fn code_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
