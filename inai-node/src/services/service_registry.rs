// Service Registry Module
//
// INTENTION:
// This module provides the node's name registry: the mapping of symbolic
// service names to instance addresses, plus free-form metadata records
// stored under `<name>/_meta` keys of the same mapping. It is the node's
// service discovery. The Registry never calls into instances; resolving a
// name to a live instance and invoking it is the Node's responsibility.
//
// ARCHITECTURAL PRINCIPLES:
// 1. One mapping - addresses and metadata share one key space, the `/_meta`
//    suffix is a naming convention
// 2. Typed lookups - resolving an absent name is a NotFound result, never a panic
// 3. Orphan tracking - addresses no longer referenced by any name are
//    recorded for diagnostics only; nothing is cleaned up

use dashmap::{DashMap, DashSet};
use inai_common::logging::Logger;
use inai_common::log_debug;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{MeshError, Result};
use crate::services::ServiceAddress;

/// Suffix marking a metadata key.
pub const META_SUFFIX: &str = "/_meta";

/// Whether a registry key names a metadata record.
pub fn is_meta_key(name: &str) -> bool {
    name.ends_with(META_SUFFIX)
}

/// Metadata key for a service name.
pub fn meta_key(name: &str) -> String {
    if is_meta_key(name) {
        name.to_string()
    } else {
        format!("{name}{META_SUFFIX}")
    }
}

/// Value stored under a registry key
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEntry {
    /// `name -> address`
    Address(ServiceAddress),
    /// `name/_meta -> any JSON`
    Meta(Value),
}

impl RegistryEntry {
    /// JSON form used by the `_dns` pseudo-service.
    pub fn to_value(&self) -> Value {
        match self {
            RegistryEntry::Address(address) => Value::String(address.clone()),
            RegistryEntry::Meta(value) => value.clone(),
        }
    }
}

/// Name registry of the node
pub struct Registry {
    entries: DashMap<String, RegistryEntry>,
    orphans: DashSet<ServiceAddress>,
    logger: Arc<Logger>,
}

impl Registry {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            entries: DashMap::new(),
            orphans: DashSet::new(),
            logger,
        }
    }

    /// Resolve a name to an address. Metadata keys never resolve.
    pub fn resolve(&self, name: &str) -> Result<ServiceAddress> {
        match self.entries.get(name).as_deref() {
            Some(RegistryEntry::Address(address)) => Ok(address.clone()),
            _ => Err(MeshError::NotFound(format!("name '{name}'"))),
        }
    }

    /// Raw entry under a key (address or metadata).
    pub fn lookup(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Bind `name` to `address`.
    ///
    /// If `name` pointed at a different address that no other name still
    /// references, that address is marked orphaned. Binding a metadata key
    /// stores the address string verbatim as metadata.
    pub fn bind(&self, name: &str, address: &str) {
        if is_meta_key(name) {
            self.set_meta(name, Value::String(address.to_string()));
            return;
        }

        let previous = self.entries.insert(
            name.to_string(),
            RegistryEntry::Address(address.to_string()),
        );
        self.orphans.remove(address);

        if let Some(RegistryEntry::Address(previous)) = previous {
            if previous != address {
                log_debug!(
                    self.logger,
                    "rebinding '{}' from {} to {}",
                    name,
                    previous,
                    address
                );
                self.mark_if_orphaned(&previous);
            }
        }
    }

    /// Store a registry value the way the `_dns` pseudo-service does:
    /// metadata keys take any JSON, plain names require an address string.
    pub fn put(&self, name: &str, value: Value) -> Result<()> {
        if is_meta_key(name) {
            self.set_meta(name, value);
            return Ok(());
        }
        match value {
            Value::String(address) => {
                self.bind(name, &address);
                Ok(())
            }
            other => Err(MeshError::BadRequest(format!(
                "address for '{name}' must be a string, got {other}"
            ))),
        }
    }

    /// Store metadata for a name (the `/_meta` suffix is added if missing).
    pub fn set_meta(&self, name: &str, value: Value) {
        self.entries.insert(meta_key(name), RegistryEntry::Meta(value));
    }

    /// Metadata recorded for a name.
    pub fn meta(&self, name: &str) -> Option<Value> {
        match self.entries.get(&meta_key(name)).as_deref() {
            Some(RegistryEntry::Meta(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Remove a key. Returns the removed entry.
    pub fn unbind(&self, name: &str) -> Option<RegistryEntry> {
        let removed = self.entries.remove(name).map(|(_, entry)| entry);
        if let Some(RegistryEntry::Address(address)) = &removed {
            self.mark_if_orphaned(address);
        }
        removed
    }

    /// Whether any name currently points at `address`.
    pub fn is_referenced(&self, address: &str) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.value(), RegistryEntry::Address(a) if a == address))
    }

    /// Names currently bound to an address (metadata keys excluded), sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches!(e.value(), RegistryEntry::Address(_)))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Names bound to `address`, sorted.
    pub fn names_for(&self, address: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches!(e.value(), RegistryEntry::Address(a) if a == address))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Addresses that lost their last name, sorted.
    pub fn orphans(&self) -> Vec<ServiceAddress> {
        let mut orphans: Vec<ServiceAddress> = self.orphans.iter().map(|a| a.clone()).collect();
        orphans.sort();
        orphans
    }

    pub fn is_orphan(&self, address: &str) -> bool {
        self.orphans.contains(address)
    }

    fn mark_if_orphaned(&self, address: &str) {
        if !self.is_referenced(address) {
            log_debug!(self.logger, "address {} is now orphaned", address);
            self.orphans.insert(address.to_string());
        }
    }
}
