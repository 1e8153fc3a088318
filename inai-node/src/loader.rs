// Code Loader Module
//
// INTENTION:
// Turn the source text posted to `_services` into a compiled service
// definition. Rather than evaluating source code, the node resolves the
// text against a catalog of plugin factories registered at runtime: the
// source names a plugin and carries its parameters, and the factory builds
// the definition from them.
//
// Source text format (JSON):
//
//     {"plugin": "<registered plugin name>", "params": <any JSON>}
//
// Every failure to produce a definition is a LoadError, which callers
// report as a bad request. Nothing raised by a factory crosses this
// boundary, panics included.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

use crate::error::{panic_message, MeshError};
use crate::services::ServiceDefinition;

/// Why a source text could not be compiled
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source is not a plugin manifest: {0}")]
    Parse(String),

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("plugin '{plugin}' rejected its parameters: {reason}")]
    Factory { plugin: String, reason: String },

    #[error("plugin '{plugin}' panicked: {reason}")]
    Panicked { plugin: String, reason: String },
}

impl From<LoadError> for MeshError {
    fn from(err: LoadError) -> Self {
        MeshError::BadRequest(err.to_string())
    }
}

/// Compiles source text into a service definition
pub trait CodeLoader: Send + Sync {
    fn compile(&self, code_id: &str, source: &str)
        -> Result<Arc<dyn ServiceDefinition>, LoadError>;
}

/// Parsed form of a source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    pub plugin: String,
    #[serde(default)]
    pub params: Value,
}

impl SourceManifest {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn parse(source: &str) -> Result<Self, LoadError> {
        serde_json::from_str(source).map_err(|e| LoadError::Parse(e.to_string()))
    }

    /// Source text for this manifest
    pub fn to_source(&self) -> String {
        // A struct of a String and a Value always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Builds a definition from the manifest's `params`
pub type PluginFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn ServiceDefinition>> + Send + Sync>;

/// Runtime-registered table of plugin factories; the default `CodeLoader`.
#[derive(Default)]
pub struct PluginCatalog {
    factories: DashMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a parameterized plugin.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> anyhow::Result<Arc<dyn ServiceDefinition>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a plugin that ignores its parameters.
    pub fn register_definition(
        &self,
        name: impl Into<String>,
        definition: Arc<dyn ServiceDefinition>,
    ) {
        self.register(name, move |_params: &Value| Ok(definition.clone()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl CodeLoader for PluginCatalog {
    fn compile(
        &self,
        _code_id: &str,
        source: &str,
    ) -> Result<Arc<dyn ServiceDefinition>, LoadError> {
        let manifest = SourceManifest::parse(source)?;
        let factory = self
            .factories
            .get(&manifest.plugin)
            .map(|f| f.value().clone())
            .ok_or_else(|| LoadError::UnknownPlugin(manifest.plugin.clone()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| factory(&manifest.params))) {
            Ok(Ok(definition)) => Ok(definition),
            Ok(Err(err)) => Err(LoadError::Factory {
                plugin: manifest.plugin,
                reason: err.to_string(),
            }),
            Err(payload) => Err(LoadError::Panicked {
                plugin: manifest.plugin,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{definition, Instance};
    use anyhow::anyhow;
    use inai_common::logging::Logger;
    use serde_json::json;

    fn catalog() -> PluginCatalog {
        let catalog = PluginCatalog::new();
        catalog.register_definition(
            "noop",
            definition(|_instance: &mut Instance, _logger: &Logger| Ok(())),
        );
        catalog.register("sized", |params: &Value| {
            let size = params
                .get("size")
                .and_then(Value::as_u64)
                .ok_or_else(|| anyhow!("size is required"))?;
            if size == 0 {
                panic!("size must be positive");
            }
            Ok(definition(|_instance: &mut Instance, _logger: &Logger| Ok(())))
        });
        catalog
    }

    #[test]
    fn test_compile_known_plugins() {
        let catalog = catalog();
        assert_eq!(catalog.plugins(), vec!["noop".to_string(), "sized".to_string()]);

        assert!(catalog.compile("a", r#"{"plugin": "noop"}"#).is_ok());
        let source = SourceManifest::new("sized")
            .with_params(json!({"size": 2}))
            .to_source();
        assert!(catalog.compile("b", &source).is_ok());
    }

    #[test]
    fn test_compile_failures_are_load_errors() {
        let catalog = catalog();
        assert!(matches!(
            catalog.compile("a", "function (instance) {}"),
            Err(LoadError::Parse(_))
        ));
        assert!(matches!(
            catalog.compile("a", r#"{"plugin": "ghost"}"#),
            Err(LoadError::UnknownPlugin(name)) if name == "ghost"
        ));
        assert!(matches!(
            catalog.compile("a", r#"{"plugin": "sized", "params": {}}"#),
            Err(LoadError::Factory { .. })
        ));
        assert!(matches!(
            catalog.compile("a", r#"{"plugin": "sized", "params": {"size": 0}}"#),
            Err(LoadError::Panicked { .. })
        ));

        let err: MeshError = LoadError::UnknownPlugin("ghost".into()).into();
        assert_eq!(err.status(), 400);
    }
}
