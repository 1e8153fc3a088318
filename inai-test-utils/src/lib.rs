// Test utilities for Inai crates
//
// This crate provides test-specific functionality that should not be available
// in production builds. All functions in this crate are for testing only.

pub mod fixtures;

use anyhow::Result;
use inai_common::logging::{LogLevel, LoggingConfig};
use inai_node::{Node, NodeConfig, PluginCatalog, SourceManifest};
use serde_json::Value;
use std::sync::Arc;

use crate::fixtures::custom_route::custom_route_definition;
use crate::fixtures::echo::echo_definition;
use crate::fixtures::faulty::faulty_definition;
use crate::fixtures::static_get::static_get_definition;

/// Create a node configuration for tests: a unique node id and quiet logging.
pub fn create_node_test_config() -> NodeConfig {
    let logging = LoggingConfig::new().with_default_level(LogLevel::Warn);
    NodeConfig::new(format!("test-node-{}", uuid::Uuid::new_v4())).with_logging_config(logging)
}

/// A catalog with the parameter-free fixtures registered as plugins:
/// `echo`, `faulty`, `custom_route`, and `static_get` (its params are the body).
pub fn create_test_catalog() -> Arc<PluginCatalog> {
    let catalog = PluginCatalog::new();
    catalog.register_definition("echo", echo_definition());
    catalog.register_definition("faulty", faulty_definition());
    catalog.register_definition("custom_route", custom_route_definition());
    catalog.register("static_get", |params: &Value| {
        Ok(static_get_definition(params.clone()))
    });
    Arc::new(catalog)
}

/// Start a node that loads code from `catalog`.
pub async fn create_test_node(catalog: Arc<PluginCatalog>) -> Result<Node> {
    Node::with_loader(create_node_test_config(), catalog).await
}

/// Source text naming a registered plugin.
pub fn plugin_source(plugin: &str) -> String {
    SourceManifest::new(plugin).to_source()
}

/// Source text naming a registered plugin, with parameters.
pub fn plugin_source_with(plugin: &str, params: Value) -> String {
    SourceManifest::new(plugin).with_params(params).to_source()
}
