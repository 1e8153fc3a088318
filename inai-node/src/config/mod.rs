// Configuration Module
//
// Node configuration lives in `crate::node::NodeConfig`; logging
// configuration is shared with the rest of the workspace through
// `inai_common` and re-exported here.
//
// ## Examples
//
// ```rust
// use inai_node::config::{ComponentKey, LogLevel, LoggingConfig};
// use inai_node::NodeConfig;
//
// let logging = LoggingConfig::new()
//     .with_default_level(LogLevel::Warn)
//     .with_component_level(ComponentKey::Router, LogLevel::Info);
//
// let config = NodeConfig::new("my-node").with_logging_config(logging);
// ```

pub use inai_common::logging::{ComponentKey, LogLevel, LoggingConfig};
pub use crate::node::NodeConfig;
