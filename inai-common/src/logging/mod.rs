// Logging utilities for the Inai runtime
//
// This module provides a component-based logging system with:
// - Compile-time efficient macros
// - Component-based structured logging (the component doubles as the log target)
// - Node ID tracking through logger inheritance
// - Instance address and request path tracing

use log::{debug, error, info, warn};
use std::fmt::{self, Arguments, Display, Formatter};

mod config;

pub use config::{ComponentKey, LogLevel, LogLevelParseError, LoggingConfig};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Node,
    Registry,
    Router,
    CodeStore,
    Lifecycle,
    Policy,
    AtomicQueue,
    Service,
    System,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Node => "Node",
            Component::Registry => "Registry",
            Component::Router => "Router",
            Component::CodeStore => "CodeStore",
            Component::Lifecycle => "Lifecycle",
            Component::Policy => "Policy",
            Component::AtomicQueue => "AtomicQueue",
            Component::Service => "Service",
            Component::System => "System",
            Component::Custom(name) => name,
        }
    }

    /// The `log` target used for records emitted by this component.
    ///
    /// Targets are what `LoggingConfig::with_component_level` filters on.
    pub fn target(&self) -> &'static str {
        match self {
            Component::Node => "inai::node",
            Component::Registry => "inai::registry",
            Component::Router => "inai::router",
            Component::CodeStore => "inai::code_store",
            Component::Lifecycle => "inai::lifecycle",
            Component::Policy => "inai::policy",
            Component::AtomicQueue => "inai::atomic_queue",
            Component::Service => "inai::service",
            Component::System => "inai::system",
            Component::Custom(_) => "inai::custom",
        }
    }
}

// Lightweight Display helpers to avoid prefix String allocations
struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Node => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

struct MaybeFieldDisplay<'a>(&'static str, Option<&'a str>);

impl Display for MaybeFieldDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(value) = self.1 {
            write!(f, "|{}={value}", self.0)
        } else {
            Ok(())
        }
    }
}

/// A helper for creating component-specific loggers with node ID tracking
#[derive(Clone, Debug)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Node ID the logger belongs to
    node_id: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
    /// Address of the instance this logger speaks for
    address: Option<String>,
    /// Request path (`verb service resid`) being traced
    request_path: Option<String>,
}

impl Logger {
    /// Create a new root logger for a specific component and node ID
    /// This should only be called by the Node root component
    pub fn new_root(component: Component, node_id: &str) -> Self {
        Self {
            component,
            node_id: node_id.to_string(),
            parent_component: None,
            address: None,
            request_path: None,
        }
    }

    /// Create a child logger with the same node ID but different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            node_id: self.node_id.clone(),
            parent_component: Some(self.component),
            address: self.address.clone(),
            request_path: self.request_path.clone(),
        }
    }

    /// Create a logger bound to an instance address
    pub fn with_address(&self, address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..self.clone()
        }
    }

    /// Create a logger that traces a single request
    pub fn with_request_path(&self, path: impl Into<String>) -> Self {
        Self {
            request_path: Some(path.into()),
            ..self.clone()
        }
    }

    /// Get a reference to the node ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the component of this logger
    pub fn component(&self) -> Component {
        self.component
    }

    /// Get the instance address if available
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Get the request path if available
    pub fn request_path(&self) -> Option<&str> {
        self.request_path.as_deref()
    }

    fn is_bare_root(&self) -> bool {
        self.component == Component::Node
            && self.parent_component.is_none()
            && self.address.is_none()
            && self.request_path.is_none()
    }

    fn emit(&self, level: log::Level, args: Arguments) {
        let target = self.component.target();
        if !log::log_enabled!(target: target, level) {
            return;
        }
        // Skip displaying the component if it's the root Node to avoid redundancy
        if self.is_bare_root() {
            match level {
                log::Level::Error => error!(target: target, "[{}] {}", self.node_id, args),
                log::Level::Warn => warn!(target: target, "[{}] {}", self.node_id, args),
                log::Level::Info => info!(target: target, "[{}] {}", self.node_id, args),
                _ => debug!(target: target, "[{}] {}", self.node_id, args),
            }
            return;
        }
        let prefix = ComponentPrefixDisplay {
            parent: self.parent_component,
            component: self.component,
        };
        let address = MaybeFieldDisplay("addr", self.address());
        let request = MaybeFieldDisplay("req", self.request_path());
        match level {
            log::Level::Error => error!(
                target: target,
                "[{}][{}{}{}] {}", self.node_id, prefix, address, request, args
            ),
            log::Level::Warn => warn!(
                target: target,
                "[{}][{}{}{}] {}", self.node_id, prefix, address, request, args
            ),
            log::Level::Info => info!(
                target: target,
                "[{}][{}{}{}] {}", self.node_id, prefix, address, request, args
            ),
            _ => debug!(
                target: target,
                "[{}][{}{}{}] {}", self.node_id, prefix, address, request, args
            ),
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        self.emit(log::Level::Debug, format_args!("{}", message.into()));
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        self.emit(log::Level::Debug, args);
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(log::Level::Info, format_args!("{}", message.into()));
    }

    /// Log an info message using fmt::Arguments
    pub fn info_args(&self, args: Arguments) {
        self.emit(log::Level::Info, args);
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(log::Level::Warn, format_args!("{}", message.into()));
    }

    /// Log a warning using fmt::Arguments
    pub fn warn_args(&self, args: Arguments) {
        self.emit(log::Level::Warn, args);
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        self.emit(log::Level::Error, format_args!("{}", message.into()));
    }

    /// Log an error using fmt::Arguments
    pub fn error_args(&self, args: Arguments) {
        self.emit(log::Level::Error, args);
    }
}
