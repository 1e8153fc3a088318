// Logging configuration
//
// INTENTION: Describe how a node wants its logs emitted (default level plus
// optional per-component overrides) and install an env_logger backend
// accordingly. Components map onto log targets, see `Component::target`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::Component;

/// Log verbosity levels understood by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::Off => "off",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct LogLevelParseError(pub String);

impl FromStr for LogLevel {
    type Err = LogLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "off" | "none" => Ok(LogLevel::Off),
            other => Err(LogLevelParseError(other.to_string())),
        }
    }
}

/// Key used for per-component log level overrides
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentKey {
    Node,
    Registry,
    Router,
    CodeStore,
    Lifecycle,
    Policy,
    AtomicQueue,
    Service,
    System,
    Custom,
}

impl ComponentKey {
    fn target(&self) -> &'static str {
        let component = match self {
            ComponentKey::Node => Component::Node,
            ComponentKey::Registry => Component::Registry,
            ComponentKey::Router => Component::Router,
            ComponentKey::CodeStore => Component::CodeStore,
            ComponentKey::Lifecycle => Component::Lifecycle,
            ComponentKey::Policy => Component::Policy,
            ComponentKey::AtomicQueue => Component::AtomicQueue,
            ComponentKey::Service => Component::Service,
            ComponentKey::System => Component::System,
            ComponentKey::Custom => Component::Custom(""),
        };
        component.target()
    }
}

impl From<Component> for ComponentKey {
    fn from(component: Component) -> Self {
        match component {
            Component::Node => ComponentKey::Node,
            Component::Registry => ComponentKey::Registry,
            Component::Router => ComponentKey::Router,
            Component::CodeStore => ComponentKey::CodeStore,
            Component::Lifecycle => ComponentKey::Lifecycle,
            Component::Policy => ComponentKey::Policy,
            Component::AtomicQueue => ComponentKey::AtomicQueue,
            Component::Service => ComponentKey::Service,
            Component::System => ComponentKey::System,
            Component::Custom(_) => ComponentKey::Custom,
        }
    }
}

/// Logging configuration applied when a node starts
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level used for every component without an override
    pub default_level: LogLevel,
    /// Per-component overrides
    pub component_levels: HashMap<ComponentKey, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self {
            default_level: LogLevel::Info,
            component_levels: HashMap::new(),
        }
    }

    /// Info everywhere, no overrides
    pub fn default_info() -> Self {
        Self::new().with_default_level(LogLevel::Info)
    }

    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_component_level(mut self, component: ComponentKey, level: LogLevel) -> Self {
        self.component_levels.insert(component, level);
        self
    }

    /// Effective level for a component.
    pub fn level_for(&self, component: &ComponentKey) -> LogLevel {
        self.component_levels
            .get(component)
            .copied()
            .unwrap_or(self.default_level)
    }

    /// An env_logger builder carrying these filters, for callers that want
    /// to pick their own output target before installing it.
    pub fn builder(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.default_level.to_level_filter());
        for (component, level) in &self.component_levels {
            builder.filter_module(component.target(), level.to_level_filter());
        }
        builder
    }

    /// Install an env_logger backend with these filters.
    ///
    /// Only the first call in a process installs the backend; later calls
    /// just adjust the global max level.
    pub fn apply(&self) {
        if self.builder().try_init().is_err() {
            let max = self
                .component_levels
                .values()
                .map(|l| l.to_level_filter())
                .chain(std::iter::once(self.default_level.to_level_filter()))
                .max()
                .unwrap_or(log::LevelFilter::Info);
            log::set_max_level(max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" WARNING ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("none".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert_eq!(
            "loud".parse::<LogLevel>(),
            Err(LogLevelParseError("loud".to_string()))
        );
    }

    #[test]
    fn test_component_override() {
        let config = LoggingConfig::new()
            .with_default_level(LogLevel::Warn)
            .with_component_level(ComponentKey::Router, LogLevel::Debug);

        assert_eq!(config.level_for(&ComponentKey::Router), LogLevel::Debug);
        assert_eq!(config.level_for(&ComponentKey::Registry), LogLevel::Warn);
        assert_eq!(
            ComponentKey::from(Component::Custom("anything")),
            ComponentKey::Custom
        );
    }

    #[test]
    fn test_log_level_serde() {
        let level: LogLevel = serde_json::from_str("\"trace\"").unwrap();
        assert_eq!(level, LogLevel::Trace);
        assert_eq!(serde_json::to_string(&LogLevel::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn test_apply_twice_is_harmless() {
        LoggingConfig::default_info().apply();
        LoggingConfig::new().with_default_level(LogLevel::Debug).apply();
    }
}
