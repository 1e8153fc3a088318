// Logging macros
//
// These forward `format_args!` to the `Logger::*_args` methods so that a
// disabled level never allocates the message. The level check uses the
// logger's component target, the same target `LoggingConfig` filters on.

/// Log at debug level through an `inai_common::Logger`.
///
/// ```
/// use inai_common::{log_debug, Component, Logger};
///
/// let logger = Logger::new_root(Component::Node, "node-1");
/// log_debug!(logger, "booted {} services", 3);
/// ```
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {{
        let logger = &$logger;
        if ::log::log_enabled!(target: logger.component().target(), ::log::Level::Debug) {
            logger.debug_args(format_args!($($arg)*));
        }
    }}
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {{
        let logger = &$logger;
        if ::log::log_enabled!(target: logger.component().target(), ::log::Level::Info) {
            logger.info_args(format_args!($($arg)*));
        }
    }}
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {{
        let logger = &$logger;
        if ::log::log_enabled!(target: logger.component().target(), ::log::Level::Warn) {
            logger.warn_args(format_args!($($arg)*));
        }
    }}
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {{
        let logger = &$logger;
        if ::log::log_enabled!(target: logger.component().target(), ::log::Level::Error) {
            logger.error_args(format_args!($($arg)*));
        }
    }}
}
