// Test fixtures
//
// Service definitions used by the node integration tests. Each fixture is a
// plain `ServiceDefinition`; `create_test_catalog` registers the
// parameter-free ones as plugins so they can also be loaded from source text.

pub mod counter;
pub mod custom_route;
pub mod echo;
pub mod failing_boot;
pub mod fake_auth;
pub mod faulty;
pub mod static_get;
