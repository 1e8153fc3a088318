// Inai Node
//
// In-process service mesh runtime: a single node hosting many independently
// loadable services, addressed by name and called with verb-based requests.

// Public modules
pub mod atomic_queue;
pub mod boot;
pub mod config;
pub mod error;
pub mod loader;
pub mod node;
pub mod routing;
pub mod services;

// Re-export the main types from the node module
pub use node::{InstanceOptions, LoadOptions, Node, NodeConfig};

// Re-export the main types from the services module
pub use services::code_store::CodeStore;
pub use services::dns_service::DNS_SERVICE;
pub use services::lifecycle_service::SERVICES_SERVICE;
pub use services::policy_service::POLICY_SERVICE;
pub use services::service_registry::{Registry, RegistryEntry};
pub use services::{
    definition, Instance, InstanceState, RequestContext, ServiceAddress, ServiceDefinition,
};

// Re-export the main types from the routing module
pub use routing::policy::{compile_policies, PolicyError, PolicyRule, PolicyTable};
pub use routing::{Request, Response};

pub use atomic_queue::AtomicQueue;
pub use boot::{BootManifest, Codebase, InMemoryCodebase, ServiceSpec};
pub use error::MeshError;
pub use loader::{CodeLoader, LoadError, PluginCatalog, SourceManifest};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
