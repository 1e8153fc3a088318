// Services Module
//
// INTENTION:
// This module defines the building blocks of a service on the node: the
// handler signatures, the `ServiceDefinition` contract implemented by
// loadable code, the live `Instance` a definition populates, the request
// context handed to every handler, and the runtime's own pseudo-services
// (`_dns`, `_services`, `_policy`).
//
// ARCHITECTURAL PRINCIPLES:
// 1. Polymorphism over verbs - an instance implements any subset of verbs;
//    missing verbs get a fixed "unsupported verb" response
// 2. Composition over inheritance - every instance reaches the shared node
//    capabilities (dispatch, atomic queue, code store) through its
//    RequestContext rather than through a shared base object
// 3. Uniform protocol - pseudo-services are ordinary instances and are
//    reached through the same dispatcher as user code

pub mod code_store;
pub mod dns_service;
pub mod instance;
pub mod lifecycle_service;
pub mod policy_service;
pub mod request_context;
pub mod service_registry;

use anyhow::Result;
use inai_common::logging::Logger;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::routing::{Request, Response};

pub use crate::services::instance::{Instance, InstanceState};
pub use crate::services::request_context::RequestContext;

/// Opaque identifier of a live instance, unique for the node's lifetime.
pub type ServiceAddress = String;

/// Future returned by verb handlers and routers
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

/// Handler for a single verb
///
/// INTENTION: Give every verb handler the same shape so handlers can be
/// stored in an instance's table and invoked uniformly by the router.
pub type VerbHandler = Arc<dyn Fn(RequestContext, Request) -> HandlerFuture + Send + Sync>;

/// Replacement for an instance's default router. Receives the instance so
/// it can fall back to `Instance::route_default`.
pub type RouteHandler =
    Arc<dyn Fn(Arc<Instance>, RequestContext, Request) -> HandlerFuture + Send + Sync>;

/// Compiled service code.
///
/// A definition is run once per instance, against a fresh `Instance`, and
/// installs that instance's verb handlers (and optionally its router). It
/// must not block: boot-time work belongs in the `boot` handler.
pub trait ServiceDefinition: Send + Sync {
    fn define(&self, instance: &mut Instance, logger: &Logger) -> Result<()>;
}

impl<F> ServiceDefinition for F
where
    F: Fn(&mut Instance, &Logger) -> Result<()> + Send + Sync,
{
    fn define(&self, instance: &mut Instance, logger: &Logger) -> Result<()> {
        self(instance, logger)
    }
}

/// Wrap a closure as a shareable service definition.
pub fn definition<F>(f: F) -> Arc<dyn ServiceDefinition>
where
    F: Fn(&mut Instance, &Logger) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as a `VerbHandler`.
pub fn verb_handler<F, Fut>(f: F) -> VerbHandler
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(f(ctx, request)))
}
