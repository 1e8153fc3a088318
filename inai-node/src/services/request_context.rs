// RequestContext Module
//
// INTENTION:
// This module provides the implementation of RequestContext, the value every
// verb handler receives alongside its request. It carries the capability set
// shared by all instances (dispatching into the mesh, submitting atomic
// tasks, reaching the code store through the node) plus the identity of the
// instance being invoked and of its caller.
//
// ARCHITECTURAL PRINCIPLE:
// Capabilities are composed, not inherited: an instance never stores a
// handle to the node. The dispatcher builds a fresh context per call, which
// keeps instances free of reference cycles and makes the caller of every
// nested call explicit.

use inai_common::logging::Logger;
use inai_common::{log_debug, log_error, log_info, log_warn};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::MeshError;
use crate::node::Node;
use crate::routing::{Request, Response};
use crate::services::{InstanceState, ServiceAddress};

/// Context for handling one request
///
/// INTENTION: Give a handler everything it may need besides the request
/// itself, with a logger pre-scoped to the instance address and request path.
#[derive(Clone)]
pub struct RequestContext {
    /// Logger for this context - scoped to the instance and request
    pub logger: Arc<Logger>,
    address: ServiceAddress,
    caller: Option<ServiceAddress>,
    state: InstanceState,
    node: Node,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("address", &self.address)
            .field("caller", &self.caller)
            .field("state", &self.state)
            .field("logger", &"<Logger>")
            .finish()
    }
}

impl RequestContext {
    pub(crate) fn new(
        node: Node,
        address: ServiceAddress,
        caller: Option<ServiceAddress>,
        state: InstanceState,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            logger,
            address,
            caller,
            state,
            node,
        }
    }

    /// Address of the instance handling the request
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address of the calling instance, if the call came from inside the mesh
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// State of the instance handling the request
    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    /// The node hosting the instance
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Call another service, identifying this instance as the caller.
    pub async fn network(
        &self,
        service: &str,
        verb: &str,
        resid: &str,
        query: Option<Value>,
        headers: Option<Value>,
        body: Option<Value>,
    ) -> Response {
        let request = Request::new(service, verb, resid)
            .with_query(query)
            .with_headers(headers)
            .with_body(body);
        self.send(request).await
    }

    /// Dispatch a prepared request with this instance as the caller.
    pub async fn send(&self, request: Request) -> Response {
        let request = request.with_caller(self.address.clone());
        self.node.dispatch(request).await
    }

    /// Submit a task to the node's atomic queue.
    pub async fn atomic<F, Fut, T>(&self, task: F) -> Result<T, MeshError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.node.atomic(task).await
    }

    pub fn debug(&self, message: impl Into<String>) {
        log_debug!(self.logger, "{}", message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        log_info!(self.logger, "{}", message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        log_warn!(self.logger, "{}", message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        log_error!(self.logger, "{}", message.into());
    }
}
