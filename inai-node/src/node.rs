// Node Module
//
// INTENTION:
// The Node is the runtime object of the mesh. It owns every shared table
// (registry, code store, live instance table, policy table) and the atomic
// queue, and it is the single entry point through which every component
// calls every other component.
//
// ARCHITECTURAL PRINCIPLES:
// 1. Single dispatcher - all calls, including the runtime's own lifecycle
//    calls (`boot`, `shutdown`), go through `dispatch`
// 2. No partial visibility - a new instance only becomes addressable under
//    its public address after its `boot` handler succeeded
// 3. Typed failures - every failure path ends in a status-coded Response;
//    nothing escapes `dispatch`, panics included
// 4. Explicit ownership - the node is constructed once and torn down with
//    `stop`; instances reach it only through their RequestContext

use anyhow::Result;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use inai_common::logging::{Component, Logger, LoggingConfig};
use inai_common::{log_debug, log_error, log_info, log_warn};
use rand::RngCore;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::atomic_queue::AtomicQueue;
use crate::boot::{resolve_spec_env, BootManifest, Codebase, ServiceSpec};
use crate::error::{panic_message, MeshError};
use crate::loader::{CodeLoader, PluginCatalog};
use crate::routing::policy::{group_pattern, match_line, PolicyTable};
use crate::routing::{is_internal_service, Request, Response};
use crate::services::code_store::CodeStore;
use crate::services::dns_service::{dns_definition, DNS_SERVICE};
use crate::services::lifecycle_service::{lifecycle_definition, SERVICES_SERVICE};
use crate::services::policy_service::{policy_definition, POLICY_SERVICE};
use crate::services::service_registry::Registry;
use crate::services::{Instance, InstanceState, RequestContext, ServiceAddress, ServiceDefinition};

/// Prefix of the throwaway addresses new instances boot under
pub const TEMP_ADDRESS_PREFIX: &str = "tmp-";

const ADDRESS_BYTES: usize = 8;

/// Configuration for a Node
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Node ID used in every log line of this node
    pub node_id: String,

    /// Logging configuration options
    pub logging_config: Option<LoggingConfig>,

    /// Log a `REQ[n]` line for every dispatched call to a non-internal service
    pub log_requests: bool,

    /// Log a `RES[n]` line for every answered call to a non-internal service
    pub log_responses: bool,

    /// Service consulted when a policy applies
    pub auth_service: String,

    /// Resource id of the authorization check
    pub auth_resource: String,

    /// Verb of the authorization check
    pub auth_verb: String,

    /// Profile used to select services from a boot manifest
    pub profile: String,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            logging_config: Some(LoggingConfig::default_info()),
            log_requests: true,
            log_responses: true,
            auth_service: "auth".to_string(),
            auth_resource: "/check".to_string(),
            auth_verb: "post".to_string(),
            profile: "server".to_string(),
        }
    }

    /// Configuration with a generated node id
    pub fn new_with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_logging_config(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    pub fn without_logging_config(mut self) -> Self {
        self.logging_config = None;
        self
    }

    pub fn with_request_logging(mut self, requests: bool, responses: bool) -> Self {
        self.log_requests = requests;
        self.log_responses = responses;
        self
    }

    /// Set the authorization collaborator consulted by the policy check
    pub fn with_auth(
        mut self,
        service: impl Into<String>,
        verb: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        self.auth_service = service.into();
        self.auth_verb = verb.into();
        self.auth_resource = resource.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }
}

impl fmt::Display for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeConfig: node_id:{} profile:{} auth:{} {} {} log(requests:{} responses:{})",
            self.node_id,
            self.profile,
            self.auth_verb,
            self.auth_service,
            self.auth_resource,
            self.log_requests,
            self.log_responses
        )
    }
}

/// Options of `Node::create_instance`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Address the instance should live at; a fresh one is generated when `None`
    pub address: Option<ServiceAddress>,
    /// Seed the new instance with a copy of the state of the instance it replaces
    pub retain_state: bool,
}

impl InstanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<ServiceAddress>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_retain_state(mut self, retain_state: bool) -> Self {
        self.retain_state = retain_state;
        self
    }
}

/// Options of `Node::load_code`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Re-post every running instance of the code id with its recorded boot config
    pub update: bool,
    /// With `update`, carry each instance's state over to its replacement
    pub retain_state: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn with_retain_state(mut self, retain_state: bool) -> Self {
        self.retain_state = retain_state;
        self
    }
}

/// The Node hosting the mesh
///
/// Cloning a Node clones a handle; all clones share the same tables.
#[derive(Clone)]
pub struct Node {
    config: Arc<NodeConfig>,
    logger: Arc<Logger>,
    router_logger: Arc<Logger>,
    lifecycle_logger: Arc<Logger>,
    service_logger: Arc<Logger>,
    policy_logger: Arc<Logger>,
    registry: Arc<Registry>,
    services: Arc<DashMap<ServiceAddress, Arc<Instance>>>,
    code_store: Arc<CodeStore>,
    policies: Arc<PolicyTable>,
    queue: Arc<AtomicQueue>,
    loader: Arc<dyn CodeLoader>,
    request_counter: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.config.node_id)
            .field("instances", &self.services.len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl Node {
    /// Create a node whose code loader is an empty `PluginCatalog`.
    ///
    /// Must be called from within a tokio runtime: the atomic queue worker is
    /// spawned here.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        Self::with_loader(config, Arc::new(PluginCatalog::new())).await
    }

    /// Create a node that compiles source text with `loader`.
    pub async fn with_loader(config: NodeConfig, loader: Arc<dyn CodeLoader>) -> Result<Self> {
        let node_id = config.node_id.clone();
        let logger = Arc::new(Logger::new_root(Component::Node, &node_id));

        if let Some(logging_config) = &config.logging_config {
            logging_config.apply();
            logger.debug("Applied logging configuration");
        }

        log_info!(logger, "Initializing node '{}' ({})", node_id, config);

        let node = Self {
            router_logger: Arc::new(logger.with_component(Component::Router)),
            lifecycle_logger: Arc::new(logger.with_component(Component::Lifecycle)),
            service_logger: Arc::new(logger.with_component(Component::Service)),
            policy_logger: Arc::new(logger.with_component(Component::Policy)),
            registry: Arc::new(Registry::new(Arc::new(
                logger.with_component(Component::Registry),
            ))),
            services: Arc::new(DashMap::new()),
            code_store: Arc::new(CodeStore::new(Arc::new(
                logger.with_component(Component::CodeStore),
            ))),
            policies: Arc::new(PolicyTable::new()),
            queue: Arc::new(AtomicQueue::new(Arc::new(
                logger.with_component(Component::AtomicQueue),
            ))),
            loader,
            request_counter: Arc::new(AtomicU64::new(1)),
            running: Arc::new(AtomicBool::new(true)),
            config: Arc::new(config),
            logger,
        };

        let builtins: [(&str, Arc<dyn ServiceDefinition>); 3] = [
            (DNS_SERVICE, dns_definition()),
            (SERVICES_SERVICE, lifecycle_definition()),
            (POLICY_SERVICE, policy_definition()),
        ];
        for (code_id, definition) in builtins {
            node.install_definition(code_id, definition, LoadOptions::new())
                .await?;
            node.create_instance(code_id, InstanceOptions::new().with_address(code_id), None)
                .await?;
        }

        log_info!(node.logger, "Node '{}' started", node.config.node_id);
        Ok(node)
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn policies(&self) -> &Arc<PolicyTable> {
        &self.policies
    }

    pub fn code_store(&self) -> &Arc<CodeStore> {
        &self.code_store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether `address` names a live instance
    pub fn is_live(&self, address: &str) -> bool {
        self.services.contains_key(address)
    }

    /// Live instance at `address`
    pub fn instance(&self, address: &str) -> Option<Arc<Instance>> {
        self.services.get(address).map(|e| e.value().clone())
    }

    /// Every live address, sorted
    pub fn instance_addresses(&self) -> Vec<ServiceAddress> {
        let mut addresses: Vec<ServiceAddress> =
            self.services.iter().map(|e| e.key().clone()).collect();
        addresses.sort();
        addresses
    }

    // ----------------------------------------------------------------------
    // Dispatch
    // ----------------------------------------------------------------------

    /// Call a service from outside the mesh (no caller address).
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
        self.dispatch(request).await
    }

    /// Route a request to the instance it addresses.
    ///
    /// Never fails: unknown names, policy rejections, handler errors and
    /// handler panics all come back as responses.
    pub fn dispatch(&self, request: Request) -> BoxFuture<'static, Response> {
        let node = self.clone();
        async move { node.dispatch_logged(request).await }.boxed()
    }

    async fn dispatch_logged(&self, request: Request) -> Response {
        let loggable = !is_internal_service(&request.service);
        let request_id = self.request_counter.fetch_add(1, Ordering::SeqCst);

        if loggable && self.config.log_requests {
            log_info!(
                self.router_logger,
                "REQ[{}] v:{} srv:{} res:{} q:{} h:{}",
                request_id,
                request.verb,
                request.service,
                request.resid,
                request.query.as_ref().unwrap_or(&Value::Null),
                request.headers.as_ref().unwrap_or(&Value::Null)
            );
        }
        let (verb, service, resid) = (
            request.verb.clone(),
            request.service.clone(),
            request.resid.clone(),
        );

        let response = self.route_request(request).await;

        if loggable && self.config.log_responses {
            log_info!(
                self.router_logger,
                "RES[{}] v:{} srv:{} res:{} resp:{}",
                request_id,
                verb,
                service,
                resid,
                serde_json::to_string(&response).unwrap_or_default()
            );
        }
        response
    }

    async fn route_request(&self, request: Request) -> Response {
        let address = match self.resolve_target(&request.service) {
            Ok(address) => address,
            Err(err) => return err.into(),
        };

        if let Err(err) = self.enforce_policy(&request).await {
            log_warn!(self.policy_logger, "{} rejected: {}", request, err);
            return err.into();
        }

        match self.instance(&address) {
            Some(instance) => self.run_instance(&address, instance, request).await,
            // Removed between resolution and dispatch.
            None => Response::not_found(),
        }
    }

    /// A live address is used directly; anything else is looked up by name.
    pub fn resolve_target(&self, service: &str) -> crate::error::Result<ServiceAddress> {
        if self.services.contains_key(service) {
            return Ok(service.to_string());
        }
        self.registry.resolve(service)
    }

    fn is_auth_check(&self, request: &Request) -> bool {
        request.service == self.config.auth_service
            && request.verb == self.config.auth_verb
            && request.trimmed_resid() == self.config.auth_resource.trim_start_matches('/')
    }

    /// Consult the policy table for `request.service`.
    ///
    /// With a matcher installed, the authorization collaborator is asked for
    /// the caller's groups and the line `<service> <verb> <resid> |g1|..|gN|`
    /// must match. A failed authorization call is a server error, a
    /// non-matching line is forbidden.
    pub async fn enforce_policy(&self, request: &Request) -> crate::error::Result<()> {
        let Some(matcher) = self.policies.matcher(&request.service) else {
            return Ok(());
        };
        if self.is_auth_check(request) {
            return Ok(());
        }

        let check = Request::new(
            self.config.auth_service.as_str(),
            self.config.auth_verb.as_str(),
            self.config.auth_resource.as_str(),
        )
        .with_query(request.query.clone())
        .with_headers(request.headers.clone())
        .with_caller(request.caller.clone());

        let auth = self.dispatch(check).await;
        if !auth.is_success() {
            return Err(MeshError::Server(format!(
                "authorization check failed with status {}",
                auth.status
            )));
        }

        let groups = group_pattern(auth.body.as_ref());
        let line = match_line(&request.service, &request.verb, &request.resid, &groups);
        log_debug!(self.policy_logger, "checking '{}'", line);
        if matcher.is_match(&line) {
            Ok(())
        } else {
            Err(MeshError::Forbidden(format!(
                "{} {} {} not permitted",
                request.service, request.verb, request.resid
            )))
        }
    }

    async fn run_instance(
        &self,
        address: &str,
        instance: Arc<Instance>,
        request: Request,
    ) -> Response {
        let logger = Arc::new(
            self.service_logger
                .with_address(address)
                .with_request_path(request.to_string()),
        );
        let ctx = RequestContext::new(
            self.clone(),
            address.to_string(),
            request.caller.clone(),
            instance.state().clone(),
            logger.clone(),
        );

        let outcome = AssertUnwindSafe(async move { instance.route(ctx, request).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                log_error!(logger, "handler failed: {}", err);
                Response::server_error(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log_error!(logger, "handler panicked: {}", message);
                Response::server_error(format!("handler panicked: {message}"))
            }
        }
    }

    /// Submit a task to the node's atomic queue.
    ///
    /// The task is queued before this returns; see `AtomicQueue::atomic`.
    pub fn atomic<F, Fut, T>(
        &self,
        task: F,
    ) -> impl Future<Output = crate::error::Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.queue.atomic(task)
    }

    // ----------------------------------------------------------------------
    // Code loading and instance lifecycle
    // ----------------------------------------------------------------------

    /// Compile `source` with the node's loader and install it under `code_id`.
    pub async fn load_code(
        &self,
        code_id: &str,
        source: &str,
        options: LoadOptions,
    ) -> crate::error::Result<()> {
        let definition = self.loader.compile(code_id, source).map_err(|err| {
            log_warn!(self.lifecycle_logger, "cannot load '{}': {}", code_id, err);
            MeshError::from(err)
        })?;
        self.install_definition(code_id, definition, options).await
    }

    /// Install an already built definition under `code_id`.
    ///
    /// With `options.update`, every running instance of `code_id` is
    /// re-created at its own address with its recorded boot config. A failed
    /// re-creation is logged and leaves that instance as it was.
    pub async fn install_definition(
        &self,
        code_id: &str,
        definition: Arc<dyn ServiceDefinition>,
        options: LoadOptions,
    ) -> crate::error::Result<()> {
        let running = self.code_store.install(code_id, definition);
        if !options.update {
            return Ok(());
        }

        log_info!(
            self.lifecycle_logger,
            "updating {} running instances of '{}'",
            running.len(),
            code_id
        );
        for (address, config) in running {
            let instance_options = InstanceOptions::new()
                .with_address(address.clone())
                .with_retain_state(options.retain_state);
            if let Err(err) = self.create_instance(code_id, instance_options, config).await {
                log_warn!(
                    self.lifecycle_logger,
                    "live update of {} ({}) failed: {}",
                    address,
                    code_id,
                    err
                );
            }
        }
        Ok(())
    }

    /// Create an instance of `code_id` and boot it with `config`.
    ///
    /// The instance boots under a temporary address. Only after `boot`
    /// succeeded is it moved to its final address, replacing (and then
    /// shutting down) any instance living there. On boot failure the
    /// temporary instance is discarded, a previous instance at the desired
    /// address keeps running, and the boot response is returned as
    /// `MeshError::BootRejected`.
    pub async fn create_instance(
        &self,
        code_id: &str,
        options: InstanceOptions,
        config: Option<Value>,
    ) -> crate::error::Result<ServiceAddress> {
        let definition = self
            .code_store
            .definition(code_id)
            .ok_or_else(|| MeshError::NotFound(format!("code '{code_id}'")))?;

        // With retain_state the new instance starts from a snapshot of the
        // previous state; writes the previous instance accepts while the new
        // one boots are folded in at the re-key.
        let retained = options
            .address
            .as_deref()
            .and_then(|a| self.instance(a))
            .filter(|_| options.retain_state)
            .map(|previous| {
                let base = previous.state().snapshot();
                (previous, base)
            });
        let state = match &retained {
            Some((_, base)) => InstanceState::from_snapshot(base.clone()),
            None => InstanceState::new(),
        };

        let temp = self.allocate_address(TEMP_ADDRESS_PREFIX);
        let mut instance = Instance::new(code_id, state);
        let define_logger = self.service_logger.with_address(temp.as_str());
        let defined = std::panic::catch_unwind(AssertUnwindSafe(|| {
            definition.define(&mut instance, &define_logger)
        }));
        let reason = match defined {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(reason) = reason {
            log_warn!(self.lifecycle_logger, "definition of '{}' failed: {}", code_id, reason);
            return Err(MeshError::Definition {
                code_id: code_id.to_string(),
                reason,
            });
        }

        let instance = Arc::new(instance);
        self.services.insert(temp.clone(), instance.clone());
        self.code_store.track(code_id, &temp, config.clone());
        log_debug!(self.lifecycle_logger, "booting '{}' at {}", code_id, temp);

        if instance.handles("boot") {
            let boot = self
                .dispatch(Request::new(temp.as_str(), "boot", "/").with_body(config))
                .await;
            if !boot.is_success() {
                self.services.remove(&temp);
                self.code_store.untrack(code_id, &temp);
                log_warn!(
                    self.lifecycle_logger,
                    "boot of '{}' rejected with status {}",
                    code_id,
                    boot.status
                );
                return Err(MeshError::BootRejected(boot));
            }
        }

        let address = match options.address {
            Some(address) => address,
            None => self.allocate_address(""),
        };

        if let Some((previous, base)) = &retained {
            instance.state().rebase(base, previous.state());
        }
        let retired = self.services.insert(address.clone(), instance);
        self.services.remove(&temp);
        if let Some(retired) = &retired {
            self.code_store.untrack(retired.code_id(), &address);
        }
        self.code_store.rekey(code_id, &temp, &address);
        log_info!(self.lifecycle_logger, "instance of '{}' live at {}", code_id, address);

        if let Some(retired) = retired {
            self.shutdown_retired(&address, retired).await;
        }
        Ok(address)
    }

    /// Shut down and remove the instance of `code_id` at `address`.
    ///
    /// An address that is not an instance of `code_id` is a no-op; an
    /// unknown code id is NotFound. Shutdown failures are logged only.
    pub async fn destroy_instance(&self, code_id: &str, address: &str) -> crate::error::Result<()> {
        if !self.code_store.contains(code_id) {
            return Err(MeshError::NotFound(format!("code '{code_id}'")));
        }
        if !self.code_store.owns(code_id, address) {
            log_debug!(
                self.lifecycle_logger,
                "{} is not an instance of '{}', nothing to destroy",
                address,
                code_id
            );
            return Ok(());
        }

        if let Some(instance) = self.instance(address) {
            if instance.handles("shutdown") {
                let response = self
                    .dispatch(Request::new(address, "shutdown", "/"))
                    .await;
                if !response.is_success() {
                    log_warn!(
                        self.lifecycle_logger,
                        "shutdown of {} answered {}",
                        address,
                        response
                    );
                }
            }
            self.services
                .remove_if(address, |_, live| Arc::ptr_eq(live, &instance));
        }
        self.code_store.untrack(code_id, address);
        log_info!(self.lifecycle_logger, "destroyed {} ({})", address, code_id);
        Ok(())
    }

    /// Best-effort `shutdown` of an instance that has already been replaced.
    async fn shutdown_retired(&self, address: &str, retired: Arc<Instance>) {
        if !retired.handles("shutdown") {
            return;
        }
        let request = Request::new(address, "shutdown", "/");
        let response = self.run_instance(address, retired, request).await;
        if !response.is_success() {
            log_warn!(
                self.lifecycle_logger,
                "shutdown of replaced instance at {} answered {}",
                address,
                response
            );
        }
    }

    /// Random address that is neither live nor known to the registry.
    fn allocate_address(&self, prefix: &str) -> ServiceAddress {
        let mut bytes = [0u8; ADDRESS_BYTES];
        loop {
            rand::rng().fill_bytes(&mut bytes);
            let candidate = format!("{prefix}{}", hex::encode(bytes));
            if !self.services.contains_key(&candidate)
                && self.registry.lookup(&candidate).is_none()
                && !self.registry.is_referenced(&candidate)
            {
                return candidate;
            }
        }
    }

    // ----------------------------------------------------------------------
    // Boot sequence
    // ----------------------------------------------------------------------

    /// Load a service's code from `codebase`, boot an instance and name it.
    ///
    /// `$VAR` references anywhere in the spec are resolved from the
    /// environment first. When the spec has a name, the spec is stored as metadata of
    /// both the name and the new address before the name is bound.
    pub async fn boot_service(
        &self,
        codebase: &dyn Codebase,
        spec: &ServiceSpec,
    ) -> crate::error::Result<ServiceAddress> {
        let (spec, missing) =
            resolve_spec_env(spec).map_err(|err| MeshError::BadRequest(err.to_string()))?;
        for var in missing {
            log_warn!(
                self.lifecycle_logger,
                "missing environment variable ${} in spec of '{}'",
                var,
                spec.display_name()
            );
        }
        log_info!(self.lifecycle_logger, "booting {} ...", spec.display_name());

        let source = codebase
            .code(&spec.code_id)
            .await
            .map_err(|err| MeshError::NotFound(format!("code '{}': {err}", spec.code_id)))?;
        self.load_code(&spec.code_id, &source, LoadOptions::new())
            .await?;
        let address = self
            .create_instance(&spec.code_id, InstanceOptions::new(), spec.config.clone())
            .await?;

        if let Some(name) = &spec.name {
            let meta = serde_json::to_value(&spec).map_err(|e| MeshError::Server(e.to_string()))?;
            self.registry.set_meta(name, meta.clone());
            self.registry.set_meta(&address, meta);
            self.registry.bind(name, &address);
        }
        log_info!(
            self.lifecycle_logger,
            "... booted {} [{}]",
            spec.display_name(),
            address
        );
        Ok(address)
    }

    /// Boot every service a manifest starts, one atomic task per service,
    /// in manifest order.
    ///
    /// Services missing from the codebase, disabled, or not meant for this
    /// node's profile are skipped; boot failures are logged and skipped.
    /// Returns the `(name, address)` of every booted service.
    pub async fn boot_from_manifest(
        &self,
        codebase: Arc<dyn Codebase>,
        manifest: &BootManifest,
    ) -> Vec<(String, ServiceAddress)> {
        let mut pending = Vec::new();
        for name in &manifest.start {
            let spec = match codebase.named(name).await {
                Ok(spec) => spec,
                Err(err) => {
                    log_error!(self.lifecycle_logger, "Failed to boot service {}: {}", name, err);
                    continue;
                }
            };
            if spec.disabled || !spec.is_for_profile(&self.config.profile) {
                log_info!(self.lifecycle_logger, "Skipping {}", name);
                continue;
            }

            let node = self.clone();
            let codebase = codebase.clone();
            let task = self.atomic(move || async move {
                Ok(node.boot_service(codebase.as_ref(), &spec).await?)
            });
            pending.push((name.clone(), task));
        }

        let mut booted = Vec::new();
        for (name, task) in pending {
            match task.await {
                Ok(address) => booted.push((name, address)),
                Err(err) => {
                    log_error!(self.lifecycle_logger, "Failed to boot service {}: {}", name, err)
                }
            }
        }
        booted
    }

    /// Destroy every user instance (best effort) and close the atomic queue.
    /// Calling `stop` again is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        log_info!(self.logger, "Stopping node '{}'", self.config.node_id);

        let user_instances: Vec<(ServiceAddress, String)> = self
            .services
            .iter()
            .filter(|e| !is_internal_service(e.key()))
            .map(|e| (e.key().clone(), e.value().code_id().to_string()))
            .collect();
        for (address, code_id) in user_instances {
            if let Err(err) = self.destroy_instance(&code_id, &address).await {
                log_warn!(self.logger, "failed to destroy {}: {}", address, err);
            }
        }

        self.queue.close();
        log_info!(self.logger, "Node '{}' stopped", self.config.node_id);
        Ok(())
    }
}
