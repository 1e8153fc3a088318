// Service Instance Module
//!
//! This module defines `Instance`, the live state object of one running
//! service, along with the handler-visible `InstanceState` it carries.
//!
//! # Architectural Principles
//! 1. Verb Polymorphism - An instance implements any subset of verbs
//! 2. Overridable Routing - A definition may replace the default router
//! 3. Exclusive Ownership - Only the node's live table owns instances; other
//!    components reach an instance exclusively by dispatching to its address
//! 4. Explicit State - Handler-visible fields live in `InstanceState`, which
//!    can be carried over to a replacement instance on hot-swap

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::routing::{Request, Response};
use crate::services::{HandlerFuture, RequestContext, RouteHandler, VerbHandler};

/// Handler-visible key/value state of an instance.
///
/// Cloning an `InstanceState` clones the handle, not the contents: every
/// handler of an instance sees the same fields. `deep_copy` and
/// `from_snapshot` make independent copies; `rebase` folds later changes of
/// another state into a copy.
///
/// # Examples
///
/// ```rust
/// use inai_node::services::InstanceState;
/// use serde_json::json;
///
/// let state = InstanceState::default();
/// state.set("greeting", json!("hello"));
/// assert_eq!(state.increment("hits", 1), 1);
///
/// let copy = state.deep_copy();
/// copy.set("greeting", json!("bye"));
/// assert_eq!(state.get("greeting"), Some(json!("hello")));
/// ```
#[derive(Clone, Default)]
pub struct InstanceState {
    fields: Arc<DashMap<String, Value>>,
}

impl InstanceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.fields.get(key).map(|v| v.value().clone())
    }

    /// Set a field, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.fields.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Replace a field with `f(current)` while holding the field's lock.
    /// A missing field is presented to `f` as `Value::Null`.
    pub fn update<F>(&self, key: impl Into<String>, f: F) -> Value
    where
        F: FnOnce(&Value) -> Value,
    {
        let mut entry = self.fields.entry(key.into()).or_insert(Value::Null);
        let next = f(entry.value());
        *entry.value_mut() = next.clone();
        next
    }

    /// Add `by` to an integer field (missing or non-integer counts as 0).
    pub fn increment(&self, key: impl Into<String>, by: i64) -> i64 {
        let next = self.update(key, |current| Value::from(current.as_i64().unwrap_or(0) + by));
        next.as_i64().unwrap_or(by)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&self) {
        self.fields.clear();
    }

    /// Current fields as a JSON object.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// An independent state object holding a copy of the current fields.
    pub fn deep_copy(&self) -> Self {
        let copy = Self::default();
        for entry in self.fields.iter() {
            copy.fields.insert(entry.key().clone(), entry.value().clone());
        }
        copy
    }

    /// An independent state object holding `fields`.
    pub fn from_snapshot(fields: Map<String, Value>) -> Self {
        let state = Self::default();
        for (key, value) in fields {
            state.fields.insert(key, value);
        }
        state
    }

    /// Bring in the changes `upstream` made since `base`.
    ///
    /// Fields this state changed since `base` are kept; every other field
    /// takes `upstream`'s current value (or is removed if `upstream` removed it).
    pub fn rebase(&self, base: &Map<String, Value>, upstream: &InstanceState) {
        let latest = upstream.snapshot();
        let keys: HashSet<&String> = base.keys().chain(latest.keys()).collect();
        for key in keys {
            if self.get(key).as_ref() != base.get(key) {
                continue;
            }
            match latest.get(key) {
                Some(value) => {
                    self.set(key.clone(), value.clone());
                }
                None => {
                    self.remove(key);
                }
            }
        }
    }

    /// Whether two handles refer to the same state object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|e| (e.key().clone(), e.value().clone())))
            .finish()
    }
}

/// The live state object and verb-handler set created from a code entry.
///
/// # Examples
///
/// ```rust
/// use inai_node::services::{definition, Instance};
/// use inai_node::Response;
///
/// let greeter = definition(|instance: &mut Instance, _logger| {
///     instance.on("get", |_ctx, _request| async move { Ok(Response::ok("hello")) });
///     Ok(())
/// });
/// # let _ = greeter;
/// ```
pub struct Instance {
    code_id: String,
    handlers: HashMap<String, VerbHandler>,
    router: Option<RouteHandler>,
    state: InstanceState,
    created_at: DateTime<Utc>,
}

impl Instance {
    pub(crate) fn new(code_id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            code_id: code_id.into(),
            handlers: HashMap::new(),
            router: None,
            state,
            created_at: Utc::now(),
        }
    }

    /// Code id this instance was created from
    pub fn code_id(&self) -> &str {
        &self.code_id
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Install an async handler for a verb, replacing any previous one.
    pub fn on<F, Fut>(&mut self, verb: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.set_handler(verb, crate::services::verb_handler(f))
    }

    pub fn set_handler(&mut self, verb: impl Into<String>, handler: VerbHandler) -> &mut Self {
        self.handlers.insert(verb.into(), handler);
        self
    }

    pub fn remove_handler(&mut self, verb: &str) -> Option<VerbHandler> {
        self.handlers.remove(verb)
    }

    pub fn handler(&self, verb: &str) -> Option<VerbHandler> {
        self.handlers.get(verb).cloned()
    }

    pub fn supports(&self, verb: &str) -> bool {
        self.handlers.contains_key(verb)
    }

    /// Implemented verbs, sorted.
    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self.handlers.keys().cloned().collect();
        verbs.sort();
        verbs
    }

    /// Replace the default router.
    pub fn set_route<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Arc<Instance>, RequestContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.router = Some(Arc::new(move |instance, ctx, request| {
            Box::pin(f(instance, ctx, request))
        }));
        self
    }

    pub fn has_custom_route(&self) -> bool {
        self.router.is_some()
    }

    /// Whether a request with this verb reaches code of the instance
    /// (a custom router is assumed to handle every verb).
    pub fn handles(&self, verb: &str) -> bool {
        self.router.is_some() || self.supports(verb)
    }

    /// Entry point used by the dispatcher.
    pub fn route(self: Arc<Self>, ctx: RequestContext, request: Request) -> HandlerFuture {
        match self.router.clone() {
            Some(router) => router(self, ctx, request),
            None => self.route_default(ctx, request),
        }
    }

    /// Default router: call the handler named after the verb.
    pub fn route_default(&self, ctx: RequestContext, request: Request) -> HandlerFuture {
        match self.handlers.get(&request.verb) {
            Some(handler) => handler(ctx, request),
            None => {
                let response = Response::unsupported_verb(&request.verb);
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("code_id", &self.code_id)
            .field("verbs", &self.verbs())
            .field("custom_route", &self.router.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_update_and_increment() {
        let state = InstanceState::new();
        assert!(state.is_empty());
        assert_eq!(state.increment("n", 2), 2);
        assert_eq!(state.increment("n", 3), 5);
        state.set("s", json!("text"));
        assert_eq!(state.increment("s", 1), 1);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_state_clone_shares_deep_copy_does_not() {
        let state = InstanceState::new();
        state.set("k", json!(1));

        let shared = state.clone();
        let copied = state.deep_copy();
        assert!(shared.ptr_eq(&state));
        assert!(!copied.ptr_eq(&state));

        shared.set("k", json!(2));
        assert_eq!(state.get("k"), Some(json!(2)));
        assert_eq!(copied.get("k"), Some(json!(1)));
    }

    #[test]
    fn test_rebase_keeps_local_changes_and_takes_upstream_ones() {
        let upstream = InstanceState::new();
        upstream.set("count", json!(1));
        upstream.set("label", json!("old"));
        upstream.set("stale", json!(true));

        let base = upstream.snapshot();
        let local = InstanceState::from_snapshot(base.clone());
        local.set("label", json!("new"));
        local.set("added", json!(7));

        upstream.set("count", json!(2));
        upstream.set("label", json!("old-updated"));
        upstream.remove("stale");
        upstream.set("late", json!("x"));

        local.rebase(&base, &upstream);
        assert_eq!(local.get("count"), Some(json!(2)));
        assert_eq!(local.get("label"), Some(json!("new")));
        assert_eq!(local.get("added"), Some(json!(7)));
        assert_eq!(local.get("late"), Some(json!("x")));
        assert!(!local.contains("stale"));
        assert!(!local.ptr_eq(&upstream));
    }

    #[test]
    fn test_handler_table() {
        let mut instance = Instance::new("greet", InstanceState::new());
        instance
            .on("get", |_ctx, _req| async move { Ok(Response::ok("hi")) })
            .on("boot", |_ctx, _req| async move { Ok(Response::ok_empty()) });

        assert_eq!(instance.code_id(), "greet");
        assert!(instance.supports("get"));
        assert!(!instance.supports("put"));
        assert!(instance.handles("boot"));
        assert_eq!(instance.verbs(), vec!["boot".to_string(), "get".to_string()]);

        assert!(instance.remove_handler("boot").is_some());
        assert!(!instance.handles("boot"));

        instance.set_route(|instance, ctx, request| instance.route_default(ctx, request));
        assert!(instance.handles("anything"));
    }
}
