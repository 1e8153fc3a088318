// Counter service fixture
//
// INTENTION: A stateful service for hot-swap tests. Its count lives in the
// instance state, so it survives a replacement only when state is retained,
// and shared stats record lifecycle calls so tests can check that boot
// and shutdown ran (or that a handler never ran).
//
// - `boot`: body `{"start": n}` seeds the count unless the state already has one
// - `get`: answers the count
// - `post`: increments the count and answers the new value
// - `shutdown`: recorded in the stats

use inai_common::logging::Logger;
use inai_node::services::{definition, Instance, ServiceDefinition};
use inai_node::Response;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const COUNT_FIELD: &str = "count";

/// Lifecycle and call counts shared by every instance of a counter definition
#[derive(Debug, Clone, Default)]
pub struct CounterStats {
    pub boots: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
    pub posts: Arc<AtomicUsize>,
}

impl CounterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }
}

pub fn counter_definition(stats: CounterStats) -> Arc<dyn ServiceDefinition> {
    definition(move |instance: &mut Instance, logger: &Logger| {
        logger.debug("defining counter");
        let boot_stats = stats.clone();
        let post_stats = stats.clone();
        let shutdown_stats = stats.clone();

        instance
            .on("boot", move |ctx, request| {
                boot_stats.boots.fetch_add(1, Ordering::SeqCst);
                async move {
                    if !ctx.state().contains(COUNT_FIELD) {
                        let start = request
                            .body
                            .as_ref()
                            .and_then(|b| b.get("start"))
                            .and_then(Value::as_i64)
                            .unwrap_or(0);
                        ctx.state().set(COUNT_FIELD, json!(start));
                    }
                    Ok(Response::ok_empty())
                }
            })
            .on("get", |ctx, _request| async move {
                Ok(Response::ok(ctx.state().get(COUNT_FIELD).unwrap_or(json!(0))))
            })
            .on("post", move |ctx, _request| {
                post_stats.posts.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Response::ok(ctx.state().increment(COUNT_FIELD, 1))) }
            })
            .on("shutdown", move |_ctx, _request| {
                shutdown_stats.shutdowns.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Response::ok_empty()) }
            });
        Ok(())
    })
}
