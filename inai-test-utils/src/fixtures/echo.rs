// Echo service fixture
//
// `get` answers with the resource id, `post` and `put` answer with the
// request body. `delete` is deliberately left out so tests can observe the
// unsupported-verb response.

use inai_common::logging::Logger;
use inai_node::services::{definition, Instance, ServiceDefinition};
use inai_node::Response;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn echo_definition() -> Arc<dyn ServiceDefinition> {
    definition(|instance: &mut Instance, _logger: &Logger| {
        instance
            .on("get", |ctx, request| async move {
                Ok(Response::ok(json!({
                    "resid": request.resid,
                    "address": ctx.address(),
                    "caller": ctx.caller(),
                })))
            })
            .on("post", |_ctx, request| async move {
                Ok(Response::ok(request.body.unwrap_or(Value::Null)))
            })
            .on("put", |_ctx, request| async move {
                Ok(Response::ok(request.body.unwrap_or(Value::Null)))
            });
        Ok(())
    })
}
