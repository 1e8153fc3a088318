// Static get fixture: `get` always answers 200 with a fixed body.

use inai_common::logging::Logger;
use inai_node::services::{definition, Instance, ServiceDefinition};
use inai_node::Response;
use serde_json::Value;
use std::sync::Arc;

pub fn static_get_definition(body: Value) -> Arc<dyn ServiceDefinition> {
    definition(move |instance: &mut Instance, _logger: &Logger| {
        let body = body.clone();
        instance.on("get", move |_ctx, _request| {
            let body = body.clone();
            async move { Ok(Response::ok(body)) }
        });
        Ok(())
    })
}
