// Custom route fixture
//
// Replaces the default router: `get` still goes to the `get` handler, every
// other verb is answered by the router itself with the verb and resource id.

use inai_common::logging::Logger;
use inai_node::services::{definition, HandlerFuture, Instance, ServiceDefinition};
use inai_node::Response;
use serde_json::json;
use std::sync::Arc;

pub fn custom_route_definition() -> Arc<dyn ServiceDefinition> {
    definition(|instance: &mut Instance, _logger: &Logger| {
        instance.on("get", |_ctx, _request| async move { Ok(Response::ok("from get handler")) });
        instance.set_route(|instance, ctx, request| -> HandlerFuture {
            if request.verb == "get" {
                return instance.route_default(ctx, request);
            }
            let body = json!({"routed": request.verb, "resid": request.resid});
            Box::pin(async move { Ok::<_, anyhow::Error>(Response::ok(body)) })
        });
        Ok(())
    })
}
