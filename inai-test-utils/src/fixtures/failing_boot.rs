// Failing boot fixture
//
// `boot` answers with a fixed non-success status. `get` counts its calls in
// a shared counter, which lets tests prove the instance was never reachable.

use inai_common::logging::Logger;
use inai_node::services::{definition, Instance, ServiceDefinition};
use inai_node::Response;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn failing_boot_definition(
    status: u16,
    get_calls: Arc<AtomicUsize>,
) -> Arc<dyn ServiceDefinition> {
    definition(move |instance: &mut Instance, _logger: &Logger| {
        let get_calls = get_calls.clone();
        instance
            .on("boot", move |_ctx, _request| async move {
                Ok(Response::with_status(status).with_body("refusing to boot"))
            })
            .on("get", move |_ctx, _request| {
                get_calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Response::ok("booted anyway")) }
            });
        Ok(())
    })
}
