// Faulty service fixture: `get` panics, `post` returns an error.

use anyhow::anyhow;
use inai_common::logging::Logger;
use inai_node::services::{definition, Instance, ServiceDefinition};
use inai_node::Response;
use std::sync::Arc;

pub fn faulty_definition() -> Arc<dyn ServiceDefinition> {
    definition(|instance: &mut Instance, _logger: &Logger| {
        instance
            .on("get", |_ctx, _request| async move {
                if true {
                    panic!("get exploded");
                }
                Ok(Response::ok_empty())
            })
            .on("post", |_ctx, _request| async move {
                Err::<Response, _>(anyhow!("post failed"))
            });
        Ok(())
    })
}
