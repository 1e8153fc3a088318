// DNS Service Module
//
// The `_dns` pseudo-service exposes the node's Registry over the internal
// RPC protocol:
//
//     get    <name>          -> 200 address | 404
//     get    <name>/_meta    -> 200 metadata | 404
//     put    <name>          body: address string
//     put    <name>/_meta    body: any JSON
//     delete <name>          -> 200 (idempotent)

use anyhow::Result;
use inai_common::logging::Logger;
use serde_json::Value;
use std::sync::Arc;

use crate::routing::{Request, Response};
use crate::services::{definition, Instance, RequestContext, ServiceDefinition};

/// Code id (and address) of the DNS pseudo-service
pub const DNS_SERVICE: &str = "_dns";

/// Definition of the `_dns` pseudo-service
pub fn dns_definition() -> Arc<dyn ServiceDefinition> {
    definition(|instance: &mut Instance, _logger: &Logger| {
        instance
            .on("get", get_entry)
            .on("put", put_entry)
            .on("delete", delete_entry);
        Ok(())
    })
}

async fn get_entry(ctx: RequestContext, request: Request) -> Result<Response> {
    let name = request.trimmed_resid();
    Ok(match ctx.node().registry().lookup(name) {
        Some(entry) => Response::ok(entry.to_value()),
        None => Response::not_found(),
    })
}

async fn put_entry(ctx: RequestContext, request: Request) -> Result<Response> {
    let name = request.trimmed_resid();
    if name.is_empty() {
        return Ok(Response::bad_request("name required"));
    }
    let value = request.body.clone().unwrap_or(Value::Null);
    Ok(match ctx.node().registry().put(name, value) {
        Ok(()) => Response::ok_empty(),
        Err(err) => err.into(),
    })
}

async fn delete_entry(ctx: RequestContext, request: Request) -> Result<Response> {
    ctx.node().registry().unbind(request.trimmed_resid());
    Ok(Response::ok_empty())
}
