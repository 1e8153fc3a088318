// Lifecycle Service Module
//
// INTENTION:
// The `_services` pseudo-service exposes code loading and the instance
// hot-swap protocol over the internal RPC protocol, so that any service in
// the mesh (or an operator behind an ingress) can install code and start,
// replace or stop instances:
//
//     put    <codeId>                       body: source text
//                                           query: {update, retain_state}
//     post   <codeId>/instances             body: boot config
//                                           query: {id, retain_state}
//     delete <codeId>/instances/<address>
//     get    /instances                     -> every live address
//     get    <codeId>/instances             -> [{address, config, createdAt}]
//
// A leading `/` on the resource id is optional.

use anyhow::Result;
use inai_common::logging::Logger;
use inai_common::log_info;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::node::{InstanceOptions, LoadOptions};
use crate::routing::{Request, Response};
use crate::services::{definition, Instance, RequestContext, ServiceDefinition};

/// Code id (and address) of the lifecycle pseudo-service
pub const SERVICES_SERVICE: &str = "_services";

const INSTANCES: &str = "instances";

/// Definition of the `_services` pseudo-service
pub fn lifecycle_definition() -> Arc<dyn ServiceDefinition> {
    definition(|instance: &mut Instance, _logger: &Logger| {
        instance
            .on("get", list_instances)
            .on("put", put_code)
            .on("post", post_instance)
            .on("delete", delete_instance);
        Ok(())
    })
}

/// Resource ids understood by `_services`
#[derive(Debug, PartialEq, Eq)]
enum Resource<'a> {
    AllInstances,
    Code(&'a str),
    Instances(&'a str),
    Instance(&'a str, &'a str),
}

fn parse_resource(resid: &str) -> Option<Resource<'_>> {
    let parts: Vec<&str> = resid.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        &[INSTANCES] => Some(Resource::AllInstances),
        &[code_id] if !code_id.is_empty() => Some(Resource::Code(code_id)),
        &[code_id, INSTANCES] if !code_id.is_empty() => Some(Resource::Instances(code_id)),
        &[code_id, INSTANCES, address] if !code_id.is_empty() && !address.is_empty() => {
            Some(Resource::Instance(code_id, address))
        }
        _ => None,
    }
}

async fn list_instances(ctx: RequestContext, request: Request) -> Result<Response> {
    let node = ctx.node();
    Ok(match parse_resource(&request.resid) {
        Some(Resource::AllInstances) => Response::ok(node.instance_addresses()),
        Some(Resource::Instances(code_id)) => match node.code_store().instances_of(code_id) {
            Some(instances) => {
                let listing: Vec<Value> = instances
                    .into_iter()
                    .map(|(address, config)| {
                        let created_at = node
                            .instance(&address)
                            .map(|i| i.created_at().to_rfc3339());
                        json!({
                            "address": address,
                            "config": config,
                            "createdAt": created_at,
                        })
                    })
                    .collect();
                Response::ok(listing)
            }
            None => Response::not_found(),
        },
        _ => Response::not_found(),
    })
}

async fn put_code(ctx: RequestContext, request: Request) -> Result<Response> {
    let Some(Resource::Code(code_id)) = parse_resource(&request.resid) else {
        return Ok(Response::bad_request(format!(
            "invalid code id '{}'",
            request.resid
        )));
    };
    let Some(source) = request.body.as_ref().and_then(Value::as_str) else {
        return Ok(Response::bad_request("source text must be a string"));
    };

    let options = LoadOptions::new()
        .with_update(request.query_flag("update"))
        .with_retain_state(request.query_flag("retain_state"));
    Ok(match ctx.node().load_code(code_id, source, options).await {
        Ok(()) => {
            log_info!(ctx.logger, "loaded code '{}'", code_id);
            Response::ok_empty()
        }
        Err(err) => err.into(),
    })
}

async fn post_instance(ctx: RequestContext, request: Request) -> Result<Response> {
    let Some(Resource::Instances(code_id)) = parse_resource(&request.resid) else {
        return Ok(Response::not_found());
    };

    let mut options = InstanceOptions::new().with_retain_state(request.query_flag("retain_state"));
    if let Some(id) = request.query_str("id").filter(|id| !id.is_empty()) {
        options = options.with_address(id);
    }
    Ok(
        match ctx
            .node()
            .create_instance(code_id, options, request.body.clone())
            .await
        {
            Ok(address) => Response::ok(address),
            Err(err) => err.into(),
        },
    )
}

async fn delete_instance(ctx: RequestContext, request: Request) -> Result<Response> {
    let Some(Resource::Instance(code_id, address)) = parse_resource(&request.resid) else {
        return Ok(Response::not_found());
    };
    Ok(match ctx.node().destroy_instance(code_id, address).await {
        Ok(()) => Response::ok_empty(),
        Err(err) => err.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource() {
        assert_eq!(parse_resource("/instances"), Some(Resource::AllInstances));
        assert_eq!(parse_resource("kv"), Some(Resource::Code("kv")));
        assert_eq!(parse_resource("/kv/instances"), Some(Resource::Instances("kv")));
        assert_eq!(
            parse_resource("kv/instances/a1"),
            Some(Resource::Instance("kv", "a1"))
        );
        assert_eq!(parse_resource(""), None);
        assert_eq!(parse_resource("/kv/other"), None);
        assert_eq!(parse_resource("kv/instances/"), None);
    }
}
