// Policy Service Module
//
// The `_policy` pseudo-service manages the node's policy table:
//
//     put    <service>   body: matcher pattern (string)
//     post   <service>   body: [PolicyRule], compiled and appended to the
//                         current matcher as further alternatives
//     get    <service>   -> 200 pattern | 404
//     delete <service>   -> 200, service becomes unrestricted

use anyhow::Result;
use inai_common::logging::Logger;
use inai_common::{log_info, log_warn};
use serde_json::Value;
use std::sync::Arc;

use crate::routing::policy::{compile_policies, PolicyRule};
use crate::routing::{Request, Response};
use crate::services::{definition, Instance, RequestContext, ServiceDefinition};

/// Code id (and address) of the policy pseudo-service
pub const POLICY_SERVICE: &str = "_policy";

pub fn policy_definition() -> Arc<dyn ServiceDefinition> {
    definition(|instance: &mut Instance, _logger: &Logger| {
        instance
            .on("get", get_policy)
            .on("put", put_policy)
            .on("post", post_rules)
            .on("delete", delete_policy);
        Ok(())
    })
}

fn service_of(request: &Request) -> Option<&str> {
    let service = request.trimmed_resid();
    (!service.is_empty()).then_some(service)
}

async fn get_policy(ctx: RequestContext, request: Request) -> Result<Response> {
    let pattern = service_of(&request).and_then(|s| ctx.node().policies().pattern(s));
    Ok(match pattern {
        Some(pattern) => Response::ok(pattern),
        None => Response::not_found(),
    })
}

async fn put_policy(ctx: RequestContext, request: Request) -> Result<Response> {
    let Some(service) = service_of(&request) else {
        return Ok(Response::bad_request("service name required"));
    };
    let Some(pattern) = request.body.as_ref().and_then(Value::as_str) else {
        return Ok(Response::bad_request("policy must be a pattern string"));
    };
    Ok(install(&ctx, service, pattern))
}

async fn post_rules(ctx: RequestContext, request: Request) -> Result<Response> {
    let Some(service) = service_of(&request) else {
        return Ok(Response::bad_request("service name required"));
    };
    let body = request.body.clone().unwrap_or(Value::Null);
    let rules: Vec<PolicyRule> = match serde_json::from_value(body) {
        Ok(rules) => rules,
        Err(err) => return Ok(Response::bad_request(format!("invalid policy rules: {err}"))),
    };
    match compile_policies(service, &rules) {
        Ok(compiled) => {
            let pattern = match ctx.node().policies().pattern(service) {
                Some(existing) if compiled.is_empty() => existing,
                Some(existing) if !existing.is_empty() => format!("{existing}|{compiled}"),
                _ => compiled,
            };
            let response = install(&ctx, service, &pattern);
            Ok(if response.is_success() {
                Response::ok(pattern)
            } else {
                response
            })
        }
        Err(err) => Ok(Response::bad_request(err.to_string())),
    }
}

async fn delete_policy(ctx: RequestContext, request: Request) -> Result<Response> {
    if let Some(service) = service_of(&request) {
        if ctx.node().policies().remove(service) {
            log_info!(ctx.logger, "policy for '{}' removed", service);
        }
    }
    Ok(Response::ok_empty())
}

fn install(ctx: &RequestContext, service: &str, pattern: &str) -> Response {
    match ctx.node().policies().set(service, pattern) {
        Ok(()) => {
            log_info!(ctx.logger, "policy for '{}' installed", service);
            Response::ok_empty()
        }
        Err(err) => {
            log_warn!(ctx.logger, "rejected policy for '{}': {}", service, err);
            Response::bad_request(err.to_string())
        }
    }
}
