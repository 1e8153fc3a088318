// Fake authorization collaborator
//
// Answers `post /check` with the groups of the token found in the
// `authorization` header, or 401 for a missing or unknown token.

use inai_common::logging::Logger;
use inai_node::services::{definition, Instance, ServiceDefinition};
use inai_node::Response;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub fn fake_auth_definition(tokens: HashMap<String, Vec<String>>) -> Arc<dyn ServiceDefinition> {
    let tokens = Arc::new(tokens);
    definition(move |instance: &mut Instance, _logger: &Logger| {
        let tokens = tokens.clone();
        instance.on("post", move |_ctx, request| {
            let groups = request
                .header("authorization")
                .and_then(|token| tokens.get(token))
                .cloned();
            async move {
                if request.trimmed_resid() != "check" {
                    return Ok(Response::not_found());
                }
                Ok(match groups {
                    Some(groups) => Response::ok(json!({ "groups": groups })),
                    None => Response::with_status(401).with_body("unknown token"),
                })
            }
        });
        Ok(())
    })
}
