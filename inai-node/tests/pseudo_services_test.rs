// Tests for the `_dns`, `_services` and `_policy` pseudo-services
//
// INTENTION: Drive the registry, the code store, the lifecycle manager and
// the policy table purely over the internal RPC protocol, the way a remote
// operator would.

use inai_node::{LoadOptions, Node, Response};
use inai_test_utils::fixtures::static_get::static_get_definition;
use inai_test_utils::{create_test_catalog, create_test_node, plugin_source, plugin_source_with};
use serde_json::{json, Value};

async fn test_node() -> Node {
    create_test_node(create_test_catalog()).await.unwrap()
}

async fn load(node: &Node, code_id: &str, source: String) -> Response {
    node.network("_services", "put", code_id, None, None, Some(json!(source)))
        .await
}

async fn start(node: &Node, code_id: &str, query: Option<Value>, config: Option<Value>) -> String {
    let response = node
        .network("_services", "post", &format!("{code_id}/instances"), query, None, config)
        .await;
    assert_eq!(response.status, 200, "start of {code_id} failed: {response}");
    response.body_str().unwrap().to_string()
}

#[tokio::test]
async fn test_dns_entries() {
    let node = test_node().await;

    let response = node.network("_dns", "get", "kv", None, None, None).await;
    assert_eq!(response.status, 404);

    let response = node
        .network("_dns", "put", "/kv", None, None, Some(json!("addr-1")))
        .await;
    assert!(response.is_success());
    let response = node.network("_dns", "get", "kv", None, None, None).await;
    assert_eq!(response, Response::ok("addr-1"));

    // Metadata takes any JSON; plain names only take addresses.
    let meta = json!({"codeId": "kv", "public": true});
    let response = node
        .network("_dns", "put", "kv/_meta", None, None, Some(meta.clone()))
        .await;
    assert!(response.is_success());
    let response = node.network("_dns", "get", "kv/_meta", None, None, None).await;
    assert_eq!(response, Response::ok(meta.clone()));
    assert_eq!(node.registry().meta("kv"), Some(meta));

    let response = node
        .network("_dns", "put", "kv", None, None, Some(json!({"not": "an address"})))
        .await;
    assert_eq!(response.status, 400);
    let response = node
        .network("_dns", "put", "/", None, None, Some(json!("addr-2")))
        .await;
    assert_eq!(response.status, 400);

    let response = node.network("_dns", "delete", "kv", None, None, None).await;
    assert!(response.is_success());
    let response = node.network("_dns", "get", "kv", None, None, None).await;
    assert_eq!(response.status, 404);
    // Deleting again is harmless.
    let response = node.network("_dns", "delete", "kv", None, None, None).await;
    assert!(response.is_success());
}

/// Rebinding a name moves traffic to the new address; the old address is
/// still reachable directly and is only recorded as orphaned.
#[tokio::test]
async fn test_rebinding_a_name() {
    let node = test_node().await;
    assert!(load(&node, "v1", plugin_source_with("static_get", json!("one"))).await.is_success());
    assert!(load(&node, "v2", plugin_source_with("static_get", json!("two"))).await.is_success());
    let first = start(&node, "v1", None, None).await;
    let second = start(&node, "v2", None, None).await;

    node.network("_dns", "put", "app", None, None, Some(json!(first.clone())))
        .await;
    node.network("_dns", "put", "alias", None, None, Some(json!(first.clone())))
        .await;
    let response = node.network("app", "get", "/", None, None, None).await;
    assert_eq!(response, Response::ok("one"));

    node.network("_dns", "put", "app", None, None, Some(json!(second.clone())))
        .await;
    let response = node.network("app", "get", "/", None, None, None).await;
    assert_eq!(response, Response::ok("two"));
    // Still named by `alias`.
    assert!(!node.registry().is_orphan(&first));

    node.network("_dns", "delete", "alias", None, None, None).await;
    assert!(node.registry().is_orphan(&first));
    assert_eq!(node.registry().orphans(), vec![first.clone()]);
    let response = node.network(&first, "get", "/", None, None, None).await;
    assert_eq!(response, Response::ok("one"));

    // Naming it again clears the orphan mark.
    node.registry().bind("revived", &first);
    assert!(!node.registry().is_orphan(&first));
}

#[tokio::test]
async fn test_services_code_loading() {
    let node = test_node().await;

    assert!(load(&node, "echo", plugin_source("echo")).await.is_success());
    assert!(node.code_store().contains("echo"));

    let response = load(&node, "broken", "this is not a manifest".to_string()).await;
    assert_eq!(response.status, 400);
    let response = load(&node, "missing", plugin_source("no-such-plugin")).await;
    assert_eq!(response.status, 400);
    assert!(!node.code_store().contains("missing"));

    let response = node
        .network("_services", "put", "echo", None, None, Some(json!({"plugin": "echo"})))
        .await;
    assert_eq!(response.status, 400);

    let response = node
        .network("_services", "put", "a/b/c/d", None, None, Some(json!(plugin_source("echo"))))
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_services_instances() {
    let node = test_node().await;
    assert!(load(&node, "echo", plugin_source("echo")).await.is_success());

    let generated = start(&node, "echo", None, Some(json!({"mode": "a"}))).await;
    let named = start(&node, "echo", Some(json!({"id": "echo-b"})), None).await;
    assert_eq!(named, "echo-b");
    assert_ne!(generated, named);

    let response = node
        .network("_services", "post", "ghost/instances", None, None, None)
        .await;
    assert_eq!(response.status, 404);

    let response = node
        .network("_services", "get", "/instances", None, None, None)
        .await;
    let mut expected = vec![
        "_dns".to_string(),
        "_policy".to_string(),
        "_services".to_string(),
        generated.clone(),
        named.clone(),
    ];
    expected.sort();
    assert_eq!(response, Response::ok(expected));

    let response = node
        .network("_services", "get", "echo/instances", None, None, None)
        .await;
    assert_eq!(response.status, 200);
    let listing = response.body.unwrap();
    let listing = listing.as_array().unwrap();
    assert_eq!(listing.len(), 2);
    let entry = listing
        .iter()
        .find(|e| e["address"] == json!(generated))
        .unwrap();
    assert_eq!(entry["config"], json!({"mode": "a"}));
    assert!(entry["createdAt"].is_string());

    let response = node
        .network("_services", "get", "ghost/instances", None, None, None)
        .await;
    assert_eq!(response.status, 404);

    let response = node
        .network("_services", "delete", &format!("echo/instances/{named}"), None, None, None)
        .await;
    assert!(response.is_success());
    assert!(!node.is_live(&named));
    assert!(node.is_live(&generated));

    let response = node
        .network("_services", "delete", "ghost/instances/x", None, None, None)
        .await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_policy_management() {
    let node = test_node().await;

    let response = node.network("_policy", "get", "kv", None, None, None).await;
    assert_eq!(response.status, 404);

    let response = node
        .network("_policy", "put", "kv", None, None, Some(json!("^kv get ")))
        .await;
    assert!(response.is_success());
    let response = node.network("_policy", "get", "/kv", None, None, None).await;
    assert_eq!(response, Response::ok("^kv get "));

    // A malformed pattern is rejected and the previous matcher stays.
    let response = node
        .network("_policy", "put", "kv", None, None, Some(json!("[unclosed")))
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(node.policies().pattern("kv").as_deref(), Some("^kv get "));

    // Posted rules are appended to what is installed.
    let rules = json!([{"methods": ["get"], "resource": "/?.*", "groups": ["readers"]}]);
    let response = node
        .network("_policy", "post", "kv", None, None, Some(rules))
        .await;
    assert_eq!(response.status, 200);
    let pattern = response.body_str().unwrap().to_string();
    assert!(pattern.starts_with("^kv get |(?:kv"), "{pattern}");
    assert_eq!(node.policies().pattern("kv"), Some(pattern));

    let invalid = json!([{"methods": [], "resource": "/", "groups": ["readers"]}]);
    let response = node
        .network("_policy", "post", "kv", None, None, Some(invalid))
        .await;
    assert_eq!(response.status, 400);
    let response = node
        .network("_policy", "post", "kv", None, None, Some(json!("not rules")))
        .await;
    assert_eq!(response.status, 400);

    let response = node.network("_policy", "delete", "kv", None, None, None).await;
    assert!(response.is_success());
    assert!(!node.policies().is_restricted("kv"));
}

/// Each post adds rules; earlier grants keep matching until a put replaces them.
#[tokio::test]
async fn test_policy_post_appends_rules() {
    let node = test_node().await;
    let readers = json!([{"methods": ["get"], "resource": "/?.*", "groups": ["readers"]}]);
    let writers = json!([{"methods": ["post"], "resource": "/?.*", "groups": ["writers"]}]);

    for rules in [readers, writers] {
        let response = node
            .network("_policy", "post", "kv", None, None, Some(rules))
            .await;
        assert_eq!(response.status, 200);
    }

    let matcher = node.policies().matcher("kv").unwrap();
    assert!(matcher.is_match("kv get /a |readers|"));
    assert!(matcher.is_match("kv post /a |writers|"));
    assert!(!matcher.is_match("kv post /a |readers|"));

    // An empty rule set adds nothing.
    let before = node.policies().pattern("kv");
    let response = node
        .network("_policy", "post", "kv", None, None, Some(json!([])))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(node.policies().pattern("kv"), before);

    let response = node
        .network("_policy", "put", "kv", None, None, Some(json!("^kv get ")))
        .await;
    assert!(response.is_success());
    let matcher = node.policies().matcher("kv").unwrap();
    assert!(!matcher.is_match("kv post /a |writers|"));
}

/// Pseudo-services are ordinary instances and can be replaced.
#[tokio::test]
async fn test_pseudo_service_is_replaceable() {
    let node = test_node().await;
    node.registry().bind("kv", "somewhere");

    node.install_definition(
        "_dns",
        static_get_definition(json!("custom resolver")),
        LoadOptions::new().with_update(true),
    )
    .await
    .unwrap();

    let response = node.network("_dns", "get", "kv", None, None, None).await;
    assert_eq!(response, Response::ok("custom resolver"));
    let response = node
        .network("_dns", "put", "kv", None, None, Some(json!("elsewhere")))
        .await;
    assert_eq!(response, Response::unsupported_verb("put"));
    assert_eq!(node.registry().resolve("kv").unwrap(), "somewhere");
}
