// Tests for the boot sequence
//
// INTENTION: Rebuild a node's registry and code store from a codebase the
// way a process start does, and check what is skipped along the way.

use inai_node::{BootManifest, Codebase, InMemoryCodebase, MeshError, Response, ServiceSpec};
use inai_test_utils::fixtures::failing_boot::failing_boot_definition;
use inai_test_utils::{create_test_catalog, create_test_node, plugin_source, plugin_source_with};
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_boot_service_names_instance_and_records_metadata() {
    let node = create_test_node(create_test_catalog()).await.unwrap();
    std::env::set_var("INAI_BOOT_TEST_REGION", "eu-west");

    let codebase = InMemoryCodebase::new();
    codebase.add_code("echo", plugin_source("echo"));
    let spec = ServiceSpec::new("echo")
        .with_name("greeter")
        .with_public(true)
        .with_config(json!({"region": "$INAI_BOOT_TEST_REGION", "zone": "$INAI_BOOT_TEST_UNSET"}));

    let address = node.boot_service(&codebase, &spec).await.unwrap();
    assert_eq!(node.registry().resolve("greeter").unwrap(), address);

    let meta = node.registry().meta("greeter").unwrap();
    assert_eq!(meta["codeId"], "echo");
    assert_eq!(meta["public"], true);
    assert_eq!(meta["config"]["region"], "eu-west");
    // Unknown variables are left as written.
    assert_eq!(meta["config"]["zone"], "$INAI_BOOT_TEST_UNSET");
    assert_eq!(node.registry().meta(&address), Some(meta));

    let instances = node.code_store().instances_of("echo").unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(
        instances[0].1,
        Some(json!({"region": "eu-west", "zone": "$INAI_BOOT_TEST_UNSET"}))
    );

    let response = node.network("greeter", "get", "/hi", None, None, None).await;
    assert_eq!(response.status, 200);

    let missing = ServiceSpec::new("not-in-codebase").with_name("ghost");
    let result = node.boot_service(&codebase, &missing).await;
    assert!(matches!(result, Err(MeshError::NotFound(_))));
    assert!(node.registry().resolve("ghost").is_err());
}

/// Variables resolve in every part of the spec, not only its config.
#[tokio::test]
async fn test_boot_service_resolves_variables_in_name_and_code_id() {
    let node = create_test_node(create_test_catalog()).await.unwrap();
    std::env::set_var("INAI_BOOT_TEST_TENANT", "acme");

    let codebase = InMemoryCodebase::new();
    codebase.add_code("static-acme", plugin_source_with("static_get", json!("tenant page")));
    let spec = ServiceSpec::new("static-$INAI_BOOT_TEST_TENANT")
        .with_name("$INAI_BOOT_TEST_TENANT-site");

    let address = node.boot_service(&codebase, &spec).await.unwrap();
    assert_eq!(node.registry().resolve("acme-site").unwrap(), address);
    assert_eq!(node.registry().meta("acme-site").unwrap()["codeId"], "static-acme");
    assert!(node.code_store().contains("static-acme"));

    let response = node.network("acme-site", "get", "/", None, None, None).await;
    assert_eq!(response, Response::ok("tenant page"));
}

#[tokio::test]
async fn test_unnamed_service_is_only_reachable_by_address() {
    let node = create_test_node(create_test_catalog()).await.unwrap();
    let codebase = InMemoryCodebase::new();
    codebase.add_code("static", plugin_source_with("static_get", json!("hello")));

    let address = node
        .boot_service(&codebase, &ServiceSpec::new("static"))
        .await
        .unwrap();
    assert!(node.registry().names().is_empty());
    let response = node.network(&address, "get", "/", None, None, None).await;
    assert_eq!(response, Response::ok("hello"));
}

#[tokio::test]
async fn test_boot_from_manifest() {
    match timeout(Duration::from_secs(10), async {
        let catalog = create_test_catalog();
        catalog.register_definition(
            "stubborn",
            failing_boot_definition(500, Arc::new(AtomicUsize::new(0))),
        );
        let node = create_test_node(catalog).await.unwrap();

        let codebase = InMemoryCodebase::new();
        codebase.add_code("static", plugin_source_with("static_get", json!("static")));
        codebase.add_code("echo", plugin_source("echo"));
        codebase.add_code("stubborn", plugin_source("stubborn"));
        codebase.add_code("unloadable", plugin_source("no-such-plugin"));

        codebase.add_spec("first", ServiceSpec::new("static"));
        codebase.add_spec("disabled", ServiceSpec::new("echo").with_disabled(true));
        codebase.add_spec("browser-only", ServiceSpec::new("echo").with_env("browser"));
        codebase.add_spec("stubborn", ServiceSpec::new("stubborn"));
        codebase.add_spec("unloadable", ServiceSpec::new("unloadable"));
        codebase.add_spec("no-code", ServiceSpec::new("absent"));
        codebase.add_spec(
            "second",
            ServiceSpec::new("echo").with_env("browser").with_env("server"),
        );

        let manifest = BootManifest::new([
            "second",
            "disabled",
            "unknown",
            "browser-only",
            "stubborn",
            "unloadable",
            "no-code",
            "first",
        ]);
        let codebase: Arc<dyn Codebase> = Arc::new(codebase);
        let booted = node.boot_from_manifest(codebase, &manifest).await;

        let names: Vec<&str> = booted.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        for (name, address) in &booted {
            assert_eq!(&node.registry().resolve(name).unwrap(), address);
            assert!(node.is_live(address));
        }
        for skipped in ["disabled", "unknown", "browser-only", "stubborn", "unloadable", "no-code"] {
            assert!(node.registry().resolve(skipped).is_err(), "{skipped} was booted");
        }

        let response = node.network("first", "get", "/", None, None, None).await;
        assert_eq!(response, Response::ok("static"));
        // The failed boot left no instance behind.
        assert_eq!(node.code_store().instances_of("stubborn"), Some(vec![]));
    })
    .await
    {
        Ok(_) => {}
        Err(_) => panic!("Test timed out after 10 seconds"),
    }
}

#[test]
fn test_manifest_deserializes() {
    let manifest: BootManifest = serde_json::from_value(json!({"start": ["a", "b"]})).unwrap();
    assert_eq!(manifest, BootManifest::new(["a", "b"]));
    let empty: BootManifest = serde_json::from_value(json!({})).unwrap();
    assert!(empty.start.is_empty());
}
