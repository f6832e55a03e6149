use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use truapi_client::prelude::*;
use truapi_core::prelude::LaunchError;
use truapi_instruments::Reporter;
use truapi_packager::PackOptions;
use truapi_runner::prelude::*;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "42";

fn options(server: &MockServer) -> ConnectionOptions {
    ConnectionOptions::new(&server.uri(), TENANT, "tester", "secret", None)
        .expect("valid options")
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .and(query_param("TENANTID", TENANT))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "LWSSO_COOKIE_KEY=abc; Path=/"),
        )
        .mount(server)
        .await;
}

async fn client(server: &MockServer) -> LoadTestClient {
    mount_login(server).await;
    let session = Session::login(options(server)).await.expect("login");
    LoadTestClient::new(session, Arc::new(Reporter::new()))
}

fn artifact(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("checkout-1.0.0.tgz");
    std::fs::write(&path, b"packed scripts").expect("write artifact");
    path
}

fn remote_config(distribution: &[(&str, f64)]) -> RemoteConfig {
    RemoteConfig {
        source: PathBuf::from("truapi.json"),
        policy: Policy {
            duration: 600,
            pacing: 1.0,
            ramp_up: 30,
            tear_down: 10,
            vusers: 2,
        },
        distribution: distribution
            .iter()
            .map(|(region, weight)| (region.to_string(), *weight))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn orchestrator(server: &MockServer, artifact: &Path, reporter: Arc<Reporter>) -> Orchestrator {
    Orchestrator::new(
        options(server),
        remote_config(&[("US", 100.0)]),
        PackOptions::default().artifact(Some(artifact.to_path_buf())),
        reporter,
    )
}

async fn mount_json(server: &MockServer, http_method: &str, url: &str, body: serde_json::Value) {
    Mock::given(method(http_method))
        .and(path(url))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fresh_account_is_provisioned_and_launched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_login(&server).await;

    mount_json(&server, "GET", "/api/load-tests", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests"))
        .and(body_json(json!({ "name": TEST_NAME })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 10, "name": TEST_NAME })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10"))
        .and(body_partial_json(json!({ "name": TEST_NAME, "ui_status": "NEW", "send_email": false })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 20 })))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(&server, "GET", "/api/load-tests/10/scripts", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/scripts"))
        .and(body_json(json!({ "name": SCRIPT_NAME, "file": 20 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 30 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests/10/scripts/30"))
        .and(body_partial_json(json!({ "load_test": 10, "load_script": 30, "name": "no name" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 40 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10/scripts/30"))
        .and(body_partial_json(json!({
            "id": 40,
            "duration": 600,
            "ramp_up": 30,
            "tear_down": 10,
            "vusers_num": 2,
            "pacing": { "calculated_pacing": 1.0 },
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "GET",
        "/api/load-tests/10/distribution",
        json!([
            { "id": 1, "name": "US", "vusers_percent": 0 },
            { "id": 2, "name": "EU", "vusers_percent": 100 },
        ]),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10/distribution/1"))
        .and(body_partial_json(json!({ "name": "US", "vusers_percent": 100.0 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10/distribution/2"))
        .and(body_partial_json(json!({ "name": "EU", "vusers_percent": 0.0 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests/10/run"))
        .and(body_json(json!({ "sendEmail": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1001 })))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = Arc::new(Reporter::new());
    let mut ctx = WorkflowContext::new();
    let handoff = orchestrator(&server, &artifact, reporter.clone())
        .execute(&mut ctx)
        .await
        .expect("workflow");

    assert_eq!(handoff.run_id, ResourceId::Number(1001));
    assert_eq!(handoff.tenant_id, TENANT);
    assert_eq!(ctx.state(), &WorkflowState::HandedOff);
    assert_eq!(ctx.script().map(|s| s.origin), Some(ScriptOrigin::Created));
    assert_eq!(ctx.run().map(|run| run.id.clone()), Some(ResourceId::Number(1001)));
    assert_eq!(reporter.operation_count("set geography"), 2);
}

#[tokio::test]
async fn ensure_test_twice_creates_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/load-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/load-tests"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 10, "name": TEST_NAME }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 10, "name": TEST_NAME })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let provisioner = ResourceProvisioner::new(&client);

    let first = provisioner.ensure_test(TEST_NAME).await.expect("first ensure");
    let second = provisioner.ensure_test(TEST_NAME).await.expect("second ensure");

    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn existing_test_is_reused_as_listed() {
    let server = MockServer::start().await;

    mount_json(
        &server,
        "GET",
        "/api/load-tests",
        json!([
            { "id": 3, "name": "Checkout flow" },
            { "id": 7, "name": TEST_NAME, "ui_status": "PASSED" },
            { "id": 9, "name": TEST_NAME },
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/7"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let test = ResourceProvisioner::new(&client)
        .ensure_test(TEST_NAME)
        .await
        .expect("ensure test");

    assert_eq!(test.id, ResourceId::Number(7));
    assert_eq!(test.ui_status.as_deref(), Some("PASSED"));
}

#[tokio::test]
async fn linked_script_is_reloaded_in_place() {
    let server = MockServer::start().await;

    mount_json(
        &server,
        "GET",
        "/api/load-tests/10/scripts",
        json!([{ "id": 40, "load_script": 30, "name": SCRIPT_NAME }]),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/api/scripts/30"))
        .and(body_partial_json(json!({
            "id": 30,
            "file": 21,
            "status": "FINISHED",
            "type": 1,
            "tests": [{ "id": 10, "name": TEST_NAME, "description": null }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 30 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/scripts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests/10/scripts/30"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let binding = ResourceProvisioner::new(&client)
        .ensure_script(&ResourceId::Number(10), &ResourceId::Number(21))
        .await
        .expect("ensure script");

    assert_eq!(
        binding,
        ScriptBinding {
            script_id: ResourceId::Number(30),
            link_id: ResourceId::Number(40),
            origin: ScriptOrigin::Reloaded,
        }
    );
}

#[tokio::test]
async fn failed_upload_stops_the_workflow() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_login(&server).await;

    mount_json(
        &server,
        "GET",
        "/api/load-tests",
        json!([{ "id": 10, "name": TEST_NAME }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    for (http_method, url) in [
        ("GET", "/api/load-tests/10/scripts"),
        ("POST", "/api/scripts"),
        ("GET", "/api/load-tests/10/distribution"),
        ("POST", "/api/load-tests/10/run"),
    ] {
        Mock::given(method(http_method))
            .and(path(url))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;
    }

    let mut ctx = WorkflowContext::new();
    let err = orchestrator(&server, &artifact, Arc::new(Reporter::new()))
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::Remote {
            status: Some(500),
            ..
        }
    ));
    assert_eq!(err.operation(), Some("upload file"));
    assert!(matches!(ctx.state(), WorkflowState::Failed(_)));
    assert!(ctx.artifact().is_none());
}

#[tokio::test]
async fn unknown_region_fails_before_launch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_login(&server).await;

    mount_json(&server, "GET", "/api/load-tests", json!([{ "id": 10, "name": TEST_NAME }])).await;
    mount_json(&server, "POST", "/api/files", json!({ "id": 20 })).await;
    mount_json(
        &server,
        "GET",
        "/api/load-tests/10/scripts",
        json!([{ "id": 40, "load_script": 30 }]),
    )
    .await;
    mount_json(&server, "PUT", "/api/scripts/30", json!({ "id": 30 })).await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10/scripts/30"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mount_json(
        &server,
        "GET",
        "/api/load-tests/10/distribution",
        json!([{ "id": 1, "name": "EU", "vusers_percent": 100 }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests/10/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1001 })))
        .expect(0)
        .mount(&server)
        .await;

    let mut ctx = WorkflowContext::new();
    let err = orchestrator(&server, &artifact, Arc::new(Reporter::new()))
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::Config { .. }));
    assert!(ctx.run().is_none());
}

#[tokio::test]
async fn launch_is_refused_before_configuration() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/load-tests/10/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1001 })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let err = RunLauncher::new(&client)
        .launch(&WorkflowContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::OutOfOrder { .. }));
}

#[tokio::test]
async fn stop_needs_only_a_session() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/api/test-runs/1001"))
        .and(query_param("TENANTID", TENANT))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::login(options(&server)).await.expect("login");
    let reporter = Arc::new(Reporter::new());

    stop_run(session, &ResourceId::Number(1001), reporter.clone())
        .await
        .expect("stop");

    assert_eq!(reporter.operation_count("stop run"), 1);
}

#[tokio::test]
async fn reporter_follows_run_to_its_end() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/test-runs/1001/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ui_status": "INITIALIZING" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/test-runs/1001/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ui_status": "PASSED",
            "loadTestBeginTime": 1_000,
            "loadTestEndTime": 601_000,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/runtime/results/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vusers": { "data": [{
                "specifics": { "geo_location": "US" },
                "values": [{ "x": 0, "y": "2" }, { "x": 60000, "y": 2 }],
            }] },
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/runtime/errors/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let handoff = RunHandoff::new(client.session().clone(), ResourceId::Number(1001));
    let shutdown = truapi_core::prelude::ShutdownHandle::new();

    let status = StatusReporter::new(
        handoff,
        Arc::new(Reporter::new()),
        std::time::Duration::from_millis(10),
    )
    .show_progress(false)
    .follow(shutdown.new_listener())
    .await
    .expect("follow");

    assert_eq!(status.map(|s| s.ui_status), Some("PASSED".to_string()));
}

/// An account where the test and its script already exist, so the workflow gets as far as
/// configuration. The policy update answers with `policy_status`, the distribution lists US and
/// EU and each entry update answers with its status from `geography_status`.
async fn mount_provisioned(server: &MockServer, policy_status: u16, geography_status: [u16; 2]) {
    mount_login(server).await;
    mount_json(server, "GET", "/api/load-tests", json!([{ "id": 10, "name": TEST_NAME }])).await;
    mount_json(server, "POST", "/api/files", json!({ "id": 20 })).await;
    mount_json(
        server,
        "GET",
        "/api/load-tests/10/scripts",
        json!([{ "id": 40, "load_script": 30 }]),
    )
    .await;
    mount_json(server, "PUT", "/api/scripts/30", json!({ "id": 30 })).await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10/scripts/30"))
        .respond_with(ResponseTemplate::new(policy_status))
        .mount(server)
        .await;
    mount_json(
        server,
        "GET",
        "/api/load-tests/10/distribution",
        json!([
            { "id": 1, "name": "US", "vusers_percent": 0 },
            { "id": 2, "name": "EU", "vusers_percent": 100 },
        ]),
    )
    .await;
    for (entry, status) in [1, 2].into_iter().zip(geography_status) {
        Mock::given(method("PUT"))
            .and(path(format!("/api/load-tests/10/distribution/{entry}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/api/load-tests/10/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1001 })))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn failed_geography_entry_stops_before_launch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_provisioned(&server, 200, [503, 200]).await;

    let mut ctx = WorkflowContext::new();
    let err = orchestrator(&server, &artifact, Arc::new(Reporter::new()))
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::Remote {
            status: Some(503),
            ..
        }
    ));
    assert_eq!(err.operation(), Some("set geography"));
    assert!(matches!(ctx.state(), WorkflowState::Failed(_)));
    assert!(ctx.run().is_none());
}

#[tokio::test]
async fn failed_policy_update_stops_before_launch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_provisioned(&server, 500, [200, 200]).await;

    let mut ctx = WorkflowContext::new();
    let err = orchestrator(&server, &artifact, Arc::new(Reporter::new()))
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::Remote {
            status: Some(500),
            ..
        }
    ));
    assert_eq!(err.operation(), Some("configure"));
    assert!(matches!(ctx.state(), WorkflowState::Failed(_)));
    assert!(ctx.run().is_none());
}

#[tokio::test]
async fn policy_and_geography_both_failing_reports_one_of_them() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_provisioned(&server, 500, [503, 503]).await;

    let mut ctx = WorkflowContext::new();
    let err = orchestrator(&server, &artifact, Arc::new(Reporter::new()))
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err.operation(),
        Some("configure") | Some("set geography")
    ));
    assert!(matches!(ctx.state(), WorkflowState::Failed(_)));
    assert!(ctx.run().is_none());
}

#[tokio::test]
async fn failed_rename_aborts_without_rollback() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let artifact = artifact(&dir);
    mount_login(&server).await;

    mount_json(&server, "GET", "/api/load-tests", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 10, "name": TEST_NAME })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/load-tests/10"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    for (http_method, url) in [
        ("POST", "/api/files"),
        ("GET", "/api/load-tests/10/scripts"),
        ("POST", "/api/scripts"),
        ("POST", "/api/load-tests/10/run"),
    ] {
        Mock::given(method(http_method))
            .and(path(url))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;
    }

    let mut ctx = WorkflowContext::new();
    let err = orchestrator(&server, &artifact, Arc::new(Reporter::new()))
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LaunchError::Remote {
            status: Some(500),
            ..
        }
    ));
    assert_eq!(err.operation(), Some("rename test"));
    assert!(matches!(ctx.state(), WorkflowState::Failed(_)));
    assert!(ctx.test().is_none());
}

#[tokio::test]
async fn nameless_tests_in_listing_are_skipped() {
    let server = MockServer::start().await;

    mount_json(
        &server,
        "GET",
        "/api/load-tests",
        json!([
            { "id": 3, "name": null },
            { "id": 5 },
            { "id": 7, "name": TEST_NAME },
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/load-tests"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let test = ResourceLocator::new(&client)
        .find_test(TEST_NAME)
        .await
        .expect("find test");

    assert_eq!(test.map(|test| test.id), Some(ResourceId::Number(7)));
}

#[tokio::test]
async fn reporter_stops_at_once_after_shutdown() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/test-runs/1001/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ui_status": "RUNNING" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let handoff = RunHandoff::new(client.session().clone(), ResourceId::Number(1001));
    let shutdown = truapi_core::prelude::ShutdownHandle::new();
    let listener = shutdown.new_listener();
    shutdown.shutdown();

    let status = StatusReporter::new(
        handoff,
        Arc::new(Reporter::new()),
        std::time::Duration::from_millis(10),
    )
    .show_progress(false)
    .follow(listener)
    .await
    .expect("follow");

    assert_eq!(status, None);
}
