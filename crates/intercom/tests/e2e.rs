// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios: client state machines talking to a real gateway
//! over HTTP, plus the binary's offline subcommands.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use intercom_client::{AnswerOutcome, CallClient, CallPhase, ClientContext, ClientDeps, HttpCallApi};
use intercom_config::ClientConfig;
use intercom_core::{CallApi, CallStatus, ErrorKind, ParticipantStatus};
use intercom_gateway::GatewayState;
use intercom_test_utils::{BUILDING_ID, DOORMAN_ID, MockDevice, TestHarness};
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "e2e-token";
const WAIT: Duration = Duration::from_secs(5);

struct Server {
    base_url: String,
    cancel: CancellationToken,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(harness: &TestHarness) -> Server {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let state = GatewayState::new(harness.service.clone(), Some(TOKEN.into()));
    tokio::spawn(intercom_gateway::serve(listener, state, cancel.clone()));
    Server {
        base_url: format!("http://{addr}"),
        cancel,
    }
}

fn client_config(server: &Server) -> ClientConfig {
    ClientConfig {
        api_base_url: server.base_url.clone(),
        idle_grace_ms: 300,
        invite_poll_interval_ms: 60_000,
        ..Default::default()
    }
}

fn http_api(server: &Server, user_id: &str) -> Arc<HttpCallApi> {
    Arc::new(HttpCallApi::new(&client_config(server), user_id, Some(TOKEN)).unwrap())
}

fn spawn(harness: &TestHarness, server: &Server, context: ClientContext) -> (CallClient, MockDevice) {
    let device = harness.network.device();
    let api = http_api(server, &context.user_id);
    let deps = ClientDeps::new(
        context,
        client_config(server),
        api,
        device.media.clone(),
        device.messaging.clone(),
        device.bus.clone(),
    );
    let (client, _handle) = CallClient::spawn(deps);
    (client, device)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn apartment_call_over_http() {
    let harness = TestHarness::builder().build().await.unwrap();
    let server = serve(&harness).await;

    let (doorman, doorman_device) = spawn(&harness, &server, ClientContext::doorman(DOORMAN_ID));
    let (r1, _r1_device) = spawn(&harness, &server, ClientContext::resident("r1"));
    let (r2, r2_device) = spawn(&harness, &server, ClientContext::resident("r2"));
    r1.go_online().await.unwrap();
    r2.go_online().await.unwrap();

    let call_id = doorman.start_call("302", BUILDING_ID).await.unwrap();
    doorman.wait_for_phase(CallPhase::Connecting, WAIT).await.unwrap();
    r1.wait_for_phase(CallPhase::Ringing, WAIT).await.unwrap();
    r2.wait_for_phase(CallPhase::Ringing, WAIT).await.unwrap();

    assert_eq!(r2.answer().await.unwrap(), AnswerOutcome::Answered);
    r2.wait_for_phase(CallPhase::Connected, WAIT).await.unwrap();
    doorman.wait_for_phase(CallPhase::Connected, WAIT).await.unwrap();
    r1.wait_for_phase(CallPhase::Idle, WAIT).await.unwrap();
    assert_eq!(
        r2_device.media.current_channel(),
        doorman_device.media.current_channel()
    );

    harness.clock.advance_secs(42);
    doorman.end_call(None).await.unwrap();
    doorman.wait_for_phase(CallPhase::Ended, WAIT).await.unwrap();
    r2.wait_for_phase(CallPhase::Idle, WAIT).await.unwrap();

    let snapshot = harness.service.status(&call_id).await.unwrap();
    assert_eq!(snapshot.call.status, CallStatus::Ended);
    assert_eq!(snapshot.call.duration_seconds, Some(42));
    assert_eq!(
        snapshot.participant("r1").unwrap().status,
        ParticipantStatus::Missed
    );
    assert_eq!(
        snapshot.participant("r2").unwrap().status,
        ParticipantStatus::Disconnected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lost_race_over_http_is_reported_as_already_taken() {
    let harness = TestHarness::builder().build().await.unwrap();
    let server = serve(&harness).await;

    let (doorman, _d) = spawn(&harness, &server, ClientContext::doorman(DOORMAN_ID));
    let (r1, r1_device) = spawn(&harness, &server, ClientContext::resident("r1"));
    let (r2, _r2_device) = spawn(&harness, &server, ClientContext::resident("r2"));
    r1.go_online().await.unwrap();
    r2.go_online().await.unwrap();

    let call_id = doorman.start_call("302", BUILDING_ID).await.unwrap();
    r1.wait_for_phase(CallPhase::Ringing, WAIT).await.unwrap();
    r2.wait_for_phase(CallPhase::Ringing, WAIT).await.unwrap();

    // r2 wins directly against the server before r1's device reacts.
    let direct = http_api(&server, "r2");
    direct
        .answer_call(
            &call_id,
            &intercom_core::api::AnswerRequest {
                user_id: "r2".into(),
                user_type: "resident".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(r1.answer().await.unwrap(), AnswerOutcome::AlreadyTaken);
    assert_eq!(r1.snapshot().phase, CallPhase::Idle);
    assert!(r1_device.media.join_tokens().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_api_maps_gateway_errors() {
    let harness = TestHarness::builder().build().await.unwrap();
    let server = serve(&harness).await;
    let api = http_api(&server, "r1");

    let missing = api
        .call_status(&intercom_core::CallId::from("nope"))
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let request = intercom_core::api::TokenRequest {
        channel_name: "standby-r2".into(),
        uid: "r2".into(),
        ..Default::default()
    };
    let forbidden = api.generate_token(&request).await.unwrap_err();
    assert_eq!(forbidden.kind(), ErrorKind::Upstream);

    let own = intercom_core::api::TokenRequest {
        channel_name: "standby-r1".into(),
        uid: "r1".into(),
        ..Default::default()
    };
    let bundle = api.generate_token(&own).await.unwrap();
    assert!(harness.issuer.validate_bundle(&bundle).is_ok());

    let unauthenticated =
        HttpCallApi::new(&client_config(&server), "r1", Some("wrong")).unwrap();
    let err = unauthenticated.generate_token(&own).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
}

fn intercom() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_intercom"));
    command.env("RUST_LOG", "off");
    command
}

#[test]
fn issue_token_subcommand_prints_a_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("intercom.toml");
    std::fs::write(
        &config,
        "[tokens]\napp_id = \"app\"\napp_certificate = \"cert\"\ndefault_ttl_secs = 120\n",
    )
    .unwrap();

    let output = intercom()
        .arg("--config")
        .arg(&config)
        .args(["issue-token", "--channel", "standby-r1", "--uid", "r1"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let bundle: intercom_core::TokenBundle = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(bundle.uid, "r1");
    assert_eq!(bundle.ttl_seconds, 120);
}

#[test]
fn invalid_config_exits_with_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("intercom.toml");
    std::fs::write(&config, "[server]\nprot = 3001\n").unwrap();

    let output = intercom()
        .arg("--config")
        .arg(&config)
        .args(["issue-token", "--channel", "c", "--uid", "u"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn seed_subcommand_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("data").join("intercom.db");
    let config = dir.path().join("intercom.toml");
    std::fs::write(
        &config,
        format!("[storage]\ndatabase_path = {:?}\n", db.to_string_lossy()),
    )
    .unwrap();
    let directory = dir.path().join("directory.toml");
    std::fs::write(
        &directory,
        r#"
[[buildings]]
id = "b1"
name = "Tower"

[[profiles]]
id = "d1"
full_name = "Door Man"
user_type = "doorman"
building_id = "b1"

[[profiles]]
id = "r1"
full_name = "Resident One"
user_type = "resident"
building_id = "b1"

[[apartments]]
id = "apt-302"
building_id = "b1"
number = "302"
residents = ["r1"]
"#,
    )
    .unwrap();

    for _ in 0..2 {
        let output = intercom()
            .arg("--config")
            .arg(&config)
            .arg("seed")
            .arg("--file")
            .arg(&directory)
            .output()
            .unwrap();
        assert!(output.status.success(), "{output:?}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("seeded 1 buildings"), "{stdout}");
    }
    assert!(db.exists());
}
