// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Peer signaling over the mock messaging network.

use std::sync::{Arc, Mutex};

use intercom_core::{CallId, RtmSignal, SignalType};
use intercom_signaling::SignalingChannel;
use intercom_test_utils::{MockDevice, MockNetwork};

fn channel(device: &MockDevice) -> SignalingChannel {
    SignalingChannel::new(device.messaging.clone(), device.bus.clone())
}

fn collect(channel: &SignalingChannel) -> (Arc<Mutex<Vec<RtmSignal>>>, intercom_bus::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = channel.on_signal(move |signal| sink.lock().unwrap().push(signal));
    (seen, sub)
}

#[tokio::test]
async fn invite_reaches_each_distinct_target_once() {
    let network = MockNetwork::new();
    let doorman = network.device();
    let r1 = network.device();
    let r2 = network.device();

    let d = channel(&doorman);
    let (c1, c2) = (channel(&r1), channel(&r2));
    d.login("d1", "tok").await.unwrap();
    c1.login("r1", "tok").await.unwrap();
    c2.login("r2", "tok").await.unwrap();
    let (seen1, _s1) = collect(&c1);
    let (seen2, _s2) = collect(&c2);

    let invite = RtmSignal::invite(&CallId::from("c1"), "d1", "call-c1", 1);
    let targets = vec!["r1".to_string(), "r2".into(), "r1".into(), "d1".into()];
    let report = d.send(&targets, &invite).await;

    assert_eq!(report.delivered, vec!["r1", "r2"]);
    assert!(report.failed.is_empty());
    assert_eq!(seen1.lock().unwrap().len(), 1);
    let got = seen2.lock().unwrap()[0].clone();
    assert_eq!(got.signal_type, SignalType::Invite);
    assert_eq!(got.channel.as_deref(), Some("call-c1"));
}

#[tokio::test]
async fn partial_delivery_failure_is_reported_not_raised() {
    let network = MockNetwork::new();
    let doorman = network.device();
    let r1 = network.device();
    let d = channel(&doorman);
    d.login("d1", "tok").await.unwrap();
    channel(&r1).login("r1", "tok").await.unwrap();

    let end = RtmSignal::end(&CallId::from("c1"), "d1", "hangup", 1);
    let report = d
        .send(&["r1".to_string(), "r2".to_string()], &end)
        .await;
    assert_eq!(report.delivered, vec!["r1"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "r2");
    assert!(!report.all_failed());

    network.set_unreachable("r1", true);
    let report = d.send(&["r1".to_string()], &end).await;
    assert!(report.all_failed());

    let report = d.send(&[], &end).await;
    assert!(report.delivered.is_empty() && report.failed.is_empty());
}

#[tokio::test]
async fn garbage_payloads_are_dropped_silently() {
    let network = MockNetwork::new();
    let r1 = network.device();
    let c1 = channel(&r1);
    c1.login("r1", "tok").await.unwrap();
    let (seen, sub) = collect(&c1);

    for junk in ["", "not json", "{}", r#"{"t":"PING","callId":"c","from":"x","ts":1}"#] {
        assert!(network.inject_peer_message("x", "r1", junk));
    }
    assert!(seen.lock().unwrap().is_empty());

    let answer = RtmSignal::answer(&CallId::from("c1"), "r2", 1);
    network.inject_peer_message("r2", "r1", &answer.to_json().unwrap());
    assert_eq!(seen.lock().unwrap().len(), 1);

    drop(sub);
    network.inject_peer_message("r2", "r1", &answer.to_json().unwrap());
    assert_eq!(seen.lock().unwrap().len(), 1);
}
