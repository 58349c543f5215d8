// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the SQLite Call Store's conditional writes.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use intercom_core::api::HistoryQuery;
use intercom_core::traits::{AnswerWrite, DeclineWrite, EndWrite};
use intercom_core::{
    Call, CallId, CallStatus, CallStore, Participant, ParticipantStatus, UserType,
};
use intercom_storage::{
    ApartmentSeed, BuildingSeed, Database, DirectorySeed, ProfileSeed, SqliteCallStore,
};
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

async fn seeded_store() -> (TempDir, Arc<SqliteCallStore>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("calls.db")).await.unwrap();
    let store = SqliteCallStore::with_database(db);
    let profile = |id: &str, user_type| ProfileSeed {
        id: id.into(),
        full_name: format!("Profile {id}"),
        user_type,
        building_id: Some("b1".into()),
    };
    store
        .seed(DirectorySeed {
            buildings: vec![BuildingSeed {
                id: "b1".into(),
                name: "Tower".into(),
                address: None,
            }],
            profiles: vec![
                profile("d1", UserType::Doorman),
                profile("r1", UserType::Resident),
                profile("r2", UserType::Resident),
                profile("r3", UserType::Resident),
            ],
            apartments: vec![ApartmentSeed {
                id: "apt-302".into(),
                building_id: "b1".into(),
                number: "302".into(),
                block: None,
                residents: vec!["r1".into(), "r2".into(), "r3".into()],
                former_residents: vec![],
            }],
        })
        .await
        .unwrap();
    (dir, Arc::new(store))
}

async fn ringing_call(store: &SqliteCallStore, id: &str, started_at: DateTime<Utc>) -> CallId {
    let call_id = CallId::from(id);
    let call = Call {
        id: call_id.clone(),
        channel_name: call_id.channel_name(),
        apartment_id: "apt-302".into(),
        apartment_number: "302".into(),
        building_id: "b1".into(),
        doorman_id: "d1".into(),
        status: CallStatus::Ringing,
        started_at,
        answered_at: None,
        ended_at: None,
        duration_seconds: None,
        end_cause: None,
    };
    let mut participants = vec![Participant {
        call_id: call_id.clone(),
        user_id: "d1".into(),
        user_type: UserType::Doorman,
        status: ParticipantStatus::Connected,
        name: None,
        joined_at: Some(started_at),
        left_at: None,
    }];
    for r in ["r1", "r2", "r3"] {
        participants.push(Participant {
            call_id: call_id.clone(),
            user_id: r.into(),
            user_type: UserType::Resident,
            status: ParticipantStatus::Invited,
            name: None,
            joined_at: None,
            left_at: None,
        });
    }
    store.insert_call(&call, &participants).await.unwrap();
    call_id
}

fn status_of(snapshot: &intercom_core::CallSnapshot, user: &str) -> ParticipantStatus {
    snapshot.participant(user).unwrap().status
}

#[tokio::test]
async fn concurrent_answers_have_exactly_one_winner() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c-race", t0()).await;

    let (a, b, c) = tokio::join!(
        store.answer_call(&id, "r1", t0()),
        store.answer_call(&id, "r2", t0()),
        store.answer_call(&id, "r3", t0()),
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];
    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, AnswerWrite::Answered(_)))
        .count();
    assert_eq!(winners, 1, "{outcomes:?}");
    for outcome in &outcomes {
        if !matches!(outcome, AnswerWrite::Answered(_)) {
            assert!(matches!(
                outcome,
                AnswerWrite::NotRinging(CallStatus::Active)
                    | AnswerWrite::ParticipantNotPending(ParticipantStatus::Missed)
            ));
        }
    }

    let snapshot = store.get_call(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.call.status, CallStatus::Active);
    let connected: Vec<_> = snapshot
        .residents()
        .filter(|p| p.status == ParticipantStatus::Connected)
        .collect();
    let missed = snapshot
        .residents()
        .filter(|p| p.status == ParticipantStatus::Missed)
        .count();
    assert_eq!(connected.len(), 1);
    assert_eq!(missed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn answers_through_two_handles_on_one_file_never_fail() {
    let (dir, primary) = seeded_store().await;
    let replica = SqliteCallStore::with_database(
        Database::open(dir.path().join("calls.db")).await.unwrap(),
    );

    for round in 0..50 {
        let id = ringing_call(&primary, &format!("c-replica-{round}"), t0()).await;
        let (a, b) = tokio::join!(
            primary.answer_call(&id, "r1", t0()),
            replica.answer_call(&id, "r2", t0()),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let winners = outcomes
            .iter()
            .filter(|o| matches!(o, AnswerWrite::Answered(_)))
            .count();
        assert_eq!(winners, 1, "round {round}: {outcomes:?}");

        let snapshot = primary.get_call(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.call.status, CallStatus::Active);
    }
}

#[tokio::test]
async fn answer_after_answer_is_rejected() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;

    let AnswerWrite::Answered(snapshot) = store.answer_call(&id, "r2", t0()).await.unwrap() else {
        panic!("first answer should win");
    };
    assert_eq!(snapshot.call.answered_at, Some(t0()));
    assert_eq!(status_of(&snapshot, "r2"), ParticipantStatus::Connected);
    assert_eq!(status_of(&snapshot, "r1"), ParticipantStatus::Missed);
    assert_eq!(status_of(&snapshot, "d1"), ParticipantStatus::Connected);

    let second = store.answer_call(&id, "r1", t0()).await.unwrap();
    assert!(matches!(
        second,
        AnswerWrite::NotRinging(CallStatus::Active)
    ));
}

#[tokio::test]
async fn answer_reports_missing_and_foreign_users() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;
    assert_eq!(
        store
            .answer_call(&CallId::from("ghost"), "r1", t0())
            .await
            .unwrap(),
        AnswerWrite::CallMissing
    );
    assert_eq!(
        store.answer_call(&id, "stranger", t0()).await.unwrap(),
        AnswerWrite::NotParticipant
    );
}

#[tokio::test]
async fn declining_every_resident_declines_the_call() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;

    for user in ["r1", "r2"] {
        let DeclineWrite::Recorded {
            snapshot,
            call_declined,
        } = store.decline_call(&id, user, t0()).await.unwrap()
        else {
            panic!("decline should be recorded");
        };
        assert!(!call_declined);
        assert_eq!(snapshot.call.status, CallStatus::Ringing);
    }

    let DeclineWrite::Recorded {
        snapshot,
        call_declined,
    } = store.decline_call(&id, "r3", t0()).await.unwrap()
    else {
        panic!("decline should be recorded");
    };
    assert!(call_declined);
    assert_eq!(snapshot.call.status, CallStatus::Declined);
    assert!(snapshot.call.answered_at.is_none());
    assert!(
        snapshot
            .residents()
            .all(|p| p.status == ParticipantStatus::Declined)
    );

    assert_eq!(
        store.decline_call(&id, "r1", t0()).await.unwrap(),
        DeclineWrite::NotRinging(CallStatus::Declined)
    );
    assert!(matches!(
        store.answer_call(&id, "r1", t0()).await.unwrap(),
        AnswerWrite::NotRinging(CallStatus::Declined)
    ));
}

#[tokio::test]
async fn declined_resident_cannot_answer() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;
    store.decline_call(&id, "r1", t0()).await.unwrap();
    assert_eq!(
        store.answer_call(&id, "r1", t0()).await.unwrap(),
        AnswerWrite::ParticipantNotPending(ParticipantStatus::Declined)
    );
}

#[tokio::test]
async fn end_computes_duration_from_answer() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;
    let answered = t0() + Duration::seconds(5);
    store.answer_call(&id, "r2", answered).await.unwrap();

    let EndWrite::Ended(snapshot) = store
        .end_call(&id, Some("d1"), "hangup", answered + Duration::seconds(42))
        .await
        .unwrap()
    else {
        panic!("end should apply");
    };
    assert_eq!(snapshot.call.status, CallStatus::Ended);
    assert_eq!(snapshot.call.duration_seconds, Some(42));
    assert_eq!(snapshot.call.end_cause.as_deref(), Some("hangup"));
    assert_eq!(status_of(&snapshot, "d1"), ParticipantStatus::Disconnected);
    assert_eq!(status_of(&snapshot, "r2"), ParticipantStatus::Disconnected);
    assert_eq!(status_of(&snapshot, "r1"), ParticipantStatus::Missed);
}

#[tokio::test]
async fn ending_an_unanswered_call_leaves_duration_null() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;
    let EndWrite::Ended(snapshot) = store
        .end_call(&id, Some("d1"), "cancelled", t0() + Duration::seconds(9))
        .await
        .unwrap()
    else {
        panic!("end should apply");
    };
    assert_eq!(snapshot.call.duration_seconds, None);
    assert_eq!(snapshot.call.reported_duration(), 0);
    assert!(
        snapshot
            .residents()
            .all(|p| p.status == ParticipantStatus::Missed)
    );
}

#[tokio::test]
async fn second_end_returns_the_same_terminal_snapshot() {
    let (_dir, store) = seeded_store().await;
    let id = ringing_call(&store, "c1", t0()).await;
    store.answer_call(&id, "r1", t0()).await.unwrap();
    let EndWrite::Ended(first) = store
        .end_call(&id, Some("r1"), "hangup", t0() + Duration::seconds(30))
        .await
        .unwrap()
    else {
        panic!("end should apply");
    };
    let EndWrite::AlreadyFinal(second) = store
        .end_call(&id, Some("d1"), "hangup", t0() + Duration::seconds(90))
        .await
        .unwrap()
    else {
        panic!("second end must not apply");
    };
    assert_eq!(first, second);
    assert_eq!(second.call.duration_seconds, Some(30));
    assert_eq!(
        store
            .end_call(&CallId::from("ghost"), None, "hangup", t0())
            .await
            .unwrap(),
        EndWrite::CallMissing
    );
}

#[tokio::test]
async fn history_is_filtered_and_paginated() {
    let (_dir, store) = seeded_store().await;
    for i in 0..5 {
        let id = ringing_call(&store, &format!("h{i}"), t0() + Duration::minutes(i)).await;
        if i % 2 == 0 {
            store
                .end_call(&id, Some("d1"), "hangup", t0() + Duration::minutes(i))
                .await
                .unwrap();
        }
    }

    let page = store
        .call_history(&HistoryQuery {
            building_id: "b1".into(),
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 5);
    assert_eq!(page.pagination.limit, 2);
    let ids: Vec<_> = page.calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["h3", "h2"]);

    let ended = store
        .call_history(&HistoryQuery {
            building_id: "b1".into(),
            status: Some(CallStatus::Ended),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ended.pagination.total, 3);
    assert_eq!(ended.pagination.limit, 50);

    let as_doorman = store
        .call_history(&HistoryQuery {
            building_id: "b1".into(),
            user_id: Some("d1".into()),
            user_type: Some("doorman".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(as_doorman.pagination.total, 5);

    let other_building = store
        .call_history(&HistoryQuery {
            building_id: "b2".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(other_building.calls.is_empty());
}

#[tokio::test]
async fn open_pending_and_stale_queries() {
    let (_dir, store) = seeded_store().await;
    let old = ringing_call(&store, "old", t0()).await;
    let fresh = ringing_call(&store, "fresh", t0() + Duration::minutes(5)).await;
    let answered = ringing_call(&store, "answered", t0() + Duration::minutes(6)).await;
    store.answer_call(&answered, "r1", t0()).await.unwrap();

    let open = store.open_calls("b1").await.unwrap();
    assert_eq!(open.len(), 3);
    assert_eq!(open[0].id, answered);

    let pending: Vec<_> = store
        .pending_calls_for("r2")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(pending, vec![fresh.clone(), old.clone()]);

    let stale = store
        .ringing_before(t0() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(stale, vec![old]);
}
