// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-fleet scenarios: registry, monitor, dispatcher and bus together.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use botfleet_bus::{DomainEvent, EventKind};
use botfleet_core::{BotId, BoxError, FleetError, JobStatus, OutboundJob, StatusKind};
use botfleet_journal::{BotStats, LogJournal, LogLevel};
use botfleet_test_utils::{SendScript, TestHarness};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn enabled_bot_converges_to_online_and_back() {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    assert!(h.transport.is_live("alpha"));

    h.set_enabled("alpha", false).await.unwrap();
    h.monitor.reconcile_now();
    assert!(h.wait_for_status("alpha", StatusKind::Offline, WAIT).await);
    assert!(!h.transport.is_live("alpha"));
    assert_eq!(h.transport.live_count(), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn deregister_missing_or_twice_is_not_found() {
    let h = TestHarness::start().await.unwrap();
    let ghost = h.registry.deregister(&BotId::from("ghost")).await;
    assert!(matches!(ghost, Err(FleetError::NotFound { .. })));

    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h.registry.deregister(&BotId::from("alpha")).await.unwrap();
    assert!(!h.transport.is_live("alpha"));
    let again = h.registry.deregister(&BotId::from("alpha")).await;
    assert!(matches!(again, Err(FleetError::NotFound { .. })));
    h.shutdown().await;
}

#[tokio::test]
async fn alpha_delivers_to_chat_123() {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);

    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "123", "hello"))
        .await
        .unwrap();
    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);

    let sent = h.recorder.of_kind(EventKind::MessageSent);
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        DomainEvent::MessageSent {
            job_id,
            bot_id,
            chat_id,
            ..
        } => {
            assert_eq!(*job_id, id);
            assert_eq!(bot_id.as_str(), "alpha");
            assert_eq!(chat_id.as_str(), "123");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.transport.sent_texts("123"), vec!["hello".to_string()]);
    h.shutdown().await;
}

#[tokio::test]
async fn transient_failures_then_success_announce_once() {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h.transport.script(
        "7",
        [
            SendScript::Transient("timeout".into()),
            SendScript::Transient("502".into()),
            SendScript::Ack,
        ],
    );

    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "7", "eventually"))
        .await
        .unwrap();
    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 3);
    assert_eq!(h.recorder.count(EventKind::MessageSent), 1);
    assert_eq!(h.recorder.count(EventKind::MessageFailed), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn exhausted_retries_fail_exactly_once() {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h.transport.script(
        "7",
        (0..5).map(|_| SendScript::Transient("503".into())),
    );

    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "7", "never"))
        .await
        .unwrap();
    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.unwrap().contains("503"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.recorder.count(EventKind::MessageFailed), 1);
    assert_eq!(h.transport.attempt_count("7"), 3);
    assert_eq!(h.registry.status(&BotId::from("alpha")).unwrap().kind, StatusKind::Online);
    h.shutdown().await;
}

#[tokio::test]
async fn later_job_waits_for_earlier_one_to_the_same_chat() {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h.transport.script(
        "42",
        [
            SendScript::Transient("flaky".into()),
            SendScript::Transient("flaky".into()),
            SendScript::Ack,
        ],
    );

    let results = h
        .dispatcher
        .enqueue_bulk(vec![
            OutboundJob::text("alpha", "42", "first"),
            OutboundJob::text("alpha", "42", "second"),
        ])
        .await;
    let second = *results[1].as_ref().unwrap();
    assert_eq!(
        h.wait_for_job(second, WAIT).await.unwrap().status,
        JobStatus::Sent
    );

    assert_eq!(
        h.transport.attempt_texts("42"),
        vec!["first", "first", "first", "second"]
    );
    assert_eq!(h.transport.sent_texts("42"), vec!["first", "second"]);
    h.shutdown().await;
}

#[tokio::test]
async fn bulk_enqueue_keeps_good_jobs_beside_a_bad_one() {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);

    let results = h
        .dispatcher
        .enqueue_bulk(vec![
            OutboundJob::text("alpha", "1", "one"),
            OutboundJob::text("nobody", "2", "two"),
            OutboundJob::text("alpha", "3", "three"),
        ])
        .await;
    assert_eq!(results.len(), 3);
    assert!(matches!(results[1], Err(FleetError::UnknownBot { .. })));
    for result in [&results[0], &results[2]] {
        let id = *result.as_ref().unwrap();
        assert!(h.dispatcher.get_job(id).await.is_ok());
        assert_eq!(
            h.wait_for_job(id, WAIT).await.unwrap().status,
            JobStatus::Sent
        );
    }
    h.shutdown().await;
}

#[tokio::test]
async fn failing_handlers_do_not_starve_later_ones() {
    let h = TestHarness::start().await.unwrap();
    h.bus
        .subscribe(EventKind::MessageSent, |_: &DomainEvent| -> Result<(), BoxError> {
            panic!("handler blew up")
        });
    h.bus
        .subscribe(EventKind::MessageSent, |_: &DomainEvent| -> Result<(), BoxError> {
            Err("handler refused".into())
        });
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    h.bus.subscribe(
        EventKind::MessageSent,
        move |_: &DomainEvent| -> Result<(), BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );

    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "9", "ping"))
        .await
        .unwrap();
    assert_eq!(
        h.wait_for_job(id, WAIT).await.unwrap().status,
        JobStatus::Sent
    );
    assert!(
        h.recorder
            .wait_for_count(EventKind::MessageSent, 1, WAIT)
            .await
    );
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    h.shutdown().await;
}

#[tokio::test]
async fn journal_and_stats_follow_the_fleet() {
    let h = TestHarness::start().await.unwrap();
    let journal = Arc::new(LogJournal::with_capacity(100));
    journal.attach(&h.bus);
    let stats = Arc::new(BotStats::new());
    stats.attach(&h.bus);

    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h.transport.script("5", [SendScript::Permanent("chat not found".into())]);
    let ok = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "4", "hi"))
        .await
        .unwrap();
    let bad = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "5", "hi"))
        .await
        .unwrap();
    h.wait_for_job(ok, WAIT).await.unwrap();
    h.wait_for_job(bad, WAIT).await.unwrap();
    assert!(h.transport.inject_inbound("alpha", "4", "thanks"));
    assert!(
        h.recorder
            .wait_for_count(EventKind::MessageReceived, 1, WAIT)
            .await
    );

    let counters = stats.get(&BotId::from("alpha"));
    assert_eq!(counters.sent, 1);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.received, 1);
    assert!(counters.status_changes >= 1);
    assert!(counters.last_activity.is_some());

    let entries = journal.entries();
    assert!(entries.iter().any(|e| e.level == LogLevel::Error));
    assert!(
        entries
            .iter()
            .all(|e| e.source.as_deref() == Some("alpha"))
    );
    h.shutdown().await;
}

#[tokio::test]
async fn sqlite_backed_fleet_delivers() {
    let h = TestHarness::builder().with_sqlite().build().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "123", "persisted"))
        .await
        .unwrap();
    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 1);
    h.shutdown().await;
}
