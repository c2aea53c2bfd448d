// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery, retry and ordering behavior of the dispatcher.

use std::time::Duration;

use botfleet_bus::{DomainEvent, EventKind};
use botfleet_core::types::recipient_key;
use botfleet_core::{
    BotId, ChatId, FleetError, JobId, JobStatus, OutboundJob, Payload, PayloadKind, StatusKind,
};
use botfleet_dispatch::dispatcher::route;
use botfleet_test_utils::{SendScript, TestHarness};
use chrono::Utc;

const WAIT: Duration = Duration::from_secs(5);

async fn online_harness() -> TestHarness {
    let h = TestHarness::start().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h
}

#[tokio::test]
async fn enqueue_to_unknown_bot_is_rejected() {
    let h = TestHarness::start().await.unwrap();
    let err = h
        .dispatcher
        .enqueue(OutboundJob::text("ghost", "42", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::UnknownBot { id } if id == "ghost"));
    assert!(h.mock_store.jobs().await.is_empty());
    h.shutdown().await;
}

#[tokio::test]
async fn empty_payload_or_chat_is_invalid() {
    let h = online_harness().await;
    let empty_text = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "  "))
        .await;
    assert!(matches!(empty_text, Err(FleetError::InvalidInput(_))));
    let empty_chat = h.dispatcher.enqueue(OutboundJob::text("alpha", "", "hi")).await;
    assert!(matches!(empty_chat, Err(FleetError::InvalidInput(_))));
    h.shutdown().await;
}

#[tokio::test]
async fn enqueue_persists_before_returning() {
    let h = TestHarness::start().await.unwrap();
    h.register("alpha", "1:ok").await.unwrap();
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();
    let job = h.dispatcher.get_job(id).await.unwrap();
    assert_eq!(job.payload.body, "hi");
    assert!(matches!(
        h.dispatcher.get_job(JobId(9_999)).await,
        Err(FleetError::JobNotFound { id: 9_999 })
    ));
    h.shutdown().await;
}

#[tokio::test]
async fn storage_failure_surfaces_to_caller() {
    let h = online_harness().await;
    h.mock_store.fail_writes(true);
    let err = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Storage { .. }));
    h.mock_store.fail_writes(false);
    h.shutdown().await;
}

#[tokio::test]
async fn message_is_delivered_and_announced() {
    let h = online_harness().await;
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hello"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 1);
    assert_eq!(h.transport.sent_texts("42"), ["hello"]);
    assert!(h.recorder.wait_for_count(EventKind::MessageSent, 1, WAIT).await);
    h.shutdown().await;
}

#[tokio::test]
async fn media_payload_keeps_caption() {
    let h = online_harness().await;
    let payload =
        Payload::media(PayloadKind::Photo, "https://example.com/cat.jpg").with_caption("cat");
    let id = h
        .dispatcher
        .enqueue(OutboundJob::new("alpha", "42", payload.clone()))
        .await
        .unwrap();
    h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(h.transport.sent()[0].payload, payload);
    h.shutdown().await;
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let h = online_harness().await;
    h.transport.script(
        "42",
        [
            SendScript::Transient("502 Bad Gateway".into()),
            SendScript::Transient("502 Bad Gateway".into()),
            SendScript::Ack,
        ],
    );
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 3);
    assert_eq!(h.transport.attempt_count("42"), 3);
    assert_eq!(h.recorder.count(EventKind::MessageFailed), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn exhausted_retries_fail_exactly_once() {
    let h = online_harness().await;
    h.transport.script(
        "42",
        std::iter::repeat_n(SendScript::Transient("timeout".into()), 5),
    );
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(h.transport.attempt_count("42"), 3);

    // Give a stray retry the chance to show up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.transport.attempt_count("42"), 3);
    let failed = h.recorder.of_kind(EventKind::MessageFailed);
    assert_eq!(failed.len(), 1);
    assert!(matches!(
        &failed[0],
        DomainEvent::MessageFailed { job_id, attempts: 3, .. } if *job_id == id
    ));
    h.shutdown().await;
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let h = online_harness().await;
    h.transport
        .script("42", [SendScript::Permanent("Forbidden: bot was blocked".into())]);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("blocked"));
    h.shutdown().await;
}

#[tokio::test]
async fn retry_hint_delays_the_next_attempt() {
    let h = online_harness().await;
    h.transport
        .script("42", [SendScript::RetryAfter(Duration::from_millis(400))]);
    let started = Utc::now();
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 2);
    assert!(job.updated_at - started >= chrono::Duration::milliseconds(400));
    h.shutdown().await;
}

#[tokio::test]
async fn slow_send_counts_as_transient() {
    let h = online_harness().await;
    h.transport
        .script("42", [SendScript::Delay(Duration::from_secs(3)), SendScript::Ack]);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert_eq!(job.attempts, 2);
    h.shutdown().await;
}

#[tokio::test]
async fn same_recipient_is_delivered_in_order() {
    let h = online_harness().await;
    h.transport.script(
        "42",
        [SendScript::Transient("flaky".into()), SendScript::Ack],
    );

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            h.dispatcher
                .enqueue(OutboundJob::text("alpha", "42", format!("m{i}")))
                .await
                .unwrap(),
        );
    }
    for id in ids {
        assert_eq!(
            h.wait_for_job(id, WAIT).await.unwrap().status,
            JobStatus::Sent
        );
    }
    assert_eq!(h.transport.sent_texts("42"), ["m0", "m1", "m2", "m3", "m4"]);
    h.shutdown().await;
}

#[tokio::test]
async fn a_failing_recipient_does_not_block_others() {
    let h = online_harness().await;
    h.transport
        .script("slow", std::iter::repeat_n(SendScript::Transient("x".into()), 3));
    let stuck = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "slow", "a"))
        .await
        .unwrap();
    let other = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "fast", "b"))
        .await
        .unwrap();

    let fast = h.wait_for_job(other, WAIT).await.unwrap();
    assert_eq!(fast.status, JobStatus::Sent);
    assert_eq!(
        h.wait_for_job(stuck, WAIT).await.unwrap().status,
        JobStatus::Failed
    );
    h.shutdown().await;
}

#[tokio::test]
async fn bulk_enqueue_reports_each_job() {
    let h = online_harness().await;
    let results = h
        .dispatcher
        .enqueue_bulk(vec![
            OutboundJob::text("alpha", "1", "a"),
            OutboundJob::text("ghost", "2", "b"),
            OutboundJob::text("alpha", "3", "c"),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(FleetError::UnknownBot { .. })));
    let last = *results[2].as_ref().unwrap();
    assert_eq!(
        h.wait_for_job(last, WAIT).await.unwrap().status,
        JobStatus::Sent
    );
    h.shutdown().await;
}

#[tokio::test]
async fn scheduled_job_waits_for_its_time() {
    let h = online_harness().await;
    let at = Utc::now() + chrono::Duration::milliseconds(300);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "later").scheduled_at(at))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.transport.attempt_count("42"), 0);
    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Sent);
    assert!(job.updated_at >= at);
    h.shutdown().await;
}

#[tokio::test]
async fn offline_bot_jobs_fail_after_retries() {
    let h = TestHarness::start().await.unwrap();
    h.register("alpha", "1:ok").await.unwrap();
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.unwrap().contains("no live session"));
    h.shutdown().await;
}

#[tokio::test]
async fn delivery_failures_leave_bot_status_alone() {
    let h = online_harness().await;
    h.transport
        .script("42", [SendScript::Permanent("chat not found".into())]);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "hi"))
        .await
        .unwrap();
    h.wait_for_job(id, WAIT).await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, Duration::ZERO).await);
    h.shutdown().await;
}

#[tokio::test]
async fn sqlite_backed_queue_delivers() {
    let h = TestHarness::builder().with_sqlite().build().await.unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);
    h.transport
        .script("42", [SendScript::Transient("502".into()), SendScript::Ack]);

    let first = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "one"))
        .await
        .unwrap();
    let second = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "two"))
        .await
        .unwrap();
    assert_eq!(
        h.wait_for_job(second, WAIT).await.unwrap().status,
        JobStatus::Sent
    );
    assert_eq!(h.dispatcher.get_job(first).await.unwrap().attempts, 2);
    assert_eq!(h.transport.sent_texts("42"), ["one", "two"]);
    h.shutdown().await;
}

async fn wait_for_attempts(h: &TestHarness, chat: &str, n: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while h.transport.attempt_count(chat) < n {
        assert!(tokio::time::Instant::now() < deadline, "no attempt on {chat}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn outcome_is_announced_only_after_it_is_stored() {
    let h = online_harness().await;
    h.transport
        .script("42", [SendScript::Delay(Duration::from_millis(400))]);
    let first = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "first"))
        .await
        .unwrap();
    wait_for_attempts(&h, "42", 1).await;

    h.mock_store.fail_writes(true);
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(h.transport.sent_texts("42"), ["first"]);
    assert_eq!(h.recorder.count(EventKind::MessageSent), 0);

    h.mock_store.fail_writes(false);
    let second = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "second"))
        .await
        .unwrap();

    let first = h.wait_for_job(first, WAIT).await.unwrap();
    assert_eq!(first.status, JobStatus::Sent);
    assert_eq!(first.attempts, 1);
    assert_eq!(
        h.wait_for_job(second, WAIT).await.unwrap().status,
        JobStatus::Sent
    );
    assert_eq!(h.transport.sent_texts("42"), ["first", "second"]);
    assert!(h.recorder.wait_for_count(EventKind::MessageSent, 2, WAIT).await);
    h.shutdown().await;
}

#[tokio::test]
async fn queued_job_fails_once_its_bot_is_deregistered() {
    let h = online_harness().await;
    let at = Utc::now() + chrono::Duration::milliseconds(1_500);
    let id = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", "42", "orphan").scheduled_at(at))
        .await
        .unwrap();
    h.registry.deregister(&BotId::from("alpha")).await.unwrap();

    let job = h.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("unknown bot"));
    assert_eq!(h.transport.attempt_count("42"), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let failed = h.recorder.of_kind(EventKind::MessageFailed);
    assert_eq!(failed.len(), 1);
    assert!(matches!(&failed[0], DomainEvent::MessageFailed { job_id, .. } if *job_id == id));
    h.shutdown().await;
}

#[tokio::test]
async fn full_worker_queue_does_not_hold_up_other_workers() {
    let h = TestHarness::builder()
        .with_workers(2)
        .with_batch_size(2)
        .build()
        .await
        .unwrap();
    h.add_bot("alpha", "1:ok").await.unwrap();
    assert!(h.wait_for_status("alpha", StatusKind::Online, WAIT).await);

    let bot = BotId::from("alpha");
    let worker_of = |chat: &str| route(&recipient_key(&bot, &ChatId::from(chat)), 2);
    let chats: Vec<String> = (0..100).map(|i| format!("c{i}")).collect();
    let busy = worker_of(chats[0].as_str());
    let same: Vec<&str> = chats
        .iter()
        .filter(|c| worker_of(c.as_str()) == busy)
        .map(String::as_str)
        .take(4)
        .collect();
    let other = chats
        .iter()
        .find(|c| worker_of(c.as_str()) != busy)
        .map(String::as_str)
        .unwrap();

    h.transport
        .script(same[0], [SendScript::Delay(Duration::from_millis(800))]);
    let slow = h
        .dispatcher
        .enqueue(OutboundJob::text("alpha", same[0], "slow"))
        .await
        .unwrap();
    wait_for_attempts(&h, same[0], 1).await;

    // Two fill the busy worker's queue; the third has nowhere to go.
    let mut jobs: Vec<OutboundJob> = same[1..]
        .iter()
        .map(|chat| OutboundJob::text("alpha", *chat, "queued"))
        .collect();
    jobs.push(OutboundJob::text("alpha", other, "quick"));
    let ids: Vec<JobId> = h
        .dispatcher
        .enqueue_bulk(jobs)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let quick = h
        .wait_for_job(ids[3], Duration::from_millis(400))
        .await
        .expect("other worker's job should not wait for the busy worker");
    assert_eq!(quick.status, JobStatus::Sent);
    assert_eq!(
        h.dispatcher.get_job(slow).await.unwrap().status,
        JobStatus::Processing
    );

    for id in ids.into_iter().chain([slow]) {
        assert_eq!(
            h.wait_for_job(id, WAIT).await.unwrap().status,
            JobStatus::Sent
        );
    }
    h.shutdown().await;
}
