// File: attack_integration_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

mod common;

use common::{coupon_request, Behavior, Event, MockConnection};
use h3race::attack::{AttackOrchestrator, AttackPlan, FailureStage};
use h3race::config::AttackConfig;
use h3race::error::RaceError;
use h3race::report::RaceReport;
use h3race::request::Request;
use std::time::Duration;

fn plan(count: usize, tail_bytes: usize, delay_ms: u64) -> AttackPlan {
    let requests = (0..count).map(|i| coupon_request(&i.to_string())).collect();
    AttackPlan::new(requests, tail_bytes, Duration::from_millis(delay_ms))
}

fn config() -> AttackConfig {
    let mut config = AttackConfig::new();
    config.set_read_timeout(Some(Duration::from_secs(2)));
    config
}

#[tokio::test]
async fn test_three_requests_released_together() {
    let connection = MockConnection::uniform(3, Behavior::Echo);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());
    let plan = plan(3, 1, 50);

    let outcome = orchestrator.run(&plan).await.unwrap();

    assert_eq!(outcome.responses.len(), 3);
    assert!(outcome.failures.is_empty());
    for (index, response) in &outcome.responses {
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.stream_id(), *index as u64 * 4);
        assert_eq!(response.body().buffered(), plan.requests()[*index].body());
    }

    // every head goes out before the first tail, and the pause sits between
    let mut heads = Vec::new();
    let mut tails = Vec::new();
    for stream_id in [0u64, 4, 8] {
        let writes = connection.writes_of(stream_id);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].1, 3);
        heads.push(writes[0].0);
        tails.push(writes[1].0);
    }
    let last_head = *heads.iter().max().unwrap();
    let first_tail = *tails.iter().min().unwrap();
    let last_tail = *tails.iter().max().unwrap();
    assert!(first_tail >= last_head + Duration::from_millis(50));
    assert!(last_tail.duration_since(first_tail) < Duration::from_millis(20));

    assert!(outcome.timings.sleep >= Duration::from_millis(50));
    assert!(outcome.timings.tail_spread < Duration::from_millis(20));
}

#[tokio::test]
async fn test_all_streams_closed_before_reading() {
    let connection = MockConnection::uniform(4, Behavior::Echo);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());

    orchestrator.run(&plan(4, 2, 5)).await.unwrap();

    let events = connection.events();
    let last_close = events
        .iter()
        .rposition(|e| matches!(e, Event::Close { .. }))
        .unwrap();
    let first_read = events
        .iter()
        .position(|e| matches!(e, Event::Read { .. }))
        .unwrap();
    let last_write = events
        .iter()
        .rposition(|e| matches!(e, Event::Write { .. }))
        .unwrap();
    assert!(last_write < last_close);
    assert!(last_close < first_read);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::Close { .. }))
            .count(),
        4
    );
}

#[tokio::test]
async fn test_concurrent_tails() {
    let connection = MockConnection::uniform(5, Behavior::Echo);
    let mut config = config();
    config.set_concurrent_tails(true);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config);

    let outcome = orchestrator.run(&plan(5, 4, 10)).await.unwrap();

    assert_eq!(outcome.responses.len(), 5);
    for stream_id in [0u64, 4, 8, 12, 16] {
        let writes = connection.writes_of(stream_id);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].1, 6);
    }
}

#[tokio::test]
async fn test_reset_stream_is_recorded() {
    let connection =
        MockConnection::new(vec![Behavior::Echo, Behavior::Reset, Behavior::Echo]);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());

    let outcome = orchestrator.run(&plan(3, 1, 10)).await.unwrap();

    assert_eq!(outcome.responses.len(), 2);
    assert!(outcome.responses.contains_key(&0));
    assert!(outcome.responses.contains_key(&2));
    let failure = &outcome.failures[&1];
    assert_eq!(failure.stage, FailureStage::Read);
    assert_eq!(failure.stream_id, Some(4));
    assert!(matches!(failure.error, RaceError::TruncatedFrame(_)));
}

#[tokio::test]
async fn test_refused_open_and_failed_tail() {
    let connection = MockConnection::new(vec![
        Behavior::RefuseOpen,
        Behavior::FailTail,
        Behavior::Status(409),
    ]);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());

    let outcome = orchestrator.run(&plan(3, 1, 10)).await.unwrap();

    assert_eq!(connection.opened(), 3);
    assert_eq!(outcome.total(), 3);
    assert_eq!(outcome.failures[&0].stage, FailureStage::Open);
    assert_eq!(outcome.failures[&0].stream_id, None);
    assert_eq!(outcome.failures[&1].stage, FailureStage::Tail);
    assert!(matches!(outcome.failures[&1].error, RaceError::Write(_)));
    assert_eq!(outcome.responses[&2].status().as_u16(), 409);
    assert_eq!(outcome.responses[&2].content_length(), Some(0));
}

#[tokio::test]
async fn test_invalid_plan_opens_nothing() {
    let connection = MockConnection::uniform(2, Behavior::Echo);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());
    let requests = vec![
        coupon_request("1"),
        Request::new("POST", "https://shop.example/api/redeem")
            .unwrap()
            .with_body(&b"x=1"[..]),
    ];
    let plan = AttackPlan::new(requests, 4, Duration::from_millis(10));

    let result = orchestrator.run(&plan).await;

    assert!(matches!(
        result,
        Err(RaceError::InvalidSplit {
            tail_bytes: 4,
            content_length: 3
        })
    ));
    assert_eq!(connection.opened(), 0);
    assert!(connection.events().is_empty());
}

#[tokio::test]
async fn test_read_timeout_on_silent_stream() {
    let connection = MockConnection::new(vec![Behavior::Echo, Behavior::Silent]);
    let mut config = config();
    config.set_read_timeout(Some(Duration::from_millis(100)));
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config);

    let outcome = orchestrator.run(&plan(2, 1, 5)).await.unwrap();

    assert_eq!(outcome.responses.len(), 1);
    let failure = &outcome.failures[&1];
    assert_eq!(failure.stage, FailureStage::Read);
    assert!(matches!(failure.error, RaceError::Timeout(d) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn test_baseline_sends_full_payloads() {
    let connection = MockConnection::uniform(2, Behavior::Echo);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());
    let plan = plan(2, 1, 500);

    let outcome = orchestrator.run_baseline(&plan).await.unwrap();

    assert_eq!(outcome.responses.len(), 2);
    assert!(outcome.timings.sleep < Duration::from_millis(500));
    for stream_id in [0u64, 4] {
        assert_eq!(connection.writes_of(stream_id).len(), 1);
    }
    assert_eq!(outcome.responses[&1].body().buffered(), b"coupon=001");
}

#[tokio::test]
async fn test_report_from_live_outcome() {
    let connection = MockConnection::new(vec![Behavior::Echo, Behavior::Echo, Behavior::Reset]);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());
    let requests = vec![coupon_request("7"), coupon_request("7"), coupon_request("8")];
    let plan = AttackPlan::new(requests, 1, Duration::from_millis(5));

    let outcome = orchestrator.run(&plan).await.unwrap();
    let report = RaceReport::from_outcome(&plan, &outcome, false);

    assert_eq!(report.mode, "race");
    assert_eq!(report.status_counts.get("200"), Some(&2));
    assert_eq!(report.status_counts.get("failed"), Some(&1));
    assert_eq!(report.distinct_bodies, 1);
    assert_eq!(report.entries[0].body_length, 10);
    assert_eq!(report.entries[0].body_sha256, report.entries[1].body_sha256);
}

#[tokio::test]
async fn test_truncated_body_keeps_status() {
    let connection = MockConnection::new(vec![Behavior::Echo, Behavior::ShortBody]);
    let orchestrator = AttackOrchestrator::new(connection.clone(), &config());
    let plan = plan(2, 1, 5);

    let outcome = orchestrator.run(&plan).await.unwrap();

    assert_eq!(outcome.responses.len(), 2);
    assert!(outcome.failures.is_empty());
    let short = &outcome.responses[&1];
    assert_eq!(short.status().as_u16(), 200);
    assert!(matches!(
        short.body_error(),
        Some(RaceError::ContentLengthMismatch {
            declared: 10,
            received: 0
        })
    ));
    assert!(outcome.responses[&0].body_error().is_none());

    let report = RaceReport::from_outcome(&plan, &outcome, false);
    assert_eq!(report.status_counts.get("200"), Some(&2));
    assert_eq!(report.status_counts.get("failed"), None);
    assert!(report.entries[1].body_error.is_some());
    assert!(report.entries[1].body_sha256.is_none());
    assert_eq!(report.distinct_bodies, 1);
}
