//! The periodic monitoring loop: cancellation, resilience, and startup failures.

mod common;

use chrono::Utc;
use cloudsecmonitor::config::CloudSecConfig;
use cloudsecmonitor::monitor::{run_monitor_loop, MonitorState};
use common::{Harness, SCENARIO_A_OFFSETS};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn cancel_interrupts_sleep() {
    let h = Harness::new();
    h.ssh_failures("203.45.12.88", Utc::now(), &SCENARIO_A_OFFSETS);
    let monitor = Arc::new(h.monitor());
    let mut state = monitor.subscribe();
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(run_monitor_loop(monitor.clone(), Duration::from_secs(3600), shutdown.clone()));

    state.wait_for(|s| *s == MonitorState::Cycling).await.unwrap();
    // Give the first cycle time to finish before cancelling.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    let cycles = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop promptly")
        .unwrap();
    assert_eq!(cycles, 1);
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert_eq!(h.incident_count(), 1);
}

#[tokio::test]
async fn cancelled_before_start_runs_no_cycle() {
    let h = Harness::new();
    let monitor = Arc::new(h.monitor());
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let cycles = run_monitor_loop(monitor.clone(), Duration::from_millis(10), shutdown).await;
    assert_eq!(cycles, 0);
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[tokio::test]
async fn failing_store_does_not_stop_the_loop() {
    let h = Harness::new();
    h.flaky.fail_all_queries.store(true, Ordering::SeqCst);
    let monitor = Arc::new(h.monitor());
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(run_monitor_loop(monitor, Duration::from_millis(20), shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    let cycles = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(cycles >= 2, "only {} cycle(s) ran", cycles);
    assert_eq!(h.incident_count(), 0);
}

#[tokio::test]
async fn unreachable_store_fails_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    let mut config = CloudSecConfig::default();
    config.storage.path = blocker.join("cloudsec.db").display().to_string();

    let result = cloudsecmonitor::run_monitor(&config, CancellationToken::new()).await;
    assert!(result.is_err());
}
