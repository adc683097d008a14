//! Integration tests for the phased flow
//!
//! Runs the driver with compressed timings and checks:
//! - Clean devices auto-advance DEVICE_CHECK -> RETURNING_CHECK -> ENTRY
//!   within a bounded window
//! - Denial at each calibration step rejects immediately, issuing no
//!   further permission requests
//! - Blocked devices dead-end in RETURNING_CHECK
//! - No stray timers fire after a terminal outcome

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper::core::flow::PermissionProvider;
use gatekeeper::core::{
    FlowDriver, FlowOutcome, FlowTiming, IdentityLedger, MemoryStore, ScriptedPermissions,
    SpeedTestConfig,
};
use gatekeeper::types::{PermissionStatus, PermissionType, Phase};

fn ledger() -> IdentityLedger {
    IdentityLedger::new(Box::new(MemoryStore::new()))
}

fn fast_speed() -> SpeedTestConfig {
    SpeedTestConfig {
        latency_duration_ms: 5,
        download_duration_ms: 5,
        upload_duration_ms: 5,
        stagger_delay_ms: 2,
        final_hold_ms: 2,
        ..Default::default()
    }
}

fn fast_driver(fingerprint: &str) -> FlowDriver {
    FlowDriver::new(fingerprint, ledger())
        .with_timing(FlowTiming::compressed())
        .with_speed_config(fast_speed())
}

/// Counts requests so tests can assert nothing follows a denial
struct CountingProvider {
    requests: Arc<AtomicUsize>,
    deny_at: usize,
}

#[async_trait]
impl PermissionProvider for CountingProvider {
    async fn request(&self, _permission: PermissionType) -> bool {
        let index = self.requests.fetch_add(1, Ordering::SeqCst);
        index != self.deny_at
    }
}

#[tokio::test]
async fn test_clean_device_auto_advances_through_entry() {
    let driver = fast_driver("flow-clean");
    let engine = driver.engine();

    let observed = Arc::new(Mutex::new(vec![Phase::DeviceCheck]));
    let watcher = {
        let engine = Arc::clone(&engine);
        let observed = Arc::clone(&observed);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(2)).await;
                let phase = engine.lock().unwrap().phase();
                let mut seen = observed.lock().unwrap();
                if *seen.last().unwrap() != phase {
                    seen.push(phase);
                }
            }
        })
    };

    let handle = driver.handle();
    let task = tokio::spawn(driver.run());

    // Bounded window: compressed delays sum to well under a second
    tokio::time::sleep(Duration::from_millis(800)).await;
    handle.shutdown();
    let _ = task.await;
    watcher.abort();

    let seen = observed.lock().unwrap().clone();
    let position = |phase: Phase| seen.iter().position(|p| *p == phase);

    // All three early phases appear, in order, with no manual event
    let device = position(Phase::DeviceCheck).expect("DEVICE_CHECK observed");
    let returning = position(Phase::ReturningCheck).expect("RETURNING_CHECK observed");
    let entry = position(Phase::Entry).expect("ENTRY observed");
    assert!(device < returning && returning < entry);
}

#[tokio::test]
async fn test_denial_at_each_step_rejects_immediately() {
    for deny_at in 0..3 {
        let requests = Arc::new(AtomicUsize::new(0));
        let driver = fast_driver(&format!("flow-deny-{}", deny_at)).with_permissions(Arc::new(
            CountingProvider {
                requests: Arc::clone(&requests),
                deny_at,
            },
        ));
        let engine = driver.engine();

        let outcome = driver.run().await;
        assert_eq!(outcome, FlowOutcome::Rejected, "deny_at {}", deny_at);
        assert_eq!(engine.lock().unwrap().phase(), Phase::Rejection);

        // Exactly deny_at + 1 requests were issued, none after the denial
        assert_eq!(
            requests.load(Ordering::SeqCst),
            deny_at + 1,
            "no requests may follow the denial at step {}",
            deny_at
        );

        // Later permissions in the sequence are still pending
        let state = engine.lock().unwrap().state().clone();
        let sequence = PermissionType::sequence();
        for later in sequence.iter().skip(deny_at + 1) {
            assert_eq!(state.permission(*later), PermissionStatus::Pending);
        }
    }
}

#[tokio::test]
async fn test_no_stray_transitions_after_rejection() {
    let driver = fast_driver("flow-stray").with_permissions(Arc::new(
        ScriptedPermissions::granting_all().deny(PermissionType::Microphone),
    ));
    let engine = driver.engine();

    let outcome = driver.run().await;
    assert_eq!(outcome, FlowOutcome::Rejected);

    // Give any leaked timer ample room to fire, then confirm stillness
    let events_after = engine.lock().unwrap().event_count();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.lock().unwrap().event_count(), events_after);
    assert_eq!(engine.lock().unwrap().phase(), Phase::Rejection);
}

#[tokio::test]
async fn test_rejected_device_blocked_on_next_session() {
    use gatekeeper::core::identity::FileStore;

    let path = std::env::temp_dir().join(format!(
        "gatekeeper_flow_ledger_{}.json",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);

    // First session: denied microphone -> rejection lands in the ledger file
    {
        let ledger = IdentityLedger::new(Box::new(FileStore::new(&path)));
        let driver = FlowDriver::new("flow-return", ledger)
            .with_timing(FlowTiming::compressed())
            .with_speed_config(fast_speed())
            .with_permissions(Arc::new(
                ScriptedPermissions::granting_all().deny(PermissionType::Microphone),
            ));
        let outcome = driver.run().await;
        assert_eq!(outcome, FlowOutcome::Rejected);
    }

    // Second session over the same file: blocked dead end
    let driver = FlowDriver::new("flow-return", IdentityLedger::new(Box::new(FileStore::new(&path))))
        .with_timing(FlowTiming::compressed());
    let engine = driver.engine();
    let outcome = driver.run().await;

    assert_eq!(outcome, FlowOutcome::Blocked);
    assert_eq!(engine.lock().unwrap().phase(), Phase::ReturningCheck);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_speed_result_recorded_before_calibration() {
    let driver = fast_driver("flow-speed");
    let engine = driver.engine();
    let handle = driver.handle();
    let task = tokio::spawn(driver.run());

    for _ in 0..500 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if engine.lock().unwrap().phase() == Phase::Calibration {
            break;
        }
    }

    let state = engine.lock().unwrap().state().clone();
    assert_eq!(state.phase, Phase::Calibration);
    let result = state.speed_test_result.expect("speed result stored");
    assert!(result.latency >= 12.0 && result.latency <= 42.0);
    assert!(result.download >= 65.0 && result.download <= 220.0);
    assert!(result.upload >= 15.0 && result.upload <= 55.0);

    handle.shutdown();
    let _ = task.await;
}
