//! Gate engine: pure reducer over tagged events + stateful wrapper
//!
//! Every mutation of the shared flow state is a whole `GateEvent`
//! processed by `reduce` - a pure function, unit-testable without
//! timers or async machinery. `GateEngine` owns the live copy and logs
//! phase changes with their reason codes.

use tracing::info;

use crate::types::{GateEvent, GateReason, GatekeeperState, Phase};

/// Pure transition function: (state, event) -> new state
pub fn reduce(state: &GatekeeperState, event: &GateEvent) -> GatekeeperState {
    let mut next = state.clone();
    match event {
        GateEvent::SetPhase(phase) => {
            // Terminal phases never transition out
            if !state.phase.is_terminal() {
                next.phase = *phase;
            }
        }
        GateEvent::SetPermission { permission, status } => {
            next.permissions.insert(*permission, *status);
        }
        GateEvent::SetSpeedResult(result) => {
            next.speed_test_result = Some(*result);
        }
        GateEvent::SetAudioLevel(level) => {
            next.audio_level = *level;
        }
        GateEvent::SetGyroscope(angles) => {
            next.gyroscope = *angles;
        }
        GateEvent::SetUserData { name, phone } => {
            next.user_name = name.clone();
            next.user_phone = phone.clone();
        }
        GateEvent::SetFingerprint(fingerprint) => {
            next.device_fingerprint = Some(fingerprint.clone());
        }
    }
    next
}

/// Owns the live flow state and applies events in arrival order
#[derive(Debug, Default)]
pub struct GateEngine {
    state: GatekeeperState,
    event_count: u64,
}

impl GateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event
    pub fn apply(&mut self, event: GateEvent) {
        self.state = reduce(&self.state, &event);
        self.event_count += 1;
    }

    /// Apply a phase change, logging the reason
    pub fn transition(&mut self, phase: Phase, reason: GateReason) {
        let from = self.state.phase;
        self.apply(GateEvent::SetPhase(phase));
        if self.state.phase != from {
            info!(
                from = %from,
                to = %phase,
                reason = reason.code(),
                "Phase transition"
            );
        }
    }

    pub fn state(&self) -> &GatekeeperState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}

// =============================================================================
// TESTS
// =============================================================================
