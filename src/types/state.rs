//! Shared flow state and the tagged event type that mutates it
//!
//! All mutation of `GatekeeperState` goes through `GateEvent` values
//! processed by the pure reducer in `core::gate` - no component writes
//! fields directly.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::Phase;

/// The three sequentially requested device permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Microphone,
    Motion,
    Location,
}

impl PermissionType {
    /// Request order during calibration
    pub fn sequence() -> [PermissionType; 3] {
        [
            PermissionType::Microphone,
            PermissionType::Motion,
            PermissionType::Location,
        ]
    }
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PermissionType::Microphone => "microphone",
            PermissionType::Motion => "motion",
            PermissionType::Location => "location",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Pending,
    Granted,
    Denied,
}

/// Final metrics of the simulated speed test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    /// Milliseconds
    pub latency: f64,
    /// Mbps
    pub download: f64,
    /// Mbps
    pub upload: f64,
}

/// Smoothed device orientation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GyroscopeAngles {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// Sub-state of RETURNING_CHECK
///
/// `Blocked` is a dead end: nothing auto-advances out of it, only a new
/// session leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturningCheckState {
    Checking,
    Blocked,
    /// Same-origin rejected devices reported; binary choice pending
    HonestyGate,
    /// Choice made once, stern confirmation step pending
    HonestyConfirm,
    Clean,
}

/// Sub-state of CALIBRATION
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    Intro,
    /// Index into `PermissionType::sequence()`
    Requesting(usize),
    Complete,
}

/// Sub-state of VOICE_INTERFACE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    Intro,
    Listening,
    Thinking,
    Complete,
}

/// Sub-state of ACCEPTANCE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStage {
    Reveal,
    Form,
    Farewell,
}

/// The shared flow state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatekeeperState {
    pub phase: Phase,
    pub permissions: HashMap<PermissionType, PermissionStatus>,
    pub speed_test_result: Option<SpeedTestResult>,
    pub audio_level: f32,
    pub gyroscope: GyroscopeAngles,
    pub user_name: String,
    pub user_phone: String,
    pub device_fingerprint: Option<String>,
}

impl Default for GatekeeperState {
    fn default() -> Self {
        let mut permissions = HashMap::new();
        for permission in PermissionType::sequence() {
            permissions.insert(permission, PermissionStatus::Pending);
        }
        Self {
            phase: Phase::DeviceCheck,
            permissions,
            speed_test_result: None,
            audio_level: 0.0,
            gyroscope: GyroscopeAngles::default(),
            user_name: String::new(),
            user_phone: String::new(),
            device_fingerprint: None,
        }
    }
}

impl GatekeeperState {
    pub fn permission(&self, permission: PermissionType) -> PermissionStatus {
        self.permissions
            .get(&permission)
            .copied()
            .unwrap_or(PermissionStatus::Pending)
    }

    /// True once every permission in the sequence is granted
    pub fn all_permissions_granted(&self) -> bool {
        PermissionType::sequence()
            .iter()
            .all(|p| self.permission(*p) == PermissionStatus::Granted)
    }
}

/// Fully-formed mutation events; one event = one atomic state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateEvent {
    SetPhase(Phase),
    SetPermission {
        permission: PermissionType,
        status: PermissionStatus,
    },
    SetSpeedResult(SpeedTestResult),
    SetAudioLevel(f32),
    SetGyroscope(GyroscopeAngles),
    SetUserData {
        name: String,
        phone: String,
    },
    SetFingerprint(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = GatekeeperState::default();
        assert_eq!(state.phase, Phase::DeviceCheck);
        assert_eq!(
            state.permission(PermissionType::Microphone),
            PermissionStatus::Pending
        );
        assert!(state.speed_test_result.is_none());
        assert!(state.device_fingerprint.is_none());
    }

    #[test]
    fn test_all_permissions_granted() {
        let mut state = GatekeeperState::default();
        assert!(!state.all_permissions_granted());

        for permission in PermissionType::sequence() {
            state.permissions.insert(permission, PermissionStatus::Granted);
        }
        assert!(state.all_permissions_granted());
    }

    #[test]
    fn test_one_denial_blocks_all_granted() {
        let mut state = GatekeeperState::default();
        state
            .permissions
            .insert(PermissionType::Microphone, PermissionStatus::Granted);
        state
            .permissions
            .insert(PermissionType::Motion, PermissionStatus::Denied);
        state
            .permissions
            .insert(PermissionType::Location, PermissionStatus::Granted);
        assert!(!state.all_permissions_granted());
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = GateEvent::SetPermission {
            permission: PermissionType::Motion,
            status: PermissionStatus::Denied,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("SET_PERMISSION"));
        let back: GateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
