//! Reason codes for flow decisions and phase changes

use serde::{Deserialize, Serialize};

/// Reason codes attached to every phase transition and gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum GateReason {
    // =========================================================================
    // R100: Device & identity checks
    // =========================================================================
    /// Mobile device confirmed, advancing past DEVICE_CHECK
    R101_DEVICE_CONFIRMED,
    /// Ledger rejection within the cooldown window
    R102_COOLDOWN_ACTIVE,
    /// Correlation check reported rejected devices from the same origin
    R103_HONESTY_GATE,
    /// No ledger record and no correlation hits
    R104_CLEAN_DEVICE,
    /// User deferred at the honesty gate
    R105_HONESTY_DEFERRED,
    /// User affirmed first contact at the honesty gate
    R106_HONESTY_AFFIRMED,

    // =========================================================================
    // R200: Calibration
    // =========================================================================
    /// A permission request resolved granted
    R201_PERMISSION_GRANTED,
    /// A permission request resolved denied - flow rejects immediately
    R202_PERMISSION_DENIED,
    /// All permissions granted, calibration complete
    R203_CALIBRATION_COMPLETE,

    // =========================================================================
    // R300: Timed advances
    // =========================================================================
    /// A per-phase timer elapsed and advanced the flow
    R301_TIMER_ELAPSED,
    /// Speed test finished and reported results
    R302_SPEED_TEST_COMPLETE,
    /// Voice cycles exhausted
    R303_VOICE_COMPLETE,
    /// Contact form submitted and validated
    R304_CONTACT_SUBMITTED,
}

impl GateReason {
    /// Code string for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::R101_DEVICE_CONFIRMED => "R101_DEVICE_CONFIRMED",
            Self::R102_COOLDOWN_ACTIVE => "R102_COOLDOWN_ACTIVE",
            Self::R103_HONESTY_GATE => "R103_HONESTY_GATE",
            Self::R104_CLEAN_DEVICE => "R104_CLEAN_DEVICE",
            Self::R105_HONESTY_DEFERRED => "R105_HONESTY_DEFERRED",
            Self::R106_HONESTY_AFFIRMED => "R106_HONESTY_AFFIRMED",
            Self::R201_PERMISSION_GRANTED => "R201_PERMISSION_GRANTED",
            Self::R202_PERMISSION_DENIED => "R202_PERMISSION_DENIED",
            Self::R203_CALIBRATION_COMPLETE => "R203_CALIBRATION_COMPLETE",
            Self::R301_TIMER_ELAPSED => "R301_TIMER_ELAPSED",
            Self::R302_SPEED_TEST_COMPLETE => "R302_SPEED_TEST_COMPLETE",
            Self::R303_VOICE_COMPLETE => "R303_VOICE_COMPLETE",
            Self::R304_CONTACT_SUBMITTED => "R304_CONTACT_SUBMITTED",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R101_DEVICE_CONFIRMED => "Device class confirmed",
            Self::R102_COOLDOWN_ACTIVE => "Rejection cooldown still active",
            Self::R103_HONESTY_GATE => "Same-origin rejections reported",
            Self::R104_CLEAN_DEVICE => "No prior record for this device",
            Self::R105_HONESTY_DEFERRED => "Visitor chose to return later",
            Self::R106_HONESTY_AFFIRMED => "Visitor affirmed first contact",
            Self::R201_PERMISSION_GRANTED => "Permission granted",
            Self::R202_PERMISSION_DENIED => "Permission denied",
            Self::R203_CALIBRATION_COMPLETE => "All channels granted",
            Self::R301_TIMER_ELAPSED => "Phase timer elapsed",
            Self::R302_SPEED_TEST_COMPLETE => "Speed test finished",
            Self::R303_VOICE_COMPLETE => "Voice cycles exhausted",
            Self::R304_CONTACT_SUBMITTED => "Contact form accepted",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
