//! Flow phases and per-phase visual targets

use serde::{Deserialize, Serialize};

/// The eight phases of the gate flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Initial state, confirming the device class
    DeviceCheck,
    /// Ledger lookup: blocked / honesty gate / clean
    ReturningCheck,
    /// First text reveal, auto-advances
    Entry,
    /// Simulated connection measurement
    SpeedTest,
    /// Sequential permission requests
    Calibration,
    /// Timer-driven listening/thinking cycles
    VoiceInterface,
    /// Terminal: flow failed (denial or deferred honesty gate)
    Rejection,
    /// Terminal: flow succeeded, contact collection
    Acceptance,
}

impl Phase {
    /// Phases that never transition out
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Rejection | Phase::Acceptance)
    }

    /// Steady-state visual parameters for this phase
    pub fn targets(&self) -> PhaseTargets {
        match self {
            Phase::DeviceCheck => PhaseTargets::new(0.0, 0.2, 1.0, 0.0, 0.0),
            Phase::ReturningCheck => PhaseTargets::new(0.15, 0.2, 1.0, 0.0, 0.0),
            Phase::Entry => PhaseTargets::new(0.3, 0.3, 1.0, 0.0, 0.0),
            Phase::SpeedTest => PhaseTargets::new(0.8, 0.8, 1.0, 0.0, 0.0),
            Phase::Calibration => PhaseTargets::new(0.6, 0.4, 1.0, 0.0, 0.0),
            Phase::VoiceInterface => PhaseTargets::new(1.0, 0.5, 1.0, 0.0, 0.0),
            // Go dark and blow apart
            Phase::Rejection => PhaseTargets::new(0.0, 0.0, 0.0, 1.0, 0.0),
            // Brighten and collapse to center
            Phase::Acceptance => PhaseTargets::new(1.5, 1.0, 1.0, 0.0, 1.0),
        }
    }

    /// All phases in flow order
    pub fn all() -> [Phase; 8] {
        [
            Phase::DeviceCheck,
            Phase::ReturningCheck,
            Phase::Entry,
            Phase::SpeedTest,
            Phase::Calibration,
            Phase::VoiceInterface,
            Phase::Rejection,
            Phase::Acceptance,
        ]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::DeviceCheck => "DEVICE_CHECK",
            Phase::ReturningCheck => "RETURNING_CHECK",
            Phase::Entry => "ENTRY",
            Phase::SpeedTest => "SPEED_TEST",
            Phase::Calibration => "CALIBRATION",
            Phase::VoiceInterface => "VOICE_INTERFACE",
            Phase::Rejection => "REJECTION",
            Phase::Acceptance => "ACCEPTANCE",
        };
        write!(f, "{}", name)
    }
}

/// Target visual parameters for one phase
///
/// The smoothing engine interpolates the live visual state toward these
/// each tick; they are never applied directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTargets {
    /// Overall brightness, 0.0 - 1.5
    pub intensity: f32,
    /// Edge pulse rate, 0.0 - 1.0
    pub pulse_speed: f32,
    /// Global opacity, 0.0 - 1.0
    pub fade: f32,
    /// Outward explosion amount, 0.0 - 1.0
    pub scatter: f32,
    /// Collapse-to-center amount, 0.0 - 1.0
    pub converge: f32,
}

impl PhaseTargets {
    pub fn new(intensity: f32, pulse_speed: f32, fade: f32, scatter: f32, converge: f32) -> Self {
        Self {
            intensity,
            pulse_speed,
            fade,
            scatter,
            converge,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Rejection.is_terminal());
        assert!(Phase::Acceptance.is_terminal());
        assert!(!Phase::DeviceCheck.is_terminal());
        assert!(!Phase::VoiceInterface.is_terminal());
    }

    #[test]
    fn test_every_phase_has_targets() {
        for phase in Phase::all() {
            let t = phase.targets();
            assert!((0.0..=1.5).contains(&t.intensity), "{} intensity", phase);
            assert!((0.0..=1.0).contains(&t.pulse_speed));
            assert!((0.0..=1.0).contains(&t.fade));
            assert!((0.0..=1.0).contains(&t.scatter));
            assert!((0.0..=1.0).contains(&t.converge));
        }
    }

    #[test]
    fn test_rejection_goes_dark_and_scatters() {
        let t = Phase::Rejection.targets();
        assert_eq!(t.intensity, 0.0);
        assert_eq!(t.fade, 0.0);
        assert_eq!(t.scatter, 1.0);
    }

    #[test]
    fn test_acceptance_brightens_and_converges() {
        let t = Phase::Acceptance.targets();
        assert_eq!(t.intensity, 1.5);
        assert_eq!(t.converge, 1.0);
    }

    #[test]
    fn test_serde_screaming_snake() {
        let json = serde_json::to_string(&Phase::SpeedTest).unwrap();
        assert_eq!(json, "\"SPEED_TEST\"");
        let back: Phase = serde_json::from_str("\"VOICE_INTERFACE\"").unwrap();
        assert_eq!(back, Phase::VoiceInterface);
    }
}
