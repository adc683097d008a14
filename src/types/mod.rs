//! Core types for the gatekeeper engine

mod constellation;
mod identity;
mod phase;
mod reason;
mod state;
mod visual;

pub use constellation::{ConfigError, ConstellationConfig, ConstellationGraph, Edge, Node};
pub use identity::{CorrelationReport, DeviceRecord, DeviceSignals};
pub use phase::{Phase, PhaseTargets};
pub use reason::GateReason;
pub use state::{
    AcceptanceStage, CalibrationStage, GateEvent, GatekeeperState, GyroscopeAngles,
    PermissionStatus, PermissionType, ReturningCheckState, SpeedTestResult, VoiceState,
};
pub use visual::{SmoothedVisualState, TickSnapshot};
