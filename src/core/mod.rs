//! Core engine modules

pub mod analyzer;
pub mod api;
pub mod constellation;
pub mod contact;
pub mod flow;
pub mod gate;
pub mod identity;
pub mod rng;
pub mod smoothing;
pub mod speedtest;

pub use analyzer::{analyze_bins, AudioAnalysis, AudioAnalyzer, OrientationTracker};
pub use api::{create_router, create_router_with_timing, run_server};
pub use constellation::generate_constellation;
pub use contact::{format_phone, validate_contact, ContactError};
pub use flow::{
    AutoGrant, ChannelPermissions, FlowDriver, FlowHandle, FlowOutcome, FlowTiming,
    PermissionProvider, PermissionReporter, ScriptedPermissions, SubStates, VoiceMachine,
    VoiceSignal,
};
pub use gate::{reduce, GateEngine};
pub use identity::{
    derive_fingerprint, CorrelationCheck, FileStore, IdentityLedger, LedgerStore, MemoryStore,
    NullCorrelationCheck, StaticCorrelationCheck,
};
pub use rng::Mulberry32;
pub use smoothing::SmoothingEngine;
pub use speedtest::{SpeedTest, SpeedTestConfig, SpeedTestSample, SpeedTestStage};
