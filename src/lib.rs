//! Gatekeeper: constellation gate engine
//!
//! A staged onboarding flow rendered over a seeded 3D constellation.
//! Pipeline: seeded RNG -> constellation graph -> phase targets ->
//! smoothing engine -> read-only per-tick snapshot for the renderer.

pub mod core;
pub mod types;

// =============================================================================
// SMOOTHING RATES
// =============================================================================

/// Per-tick exponential smoothing rate for phase-driven visual values
pub const LERP_SPEED: f32 = 0.03;

/// Scatter interpolates 1.5x faster so "blow apart" reads as abrupt
pub const SCATTER_LERP_MULT: f32 = 1.5;

/// Breathing wave frequency (cycles per second), runs in every phase
pub const BREATHING_SPEED: f32 = 0.3;

/// Breathing wave amplitude consumed by the renderer
pub const BREATHING_AMPLITUDE: f32 = 0.15;

// =============================================================================
// PROBE & NODE ACTIVATION
// =============================================================================

/// Angular speed of the orbiting speed-test probe
pub const PROBE_SPEED: f32 = 1.2;

/// Activation falls off linearly to zero at this distance from the probe
pub const PROBE_FALLOFF_RADIUS: f32 = 3.0;

/// Node activation rate while tracking the probe (fast convergence)
pub const PROBE_ACTIVATION_RATE: f32 = 0.1;

/// Node activation rate while audio-reactive in the voice phase
pub const VOICE_ACTIVATION_RATE: f32 = 0.15;

/// Node activation rate during acceptance (slow swell)
pub const ACCEPT_ACTIVATION_RATE: f32 = 0.02;

/// Uniform activation target during acceptance
pub const ACCEPT_ACTIVATION_TARGET: f32 = 0.8;

/// Node activation decay rate in all other phases
pub const DECAY_ACTIVATION_RATE: f32 = 0.05;

// =============================================================================
// IDENTITY
// =============================================================================

/// Cooldown after a rejection before the same device may re-enter (~6 months)
pub const REJECTION_COOLDOWN_MS: i64 = 6 * 30 * 24 * 60 * 60 * 1000;

/// Filename of the serialized fingerprint -> record map
pub const LEDGER_STORAGE_KEY: &str = "gatekeeper_identity.json";

// =============================================================================
// PERMISSIONS
// =============================================================================

/// Location requests that have not resolved by this deadline count as denied
pub const LOCATION_TIMEOUT_MS: u64 = 10_000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
