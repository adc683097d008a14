//! Per-tick visual output read by the rendering layer

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::types::Phase;

/// Continuously smoothed visual parameters
///
/// Written by exactly one component (the smoothing engine) once per
/// tick; everything else reads. No locking - reads and the write are
/// sequenced by the tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedVisualState {
    pub intensity: f32,
    pub pulse_speed: f32,
    pub fade: f32,
    pub scatter: f32,
    pub converge: f32,
    /// Breathing wave in [0,1], derived from elapsed time, never smoothed
    pub pulse: f32,
    /// Copied through from the audio analyzer, unsmoothed at this layer
    pub audio_level: f32,
}

impl Default for SmoothedVisualState {
    fn default() -> Self {
        // Resting values before the first tick: dim, slow, fully faded in
        Self {
            intensity: 0.0,
            pulse_speed: 0.2,
            fade: 1.0,
            scatter: 0.0,
            converge: 0.0,
            pulse: 0.0,
            audio_level: 0.0,
        }
    }
}

/// One tick's read-only snapshot, as served to rendering consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub visual: SmoothedVisualState,
    /// Per-node activation weights, parallel to the graph's node order
    pub node_weights: Vec<f32>,
}

impl TickSnapshot {
    pub fn new(phase: Phase, visual: SmoothedVisualState, node_weights: Vec<f32>) -> Self {
        Self {
            timestamp: Utc::now(),
            phase,
            visual,
            node_weights,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
