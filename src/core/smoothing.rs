//! Smoothing engine: the single writer of per-tick visual state
//!
//! Runs once per animation tick. Interpolates the live visual values
//! toward the current phase's targets, derives the breathing wave from
//! elapsed time, orbits the speed-test probe, and smooths per-node
//! activation weights. Everything it owns is exposed read-only.

use std::sync::Arc;

use crate::types::{ConstellationGraph, Phase, SmoothedVisualState, TickSnapshot};
use crate::{
    ACCEPT_ACTIVATION_RATE, ACCEPT_ACTIVATION_TARGET, BREATHING_SPEED, DECAY_ACTIVATION_RATE,
    LERP_SPEED, PROBE_ACTIVATION_RATE, PROBE_FALLOFF_RADIUS, PROBE_SPEED, SCATTER_LERP_MULT,
    VOICE_ACTIVATION_RATE,
};

/// Exponential step toward a target
#[inline]
pub fn lerp(current: f32, target: f32, rate: f32) -> f32 {
    current + (target - current) * rate
}

/// Per-tick interpolator over the immutable constellation
#[derive(Debug)]
pub struct SmoothingEngine {
    graph: Arc<ConstellationGraph>,
    visual: SmoothedVisualState,
    weights: Vec<f32>,
    probe: [f32; 3],
    probe_active: bool,
    tick_count: u64,
}

impl SmoothingEngine {
    pub fn new(graph: Arc<ConstellationGraph>) -> Self {
        let weights = vec![0.0; graph.node_count()];
        Self {
            graph,
            visual: SmoothedVisualState::default(),
            weights,
            probe: [-5.0, 0.0, 0.0],
            probe_active: false,
            tick_count: 0,
        }
    }

    /// Advance one tick
    ///
    /// `elapsed` is seconds since startup, read once per tick by the
    /// caller; `audio_level` is the analyzer's current normalized level.
    pub fn tick(&mut self, phase: Phase, elapsed: f32, audio_level: f32) {
        let targets = phase.targets();
        let v = &mut self.visual;

        v.intensity = lerp(v.intensity, targets.intensity, LERP_SPEED);
        v.pulse_speed = lerp(v.pulse_speed, targets.pulse_speed, LERP_SPEED);
        v.fade = lerp(v.fade, targets.fade, LERP_SPEED);
        // Scatter snaps harder than the slow fade/converge drifts
        v.scatter = lerp(v.scatter, targets.scatter, LERP_SPEED * SCATTER_LERP_MULT);
        v.converge = lerp(v.converge, targets.converge, LERP_SPEED);

        // Continuous breathing, independent of phase
        v.pulse = (elapsed * BREATHING_SPEED * std::f32::consts::TAU).sin() * 0.5 + 0.5;

        // Pass-through; consumers smooth downstream if they want to
        v.audio_level = audio_level;

        self.update_probe(phase, elapsed);
        self.update_weights(phase, audio_level);
        self.tick_count += 1;
    }

    /// Orbit the synthetic probe during the speed test
    fn update_probe(&mut self, phase: Phase, elapsed: f32) {
        if phase == Phase::SpeedTest {
            self.probe_active = true;
            self.probe = [
                (elapsed * PROBE_SPEED).sin() * 4.0,
                (elapsed * PROBE_SPEED * 0.7).cos() * 3.0,
                (elapsed * PROBE_SPEED * 0.5).sin() * 3.0,
            ];
        } else {
            self.probe_active = false;
        }
    }

    /// Smooth each node's activation toward its phase-dependent target
    fn update_weights(&mut self, phase: Phase, audio_level: f32) {
        for (i, node) in self.graph.nodes.iter().enumerate() {
            let (target, rate) = if self.probe_active {
                let dx = node.position[0] - self.probe[0];
                let dy = node.position[1] - self.probe[1];
                let dz = node.position[2] - self.probe[2];
                let dist = (dx * dx + dy * dy + dz * dz).sqrt();
                let activation = (1.0 - dist / PROBE_FALLOFF_RADIUS).max(0.0);
                (activation, PROBE_ACTIVATION_RATE)
            } else if phase == Phase::VoiceInterface {
                // Hubs glow harder for the same voice level
                let activation = audio_level * (0.3 + node.hierarchy * 0.7);
                (activation, VOICE_ACTIVATION_RATE)
            } else if phase == Phase::Acceptance {
                (ACCEPT_ACTIVATION_TARGET, ACCEPT_ACTIVATION_RATE)
            } else {
                (0.0, DECAY_ACTIVATION_RATE)
            };
            self.weights[i] = lerp(self.weights[i], target, rate);
        }
    }

    pub fn visual(&self) -> &SmoothedVisualState {
        &self.visual
    }

    pub fn node_weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn graph(&self) -> &ConstellationGraph {
        &self.graph
    }

    /// Probe position, meaningful only during SPEED_TEST
    pub fn probe_position(&self) -> [f32; 3] {
        self.probe
    }

    pub fn probe_active(&self) -> bool {
        self.probe_active
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Read-only snapshot for rendering consumers
    pub fn snapshot(&self, phase: Phase) -> TickSnapshot {
        TickSnapshot::new(phase, self.visual, self.weights.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================
