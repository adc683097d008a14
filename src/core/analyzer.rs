//! External signal analyzers: audio level and device orientation
//!
//! Both follow the same degrade-to-inert rule: no microphone frame
//! means zero output, no orientation events means a slow synthetic
//! orbit so the visual never goes static.

use crate::types::GyroscopeAngles;

/// Bass band: first 10 frequency bins (~0-860 Hz at fftSize 256)
const BASS_BINS: usize = 10;
/// Treble band starts at bin 50 (~4.3 kHz)
const TREBLE_START: usize = 50;

/// Normalized audio levels for one analyzer frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioAnalysis {
    /// RMS over all bins, 0-1
    pub level: f32,
    /// Mean of the bass band, 0-1
    pub bass: f32,
    /// Mean of the treble band, 0-1
    pub treble: f32,
}

/// Analyze one frame of byte frequency data
pub fn analyze_bins(bins: &[u8]) -> AudioAnalysis {
    if bins.is_empty() {
        return AudioAnalysis::default();
    }

    let sum_squares: f64 = bins.iter().map(|&b| (b as f64) * (b as f64)).sum();
    let level = ((sum_squares / bins.len() as f64).sqrt() / 255.0) as f32;

    let bass_bins = BASS_BINS.min(bins.len());
    let bass_sum: u32 = bins[..bass_bins].iter().map(|&b| b as u32).sum();
    let bass = bass_sum as f32 / (bass_bins as f32 * 255.0);

    let treble_start = TREBLE_START.min(bins.len());
    let treble_bins = bins.len() - treble_start;
    let treble = if treble_bins > 0 {
        let treble_sum: u32 = bins[treble_start..].iter().map(|&b| b as u32).sum();
        treble_sum as f32 / (treble_bins as f32 * 255.0)
    } else {
        0.0
    };

    AudioAnalysis { level, bass, treble }
}

/// Holds the latest analysis; inert without input
#[derive(Debug, Default)]
pub struct AudioAnalyzer {
    last: AudioAnalysis,
}

impl AudioAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame, or None when no input handle exists
    pub fn update(&mut self, bins: Option<&[u8]>) -> AudioAnalysis {
        self.last = match bins {
            Some(bins) => analyze_bins(bins),
            None => AudioAnalysis::default(),
        };
        self.last
    }

    pub fn current(&self) -> AudioAnalysis {
        self.last
    }
}

// =============================================================================
// ORIENTATION
// =============================================================================

/// Smoothing rate toward real orientation events
const ORIENTATION_LERP: f64 = 0.08;
/// No events within this window -> synthetic orbit
const EVENT_GRACE_SECS: f64 = 2.0;

/// Smoothed device orientation with a synthetic-orbit fallback
#[derive(Debug, Default)]
pub struct OrientationTracker {
    target: GyroscopeAngles,
    current: GyroscopeAngles,
    has_events: bool,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a real orientation event
    pub fn feed(&mut self, alpha: f64, beta: f64, gamma: f64) {
        self.has_events = true;
        self.target = GyroscopeAngles { alpha, beta, gamma };
    }

    /// Advance one tick; `elapsed` is seconds since startup
    pub fn tick(&mut self, elapsed: f64) -> GyroscopeAngles {
        if self.has_events {
            self.current.alpha = lerp(self.current.alpha, self.target.alpha, ORIENTATION_LERP);
            self.current.beta = lerp(self.current.beta, self.target.beta, ORIENTATION_LERP);
            self.current.gamma = lerp(self.current.gamma, self.target.gamma, ORIENTATION_LERP);
        } else if elapsed >= EVENT_GRACE_SECS {
            // Three independently-phased low-frequency waves
            self.current = GyroscopeAngles {
                alpha: (elapsed * 0.15).sin() * 15.0,
                beta: (elapsed * 0.10).cos() * 10.0,
                gamma: (elapsed * 0.12).sin() * 8.0,
            };
        }
        self.current
    }

    pub fn current(&self) -> GyroscopeAngles {
        self.current
    }

    pub fn has_events(&self) -> bool {
        self.has_events
    }
}

fn lerp(current: f64, target: f64, rate: f64) -> f64 {
    current + (target - current) * rate
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        let analysis = analyze_bins(&[0u8; 128]);
        assert_eq!(analysis.level, 0.0);
        assert_eq!(analysis.bass, 0.0);
        assert_eq!(analysis.treble, 0.0);
    }

    #[test]
    fn test_full_scale_is_one() {
        let analysis = analyze_bins(&[255u8; 128]);
        assert!((analysis.level - 1.0).abs() < 1e-5);
        assert!((analysis.bass - 1.0).abs() < 1e-5);
        assert!((analysis.treble - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_frame_is_inert() {
        assert_eq!(analyze_bins(&[]), AudioAnalysis::default());
    }

    #[test]
    fn test_bands_separate() {
        // Energy only in the low bins
        let mut bins = [0u8; 128];
        for bin in bins.iter_mut().take(BASS_BINS) {
            *bin = 200;
        }
        let analysis = analyze_bins(&bins);
        assert!(analysis.bass > 0.7);
        assert_eq!(analysis.treble, 0.0);
    }

    #[test]
    fn test_short_frame_treble_zero() {
        // Fewer bins than the treble band start
        let analysis = analyze_bins(&[128u8; 32]);
        assert_eq!(analysis.treble, 0.0);
        assert!(analysis.level > 0.0);
    }

    #[test]
    fn test_analyzer_without_input_goes_inert() {
        let mut analyzer = AudioAnalyzer::new();
        analyzer.update(Some(&[200u8; 128]));
        assert!(analyzer.current().level > 0.5);
        analyzer.update(None);
        assert_eq!(analyzer.current(), AudioAnalysis::default());
    }

    #[test]
    fn test_orientation_orbits_without_events() {
        let mut tracker = OrientationTracker::new();
        let at_3s = tracker.tick(3.0);
        let at_5s = tracker.tick(5.0);
        assert!(at_3s.alpha.abs() <= 15.0);
        assert!((at_3s.alpha - at_5s.alpha).abs() > 1e-6, "orbit must move");
    }

    #[test]
    fn test_orientation_static_within_grace_window() {
        let mut tracker = OrientationTracker::new();
        let angles = tracker.tick(0.5);
        assert_eq!(angles, GyroscopeAngles::default());
    }

    #[test]
    fn test_orientation_smooths_toward_events() {
        let mut tracker = OrientationTracker::new();
        tracker.feed(90.0, 45.0, -30.0);

        let mut previous_gap = f64::MAX;
        for _ in 0..200 {
            let angles = tracker.tick(1.0);
            let gap = (angles.alpha - 90.0).abs();
            assert!(gap <= previous_gap, "alpha must approach target");
            previous_gap = gap;
        }
        assert!(previous_gap < 1.0);
    }
}
