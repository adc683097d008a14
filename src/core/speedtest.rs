//! Simulated speed test
//!
//! No measurement happens. Each metric animates toward a randomized
//! target along an ease-out-cubic curve with small multiplicative
//! jitter, staged latency -> download -> upload with fixed stagger
//! delays and a final hold that pins the exact targets. Sampling is a
//! pure function of elapsed time given fixed targets, so the curve
//! shape is reproducible; only the magnitudes are random.

use rand::Rng;

use crate::core::rng::Mulberry32;
use crate::types::SpeedTestResult;

/// Stage ranges and durations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTestConfig {
    /// Milliseconds
    pub latency_range: (f64, f64),
    /// Mbps
    pub download_range: (f64, f64),
    /// Mbps
    pub upload_range: (f64, f64),
    pub latency_duration_ms: u64,
    pub download_duration_ms: u64,
    pub upload_duration_ms: u64,
    /// Pause between stages
    pub stagger_delay_ms: u64,
    /// Tail during which all three metrics display their targets
    pub final_hold_ms: u64,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            latency_range: (12.0, 42.0),
            download_range: (65.0, 220.0),
            upload_range: (15.0, 55.0),
            latency_duration_ms: 2200,
            download_duration_ms: 3200,
            upload_duration_ms: 2800,
            stagger_delay_ms: 1200,
            final_hold_ms: 800,
        }
    }
}

/// Which metric is currently animating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedTestStage {
    Latency,
    Download,
    Upload,
    Complete,
}

/// One sampled frame of the animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTestSample {
    pub stage: SpeedTestStage,
    pub latency: f64,
    pub download: f64,
    pub upload: f64,
    /// Overall progress in [0,1]
    pub progress: f64,
}

/// One run of the simulated test with fixed randomized targets
#[derive(Debug, Clone)]
pub struct SpeedTest {
    config: SpeedTestConfig,
    target_latency: f64,
    target_download: f64,
    target_upload: f64,
    jitter: Mulberry32,
}

impl SpeedTest {
    /// New run with targets drawn uniformly from the configured ranges
    pub fn new(config: SpeedTestConfig) -> Self {
        let mut rng = rand::thread_rng();
        let target_latency = rng.gen_range(config.latency_range.0..config.latency_range.1);
        let target_download = rng.gen_range(config.download_range.0..config.download_range.1);
        let target_upload = rng.gen_range(config.upload_range.0..config.upload_range.1);
        let jitter_seed: u32 = rng.gen();
        Self::with_targets(
            config,
            target_latency,
            target_download,
            target_upload,
            jitter_seed,
        )
    }

    /// Fully pinned run for deterministic tests
    pub fn with_targets(
        config: SpeedTestConfig,
        target_latency: f64,
        target_download: f64,
        target_upload: f64,
        jitter_seed: u32,
    ) -> Self {
        Self {
            config,
            target_latency,
            target_download,
            target_upload,
            jitter: Mulberry32::new(jitter_seed),
        }
    }

    /// Total animation length including stagger and hold
    pub fn total_duration_ms(&self) -> u64 {
        let c = &self.config;
        c.latency_duration_ms
            + c.stagger_delay_ms
            + c.download_duration_ms
            + c.stagger_delay_ms
            + c.upload_duration_ms
            + c.final_hold_ms
    }

    pub fn is_complete(&self, elapsed_ms: u64) -> bool {
        elapsed_ms >= self.total_duration_ms()
    }

    /// Unjittered curve values at `elapsed_ms` - the deterministic shape
    pub fn curve(&self, elapsed_ms: u64) -> SpeedTestSample {
        let c = &self.config;
        let elapsed = elapsed_ms as f64;
        let total = self.total_duration_ms() as f64;
        let progress = (elapsed / total).min(1.0);

        let mut stage = SpeedTestStage::Latency;
        let latency_progress = (elapsed / c.latency_duration_ms as f64).min(1.0);
        let mut latency = self.target_latency * ease_out_cubic(latency_progress);
        let mut download = 0.0;
        let mut upload = 0.0;

        let download_start = (c.latency_duration_ms + c.stagger_delay_ms) as f64;
        if elapsed > download_start {
            stage = SpeedTestStage::Download;
            let p = ((elapsed - download_start) / c.download_duration_ms as f64).min(1.0);
            download = self.target_download * ease_out_cubic(p);
        }

        let upload_start = download_start + (c.download_duration_ms + c.stagger_delay_ms) as f64;
        if elapsed > upload_start {
            stage = SpeedTestStage::Upload;
            let p = ((elapsed - upload_start) / c.upload_duration_ms as f64).min(1.0);
            upload = self.target_upload * ease_out_cubic(p);
        }

        if elapsed > total - c.final_hold_ms as f64 {
            stage = SpeedTestStage::Complete;
            latency = self.target_latency;
            download = self.target_download;
            upload = self.target_upload;
        }

        SpeedTestSample {
            stage,
            latency,
            download,
            upload,
            progress,
        }
    }

    /// Curve values with per-frame display jitter applied
    pub fn sample(&mut self, elapsed_ms: u64) -> SpeedTestSample {
        let mut sample = self.curve(elapsed_ms);
        if sample.stage != SpeedTestStage::Complete {
            sample.latency = self.fluctuate(sample.latency, 0.04);
            sample.download = self.fluctuate(sample.download, 0.06);
            sample.upload = self.fluctuate(sample.upload, 0.06);
        }
        sample
    }

    /// Final values, rounded to one decimal
    pub fn final_results(&self) -> SpeedTestResult {
        SpeedTestResult {
            latency: round1(self.target_latency),
            download: round1(self.target_download),
            upload: round1(self.target_upload),
        }
    }

    fn fluctuate(&mut self, value: f64, amount: f64) -> f64 {
        value * (1.0 + (self.jitter.next_f64() - 0.5) * amount)
    }
}

fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned() -> SpeedTest {
        SpeedTest::with_targets(SpeedTestConfig::default(), 20.0, 120.0, 30.0, 7)
    }

    #[test]
    fn test_total_duration() {
        assert_eq!(
            pinned().total_duration_ms(),
            2200 + 1200 + 3200 + 1200 + 2800 + 800
        );
    }

    #[test]
    fn test_stage_boundaries() {
        let test = pinned();
        assert_eq!(test.curve(0).stage, SpeedTestStage::Latency);
        assert_eq!(test.curve(3000).stage, SpeedTestStage::Latency);
        assert_eq!(test.curve(3500).stage, SpeedTestStage::Download);
        assert_eq!(test.curve(7900).stage, SpeedTestStage::Upload);
        let total = test.total_duration_ms();
        assert_eq!(test.curve(total - 100).stage, SpeedTestStage::Complete);
    }

    #[test]
    fn test_curve_monotone_per_stage() {
        let test = pinned();
        let mut previous = 0.0;
        for elapsed in (0..2200).step_by(50) {
            let sample = test.curve(elapsed);
            assert!(sample.latency >= previous, "latency curve dipped");
            previous = sample.latency;
        }

        previous = 0.0;
        for elapsed in (3401..6600).step_by(50) {
            let sample = test.curve(elapsed);
            assert!(sample.download >= previous, "download curve dipped");
            previous = sample.download;
        }
    }

    #[test]
    fn test_metrics_inactive_before_their_stage() {
        let test = pinned();
        let early = test.curve(1000);
        assert_eq!(early.download, 0.0);
        assert_eq!(early.upload, 0.0);
    }

    #[test]
    fn test_final_hold_pins_targets() {
        let test = pinned();
        let total = test.total_duration_ms();
        let held = test.curve(total - 10);
        assert_eq!(held.latency, 20.0);
        assert_eq!(held.download, 120.0);
        assert_eq!(held.upload, 30.0);
        assert_eq!(held.stage, SpeedTestStage::Complete);
    }

    #[test]
    fn test_final_results_rounded() {
        let test =
            SpeedTest::with_targets(SpeedTestConfig::default(), 21.44, 119.96, 30.05, 1);
        let results = test.final_results();
        assert_eq!(results.latency, 21.4);
        assert_eq!(results.download, 120.0);
        assert_eq!(results.upload, 30.1);
    }

    #[test]
    fn test_randomized_targets_within_ranges() {
        for _ in 0..20 {
            let config = SpeedTestConfig::default();
            let test = SpeedTest::new(config);
            let results = test.final_results();
            assert!((config.latency_range.0..=config.latency_range.1).contains(&results.latency));
            assert!(
                (config.download_range.0..=config.download_range.1).contains(&results.download)
            );
            assert!((config.upload_range.0..=config.upload_range.1).contains(&results.upload));
        }
    }

    #[test]
    fn test_jitter_stays_small() {
        let mut test = pinned();
        for elapsed in (100..2200).step_by(100) {
            let jittered = test.sample(elapsed);
            let clean = test.curve(elapsed);
            let ratio = jittered.latency / clean.latency;
            assert!((0.97..=1.03).contains(&ratio), "jitter ratio {}", ratio);
        }
    }

    #[test]
    fn test_progress_saturates_at_one() {
        let test = pinned();
        let total = test.total_duration_ms();
        assert_eq!(test.curve(total + 5000).progress, 1.0);
        assert!(test.is_complete(total));
        assert!(!test.is_complete(total - 1));
    }
}
