//! Device identity: fingerprint signals, ledger records, correlation report

use serde::{Deserialize, Serialize};

/// One device's ledger entry, keyed by fingerprint in the stored map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub fingerprint: String,
    /// Unix milliseconds of the most recent rejection, if any
    pub rejected_at: Option<i64>,
    pub attempts: u32,
    /// Unix milliseconds of the first recorded visit
    pub first_seen_at: i64,
}

/// The fixed signal set hashed into a fingerprint
///
/// Best-effort identity: the same device/browser combination should
/// usually produce the same fingerprint, nothing stronger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignals {
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
    pub pixel_ratio: f64,
    pub hardware_concurrency: Option<u32>,
    pub device_memory: Option<u32>,
    pub platform: String,
    pub language: String,
    pub timezone: String,
    pub gpu_renderer: Option<String>,
    pub gpu_vendor: Option<String>,
    pub max_touch_points: u32,
}

impl DeviceSignals {
    /// Canonical `|`-joined form fed to the hash
    ///
    /// Field order is part of the fingerprint contract - changing it
    /// changes every fingerprint.
    pub fn canonical_string(&self) -> String {
        let unknown = |v: &Option<u32>| {
            v.map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        let mut signals = vec![
            format!(
                "{}x{}x{}",
                self.screen_width, self.screen_height, self.color_depth
            ),
            format!("{}", self.pixel_ratio),
            format!("cores:{}", unknown(&self.hardware_concurrency)),
            format!("mem:{}", unknown(&self.device_memory)),
            format!("plat:{}", self.platform),
            format!("lang:{}", self.language),
            format!("tz:{}", self.timezone),
        ];
        match (&self.gpu_renderer, &self.gpu_vendor) {
            (Some(renderer), Some(vendor)) => {
                signals.push(format!("gpu:{}", renderer));
                signals.push(format!("vendor:{}", vendor));
            }
            _ => signals.push("gpu:unavailable".to_string()),
        }
        signals.push(format!("touch:{}", self.max_touch_points));
        signals.join("|")
    }
}

/// Result of the (stubbed) same-origin correlation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub has_rejected_devices: bool,
    pub rejected_count: u32,
}

// =============================================================================
// TESTS
// =============================================================================
