//! Device fingerprinting and the local identity ledger
//!
//! The ledger is one serialized JSON map (fingerprint -> record) behind
//! a pluggable store. Storage is best-effort throughout: a missing,
//! corrupt, or unwritable store degrades to "no record" / "write had no
//! effect" and never fails the flow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::types::{CorrelationReport, DeviceRecord, DeviceSignals};
use crate::REJECTION_COOLDOWN_MS;

/// Derive the stable device fingerprint from the fixed signal set
///
/// SHA-256 over the canonical signal string, truncated to 16 hex chars.
/// Best-effort identity, not cryptographically unique.
pub fn derive_fingerprint(signals: &DeviceSignals) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signals.canonical_string().as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Pluggable backing store for the serialized ledger map
pub trait LedgerStore: Send + Sync {
    /// Whole serialized map, or None when absent/unavailable
    fn load(&self) -> Option<String>;
    /// Persist the whole serialized map; false when the write failed
    fn save(&self, contents: &str) -> bool;
}

/// File-backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerStore for FileStore {
    fn load(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn save(&self, contents: &str) -> bool {
        if let Some(parent) = self.path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        std::fs::write(&self.path, contents).is_ok()
    }
}

/// In-memory store for tests and storage-unavailable fallback
#[derive(Debug, Default)]
pub struct MemoryStore {
    cell: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load contents, e.g. to simulate a corrupt store
    pub fn with_contents(contents: &str) -> Self {
        Self {
            cell: Mutex::new(Some(contents.to_string())),
        }
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Option<String> {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, contents: &str) -> bool {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents.to_string());
        true
    }
}

/// Fingerprint-keyed attempt/rejection ledger with a cooldown rule
pub struct IdentityLedger {
    store: Box<dyn LedgerStore>,
    records: HashMap<String, DeviceRecord>,
    cooldown_ms: i64,
}

impl IdentityLedger {
    /// Load from the store; invalid content is treated as an empty map
    pub fn new(store: Box<dyn LedgerStore>) -> Self {
        Self::with_cooldown(store, REJECTION_COOLDOWN_MS)
    }

    pub fn with_cooldown(store: Box<dyn LedgerStore>, cooldown_ms: i64) -> Self {
        let records = match store.load() {
            Some(contents) => serde_json::from_str(&contents).unwrap_or_else(|_| {
                warn!("Ledger contents unreadable, starting empty");
                HashMap::new()
            }),
            None => HashMap::new(),
        };
        Self {
            store,
            records,
            cooldown_ms,
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&DeviceRecord> {
        self.records.get(fingerprint)
    }

    /// Record a first-ever visit; idempotent for known devices
    pub fn record_attempt(&mut self, fingerprint: &str) {
        if self.records.contains_key(fingerprint) {
            return;
        }
        let now = now_ms();
        self.records.insert(
            fingerprint.to_string(),
            DeviceRecord {
                fingerprint: fingerprint.to_string(),
                rejected_at: None,
                attempts: 1,
                first_seen_at: now,
            },
        );
        self.persist();
    }

    /// Record a rejection; upserts and always bumps the attempt count
    pub fn record_rejection(&mut self, fingerprint: &str) {
        let now = now_ms();
        let record = self
            .records
            .entry(fingerprint.to_string())
            .or_insert_with(|| DeviceRecord {
                fingerprint: fingerprint.to_string(),
                rejected_at: None,
                attempts: 0,
                first_seen_at: now,
            });
        record.rejected_at = Some(now);
        record.attempts += 1;
        self.persist();
    }

    /// True while a past rejection still blocks this device
    pub fn is_within_cooldown(&self, record: &DeviceRecord) -> bool {
        self.is_within_cooldown_at(record, now_ms())
    }

    /// Cooldown check against an explicit clock, for deterministic tests
    pub fn is_within_cooldown_at(&self, record: &DeviceRecord, now: i64) -> bool {
        match record.rejected_at {
            Some(rejected_at) => now - rejected_at < self.cooldown_ms,
            None => false,
        }
    }

    /// When the block lifts (unix ms); None when never rejected
    pub fn cooldown_expiry(&self, record: &DeviceRecord) -> Option<i64> {
        record.rejected_at.map(|t| t + self.cooldown_ms)
    }

    /// Whether a fresh session for this fingerprint starts blocked
    pub fn is_blocked(&self, fingerprint: &str) -> bool {
        self.get(fingerprint)
            .map(|record| self.is_within_cooldown(record))
            .unwrap_or(false)
    }

    fn persist(&self) {
        match serde_json::to_string(&self.records) {
            Ok(contents) => {
                if !self.store.save(&contents) {
                    warn!("Ledger write failed, continuing without persistence");
                }
            }
            Err(_) => warn!("Ledger serialization failed"),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// CORRELATION CHECK
// =============================================================================

/// Backend correlation lookup: other rejected devices from this origin
///
/// `None` means "no backend available" and callers must treat it exactly
/// like a report with no rejected devices.
#[async_trait]
pub trait CorrelationCheck: Send + Sync {
    async fn check(&self, fingerprint: &str) -> Option<CorrelationReport>;
}

/// The shipped stub: no backend, always `None`
#[derive(Debug, Default)]
pub struct NullCorrelationCheck;

#[async_trait]
impl CorrelationCheck for NullCorrelationCheck {
    async fn check(&self, _fingerprint: &str) -> Option<CorrelationReport> {
        None
    }
}

/// Fixed-response check for exercising the honesty gate in tests
#[derive(Debug)]
pub struct StaticCorrelationCheck {
    pub report: CorrelationReport,
}

#[async_trait]
impl CorrelationCheck for StaticCorrelationCheck {
    async fn check(&self, _fingerprint: &str) -> Option<CorrelationReport> {
        Some(self.report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
