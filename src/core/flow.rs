//! Async flow driver: timer- and event-driven phase advancement
//!
//! One driver runs one session of the gate flow. Every delay scheduled
//! on phase entry is held as an abortable handle and cancelled the
//! moment the phase is exited - a timer firing into a phase that is no
//! longer current is a correctness bug, not an accepted race. External
//! events (permission outcomes, honesty-gate choices, the contact form)
//! arrive through the same message channel the timers feed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::contact::{validate_contact, ContactError};
use crate::core::gate::GateEngine;
use crate::core::identity::{CorrelationCheck, IdentityLedger, NullCorrelationCheck};
use crate::core::speedtest::{SpeedTest, SpeedTestConfig};
use crate::types::{
    AcceptanceStage, CalibrationStage, GateEvent, GateReason, Phase, PermissionStatus,
    PermissionType, ReturningCheckState, SpeedTestResult, VoiceState,
};
use crate::LOCATION_TIMEOUT_MS;

// =============================================================================
// TIMING
// =============================================================================

/// Every fixed delay in the flow, in milliseconds
///
/// Defaults are the production cadence; tests compress them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowTiming {
    pub device_check_delay_ms: u64,
    pub returning_check_delay_ms: u64,
    pub clean_advance_delay_ms: u64,
    pub entry_hold_ms: u64,
    pub entry_second_line_ms: u64,
    pub entry_exit_pad_ms: u64,
    pub speed_start_delay_ms: u64,
    pub speed_result_hold_ms: u64,
    pub calibration_intro_ms: u64,
    pub permission_gap_ms: u64,
    pub calibration_complete_hold_ms: u64,
    pub location_timeout_ms: u64,
    pub voice_intro_ms: u64,
    pub voice_listen_ms: u64,
    pub voice_think_ms: u64,
    pub voice_cycles: usize,
    pub voice_complete_hold_ms: u64,
    pub acceptance_reveal_ms: u64,
    pub submit_debounce_ms: u64,
}

impl Default for FlowTiming {
    fn default() -> Self {
        Self {
            device_check_delay_ms: 300,
            returning_check_delay_ms: 1000,
            clean_advance_delay_ms: 600,
            entry_hold_ms: 3500,
            entry_second_line_ms: 2000,
            entry_exit_pad_ms: 800,
            speed_start_delay_ms: 1200,
            speed_result_hold_ms: 1800,
            calibration_intro_ms: 2500,
            permission_gap_ms: 1500,
            calibration_complete_hold_ms: 1000,
            location_timeout_ms: LOCATION_TIMEOUT_MS,
            voice_intro_ms: 2500,
            voice_listen_ms: 8000,
            voice_think_ms: 4000,
            voice_cycles: 3,
            voice_complete_hold_ms: 2000,
            acceptance_reveal_ms: 4000,
            submit_debounce_ms: 500,
        }
    }
}

impl FlowTiming {
    /// Millisecond-scale delays for tests
    pub fn compressed() -> Self {
        Self {
            device_check_delay_ms: 2,
            returning_check_delay_ms: 2,
            clean_advance_delay_ms: 2,
            entry_hold_ms: 2,
            entry_second_line_ms: 2,
            entry_exit_pad_ms: 2,
            speed_start_delay_ms: 2,
            speed_result_hold_ms: 2,
            calibration_intro_ms: 2,
            permission_gap_ms: 2,
            calibration_complete_hold_ms: 2,
            location_timeout_ms: 40,
            voice_intro_ms: 2,
            voice_listen_ms: 2,
            voice_think_ms: 2,
            voice_cycles: 2,
            voice_complete_hold_ms: 2,
            acceptance_reveal_ms: 2,
            submit_debounce_ms: 2,
        }
    }

    /// Total ENTRY dwell before advancing to SPEED_TEST
    pub fn entry_total_ms(&self) -> u64 {
        self.entry_hold_ms + self.entry_second_line_ms + self.entry_exit_pad_ms
    }
}

// =============================================================================
// PERMISSION PROVIDER
// =============================================================================

/// Async permission source; each request resolves granted (true) or denied
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request(&self, permission: PermissionType) -> bool;
}

/// Grants everything immediately
#[derive(Debug, Default)]
pub struct AutoGrant;

#[async_trait]
impl PermissionProvider for AutoGrant {
    async fn request(&self, _permission: PermissionType) -> bool {
        true
    }
}

/// Per-permission scripted outcomes, with optional delay and hangs
#[derive(Debug, Default)]
pub struct ScriptedPermissions {
    outcomes: HashMap<PermissionType, bool>,
    hangs: Vec<PermissionType>,
    delay_ms: u64,
}

impl ScriptedPermissions {
    pub fn granting_all() -> Self {
        Self::default()
    }

    pub fn deny(mut self, permission: PermissionType) -> Self {
        self.outcomes.insert(permission, false);
        self
    }

    /// Never resolve this permission; exercises the location timeout
    pub fn hang_on(mut self, permission: PermissionType) -> Self {
        self.hangs.push(permission);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl PermissionProvider for ScriptedPermissions {
    async fn request(&self, permission: PermissionType) -> bool {
        if self.hangs.contains(&permission) {
            futures_util::future::pending::<()>().await;
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.outcomes.get(&permission).copied().unwrap_or(true)
    }
}

/// Outcomes reported by a remote client, one channel per session
///
/// `request` blocks until the reporter delivers a result for the asked
/// permission; a closed reporter reads as denial.
pub struct ChannelPermissions {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(PermissionType, bool)>>,
}

/// Client-side handle feeding `ChannelPermissions`
#[derive(Debug, Clone)]
pub struct PermissionReporter {
    tx: mpsc::UnboundedSender<(PermissionType, bool)>,
}

impl ChannelPermissions {
    pub fn new() -> (Self, PermissionReporter) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
            PermissionReporter { tx },
        )
    }
}

impl PermissionReporter {
    pub fn report(&self, permission: PermissionType, granted: bool) {
        let _ = self.tx.send((permission, granted));
    }
}

#[async_trait]
impl PermissionProvider for ChannelPermissions {
    async fn request(&self, permission: PermissionType) -> bool {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Some((reported, granted)) if reported == permission => return granted,
                Some(_) => continue,
                None => return false,
            }
        }
    }
}

// =============================================================================
// VOICE SUB-MACHINE
// =============================================================================

/// Input at a voice cycle boundary
///
/// Timers produce `TimerElapsed` today; a live audio integration feeds
/// the other variants through the same boundary without touching the
/// machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSignal {
    TimerElapsed,
    SpeechEnded,
    ResponseComplete,
}

/// Fixed-cycle listening/thinking alternation
#[derive(Debug)]
pub struct VoiceMachine {
    state: VoiceState,
    cycle: usize,
    cycles: usize,
}

impl VoiceMachine {
    pub fn new(cycles: usize) -> Self {
        Self {
            state: VoiceState::Intro,
            cycle: 0,
            cycles,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Advance on a cycle-boundary signal
    pub fn on_signal(&mut self, signal: VoiceSignal) -> VoiceState {
        self.state = match (self.state, signal) {
            (VoiceState::Intro, _) => VoiceState::Listening,
            (VoiceState::Listening, VoiceSignal::TimerElapsed)
            | (VoiceState::Listening, VoiceSignal::SpeechEnded) => VoiceState::Thinking,
            (VoiceState::Thinking, VoiceSignal::TimerElapsed)
            | (VoiceState::Thinking, VoiceSignal::ResponseComplete) => {
                self.cycle += 1;
                if self.cycle >= self.cycles {
                    VoiceState::Complete
                } else {
                    VoiceState::Listening
                }
            }
            (state, _) => state,
        };
        self.state
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Farewell reached with contact collected
    Accepted,
    /// Permission denial or honesty-gate deferral
    Rejected,
    /// Cooldown dead end; only a new session leaves it
    Blocked,
    /// Channel closed before a terminal state
    Aborted,
}

/// Live sub-state of the current phase, readable by consumers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubStates {
    pub returning: ReturningCheckState,
    pub calibration: CalibrationStage,
    pub voice: VoiceState,
    pub acceptance: AcceptanceStage,
}

impl Default for SubStates {
    fn default() -> Self {
        Self {
            returning: ReturningCheckState::Checking,
            calibration: CalibrationStage::Intro,
            voice: VoiceState::Intro,
            acceptance: AcceptanceStage::Reveal,
        }
    }
}

/// Internal message type: timers and external events share one channel
#[derive(Debug, Clone)]
enum FlowMsg {
    AdvanceTimer(Phase, GateReason),
    RunReturningCheck,
    HonestyChoice(bool),
    StartSpeedTest,
    SpeedTestFinished(SpeedTestResult),
    BeginPermissions,
    RequestPermission(usize),
    Voice(VoiceSignal),
    AcceptanceFormReady,
    SubmitContact { name: String, phone: String },
    ContactAccepted { name: String, phone: String },
    Shutdown,
}

/// Abortable handles for every pending delay of the current phase
#[derive(Debug, Default)]
struct TimerSet {
    handles: Vec<JoinHandle<()>>,
}

impl TimerSet {
    fn schedule(&mut self, delay_ms: u64, tx: mpsc::UnboundedSender<FlowMsg>, msg: FlowMsg) {
        self.handles.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(msg);
        }));
        self.handles.retain(|h| !h.is_finished());
    }

    /// Abort everything still pending
    fn cancel_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// External control surface for a running flow
#[derive(Debug, Clone)]
pub struct FlowHandle {
    tx: mpsc::UnboundedSender<FlowMsg>,
}

impl FlowHandle {
    /// Honesty-gate answer: proceed (true) or defer (false)
    pub fn honesty_choice(&self, proceed: bool) {
        let _ = self.tx.send(FlowMsg::HonestyChoice(proceed));
    }

    /// Submit the contact form; validated before it is sent
    pub fn submit_contact(&self, name: &str, phone: &str) -> Result<(), ContactError> {
        validate_contact(name, phone)?;
        let _ = self.tx.send(FlowMsg::SubmitContact {
            name: name.to_string(),
            phone: phone.to_string(),
        });
        Ok(())
    }

    /// Substitute a real voice event for the cycle timer
    pub fn voice_signal(&self, signal: VoiceSignal) {
        let _ = self.tx.send(FlowMsg::Voice(signal));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(FlowMsg::Shutdown);
    }
}

/// Drives one session from DEVICE_CHECK to a terminal state
pub struct FlowDriver {
    engine: Arc<Mutex<GateEngine>>,
    sub: Arc<Mutex<SubStates>>,
    ledger: Arc<Mutex<IdentityLedger>>,
    fingerprint: String,
    timing: FlowTiming,
    speed_config: SpeedTestConfig,
    permissions: Arc<dyn PermissionProvider>,
    correlation: Arc<dyn CorrelationCheck>,
    voice: VoiceMachine,
    speed_test: Option<SpeedTest>,
    timers: TimerSet,
    tx: mpsc::UnboundedSender<FlowMsg>,
    rx: mpsc::UnboundedReceiver<FlowMsg>,
}

impl FlowDriver {
    pub fn new(fingerprint: impl Into<String>, ledger: IdentityLedger) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let timing = FlowTiming::default();
        Self {
            engine: Arc::new(Mutex::new(GateEngine::new())),
            sub: Arc::new(Mutex::new(SubStates::default())),
            ledger: Arc::new(Mutex::new(ledger)),
            fingerprint: fingerprint.into(),
            timing,
            speed_config: SpeedTestConfig::default(),
            permissions: Arc::new(AutoGrant),
            correlation: Arc::new(NullCorrelationCheck),
            voice: VoiceMachine::new(timing.voice_cycles),
            speed_test: None,
            timers: TimerSet::default(),
            tx,
            rx,
        }
    }

    pub fn with_timing(mut self, timing: FlowTiming) -> Self {
        self.timing = timing;
        self.voice = VoiceMachine::new(timing.voice_cycles);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_correlation(mut self, correlation: Arc<dyn CorrelationCheck>) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_speed_config(mut self, speed_config: SpeedTestConfig) -> Self {
        self.speed_config = speed_config;
        self
    }

    /// Shared engine handle for tick loops and API readers
    pub fn engine(&self) -> Arc<Mutex<GateEngine>> {
        Arc::clone(&self.engine)
    }

    /// Shared sub-state handle
    pub fn sub_states(&self) -> Arc<Mutex<SubStates>> {
        Arc::clone(&self.sub)
    }

    pub fn handle(&self) -> FlowHandle {
        FlowHandle {
            tx: self.tx.clone(),
        }
    }

    /// The active speed test, if one is running
    pub fn speed_test(&self) -> Option<&SpeedTest> {
        self.speed_test.as_ref()
    }

    /// Run the session to a terminal state
    pub async fn run(mut self) -> FlowOutcome {
        self.schedule_phase_entry(Phase::DeviceCheck);

        loop {
            let msg = match self.rx.recv().await {
                Some(msg) => msg,
                None => return FlowOutcome::Aborted,
            };
            if let Some(outcome) = self.handle_msg(msg).await {
                self.timers.cancel_all();
                return outcome;
            }
        }
    }

    /// Process one message; Some(outcome) ends the session
    async fn handle_msg(&mut self, msg: FlowMsg) -> Option<FlowOutcome> {
        match msg {
            FlowMsg::AdvanceTimer(phase, reason) => self.enter_phase(phase, reason),
            FlowMsg::RunReturningCheck => self.run_returning_check().await,
            FlowMsg::HonestyChoice(proceed) => self.handle_honesty_choice(proceed),
            FlowMsg::StartSpeedTest => {
                let test = SpeedTest::new(self.speed_config);
                let results = test.final_results();
                let duration = test.total_duration_ms();
                self.speed_test = Some(test);
                self.timers
                    .schedule(duration, self.tx.clone(), FlowMsg::SpeedTestFinished(results));
                None
            }
            FlowMsg::SpeedTestFinished(results) => {
                self.speed_test = None;
                self.apply(GateEvent::SetSpeedResult(results));
                self.timers.schedule(
                    self.timing.speed_result_hold_ms,
                    self.tx.clone(),
                    FlowMsg::AdvanceTimer(Phase::Calibration, GateReason::R302_SPEED_TEST_COMPLETE),
                );
                None
            }
            FlowMsg::BeginPermissions => {
                self.set_calibration(CalibrationStage::Requesting(0));
                self.request_permission(0).await
            }
            FlowMsg::RequestPermission(index) => {
                self.set_calibration(CalibrationStage::Requesting(index));
                self.request_permission(index).await
            }
            FlowMsg::Voice(signal) => self.handle_voice_signal(signal),
            FlowMsg::AcceptanceFormReady => {
                self.sub.lock().unwrap().acceptance = AcceptanceStage::Form;
                None
            }
            FlowMsg::SubmitContact { name, phone } => {
                if self.sub.lock().unwrap().acceptance != AcceptanceStage::Form {
                    return None;
                }
                match validate_contact(&name, &phone) {
                    Ok((name, phone)) => {
                        // Brief debounce for submission feedback
                        self.timers.schedule(
                            self.timing.submit_debounce_ms,
                            self.tx.clone(),
                            FlowMsg::ContactAccepted { name, phone },
                        );
                    }
                    Err(error) => warn!(error = %error, "Contact submission rejected"),
                }
                None
            }
            FlowMsg::ContactAccepted { name, phone } => {
                self.apply(GateEvent::SetUserData { name, phone });
                self.sub.lock().unwrap().acceptance = AcceptanceStage::Farewell;
                info!(reason = GateReason::R304_CONTACT_SUBMITTED.code(), "Farewell");
                Some(FlowOutcome::Accepted)
            }
            FlowMsg::Shutdown => Some(FlowOutcome::Aborted),
        }
    }

    /// Cancel the previous phase's timers, transition, schedule the next
    fn enter_phase(&mut self, phase: Phase, reason: GateReason) -> Option<FlowOutcome> {
        self.timers.cancel_all();
        self.engine.lock().unwrap().transition(phase, reason);
        self.schedule_phase_entry(phase)
    }

    fn schedule_phase_entry(&mut self, phase: Phase) -> Option<FlowOutcome> {
        let tx = self.tx.clone();
        match phase {
            Phase::DeviceCheck => {
                self.timers.schedule(
                    self.timing.device_check_delay_ms,
                    tx,
                    FlowMsg::AdvanceTimer(Phase::ReturningCheck, GateReason::R101_DEVICE_CONFIRMED),
                );
                None
            }
            Phase::ReturningCheck => {
                self.timers.schedule(
                    self.timing.returning_check_delay_ms,
                    tx,
                    FlowMsg::RunReturningCheck,
                );
                None
            }
            Phase::Entry => {
                self.timers.schedule(
                    self.timing.entry_total_ms(),
                    tx,
                    FlowMsg::AdvanceTimer(Phase::SpeedTest, GateReason::R301_TIMER_ELAPSED),
                );
                None
            }
            Phase::SpeedTest => {
                self.timers
                    .schedule(self.timing.speed_start_delay_ms, tx, FlowMsg::StartSpeedTest);
                None
            }
            Phase::Calibration => {
                self.set_calibration(CalibrationStage::Intro);
                self.timers.schedule(
                    self.timing.calibration_intro_ms,
                    tx,
                    FlowMsg::BeginPermissions,
                );
                None
            }
            Phase::VoiceInterface => {
                self.voice = VoiceMachine::new(self.timing.voice_cycles);
                self.sub.lock().unwrap().voice = VoiceState::Intro;
                self.timers.schedule(
                    self.timing.voice_intro_ms,
                    tx,
                    FlowMsg::Voice(VoiceSignal::TimerElapsed),
                );
                None
            }
            Phase::Acceptance => {
                self.sub.lock().unwrap().acceptance = AcceptanceStage::Reveal;
                self.timers.schedule(
                    self.timing.acceptance_reveal_ms,
                    tx,
                    FlowMsg::AcceptanceFormReady,
                );
                None
            }
            Phase::Rejection => {
                self.ledger
                    .lock()
                    .unwrap()
                    .record_rejection(&self.fingerprint);
                Some(FlowOutcome::Rejected)
            }
        }
    }

    /// Ledger + correlation decision on entering RETURNING_CHECK
    async fn run_returning_check(&mut self) -> Option<FlowOutcome> {
        self.apply(GateEvent::SetFingerprint(self.fingerprint.clone()));

        let blocked = self.ledger.lock().unwrap().is_blocked(&self.fingerprint);
        if blocked {
            self.sub.lock().unwrap().returning = ReturningCheckState::Blocked;
            info!(reason = GateReason::R102_COOLDOWN_ACTIVE.code(), "Device blocked");
            return Some(FlowOutcome::Blocked);
        }

        let report = self.correlation.check(&self.fingerprint).await;
        // None must behave exactly like "no rejected devices"
        if report.map(|r| r.has_rejected_devices).unwrap_or(false) {
            self.sub.lock().unwrap().returning = ReturningCheckState::HonestyGate;
            info!(reason = GateReason::R103_HONESTY_GATE.code(), "Honesty gate");
            return None;
        }

        self.ledger.lock().unwrap().record_attempt(&self.fingerprint);
        self.sub.lock().unwrap().returning = ReturningCheckState::Clean;
        self.timers.schedule(
            self.timing.clean_advance_delay_ms,
            self.tx.clone(),
            FlowMsg::AdvanceTimer(Phase::Entry, GateReason::R104_CLEAN_DEVICE),
        );
        None
    }

    fn handle_honesty_choice(&mut self, proceed: bool) -> Option<FlowOutcome> {
        let returning = self.sub.lock().unwrap().returning;
        match (returning, proceed) {
            (ReturningCheckState::HonestyGate, true) => {
                self.sub.lock().unwrap().returning = ReturningCheckState::HonestyConfirm;
                None
            }
            (ReturningCheckState::HonestyConfirm, true) => {
                self.ledger.lock().unwrap().record_attempt(&self.fingerprint);
                info!(reason = GateReason::R106_HONESTY_AFFIRMED.code(), "Proceeding");
                self.enter_phase(Phase::Entry, GateReason::R106_HONESTY_AFFIRMED)
            }
            (ReturningCheckState::HonestyGate, false)
            | (ReturningCheckState::HonestyConfirm, false) => {
                self.sub.lock().unwrap().returning = ReturningCheckState::Blocked;
                info!(reason = GateReason::R105_HONESTY_DEFERRED.code(), "Deferred");
                Some(FlowOutcome::Blocked)
            }
            _ => None,
        }
    }

    /// Issue one permission request; denial rejects the whole flow
    async fn request_permission(&mut self, index: usize) -> Option<FlowOutcome> {
        let sequence = PermissionType::sequence();
        let permission = sequence[index];

        let granted = if permission == PermissionType::Location {
            // Unresolved location prompts count as denied
            tokio::time::timeout(
                Duration::from_millis(self.timing.location_timeout_ms),
                self.permissions.request(permission),
            )
            .await
            .unwrap_or(false)
        } else {
            self.permissions.request(permission).await
        };

        let status = if granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        self.apply(GateEvent::SetPermission { permission, status });

        if !granted {
            info!(
                permission = %permission,
                reason = GateReason::R202_PERMISSION_DENIED.code(),
                "Calibration failed"
            );
            return self.enter_phase(Phase::Rejection, GateReason::R202_PERMISSION_DENIED);
        }

        if index + 1 < sequence.len() {
            self.timers.schedule(
                self.timing.permission_gap_ms,
                self.tx.clone(),
                FlowMsg::RequestPermission(index + 1),
            );
        } else {
            self.set_calibration(CalibrationStage::Complete);
            self.timers.schedule(
                self.timing.calibration_complete_hold_ms,
                self.tx.clone(),
                FlowMsg::AdvanceTimer(Phase::VoiceInterface, GateReason::R203_CALIBRATION_COMPLETE),
            );
        }
        None
    }

    fn handle_voice_signal(&mut self, signal: VoiceSignal) -> Option<FlowOutcome> {
        if self.engine.lock().unwrap().phase() != Phase::VoiceInterface {
            return None;
        }
        let state = self.voice.on_signal(signal);
        self.sub.lock().unwrap().voice = state;
        let tx = self.tx.clone();
        match state {
            VoiceState::Listening => {
                self.timers.schedule(
                    self.timing.voice_listen_ms,
                    tx,
                    FlowMsg::Voice(VoiceSignal::TimerElapsed),
                );
            }
            VoiceState::Thinking => {
                self.timers.schedule(
                    self.timing.voice_think_ms,
                    tx,
                    FlowMsg::Voice(VoiceSignal::TimerElapsed),
                );
            }
            VoiceState::Complete => {
                self.timers.schedule(
                    self.timing.voice_complete_hold_ms,
                    tx,
                    FlowMsg::AdvanceTimer(Phase::Acceptance, GateReason::R303_VOICE_COMPLETE),
                );
            }
            VoiceState::Intro => {}
        }
        None
    }

    fn set_calibration(&self, stage: CalibrationStage) {
        self.sub.lock().unwrap().calibration = stage;
    }

    fn apply(&self, event: GateEvent) {
        self.engine.lock().unwrap().apply(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{MemoryStore, StaticCorrelationCheck};
    use crate::types::CorrelationReport;

    fn ledger() -> IdentityLedger {
        IdentityLedger::new(Box::new(MemoryStore::new()))
    }

    fn compressed_driver(fingerprint: &str) -> FlowDriver {
        FlowDriver::new(fingerprint, ledger())
            .with_timing(FlowTiming::compressed())
            .with_speed_config(SpeedTestConfig {
                latency_duration_ms: 5,
                download_duration_ms: 5,
                upload_duration_ms: 5,
                stagger_delay_ms: 2,
                final_hold_ms: 2,
                ..Default::default()
            })
    }

    #[test]
    fn test_voice_machine_cycles() {
        let mut machine = VoiceMachine::new(2);
        assert_eq!(machine.state(), VoiceState::Intro);
        assert_eq!(machine.on_signal(VoiceSignal::TimerElapsed), VoiceState::Listening);
        assert_eq!(machine.on_signal(VoiceSignal::TimerElapsed), VoiceState::Thinking);
        assert_eq!(machine.on_signal(VoiceSignal::TimerElapsed), VoiceState::Listening);
        assert_eq!(machine.cycle(), 1);
        assert_eq!(machine.on_signal(VoiceSignal::TimerElapsed), VoiceState::Thinking);
        assert_eq!(machine.on_signal(VoiceSignal::TimerElapsed), VoiceState::Complete);
        // Complete is absorbing
        assert_eq!(machine.on_signal(VoiceSignal::TimerElapsed), VoiceState::Complete);
    }

    #[test]
    fn test_voice_machine_accepts_real_events() {
        let mut machine = VoiceMachine::new(1);
        machine.on_signal(VoiceSignal::TimerElapsed);
        assert_eq!(machine.on_signal(VoiceSignal::SpeechEnded), VoiceState::Thinking);
        assert_eq!(
            machine.on_signal(VoiceSignal::ResponseComplete),
            VoiceState::Complete
        );
    }

    #[tokio::test]
    async fn test_clean_device_reaches_acceptance_form() {
        let driver = compressed_driver("fp-clean");
        let engine = driver.engine();
        let handle = driver.handle();
        let sub = driver.sub_states();

        let task = tokio::spawn(driver.run());

        // Wait until the contact form is ready, then submit
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let ready = engine.lock().unwrap().phase() == Phase::Acceptance
                && sub.lock().unwrap().acceptance == AcceptanceStage::Form;
            if ready {
                break;
            }
        }
        handle.submit_contact("Vera", "5550123456").unwrap();

        let outcome = task.await.unwrap();
        assert_eq!(outcome, FlowOutcome::Accepted);
        let state = engine.lock().unwrap().state().clone();
        assert_eq!(state.phase, Phase::Acceptance);
        assert_eq!(state.user_name, "Vera");
        assert!(state.speed_test_result.is_some());
        assert!(state.all_permissions_granted());
    }

    #[tokio::test]
    async fn test_denial_rejects_without_further_requests() {
        let driver = compressed_driver("fp-deny").with_permissions(Arc::new(
            ScriptedPermissions::granting_all().deny(PermissionType::Motion),
        ));
        let engine = driver.engine();

        let outcome = driver.run().await;
        assert_eq!(outcome, FlowOutcome::Rejected);

        let state = engine.lock().unwrap().state().clone();
        assert_eq!(state.phase, Phase::Rejection);
        assert_eq!(
            state.permission(PermissionType::Motion),
            PermissionStatus::Denied
        );
        // The third request was never issued
        assert_eq!(
            state.permission(PermissionType::Location),
            PermissionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_location_timeout_counts_as_denied() {
        let driver = compressed_driver("fp-hang").with_permissions(Arc::new(
            ScriptedPermissions::granting_all().hang_on(PermissionType::Location),
        ));
        let engine = driver.engine();

        let outcome = driver.run().await;
        assert_eq!(outcome, FlowOutcome::Rejected);
        assert_eq!(
            engine.lock().unwrap().state().permission(PermissionType::Location),
            PermissionStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_blocked_device_dead_ends() {
        let mut ledger = ledger();
        ledger.record_rejection("fp-blocked");
        let driver = FlowDriver::new("fp-blocked", ledger).with_timing(FlowTiming::compressed());
        let engine = driver.engine();
        let sub = driver.sub_states();

        let outcome = driver.run().await;
        assert_eq!(outcome, FlowOutcome::Blocked);
        assert_eq!(engine.lock().unwrap().phase(), Phase::ReturningCheck);
        assert_eq!(sub.lock().unwrap().returning, ReturningCheckState::Blocked);
    }

    #[tokio::test]
    async fn test_honesty_gate_defer_blocks() {
        let driver = compressed_driver("fp-honesty").with_correlation(Arc::new(
            StaticCorrelationCheck {
                report: CorrelationReport {
                    has_rejected_devices: true,
                    rejected_count: 2,
                },
            },
        ));
        let handle = driver.handle();
        let sub = driver.sub_states();

        let task = tokio::spawn(driver.run());
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if sub.lock().unwrap().returning == ReturningCheckState::HonestyGate {
                break;
            }
        }
        handle.honesty_choice(false);

        assert_eq!(task.await.unwrap(), FlowOutcome::Blocked);
    }

    #[tokio::test]
    async fn test_honesty_gate_proceed_requires_confirmation() {
        let driver = compressed_driver("fp-honest").with_correlation(Arc::new(
            StaticCorrelationCheck {
                report: CorrelationReport {
                    has_rejected_devices: true,
                    rejected_count: 1,
                },
            },
        ));
        let engine = driver.engine();
        let handle = driver.handle();
        let sub = driver.sub_states();

        let task = tokio::spawn(driver.run());
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if sub.lock().unwrap().returning == ReturningCheckState::HonestyGate {
                break;
            }
        }
        handle.honesty_choice(true);

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if sub.lock().unwrap().returning == ReturningCheckState::HonestyConfirm {
                break;
            }
        }
        assert_eq!(
            sub.lock().unwrap().returning,
            ReturningCheckState::HonestyConfirm
        );
        handle.honesty_choice(true);

        // The flow moves on to ENTRY (or beyond) after confirmation
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if engine.lock().unwrap().phase() != Phase::ReturningCheck {
                break;
            }
        }
        assert_ne!(engine.lock().unwrap().phase(), Phase::ReturningCheck);
        handle.shutdown();
        let _ = task.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_contact_is_not_accepted() {
        let driver = compressed_driver("fp-form");
        let handle = driver.handle();

        assert_eq!(
            handle.submit_contact("", "5550123456"),
            Err(ContactError::E401_NAME_EMPTY)
        );
        assert_eq!(
            handle.submit_contact("Vera", "555"),
            Err(ContactError::E402_PHONE_TOO_SHORT)
        );
        drop(driver);
    }
}
