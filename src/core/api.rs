//! HTTP + WebSocket API for the gate
//!
//! Endpoints:
//! - POST /session/new - Create a session and start its flow
//! - GET /session/{id} - Session status
//! - GET /session/{id}/visual - Latest tick snapshot
//! - POST /session/{id}/permission - Report a permission outcome
//! - POST /session/{id}/honesty - Answer the honesty gate
//! - POST /session/{id}/contact - Submit the contact form
//! - GET /constellation - The immutable graph
//! - WS /ws/{id} - Live tick snapshots
//! - GET /health - Health check

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::core::analyzer::{AudioAnalyzer, OrientationTracker};
use crate::core::flow::{
    ChannelPermissions, FlowDriver, FlowHandle, FlowOutcome, FlowTiming, PermissionReporter,
    SubStates,
};
use crate::core::gate::GateEngine;
use crate::core::identity::{FileStore, IdentityLedger};
use crate::core::smoothing::SmoothingEngine;
use crate::types::{
    ConstellationConfig, ConstellationGraph, DeviceSignals, GateEvent, PermissionType, Phase,
    TickSnapshot,
};

/// Tick cadence of the server-side smoothing loop
const TICK_INTERVAL_MS: u64 = 50;

/// One running gate session
pub struct Session {
    pub id: String,
    pub fingerprint: String,
    pub engine: Arc<Mutex<GateEngine>>,
    pub sub: Arc<Mutex<SubStates>>,
    pub smoothing: Arc<Mutex<SmoothingEngine>>,
    pub handle: FlowHandle,
    pub reporter: PermissionReporter,
    pub outcome: Arc<Mutex<Option<FlowOutcome>>>,
    pub update_tx: broadcast::Sender<TickSnapshot>,
}

/// App state shared by all handlers
pub struct AppState {
    pub sessions: RwLock<HashMap<String, Session>>,
    pub graph: Arc<ConstellationGraph>,
    pub ledger_path: String,
    pub timing: FlowTiming,
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionRequest {
    /// Pre-derived fingerprint, wins over signals
    pub fingerprint: Option<String>,
    /// Raw device signals to derive a fingerprint from
    pub signals: Option<DeviceSignals>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub fingerprint: String,
    pub websocket_url: String,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub phase: Phase,
    pub returning: String,
    pub acceptance: String,
    pub permissions: HashMap<String, String>,
    pub speed_test_result: Option<crate::types::SpeedTestResult>,
    pub outcome: Option<String>,
}

/// Report a permission outcome
#[derive(Debug, Deserialize)]
pub struct PermissionReport {
    pub permission: PermissionType,
    pub granted: bool,
}

/// Honesty gate answer
#[derive(Debug, Deserialize)]
pub struct HonestyAnswer {
    pub proceed: bool,
}

/// Contact form submission
#[derive(Debug, Deserialize)]
pub struct ContactSubmission {
    pub name: String,
    pub phone: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Create the API router
pub fn create_router(config: ConstellationConfig, ledger_path: String) -> Router {
    create_router_with_timing(config, ledger_path, FlowTiming::default())
}

/// Router with custom flow timing, for tests
pub fn create_router_with_timing(
    config: ConstellationConfig,
    ledger_path: String,
    timing: FlowTiming,
) -> Router {
    let graph = Arc::new(crate::core::constellation::generate_constellation(&config));
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        graph,
        ledger_path,
        timing,
    });

    Router::new()
        .route("/health", get(health))
        .route("/constellation", get(get_constellation))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/visual", get(get_visual))
        .route("/session/:id/permission", post(report_permission))
        .route("/session/:id/honesty", post(answer_honesty))
        .route("/session/:id/contact", post(submit_contact))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

/// The immutable constellation graph
async fn get_constellation(State(state): State<Arc<AppState>>) -> Json<ConstellationGraph> {
    Json((*state.graph).clone())
}

/// Create a session and start its flow + tick loop
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, StatusCode> {
    let session_id = generate_session_id();
    let fingerprint = req
        .fingerprint
        .or_else(|| {
            req.signals
                .as_ref()
                .map(crate::core::identity::derive_fingerprint)
        })
        .unwrap_or_else(|| format!("anon-{}", session_id));

    let ledger = IdentityLedger::new(Box::new(FileStore::new(&state.ledger_path)));
    let (permissions, reporter) = ChannelPermissions::new();
    let driver = FlowDriver::new(fingerprint.clone(), ledger)
        .with_timing(state.timing)
        .with_permissions(Arc::new(permissions));

    let engine = driver.engine();
    let sub = driver.sub_states();
    let handle = driver.handle();
    let outcome = Arc::new(Mutex::new(None));
    let (update_tx, _) = broadcast::channel(64);

    // Flow task: drives phases until terminal
    {
        let outcome = Arc::clone(&outcome);
        tokio::spawn(async move {
            let result = driver.run().await;
            *outcome.lock().unwrap() = Some(result);
        });
    }

    // Tick task: the sole writer of this session's visual state
    let smoothing = Arc::new(Mutex::new(SmoothingEngine::new(Arc::clone(&state.graph))));
    {
        let smoothing = Arc::clone(&smoothing);
        let engine = Arc::clone(&engine);
        let update_tx = update_tx.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
            // No microphone handle server-side, so the analyzer stays inert
            // and orientation falls back to its synthetic orbit.
            let mut audio = AudioAnalyzer::new();
            let mut orientation = OrientationTracker::new();
            loop {
                interval.tick().await;
                let elapsed = start.elapsed().as_secs_f32();

                let audio_level = audio.update(None).level;
                let angles = orientation.tick(elapsed as f64);
                let phase = {
                    let mut engine = engine.lock().unwrap();
                    engine.apply(GateEvent::SetAudioLevel(audio_level));
                    engine.apply(GateEvent::SetGyroscope(angles));
                    engine.phase()
                };

                let snapshot = {
                    let mut smoothing = smoothing.lock().unwrap();
                    smoothing.tick(phase, elapsed, audio_level);
                    smoothing.snapshot(phase)
                };
                let _ = update_tx.send(snapshot);
            }
        });
    }

    let session = Session {
        id: session_id.clone(),
        fingerprint: fingerprint.clone(),
        engine,
        sub,
        smoothing,
        handle,
        reporter,
        outcome,
        update_tx,
    };

    let mut sessions = state.sessions.write().await;
    sessions.insert(session_id.clone(), session);
    info!(session = %session_id, "Session created");

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        fingerprint,
        websocket_url: format!("/ws/{}", session_id),
    }))
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    let gate_state = session.engine.lock().unwrap().state().clone();
    let sub = *session.sub.lock().unwrap();
    let outcome = *session.outcome.lock().unwrap();

    let permissions = gate_state
        .permissions
        .iter()
        .map(|(p, s)| (p.to_string(), format!("{:?}", s).to_lowercase()))
        .collect();

    Ok(Json(SessionStatusResponse {
        session_id: id,
        phase: gate_state.phase,
        returning: format!("{:?}", sub.returning),
        acceptance: format!("{:?}", sub.acceptance),
        permissions,
        speed_test_result: gate_state.speed_test_result,
        outcome: outcome.map(|o| format!("{:?}", o)),
    }))
}

/// Latest tick snapshot for polling consumers
async fn get_visual(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TickSnapshot>, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    let phase = session.engine.lock().unwrap().phase();
    let snapshot = session.smoothing.lock().unwrap().snapshot(phase);
    Ok(Json(snapshot))
}

/// Report a permission outcome into the running calibration
async fn report_permission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(report): Json<PermissionReport>,
) -> Result<StatusCode, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.reporter.report(report.permission, report.granted);
    Ok(StatusCode::ACCEPTED)
}

/// Answer the honesty gate
async fn answer_honesty(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(answer): Json<HonestyAnswer>,
) -> Result<StatusCode, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.handle.honesty_choice(answer.proceed);
    Ok(StatusCode::ACCEPTED)
}

/// Submit the contact form
async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(submission): Json<ContactSubmission>,
) -> Result<StatusCode, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    session
        .handle
        .submit_contact(&submission.name, &submission.phone)
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok(StatusCode::ACCEPTED)
}

/// WebSocket handler for live tick snapshots
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let rx = session.update_tx.subscribe();
    drop(sessions);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward tick snapshots until the socket closes
async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<TickSnapshot>) {
    while let Ok(snapshot) = rx.recv().await {
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

/// Generate session ID
fn generate_session_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("session_{:x}", nanos as u64)
}

/// Run the API server
pub async fn run_server(
    addr: &str,
    config: ConstellationConfig,
    ledger_path: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(config, ledger_path);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = addr, "Gate API running");
    println!("Gate API running on {}", addr);
    println!("  POST /session/new             - Create session");
    println!("  GET  /session/:id             - Session status");
    println!("  GET  /session/:id/visual      - Tick snapshot");
    println!("  POST /session/:id/permission  - Report permission outcome");
    println!("  POST /session/:id/honesty     - Answer honesty gate");
    println!("  POST /session/:id/contact     - Submit contact form");
    println!("  GET  /constellation           - Graph dump");
    println!("  WS   /ws/:id                  - Live tick stream");
    println!("  GET  /health                  - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
