//! Gatekeeper CLI
//!
//! Usage:
//!   gatekeeper --constellation             # Dump the generated graph
//!   gatekeeper --constellation --json      # Graph as JSON
//!   gatekeeper --simulate                  # Run the flow in the terminal
//!   gatekeeper --simulate --fast           # Compressed timings
//!   gatekeeper --serve                     # HTTP API server

use clap::Parser;
use colored::Colorize;
use std::time::Duration;

use gatekeeper::core::{
    generate_constellation, run_server, FlowDriver, FlowOutcome, FlowTiming, IdentityLedger,
    MemoryStore, SpeedTestConfig,
};
use gatekeeper::core::identity::FileStore;
use gatekeeper::types::{AcceptanceStage, ConstellationConfig, Phase};
use gatekeeper::{LEDGER_STORAGE_KEY, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "gatekeeper",
    version = VERSION,
    about = "Constellation gate engine - seeded 3D constellation driving a phased onboarding flow",
    long_about = "Gatekeeper generates a deterministic 3D constellation from a seed\n\
                  and drives a staged onboarding flow over it.\n\n\
                  Modes:\n  \
                  --constellation  Generate and print the graph\n  \
                  --simulate       Run the full flow in the terminal\n  \
                  --serve          HTTP/WebSocket API server\n\n\
                  Phases:\n  \
                  DEVICE_CHECK -> RETURNING_CHECK -> ENTRY -> SPEED_TEST ->\n  \
                  CALIBRATION -> VOICE_INTERFACE -> ACCEPTANCE (or REJECTION)"
)]
struct Args {
    /// Generate and print the constellation
    #[arg(short, long)]
    constellation: bool,

    /// Run the flow in the terminal (auto-granted permissions)
    #[arg(long)]
    simulate: bool,

    /// Run as HTTP API server
    #[arg(long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Constellation seed
    #[arg(long, default_value_t = 42)]
    seed: u32,

    /// Node count
    #[arg(long, default_value_t = 150)]
    nodes: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Compressed timings for simulation
    #[arg(long)]
    fast: bool,

    /// Ledger file path
    #[arg(long)]
    ledger: Option<String>,

    /// Device fingerprint override for simulation
    #[arg(long)]
    fingerprint: Option<String>,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging();

    if args.serve {
        run_serve(&args).await;
    } else if args.constellation {
        run_constellation(&args);
    } else if args.simulate {
        run_simulate(&args).await;
    } else {
        // Default to the constellation dump
        run_constellation(&args);
    }
}

fn config_from(args: &Args) -> ConstellationConfig {
    ConstellationConfig {
        seed: args.seed,
        node_count: args.nodes,
        ..Default::default()
    }
}

/// Generate and print the graph
fn run_constellation(args: &Args) {
    let config = config_from(args);
    if let Err(error) = config.validate() {
        eprintln!("Invalid configuration: {}", error);
        std::process::exit(1);
    }
    let graph = generate_constellation(&config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graph).unwrap());
        return;
    }

    let header = format!(
        "Constellation (seed={}, nodes={})",
        config.seed, config.node_count
    );
    if args.no_color {
        println!("{}", header);
    } else {
        println!("{}", header.cyan().bold());
    }
    println!(
        "  nodes: {}  edges: {}  hubs: {} ({:.1}%)",
        graph.node_count(),
        graph.edge_count(),
        graph.nodes.iter().filter(|n| n.is_hub()).count(),
        graph.hub_fraction() * 100.0
    );

    let mean_degree: f64 = if graph.node_count() > 0 {
        graph.nodes.iter().map(|n| n.connections as f64).sum::<f64>() / graph.node_count() as f64
    } else {
        0.0
    };
    let longest = graph
        .edges
        .iter()
        .map(|e| e.length)
        .fold(0.0_f32, f32::max);
    println!("  mean degree: {:.2}  longest edge: {:.2}", mean_degree, longest);

    for (i, node) in graph.nodes.iter().take(8).enumerate() {
        let kind = if node.is_hub() { "hub " } else { "node" };
        println!(
            "  [{:>3}] {} pos=({:+.2}, {:+.2}, {:+.2}) hierarchy={:.2} degree={}",
            i, kind, node.position[0], node.position[1], node.position[2],
            node.hierarchy, node.connections
        );
    }
    if graph.node_count() > 8 {
        println!("  ... {} more", graph.node_count() - 8);
    }
}

/// Run the whole flow in the terminal with auto-granted permissions
async fn run_simulate(args: &Args) {
    let fingerprint = args
        .fingerprint
        .clone()
        .unwrap_or_else(|| "cli-device".to_string());
    let ledger = match &args.ledger {
        Some(path) => IdentityLedger::new(Box::new(FileStore::new(path))),
        None => IdentityLedger::new(Box::new(MemoryStore::new())),
    };

    let timing = if args.fast {
        FlowTiming::compressed()
    } else {
        FlowTiming::default()
    };
    let speed_config = if args.fast {
        SpeedTestConfig {
            latency_duration_ms: 50,
            download_duration_ms: 50,
            upload_duration_ms: 50,
            stagger_delay_ms: 20,
            final_hold_ms: 20,
            ..Default::default()
        }
    } else {
        SpeedTestConfig::default()
    };

    let driver = FlowDriver::new(fingerprint, ledger)
        .with_timing(timing)
        .with_speed_config(speed_config);
    let engine = driver.engine();
    let sub = driver.sub_states();
    let handle = driver.handle();

    print_banner("Gate flow", args.no_color);
    let mut flow = tokio::spawn(driver.run());

    let mut last_phase = Phase::DeviceCheck;
    print_phase(last_phase, args.no_color);

    let mut submitted = false;
    let outcome = loop {
        if flow.is_finished() {
            break (&mut flow).await.unwrap_or(FlowOutcome::Aborted);
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        let phase = engine.lock().unwrap().phase();
        if phase != last_phase {
            last_phase = phase;
            print_phase(phase, args.no_color);
            if phase == Phase::SpeedTest {
                println!("    measuring connection...");
            }
        }

        // Auto-submit the contact form once it is ready
        if !submitted
            && phase == Phase::Acceptance
            && sub.lock().unwrap().acceptance == AcceptanceStage::Form
        {
            println!("    submitting contact: Traveler / (555) 012-3456");
            let _ = handle.submit_contact("Traveler", "5550123456");
            submitted = true;
        }
    };

    let state = engine.lock().unwrap().state().clone();
    if let Some(result) = state.speed_test_result {
        println!(
            "    latency {:.1} ms  download {:.1} Mbps  upload {:.1} Mbps",
            result.latency, result.download, result.upload
        );
    }

    let label = format!("Outcome: {:?}", outcome);
    if args.no_color {
        println!("{}", label);
    } else {
        let colored_label = match outcome {
            FlowOutcome::Accepted => label.green().bold(),
            FlowOutcome::Rejected | FlowOutcome::Blocked => label.red().bold(),
            FlowOutcome::Aborted => label.yellow(),
        };
        println!("{}", colored_label);
    }
}

/// Run the API server
async fn run_serve(args: &Args) {
    let config = config_from(args);
    let ledger_path = args
        .ledger
        .clone()
        .unwrap_or_else(|| LEDGER_STORAGE_KEY.to_string());
    if let Err(error) = run_server(&args.addr, config, ledger_path).await {
        eprintln!("Server error: {}", error);
        std::process::exit(1);
    }
}

fn print_banner(title: &str, no_color: bool) {
    let line = format!("=== {} v{} ===", title, VERSION);
    if no_color {
        println!("{}", line);
    } else {
        println!("{}", line.cyan().bold());
    }
}

fn print_phase(phase: Phase, no_color: bool) {
    let line = format!("  -> {}", phase);
    if no_color {
        println!("{}", line);
        return;
    }
    let colored_line = match phase {
        Phase::Rejection => line.red(),
        Phase::Acceptance => line.green(),
        Phase::SpeedTest | Phase::Calibration | Phase::VoiceInterface => line.cyan(),
        _ => line.normal(),
    };
    println!("{}", colored_line);
}
