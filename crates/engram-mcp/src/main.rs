//! Engram MCP Server - Cognitive memory for language-model agents
//!
//! Exposes the engram engine over MCP-style stdio JSON-RPC:
//!
//! - Hierarchical semantic graph with cognitive sectors and waypoint recall
//! - Temporal facts with validity windows and point-in-time queries
//! - Per-user isolation on every read and write path
//! - Durable coactivation queue linking co-recalled memories
//!
//! Configuration is environment-driven (USE_APPROX_VECTOR, EMBEDDINGS,
//! TIER, VEC_DIM, CACHE_ENABLED, COACTIVATION_MODE, ...); see engram-core.

mod protocol;
mod server;
mod tools;

use std::io;
use std::sync::Arc;

use engram_core::{Engine, EngineConfig};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments; returns the optional database path.
/// Exits the process for `--help` / `--version`.
fn parse_args() -> Option<std::path::PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut db_path = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Engram MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Cognitive memory tool server over stdio JSON-RPC.");
                println!();
                println!("USAGE:");
                println!("    engram-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --db-path <PATH>        Database file location");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                Log level filter (debug, info, warn, error)");
                println!("    USE_APPROX_VECTOR       true = HNSW backend, false = exact-linear");
                println!("    EMBEDDINGS              synthetic | openai | gemini | ollama");
                println!("    TIER                    fast | smart | deep | hybrid");
                println!("    VEC_DIM                 Embedding dimension (default 768)");
                println!("    CACHE_ENABLED           Query cache on/off (default true)");
                println!("    COACTIVATION_MODE       cron | interval | disabled");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("engram-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--db-path" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --db-path requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(std::path::PathBuf::from(&args[i]));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'engram-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    db_path
}

#[tokio::main]
async fn main() {
    let db_path = parse_args();

    // Logging to stderr; stdout is reserved for JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Engram MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let engine = match EngineConfig::from_env().and_then(|mut config| {
        if db_path.is_some() {
            config.db_path = db_path;
        }
        Engine::new(config)
    }) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("failed to initialize engine: {}", e);
            std::process::exit(1);
        }
    };
    info!("engine initialized");

    // Coactivation worker for the configured mode.
    match engine.spawn_coactivation_worker() {
        Some(_handle) => info!("coactivation worker running"),
        None => info!("coactivation disabled"),
    }

    // Periodic salience decay sweep. Reads already decay lazily; the sweep
    // persists the values so list/stats views agree with search.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            let interval_hours: u64 = std::env::var("ENGRAM_DECAY_INTERVAL_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6);

            // Small delay so we don't block the stdio handshake.
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            loop {
                let sweep_engine = engine.clone();
                match tokio::task::spawn_blocking(move || sweep_engine.run_decay_sweep()).await {
                    Ok(Ok(updated)) => info!(updated, "decay sweep complete"),
                    Ok(Err(e)) => warn!("decay sweep failed: {}", e),
                    Err(e) => warn!("decay sweep task panicked: {}", e),
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval_hours * 3600)).await;
            }
        });
    }

    let server = McpServer::new(engine);
    let transport = StdioTransport::new();

    info!("starting MCP server on stdio...");
    if let Err(e) = transport.run(server).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }

    info!("Engram MCP Server shutting down");
}
