//! evacgrid - multi-agent grid path planning with HTTP API and session overlays.
//!
//! Usage:
//!   evacgrid serve [--port 5000] [--grpc-port 50051]   # Start servers
//!   evacgrid solve --map Office --agent 0,0:4,4          # One-shot batch
//!   evacgrid maps                                        # List catalog maps

use clap::Parser;
use evacgrid::config::{Args, Commands};
use evacgrid::simulation::SimulationRunner;
use evacgrid::state::AppState;
use evacgrid::{grpc_server, http_server, Engine};
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let catalog = match args.load_catalog() {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };

    match args.command {
        Commands::Serve(serve) => {
            info!(maps = ?catalog.names(), "Map catalog ready");
            let state = AppState::new(Engine::new(catalog)).with_session_ttl(serve.session_ttl());
            let _sweeper = state.spawn_sweeper(serve.sweep_interval());

            if let Some(grpc_port) = serve.grpc_port {
                let grpc_state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = grpc_server::run_server(grpc_port, grpc_state).await {
                        error!("gRPC server failed: {}", e);
                    }
                });
            }

            if let Err(e) = http_server::run_server(serve.port, state).await {
                eprintln!("Error: {}", e);
                exit(1);
            }
        }
        Commands::Solve { map, agents } => {
            let grid = match catalog.get(&map) {
                Ok(grid) => grid,
                Err(e) => {
                    eprintln!("Error: {} (available: {})", e, catalog.names().join(", "));
                    exit(1);
                }
            };
            let report = SimulationRunner::new(&grid).run(&agents);
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit(1);
                }
            }
            if report.failed() > 0 {
                exit(2);
            }
        }
        Commands::Maps => {
            for name in catalog.names() {
                println!("{}", name);
            }
        }
    }
}
