//! Command-line and environment configuration.

use crate::catalog::GridCatalog;
use crate::error::LoadError;
use crate::grid::Point;
use crate::simulation::Agent;
use crate::state::{SESSION_TTL_SECS, SWEEP_INTERVAL_SECS};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "evacgrid")]
#[command(about = "Multi-agent grid path planning with HTTP and gRPC APIs")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON map catalog; the built-in maps are used when omitted
    #[arg(long, global = true, env = "EVACGRID_MAPS")]
    pub maps: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP (and optionally gRPC) server
    Serve(ServeArgs),

    /// Solve a batch of agents once and print the JSON report
    Solve {
        /// Map to solve on
        #[arg(long)]
        map: String,

        /// Agent as `x,y:x,y` (start:end); repeatable
        #[arg(long = "agent", value_parser = parse_agent, required = true, allow_hyphen_values = true)]
        agents: Vec<Agent>,
    },

    /// List the maps in the catalog
    Maps,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// HTTP port to listen on
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// gRPC port; gRPC is disabled when omitted
    #[arg(long)]
    pub grpc_port: Option<u16>,

    /// Idle seconds before a session is evicted
    #[arg(long, default_value_t = SESSION_TTL_SECS)]
    pub session_ttl_secs: u64,

    /// Seconds between eviction sweeps
    #[arg(long, default_value_t = SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,
}

impl ServeArgs {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Args {
    pub fn load_catalog(&self) -> Result<GridCatalog, LoadError> {
        match &self.maps {
            Some(path) => GridCatalog::load(path),
            None => GridCatalog::builtin(),
        }
    }
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in '{s}': {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in '{s}': {e}"))?;
    Ok(Point::new(x, y))
}

fn parse_agent(s: &str) -> Result<Agent, String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| format!("expected start:end, got '{s}'"))?;
    Ok(Agent::new(parse_point(start)?, parse_point(end)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_defaults() {
        let args = Args::try_parse_from(["evacgrid", "serve"]).unwrap();
        let Commands::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.grpc_port, None);
        assert_eq!(serve.session_ttl(), Duration::from_secs(SESSION_TTL_SECS));
        assert!(args.maps.is_none());
    }

    #[test]
    fn parses_solve_agents() {
        let args = Args::try_parse_from([
            "evacgrid", "solve", "--map", "Office", "--agent", "0,0:4,4", "--agent", "-1,0:2,2",
        ])
        .unwrap();
        let Commands::Solve { map, agents } = args.command else {
            panic!("expected solve");
        };
        assert_eq!(map, "Office");
        assert_eq!(agents[0], Agent::new(Point::new(0, 0), Point::new(4, 4)));
        assert_eq!(agents[1].start, Point::new(-1, 0));
    }

    #[test]
    fn rejects_malformed_agent() {
        assert!(parse_agent("0,0").is_err());
        assert!(parse_agent("0;0:1,1").is_err());
        assert!(parse_agent("a,0:1,1").is_err());
    }
}
