use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mech_motion_runtime::config::TuningConfig;
use mech_motion_runtime::runtime::{self, RunOptions};

/// Actuator and drive control runtime
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON tuning file (defaults are used for anything it leaves out)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drive simulated plants instead of listening for sensor topics
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => match TuningConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => TuningConfig::default(),
    };

    let options = RunOptions {
        config,
        simulate: args.sim,
    };
    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
