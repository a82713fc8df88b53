#[path = "experiments/env_tracking.rs"]
mod env_tracking;
#[path = "experiments/patterns.rs"]
mod patterns;

use std::path::PathBuf;

use sparse_td::config::RunConfig;
use tracing_subscriber::EnvFilter;

use env_tracking::TrackingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    SparseDemo,
    ControlDemo,
    Both,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut command = Command::Both;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            "--config" => {
                let Some(path) = args.get(i + 1) else {
                    eprintln!("--config requires a path");
                    print_help();
                    std::process::exit(2);
                };
                config_path = Some(PathBuf::from(path));
                i += 1;
            }
            "sparse-demo" => command = Command::SparseDemo,
            "control-demo" => command = Command::ControlDemo,
            other => {
                eprintln!("Unknown command: {other}");
                print_help();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let run = match &config_path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    tracing::info!(seed = run.seed, steps = run.steps, config = ?config_path, "run config loaded");

    if matches!(command, Command::SparseDemo | Command::Both) {
        let report = patterns::run_pattern_demo(&run)?;
        tracing::info!(
            steps = report.steps,
            mean_active_units = report.mean_active_units,
            "sparse-demo summary"
        );
        if report.late_error > report.early_error {
            tracing::warn!(
                early = report.early_error,
                late = report.late_error,
                "reconstruction error did not improve"
            );
        }
    }
    if matches!(command, Command::ControlDemo | Command::Both) {
        let summary = env_tracking::run_tracking_demo(&run, TrackingConfig::default())?;
        tracing::info!(
            steps = summary.steps,
            mean_abs_error = summary.mean_abs_error,
            recent_abs_error = summary.recent_abs_error,
            cumulative_reward = summary.cumulative_reward,
            "control-demo summary"
        );
    }
    Ok(())
}

fn print_help() {
    println!("sparse_td (sparse coder and TD action controller demos)");
    println!("usage:");
    println!("  cargo run");
    println!("  cargo run -- sparse-demo");
    println!("  cargo run -- control-demo");
    println!("  cargo run -- --config run.json control-demo");
    println!("  cargo run -- --help");
    println!();
    println!("Log verbosity follows RUST_LOG, e.g. RUST_LOG=sparse_td=debug.");
}
