//! Replay a fixed SQL workload against PostgreSQL with concurrent workers
//! and a global timeout, reporting throughput and elapsed time.

mod config;
mod runner;
mod workload;

use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Replay a fixed SQL workload against PostgreSQL with concurrent workers"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "runner.toml")]
    config: PathBuf,

    /// Print individual statement latencies
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = config::Config::load(&args.config)?;

    let run_id = Local::now().format("%m%d_%H_%M_%S").to_string();
    println!("--- PostgreSQL workload replay ---");
    println!("run id : {}", run_id);
    println!(
        "Database Config: {} with user {} on {}:{}",
        config.database.db, config.database.user, config.database.host, config.database.port
    );
    println!("threads: {}", config.workload.threads);
    println!("timeout: {}s", config.workload.timeout);

    let runner = runner::WorkloadRunner::new(config, args.verbose)?;
    let outcome = runner.run().await?;

    println!(
        "\nResults: {:.2} queries/sec, {}ms total",
        outcome.throughput, outcome.total_time_ms
    );

    Ok(())
}
