use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::process::ExitCode;

use flood_risk_buffer::cli::Args;
use flood_risk_buffer::{pipeline, Config, Result};

fn run(args: &Args) -> Result<()> {
    let config = Config::from_args(args)?;

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()?;
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    let summary = pipeline::run(&config)?;
    info!(
        "Rows read: {}, written: {}, skipped: {}",
        summary.rows_read, summary.rows_written, summary.rows_skipped
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== Flood Risk Buffer Averages ===");

    match run(&args) {
        Ok(()) => {
            info!("=== Done! ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
