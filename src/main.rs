//! statchill command-line interface

use clap::Parser;
use log::{LevelFilter, info};

use statchill::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = cli.into_config().and_then(|config| {
        if let Some(threads) = config.threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .ok();
        }
        cli::execute(&config)
    });

    match result {
        Ok(results) => info!(
            "Done: {} significant, {} untestable of {} variables",
            results.n_significant(),
            results.n_failed(),
            results.outcomes.len()
        ),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
