//! footprint CLI
//!
//! Extracts building footprints from classification masks into a tile cache
//! and merges cached tiles into one cleaned GeoJSON layer.

use clap::Parser;
use footprint_runner::{init_logging, run, Cli, Config, Result};
use std::process;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if let Err(e) = try_main(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn try_main(cli: Cli) -> Result<()> {
    #[cfg(feature = "prometheus")]
    if let Some(addr) = cli.metrics_addr {
        footprint_metrics::install_prometheus(addr)
            .map_err(|e| footprint_runner::RunnerError::Config(format!("metrics exporter: {e}")))?;
    }
    footprint_metrics::describe_metrics();

    let config = Config::load(&cli.config)?;
    run(&config, cli.command)
}
