use clap::Parser;
use std::sync::Arc;
use tracing::debug;

use docflow::cli::Cli;
use docflow::discovery::collect_inputs;
use docflow::logging::init_logging;
use docflow::{Pipeline, Reporter};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, log_settings) = cli.into_settings();
    let guard = init_logging(&log_settings)?;

    let inputs = collect_inputs(std::mem::take(&mut config.inputs), "docflow")?;
    debug!(count = inputs.len(), "inputs collected");

    let reporter = Arc::new(Reporter::new());
    let pipeline = match Pipeline::from_config(config, reporter) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            guard.flush();
            return Err(e.into());
        }
    };

    pipeline.run(inputs);
    guard.flush();
    Ok(())
}
