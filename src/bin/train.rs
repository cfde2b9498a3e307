use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tumor_diagnosis::config::TrainConfig;
use tumor_diagnosis::{logging, training};

fn main() -> ExitCode {
    let config = TrainConfig::parse();
    if let Err(e) = logging::init(&config.log_config()) {
        eprintln!("Logging unavailable, continuing without it: {}", e);
    }

    match training::run(&config) {
        Ok(report) => {
            info!("Run {} finished", report.run_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Training run aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
