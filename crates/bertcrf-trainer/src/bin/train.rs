use bertcrf_trainer::{TrainConfig, run_training};
use clap::Parser;

fn main() {
    tracing_subscriber::fmt::init();

    let config = TrainConfig::parse();
    if let Err(e) = run_training(config) {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}
