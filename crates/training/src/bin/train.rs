use clap::Parser;
use training::run::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    run_train(TrainArgs::parse())
}
