mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
  let cli_args = Cli::parse();

  // Can be overridden by RUST_LOG env variable
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli_args.log_filter));
  tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

  match cli_args.command {
    Commands::Simulate(simulate_args) => commands::simulate::run_simulation(simulate_args).await,
  }
}
