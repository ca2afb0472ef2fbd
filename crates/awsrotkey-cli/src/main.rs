mod cli;
mod config;
mod rotate;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

/// Entry point wiring the CLI to the rotation.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        None => {
            let status = rotate::run(cli.rotate, &config).await;
            return Ok(ExitCode::from(status));
        }
        Some(Command::Version) => print_version(),
        Some(Command::Config(ConfigCommand::Init)) => init_config(&config)?,
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    // Operator output goes to stdout; keep diagnostics on stderr and quiet by default.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("awsrotkey {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
