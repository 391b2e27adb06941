//! Command line front end: opens an engine (replaying its journal) and runs queries.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use infinity::error::InfinityError;
use infinity::infinity::Infinity;
use infinity::settings::Settings;

#[derive(Parser)]
#[command(name = "infinity")]
#[command(about = "Query an Infinity message index")]
struct Cli {
    /// Configuration file, instead of an optional ./infinity.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overriding the configured one
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Print engine statistics as JSON
    #[arg(long)]
    stats: bool,

    /// Query, e.g. "(and (talks-with 'urn:test:alice') (limit 10))", or plain words
    query: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "infinity failed");
            match e {
                InfinityError::DataCorruption { .. } => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> infinity::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.data_dir.is_some() {
        settings.data_dir = cli.data_dir;
    }
    let engine = Infinity::open(settings)?;
    if !cli.query.is_empty() {
        let query = cli.query.join(" ");
        for number in engine.hits(&query)? {
            println!("{number}");
        }
    }
    if cli.stats {
        println!("{:#}", engine.statistics());
    }
    engine.close()
}
