//! Section Purge - sends cache invalidations to the Section control plane

use anyhow::Result;
use clap::{Parser, Subcommand};
use section_client::ReqwestTransport;
use section_core::{
    InMemorySettingsProvider, Invalidation, InvalidationKind, InvalidationState, InvalidationTokens,
};
use section_purger::SectionPurger;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LogFormat, LoggingConfig};

/// Section Purge - invalidate Varnish caches behind Section
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Purger to use, defaults to the first configured one
    #[arg(short, long, env = "SECTION_PURGE_PURGER")]
    purger: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invalidate one batch of expressions sharing a kind
    Invalidate {
        /// Invalidation kind, e.g. tag, url, wildcardpath
        kind: String,

        /// Expressions to invalidate, dispatched in order
        #[arg(required = true)]
        expressions: Vec<String>,
    },
    /// Print the purger's scheduling hints
    Hints,
    /// List supported invalidation kinds
    Kinds,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    init_logging(&config.logging);

    let id = config.select_purger(args.purger.as_deref())?.id.clone();
    let provider = Arc::new(InMemorySettingsProvider::new(config.purgers.clone()));
    let purger = SectionPurger::new(
        id,
        provider,
        Arc::new(ReqwestTransport::new()),
        Arc::new(InvalidationTokens),
        config.secrets.resolver(),
    );

    match args.command {
        Command::Invalidate { kind, expressions } => invalidate(&purger, &kind, expressions).await,
        Command::Hints => {
            println!("purger\t{}", purger.id());
            println!("label\t{}", purger.label()?);
            println!("time_hint\t{:.3}", purger.time_hint()?);
            println!("cooldown_time\t{}", purger.cooldown_time()?);
            println!("capacity\t{}", purger.capacity_hint()?);
            println!("runtime_measurement\t{}", purger.has_runtime_measurement()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Kinds => {
            for kind in purger.supported_kinds() {
                println!("{}\t{}", kind, purger.route(*kind).label());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one batch and print the final state of every invalidation
async fn invalidate(purger: &SectionPurger, kind: &str, expressions: Vec<String>) -> Result<ExitCode> {
    let kind: InvalidationKind = kind.parse()?;
    let mut invalidations: Vec<Invalidation> = expressions
        .into_iter()
        .enumerate()
        .map(|(id, expression)| Invalidation::new(id as u64 + 1, kind, expression))
        .collect();

    info!(purger = %purger.id(), "Starting batch of {} invalidation(s)", invalidations.len());
    let result = purger.invalidate(kind, &mut invalidations).await;

    for invalidation in &invalidations {
        println!(
            "{}\t{}\t{}",
            invalidation.state(),
            invalidation.kind(),
            invalidation.expression()
        );
    }

    if let Err(e) = result {
        error!(purger = %purger.id(), "Batch aborted: {}", e);
        return Ok(ExitCode::FAILURE);
    }

    let failed = invalidations
        .iter()
        .filter(|i| i.state() != InvalidationState::Succeeded)
        .count();
    if failed > 0 {
        error!(purger = %purger.id(), "{} of {} invalidation(s) failed", failed, invalidations.len());
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Initialize logging
///
/// Log lines go to stderr so stdout only carries results.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let json = config.format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(filter)
        .init();
}
