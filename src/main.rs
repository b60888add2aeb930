mod config;
mod filter;
mod forward;
mod presence;
mod relay;
mod telemetry;
mod text;
mod translate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, RuntimeConfig};
use crate::forward::{Forwarder, ProcessLauncher};
use crate::presence::PresenceDetector;
use crate::relay::Relay;
use crate::telemetry::TelemetryClient;
use crate::translate::Translator;

/// Relay in-game chat to the console and, optionally, to an external program.
#[derive(Debug, Parser)]
#[command(name = "chat-relay", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(default_value = "config.toml")]
    config: PathBuf,

    /// Forward TEXT once using the configured target, then exit
    #[arg(short = 't', long = "test", value_name = "TEXT")]
    test: Option<String>,

    /// Write a commented default config to PATH and exit
    #[arg(long, value_name = "PATH", conflicts_with = "test")]
    init_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Some(path) = cli.init_config {
        config::write_default_config(&path)?;
        return Ok(ExitCode::SUCCESS);
    }

    info!("Loading configuration from: {}", cli.config.display());
    let config = Config::load_or_default(&cli.config)?
        .into_runtime()
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;

    log_config(&config);

    if let Some(text) = cli.test {
        return Ok(forward_test(&config, &text));
    }

    let feed = TelemetryClient::new(config.source.base_url(), config.source.request_timeout())?;
    let presence = PresenceDetector::new(&config.source);
    let translator = Translator::new(config.translate.endpoint.clone());

    let relay = Relay::new(
        config,
        Arc::new(presence),
        Arc::new(feed),
        Arc::new(translator),
        Arc::new(ProcessLauncher),
    );

    info!("Relay is starting...");
    relay.run().await;

    Ok(ExitCode::SUCCESS)
}

fn log_config(config: &RuntimeConfig) {
    info!("  Telemetry: {}", config.source.base_url());
    info!("  Interval: {:?}", config.interval);
    info!("  Ignore enemy: {}", config.ignore_enemy);
    info!("  Ignored senders: {:?}", config.ignore_senders);
    if config.translate.enable {
        info!("  Translate to: {}", config.translate.target_lang);
    }
    if config.forward.enable {
        info!(
            "  Forward: {} {}",
            config.forward.command, config.forward.arguments
        );
    }
    for rule in &config.rules {
        info!("  Rewrite: {}", rule.pattern());
    }
}

/// Launch the forward target once with `text` to check the forward settings.
fn forward_test(config: &RuntimeConfig, text: &str) -> ExitCode {
    if !config.forward.enable {
        println!("Forwarding is not enabled.");
        return ExitCode::SUCCESS;
    }

    println!("{}", text);
    let forwarder = Forwarder::new(&config.forward, Arc::new(ProcessLauncher));
    let rewritten = text::rewrite(text, &config.rules);
    match forwarder.forward(&rewritten) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            println!("Test failed.");
            ExitCode::FAILURE
        }
    }
}
