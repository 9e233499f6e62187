//! Binary entry point for `llmariner-slackbot`.
//!
//! This module provides the command-line interface with a single `run`
//! subcommand taking the config file path and the log verbosity. It reads the
//! secrets from the environment, initializes logging, and starts the service.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use llmariner_slackbot::base::{
    config::{Config, Secrets},
    types::Void,
};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// LLMariner slackbot – streams LLM answers to Slack app mentions.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot.
    ///
    /// Requires `SLACK_TOKEN`, `SLACK_APP_TOKEN` and `LLMARINER_API_KEY` in the environment.
    Run {
        /// Path to the config file.
        #[arg(long)]
        config: PathBuf,
        /// Log level.
        ///
        /// - 0: INFO
        /// - 1: DEBUG
        /// - 2 or more: TRACE
        #[arg(short = 'v', default_value_t = 0)]
        verbosity: u8,
    },
}

/// Main entry point for the slackbot binary.
///
/// Sets up logging based on verbosity, loads configuration and secrets, and starts the bot.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    let Command::Run { config, verbosity } = args.command;

    // Validate everything before any logging or networking is set up.

    let config = Config::load(&config)?;
    let secrets = Secrets::from_env()?;

    init_logging(verbosity)?;

    llmariner_slackbot::start(config, secrets).await
}

fn init_logging(verbosity: u8) -> Void {
    // Construct the level filter.

    let level = match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer, only when a collector is configured.

    let otel = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(_) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
            let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_simple_exporter(exporter)
                .build()
                .tracer("llmariner-slackbot");

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        Err(_) => None,
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    Ok(())
}

// Tests.
