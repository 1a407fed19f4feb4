use anyhow::{Context, Result};
use bench_core::transport::NatsTransport;
use bench_core::{Config, Consumer, ConsumerSettings, Role, RunLog};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "consumer")]
#[command(about = "Pub/sub lag benchmark observer - reports throughput, lag and latency percentiles")]
struct Args {
    /// Optional TOML configuration file; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Invalid configuration")?;

    let transport = NatsTransport::connect(&config.transport).await?;
    let heartbeats = transport.subscribe_heartbeats().await?;
    let events = transport.pull_events().await?;

    let log = RunLog::new(
        &config.logging.dir,
        config.logging.label.clone(),
        Role::Consumer,
    );
    let mut consumer = Consumer::new(
        heartbeats,
        events,
        ConsumerSettings::from_config(&config),
        log,
    );
    consumer.announce(&config.transport.url, &config.transport.durable)?;

    let outcome = tokio::select! {
        res = consumer.run() => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(res) => res,
        None => {
            info!(
                "Interrupted, shutting down (run_id={})",
                consumer.state().effective_run_id()
            );
            Ok(())
        }
    }
}
