use anyhow::{Context, Result};
use bench_core::transport::{MemoryBroker, NatsTransport, Publisher};
use bench_core::{Config, Producer, ProducerSettings, ProducerSummary, Role, RunLog};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "producer")]
#[command(about = "Pub/sub lag benchmark producer - emits paced events and heartbeats")]
struct Args {
    /// Optional TOML configuration file; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transport: nats, or mock to measure pacing without a broker
    #[arg(long, default_value = "nats")]
    mode: String,
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

    let run_id = config.resolve_run_id();
    let mut settings = ProducerSettings::from_config(&config, run_id.clone());
    let log = RunLog::for_run(
        &config.logging.dir,
        config.logging.label.clone(),
        Role::Producer,
        run_id.clone(),
    );

    info!(
        "Starting producer run_id={} target_rate={}/s in {} mode",
        run_id, config.producer.target_rate, args.mode
    );

    let summary = match args.mode.as_str() {
        "nats" => {
            info!("Broker: {}", config.transport.url);
            let transport = NatsTransport::connect(&config.transport).await?;
            run(&transport, settings, log).await?
        }
        "mock" => {
            settings.endpoint = "mock".to_string();
            let broker = MemoryBroker::discarding(config.transport.events_prefix.clone());
            run(&broker, settings, log).await?
        }
        other => anyhow::bail!("Invalid mode: {}, must be 'nats' or 'mock'", other),
    };

    print_summary(&summary);
    Ok(())
}

async fn run<P: Publisher>(
    publisher: &P,
    settings: ProducerSettings,
    log: RunLog,
) -> Result<ProducerSummary> {
    info!("Using transport: {}", publisher.name());
    let mut producer = Producer::new(publisher, settings, log);
    producer.run().await
}

fn print_summary(summary: &ProducerSummary) {
    println!("\n=== Producer {} Summary ===", summary.run_id);
    println!("Duration: {}ms", summary.elapsed_ms);
    println!("Max seq: {}", summary.max_seq);
    println!("Heartbeats: {}", summary.heartbeats);
    println!();
}
