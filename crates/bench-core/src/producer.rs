use crate::config::Config;
use crate::pacer::Pacer;
use crate::phase::RunSchedule;
use crate::record::{self, EventFactory, Heartbeat};
use crate::runlog::RunLog;
use crate::transport::Publisher;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub run_id: String,
    /// Broker address shown in the startup line
    pub endpoint: String,
    pub target_rate: u64,
    pub schedule: RunSchedule,
    pub payload_bytes: u32,
    pub key_space: u64,
    pub partitions: u32,
    pub events_prefix: String,
    pub heartbeat_subject: String,
}

impl ProducerSettings {
    pub fn from_config(config: &Config, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            endpoint: config.transport.url.clone(),
            target_rate: config.producer.target_rate,
            schedule: RunSchedule::from_secs(
                config.producer.warmup_sec,
                config.producer.measure_sec,
            ),
            payload_bytes: config.producer.payload_bytes,
            key_space: config.producer.key_space,
            partitions: config.producer.partitions,
            events_prefix: config.transport.events_prefix.clone(),
            heartbeat_subject: config.transport.heartbeat_subject.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProducerSummary {
    pub run_id: String,
    pub max_seq: u64,
    pub heartbeats: u64,
    pub elapsed_ms: u64,
}

/// Emits `target_rate` events per one-second window until the schedule ends,
/// with one heartbeat after every burst.
pub struct Producer<'a, P: Publisher + ?Sized> {
    publisher: &'a P,
    settings: ProducerSettings,
    factory: EventFactory,
    pacer: Pacer,
    log: RunLog,
    seq: u64,
    heartbeats: u64,
}

impl<'a, P: Publisher + ?Sized> Producer<'a, P> {
    pub fn new(publisher: &'a P, settings: ProducerSettings, log: RunLog) -> Self {
        let factory = EventFactory::new(
            settings.run_id.clone(),
            settings.payload_bytes,
            settings.key_space,
        );
        let pacer = Pacer::new(settings.target_rate);
        Self {
            publisher,
            settings,
            factory,
            pacer,
            log,
            seq: 0,
            heartbeats: 0,
        }
    }

    /// Highest sequence number emitted so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub async fn run(&mut self) -> Result<ProducerSummary> {
        let run_id = self.settings.run_id.clone();
        let schedule = self.settings.schedule;
        let start = Instant::now();
        let end = start + schedule.total();

        self.log.line(format!(
            "startup run_id={} target_rate={}/s warmup={}s measure={}s nats={} transport={}",
            run_id,
            self.pacer.target_rate(),
            schedule.warmup.as_secs(),
            schedule.measure.as_secs(),
            self.settings.endpoint,
            self.publisher.name()
        ))?;

        let mut phase = schedule.phase_at(Duration::ZERO);
        self.log.line(format!("phase={} run_id={}", phase, run_id))?;
        let mut last_print = Instant::now();

        loop {
            let window_start = Instant::now();
            let sent = self.emit_burst().await?;

            let achieved = Pacer::achieved_rate(sent, window_start.elapsed());
            self.send_heartbeat(achieved).await?;

            if last_print.elapsed() >= Duration::from_secs(1) {
                self.log.line(format!(
                    "rate={}/s max_seq={} run_id={}",
                    achieved, self.seq, run_id
                ))?;
                last_print = Instant::now();
            }

            let slept = self.pacer.align(window_start).await;
            debug!(sent, achieved, slept_ms = slept.as_millis() as u64, "window complete");

            let now = Instant::now();
            if now >= end {
                break;
            }

            let current = schedule.phase_at(now.duration_since(start));
            if current != phase {
                info!("Run {} entering phase {}", run_id, current);
                self.log.line(format!("phase={} run_id={}", current, run_id))?;
                phase = current;
            }
        }

        self.publisher.flush().await?;
        self.log
            .line(format!("done run_id={} max_seq={}", run_id, self.seq))?;

        Ok(ProducerSummary {
            run_id,
            max_seq: self.seq,
            heartbeats: self.heartbeats,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Publish one window's worth of events. Any publish error ends the run.
    async fn emit_burst(&mut self) -> Result<u64> {
        let mut sent = 0u64;
        for _ in 0..self.pacer.target_rate() {
            self.seq += 1;
            let event = self.factory.build(self.seq, now_ms());
            let partition = record::partition_for(&event.key, self.settings.partitions);
            let subject = record::subject_for(&self.settings.events_prefix, partition);

            let payload = record::encode(&event)?;
            self.publisher
                .publish(&subject, payload)
                .await
                .with_context(|| format!("Event seq={} could not be published", self.seq))?;
            sent += 1;
        }
        Ok(sent)
    }

    async fn send_heartbeat(&mut self, achieved_rate: u64) -> Result<()> {
        let hb = Heartbeat {
            run_id: self.settings.run_id.clone(),
            prod_max_seq: self.seq,
            prod_rate: achieved_rate,
            producer_ts_ms_now: now_ms(),
        };
        let payload = record::encode(&hb)?;
        self.publisher
            .broadcast(&self.settings.heartbeat_subject, payload)
            .await?;
        self.heartbeats += 1;
        Ok(())
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
