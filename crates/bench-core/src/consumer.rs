use crate::config::Config;
use crate::producer::now_ms;
use crate::record::{self, Event, Heartbeat};
use crate::runlog::RunLog;
use crate::stats::WindowStats;
use crate::transport::{Delivery, EventSource, HeartbeatFeed};
use anyhow::{Context, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// One per-second summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub count: u64,
    pub observed_max_seq: u64,
    pub lag: u64,
    pub p95_ms: i64,
    pub p99_ms: i64,
    pub run_id: String,
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate={}/s max_seq={} lag={} p95={}ms p99={}ms run_id={}",
            self.count, self.observed_max_seq, self.lag, self.p95_ms, self.p99_ms, self.run_id
        )
    }
}

/// Accumulators owned by the consumer loop.
#[derive(Debug)]
pub struct ConsumerState {
    run_filter: Option<String>,
    discovered_run: Option<String>,
    producer_max_seq: u64,
    observed_max_seq: u64,
    window: WindowStats,
}

impl ConsumerState {
    pub fn new(run_filter: Option<String>) -> Self {
        Self {
            run_filter,
            discovered_run: None,
            producer_max_seq: 0,
            observed_max_seq: 0,
            window: WindowStats::new(),
        }
    }

    fn matches(&self, run_id: &str) -> bool {
        self.run_filter.as_deref().map_or(true, |f| f == run_id)
    }

    /// Returns the run id the log should switch to, on the first heartbeat only,
    /// and only when that run passes the filter.
    pub fn on_heartbeat(&mut self, hb: &Heartbeat) -> Option<String> {
        let mut switch_to = None;
        if self.discovered_run.is_none() {
            self.discovered_run = Some(hb.run_id.clone());
            if self.matches(&hb.run_id) {
                switch_to = Some(hb.run_id.clone());
            }
        }
        if self.matches(&hb.run_id) {
            self.producer_max_seq = hb.prod_max_seq;
        }
        switch_to
    }

    /// Account for one delivered event. Latency is `batch_now_ms - producer_ts_ms`
    /// and may be negative; it saturates instead of overflowing on absurd timestamps.
    pub fn on_event(&mut self, event: &Event, batch_now_ms: i64) -> bool {
        if !self.matches(&event.run_id) {
            return false;
        }
        self.observed_max_seq = self.observed_max_seq.max(event.seq);
        self.window.record(batch_now_ms.saturating_sub(event.producer_ts_ms));
        true
    }

    pub fn producer_max_seq(&self) -> u64 {
        self.producer_max_seq
    }

    pub fn observed_max_seq(&self) -> u64 {
        self.observed_max_seq
    }

    pub fn window_count(&self) -> u64 {
        self.window.count()
    }

    /// Producer progress not yet observed; zero when a stale heartbeat trails the events.
    pub fn lag(&self) -> u64 {
        self.producer_max_seq.saturating_sub(self.observed_max_seq)
    }

    pub fn effective_run_id(&self) -> &str {
        self.run_filter
            .as_deref()
            .or(self.discovered_run.as_deref())
            .unwrap_or("unknown")
    }

    /// Summarize the window and clear it.
    pub fn take_report(&mut self) -> WindowReport {
        let lag = self.lag();
        let snapshot = self.window.take();
        WindowReport {
            count: snapshot.count,
            observed_max_seq: self.observed_max_seq,
            lag,
            p95_ms: snapshot.p95_ms,
            p99_ms: snapshot.p99_ms,
            run_id: self.effective_run_id().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub run_filter: Option<String>,
    pub batch_max: usize,
    pub fetch_timeout: Duration,
    pub report_every: Duration,
}

impl ConsumerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            run_filter: config.consumer.run_filter.clone(),
            batch_max: config.consumer.batch_max,
            fetch_timeout: Duration::from_millis(config.consumer.fetch_timeout_ms),
            report_every: Duration::from_millis(config.consumer.report_every_ms),
        }
    }
}

/// Observer loop: drain heartbeats, pull a batch, report once per interval.
pub struct Consumer<H, E> {
    heartbeats: H,
    events: E,
    settings: ConsumerSettings,
    state: ConsumerState,
    log: RunLog,
    last_report: Instant,
}

impl<H: HeartbeatFeed, E: EventSource> Consumer<H, E> {
    pub fn new(heartbeats: H, events: E, settings: ConsumerSettings, log: RunLog) -> Self {
        let state = ConsumerState::new(settings.run_filter.clone());
        Self {
            heartbeats,
            events,
            settings,
            state,
            log,
            last_report: Instant::now(),
        }
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Log the startup line; `endpoint` and `durable` are informational.
    pub fn announce(&self, endpoint: &str, durable: &str) -> Result<()> {
        self.log.line(format!(
            "startup nats={} durable={} run_id_filter={}",
            endpoint,
            durable,
            self.settings.run_filter.as_deref().unwrap_or("none")
        ))
    }

    /// Run forever. Only a transport, decode or log failure ends the loop.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.step().await?;
        }
    }

    /// One iteration. Returns the report if one was due.
    pub async fn step(&mut self) -> Result<Option<WindowReport>> {
        self.drain_heartbeats()?;

        let batch_now_ms = now_ms();
        let batch = self
            .events
            .fetch(self.settings.batch_max, self.settings.fetch_timeout)
            .await?;

        for message in &batch {
            let event: Event = record::decode(message.payload())?;
            self.state.on_event(&event, batch_now_ms);
            // ack even when filtered out, or the broker keeps redelivering it
            message
                .acknowledge()
                .await
                .with_context(|| format!("Failed to ack event seq={}", event.seq))?;
        }

        if self.last_report.elapsed() < self.settings.report_every {
            return Ok(None);
        }
        let report = self.state.take_report();
        self.log.line(&report)?;
        self.last_report = Instant::now();
        Ok(Some(report))
    }

    fn drain_heartbeats(&mut self) -> Result<()> {
        while let Some(payload) = self.heartbeats.try_next()? {
            let hb: Heartbeat = record::decode(&payload)?;
            if let Some(run_id) = self.state.on_heartbeat(&hb) {
                if self.log.switch_to_run(&run_id) {
                    info!("Discovered run {}", run_id);
                    self.log.line(format!(
                        "log_switched file={} run_id={}",
                        self.log.path().display(),
                        run_id
                    ))?;
                }
            }
        }
        Ok(())
    }
}
