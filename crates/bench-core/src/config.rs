use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Benchmark configuration. Every field has a default; a TOML file and the
/// environment can each override them (environment wins).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults, or the given file, with the process environment applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)
                .with_context(|| format!("Failed to load config from {:?}", p))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment-style variables read through `lookup`.
    ///
    /// `RUN_ID` sets both the producer's run identifier and the consumer's run filter.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NATS_URL") {
            self.transport.url = url;
        }
        if let Some(durable) = lookup("DURABLE") {
            self.transport.durable = durable;
        }
        if let Some(run_id) = lookup("RUN_ID").filter(|s| !s.is_empty()) {
            self.producer.run_id = Some(run_id.clone());
            self.consumer.run_filter = Some(run_id);
        }
        if let Some(rate) = parse_var(&lookup, "TARGET_RATE")? {
            self.producer.target_rate = rate;
        }
        if let Some(warmup) = parse_var(&lookup, "WARMUP_SEC")? {
            self.producer.warmup_sec = warmup;
        }
        if let Some(measure) = parse_var(&lookup, "MEASURE_SEC")? {
            self.producer.measure_sec = measure;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.producer.target_rate == 0 {
            anyhow::bail!("target_rate must be positive");
        }
        if self.producer.partitions == 0 {
            anyhow::bail!("partitions must be positive");
        }
        if self.producer.key_space == 0 {
            anyhow::bail!("key_space must be positive");
        }
        if self.consumer.batch_max == 0 {
            anyhow::bail!("consumer batch_max must be positive");
        }
        Ok(())
    }

    /// The producer's run identifier: configured, or a fresh UUID.
    pub fn resolve_run_id(&self) -> String {
        self.producer
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {key} value: {raw:?}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Broker endpoint
    pub url: String,
    /// JetStream stream holding the events
    pub stream: String,
    /// Events are published to `{events_prefix}.{partition}`
    pub events_prefix: String,
    /// Broadcast subject for heartbeats
    pub heartbeat_subject: String,
    /// Durable pull consumer name
    pub durable: String,
}

impl TransportConfig {
    /// Wildcard covering every event partition subject.
    pub fn events_filter(&self) -> String {
        format!("{}.*", self.events_prefix)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream: "EVENTS".to_string(),
            events_prefix: "events".to_string(),
            heartbeat_subject: "bench.prod".to_string(),
            durable: "dur_A_events".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Run identifier; generated when absent
    pub run_id: Option<String>,
    /// Events per second
    pub target_rate: u64,
    pub warmup_sec: u64,
    pub measure_sec: u64,
    /// Filler payload size per event
    pub payload_bytes: u32,
    /// Keys cycle through `k0..k{key_space-1}`
    pub key_space: u64,
    pub partitions: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            target_rate: 50_000,
            warmup_sec: 20,
            measure_sec: 120,
            payload_bytes: 512,
            key_space: 20_000,
            partitions: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Only count events and heartbeats of this run
    pub run_filter: Option<String>,
    /// Maximum messages per pull
    pub batch_max: usize,
    /// How long a pull may wait for messages
    pub fetch_timeout_ms: u64,
    pub report_every_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            run_filter: None,
            batch_max: 5_000,
            fetch_timeout_ms: 200,
            report_every_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    /// Prefix of every log file name
    pub label: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            label: "caseA".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transport.url, "nats://127.0.0.1:4222");
        assert_eq!(config.transport.durable, "dur_A_events");
        assert_eq!(config.transport.events_filter(), "events.*");
        assert_eq!(config.producer.target_rate, 50_000);
        assert_eq!(config.producer.warmup_sec, 20);
        assert_eq!(config.producer.measure_sec, 120);
        assert_eq!(config.producer.payload_bytes, 512);
        assert!(config.consumer.run_filter.is_none());
        assert_eq!(config.consumer.batch_max, 5_000);
        assert_eq!(config.consumer.fetch_timeout_ms, 200);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("NATS_URL", "nats://broker:4222"),
                ("DURABLE", "dur_B"),
                ("RUN_ID", "run-7"),
                ("TARGET_RATE", "100"),
                ("WARMUP_SEC", "0"),
                ("MEASURE_SEC", " 1 "),
            ]))
            .unwrap();

        assert_eq!(config.transport.url, "nats://broker:4222");
        assert_eq!(config.transport.durable, "dur_B");
        assert_eq!(config.producer.run_id.as_deref(), Some("run-7"));
        assert_eq!(config.consumer.run_filter.as_deref(), Some("run-7"));
        assert_eq!(config.producer.target_rate, 100);
        assert_eq!(config.producer.warmup_sec, 0);
        assert_eq!(config.producer.measure_sec, 1);
        assert_eq!(config.resolve_run_id(), "run-7");
    }

    #[test]
    fn test_malformed_number_fails() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("TARGET_RATE", "fast")]))
            .unwrap_err();
        assert!(format!("{err}").contains("TARGET_RATE"));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut config = Config::default();
        config.apply_env(env(&[("TARGET_RATE", "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_run_ids_are_unique() {
        let config = Config::default();
        let a = config.resolve_run_id();
        let b = config.resolve_run_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config: Config =
            toml::from_str(include_str!("../../../config/example.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.transport.url, defaults.transport.url);
        assert_eq!(config.producer.target_rate, defaults.producer.target_rate);
        assert_eq!(config.consumer.batch_max, defaults.consumer.batch_max);
        assert_eq!(config.logging.dir, defaults.logging.dir);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_toml_partial() {
        let config_str = r#"
[transport]
url = "nats://10.0.0.5:4222"

[producer]
target_rate = 2000
measure_sec = 30

[consumer]
run_filter = "abc"
        "#;

        let config: Config = toml::from_str(config_str).unwrap();
        assert_eq!(config.transport.url, "nats://10.0.0.5:4222");
        assert_eq!(config.transport.stream, "EVENTS");
        assert_eq!(config.producer.target_rate, 2000);
        assert_eq!(config.producer.warmup_sec, 20);
        assert_eq!(config.producer.measure_sec, 30);
        assert_eq!(config.consumer.run_filter.as_deref(), Some("abc"));
        assert_eq!(config.logging.label, "caseA");
    }
}
