use anyhow::{Context, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One unit of benchmarked traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub event_id: String,
    pub seq: u64,
    pub producer_ts_ms: i64,
    pub key: String,
    pub value: u64,
    pub payload_bytes: u32,
    pub payload: String,
}

/// Producer progress announcement, broadcast once per emission window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub run_id: String,
    pub prod_max_seq: u64,
    pub prod_rate: u64,
    pub producer_ts_ms_now: i64,
}

/// Builds the events of a single run. All events share one filler payload.
#[derive(Debug, Clone)]
pub struct EventFactory {
    run_id: String,
    payload: String,
    key_space: u64,
}

impl EventFactory {
    pub fn new(run_id: impl Into<String>, payload_bytes: u32, key_space: u64) -> Self {
        Self {
            run_id: run_id.into(),
            payload: "x".repeat(payload_bytes as usize),
            key_space,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn build(&self, seq: u64, producer_ts_ms: i64) -> Event {
        Event {
            run_id: self.run_id.clone(),
            event_id: event_id(&self.run_id, seq),
            seq,
            producer_ts_ms,
            key: key_for(seq, self.key_space),
            value: seq,
            // payload is ASCII, so char count == byte count
            payload_bytes: self.payload.len() as u32,
            payload: self.payload.clone(),
        }
    }
}

pub fn event_id(run_id: &str, seq: u64) -> String {
    format!("{run_id}-{seq}")
}

pub fn key_for(seq: u64, key_space: u64) -> String {
    format!("k{}", seq % key_space)
}

/// 31-multiplier polynomial hash over UTF-16 code units with 32-bit wrapping.
///
/// Every producer computes the same value for the same key, regardless of
/// platform, so partition assignment is reproducible from the key alone.
pub fn string_hash(key: &str) -> i32 {
    key.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Partition index for `key`, always in `0..partitions`.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    ((string_hash(key) & 0x7fff_ffff) as u32) % partitions
}

pub fn subject_for(prefix: &str, partition: u32) -> String {
    format!("{prefix}.{partition}")
}

pub fn encode<T: Serialize>(record: &T) -> Result<Bytes> {
    let buf = serde_json::to_vec(record).context("Failed to encode record")?;
    Ok(Bytes::from(buf))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .with_context(|| format!("Failed to decode {}", std::any::type_name::<T>()))
}
