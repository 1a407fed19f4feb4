use super::{BoxFuture, Delivery, EventSource, HeartbeatFeed, Publisher};
use anyhow::Result;
use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{timeout_at, Instant};

/// In-process broker with one durable queue (subjects under `{prefix}.`) and
/// plain fan-out for everything broadcast.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
    ready: Arc<Notify>,
    durable_prefix: String,
    retain: bool,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Queued>,
    next_id: u64,
    in_flight: HashSet<u64>,
    published: u64,
    acked: u64,
    broadcasts: Vec<(String, Bytes)>,
    subscribers: Vec<(String, mpsc::UnboundedSender<Bytes>)>,
}

struct Queued {
    id: u64,
    payload: Bytes,
}

impl MemoryBroker {
    pub fn new(durable_prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ready: Arc::new(Notify::new()),
            durable_prefix: durable_prefix.into(),
            retain: true,
        }
    }

    /// Broker that accepts and counts durable publishes but keeps nothing,
    /// for dry runs of the producer.
    pub fn discarding(durable_prefix: impl Into<String>) -> Self {
        Self {
            retain: false,
            ..Self::new(durable_prefix)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    pub fn subscribe(&self, subject: &str) -> MemoryHeartbeats {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push((subject.to_string(), tx));
        MemoryHeartbeats { rx }
    }

    pub fn pull(&self) -> MemoryEvents {
        MemoryEvents {
            broker: self.clone(),
        }
    }

    /// Durable messages accepted so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Durable messages waiting to be fetched.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Fetched but not yet acknowledged.
    pub fn unacked(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn acked(&self) -> u64 {
        self.lock().acked
    }

    /// Every payload broadcast on `subject`, in order.
    pub fn broadcasts(&self, subject: &str) -> Vec<Bytes> {
        self.lock()
            .broadcasts
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn accepts(&self, subject: &str) -> bool {
        subject
            .strip_prefix(self.durable_prefix.as_str())
            .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
    }

    fn take(&self, max: usize) -> Vec<MemoryMessage> {
        let mut inner = self.lock();
        let n = max.min(inner.queue.len());
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(q) = inner.queue.pop_front() {
                inner.in_flight.insert(q.id);
                batch.push(MemoryMessage {
                    id: q.id,
                    payload: q.payload,
                    inner: self.inner.clone(),
                });
            }
        }
        batch
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Publisher for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn publish<'a>(&'a self, subject: &'a str, payload: Bytes) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.accepts(subject) {
                anyhow::bail!("No durable stream for subject {}", subject);
            }
            {
                let mut inner = self.lock();
                inner.published += 1;
                if self.retain {
                    let id = inner.next_id;
                    inner.next_id += 1;
                    inner.queue.push_back(Queued { id, payload });
                }
            }
            self.ready.notify_one();
            Ok(())
        })
    }

    fn broadcast<'a>(&'a self, subject: &'a str, payload: Bytes) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.subscribers.retain(|(s, tx)| {
                if s != subject {
                    return true;
                }
                tx.send(payload.clone()).is_ok()
            });
            inner.broadcasts.push((subject.to_string(), payload));
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub struct MemoryHeartbeats {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl HeartbeatFeed for MemoryHeartbeats {
    fn try_next(&mut self) -> Result<Option<Bytes>> {
        match self.rx.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                anyhow::bail!("Heartbeat subscription closed")
            }
        }
    }
}

pub struct MemoryEvents {
    broker: MemoryBroker,
}

impl EventSource for MemoryEvents {
    type Message = MemoryMessage;

    fn fetch(
        &mut self,
        max: usize,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<Self::Message>>> {
        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            loop {
                let batch = self.broker.take(max);
                if !batch.is_empty() {
                    return Ok(batch);
                }
                if timeout_at(deadline, self.broker.ready.notified())
                    .await
                    .is_err()
                {
                    return Ok(Vec::new());
                }
            }
        })
    }
}

pub struct MemoryMessage {
    id: u64,
    payload: Bytes,
    inner: Arc<Mutex<Inner>>,
}

impl Delivery for MemoryMessage {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn acknowledge(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut inner = lock(&self.inner);
            if !inner.in_flight.remove(&self.id) {
                anyhow::bail!("Message {} already acknowledged", self.id);
            }
            inner.acked += 1;
            Ok(())
        })
    }
}
