use super::{BoxFuture, Delivery, EventSource, HeartbeatFeed, Publisher};
use crate::config::TransportConfig;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer, stream};
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use std::time::Duration;
use tracing::info;

/// NATS connection with JetStream for the event stream and core pub/sub for heartbeats.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: TransportConfig,
}

impl NatsTransport {
    /// Connect and make sure the events stream exists.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        let client = async_nats::connect(config.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", config.url))?;
        let jetstream = jetstream::new(client.clone());

        let transport = Self {
            client,
            jetstream,
            config: config.clone(),
        };
        transport.ensure_stream().await?;
        info!("Connected to {} (stream {})", config.url, config.stream);
        Ok(transport)
    }

    async fn ensure_stream(&self) -> Result<stream::Stream> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: self.config.stream.clone(),
                subjects: vec![self.config.events_filter()],
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to get or create stream {}", self.config.stream))
    }

    pub async fn subscribe_heartbeats(&self) -> Result<NatsHeartbeats> {
        let subscriber = self
            .client
            .subscribe(self.config.heartbeat_subject.clone())
            .await
            .with_context(|| {
                format!(
                    "Failed to subscribe to {}",
                    self.config.heartbeat_subject
                )
            })?;
        Ok(NatsHeartbeats { subscriber })
    }

    /// Bind (creating if needed) the durable pull consumer over all event partitions.
    pub async fn pull_events(&self) -> Result<NatsEvents> {
        let stream = self.ensure_stream().await?;
        let durable = self.config.durable.clone();
        let consumer = stream
            .get_or_create_consumer(
                &durable,
                consumer::pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: self.config.events_filter(),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to bind durable consumer {}", durable))?;
        info!("Bound durable consumer {}", durable);
        Ok(NatsEvents { consumer })
    }
}

impl Publisher for NatsTransport {
    fn name(&self) -> &'static str {
        "nats"
    }

    fn publish<'a>(&'a self, subject: &'a str, payload: Bytes) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let ack = self
                .jetstream
                .publish(subject.to_string(), payload)
                .await
                .with_context(|| format!("Publish to {} failed", subject))?;
            ack.await
                .with_context(|| format!("Publish to {} was not acknowledged", subject))?;
            Ok(())
        })
    }

    fn broadcast<'a>(&'a self, subject: &'a str, payload: Bytes) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.client
                .publish(subject.to_string(), payload)
                .await
                .with_context(|| format!("Broadcast to {} failed", subject))?;
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.client.flush().await.context("Flush failed")?;
            Ok(())
        })
    }
}

pub struct NatsHeartbeats {
    subscriber: async_nats::Subscriber,
}

impl HeartbeatFeed for NatsHeartbeats {
    fn try_next(&mut self) -> Result<Option<Bytes>> {
        // Polls once: anything the client has already buffered is returned,
        // nothing is waited for.
        match self.subscriber.next().now_or_never() {
            Some(Some(message)) => Ok(Some(message.payload)),
            Some(None) => anyhow::bail!("Heartbeat subscription closed"),
            None => Ok(None),
        }
    }
}

pub struct NatsEvents {
    consumer: consumer::PullConsumer,
}

impl EventSource for NatsEvents {
    type Message = jetstream::Message;

    fn fetch(
        &mut self,
        max: usize,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<Self::Message>>> {
        Box::pin(async move {
            let mut batch = self
                .consumer
                .fetch()
                .max_messages(max)
                .expires(timeout)
                .messages()
                .await
                .context("Fetch request failed")?;

            let mut messages = Vec::with_capacity(max.min(1024));
            while let Some(message) = batch.next().await {
                messages.push(message.map_err(|e| anyhow::anyhow!("Fetch failed: {e}"))?);
            }
            Ok(messages)
        })
    }
}

impl Delivery for jetstream::Message {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn acknowledge(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ack()
                .await
                .map_err(|e| anyhow::anyhow!("Ack failed: {e}"))?;
            Ok(())
        })
    }
}
