//! Apache Kafka peek reader.
//!
//! Kafka reads are naturally non-destructive: a consumer only moves its own
//! committed offset. The reader assigns every partition of the topic
//! explicitly (no group rebalancing), starts each at its low watermark and
//! never commits, so a peek leaves the group's offsets exactly as it found
//! them.

use crate::config::{QueueConfig, QueueKind};
use crate::error::{ErrorKind, Result};
use crate::reader::{Message, MessageQueueReader};
use crate::registry::ReaderFactory;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::message::{Headers, Message as KafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::instrument;

const DEFAULT_GROUP: &str = "dataql-peek";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Registers [`KafkaReader`] in a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaFactory;

#[async_trait]
impl ReaderFactory for KafkaFactory {
    async fn create(&self, config: &QueueConfig) -> Result<Box<dyn MessageQueueReader>> {
        Ok(Box::new(KafkaReader::connect(config)?))
    }
}

pub struct KafkaReader {
    consumer: Arc<BaseConsumer>,
    topic: String,
    timeout: Duration,
    closed: AtomicBool,
}

impl KafkaReader {
    /// Create a consumer for `kafka://<broker>/<topic>`.
    ///
    /// Recognised options: `group` (consumer group id, default `dataql-peek`)
    /// and `timeout_ms` (how long a peek waits for the broker, default 5000).
    /// Any option prefixed with `kafka.` is passed to librdkafka unchanged,
    /// e.g. `kafka.security.protocol=SASL_SSL`.
    #[instrument(skip(config), fields(resource = %config.resource))]
    pub fn connect(config: &QueueConfig) -> Result<Self> {
        let timeout = match config.option("timeout_ms") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or_else(|| ErrorKind::InvalidOption { name: "timeout_ms".to_string(), value: value.to_string() })?,
            None => DEFAULT_TIMEOUT,
        };
        let consumer: BaseConsumer =
            client_config(config).create().map_err(|e| ErrorKind::Configuration(e.to_string()))?;
        tracing::debug!(brokers = %config.host, "created Kafka consumer");
        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.resource.clone(),
            timeout,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl MessageQueueReader for KafkaReader {
    fn kind(&self) -> QueueKind {
        QueueKind::Kafka
    }

    fn resource(&self) -> &str {
        &self.topic
    }

    async fn peek(&self, max: usize) -> Result<Vec<Message>> {
        if self.closed.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Closed);
        }
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || peek_blocking(&consumer, &topic, max, timeout))
            .await
            .map_err(|e| ErrorKind::Backend(e.to_string()))?
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

fn client_config(config: &QueueConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.host)
        .set("group.id", config.option("group").unwrap_or(DEFAULT_GROUP))
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "earliest");
    for (name, value) in &config.options {
        if let Some(name) = name.strip_prefix("kafka.") {
            client.set(name, value);
        }
    }
    client
}

/// Read up to `max` records from the start of every partition.
fn peek_blocking(consumer: &BaseConsumer, topic: &str, max: usize, timeout: Duration) -> Result<Vec<Message>> {
    let metadata = consumer
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| ErrorKind::Backend(format!("{topic}: {e}")))?;
    let Some(found) = metadata.topics().iter().find(|t| t.name() == topic) else {
        exn::bail!(ErrorKind::Backend(format!("topic {topic} not found")));
    };
    if let Some(error) = found.error() {
        exn::bail!(ErrorKind::Backend(format!("{topic}: {error:?}")));
    }

    // Partition to the offset one past its last record.
    let mut pending: HashMap<i32, i64> = HashMap::new();
    let mut assignment = TopicPartitionList::new();
    for partition in found.partitions() {
        let (low, high) = consumer
            .fetch_watermarks(topic, partition.id(), timeout)
            .map_err(|e| ErrorKind::Backend(format!("{topic}/{}: {e}", partition.id())))?;
        if low < high {
            pending.insert(partition.id(), high);
            assignment
                .add_partition_offset(topic, partition.id(), Offset::Offset(low))
                .map_err(|e| ErrorKind::Backend(e.to_string()))?;
        }
    }
    if pending.is_empty() {
        return Ok(Vec::new());
    }
    consumer.assign(&assignment).map_err(|e| ErrorKind::Backend(e.to_string()))?;

    let deadline = Instant::now() + timeout;
    let mut messages = Vec::new();
    while messages.len() < max && !pending.is_empty() && Instant::now() < deadline {
        let Some(polled) = consumer.poll(POLL_INTERVAL) else {
            continue;
        };
        let record = polled.map_err(|e| ErrorKind::Backend(e.to_string()))?;
        if pending.get(&record.partition()).is_some_and(|high| record.offset() + 1 >= *high) {
            pending.remove(&record.partition());
        }
        messages.push(convert(&record));
    }
    if let Err(e) = consumer.unassign() {
        tracing::warn!(%topic, error = %e, "failed to release Kafka partitions");
    }
    tracing::debug!(%topic, count = messages.len(), "peeked Kafka records");
    Ok(messages)
}

fn convert<M: KafkaMessage>(record: &M) -> Message {
    let mut attributes = BTreeMap::new();
    attributes.insert("partition".to_string(), record.partition().to_string());
    attributes.insert("offset".to_string(), record.offset().to_string());
    if let Some(key) = record.key() {
        attributes.insert("key".to_string(), String::from_utf8_lossy(key).into_owned());
    }
    if let Some(headers) = record.headers() {
        for header in headers.iter() {
            let value = header.value.map(|v| String::from_utf8_lossy(v).into_owned()).unwrap_or_default();
            attributes.insert(header.key.to_string(), value);
        }
    }
    let timestamp = record
        .timestamp()
        .to_millis()
        .and_then(|millis| OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok());
    Message {
        id: format!("{}:{}", record.partition(), record.offset()),
        body: record.payload().map(|p| String::from_utf8_lossy(p).into_owned()).unwrap_or_default(),
        attributes,
        timestamp,
    }
}
