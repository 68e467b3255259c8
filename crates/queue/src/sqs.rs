//! Amazon SQS peek reader.
//!
//! SQS has no real "peek": a receive hides the message for the visibility
//! timeout. Receiving with a visibility timeout of zero (and never calling
//! `DeleteMessage`) leaves every message immediately visible to other
//! consumers, which is as close to a peek as SQS allows.

use crate::config::{QueueConfig, QueueKind};
use crate::error::{ErrorKind, Result};
use crate::reader::{Message, MessageQueueReader};
use crate::registry::ReaderFactory;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message as SqsMessage, MessageSystemAttributeName};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tracing::instrument;

/// SQS refuses to return more than this per receive call.
const MAX_BATCH: usize = 10;
const SENT_TIMESTAMP: &str = "SentTimestamp";

/// Registers [`SqsReader`] in a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqsFactory;

#[async_trait]
impl ReaderFactory for SqsFactory {
    async fn create(&self, config: &QueueConfig) -> Result<Box<dyn MessageQueueReader>> {
        Ok(Box::new(SqsReader::connect(config).await?))
    }
}

#[derive(Debug)]
pub struct SqsReader {
    client: Client,
    queue_url: String,
    resource: String,
    closed: AtomicBool,
}

impl SqsReader {
    /// Connect using the ambient AWS configuration.
    ///
    /// `sqs://my-queue` is looked up by name; `sqs://sqs.<region>.amazonaws.com/<account>/<name>`
    /// is used as a queue URL directly. An `endpoint` option points the client
    /// at an SQS-compatible service.
    #[instrument(skip(config), fields(resource = %config.resource))]
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = config.option("endpoint") {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        if shared.region().is_none() {
            exn::bail!(ErrorKind::Configuration(
                "no AWS region configured (add ?region=... to the queue URL)".to_string()
            ));
        }
        let client = Client::new(&shared);

        let queue_url = if config.host.contains('.') && config.resource != config.host {
            let base = config.option("endpoint").map(str::to_string).unwrap_or_else(|| format!("https://{}", config.host));
            format!("{}/{}", base.trim_end_matches('/'), config.resource)
        } else {
            let output = client
                .get_queue_url()
                .queue_name(&config.resource)
                .send()
                .await
                .map_err(|e| ErrorKind::Backend(DisplayErrorContext(&e).to_string()))?;
            output
                .queue_url()
                .map(str::to_string)
                .ok_or_else(|| ErrorKind::Backend(format!("no URL returned for queue {}", config.resource)))?
        };
        tracing::debug!(%queue_url, "resolved SQS queue");
        Ok(Self { client, queue_url, resource: config.resource.clone(), closed: AtomicBool::new(false) })
    }
}

#[async_trait]
impl MessageQueueReader for SqsReader {
    fn kind(&self) -> QueueKind {
        QueueKind::Sqs
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    async fn peek(&self, max: usize) -> Result<Vec<Message>> {
        if self.closed.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Closed);
        }
        let mut seen = HashSet::new();
        let mut messages = Vec::new();
        while messages.len() < max {
            let batch = (max - messages.len()).min(MAX_BATCH);
            let output = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(batch as i32)
                .visibility_timeout(0)
                .wait_time_seconds(1)
                .message_system_attribute_names(MessageSystemAttributeName::All)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|e| ErrorKind::Backend(DisplayErrorContext(&e).to_string()))?;
            let before = messages.len();
            for message in output.messages() {
                let converted = convert(message);
                // Zero visibility means the same message can come back in the next batch.
                if seen.insert(converted.id.clone()) {
                    messages.push(converted);
                }
            }
            if messages.len() == before {
                break;
            }
        }
        messages.truncate(max);
        Ok(messages)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

fn convert(message: &SqsMessage) -> Message {
    let mut attributes = BTreeMap::new();
    if let Some(system) = message.attributes() {
        for (name, value) in system {
            attributes.insert(name.as_str().to_string(), value.clone());
        }
    }
    if let Some(user) = message.message_attributes() {
        for (name, value) in user {
            if let Some(text) = value.string_value() {
                attributes.insert(name.clone(), text.to_string());
            }
        }
    }
    let timestamp = attributes
        .get(SENT_TIMESTAMP)
        .and_then(|millis| millis.parse::<i128>().ok())
        .and_then(|millis| OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).ok());
    Message {
        id: message.message_id().unwrap_or_default().to_string(),
        body: message.body().unwrap_or_default().to_string(),
        attributes,
        timestamp,
    }
}
