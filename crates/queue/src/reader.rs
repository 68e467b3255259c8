use crate::QueueKind;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// A single message as seen by a peek.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub body: String,
    /// Broker and user attributes, flattened to strings.
    pub attributes: BTreeMap<String, String>,
    /// When the broker received the message, if it says.
    pub timestamp: Option<OffsetDateTime>,
}

impl Message {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self { id: id.into(), body: body.into(), attributes: BTreeMap::new(), timestamp: None }
    }
}

/// Read-only view over a queue or topic.
///
/// # Non-destructive reads
///
/// [`peek`](Self::peek) must never delete, acknowledge or commit the messages
/// it returns. Readers exist for inspecting and debugging live queues; a
/// second peek (by this process or any other consumer) has to be able to see
/// the same messages again.
#[async_trait]
pub trait MessageQueueReader: Send + Sync {
    fn kind(&self) -> QueueKind;

    /// The queue, topic or subscription being read.
    fn resource(&self) -> &str;

    /// Return up to `max` messages without removing them from the queue.
    async fn peek(&self, max: usize) -> Result<Vec<Message>>;

    /// Release connections. Further peeks fail.
    async fn close(&self) -> Result<()>;
}
