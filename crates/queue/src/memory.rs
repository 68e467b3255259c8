//! In-memory queue reader for testing.

use crate::config::{QueueConfig, QueueKind};
use crate::error::{ErrorKind, Result};
use crate::reader::{Message, MessageQueueReader};
use crate::registry::ReaderFactory;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Serves a fixed list of messages. Peeking never removes anything.
///
/// # Examples
///
/// ```
/// use dataql_queue::{Message, MemoryReader, MessageQueueReader, QueueKind, Registry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = Registry::new();
/// registry.register(QueueKind::Sqs, MemoryReader::factory(vec![Message::new("1", "hello")]));
///
/// let reader = registry.new_reader_from_url("sqs://orders").await?;
/// assert_eq!(reader.peek(10).await?.len(), 1);
/// assert_eq!(reader.peek(10).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryReader {
    kind: QueueKind,
    resource: String,
    messages: Vec<Message>,
    closed: AtomicBool,
}

impl MemoryReader {
    pub fn new(kind: QueueKind, resource: impl Into<String>, messages: Vec<Message>) -> Self {
        Self { kind, resource: resource.into(), messages, closed: AtomicBool::new(false) }
    }

    /// A factory that hands every opened queue the same messages.
    pub fn factory(messages: Vec<Message>) -> impl ReaderFactory + 'static {
        move |config: &QueueConfig| -> Result<Box<dyn MessageQueueReader>> {
            Ok(Box::new(MemoryReader::new(config.kind, config.resource.clone(), messages.clone())))
        }
    }
}

#[async_trait]
impl MessageQueueReader for MemoryReader {
    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    async fn peek(&self, max: usize) -> Result<Vec<Message>> {
        if self.closed.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Closed);
        }
        Ok(self.messages.iter().take(max).cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
