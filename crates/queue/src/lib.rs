//! Non-destructive message queue readers.
//!
//! Queue sources are not files: instead of going through resolution and the
//! cache they are opened as a [`MessageQueueReader`], which can *peek* at
//! messages without consuming them.
//!
//! Readers are created through a [`Registry`] keyed by [`QueueKind`]:
//!
//! | Scheme                          | Kind      | Reader                            |
//! |---------------------------------|-----------|-----------------------------------|
//! | `sqs://`                        | SQS       | [`SqsReader`] (`sqs` feature)     |
//! | `kafka://`                      | Kafka     | [`KafkaReader`] (`kafka` feature) |
//! | `rabbitmq://`, `amqp(s)://`     | RabbitMQ  | not yet available                 |
//! | `pulsar://`                     | Pulsar    | not yet available                 |
//! | `pubsub://`                     | Pub/Sub   | not yet available                 |

mod config;
pub mod error;
#[cfg(feature = "kafka")]
mod kafka;
#[cfg(feature = "mock")]
mod memory;
mod reader;
mod registry;
#[cfg(feature = "sqs")]
mod sqs;

pub use crate::config::{DEFAULT_MAX_MESSAGES, QueueConfig, QueueKind, is_queue_url};
#[cfg(feature = "kafka")]
pub use crate::kafka::{KafkaFactory, KafkaReader};
#[cfg(feature = "mock")]
pub use crate::memory::MemoryReader;
pub use crate::reader::{Message, MessageQueueReader};
pub use crate::registry::{ReaderFactory, Registry};
#[cfg(feature = "sqs")]
pub use crate::sqs::{SqsFactory, SqsReader};
