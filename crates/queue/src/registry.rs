//! Reader registry.
//!
//! Dispatch is a lookup in a map of factories, so adding a backend is a
//! single [`Registry::register`] call and never touches this module.

use crate::config::{QueueConfig, QueueKind};
use crate::error::{ErrorKind, Result};
use crate::reader::MessageQueueReader;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tracing::instrument;

/// Builds a reader for a parsed queue connection.
///
/// Plain closures work as factories:
///
/// ```
/// use dataql_queue::{QueueKind, Registry};
/// use dataql_queue::error::{ErrorKind, Result};
/// use dataql_queue::{MessageQueueReader, QueueConfig};
///
/// let mut registry = Registry::new();
/// registry.register(QueueKind::Pulsar, |config: &QueueConfig| -> Result<Box<dyn MessageQueueReader>> {
///     exn::bail!(ErrorKind::Configuration(format!("no broker for {}", config.resource)))
/// });
/// assert!(registry.is_registered(QueueKind::Pulsar));
/// ```
#[async_trait]
pub trait ReaderFactory: Send + Sync {
    async fn create(&self, config: &QueueConfig) -> Result<Box<dyn MessageQueueReader>>;
}

#[async_trait]
impl<F> ReaderFactory for F
where
    F: Fn(&QueueConfig) -> Result<Box<dyn MessageQueueReader>> + Send + Sync,
{
    async fn create(&self, config: &QueueConfig) -> Result<Box<dyn MessageQueueReader>> {
        (self)(config)
    }
}

/// Queue type to reader factory.
///
/// Construct one at startup and hand it to whatever opens queues; there is
/// no global registry.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<QueueKind, Arc<dyn ReaderFactory>>,
}

impl Registry {
    /// An empty registry. Every queue type fails to open.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every reader compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "sqs")]
        registry.register(QueueKind::Sqs, crate::sqs::SqsFactory);
        #[cfg(feature = "kafka")]
        registry.register(QueueKind::Kafka, crate::kafka::KafkaFactory);
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register(&mut self, kind: QueueKind, factory: impl ReaderFactory + 'static) -> &mut Self {
        if self.factories.insert(kind, Arc::new(factory)).is_some() {
            tracing::debug!(%kind, "replaced queue reader factory");
        }
        self
    }

    pub fn is_registered(&self, kind: QueueKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Registered queue types, in a stable order.
    pub fn kinds(&self) -> Vec<QueueKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Open a reader for `config`.
    ///
    /// Unregistered types fail with [`ErrorKind::NotRegistered`] when a reader
    /// exists but was not compiled in or registered, and with
    /// [`ErrorKind::NotYetAvailable`] when no reader exists at all.
    #[instrument(skip(self, config), fields(kind = %config.kind, resource = %config.resource))]
    pub async fn new_reader(&self, config: &QueueConfig) -> Result<Box<dyn MessageQueueReader>> {
        if let Some(factory) = self.factories.get(&config.kind) {
            return factory.create(config).await;
        }
        match config.kind.package() {
            Some(package) => exn::bail!(ErrorKind::NotRegistered { kind: config.kind, package }),
            None => exn::bail!(ErrorKind::NotYetAvailable(config.kind)),
        }
    }

    /// Parse a connection URL and open a reader for it.
    pub async fn new_reader_from_url(&self, url: &str) -> Result<Box<dyn MessageQueueReader>> {
        let config = QueueConfig::from_url(url)?;
        self.new_reader(&config).await
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Registry").field("kinds", &self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Message;
    use rstest::rstest;

    struct Fixed(QueueKind, String);

    #[async_trait]
    impl MessageQueueReader for Fixed {
        fn kind(&self) -> QueueKind {
            self.0
        }

        fn resource(&self) -> &str {
            &self.1
        }

        async fn peek(&self, max: usize) -> Result<Vec<Message>> {
            Ok((0..max.min(2)).map(|i| Message::new(i.to_string(), "{}")).collect())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn fixed(config: &QueueConfig) -> Result<Box<dyn MessageQueueReader>> {
        Ok(Box::new(Fixed(config.kind, config.resource.clone())))
    }

    #[tokio::test]
    async fn test_sqs_without_factory_names_package() {
        let err = Registry::new().new_reader_from_url("sqs://queue?region=us-east-1").await.err().unwrap();
        assert_eq!(*err, ErrorKind::NotRegistered { kind: QueueKind::Sqs, package: "dataql-queue/sqs" });
        assert!(err.to_string().contains("dataql-queue/sqs"));
    }

    #[rstest]
    #[case("rabbitmq://localhost/orders", QueueKind::RabbitMq)]
    #[case("amqp://localhost/orders", QueueKind::RabbitMq)]
    #[case("pulsar://localhost:6650/events", QueueKind::Pulsar)]
    #[case("pubsub://project/subscription", QueueKind::PubSub)]
    #[tokio::test]
    async fn test_placeholders_are_not_yet_available(#[case] url: &str, #[case] kind: QueueKind) {
        let err = Registry::with_defaults().new_reader_from_url(url).await.err().unwrap();
        assert_eq!(*err, ErrorKind::NotYetAvailable(kind));
    }

    #[tokio::test]
    async fn test_kafka_without_factory_names_package() {
        let err = Registry::new().new_reader_from_url("kafka://broker:9092/events").await.err().unwrap();
        assert_eq!(*err, ErrorKind::NotRegistered { kind: QueueKind::Kafka, package: "dataql-queue/kafka" });
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn test_defaults_include_kafka() {
        assert!(Registry::with_defaults().is_registered(QueueKind::Kafka));
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_unsupported() {
        let err = Registry::with_defaults().new_reader_from_url("mqtt://broker/t").await.err().unwrap();
        assert_eq!(*err, ErrorKind::Unsupported("mqtt".to_string()));
    }

    #[tokio::test]
    async fn test_registered_factory_is_used() {
        let mut registry = Registry::new();
        registry.register(QueueKind::Pulsar, fixed);
        assert!(registry.is_registered(QueueKind::Pulsar));
        assert_eq!(registry.kinds(), vec![QueueKind::Pulsar]);

        let reader = registry.new_reader_from_url("pulsar://localhost:6650/events").await.unwrap();
        assert_eq!(reader.kind(), QueueKind::Pulsar);
        assert_eq!(reader.resource(), "events");
        assert_eq!(reader.peek(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_registration_is_order_independent() {
        let mut a = Registry::new();
        a.register(QueueKind::Kafka, fixed).register(QueueKind::Sqs, fixed);
        let mut b = Registry::new();
        b.register(QueueKind::Sqs, fixed).register(QueueKind::Kafka, fixed);
        assert_eq!(a.kinds(), b.kinds());
    }
}
