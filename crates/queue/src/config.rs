use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use url::Url;

/// Messages returned by a peek when the URL does not say otherwise.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// A message queue backend, selected by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueKind {
    /// Amazon SQS (`sqs://`)
    Sqs,
    /// Apache Kafka (`kafka://`)
    Kafka,
    /// RabbitMQ (`rabbitmq://`, `amqp://`, `amqps://`)
    RabbitMq,
    /// Apache Pulsar (`pulsar://`)
    Pulsar,
    /// Google Cloud Pub/Sub (`pubsub://`)
    PubSub,
}

impl QueueKind {
    pub const ALL: [QueueKind; 5] = [Self::Sqs, Self::Kafka, Self::RabbitMq, Self::Pulsar, Self::PubSub];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqs => "sqs",
            Self::Kafka => "kafka",
            Self::RabbitMq => "rabbitmq",
            Self::Pulsar => "pulsar",
            Self::PubSub => "pubsub",
        }
    }

    /// Map a URL scheme to a queue type.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "sqs" => Some(Self::Sqs),
            "kafka" => Some(Self::Kafka),
            "rabbitmq" | "amqp" | "amqps" => Some(Self::RabbitMq),
            "pulsar" => Some(Self::Pulsar),
            "pubsub" => Some(Self::PubSub),
            _ => None,
        }
    }

    /// What has to be compiled in (or registered) to read this queue type.
    ///
    /// `None` means no reader exists for the type yet.
    #[must_use]
    pub fn package(&self) -> Option<&'static str> {
        match self {
            Self::Sqs => Some("dataql-queue/sqs"),
            Self::Kafka => Some("dataql-queue/kafka"),
            Self::RabbitMq | Self::Pulsar | Self::PubSub => None,
        }
    }
}

impl Display for QueueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_scheme(s).ok_or_else(|| ErrorKind::Unsupported(s.to_string()).into())
    }
}

/// Whether `reference` looks like a queue connection URL (`sqs://…`, `kafka://…`).
///
/// ```
/// assert!(dataql_queue::is_queue_url("sqs://orders?region=eu-west-1"));
/// assert!(!dataql_queue::is_queue_url("https://example.com/data.csv"));
/// assert!(!dataql_queue::is_queue_url("data.csv"));
/// ```
pub fn is_queue_url(reference: &str) -> bool {
    reference
        .split_once("://")
        .is_some_and(|(scheme, _)| QueueKind::from_scheme(scheme).is_some())
}

/// A parsed queue connection.
///
/// Built from URLs such as `sqs://my-queue?region=us-east-1&max_messages=5`
/// or `kafka://broker:9092/events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Host, with the port when one was given.
    pub host: String,
    /// Queue, topic or subscription: the URL path, or the host when the path is empty.
    pub resource: String,
    pub max_messages: usize,
    pub region: Option<String>,
    /// Every other query parameter.
    pub options: BTreeMap<String, String>,
}

impl QueueConfig {
    pub fn new(kind: QueueKind, resource: impl Into<String>) -> Self {
        Self {
            kind,
            host: String::new(),
            resource: resource.into(),
            max_messages: DEFAULT_MAX_MESSAGES,
            region: None,
            options: BTreeMap::new(),
        }
    }

    /// Parse a queue connection URL.
    pub fn from_url(input: &str) -> Result<Self> {
        Self::from_url_with_max(input, DEFAULT_MAX_MESSAGES)
    }

    /// Parse a queue connection URL, using `max_messages` when the URL does not set it.
    pub fn from_url_with_max(input: &str, max_messages: usize) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| ErrorKind::InvalidUrl(format!("{input}: {e}")))?;
        let kind = QueueKind::from_scheme(url.scheme()).ok_or_else(|| ErrorKind::Unsupported(url.scheme().to_string()))?;

        let mut host = url.host_str().unwrap_or_default().to_string();
        if let Some(port) = url.port() {
            host = format!("{host}:{port}");
        }
        let path = url.path().trim_matches('/');
        let resource = if path.is_empty() { host.clone() } else { path.to_string() };
        if resource.is_empty() {
            exn::bail!(ErrorKind::InvalidUrl(format!("{input}: no queue or topic named")));
        }

        let mut config = Self { host, resource, max_messages, ..Self::new(kind, String::new()) };
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "max_messages" => config.max_messages = parse_max_messages(&value)?,
                "region" => config.region = Some(value.into_owned()),
                _ => {
                    config.options.insert(name.into_owned(), value.into_owned());
                },
            }
        }
        Ok(config)
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

fn parse_max_messages(value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => exn::bail!(ErrorKind::InvalidOption { name: "max_messages".to_string(), value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sqs", Some(QueueKind::Sqs))]
    #[case("kafka", Some(QueueKind::Kafka))]
    #[case("rabbitmq", Some(QueueKind::RabbitMq))]
    #[case("amqp", Some(QueueKind::RabbitMq))]
    #[case("amqps", Some(QueueKind::RabbitMq))]
    #[case("pulsar", Some(QueueKind::Pulsar))]
    #[case("pubsub", Some(QueueKind::PubSub))]
    #[case("SQS", Some(QueueKind::Sqs))]
    #[case("https", None)]
    fn test_from_scheme(#[case] scheme: &str, #[case] expected: Option<QueueKind>) {
        assert_eq!(QueueKind::from_scheme(scheme), expected);
    }

    #[test]
    fn test_sqs_url_with_region() {
        let config = QueueConfig::from_url("sqs://orders?region=us-east-1").unwrap();
        assert_eq!(config.kind, QueueKind::Sqs);
        assert_eq!(config.host, "orders");
        assert_eq!(config.resource, "orders");
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.max_messages, DEFAULT_MAX_MESSAGES);
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_path_becomes_resource() {
        let config = QueueConfig::from_url("kafka://broker:9092/events?max_messages=3&group=debug").unwrap();
        assert_eq!(config.kind, QueueKind::Kafka);
        assert_eq!(config.host, "broker:9092");
        assert_eq!(config.resource, "events");
        assert_eq!(config.max_messages, 3);
        assert_eq!(config.option("group"), Some("debug"));
    }

    #[test]
    fn test_default_max_messages_is_overridable() {
        let config = QueueConfig::from_url_with_max("sqs://orders", 50).unwrap();
        assert_eq!(config.max_messages, 50);
        let config = QueueConfig::from_url_with_max("sqs://orders?max_messages=2", 50).unwrap();
        assert_eq!(config.max_messages, 2);
    }

    #[rstest]
    #[case("0")]
    #[case("-1")]
    #[case("ten")]
    fn test_invalid_max_messages(#[case] value: &str) {
        let err = QueueConfig::from_url(&format!("sqs://orders?max_messages={value}")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidOption { name, .. } if name == "max_messages"));
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        let err = QueueConfig::from_url("mqtt://broker/topic").unwrap_err();
        assert_eq!(*err, ErrorKind::Unsupported("mqtt".to_string()));
    }

    #[test]
    fn test_not_a_url() {
        let err = QueueConfig::from_url("orders").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUrl(_)));
    }

    #[test]
    fn test_is_queue_url() {
        assert!(is_queue_url("amqp://guest@localhost/orders"));
        assert!(is_queue_url("pubsub://project/subscription"));
        assert!(!is_queue_url("s3://bucket/key.csv"));
        assert!(!is_queue_url("/tmp/sqs://odd"));
    }
}
