//! The external event broker seam.
//!
//! Upstream producers (log ingestion, alert evaluation, upload tracking)
//! publish `{channel, body}` pairs to a broker and never learn about
//! subscribers. The bridge consumes the broker through [`BrokerSource`];
//! [`ChannelBroker`] is the in-process implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// A raw message from the broker, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Channel the producer published to.
    pub channel: String,
    /// Raw JSON body.
    pub body: String,
}

/// Errors from the broker connection.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not subscribe to the broker.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// A subscribable source of raw broker messages.
///
/// Implementations must produce a stream that ends when the broker
/// connection is lost; the bridge resubscribes with backoff.
#[async_trait]
pub trait BrokerSource: Send + Sync {
    /// Open a subscription covering every channel.
    async fn subscribe(&self) -> Result<BoxStream<'static, BrokerMessage>, BrokerError>;
}

/// In-process broker over `tokio::sync::broadcast`.
pub struct ChannelBroker {
    tx: broadcast::Sender<BrokerMessage>,
}

impl ChannelBroker {
    /// Create a broker holding up to `capacity` undelivered messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Handle for producers.
    #[must_use]
    pub fn publisher(&self) -> BrokerPublisher {
        BrokerPublisher {
            tx: self.tx.clone(),
        }
    }
}

impl Default for ChannelBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl BrokerSource for ChannelBroker {
    async fn subscribe(&self) -> Result<BoxStream<'static, BrokerMessage>, BrokerError> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|result| async move {
            match result {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %e, "broker subscriber lagged");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Producer handle for the in-process broker.
#[derive(Clone)]
pub struct BrokerPublisher {
    tx: broadcast::Sender<BrokerMessage>,
}

impl BrokerPublisher {
    /// Publish a raw body to a channel. Returns the subscriber count, zero
    /// when nobody is listening (the message is discarded, by contract).
    pub fn publish(&self, channel: impl Into<String>, body: impl Into<String>) -> usize {
        self.tx
            .send(BrokerMessage {
                channel: channel.into(),
                body: body.into(),
            })
            .unwrap_or(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let broker = ChannelBroker::new(16);
        let mut stream = broker.subscribe().await.unwrap();
        let publisher = broker.publisher();
        let receivers = publisher.publish("logs:realtime", r#"{"message":"hi"}"#);
        assert_eq!(receivers, 1);

        let msg = stream.next().await.unwrap();
        assert_eq!(msg.channel, "logs:realtime");
        assert_eq!(msg.body, r#"{"message":"hi"}"#);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_discarded() {
        let broker = ChannelBroker::new(16);
        let publisher = broker.publisher();
        assert_eq!(publisher.publish("logs:realtime", "{}"), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let broker = ChannelBroker::new(16);
        let mut s1 = broker.subscribe().await.unwrap();
        let mut s2 = broker.subscribe().await.unwrap();
        let _ = broker.publisher().publish("c", "body");
        assert_eq!(s1.next().await.unwrap().body, "body");
        assert_eq!(s2.next().await.unwrap().body, "body");
    }

    #[tokio::test]
    async fn stream_ends_when_broker_dropped() {
        let broker = ChannelBroker::new(16);
        let mut stream = broker.subscribe().await.unwrap();
        drop(broker);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn messages_preserve_order() {
        let broker = ChannelBroker::new(64);
        let mut stream = broker.subscribe().await.unwrap();
        let publisher = broker.publisher();
        for i in 0..10 {
            let _ = publisher.publish("c", format!("m{i}"));
        }
        for i in 0..10 {
            assert_eq!(stream.next().await.unwrap().body, format!("m{i}"));
        }
    }
}
