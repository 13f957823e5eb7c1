//! Downstream publishers.
//!
//! The relay addresses a downstream notification channel by an externally
//! configured channel identifier and access credential. Each publish carries
//! the `(error, details)` pair unchanged: the committed event and any
//! delivery error observed for it are orthogonal fields, and neither is ever
//! dropped.

use async_trait::async_trait;
use custody_core::TransitionEvent;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// The message forwarded downstream for one observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel identifier the message is addressed to.
    pub channel: String,
    /// Delivery error observed for this event, if any.
    pub error: Option<String>,
    /// The committed transition event.
    pub details: TransitionEvent,
}

/// Publish failure.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("publish rejected: {reason}")]
    Rejected { reason: String },
}

/// A downstream publish target.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError>;
}

#[async_trait]
impl Publisher for Box<dyn Publisher> {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        (**self).publish(envelope).await
    }
}

/// On-the-wire message: the envelope plus the channel credential.
#[derive(Serialize)]
struct WireMessage<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    message: WirePayload<'a>,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    error: &'a Option<String>,
    details: &'a TransitionEvent,
}

/// Publishes newline-delimited JSON messages over TCP.
///
/// The connection is established lazily and dropped on any write failure;
/// the next publish reconnects. Retrying is the relay's job.
pub struct TcpPublisher {
    addr: SocketAddr,
    access_token: Option<String>,
    conn: Mutex<Option<BufWriter<TcpStream>>>,
}

impl TcpPublisher {
    pub fn new(addr: SocketAddr, access_token: Option<String>) -> Self {
        Self {
            addr,
            access_token,
            conn: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Publisher for TcpPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(&WireMessage {
            channel: &envelope.channel,
            token: self.access_token.as_deref(),
            message: WirePayload {
                error: &envelope.error,
                details: &envelope.details,
            },
        })?;
        line.push(b'\n');

        let mut conn = self.conn.lock().await;
        let mut writer = match conn.take() {
            Some(writer) => writer,
            None => BufWriter::new(TcpStream::connect(self.addr).await?),
        };

        let result = async {
            writer.write_all(&line).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                *conn = Some(writer);
                Ok(())
            }
            // The broken connection is dropped; the next attempt reconnects.
            Err(e) => Err(e.into()),
        }
    }
}

/// Logs envelopes instead of sending them anywhere.
///
/// The default target when no downstream address is configured.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let payload = serde_json::to_string(envelope)?;
        tracing::info!(channel = %envelope.channel, %payload, "event published");
        Ok(())
    }
}

/// Records envelopes in memory, with optional failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    inner: std::sync::Arc<MemoryPublisherInner>,
}

#[derive(Debug, Default)]
struct MemoryPublisherInner {
    published: parking_lot::Mutex<Vec<Envelope>>,
    fail_remaining: std::sync::atomic::AtomicUsize,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` publish calls fail.
    pub fn fail_times(&self, n: usize) {
        self.inner
            .fail_remaining
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns everything published so far.
    pub fn published(&self) -> Vec<Envelope> {
        self.inner.published.lock().clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let remaining = &self.inner.fail_remaining;
        if remaining
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| n.checked_sub(1),
            )
            .is_ok()
        {
            return Err(PublishError::Rejected {
                reason: "injected failure".to_string(),
            });
        }
        self.inner.published.lock().push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{EventKind, PackageId, ShipmentStatus};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    fn sample_envelope(error: Option<String>) -> Envelope {
        Envelope {
            channel: "custody-events".to_string(),
            error,
            details: TransitionEvent {
                kind: EventKind::Departed,
                package_id: PackageId::from("1"),
                previous_status: ShipmentStatus::Created,
                new_status: ShipmentStatus::Departed,
                location: "San Francisco".to_string(),
                custodian: "Tommy from Shipping Co.".to_string(),
                timestamp: 1518549958,
                transaction_ref: Uuid::new_v4(),
            },
        }
    }

    #[tokio::test]
    async fn test_memory_publisher_records_and_fails() {
        let publisher = MemoryPublisher::new();
        publisher.fail_times(1);

        let envelope = sample_envelope(None);
        let err = publisher.publish(&envelope).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { .. }));
        assert!(publisher.published().is_empty());

        publisher.publish(&envelope).await.unwrap();
        assert_eq!(publisher.published(), vec![envelope]);
    }

    #[tokio::test]
    async fn test_tcp_publisher_sends_wire_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        let publisher = TcpPublisher::new(addr, Some("secret".to_string()));
        publisher
            .publish(&sample_envelope(Some("previous attempt timed out".to_string())))
            .await
            .unwrap();

        let line = server.await.unwrap();
        let wire: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(wire["channel"], "custody-events");
        assert_eq!(wire["token"], "secret");
        assert_eq!(wire["message"]["error"], "previous attempt timed out");
        assert_eq!(wire["message"]["details"]["kind"], "departed");
        assert_eq!(wire["message"]["details"]["package_id"], "1");
    }

    #[tokio::test]
    async fn test_tcp_publisher_fails_without_listener() {
        let publisher = TcpPublisher::new("127.0.0.1:1".parse().unwrap(), None);
        let err = publisher.publish(&sample_envelope(None)).await.unwrap_err();
        assert!(matches!(err, PublishError::Io(_)));
    }
}
