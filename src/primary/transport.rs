use crate::ledger::Seq;
use crate::wire::{ReplicateRequest, ReplicateResponse};
use bytes::Bytes;
use std::time::Duration;

/// A successful `replicate` RPC as observed by the primary.
///
/// `duplicate` means the secondary already had this seq. The dispatcher treats
/// it the same as a fresh apply: the entry is safely on the other side and the
/// queue may advance.
#[derive(Debug, Copy, Clone)]
pub struct ReplicateAck {
    pub duplicate: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("secondary unreachable: {0}")]
    Unreachable(String),
    #[error("secondary returned status {0}")]
    Status(u16),
    #[error("secondary returned an unreadable body: {0}")]
    BadResponse(String),
}

/// The seam between the primary and one secondary. Production talks HTTP via
/// [`HttpSecondaryClient`]; tests wire this to an in-process store.
#[async_trait::async_trait]
pub trait SecondaryTransport: Send + Sync + 'static {
    async fn replicate(&self, seq: Seq, payload: Bytes) -> Result<ReplicateAck, TransportError>;

    async fn probe_health(&self) -> Result<(), TransportError>;
}

/// HTTP client for one secondary's `/replicate` and `/health` endpoints.
pub struct HttpSecondaryClient {
    base_url: String,
    client: reqwest::Client,
    replicate_timeout: Duration,
    health_timeout: Duration,
}

impl HttpSecondaryClient {
    pub fn new(
        base_url: impl Into<String>,
        replicate_timeout: Duration,
        health_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        Ok(HttpSecondaryClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            replicate_timeout,
            health_timeout,
        })
    }
}

#[async_trait::async_trait]
impl SecondaryTransport for HttpSecondaryClient {
    async fn replicate(&self, seq: Seq, payload: Bytes) -> Result<ReplicateAck, TransportError> {
        let request = ReplicateRequest {
            msg: String::from_utf8_lossy(&payload).into_owned(),
            seq: seq.val(),
        };

        let response = self
            .client
            .post(format!("{}/replicate", self.base_url))
            .timeout(self.replicate_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: ReplicateResponse = response
            .json()
            .await
            .map_err(|e| TransportError::BadResponse(e.to_string()))?;

        Ok(ReplicateAck {
            duplicate: body.duplicate,
        })
    }

    async fn probe_health(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(())
    }
}
