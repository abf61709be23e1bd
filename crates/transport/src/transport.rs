use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use roomservice_core::domain::tenant::{Credentials, Tenant};
use roomservice_core::errors::FailureKind;
use roomservice_core::messages::OutboundMessage;

use crate::events::TransportEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport send timed out after {0:?}")]
    Timeout(Duration),
    #[error("tenant `{0}` has no live transport session")]
    NotConnected(String),
    #[error("transport rejected credentials: {0}")]
    Unauthorized(String),
    #[error("transport close failed: {0}")]
    Close(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthorized(_) => FailureKind::TransportFatal,
            _ => FailureKind::TransportTransient,
        }
    }
}

/// One live connection for one tenant.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// `Ok(None)` means the event stream ended without a close reason.
    async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError>;
    async fn send(&self, target: &str, message: &OutboundMessage) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        tenant: &Tenant,
        credentials: Option<Credentials>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError>;
}

/// Connects instantly, reports ready once, then stays quiet.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn connect(
        &self,
        tenant: &Tenant,
        _credentials: Option<Credentials>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        debug!(tenant_id = %tenant.id, "noop transport connected");
        Ok(Arc::new(NoopHandle::default()))
    }
}

#[derive(Default)]
struct NoopHandle {
    announced: AtomicBool,
}

#[async_trait]
impl TransportHandle for NoopHandle {
    async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError> {
        if !self.announced.swap(true, Ordering::SeqCst) {
            return Ok(Some(TransportEvent::Ready));
        }
        std::future::pending().await
    }

    async fn send(&self, target: &str, message: &OutboundMessage) -> Result<(), TransportError> {
        debug!(target, body = %message.fallback_text(), "noop transport dropped outbound message");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use roomservice_core::domain::tenant::Tenant;
    use roomservice_core::errors::FailureKind;

    use super::{NoopTransport, Transport, TransportError};
    use crate::events::TransportEvent;

    #[tokio::test]
    async fn noop_transport_reports_ready_once() {
        let tenant = Tenant::new("hotel-a", "Hotel A", "admin");
        let handle = NoopTransport.connect(&tenant, None).await.expect("connect");

        assert_eq!(handle.next_event().await.expect("event"), Some(TransportEvent::Ready));
        let second =
            tokio::time::timeout(std::time::Duration::from_millis(20), handle.next_event()).await;
        assert!(second.is_err(), "noop transport stays idle after ready");
    }

    #[test]
    fn only_rejected_credentials_are_fatal() {
        assert_eq!(
            TransportError::Unauthorized("revoked".to_owned()).kind(),
            FailureKind::TransportFatal
        );
        assert_eq!(
            TransportError::Connect("dns".to_owned()).kind(),
            FailureKind::TransportTransient
        );
    }
}
