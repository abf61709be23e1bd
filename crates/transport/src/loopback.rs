//! In-process transport for local simulation and end-to-end tests.
//!
//! The controller plays the part of the messaging network: it injects guest
//! messages or closures into a tenant's current connection and collects
//! everything the assistant sends back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use roomservice_core::domain::tenant::{Credentials, Tenant, TenantId};
use roomservice_core::messages::OutboundMessage;

use crate::events::{CloseReason, InboundMessage, TransportEvent};
use crate::transport::{Transport, TransportError, TransportHandle};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopbackDelivery {
    pub tenant_id: TenantId,
    pub target: String,
    pub message: OutboundMessage,
}

type Connections = Arc<StdMutex<HashMap<TenantId, mpsc::UnboundedSender<TransportEvent>>>>;

pub struct LoopbackTransport {
    connections: Connections,
    outbox: mpsc::UnboundedSender<LoopbackDelivery>,
}

pub struct LoopbackController {
    connections: Connections,
    outbox: Mutex<mpsc::UnboundedReceiver<LoopbackDelivery>>,
}

impl LoopbackTransport {
    pub fn new() -> (Self, LoopbackController) {
        let connections = Connections::default();
        let (outbox, deliveries) = mpsc::unbounded_channel();
        (
            Self { connections: Arc::clone(&connections), outbox },
            LoopbackController { connections, outbox: Mutex::new(deliveries) },
        )
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        tenant: &Tenant,
        _credentials: Option<Credentials>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let (events, receiver) = mpsc::unbounded_channel();
        events
            .send(TransportEvent::Ready)
            .map_err(|_| TransportError::Connect("loopback channel closed".to_owned()))?;

        let mut connections = match self.connections.lock() {
            Ok(connections) => connections,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Replacing the sender ends the previous handle's event stream.
        connections.insert(tenant.id.clone(), events);

        Ok(Arc::new(LoopbackHandle {
            tenant_id: tenant.id.clone(),
            events: Mutex::new(receiver),
            outbox: self.outbox.clone(),
        }))
    }
}

struct LoopbackHandle {
    tenant_id: TenantId,
    events: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    outbox: mpsc::UnboundedSender<LoopbackDelivery>,
}

#[async_trait]
impl TransportHandle for LoopbackHandle {
    async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError> {
        Ok(self.events.lock().await.recv().await)
    }

    async fn send(&self, target: &str, message: &OutboundMessage) -> Result<(), TransportError> {
        self.outbox
            .send(LoopbackDelivery {
                tenant_id: self.tenant_id.clone(),
                target: target.to_owned(),
                message: message.clone(),
            })
            .map_err(|_| TransportError::Send("loopback controller dropped".to_owned()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.events.lock().await.close();
        Ok(())
    }
}

impl LoopbackController {
    pub fn deliver(&self, tenant_id: &TenantId, message: InboundMessage) -> Result<(), TransportError> {
        self.push(tenant_id, TransportEvent::MessageReceived(message))
    }

    pub fn close(&self, tenant_id: &TenantId, reason: CloseReason) -> Result<(), TransportError> {
        self.push(tenant_id, TransportEvent::Closed(reason))
    }

    pub async fn next_delivery(&self) -> Option<LoopbackDelivery> {
        self.outbox.lock().await.recv().await
    }

    /// Deliveries already queued, without waiting for more.
    pub async fn drain(&self) -> Vec<LoopbackDelivery> {
        let mut outbox = self.outbox.lock().await;
        let mut deliveries = Vec::new();
        while let Ok(delivery) = outbox.try_recv() {
            deliveries.push(delivery);
        }
        deliveries
    }

    fn push(&self, tenant_id: &TenantId, event: TransportEvent) -> Result<(), TransportError> {
        let connections = match self.connections.lock() {
            Ok(connections) => connections,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sender = connections
            .get(tenant_id)
            .ok_or_else(|| TransportError::NotConnected(tenant_id.0.clone()))?;
        sender.send(event).map_err(|_| TransportError::NotConnected(tenant_id.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use roomservice_core::domain::tenant::Tenant;
    use roomservice_core::messages::OutboundMessage;

    use super::LoopbackTransport;
    use crate::events::{InboundMessage, TransportEvent};
    use crate::transport::{Transport, TransportError};

    #[tokio::test]
    async fn injected_messages_and_replies_flow_through_the_handle() {
        let (transport, controller) = LoopbackTransport::new();
        let tenant = Tenant::new("hotel-a", "Hotel A", "admin");
        let handle = transport.connect(&tenant, None).await.expect("connect");

        assert_eq!(handle.next_event().await.expect("ready"), Some(TransportEvent::Ready));
        controller
            .deliver(&tenant.id, InboundMessage::direct("m-1", "guest-1", "hi"))
            .expect("deliver");
        let Some(TransportEvent::MessageReceived(message)) =
            handle.next_event().await.expect("event")
        else {
            panic!("expected an inbound message");
        };
        assert_eq!(message.text, "hi");

        handle.send("guest-1", &OutboundMessage::text("Welcome")).await.expect("send");
        let delivery = controller.next_delivery().await.expect("delivery");
        assert_eq!(delivery.target, "guest-1");
        assert_eq!(delivery.message.fallback_text(), "Welcome");
    }

    #[tokio::test]
    async fn reconnecting_ends_the_previous_stream() {
        let (transport, controller) = LoopbackTransport::new();
        let tenant = Tenant::new("hotel-a", "Hotel A", "admin");

        let first = transport.connect(&tenant, None).await.expect("connect");
        let _ = first.next_event().await;
        let _second = transport.connect(&tenant, None).await.expect("reconnect");

        assert_eq!(first.next_event().await.expect("closed stream"), None);
        assert!(controller.drain().await.is_empty());
    }

    #[test]
    fn delivering_to_an_unknown_tenant_fails() {
        let (_transport, controller) = LoopbackTransport::new();
        let error = controller
            .deliver(
                &roomservice_core::domain::tenant::TenantId("ghost".to_owned()),
                InboundMessage::direct("m-1", "guest-1", "hi"),
            )
            .expect_err("no connection");
        assert!(matches!(error, TransportError::NotConnected(_)));
    }
}
