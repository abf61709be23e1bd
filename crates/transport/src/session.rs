//! Per-tenant ownership of the live transport connection.
//!
//! Each tenant gets one slot guarded by its own lock and one supervisor task.
//! The supervisor connects, pumps events, classifies closures and reconnects.
//! A previous handle is always closed before a new one is requested, so two
//! handles for the same tenant never deliver events at the same time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use roomservice_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use roomservice_core::config::TransportConfig;
use roomservice_core::domain::tenant::{SessionStatus, Tenant, TenantId};
use roomservice_core::errors::FailureKind;
use roomservice_core::messages::OutboundMessage;
use roomservice_core::retry::RetryPolicy;
use roomservice_db::repositories::{CredentialRepository, RepositoryError};

use crate::display::PairingDisplay;
use crate::events::{CloseDisposition, CloseReason, EventContext, InboundHandler, TransportEvent};
use crate::outbound::{OutboundSender, SendPolicy};
use crate::transport::{Transport, TransportError, TransportHandle};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential store failed: {0}")]
    Credentials(#[from] RepositoryError),
    #[error("tenant `{tenant_id}` session closed fatally: {reason}")]
    Fatal { tenant_id: String, reason: String },
    #[error("tenant `{tenant_id}` gave up after {attempts} reconnect attempts")]
    RetriesExhausted { tenant_id: String, attempts: u32 },
    #[error("tenant `{0}` has no session")]
    UnknownTenant(String),
    #[error("session supervisor stopped unexpectedly: {0}")]
    Supervisor(String),
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Credentials(_) => FailureKind::PersistenceFailure,
            Self::Fatal { .. } => FailureKind::TransportFatal,
            Self::RetriesExhausted { .. } | Self::UnknownTenant(_) | Self::Supervisor(_) => {
                FailureKind::TransportTransient
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSettings {
    pub reconnect: RetryPolicy,
    pub send: SendPolicy,
}

impl SessionSettings {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self { reconnect: config.reconnect_policy(), send: SendPolicy::from_config(config) }
    }
}

#[derive(Default)]
struct TenantSlot {
    status: SessionStatus,
    handle: Option<Arc<dyn TransportHandle>>,
    pairing_challenge: Option<String>,
    supervisor: Option<JoinHandle<Result<(), SessionError>>>,
}

impl TenantSlot {
    fn is_supervised(&self) -> bool {
        self.supervisor.as_ref().is_some_and(|task| !task.is_finished())
    }
}

type SharedSlot = Arc<Mutex<TenantSlot>>;

struct SessionInner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialRepository>,
    display: Arc<dyn PairingDisplay>,
    audit: Arc<dyn AuditSink>,
    settings: SessionSettings,
    slots: RwLock<HashMap<TenantId, SharedSlot>>,
}

#[derive(Clone)]
pub struct SessionLifecycleManager {
    inner: Arc<SessionInner>,
}

impl SessionLifecycleManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialRepository>,
        display: Arc<dyn PairingDisplay>,
        audit: Arc<dyn AuditSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                credentials,
                display,
                audit,
                settings,
                slots: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Starts supervising the tenant's connection. A tenant that is already
    /// supervised keeps its current connection.
    pub async fn activate(&self, tenant: Tenant, handler: Arc<dyn InboundHandler>) {
        let slot = {
            let mut slots = self.inner.slots.write().await;
            Arc::clone(slots.entry(tenant.id.clone()).or_default())
        };

        let mut guard = slot.lock().await;
        if guard.is_supervised() {
            debug!(tenant_id = %tenant.id, "session already active; keeping current connection");
            return;
        }

        if let Some(handle) = guard.handle.take() {
            close_handle(&tenant.id, handle).await;
        }
        guard.status = SessionStatus::Connecting;

        info!(event_name = "session.activated", tenant_id = %tenant.id, "activating tenant session");
        let inner = Arc::clone(&self.inner);
        let task_slot = Arc::clone(&slot);
        guard.supervisor = Some(tokio::spawn(async move {
            inner.supervise(tenant, task_slot, handler).await
        }));
    }

    /// Tears the session down and forgets the tenant's stored credentials.
    pub async fn logout(&self, tenant_id: &TenantId) -> Result<(), SessionError> {
        let slot = self
            .inner
            .slot(tenant_id)
            .await
            .ok_or_else(|| SessionError::UnknownTenant(tenant_id.0.clone()))?;

        {
            let mut guard = slot.lock().await;
            guard.status = SessionStatus::Destroying;
            stop_supervisor(&mut guard).await;
            if let Some(handle) = guard.handle.take() {
                close_handle(tenant_id, handle).await;
            }
            guard.pairing_challenge = None;
            self.inner.credentials.clear(tenant_id).await?;
            guard.status = SessionStatus::Disconnected;
        }

        self.inner.slots.write().await.remove(tenant_id);
        self.inner.display.clear_pairing_challenge(tenant_id);
        info!(event_name = "session.logged_out", tenant_id = %tenant_id, "tenant session logged out");
        self.inner.audit(tenant_id, "session.logged_out", AuditOutcome::Success, &[]);
        Ok(())
    }

    /// Closes every connection and keeps stored credentials for the next start.
    pub async fn shutdown(&self) {
        let slots: Vec<(TenantId, SharedSlot)> = self
            .inner
            .slots
            .read()
            .await
            .iter()
            .map(|(tenant_id, slot)| (tenant_id.clone(), Arc::clone(slot)))
            .collect();

        for (tenant_id, slot) in slots {
            let mut guard = slot.lock().await;
            guard.status = SessionStatus::Destroying;
            stop_supervisor(&mut guard).await;
            if let Some(handle) = guard.handle.take() {
                close_handle(&tenant_id, handle).await;
            }
            guard.status = SessionStatus::Disconnected;
            info!(event_name = "session.shutdown", tenant_id = %tenant_id, "tenant session closed");
        }
    }

    /// Waits for the tenant's supervisor to stop and returns how it ended.
    pub async fn join(&self, tenant_id: &TenantId) -> Result<(), SessionError> {
        let slot = self
            .inner
            .slot(tenant_id)
            .await
            .ok_or_else(|| SessionError::UnknownTenant(tenant_id.0.clone()))?;
        let task = slot.lock().await.supervisor.take();
        match task {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(error) if error.is_cancelled() => Ok(()),
                Err(error) => Err(SessionError::Supervisor(error.to_string())),
            },
            None => Ok(()),
        }
    }

    pub async fn status(&self, tenant_id: &TenantId) -> SessionStatus {
        match self.inner.slot(tenant_id).await {
            Some(slot) => slot.lock().await.status,
            None => SessionStatus::Disconnected,
        }
    }

    pub async fn statuses(&self) -> Vec<(TenantId, SessionStatus)> {
        let slots: Vec<(TenantId, SharedSlot)> = self
            .inner
            .slots
            .read()
            .await
            .iter()
            .map(|(tenant_id, slot)| (tenant_id.clone(), Arc::clone(slot)))
            .collect();

        let mut statuses = Vec::with_capacity(slots.len());
        for (tenant_id, slot) in slots {
            statuses.push((tenant_id, slot.lock().await.status));
        }
        statuses.sort_by(|left, right| left.0.cmp(&right.0));
        statuses
    }
}

#[async_trait]
impl OutboundSender for SessionLifecycleManager {
    /// Resolves the live handle on every attempt, so a send issued during a
    /// reconnect lands on the new connection once it is up.
    async fn send(
        &self,
        tenant_id: &TenantId,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let inner = self.inner.as_ref();
        inner
            .settings
            .send
            .run(target, || async move {
                let handle = inner.live_handle(tenant_id).await?;
                handle.send(target, message).await
            })
            .await
    }
}

impl SessionInner {
    async fn slot(&self, tenant_id: &TenantId) -> Option<SharedSlot> {
        self.slots.read().await.get(tenant_id).cloned()
    }

    async fn live_handle(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let slot =
            self.slot(tenant_id).await.ok_or_else(|| TransportError::NotConnected(tenant_id.0.clone()))?;
        let guard = slot.lock().await;
        match (&guard.handle, guard.status) {
            (Some(handle), SessionStatus::Connected) => Ok(Arc::clone(handle)),
            _ => Err(TransportError::NotConnected(tenant_id.0.clone())),
        }
    }

    async fn supervise(
        &self,
        tenant: Tenant,
        slot: SharedSlot,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<(), SessionError> {
        let result = self.connection_loop(&tenant, &slot, handler.as_ref()).await;
        if let Err(error) = &result {
            self.detach(&tenant.id, &slot).await;
            slot.lock().await.status = SessionStatus::Disconnected;
            self.display.report_failure(&tenant.id, error.kind(), &error.to_string());
            self.audit(
                &tenant.id,
                "session.failed",
                AuditOutcome::Failed,
                &[("failure", error.kind().as_str().to_owned()), ("error", error.to_string())],
            );
        }
        result
    }

    async fn connection_loop(
        &self,
        tenant: &Tenant,
        slot: &SharedSlot,
        handler: &dyn InboundHandler,
    ) -> Result<(), SessionError> {
        let policy = &self.settings.reconnect;
        let mut failures: u32 = 0;
        let mut reauthenticating = false;

        loop {
            self.detach(&tenant.id, slot).await;
            slot.lock().await.status = if reauthenticating {
                SessionStatus::Reauthenticating
            } else {
                SessionStatus::Connecting
            };

            let stored = self.credentials.load(&tenant.id).await?;
            info!(
                event_name = "session.transport.connecting",
                tenant_id = %tenant.id,
                attempt = failures,
                has_credentials = stored.is_some(),
                "opening transport connection"
            );

            let reason = match self.transport.connect(tenant, stored).await {
                Ok(handle) => {
                    slot.lock().await.handle = Some(Arc::clone(&handle));
                    self.pump(tenant, slot, handle.as_ref(), handler, &mut failures).await
                }
                Err(error) if error.kind() == FailureKind::TransportFatal => {
                    return Err(SessionError::Fatal {
                        tenant_id: tenant.id.0.clone(),
                        reason: error.to_string(),
                    });
                }
                Err(error) => {
                    warn!(
                        event_name = "session.transport.connect_failed",
                        tenant_id = %tenant.id,
                        attempt = failures,
                        max_retries = policy.max_retries,
                        error = %error,
                        "transport connect failed"
                    );
                    CloseReason::ConnectionLost
                }
            };

            let disposition = reason.disposition();
            info!(
                event_name = "session.transport.closed",
                tenant_id = %tenant.id,
                reason = %reason,
                disposition = ?disposition,
                "transport connection closed"
            );
            self.audit(
                &tenant.id,
                "session.closed",
                match disposition {
                    CloseDisposition::Reconnect => AuditOutcome::Success,
                    CloseDisposition::Reauthenticate => AuditOutcome::Rejected,
                    CloseDisposition::Fatal => AuditOutcome::Failed,
                },
                &[("reason", reason.to_string()), ("disposition", format!("{disposition:?}"))],
            );

            match disposition {
                CloseDisposition::Fatal => {
                    return Err(SessionError::Fatal {
                        tenant_id: tenant.id.0.clone(),
                        reason: reason.to_string(),
                    });
                }
                CloseDisposition::Reauthenticate => {
                    self.credentials.clear(&tenant.id).await?;
                    reauthenticating = true;
                    self.display.report_failure(
                        &tenant.id,
                        FailureKind::TransportFatal,
                        &reason.to_string(),
                    );
                    warn!(
                        event_name = "session.credentials.cleared",
                        tenant_id = %tenant.id,
                        reason = %reason,
                        "stored credentials invalidated; a fresh pairing is required"
                    );
                }
                CloseDisposition::Reconnect => {}
            }

            if failures >= policy.max_retries {
                warn!(
                    event_name = "session.transport.retries_exhausted",
                    tenant_id = %tenant.id,
                    max_retries = policy.max_retries,
                    "reconnect attempts exhausted; session stays down"
                );
                return Err(SessionError::RetriesExhausted {
                    tenant_id: tenant.id.0.clone(),
                    attempts: failures.saturating_add(1),
                });
            }

            let delay = policy.backoff(failures);
            failures = failures.saturating_add(1);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Drives one handle until it closes and returns the reported reason.
    async fn pump(
        &self,
        tenant: &Tenant,
        slot: &SharedSlot,
        handle: &dyn TransportHandle,
        handler: &dyn InboundHandler,
        failures: &mut u32,
    ) -> CloseReason {
        loop {
            let event = match handle.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => return CloseReason::ConnectionClosed,
                Err(error) => {
                    warn!(
                        event_name = "session.transport.receive_failed",
                        tenant_id = %tenant.id,
                        error = %error,
                        "transport read failed"
                    );
                    return CloseReason::ConnectionLost;
                }
            };
            debug!(tenant_id = %tenant.id, event = event.name(), "transport event");

            match event {
                TransportEvent::PairingChallenge(challenge) => {
                    slot.lock().await.pairing_challenge = Some(challenge.clone());
                    self.display.show_pairing_challenge(&tenant.id, &challenge);
                }
                TransportEvent::CredentialsUpdated(credentials) => {
                    match self.credentials.save(&tenant.id, credentials).await {
                        Ok(()) => debug!(
                            event_name = "session.credentials.saved",
                            tenant_id = %tenant.id,
                            "transport credentials persisted"
                        ),
                        Err(error) => warn!(
                            event_name = "session.credentials.save_failed",
                            tenant_id = %tenant.id,
                            error = %error,
                            "failed to persist transport credentials"
                        ),
                    }
                }
                TransportEvent::Ready => {
                    let had_challenge = {
                        let mut guard = slot.lock().await;
                        guard.status = SessionStatus::Connected;
                        guard.pairing_challenge.take().is_some()
                    };
                    if had_challenge {
                        self.display.clear_pairing_challenge(&tenant.id);
                    }
                    *failures = 0;
                    info!(
                        event_name = "session.transport.connected",
                        tenant_id = %tenant.id,
                        "transport session connected"
                    );
                    self.audit(&tenant.id, "session.connected", AuditOutcome::Success, &[]);
                }
                TransportEvent::Closed(reason) => return reason,
                TransportEvent::MessageReceived(message) => {
                    let context = EventContext { correlation_id: message.message_id.clone() };
                    debug!(
                        event_name = "ingress.message.received",
                        tenant_id = %tenant.id,
                        guest_id = %message.sender,
                        correlation_id = %context.correlation_id,
                        "received inbound message"
                    );
                    if let Err(error) = handler.handle(tenant, message, &context).await {
                        warn!(
                            event_name = "ingress.message.handler_failed",
                            tenant_id = %tenant.id,
                            correlation_id = %context.correlation_id,
                            error = %error,
                            "inbound handling failed; continuing session loop"
                        );
                    }
                }
            }
        }
    }

    async fn detach(&self, tenant_id: &TenantId, slot: &SharedSlot) {
        let previous = slot.lock().await.handle.take();
        if let Some(handle) = previous {
            close_handle(tenant_id, handle).await;
        }
    }

    fn audit(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
        outcome: AuditOutcome,
        metadata: &[(&str, String)],
    ) {
        let context = AuditContext::new(
            Some(tenant_id.clone()),
            None,
            format!("session:{tenant_id}"),
            "session-manager",
        );
        let event = metadata.iter().fold(
            context.event(event_type, AuditCategory::Session, outcome),
            |event, (key, value)| event.with_metadata(*key, value.clone()),
        );
        self.audit.emit(event);
    }
}

async fn stop_supervisor(slot: &mut TenantSlot) {
    if let Some(task) = slot.supervisor.take() {
        task.abort();
        // The task may be parked on this slot's lock; cancellation drops that wait.
        let _ = task.await;
    }
}

async fn close_handle(tenant_id: &TenantId, handle: Arc<dyn TransportHandle>) {
    if let Err(error) = handle.close().await {
        warn!(
            event_name = "session.transport.close_failed",
            tenant_id = %tenant_id,
            error = %error,
            "failed to close transport handle"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use roomservice_core::audit::InMemoryAuditSink;
    use roomservice_core::domain::tenant::{Credentials, SessionStatus, Tenant, TenantId};
    use roomservice_core::errors::FailureKind;
    use roomservice_core::messages::OutboundMessage;
    use roomservice_core::retry::RetryPolicy;
    use roomservice_db::repositories::{CredentialRepository, InMemoryCredentialRepository};

    use super::{SessionError, SessionLifecycleManager, SessionSettings};
    use crate::display::PairingDisplay;
    use crate::events::{
        CloseReason, EventContext, HandlerError, InboundHandler, InboundMessage, TransportEvent,
    };
    use crate::outbound::{OutboundSender, SendPolicy};
    use crate::transport::{Transport, TransportError, TransportHandle};

    type Log = Arc<StdMutex<Vec<String>>>;

    fn push(log: &Log, entry: String) {
        log.lock().expect("log lock").push(entry);
    }

    struct ScriptedHandle {
        id: usize,
        events: Mutex<VecDeque<TransportEvent>>,
        sent: Mutex<Vec<(String, String)>>,
        log: Log,
    }

    #[async_trait]
    impl TransportHandle for ScriptedHandle {
        async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError> {
            let next = self.events.lock().await.pop_front();
            match next {
                Some(event) => Ok(Some(event)),
                None => std::future::pending().await,
            }
        }

        async fn send(
            &self,
            target: &str,
            message: &OutboundMessage,
        ) -> Result<(), TransportError> {
            self.sent.lock().await.push((target.to_owned(), message.fallback_text()));
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            push(&self.log, format!("close#{}", self.id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedState {
        connects: VecDeque<Result<Vec<TransportEvent>, TransportError>>,
        seen_credentials: Vec<Option<String>>,
        handles: Vec<Arc<ScriptedHandle>>,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
        log: Log,
    }

    impl ScriptedTransport {
        fn with_script(connects: Vec<Result<Vec<TransportEvent>, TransportError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState { connects: connects.into(), ..Default::default() }),
                log: Log::default(),
            }
        }

        async fn seen_credentials(&self) -> Vec<Option<String>> {
            self.state.lock().await.seen_credentials.clone()
        }

        async fn handle(&self, index: usize) -> Arc<ScriptedHandle> {
            Arc::clone(&self.state.lock().await.handles[index])
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().expect("log lock").clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &self,
            _tenant: &Tenant,
            credentials: Option<Credentials>,
        ) -> Result<Arc<dyn TransportHandle>, TransportError> {
            let mut state = self.state.lock().await;
            state.seen_credentials.push(credentials.map(|credentials| credentials.expose().to_owned()));
            let id = state.seen_credentials.len();
            push(&self.log, format!("connect#{id}"));

            let events = state.connects.pop_front().unwrap_or(Ok(Vec::new()))?;
            let handle = Arc::new(ScriptedHandle {
                id,
                events: Mutex::new(events.into()),
                sent: Mutex::new(Vec::new()),
                log: Arc::clone(&self.log),
            });
            state.handles.push(Arc::clone(&handle));
            Ok(handle)
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        entries: StdMutex<Vec<String>>,
    }

    impl RecordingDisplay {
        fn entries(&self) -> Vec<String> {
            self.entries.lock().expect("display lock").clone()
        }
    }

    impl PairingDisplay for RecordingDisplay {
        fn show_pairing_challenge(&self, _tenant_id: &TenantId, challenge: &str) {
            self.entries.lock().expect("display lock").push(format!("show:{challenge}"));
        }

        fn clear_pairing_challenge(&self, _tenant_id: &TenantId) {
            self.entries.lock().expect("display lock").push("clear".to_owned());
        }

        fn report_failure(&self, _tenant_id: &TenantId, kind: FailureKind, _detail: &str) {
            self.entries.lock().expect("display lock").push(format!("failure:{}", kind.as_str()));
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle(
            &self,
            tenant: &Tenant,
            message: InboundMessage,
            context: &EventContext,
        ) -> Result<(), HandlerError> {
            self.seen.lock().await.push((
                tenant.id.0.clone(),
                context.correlation_id.clone(),
                message.text,
            ));
            Ok(())
        }
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        credentials: Arc<InMemoryCredentialRepository>,
        display: Arc<RecordingDisplay>,
        audit: InMemoryAuditSink,
        manager: SessionLifecycleManager,
    }

    fn harness(connects: Vec<Result<Vec<TransportEvent>, TransportError>>) -> Harness {
        let transport = Arc::new(ScriptedTransport::with_script(connects));
        let credentials = Arc::new(InMemoryCredentialRepository::default());
        let display = Arc::new(RecordingDisplay::default());
        let audit = InMemoryAuditSink::default();
        let settings = SessionSettings {
            reconnect: RetryPolicy::immediate(3),
            send: SendPolicy {
                attempts: 2,
                timeout: Duration::from_millis(200),
                backoff: RetryPolicy::immediate(2),
            },
        };
        let manager = SessionLifecycleManager::new(
            transport.clone(),
            credentials.clone(),
            display.clone(),
            Arc::new(audit.clone()),
            settings,
        );
        Harness { transport, credentials, display, audit, manager }
    }

    fn tenant() -> Tenant {
        Tenant::new("hotel-a", "Hotel A", "919800000099")
    }

    fn closed(reason: &str) -> TransportEvent {
        TransportEvent::Closed(CloseReason::parse(reason))
    }

    async fn wait_for_status(manager: &SessionLifecycleManager, status: SessionStatus) {
        let tenant_id = tenant().id;
        for _ in 0..500 {
            if manager.status(&tenant_id).await == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("session never reached {status:?}");
    }

    #[tokio::test]
    async fn connection_lost_reconnects_with_the_same_credentials() {
        let h = harness(vec![
            Ok(vec![TransportEvent::Ready, closed("connectionLost")]),
            Ok(vec![TransportEvent::Ready, closed("scriptEnded")]),
        ]);
        h.credentials.save(&tenant().id, Credentials::new("blob-v1")).await.expect("seed");

        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;
        let error = h.manager.join(&tenant().id).await.expect_err("script ends fatally");

        assert!(matches!(error, SessionError::Fatal { .. }));
        assert_eq!(
            h.transport.seen_credentials().await,
            vec![Some("blob-v1".to_owned()), Some("blob-v1".to_owned())]
        );
        assert!(h.credentials.contains(&tenant().id).await, "transient loss keeps credentials");
        assert_eq!(h.transport.log(), vec!["connect#1", "close#1", "connect#2", "close#2"]);
        assert_eq!(h.manager.status(&tenant().id).await, SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn logged_out_clears_credentials_and_pairs_again() {
        let h = harness(vec![
            Ok(vec![TransportEvent::Ready, closed("loggedOut")]),
            Ok(vec![
                TransportEvent::PairingChallenge("qr-2".to_owned()),
                TransportEvent::CredentialsUpdated(Credentials::new("blob-v2")),
                TransportEvent::Ready,
                closed("scriptEnded"),
            ]),
        ]);
        h.credentials.save(&tenant().id, Credentials::new("blob-v1")).await.expect("seed");

        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;
        let _ = h.manager.join(&tenant().id).await;

        assert_eq!(
            h.transport.seen_credentials().await,
            vec![Some("blob-v1".to_owned()), None],
            "second connect must not reuse the logged-out credentials"
        );
        assert_eq!(
            h.display.entries(),
            vec!["failure:transport_fatal", "show:qr-2", "clear", "failure:transport_fatal"]
        );
        let stored = h.credentials.load(&tenant().id).await.expect("load").expect("re-paired");
        assert_eq!(stored.expose(), "blob-v2");
        assert!(h.audit.event_types().contains(&"session.closed".to_owned()));
    }

    #[tokio::test]
    async fn bad_session_is_reported_as_fatal_while_pairing_continues() {
        let h = harness(vec![
            Ok(vec![TransportEvent::Ready, closed("badSession")]),
            Ok(vec![TransportEvent::PairingChallenge("qr-3".to_owned())]),
        ]);
        h.credentials.save(&tenant().id, Credentials::new("blob-v1")).await.expect("seed");

        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;
        for _ in 0..500 {
            if h.display.entries().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(h.display.entries(), vec!["failure:transport_fatal", "show:qr-3"]);
        assert!(!h.credentials.contains(&tenant().id).await);
        h.manager.shutdown().await;
    }

    #[tokio::test]
    async fn inbound_messages_reach_the_handler_with_correlation_ids() {
        let h = harness(vec![Ok(vec![
            TransportEvent::Ready,
            TransportEvent::MessageReceived(InboundMessage::direct("wamid-1", "919800000001", "hi")),
            closed("scriptEnded"),
        ])]);
        let handler = Arc::new(RecordingHandler::default());

        h.manager.activate(tenant(), handler.clone()).await;
        let _ = h.manager.join(&tenant().id).await;

        assert_eq!(
            handler.seen.lock().await.clone(),
            vec![("hotel-a".to_owned(), "wamid-1".to_owned(), "hi".to_owned())]
        );
    }

    #[tokio::test]
    async fn connect_failures_exhaust_the_retry_budget() {
        let h = harness(
            (0..4).map(|n| Err(TransportError::Connect(format!("dns-{n}")))).collect(),
        );

        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;
        let error = h.manager.join(&tenant().id).await.expect_err("retries exhausted");

        assert!(matches!(error, SessionError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(error.kind(), FailureKind::TransportTransient);
        assert_eq!(h.transport.seen_credentials().await.len(), 4);
        assert_eq!(h.display.entries(), vec!["failure:transport_transient"]);
    }

    #[tokio::test]
    async fn sends_use_the_live_handle_and_logout_tears_it_down() {
        let h = harness(vec![Ok(vec![TransportEvent::Ready])]);
        h.credentials.save(&tenant().id, Credentials::new("blob-v1")).await.expect("seed");

        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;
        wait_for_status(&h.manager, SessionStatus::Connected).await;

        h.manager
            .send(&tenant().id, "919800000001", &OutboundMessage::text("Welcome!"))
            .await
            .expect("send");
        let handle = h.transport.handle(0).await;
        assert_eq!(
            handle.sent.lock().await.clone(),
            vec![("919800000001".to_owned(), "Welcome!".to_owned())]
        );

        h.manager.logout(&tenant().id).await.expect("logout");
        assert!(!h.credentials.contains(&tenant().id).await);
        assert_eq!(h.transport.log(), vec!["connect#1", "close#1"]);
        assert_eq!(h.manager.status(&tenant().id).await, SessionStatus::Disconnected);

        let error = h
            .manager
            .send(&tenant().id, "919800000001", &OutboundMessage::text("late"))
            .await
            .expect_err("no session");
        assert!(matches!(error, TransportError::NotConnected(_)));
    }

    #[tokio::test]
    async fn activating_twice_keeps_a_single_connection() {
        let h = harness(vec![Ok(vec![TransportEvent::Ready])]);

        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;
        wait_for_status(&h.manager, SessionStatus::Connected).await;
        h.manager.activate(tenant(), Arc::new(RecordingHandler::default())).await;

        assert_eq!(h.transport.seen_credentials().await.len(), 1);
        assert_eq!(
            h.manager.statuses().await,
            vec![(TenantId("hotel-a".to_owned()), SessionStatus::Connected)]
        );

        h.manager.shutdown().await;
        assert_eq!(h.transport.log(), vec!["connect#1", "close#1"]);
        assert_eq!(h.manager.status(&tenant().id).await, SessionStatus::Disconnected);
    }
}
