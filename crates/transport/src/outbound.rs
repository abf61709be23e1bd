use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use roomservice_core::config::TransportConfig;
use roomservice_core::domain::tenant::TenantId;
use roomservice_core::errors::FailureKind;
use roomservice_core::messages::OutboundMessage;
use roomservice_core::retry::RetryPolicy;

use crate::transport::{TransportError, TransportHandle};

/// Sends through whichever connection currently serves the tenant.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(
        &self,
        tenant_id: &TenantId,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<(), TransportError>;
}

/// Bounded attempts, each capped by a timeout, so a send never hangs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: RetryPolicy,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self { attempts: 3, timeout: Duration::from_secs(10), backoff: RetryPolicy::default() }
    }
}

impl SendPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            attempts: config.send_attempts,
            timeout: config.send_timeout(),
            backoff: config.reconnect_policy(),
        }
    }

    pub async fn deliver(
        &self,
        handle: &dyn TransportHandle,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        self.run(target, || handle.send(target, message)).await
    }

    /// Runs `attempt` under the policy's bounds, retrying transient failures.
    /// A timed-out attempt may still have been delivered, so it is reported
    /// without a retry.
    pub async fn run<F, Fut>(&self, target: &str, mut attempt: F) -> Result<(), TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), TransportError>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_error = TransportError::Send("no attempt made".to_owned());

        for index in 0..attempts {
            let error = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(error)) if error.kind() == FailureKind::TransportFatal => return Err(error),
                Ok(Err(error)) => error,
                Err(_) => {
                    warn!(
                        event_name = "egress.message.send_timed_out",
                        target,
                        attempt = index,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "outbound send outcome unknown; not retried"
                    );
                    return Err(TransportError::Timeout(self.timeout));
                }
            };

            warn!(
                event_name = "egress.message.send_failed",
                target,
                attempt = index,
                attempts,
                error = %error,
                "outbound send attempt failed"
            );
            last_error = error;

            if index + 1 < attempts {
                let delay = self.backoff.backoff(index);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub tenant_id: TenantId,
    pub target: String,
    pub message: OutboundMessage,
}

/// Captures sends in memory; targets can be marked as failing.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    failing_targets: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn fail_target(&self, target: impl Into<String>) {
        let mut failing = match self.failing_targets.lock() {
            Ok(failing) => failing,
            Err(poisoned) => poisoned.into_inner(),
        };
        failing.insert(target.into());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Plain-text bodies delivered to `target`, in send order.
    pub fn texts_to(&self, target: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.target == target)
            .map(|sent| sent.message.fallback_text())
            .collect()
    }
}

#[async_trait]
impl OutboundSender for RecordingSender {
    async fn send(
        &self,
        tenant_id: &TenantId,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let failing = match self.failing_targets.lock() {
            Ok(failing) => failing.contains(target),
            Err(poisoned) => poisoned.into_inner().contains(target),
        };
        if failing {
            return Err(TransportError::Send(format!("target `{target}` unreachable")));
        }

        let mut sent = match self.sent.lock() {
            Ok(sent) => sent,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(SentMessage {
            tenant_id: tenant_id.clone(),
            target: target.to_owned(),
            message: message.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use roomservice_core::messages::OutboundMessage;
    use roomservice_core::retry::RetryPolicy;

    use super::SendPolicy;
    use crate::events::TransportEvent;
    use crate::transport::{TransportError, TransportHandle};

    enum Step {
        Fail(TransportError),
        Hang,
        Succeed,
    }

    struct StepHandle {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<usize>,
    }

    impl StepHandle {
        fn new(steps: Vec<Step>) -> Self {
            Self { steps: Mutex::new(steps.into()), calls: Mutex::new(0) }
        }

        async fn calls(&self) -> usize {
            *self.calls.lock().await
        }
    }

    #[async_trait]
    impl TransportHandle for StepHandle {
        async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError> {
            Ok(None)
        }

        async fn send(
            &self,
            _target: &str,
            _message: &OutboundMessage,
        ) -> Result<(), TransportError> {
            *self.calls.lock().await += 1;
            let step = self.steps.lock().await.pop_front().unwrap_or(Step::Succeed);
            match step {
                Step::Fail(error) => Err(error),
                Step::Hang => std::future::pending().await,
                Step::Succeed => Ok(()),
            }
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn policy(attempts: u32) -> SendPolicy {
        SendPolicy {
            attempts,
            timeout: Duration::from_millis(50),
            backoff: RetryPolicy::immediate(attempts),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let handle = StepHandle::new(vec![
            Step::Fail(TransportError::Send("socket reset".to_owned())),
            Step::Succeed,
        ]);

        policy(3)
            .deliver(&handle, "919800000001", &OutboundMessage::text("hi"))
            .await
            .expect("second attempt succeeds");
        assert_eq!(handle.calls().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_send_is_not_sent_again() {
        let handle = StepHandle::new(vec![Step::Hang, Step::Succeed]);

        let error = policy(3)
            .deliver(&handle, "919800000001", &OutboundMessage::text("hi"))
            .await
            .expect_err("outcome of the hung attempt is unknown");
        assert_eq!(error, TransportError::Timeout(Duration::from_millis(50)));
        assert_eq!(handle.calls().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_after_a_failed_attempt_still_stops() {
        let handle = StepHandle::new(vec![
            Step::Fail(TransportError::Send("socket reset".to_owned())),
            Step::Hang,
            Step::Succeed,
        ]);

        let error = policy(3)
            .deliver(&handle, "919800000001", &OutboundMessage::text("hi"))
            .await
            .expect_err("second attempt hangs");
        assert!(matches!(error, TransportError::Timeout(_)));
        assert_eq!(handle.calls().await, 2);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let handle =
            StepHandle::new(vec![Step::Fail(TransportError::Unauthorized("revoked".to_owned()))]);

        let error = policy(5)
            .deliver(&handle, "919800000001", &OutboundMessage::text("hi"))
            .await
            .expect_err("fatal");
        assert!(matches!(error, TransportError::Unauthorized(_)));
        assert_eq!(handle.calls().await, 1);
    }
}
