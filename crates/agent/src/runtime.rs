//! Inbound message handling for every tenant.
//!
//! `AgentRuntime` is the transport's `InboundHandler`. Accepted messages pass
//! the guard and the deduplicator, then queue behind earlier messages from the
//! same guest. Each guest queue is drained by one worker task, so a guest's
//! turns never overlap while different guests proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use roomservice_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use roomservice_core::config::ConversationConfig;
use roomservice_core::dedup::MessageDeduplicator;
use roomservice_core::domain::conversation::{ConversationKey, GuestConversation, GuestId};
use roomservice_core::domain::menu::MenuCatalog;
use roomservice_core::domain::order::OrderId;
use roomservice_core::domain::tenant::{Tenant, TenantId};
use roomservice_core::flows::{
    CheckoutResult, FlowAction, FlowContext, FlowEngine, RoomCapturePolicy, RoomServiceFlow,
};
use roomservice_core::messages::OutboundMessage;
use roomservice_db::OrderRepository;
use roomservice_transport::{EventContext, HandlerError, InboundHandler, InboundMessage, OutboundSender};

use crate::conversation::{IntentParser, PriorState};
use crate::guardrails::{GuardDecision, InboundGuard};
use crate::menus::MenuSnapshots;
use crate::pipeline::{OrderPipeline, PipelineSettings};
use crate::scheduler::{PromptFire, RatingPromptScheduler};
use crate::store::ConversationStore;

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub dedup_capacity: usize,
    pub dedup_retention: Duration,
    pub rating_prompt_delay: Duration,
    pub idle_expiry: chrono::Duration,
    pub room_capture: RoomCapturePolicy,
    pub currency_symbol: String,
    pub guard: InboundGuard,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&roomservice_core::config::AppConfig::default().conversation)
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &ConversationConfig) -> Self {
        Self {
            dedup_capacity: config.dedup_capacity,
            dedup_retention: Duration::from_secs(config.dedup_retention_secs),
            rating_prompt_delay: Duration::from_secs(config.rating_prompt_delay_secs),
            idle_expiry: chrono::Duration::seconds(
                i64::try_from(config.idle_expiry_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000),
            ),
            room_capture: config.room_capture_policy,
            currency_symbol: config.currency_symbol.clone(),
            guard: InboundGuard::default(),
        }
    }
}

struct Job {
    tenant: Tenant,
    key: ConversationKey,
    correlation_id: String,
    text: String,
}

struct RuntimeInner {
    settings: RuntimeSettings,
    dedup: MessageDeduplicator,
    parser: IntentParser,
    engine: FlowEngine<RoomServiceFlow>,
    store: ConversationStore,
    menus: Arc<MenuSnapshots>,
    pipeline: OrderPipeline,
    scheduler: RatingPromptScheduler,
    sender: Arc<dyn OutboundSender>,
    audit: Arc<dyn AuditSink>,
    queues: StdMutex<HashMap<ConversationKey, mpsc::UnboundedSender<Job>>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
}

impl AgentRuntime {
    pub fn new(
        menus: Arc<MenuSnapshots>,
        orders: Arc<dyn OrderRepository>,
        sender: Arc<dyn OutboundSender>,
        audit: Arc<dyn AuditSink>,
        settings: RuntimeSettings,
    ) -> Self {
        let pipeline = OrderPipeline::new(
            orders,
            Arc::clone(&sender),
            Arc::clone(&audit),
            PipelineSettings {
                currency_symbol: settings.currency_symbol.clone(),
                ..PipelineSettings::default()
            },
        );

        Self {
            inner: Arc::new(RuntimeInner {
                dedup: MessageDeduplicator::new(settings.dedup_capacity, settings.dedup_retention),
                parser: IntentParser::new(),
                engine: FlowEngine::default(),
                store: ConversationStore::new(),
                menus,
                pipeline,
                scheduler: RatingPromptScheduler::new(),
                sender,
                audit,
                queues: StdMutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                settings,
            }),
        }
    }

    pub fn menus(&self) -> &MenuSnapshots {
        &self.inner.menus
    }

    pub async fn conversation(
        &self,
        tenant_id: &TenantId,
        guest_id: &str,
    ) -> Option<GuestConversation> {
        let key = ConversationKey::new(tenant_id.clone(), GuestId(guest_id.to_owned()));
        self.inner.store.snapshot(&key).await
    }

    /// Resolves once every accepted message has been fully handled.
    pub async fn settle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drops conversations idle past the configured expiry.
    pub async fn evict_idle(&self) -> usize {
        let evicted =
            self.inner.store.evict_idle(Utc::now(), self.inner.settings.idle_expiry).await;
        if evicted > 0 {
            let remaining = self.inner.store.len().await;
            info!(
                event_name = "conversation.store.evicted",
                evicted,
                remaining,
                "evicted idle conversations"
            );
        }
        evicted
    }

    /// Cancels pending rating prompts; used on shutdown.
    pub fn stop_timers(&self) {
        self.inner.scheduler.cancel_all();
    }
}

#[async_trait]
impl InboundHandler for AgentRuntime {
    async fn handle(
        &self,
        tenant: &Tenant,
        message: InboundMessage,
        context: &EventContext,
    ) -> Result<(), HandlerError> {
        let text = match self.inner.settings.guard.evaluate(tenant, &message) {
            GuardDecision::Accept { text } => text,
            GuardDecision::Drop { reason } => {
                debug!(
                    event_name = "ingress.message.dropped",
                    correlation_id = %context.correlation_id,
                    tenant_id = %tenant.id,
                    reason = reason.reason_code(),
                    "inbound message dropped"
                );
                return Ok(());
            }
        };

        // Identifiers are only unique per transport account.
        let dedup_key = format!("{}/{}", tenant.id, message.message_id);
        if !self.inner.dedup.check_and_insert(&dedup_key) {
            info!(
                event_name = "ingress.message.duplicate",
                correlation_id = %context.correlation_id,
                tenant_id = %tenant.id,
                guest_id = %message.sender,
                "duplicate delivery ignored"
            );
            return Ok(());
        }

        let key = ConversationKey::new(tenant.id.clone(), GuestId(message.sender));
        self.inner.enqueue(Job {
            tenant: tenant.clone(),
            key,
            correlation_id: context.correlation_id.clone(),
            text,
        });
        Ok(())
    }
}

impl RuntimeInner {
    fn enqueue(self: &Arc<Self>, job: Job) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let mut queues = lock(&self.queues);

        let job = match queues.get(&job.key) {
            Some(queue) => match queue.send(job) {
                Ok(()) => return,
                Err(returned) => returned.0,
            },
            None => job,
        };

        let key = job.key.clone();
        let (queue, jobs) = mpsc::unbounded_channel();
        if queue.send(job).is_err() {
            self.finish_job();
            return;
        }
        queues.insert(key.clone(), queue);
        tokio::spawn(Arc::clone(self).drain(key, jobs));
    }

    async fn drain(self: Arc<Self>, key: ConversationKey, mut jobs: mpsc::UnboundedReceiver<Job>) {
        loop {
            let next = match jobs.try_recv() {
                Ok(job) => Some(job),
                Err(_) => {
                    // Re-check under the map lock so a concurrent enqueue either
                    // lands here or starts a new worker.
                    let mut queues = lock(&self.queues);
                    let job = jobs.try_recv().ok();
                    if job.is_none() {
                        queues.remove(&key);
                    }
                    job
                }
            };
            let Some(job) = next else { return };

            self.process(job).await;
            self.finish_job();
        }
    }

    fn finish_job(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn process(self: &Arc<Self>, job: Job) {
        let Job { tenant, key, correlation_id, text } = job;
        let now = Utc::now();
        let audit = AuditContext::for_conversation(&key, &correlation_id, key.guest_id.0.clone());

        let catalog = match self.menus.current(&tenant.id).await {
            Ok(catalog) => catalog,
            Err(error) => {
                warn!(
                    event_name = "menu.catalog.load_failed",
                    correlation_id = %correlation_id,
                    tenant_id = %tenant.id,
                    error = %error,
                    "menu unavailable; parsing without catalog"
                );
                Arc::new(MenuCatalog::empty())
            }
        };

        let entry = self.store.entry(&key, now).await;
        let mut conversation = entry.lock().await;

        let parsed = self.parser.parse(&text, PriorState::of(&conversation), &catalog);
        let context = FlowContext {
            tenant: &tenant,
            catalog: &catalog,
            currency_symbol: &self.settings.currency_symbol,
            room_capture: self.settings.room_capture,
            now,
        };
        let outcome =
            self.engine.apply_with_audit(&conversation, &parsed, &context, self.audit.as_ref(), &audit);
        info!(
            event_name = "conversation.transition.applied",
            correlation_id = %correlation_id,
            tenant_id = %tenant.id,
            guest_id = %key.guest_id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            intent = ?parsed.intent,
            items = parsed.items.len(),
            "conversation transition applied"
        );

        *conversation = outcome.conversation;
        self.reply(&key, &outcome.replies, &correlation_id).await;

        let mut actions: VecDeque<FlowAction> = outcome.actions.into();
        while let Some(action) = actions.pop_front() {
            match action {
                FlowAction::PlaceOrder => {
                    let result = match self.pipeline.place(&tenant, &conversation, &audit, now).await {
                        Ok(placed) => CheckoutResult::Placed {
                            order_id: placed.order.id,
                            guest_notified: placed.guest_notified,
                            admin_notified: placed.admin_notified,
                        },
                        Err(error) => CheckoutResult::Failed(error.kind()),
                    };
                    match self.engine.complete_checkout(&conversation, &result, &context) {
                        Ok(next) => {
                            *conversation = next.conversation;
                            self.reply(&key, &next.replies, &correlation_id).await;
                            actions.extend(next.actions);
                        }
                        Err(error) => warn!(
                            event_name = "conversation.checkout.invalid",
                            correlation_id = %correlation_id,
                            tenant_id = %tenant.id,
                            guest_id = %key.guest_id,
                            error = %error,
                            "checkout result could not be applied"
                        ),
                    }
                }
                FlowAction::ScheduleRatingPrompt { order_id } => {
                    let target: Arc<dyn PromptFire> = Arc::clone(self) as Arc<dyn PromptFire>;
                    self.scheduler.schedule(
                        key.clone(),
                        order_id,
                        self.settings.rating_prompt_delay,
                        target,
                    );
                }
                FlowAction::CancelRatingPrompt => {
                    self.scheduler.cancel(&key);
                }
                FlowAction::ForwardRating { order_id, rating } => {
                    self.pipeline
                        .forward_rating(
                            &tenant,
                            &order_id,
                            conversation.room_number.as_deref(),
                            rating,
                            &audit,
                        )
                        .await;
                }
                FlowAction::ResetConversation => {
                    self.audit.emit(audit.event(
                        "conversation.reset",
                        AuditCategory::Conversation,
                        AuditOutcome::Success,
                    ));
                }
            }
        }
    }

    /// Sends one transition's replies in order. A failed send is logged and
    /// the remaining replies still go out.
    async fn reply(&self, key: &ConversationKey, replies: &[OutboundMessage], correlation_id: &str) {
        for message in replies {
            if let Err(error) = self.sender.send(&key.tenant_id, &key.guest_id.0, message).await {
                warn!(
                    event_name = "egress.reply.failed",
                    correlation_id = %correlation_id,
                    tenant_id = %key.tenant_id,
                    guest_id = %key.guest_id,
                    error = %error,
                    "reply could not be delivered"
                );
            }
        }
    }
}

#[async_trait]
impl PromptFire for RuntimeInner {
    async fn fire(&self, key: ConversationKey, order_id: OrderId) {
        let Some(entry) = self.store.get(&key).await else {
            return;
        };
        let mut conversation = entry.lock().await;
        let Some(outcome) = self.engine.rating_prompt_due(&conversation, &order_id) else {
            debug!(
                event_name = "conversation.rating_prompt.stale",
                tenant_id = %key.tenant_id,
                guest_id = %key.guest_id,
                order_id = %order_id,
                "rating prompt no longer relevant"
            );
            return;
        };

        *conversation = outcome.conversation;
        let correlation_id = format!("rating-prompt:{order_id}");
        self.reply(&key, &outcome.replies, &correlation_id).await;
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
