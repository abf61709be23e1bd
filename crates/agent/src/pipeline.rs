use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use roomservice_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use roomservice_core::domain::conversation::GuestConversation;
use roomservice_core::domain::order::{Order, OrderId};
use roomservice_core::domain::tenant::Tenant;
use roomservice_core::errors::FailureKind;
use roomservice_core::flows::replies;
use roomservice_core::messages::OutboundMessage;
use roomservice_core::retry::RetryPolicy;
use roomservice_db::{OrderRepository, RepositoryError};
use roomservice_transport::OutboundSender;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("order is incomplete: {0}")]
    IncompleteOrder(&'static str),
    #[error("order could not be persisted: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("order store did not answer within {0:?}")]
    StoreTimeout(Duration),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::IncompleteOrder(_) => FailureKind::IncompleteOrder,
            Self::Persistence(_) | Self::StoreTimeout(_) => FailureKind::PersistenceFailure,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub guest_notified: bool,
    pub admin_notified: bool,
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub persist: RetryPolicy,
    pub store_timeout: Duration,
    pub currency_symbol: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            persist: RetryPolicy { max_retries: 2, base_delay_ms: 100, max_delay_ms: 1_000 },
            store_timeout: Duration::from_secs(5),
            currency_symbol: "₹".to_owned(),
        }
    }
}

/// Human-readable ids: `ORD-<yymmddHHMMSS>-<nnn>`, unique within a process.
#[derive(Debug, Default)]
pub struct OrderIdGenerator {
    sequence: AtomicU32,
}

impl OrderIdGenerator {
    pub fn next(&self, now: DateTime<Utc>) -> OrderId {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) % 1_000;
        OrderId(format!("ORD-{}-{sequence:03}", now.format("%y%m%d%H%M%S")))
    }
}

/// Turns a confirmed cart into a durable order and tells both parties.
pub struct OrderPipeline {
    orders: Arc<dyn OrderRepository>,
    sender: Arc<dyn OutboundSender>,
    audit: Arc<dyn AuditSink>,
    ids: OrderIdGenerator,
    settings: PipelineSettings,
}

impl OrderPipeline {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        sender: Arc<dyn OutboundSender>,
        audit: Arc<dyn AuditSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self { orders, sender, audit, ids: OrderIdGenerator::default(), settings }
    }

    pub async fn place(
        &self,
        tenant: &Tenant,
        conversation: &GuestConversation,
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> Result<PlacedOrder, PipelineError> {
        let room = match conversation.room_number.as_deref() {
            Some(room) if !room.trim().is_empty() => room,
            _ => return Err(PipelineError::IncompleteOrder("room number missing")),
        };
        if conversation.cart.is_empty() {
            return Err(PipelineError::IncompleteOrder("cart is empty"));
        }

        let order = match self.persist(tenant, conversation, room, now).await {
            Ok(order) => order,
            Err(error) => {
                warn!(
                    event_name = "order.pipeline.persist_failed",
                    correlation_id = %context.correlation_id,
                    tenant_id = %tenant.id,
                    guest_id = %conversation.key.guest_id,
                    error = %error,
                    "order could not be persisted"
                );
                self.audit.emit(
                    context
                        .event("order.persist_failed", AuditCategory::Order, AuditOutcome::Failed)
                        .with_metadata("error", error.to_string()),
                );
                return Err(error);
            }
        };
        info!(
            event_name = "order.pipeline.persisted",
            correlation_id = %context.correlation_id,
            tenant_id = %tenant.id,
            guest_id = %order.guest_id,
            order_id = %order.id,
            total = order.total,
            "order persisted"
        );
        self.audit.emit(
            context
                .event("order.placed", AuditCategory::Order, AuditOutcome::Success)
                .with_metadata("order_id", order.id.0.clone())
                .with_metadata("total", order.total.to_string()),
        );

        let symbol = self.settings.currency_symbol.as_str();
        let admin_notified = self
            .notify(
                tenant,
                &tenant.admin_target,
                &replies::admin_order_summary(tenant, &order, symbol),
                context,
                "admin",
            )
            .await;
        let guest_notified = self
            .notify(
                tenant,
                &order.guest_id.0,
                &replies::guest_order_confirmation(&order, symbol),
                context,
                "guest",
            )
            .await;

        Ok(PlacedOrder { order, guest_notified, admin_notified })
    }

    /// Relays a guest's rating to the tenant admin. Returns whether it arrived.
    pub async fn forward_rating(
        &self,
        tenant: &Tenant,
        order_id: &OrderId,
        room: Option<&str>,
        rating: u8,
        context: &AuditContext,
    ) -> bool {
        self.audit.emit(
            context
                .event("order.rated", AuditCategory::Order, AuditOutcome::Success)
                .with_metadata("order_id", order_id.0.clone())
                .with_metadata("rating", rating.to_string()),
        );
        self.notify(
            tenant,
            &tenant.admin_target,
            &replies::admin_rating_notice(order_id, room, rating),
            context,
            "admin",
        )
        .await
    }

    /// Appends the order under one id across retries. After a timeout or a
    /// transient error the row may already exist, so a duplicate for that id
    /// is checked against the stored order before a fresh id is drawn.
    async fn persist(
        &self,
        tenant: &Tenant,
        conversation: &GuestConversation,
        room: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, PipelineError> {
        let policy = &self.settings.persist;
        let draft = |id| {
            Order::from_cart(
                id,
                tenant.id.clone(),
                conversation.key.guest_id.clone(),
                room,
                &conversation.cart,
                now,
            )
        };
        let mut order = draft(self.ids.next(now));
        let mut in_doubt = false;
        let mut attempt = 0;
        loop {
            let append = self.orders.append(&tenant.id, order.clone());
            let result = tokio::time::timeout(self.settings.store_timeout, append).await;

            let error = match result {
                Ok(Ok(_)) => return Ok(order),
                Ok(Err(error @ RepositoryError::DuplicateOrder(_))) => {
                    if in_doubt && self.already_stored(tenant, &order).await {
                        return Ok(order);
                    }
                    order = draft(self.ids.next(now));
                    in_doubt = false;
                    error.into()
                }
                Ok(Err(error)) if !error.is_transient() => return Err(error.into()),
                Ok(Err(error)) => {
                    in_doubt = true;
                    error.into()
                }
                Err(_) => {
                    in_doubt = true;
                    PipelineError::StoreTimeout(self.settings.store_timeout)
                }
            };

            if attempt >= policy.max_retries {
                return Err(error);
            }
            warn!(
                event_name = "order.pipeline.persist_retry",
                tenant_id = %tenant.id,
                order_id = %order.id,
                attempt,
                error = %error,
                "retrying order persistence"
            );
            let delay = policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn already_stored(&self, tenant: &Tenant, order: &Order) -> bool {
        match self.orders.find(&tenant.id, &order.id).await {
            Ok(Some(stored)) => {
                stored.guest_id == order.guest_id
                    && stored.room_number == order.room_number
                    && stored.total == order.total
            }
            Ok(None) | Err(_) => false,
        }
    }

    async fn notify(
        &self,
        tenant: &Tenant,
        target: &str,
        message: &OutboundMessage,
        context: &AuditContext,
        recipient: &'static str,
    ) -> bool {
        match self.sender.send(&tenant.id, target, message).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "order.pipeline.notification_failed",
                    correlation_id = %context.correlation_id,
                    tenant_id = %tenant.id,
                    recipient,
                    error = %error,
                    "order notification failed"
                );
                self.audit.emit(
                    context
                        .event(
                            "notification.failed",
                            AuditCategory::Notification,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("recipient", recipient)
                        .with_metadata("error", error.to_string()),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use roomservice_core::audit::{AuditContext, InMemoryAuditSink};
    use roomservice_core::domain::conversation::{ConversationKey, GuestConversation, GuestId};
    use roomservice_core::domain::menu::MenuItem;
    use roomservice_core::domain::order::{Order, OrderId, OrderStatus};
    use roomservice_core::domain::tenant::{Tenant, TenantId};
    use roomservice_core::errors::FailureKind;
    use roomservice_core::retry::RetryPolicy;
    use roomservice_db::{InMemoryOrderRepository, OrderRepository, RepositoryError};
    use roomservice_transport::RecordingSender;

    use super::{OrderIdGenerator, OrderPipeline, PipelineError, PipelineSettings};

    const ADMIN: &str = "919800000100";
    const GUEST: &str = "919800000001";

    fn tenant() -> Tenant {
        Tenant::new("hotel-a", "Hotel Aurora", ADMIN)
    }

    fn conversation(room: Option<&str>) -> GuestConversation {
        let key = ConversationKey::new(TenantId("hotel-a".into()), GuestId(GUEST.into()));
        let mut conversation = GuestConversation::new(key, Utc::now());
        conversation.room_number = room.map(str::to_owned);
        let pizza = MenuItem {
            key: roomservice_core::domain::menu::ItemKey("margherita pizza".into()),
            display_name: "Margherita Pizza".into(),
            category: "Mains".into(),
            price: 800,
        };
        let coffee = MenuItem {
            key: roomservice_core::domain::menu::ItemKey("filter coffee".into()),
            display_name: "Filter Coffee".into(),
            category: "Drinks".into(),
            price: 150,
        };
        conversation.cart.add(&pizza, 2);
        conversation.cart.add(&coffee, 1);
        conversation
    }

    fn settings() -> PipelineSettings {
        PipelineSettings { persist: RetryPolicy::immediate(2), ..PipelineSettings::default() }
    }

    fn context() -> AuditContext {
        AuditContext::new(Some(TenantId("hotel-a".into())), Some(GuestId(GUEST.into())), "m-1", GUEST)
    }

    /// Fails the first `failures` appends, then delegates.
    struct FlakyOrders {
        failures: AtomicU32,
        transient: bool,
        inner: InMemoryOrderRepository,
    }

    #[async_trait]
    impl OrderRepository for FlakyOrders {
        async fn append(&self, tenant_id: &TenantId, order: Order) -> Result<OrderId, RepositoryError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(if self.transient {
                    RepositoryError::Database(sqlx::Error::PoolTimedOut)
                } else {
                    RepositoryError::Decode("disk full".into())
                });
            }
            self.inner.append(tenant_id, order).await
        }

        async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Order>, RepositoryError> {
            self.inner.list(tenant_id).await
        }

        async fn find(
            &self,
            tenant_id: &TenantId,
            order_id: &OrderId,
        ) -> Result<Option<Order>, RepositoryError> {
            self.inner.find(tenant_id, order_id).await
        }

        async fn update_status(
            &self,
            tenant_id: &TenantId,
            order_id: &OrderId,
            status: OrderStatus,
        ) -> Result<Order, RepositoryError> {
            self.inner.update_status(tenant_id, order_id, status).await
        }
    }

    fn flaky(failures: u32, transient: bool) -> Arc<FlakyOrders> {
        Arc::new(FlakyOrders {
            failures: AtomicU32::new(failures),
            transient,
            inner: InMemoryOrderRepository::default(),
        })
    }

    #[tokio::test]
    async fn placed_order_is_persisted_and_both_parties_notified() {
        let orders = Arc::new(InMemoryOrderRepository::default());
        let sender = Arc::new(RecordingSender::default());
        let audit = InMemoryAuditSink::default();
        let pipeline =
            OrderPipeline::new(orders.clone(), sender.clone(), Arc::new(audit.clone()), settings());

        let placed = pipeline
            .place(&tenant(), &conversation(Some("105")), &context(), Utc::now())
            .await
            .expect("placed");

        assert_eq!(placed.order.total, 1_750);
        assert_eq!(placed.order.room_number, "105");
        assert!(placed.guest_notified && placed.admin_notified);

        let stored = orders.list(&TenantId("hotel-a".into())).await.expect("list");
        assert_eq!(stored, vec![placed.order.clone()]);

        let admin = sender.texts_to(ADMIN);
        assert_eq!(admin.len(), 1);
        assert!(admin[0].contains("Room: 105"));
        assert!(admin[0].contains("2 × Margherita Pizza"));
        assert!(admin[0].contains("₹1750"));
        assert!(sender.texts_to(GUEST)[0].contains(&placed.order.id.0));
        assert_eq!(audit.event_types(), vec!["order.placed"]);
    }

    #[tokio::test]
    async fn incomplete_orders_have_no_side_effects() {
        let orders = Arc::new(InMemoryOrderRepository::default());
        let sender = Arc::new(RecordingSender::default());
        let pipeline = OrderPipeline::new(
            orders.clone(),
            sender.clone(),
            Arc::new(InMemoryAuditSink::default()),
            settings(),
        );

        let error = pipeline
            .place(&tenant(), &conversation(None), &context(), Utc::now())
            .await
            .expect_err("room missing");
        assert_eq!(error.kind(), FailureKind::IncompleteOrder);

        let mut empty = conversation(Some("105"));
        empty.cart.clear();
        let error =
            pipeline.place(&tenant(), &empty, &context(), Utc::now()).await.expect_err("empty cart");
        assert!(matches!(error, PipelineError::IncompleteOrder(_)));

        assert!(orders.list(&TenantId("hotel-a".into())).await.expect("list").is_empty());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn transient_store_errors_are_retried() {
        let orders = flaky(2, true);
        let pipeline = OrderPipeline::new(
            orders.clone(),
            Arc::new(RecordingSender::default()),
            Arc::new(InMemoryAuditSink::default()),
            settings(),
        );

        pipeline
            .place(&tenant(), &conversation(Some("105")), &context(), Utc::now())
            .await
            .expect("third attempt persists");
        assert_eq!(orders.list(&TenantId("hotel-a".into())).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn permanent_store_errors_fail_without_notifying() {
        let sender = Arc::new(RecordingSender::default());
        let audit = InMemoryAuditSink::default();
        let pipeline =
            OrderPipeline::new(flaky(1, false), sender.clone(), Arc::new(audit.clone()), settings());

        let error = pipeline
            .place(&tenant(), &conversation(Some("105")), &context(), Utc::now())
            .await
            .expect_err("persistence fails");

        assert_eq!(error.kind(), FailureKind::PersistenceFailure);
        assert!(sender.sent().is_empty());
        assert_eq!(audit.event_types(), vec!["order.persist_failed"]);
    }

    #[tokio::test]
    async fn notification_failure_keeps_the_order() {
        let orders = Arc::new(InMemoryOrderRepository::default());
        let sender = Arc::new(RecordingSender::default());
        sender.fail_target(ADMIN);
        let pipeline = OrderPipeline::new(
            orders.clone(),
            sender.clone(),
            Arc::new(InMemoryAuditSink::default()),
            settings(),
        );

        let placed = pipeline
            .place(&tenant(), &conversation(Some("105")), &context(), Utc::now())
            .await
            .expect("order stays placed");

        assert!(!placed.admin_notified);
        assert!(placed.guest_notified);
        assert_eq!(orders.list(&TenantId("hotel-a".into())).await.expect("list").len(), 1);
    }

    /// Commits every append, then holds the acknowledgement of the first
    /// `slow_acks` past the pipeline's store timeout.
    struct SlowAckOrders {
        slow_acks: AtomicU32,
        inner: InMemoryOrderRepository,
    }

    #[async_trait]
    impl OrderRepository for SlowAckOrders {
        async fn append(&self, tenant_id: &TenantId, order: Order) -> Result<OrderId, RepositoryError> {
            let id = self.inner.append(tenant_id, order).await?;
            let remaining = self.slow_acks.load(Ordering::SeqCst);
            if remaining > 0 {
                self.slow_acks.store(remaining - 1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(id)
        }

        async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Order>, RepositoryError> {
            self.inner.list(tenant_id).await
        }

        async fn find(
            &self,
            tenant_id: &TenantId,
            order_id: &OrderId,
        ) -> Result<Option<Order>, RepositoryError> {
            self.inner.find(tenant_id, order_id).await
        }

        async fn update_status(
            &self,
            tenant_id: &TenantId,
            order_id: &OrderId,
            status: OrderStatus,
        ) -> Result<Order, RepositoryError> {
            self.inner.update_status(tenant_id, order_id, status).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_acknowledgement_does_not_store_the_order_twice() {
        let orders = Arc::new(SlowAckOrders {
            slow_acks: AtomicU32::new(1),
            inner: InMemoryOrderRepository::default(),
        });
        let sender = Arc::new(RecordingSender::default());
        let pipeline = OrderPipeline::new(
            orders.clone(),
            sender.clone(),
            Arc::new(InMemoryAuditSink::default()),
            PipelineSettings { store_timeout: Duration::from_secs(1), ..settings() },
        );

        let placed = pipeline
            .place(&tenant(), &conversation(Some("105")), &context(), Utc::now())
            .await
            .expect("committed order is recognised on retry");

        let stored = orders.list(&TenantId("hotel-a".into())).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, placed.order.id);
        assert_eq!(sender.texts_to(ADMIN).len(), 1);
    }

    #[tokio::test]
    async fn transient_retries_keep_the_same_order_id() {
        let orders = flaky(1, true);
        let pipeline = OrderPipeline::new(
            orders.clone(),
            Arc::new(RecordingSender::default()),
            Arc::new(InMemoryAuditSink::default()),
            settings(),
        );

        let placed = pipeline
            .place(&tenant(), &conversation(Some("105")), &context(), Utc::now())
            .await
            .expect("second attempt persists");

        assert!(placed.order.id.0.ends_with("-000"), "{}", placed.order.id);
    }

    #[test]
    fn generated_ids_are_distinct_and_readable() {
        let ids = OrderIdGenerator::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 5).single().expect("timestamp");

        assert_eq!(ids.next(now), OrderId("ORD-260314093005-000".into()));
        assert_eq!(ids.next(now), OrderId("ORD-260314093005-001".into()));
    }
}
