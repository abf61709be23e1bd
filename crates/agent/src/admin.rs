use std::sync::Arc;

use tracing::{info, warn};

use roomservice_core::domain::order::{Order, OrderId, OrderStatus};
use roomservice_core::domain::tenant::TenantId;
use roomservice_core::flows::replies;
use roomservice_db::{OrderRepository, RepositoryError};
use roomservice_transport::OutboundSender;

/// Hook for the hotel-side admin surface: moves an order along its status
/// machine and tells the guest.
pub struct OrderStatusService {
    orders: Arc<dyn OrderRepository>,
    sender: Arc<dyn OutboundSender>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order: Order,
    pub guest_notified: bool,
}

impl OrderStatusService {
    pub fn new(orders: Arc<dyn OrderRepository>, sender: Arc<dyn OutboundSender>) -> Self {
        Self { orders, sender }
    }

    pub async fn update_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<StatusUpdate, RepositoryError> {
        let order = self.orders.update_status(tenant_id, order_id, status).await?;
        info!(
            event_name = "order.status.updated",
            tenant_id = %tenant_id,
            order_id = %order_id,
            status = status.as_str(),
            "order status updated"
        );

        let guest_notified = match self
            .sender
            .send(tenant_id, &order.guest_id.0, &replies::guest_status_update(order_id, status))
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "order.status.notification_failed",
                    tenant_id = %tenant_id,
                    order_id = %order_id,
                    error = %error,
                    "guest status notification failed"
                );
                false
            }
        };

        Ok(StatusUpdate { order, guest_notified })
    }

    pub async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Order>, RepositoryError> {
        self.orders.list(tenant_id).await
    }
}
