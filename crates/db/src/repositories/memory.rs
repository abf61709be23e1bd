use std::collections::HashMap;

use tokio::sync::RwLock;

use roomservice_core::domain::menu::{MenuCatalog, MenuItemSpec};
use roomservice_core::domain::order::{Order, OrderId, OrderStatus};
use roomservice_core::domain::tenant::{Credentials, TenantId};

use super::{CredentialRepository, MenuRepository, OrderRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Vec<Order>>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn append(&self, tenant_id: &TenantId, order: Order) -> Result<OrderId, RepositoryError> {
        let mut orders = self.orders.write().await;
        let tenant_orders = orders.entry(tenant_id.0.clone()).or_default();
        if tenant_orders.iter().any(|existing| existing.id == order.id) {
            return Err(RepositoryError::DuplicateOrder(order.id.0));
        }
        let id = order.id.clone();
        tenant_orders.push(order);
        Ok(id)
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&tenant_id.0).cloned().unwrap_or_default())
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders
            .get(&tenant_id.0)
            .and_then(|tenant_orders| tenant_orders.iter().find(|order| &order.id == order_id))
            .cloned())
    }

    async fn update_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&tenant_id.0)
            .and_then(|tenant_orders| tenant_orders.iter_mut().find(|order| &order.id == order_id))
            .ok_or_else(|| RepositoryError::OrderNotFound {
                tenant_id: tenant_id.0.clone(),
                order_id: order_id.0.clone(),
            })?;
        order.transition_to(status)?;
        Ok(order.clone())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: RwLock<HashMap<String, Credentials>>,
}

impl InMemoryCredentialRepository {
    pub async fn contains(&self, tenant_id: &TenantId) -> bool {
        self.credentials.read().await.contains_key(&tenant_id.0)
    }
}

#[async_trait::async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<Credentials>, RepositoryError> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(&tenant_id.0).cloned())
    }

    async fn save(
        &self,
        tenant_id: &TenantId,
        credentials: Credentials,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.credentials.write().await;
        stored.insert(tenant_id.0.clone(), credentials);
        Ok(())
    }

    async fn clear(&self, tenant_id: &TenantId) -> Result<(), RepositoryError> {
        let mut stored = self.credentials.write().await;
        stored.remove(&tenant_id.0);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMenuRepository {
    menus: RwLock<HashMap<String, Vec<MenuItemSpec>>>,
}

#[async_trait::async_trait]
impl MenuRepository for InMemoryMenuRepository {
    async fn current(&self, tenant_id: &TenantId) -> Result<MenuCatalog, RepositoryError> {
        let menus = self.menus.read().await;
        match menus.get(&tenant_id.0) {
            Some(items) => Ok(MenuCatalog::from_items(items.clone())?),
            None => Ok(MenuCatalog::empty()),
        }
    }

    async fn replace(
        &self,
        tenant_id: &TenantId,
        items: Vec<MenuItemSpec>,
    ) -> Result<MenuCatalog, RepositoryError> {
        let catalog = MenuCatalog::from_items(items.clone())?;
        let mut menus = self.menus.write().await;
        menus.insert(tenant_id.0.clone(), items);
        Ok(catalog)
    }
}
