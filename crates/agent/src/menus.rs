use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use roomservice_core::domain::menu::{MenuCatalog, MenuItemSpec};
use roomservice_core::domain::tenant::TenantId;
use roomservice_db::{MenuRepository, RepositoryError};

/// Read-through cache of each tenant's catalog. A turn holds the snapshot it
/// started with, so a concurrent replace never changes a parse mid-message.
pub struct MenuSnapshots {
    repository: Arc<dyn MenuRepository>,
    cache: RwLock<HashMap<TenantId, Arc<MenuCatalog>>>,
}

impl MenuSnapshots {
    pub fn new(repository: Arc<dyn MenuRepository>) -> Self {
        Self { repository, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn current(&self, tenant_id: &TenantId) -> Result<Arc<MenuCatalog>, RepositoryError> {
        if let Some(catalog) = self.cache.read().await.get(tenant_id) {
            return Ok(Arc::clone(catalog));
        }
        self.reload(tenant_id).await
    }

    pub async fn reload(&self, tenant_id: &TenantId) -> Result<Arc<MenuCatalog>, RepositoryError> {
        let catalog = Arc::new(self.repository.current(tenant_id).await?);
        self.cache.write().await.insert(tenant_id.clone(), Arc::clone(&catalog));
        Ok(catalog)
    }

    pub async fn replace(
        &self,
        tenant_id: &TenantId,
        items: Vec<MenuItemSpec>,
    ) -> Result<Arc<MenuCatalog>, RepositoryError> {
        let catalog = Arc::new(self.repository.replace(tenant_id, items).await?);
        self.cache.write().await.insert(tenant_id.clone(), Arc::clone(&catalog));
        info!(
            event_name = "menu.catalog.replaced",
            tenant_id = %tenant_id,
            items = catalog.items().len(),
            "menu catalog replaced"
        );
        Ok(catalog)
    }
}
