use async_trait::async_trait;
use thiserror::Error;

use roomservice_core::domain::menu::{MenuCatalog, MenuItemSpec};
use roomservice_core::domain::order::{Order, OrderId, OrderStatus};
use roomservice_core::domain::tenant::{Credentials, TenantId};
use roomservice_core::errors::{DomainError, FailureKind};

pub mod credential;
pub mod memory;
pub mod menu;
pub mod order;

pub use credential::SqlCredentialRepository;
pub use memory::{InMemoryCredentialRepository, InMemoryMenuRepository, InMemoryOrderRepository};
pub use menu::SqlMenuRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("order `{order_id}` not found for tenant `{tenant_id}`")]
    OrderNotFound { tenant_id: String, order_id: String },
    #[error("order `{0}` changed status concurrently")]
    StaleStatus(String),
    #[error("order `{0}` already exists")]
    DuplicateOrder(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::PersistenceFailure
    }

    /// Worth another attempt: the store may recover on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(error) => matches!(
                error,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ) || error
                .as_database_error()
                .map(|db| db.message().contains("locked") || db.message().contains("busy"))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Order Store collaborator.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn append(&self, tenant_id: &TenantId, order: Order) -> Result<OrderId, RepositoryError>;
    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Order>, RepositoryError>;
    async fn find(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Order>, RepositoryError>;
    /// Applies a status change, rejecting moves the status machine forbids.
    async fn update_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError>;
}

/// Credential Store collaborator.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<Credentials>, RepositoryError>;
    async fn save(&self, tenant_id: &TenantId, credentials: Credentials)
        -> Result<(), RepositoryError>;
    async fn clear(&self, tenant_id: &TenantId) -> Result<(), RepositoryError>;
}

/// Menu Source collaborator.
#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn current(&self, tenant_id: &TenantId) -> Result<MenuCatalog, RepositoryError>;
    async fn replace(
        &self,
        tenant_id: &TenantId,
        items: Vec<MenuItemSpec>,
    ) -> Result<MenuCatalog, RepositoryError>;
}
