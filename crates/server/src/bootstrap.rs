use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use roomservice_agent::{AgentRuntime, MenuSnapshots, OrderStatusService, RuntimeSettings};
use roomservice_core::audit::{AuditSink, TracingAuditSink};
use roomservice_core::config::AppConfig;
use roomservice_core::domain::menu::parse_menu_file;
use roomservice_core::domain::tenant::TenantId;
use roomservice_core::errors::DomainError;
use roomservice_db::{
    connect_with_settings, migrations, DbPool, MenuRepository, OrderRepository, RepositoryError,
    SqlCredentialRepository, SqlMenuRepository, SqlOrderRepository,
};
use roomservice_transport::{PairingBoard, SessionLifecycleManager, SessionSettings, Transport};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sessions: SessionLifecycleManager,
    pub pairing: Arc<PairingBoard>,
    pub runtime: AgentRuntime,
    pub order_status: Arc<OrderStatusService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("could not read menu file `{path}` for tenant `{tenant_id}`: {source}")]
    MenuFile { tenant_id: String, path: PathBuf, source: std::io::Error },
    #[error("menu for tenant `{tenant_id}` is invalid: {source}")]
    InvalidMenu { tenant_id: String, source: DomainError },
    #[error("menu for tenant `{tenant_id}` could not be stored: {source}")]
    MenuStore { tenant_id: String, source: RepositoryError },
}

/// Wires stores, sessions and the conversation runtime around `transport`.
/// Tenants are not connected until [`Application::activate_tenants`].
pub async fn bootstrap_with_config(
    config: AppConfig,
    transport: Arc<dyn Transport>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        tenants = config.tenants.len(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let orders: Arc<dyn OrderRepository> = Arc::new(SqlOrderRepository::new(db_pool.clone()));
    let menu_store: Arc<dyn MenuRepository> = Arc::new(SqlMenuRepository::new(db_pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let pairing = Arc::new(PairingBoard::default());
    let sessions = SessionLifecycleManager::new(
        transport,
        Arc::new(SqlCredentialRepository::new(db_pool.clone())),
        pairing.clone(),
        Arc::clone(&audit),
        SessionSettings::from_config(&config.transport),
    );

    let menus = Arc::new(MenuSnapshots::new(menu_store));
    seed_menus(&config, &menus).await?;

    let sender = Arc::new(sessions.clone());
    let runtime = AgentRuntime::new(
        menus,
        Arc::clone(&orders),
        sender.clone(),
        audit,
        RuntimeSettings::from_config(&config.conversation),
    );
    let order_status = Arc::new(OrderStatusService::new(orders, sender));

    Ok(Application { config, db_pool, sessions, pairing, runtime, order_status })
}

async fn seed_menus(config: &AppConfig, menus: &MenuSnapshots) -> Result<(), BootstrapError> {
    for tenant in &config.tenants {
        let Some(path) = &tenant.menu_file else {
            continue;
        };
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| {
            BootstrapError::MenuFile { tenant_id: tenant.id.clone(), path: path.clone(), source }
        })?;
        let items = parse_menu_file(&raw)
            .map_err(|source| BootstrapError::InvalidMenu { tenant_id: tenant.id.clone(), source })?;
        let catalog = menus
            .replace(&TenantId(tenant.id.clone()), items)
            .await
            .map_err(|source| match source {
                RepositoryError::Domain(source) => {
                    BootstrapError::InvalidMenu { tenant_id: tenant.id.clone(), source }
                }
                source => BootstrapError::MenuStore { tenant_id: tenant.id.clone(), source },
            })?;
        info!(
            event_name = "system.bootstrap.menu_seeded",
            correlation_id = "bootstrap",
            tenant_id = %tenant.id,
            items = catalog.items().len(),
            path = %path.display(),
            "tenant menu seeded from file"
        );
    }
    Ok(())
}

impl Application {
    pub async fn activate_tenants(&self) {
        let handler = Arc::new(self.runtime.clone());
        for tenant in &self.config.tenants {
            self.sessions.activate(tenant.to_tenant(), handler.clone()).await;
        }
    }

    /// Periodically drops conversations idle past the configured expiry.
    pub fn spawn_idle_sweep(&self, every: Duration) -> JoinHandle<()> {
        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                runtime.evict_idle().await;
            }
        })
    }

    /// Lets in-flight turns finish within the grace period, then closes every
    /// tenant connection. Stored credentials survive for the next start.
    pub async fn shutdown(self) {
        let grace = Duration::from_secs(self.config.server.graceful_shutdown_secs);
        self.runtime.stop_timers();
        if tokio::time::timeout(grace, self.runtime.settle()).await.is_err() {
            warn!(
                event_name = "system.shutdown.grace_elapsed",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight messages still running at shutdown"
            );
        }
        self.sessions.shutdown().await;
        self.db_pool.close().await;
        info!(event_name = "system.shutdown.complete", correlation_id = "shutdown", "shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use roomservice_core::config::{AppConfig, ConfigOverrides, LoadOptions, TenantConfig};
    use roomservice_core::domain::order::OrderStatus;
    use roomservice_core::domain::tenant::{SessionStatus, TenantId};
    use roomservice_transport::{InboundMessage, LoopbackController, LoopbackTransport};

    use super::{bootstrap_with_config, BootstrapError};

    const MENU: &str = r#"
[[items]]
name = "Margherita Pizza"
category = "Mains"
price = 800

[[items]]
name = "Filter Coffee"
category = "Drinks"
price = 150
aliases = ["kaapi"]
"#;

    fn config(dir: &tempfile::TempDir, menu: &str) -> AppConfig {
        let menu_path = dir.path().join("aurora.toml");
        std::fs::write(&menu_path, menu).expect("write menu");

        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("roomservice.db").display());
        config.tenants = vec![TenantConfig {
            id: "hotel-a".into(),
            name: "Hotel Aurora".into(),
            admin_target: "919800000100".into(),
            skip_room_capture: false,
            menu_file: Some(menu_path),
        }];
        config
    }

    async fn wait_for_connected(app: &super::Application, tenant_id: &TenantId) {
        for _ in 0..100 {
            if app.sessions.status(tenant_id).await == SessionStatus::Connected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("tenant never connected");
    }

    async fn say(controller: &LoopbackController, id: &str, text: &str) -> Vec<String> {
        let tenant_id = TenantId("hotel-a".into());
        controller
            .deliver(&tenant_id, InboundMessage::direct(id, "919800000001", text))
            .expect("deliver");
        let first = tokio::time::timeout(Duration::from_secs(5), controller.next_delivery())
            .await
            .expect("reply in time")
            .expect("reply");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut texts = vec![first.message.fallback_text()];
        texts.extend(controller.drain().await.into_iter().map(|d| d.message.fallback_text()));
        texts
    }

    #[test]
    fn invalid_configuration_fails_fast() {
        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect_err("non-sqlite url rejected");

        assert!(error.to_string().contains("database.url"), "{error}");
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connect_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config(&dir, MENU);
        config.database.url =
            format!("sqlite://{}", dir.path().join("missing").join("x.db").display());
        let (transport, _controller) = LoopbackTransport::new();

        let error = bootstrap_with_config(config, Arc::new(transport))
            .await
            .err()
            .expect("connect fails");
        assert!(matches!(error, BootstrapError::DatabaseConnect(_)), "{error}");
    }

    #[tokio::test]
    async fn broken_menu_file_is_reported_with_the_tenant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (transport, _controller) = LoopbackTransport::new();
        let menu = "[[items]]\nname = \"Tea\"\nprice = 10\n[[items]]\nname = \"tea\"\nprice = 12\n";

        let error = bootstrap_with_config(config(&dir, menu), Arc::new(transport))
            .await
            .err()
            .expect("duplicate items rejected");
        assert!(matches!(error, BootstrapError::InvalidMenu { ref tenant_id, .. } if tenant_id == "hotel-a"));
    }

    #[tokio::test]
    async fn guest_orders_end_to_end_over_the_loopback_transport() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (transport, controller) = LoopbackTransport::new();
        let app = bootstrap_with_config(config(&dir, MENU), Arc::new(transport))
            .await
            .expect("bootstrap");
        let tenant_id = TenantId("hotel-a".into());

        app.activate_tenants().await;
        wait_for_connected(&app, &tenant_id).await;

        assert!(say(&controller, "m-1", "hi").await[0].starts_with("Welcome to Hotel Aurora!"));
        say(&controller, "m-2", "105").await;
        let summary = say(&controller, "m-3", "2 pizzas and 1 kaapi").await;
        assert!(summary.iter().any(|text| text.contains("₹1750")), "{summary:?}");
        say(&controller, "m-4", "yes").await;

        let orders = app.order_status.list(&tenant_id).await.expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].total, 1_750);

        let update = app
            .order_status
            .update_status(&tenant_id, &orders[0].id, OrderStatus::Confirmed)
            .await
            .expect("confirm");
        assert!(update.guest_notified);

        app.shutdown().await;
    }
}
