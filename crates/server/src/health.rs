use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use roomservice_agent::OrderStatusService;
use roomservice_core::domain::tenant::{SessionStatus, TenantId};
use roomservice_core::errors::FailureKind;
use roomservice_db::{ping, DbPool};
use roomservice_transport::{PairingBoard, SessionLifecycleManager};
use serde::Serialize;
use tracing::{error, info};

use crate::orders;

#[derive(Clone)]
pub struct HttpState {
    pub db_pool: DbPool,
    pub sessions: SessionLifecycleManager,
    pub pairing: Arc<PairingBoard>,
    pub order_status: Arc<OrderStatusService>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TenantHealth {
    pub tenant_id: String,
    pub session: &'static str,
    pub pairing_pending: bool,
    pub last_failure: Option<&'static str>,
    pub reauthorization_required: bool,
}

/// What an operator needs to pair a tenant: the current challenge, if any,
/// and whether the last failure needs a fresh scan or will retry on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PairingView {
    pub tenant_id: String,
    pub session: &'static str,
    pub challenge: Option<String>,
    pub last_failure: Option<&'static str>,
    pub reauthorization_required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub tenants: Vec<TenantHealth>,
    pub checked_at: String,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tenants/{tenant_id}/pairing", get(pairing))
        .route("/tenants/{tenant_id}/orders", get(orders::list))
        .route("/tenants/{tenant_id}/orders/{order_id}/status", post(orders::update_status))
        .with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HttpState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "http endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Ready only when the database answers. Tenant sessions are reported but a
/// tenant waiting on a pairing scan does not make the process unhealthy.
pub async fn health(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match ping(&state.db_pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    };
    let ready = database.status == "ready";

    let tenants = state
        .sessions
        .statuses()
        .await
        .into_iter()
        .map(|(tenant_id, status)| {
            let failure = state.pairing.last_failure(&tenant_id);
            TenantHealth {
                pairing_pending: state.pairing.current(&tenant_id).is_some(),
                last_failure: failure.map(|kind| kind.as_str()),
                reauthorization_required: needs_reauthorization(failure, status),
                session: status.as_str(),
                tenant_id: tenant_id.0,
            }
        })
        .collect();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        tenants,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn pairing(
    State(state): State<HttpState>,
    Path(tenant_id): Path<String>,
) -> Json<PairingView> {
    let tenant_id = TenantId(tenant_id);
    let status = state.sessions.status(&tenant_id).await;
    let failure = state.pairing.last_failure(&tenant_id);
    Json(PairingView {
        challenge: state.pairing.current(&tenant_id),
        session: status.as_str(),
        last_failure: failure.map(|kind| kind.as_str()),
        reauthorization_required: needs_reauthorization(failure, status),
        tenant_id: tenant_id.0,
    })
}

/// A fatal failure stops mattering once the tenant is connected again.
fn needs_reauthorization(failure: Option<FailureKind>, status: SessionStatus) -> bool {
    status != SessionStatus::Connected && failure.is_some_and(|kind| kind.requires_reauthorization())
}
