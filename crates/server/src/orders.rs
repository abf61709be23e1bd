use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use roomservice_core::domain::order::{Order, OrderId, OrderStatus};
use roomservice_core::domain::tenant::TenantId;
use roomservice_core::errors::DomainError;
use roomservice_db::RepositoryError;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::health::HttpState;

#[derive(Debug, Serialize)]
pub struct AdminError {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub order: Order,
    pub guest_notified: bool,
}

type AdminResult<T> = Result<Json<T>, (StatusCode, Json<AdminError>)>;

pub async fn list(
    State(state): State<HttpState>,
    Path(tenant_id): Path<String>,
) -> AdminResult<Vec<Order>> {
    let tenant_id = TenantId(tenant_id);
    state.order_status.list(&tenant_id).await.map(Json).map_err(|error| reject(&tenant_id, error))
}

pub async fn update_status(
    State(state): State<HttpState>,
    Path((tenant_id, order_id)): Path<(String, String)>,
    Json(request): Json<StatusChangeRequest>,
) -> AdminResult<StatusChangeResponse> {
    let Some(status) = OrderStatus::parse(&request.status) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(AdminError { error: format!("unknown order status `{}`", request.status) }),
        ));
    };

    let tenant_id = TenantId(tenant_id);
    let update = state
        .order_status
        .update_status(&tenant_id, &OrderId(order_id), status)
        .await
        .map_err(|error| reject(&tenant_id, error))?;

    Ok(Json(StatusChangeResponse { order: update.order, guest_notified: update.guest_notified }))
}

fn reject(tenant_id: &TenantId, error: RepositoryError) -> (StatusCode, Json<AdminError>) {
    let status = match &error {
        RepositoryError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
        RepositoryError::StaleStatus(_)
        | RepositoryError::Domain(DomainError::InvalidOrderTransition { .. }) => {
            StatusCode::CONFLICT
        }
        _ => {
            error!(
                event_name = "admin.request.failed",
                tenant_id = %tenant_id,
                error = %error,
                "admin order request failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(AdminError { error: error.to_string() }))
}
