use chrono::{DateTime, Utc};
use sqlx::Row;

use roomservice_core::domain::conversation::GuestId;
use roomservice_core::domain::order::{Order, OrderId, OrderLine, OrderStatus};
use roomservice_core::domain::tenant::TenantId;

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T, E: ToString>(result: Result<T, E>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let tenant_id: String = decode(row.try_get("tenant_id"))?;
    let room_number: String = decode(row.try_get("room_number"))?;
    let guest_id: String = decode(row.try_get("guest_id"))?;
    let lines_json: String = decode(row.try_get("lines_json"))?;
    let total: i64 = decode(row.try_get("total"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;

    let lines: Vec<OrderLine> = decode(serde_json::from_str(&lines_json))?;
    let status = OrderStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_str}`")))?;
    let created_at =
        decode(DateTime::parse_from_rfc3339(&created_at_str))?.with_timezone(&Utc);

    Ok(Order {
        id: OrderId(id),
        tenant_id: TenantId(tenant_id),
        room_number,
        guest_id: GuestId(guest_id),
        lines,
        total,
        status,
        created_at,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn append(&self, tenant_id: &TenantId, order: Order) -> Result<OrderId, RepositoryError> {
        let lines_json = decode(serde_json::to_string(&order.lines))?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO orders (id, tenant_id, room_number, guest_id, lines_json, total,
                                 status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&order.id.0)
        .bind(&tenant_id.0)
        .bind(&order.room_number)
        .bind(&order.guest_id.0)
        .bind(&lines_json)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.created_at.to_rfc3339())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::DuplicateOrder(order.id.0));
        }
        Ok(order.id)
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, room_number, guest_id, lines_json, total, status, created_at
             FROM orders WHERE tenant_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, room_number, guest_id, lines_json, total, status, created_at
             FROM orders WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&order_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut order = self.find(tenant_id, order_id).await?.ok_or_else(|| {
            RepositoryError::OrderNotFound {
                tenant_id: tenant_id.0.clone(),
                order_id: order_id.0.clone(),
            }
        })?;
        let previous = order.status;
        order.transition_to(status)?;

        // Compare-and-set against the status we validated.
        let result = sqlx::query(
            "UPDATE orders SET status = ?, updated_at = ?
             WHERE tenant_id = ? AND id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&tenant_id.0)
        .bind(&order_id.0)
        .bind(previous.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::StaleStatus(order_id.0.clone()));
        }
        Ok(order)
    }
}
