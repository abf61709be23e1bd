use sqlx::Row;

use roomservice_core::domain::menu::{MenuCatalog, MenuItemSpec};
use roomservice_core::domain::tenant::TenantId;

use super::{MenuRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMenuRepository {
    pool: DbPool,
}

impl SqlMenuRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_spec(row: &sqlx::sqlite::SqliteRow) -> Result<MenuItemSpec, RepositoryError> {
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let price: i64 = row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let aliases_json: String =
        row.try_get("aliases_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let aliases: Vec<String> =
        serde_json::from_str(&aliases_json).map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(MenuItemSpec { name, category, price, aliases })
}

#[async_trait::async_trait]
impl MenuRepository for SqlMenuRepository {
    async fn current(&self, tenant_id: &TenantId) -> Result<MenuCatalog, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, category, price, aliases_json
             FROM menu_items WHERE tenant_id = ? ORDER BY position ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let specs = rows.iter().map(row_to_spec).collect::<Result<Vec<_>, _>>()?;
        Ok(MenuCatalog::from_items(specs)?)
    }

    /// Validates first, then swaps the whole menu in one transaction.
    async fn replace(
        &self,
        tenant_id: &TenantId,
        items: Vec<MenuItemSpec>,
    ) -> Result<MenuCatalog, RepositoryError> {
        let catalog = MenuCatalog::from_items(items.clone())?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM menu_items WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .execute(&mut *tx)
            .await?;

        for (position, item) in items.iter().enumerate() {
            let aliases_json = serde_json::to_string(&item.aliases)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            sqlx::query(
                "INSERT INTO menu_items (tenant_id, position, name, category, price, aliases_json)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&tenant_id.0)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&item.name)
            .bind(&item.category)
            .bind(item.price)
            .bind(&aliases_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            event_name = "menu.replaced",
            tenant_id = %tenant_id,
            item_count = catalog.items().len(),
            "menu replaced"
        );
        Ok(catalog)
    }
}
