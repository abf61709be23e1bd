use chrono::Utc;
use sqlx::Row;

use roomservice_core::domain::tenant::{Credentials, TenantId};

use super::{CredentialRepository, RepositoryError};
use crate::DbPool;

/// Stores the transport's opaque session blob, one row per tenant.
pub struct SqlCredentialRepository {
    pool: DbPool,
}

impl SqlCredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialRepository for SqlCredentialRepository {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<Credentials>, RepositoryError> {
        let row = sqlx::query("SELECT credential_blob FROM tenant_credentials WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let blob: String = row
                    .try_get("credential_blob")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(Credentials::new(blob)))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        tenant_id: &TenantId,
        credentials: Credentials,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tenant_credentials (tenant_id, credential_blob, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                 credential_blob = excluded.credential_blob,
                 updated_at = excluded.updated_at",
        )
        .bind(&tenant_id.0)
        .bind(credentials.expose())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, tenant_id: &TenantId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM tenant_credentials WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
