use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, query, query_as, query_scalar};
use std::sync::Arc;

use crate::db::presence_store::PresenceStore;
use crate::error::AppError;
use crate::models::DevicePresenceRecord;

/// Postgres-backed presence on the `clients` table.
#[derive(Clone)]
pub struct PgPresenceStore {
    db_pool: Arc<PgPool>,
}

impl PgPresenceStore {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }

    async fn set_online(
        &self,
        device_id: &str,
        is_online: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = query("UPDATE clients SET is_online = $2, last_seen = $3 WHERE id = $1")
            .bind(device_id)
            .bind(is_online)
            .bind(now)
            .execute(&*self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update client presence: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Client not found: {}", device_id)));
        }

        Ok(())
    }
}

#[async_trait]
impl PresenceStore for PgPresenceStore {
    async fn resolve_device_for_subject(&self, subject_id: &str) -> Result<Option<String>, AppError> {
        query_scalar::<_, String>("SELECT id FROM clients WHERE user_id = $1 LIMIT 1")
            .bind(subject_id)
            .fetch_optional(&*self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to resolve client for user: {}", e)))
    }

    async fn mark_online(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.set_online(device_id, true, now).await
    }

    async fn mark_offline(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.set_online(device_id, false, now).await
    }

    async fn touch(&self, device_id: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        self.set_online(device_id, true, now).await
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = query(
            r#"
            UPDATE clients
            SET is_online = FALSE
            WHERE is_online = TRUE
              AND (last_seen < $1 OR last_seen IS NULL)
            "#,
        )
        .bind(cutoff)
        .execute(&*self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to mark stale clients offline: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn get(&self, device_id: &str) -> Result<Option<DevicePresenceRecord>, AppError> {
        query_as::<_, DevicePresenceRecord>(
            "SELECT id, is_online, last_seen FROM clients WHERE id = $1",
        )
        .bind(device_id)
        .fetch_optional(&*self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch client presence: {}", e)))
    }
}
