use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use routewatch_core::domain::profile::CompanyProfile;

use super::{ProfileStore, RepositoryError};
use crate::DbPool;

/// Single-row store: the deployment monitors exactly one company, so the
/// profile always lives at id 1.
pub struct SqlProfileStore {
    pool: DbPool,
}

impl SqlProfileStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for SqlProfileStore {
    async fn load(&self) -> Result<Option<CompanyProfile>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM profiles WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let payload = row.try_get::<String, _>("payload_json")?;
            serde_json::from_str(&payload)
                .map_err(|error| RepositoryError::Decode(format!("company profile: {error}")))
        })
        .transpose()
    }

    async fn store(&self, profile: &CompanyProfile) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(profile)
            .map_err(|error| RepositoryError::Encode(format!("company profile: {error}")))?;

        sqlx::query(
            "INSERT INTO profiles (id, payload_json, updated_at)
             VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
