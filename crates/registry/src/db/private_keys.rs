use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::types::require;
use super::{write_timestamps, DbClient, KeyType, NewPrivateKey, PrivateKey, PrivateKeySummary};
use crate::error::{Entity, StoreError, StoreResult};

type PrivateKeyRow = (String, String, String, String, bool, DateTime<Utc>, DateTime<Utc>);
type PrivateKeySummaryRow = (String, String, String, bool, DateTime<Utc>, DateTime<Utc>);

fn private_key_from_row(row: PrivateKeyRow) -> StoreResult<PrivateKey> {
    let (id, name, key, key_type, is_external, created_at, updated_at) = row;
    Ok(PrivateKey {
        id,
        name,
        key: key.into(),
        key_type: key_type.parse::<KeyType>()?,
        is_external,
        created_at,
        updated_at,
    })
}

fn summary_from_row(row: PrivateKeySummaryRow) -> StoreResult<PrivateKeySummary> {
    let (id, name, key_type, is_external, created_at, updated_at) = row;
    Ok(PrivateKeySummary {
        id,
        name,
        key_type: key_type.parse::<KeyType>()?,
        is_external,
        created_at,
        updated_at,
    })
}

fn validate(id: &str, name: &str, key: &str) -> StoreResult<()> {
    require("private key id", id)?;
    require("private key name", name)?;
    require("private key material", key)
}

#[allow(clippy::missing_errors_doc)]
impl DbClient {
    /// Stores a key; `is_external` defaults to `true` when not given.
    pub async fn create_private_key(&self, key: &NewPrivateKey) -> StoreResult<PrivateKey> {
        validate(&key.id, &key.name, key.key.expose())?;
        let (created_at, updated_at) = write_timestamps(key.created_at, key.updated_at);
        let is_external = key.is_external.unwrap_or(true);

        sqlx::query(
            "INSERT INTO private_keys (id, name, \"key\", type, is_external, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&key.id)
        .bind(&key.name)
        .bind(key.key.expose())
        .bind(key.key_type.as_str())
        .bind(is_external)
        .bind(created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::PrivateKey, &key.id))?;

        debug!(private_key_id = %key.id, key_type = %key.key_type, "created private key");

        Ok(PrivateKey {
            id: key.id.clone(),
            name: key.name.clone(),
            key: key.key.clone(),
            key_type: key.key_type,
            is_external,
            created_at,
            updated_at,
        })
    }

    pub async fn get_private_key(&self, private_key_id: &str) -> StoreResult<PrivateKey> {
        let row = sqlx::query_as::<_, PrivateKeyRow>(
            "SELECT id, name, \"key\", type, is_external, created_at, updated_at FROM private_keys WHERE id = ?1",
        )
        .bind(private_key_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(StoreError::not_found(Entity::PrivateKey, private_key_id)),
            private_key_from_row,
        )
    }

    /// Rewrites name, material, type and the external flag in place.
    ///
    /// Rotation is normally done by creating a new key and repointing apps and
    /// servers; this is left to callers.
    pub async fn update_private_key(&self, key: &PrivateKey) -> StoreResult<PrivateKey> {
        validate(&key.id, &key.name, key.key.expose())?;
        let updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE private_keys SET name = ?2, \"key\" = ?3, type = ?4, is_external = ?5, updated_at = ?6 WHERE id = ?1",
        )
        .bind(&key.id)
        .bind(&key.name)
        .bind(key.key.expose())
        .bind(key.key_type.as_str())
        .bind(key.is_external)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::PrivateKey, &key.id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::PrivateKey, &key.id));
        }

        debug!(private_key_id = %key.id, "updated private key");
        self.get_private_key(&key.id).await
    }

    /// Fails while any GitHub App or server still uses the key.
    pub async fn delete_private_key(&self, private_key_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM private_keys WHERE id = ?1")
            .bind(private_key_id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::from_write(error, Entity::PrivateKey, private_key_id))
            .inspect_err(|error| {
                if matches!(error, StoreError::ReferentialViolation { .. }) {
                    warn!(private_key_id, "refused to delete referenced private key");
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::PrivateKey, private_key_id));
        }

        debug!(private_key_id, "deleted private key");
        Ok(())
    }

    /// Lists keys without reading their material.
    pub async fn list_private_keys(&self) -> StoreResult<Vec<PrivateKeySummary>> {
        let rows = sqlx::query_as::<_, PrivateKeySummaryRow>(
            "SELECT id, name, type, is_external, created_at, updated_at FROM private_keys ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(summary_from_row).collect()
    }
}
