use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::types::require;
use super::{write_timestamps, DbClient, NewSource, Source, SourceType};
use crate::error::{Entity, StoreError, StoreResult};

type SourceRow = (String, String, String, DateTime<Utc>, DateTime<Utc>);

fn source_from_row(row: SourceRow) -> StoreResult<Source> {
    let (id, name, source_type, created_at, updated_at) = row;
    Ok(Source {
        id,
        name,
        source_type: source_type.parse::<SourceType>()?,
        created_at,
        updated_at,
    })
}

fn validate(id: &str, name: &str) -> StoreResult<()> {
    require("source id", id)?;
    require("source name", name)
}

#[allow(clippy::missing_errors_doc)]
impl DbClient {
    pub async fn create_source(&self, source: &NewSource) -> StoreResult<Source> {
        validate(&source.id, &source.name)?;
        let (created_at, updated_at) = write_timestamps(source.created_at, source.updated_at);

        sqlx::query(
            "INSERT INTO sources (id, name, type, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(source.source_type.as_str())
        .bind(created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::Source, &source.id))?;

        debug!(source_id = %source.id, "created source");

        Ok(Source {
            id: source.id.clone(),
            name: source.name.clone(),
            source_type: source.source_type,
            created_at,
            updated_at,
        })
    }

    pub async fn get_source(&self, source_id: &str) -> StoreResult<Source> {
        let row = sqlx::query_as::<_, SourceRow>(
            "SELECT id, name, type, created_at, updated_at FROM sources WHERE id = ?1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(StoreError::not_found(Entity::Source, source_id)),
            source_from_row,
        )
    }

    /// Replaces the name and type of an existing source and stamps `updated_at`.
    pub async fn update_source(&self, source: &Source) -> StoreResult<Source> {
        validate(&source.id, &source.name)?;
        let updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE sources SET name = ?2, type = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(source.source_type.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::Source, &source.id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Source, &source.id));
        }

        debug!(source_id = %source.id, "updated source");
        self.get_source(&source.id).await
    }

    /// Fails while any GitHub App still belongs to the source.
    pub async fn delete_source(&self, source_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ?1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::from_write(error, Entity::Source, source_id))
            .inspect_err(|error| {
                if matches!(error, StoreError::ReferentialViolation { .. }) {
                    warn!(source_id, "refused to delete referenced source");
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Source, source_id));
        }

        debug!(source_id, "deleted source");
        Ok(())
    }

    pub async fn list_sources(&self) -> StoreResult<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT id, name, type, created_at, updated_at FROM sources ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(source_from_row).collect()
    }
}
