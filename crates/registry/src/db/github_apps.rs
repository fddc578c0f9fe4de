use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::require;
use super::{DbClient, GithubApp};
use crate::error::{Entity, StoreError, StoreResult};

const GITHUB_APP_COLUMNS: &str = "id, slug, client_id, node_id, owner, name, description, external_url, html_url, created_at, updated_at, permissions, events, source_id, client_secret, webhook_secret, private_key_id";

#[derive(sqlx::FromRow)]
struct GithubAppRow {
    id: String,
    slug: String,
    client_id: String,
    node_id: String,
    owner: String,
    name: String,
    description: String,
    external_url: String,
    html_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    permissions: String,
    events: String,
    source_id: String,
    client_secret: String,
    webhook_secret: String,
    private_key_id: String,
}

impl TryFrom<GithubAppRow> for GithubApp {
    type Error = StoreError;

    fn try_from(row: GithubAppRow) -> Result<Self, Self::Error> {
        Ok(Self {
            owner: serde_json::from_str(&row.owner)?,
            permissions: serde_json::from_str(&row.permissions)?,
            events: serde_json::from_str(&row.events)?,
            id: row.id,
            slug: row.slug,
            client_id: row.client_id,
            node_id: row.node_id,
            name: row.name,
            description: row.description,
            external_url: row.external_url,
            html_url: row.html_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            source_id: row.source_id,
            client_secret: row.client_secret.into(),
            webhook_secret: row.webhook_secret.into(),
            private_key_id: row.private_key_id,
        })
    }
}

/// Columns holding JSON, serialized once per write.
struct EncodedColumns {
    owner: String,
    permissions: String,
    events: String,
}

fn validate(app: &GithubApp) -> StoreResult<EncodedColumns> {
    require("github app id", &app.id)?;
    require("github app slug", &app.slug)?;
    require("github app client id", &app.client_id)?;
    require("github app node id", &app.node_id)?;
    require("github app name", &app.name)?;
    require("github app source id", &app.source_id)?;
    require("github app private key id", &app.private_key_id)?;
    require("github app client secret", app.client_secret.expose())?;
    require("github app webhook secret", app.webhook_secret.expose())?;

    Ok(EncodedColumns {
        owner: serde_json::to_string(&app.owner)?,
        permissions: serde_json::to_string(&app.permissions)?,
        events: serde_json::to_string(&app.events)?,
    })
}

#[allow(clippy::missing_errors_doc)]
impl DbClient {
    /// Stores an App exactly as provided, including its GitHub-side timestamps.
    pub async fn create_github_app(&self, app: &GithubApp) -> StoreResult<GithubApp> {
        let encoded = validate(app)?;

        sqlx::query(
            "INSERT INTO github_apps (id, slug, client_id, node_id, owner, name, description, external_url, html_url, created_at, updated_at, permissions, events, source_id, client_secret, webhook_secret, private_key_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )
        .bind(&app.id)
        .bind(&app.slug)
        .bind(&app.client_id)
        .bind(&app.node_id)
        .bind(&encoded.owner)
        .bind(&app.name)
        .bind(&app.description)
        .bind(&app.external_url)
        .bind(&app.html_url)
        .bind(app.created_at)
        .bind(app.updated_at)
        .bind(&encoded.permissions)
        .bind(&encoded.events)
        .bind(&app.source_id)
        .bind(app.client_secret.expose())
        .bind(app.webhook_secret.expose())
        .bind(&app.private_key_id)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::GithubApp, &app.id))?;

        debug!(
            github_app_id = %app.id,
            slug = %app.slug,
            source_id = %app.source_id,
            "created github app"
        );

        Ok(app.clone())
    }

    pub async fn get_github_app(&self, github_app_id: &str) -> StoreResult<GithubApp> {
        let row = sqlx::query_as::<_, GithubAppRow>(&format!(
            "SELECT {GITHUB_APP_COLUMNS} FROM github_apps WHERE id = ?1"
        ))
        .bind(github_app_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(StoreError::not_found(Entity::GithubApp, github_app_id)),
            GithubApp::try_from,
        )
    }

    /// Replaces every field but `id` and `created_at` with the given values.
    pub async fn update_github_app(&self, app: &GithubApp) -> StoreResult<GithubApp> {
        let encoded = validate(app)?;

        let result = sqlx::query(
            "UPDATE github_apps SET slug = ?2, client_id = ?3, node_id = ?4, owner = ?5, name = ?6, description = ?7, external_url = ?8, html_url = ?9, updated_at = ?10, permissions = ?11, events = ?12, source_id = ?13, client_secret = ?14, webhook_secret = ?15, private_key_id = ?16 WHERE id = ?1",
        )
        .bind(&app.id)
        .bind(&app.slug)
        .bind(&app.client_id)
        .bind(&app.node_id)
        .bind(&encoded.owner)
        .bind(&app.name)
        .bind(&app.description)
        .bind(&app.external_url)
        .bind(&app.html_url)
        .bind(app.updated_at)
        .bind(&encoded.permissions)
        .bind(&encoded.events)
        .bind(&app.source_id)
        .bind(app.client_secret.expose())
        .bind(app.webhook_secret.expose())
        .bind(&app.private_key_id)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::GithubApp, &app.id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::GithubApp, &app.id));
        }

        debug!(github_app_id = %app.id, "updated github app");
        self.get_github_app(&app.id).await
    }

    pub async fn delete_github_app(&self, github_app_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM github_apps WHERE id = ?1")
            .bind(github_app_id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::from_write(error, Entity::GithubApp, github_app_id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::GithubApp, github_app_id));
        }

        debug!(github_app_id, "deleted github app");
        Ok(())
    }

    pub async fn list_github_apps(&self) -> StoreResult<Vec<GithubApp>> {
        let rows = sqlx::query_as::<_, GithubAppRow>(&format!(
            "SELECT {GITHUB_APP_COLUMNS} FROM github_apps ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GithubApp::try_from).collect()
    }

    pub async fn list_github_apps_for_source(&self, source_id: &str) -> StoreResult<Vec<GithubApp>> {
        let rows = sqlx::query_as::<_, GithubAppRow>(&format!(
            "SELECT {GITHUB_APP_COLUMNS} FROM github_apps WHERE source_id = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GithubApp::try_from).collect()
    }

    pub async fn list_github_apps_for_private_key(
        &self,
        private_key_id: &str,
    ) -> StoreResult<Vec<GithubApp>> {
        let rows = sqlx::query_as::<_, GithubAppRow>(&format!(
            "SELECT {GITHUB_APP_COLUMNS} FROM github_apps WHERE private_key_id = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(private_key_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GithubApp::try_from).collect()
    }
}
