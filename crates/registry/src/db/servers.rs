use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{require, require_port};
use super::{write_timestamps, DbClient, NewServer, Server};
use crate::error::{Entity, StoreError, StoreResult};

type ServerRow = (
    String,
    String,
    String,
    i64,
    bool,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SERVER_COLUMNS: &str =
    "id, name, hostname, port, is_validated, private_key_id, created_at, updated_at";

fn server_from_row(row: ServerRow) -> StoreResult<Server> {
    let (id, name, hostname, port, is_validated, private_key_id, created_at, updated_at) = row;
    let port = u16::try_from(port)
        .map_err(|_| StoreError::validation(format!("server '{id}' has invalid port {port}")))?;

    Ok(Server {
        id,
        name,
        hostname,
        port,
        is_validated,
        private_key_id,
        created_at,
        updated_at,
    })
}

fn validate(id: &str, name: &str, hostname: &str, port: u16, private_key_id: &str) -> StoreResult<()> {
    require("server id", id)?;
    require("server name", name)?;
    require("server hostname", hostname)?;
    require_port(port)?;
    require("server private key id", private_key_id)
}

#[allow(clippy::missing_errors_doc)]
impl DbClient {
    /// Registers a deploy target; it starts unvalidated unless stated otherwise.
    pub async fn create_server(&self, server: &NewServer) -> StoreResult<Server> {
        validate(
            &server.id,
            &server.name,
            &server.hostname,
            server.port,
            &server.private_key_id,
        )?;
        let (created_at, updated_at) = write_timestamps(server.created_at, server.updated_at);
        let is_validated = server.is_validated.unwrap_or(false);

        sqlx::query(
            "INSERT INTO servers (id, name, hostname, port, is_validated, private_key_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.hostname)
        .bind(i64::from(server.port))
        .bind(is_validated)
        .bind(&server.private_key_id)
        .bind(created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::Server, &server.id))?;

        debug!(server_id = %server.id, hostname = %server.hostname, "created server");

        Ok(Server {
            id: server.id.clone(),
            name: server.name.clone(),
            hostname: server.hostname.clone(),
            port: server.port,
            is_validated,
            private_key_id: server.private_key_id.clone(),
            created_at,
            updated_at,
        })
    }

    pub async fn get_server(&self, server_id: &str) -> StoreResult<Server> {
        let row = sqlx::query_as::<_, ServerRow>(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1"
        ))
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(
            || Err(StoreError::not_found(Entity::Server, server_id)),
            server_from_row,
        )
    }

    pub async fn update_server(&self, server: &Server) -> StoreResult<Server> {
        validate(
            &server.id,
            &server.name,
            &server.hostname,
            server.port,
            &server.private_key_id,
        )?;
        let updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE servers SET name = ?2, hostname = ?3, port = ?4, is_validated = ?5, private_key_id = ?6, updated_at = ?7 WHERE id = ?1",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.hostname)
        .bind(i64::from(server.port))
        .bind(server.is_validated)
        .bind(&server.private_key_id)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::Server, &server.id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Server, &server.id));
        }

        debug!(server_id = %server.id, "updated server");
        self.get_server(&server.id).await
    }

    /// Records the outcome of an external connectivity check.
    pub async fn set_server_validated(&self, server_id: &str, is_validated: bool) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE servers SET is_validated = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(server_id)
        .bind(is_validated)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::from_write(error, Entity::Server, server_id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Server, server_id));
        }

        debug!(server_id, is_validated, "set server validation state");
        Ok(())
    }

    pub async fn delete_server(&self, server_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?1")
            .bind(server_id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::from_write(error, Entity::Server, server_id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Server, server_id));
        }

        debug!(server_id, "deleted server");
        Ok(())
    }

    pub async fn list_servers(&self) -> StoreResult<Vec<Server>> {
        let rows = sqlx::query_as::<_, ServerRow>(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(server_from_row).collect()
    }

    pub async fn list_servers_for_private_key(
        &self,
        private_key_id: &str,
    ) -> StoreResult<Vec<Server>> {
        let rows = sqlx::query_as::<_, ServerRow>(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers WHERE private_key_id = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(private_key_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(server_from_row).collect()
    }
}
