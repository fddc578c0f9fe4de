use std::fmt;

use sqlx::error::ErrorKind;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Relation a failed operation was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Source,
    GithubApp,
    PrivateKey,
    Server,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::GithubApp => "github app",
            Self::PrivateKey => "private key",
            Self::Server => "server",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} '{id}' already exists")]
    DuplicateKey { entity: Entity, id: String },

    #[error("{entity} '{id}' violates referential integrity: {detail}")]
    ReferentialViolation {
        entity: Entity,
        id: String,
        detail: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: Entity, id: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("failed to encode column: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(entity: Entity, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classifies an engine error raised while writing `id` into `entity`.
    pub(crate) fn from_write(error: sqlx::Error, entity: Entity, id: &str) -> Self {
        let kind = match &error {
            sqlx::Error::Database(db_error) => Some(db_error.kind()),
            _ => None,
        };
        let Some(kind) = kind else {
            return Self::from(error);
        };

        match kind {
            ErrorKind::UniqueViolation => Self::DuplicateKey {
                entity,
                id: id.to_string(),
            },
            ErrorKind::ForeignKeyViolation => Self::ReferentialViolation {
                entity,
                id: id.to_string(),
                detail: "referenced row is missing or still referenced".to_string(),
            },
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                Self::Validation(format!("{entity} '{id}': {error}"))
            }
            _ => Self::from(error),
        }
    }

    /// Whether the caller may retry the operation unchanged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

/// `SQLITE_BUSY` (5) and `SQLITE_LOCKED` (6), including their extended codes.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|code| matches!(code & 0xff, 5 | 6))
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        let busy = match &error {
            sqlx::Error::Database(db_error) => db_error
                .code()
                .is_some_and(|code| is_busy_code(&code)),
            _ => false,
        };
        if busy {
            return Self::StorageUnavailable(error);
        }

        match error {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::StorageUnavailable(error),
            other => Self::Storage(other),
        }
    }
}
