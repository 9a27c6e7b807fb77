//! Database settings, connection setup and the sea-orm backed policy store.

mod store;

pub use store::SeaOrmPolicyStore;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing: set {0}")]
    MissingUrl(String),
    #[error("database connection failed")]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default)]
    max_connections: Option<u32>,
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(default_url_key())
    }
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            max_connections: None,
        }
    }

    /// Reads `DATABASE_URL` and the optional `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|raw| raw.trim().parse().ok());
        Self {
            max_connections,
            ..Self::default()
        }
    }

    pub fn database_url(&self) -> DbResult<String> {
        std::env::var(&self.env_key).map_err(|_| DbError::MissingUrl(self.env_key.clone()))
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    connect_url(&settings.database_url()?, settings.max_connections).await
}

pub async fn connect_url(url: &str, max_connections: Option<u32>) -> DbResult<DbPool> {
    let mut options = ConnectOptions::new(url.to_owned());
    options.sqlx_logging(false);
    if let Some(max) = max_connections {
        options.max_connections(max);
    }
    let pool = Database::connect(options).await?;
    debug!(backend = ?pool.get_database_backend(), "database connected");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_names_the_variable() {
        let settings = DatabaseSettings::new("GRANT_TEST_UNSET_DATABASE_URL");
        let err = settings.database_url().unwrap_err();
        assert_eq!(
            err.to_string(),
            "database url missing: set GRANT_TEST_UNSET_DATABASE_URL"
        );
    }

    #[tokio::test]
    async fn connects_to_sqlite() {
        let pool = connect_url("sqlite::memory:", Some(1)).await.unwrap();
        assert_eq!(pool.get_database_backend(), sea_orm::DatabaseBackend::Sqlite);
    }
}
