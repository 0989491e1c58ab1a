//! Database primitives: pool settings, connection setup and the employee store.

mod employees;

pub use employees::{EmployeeStore, MemoryEmployeeStore, SeaOrmEmployeeStore};

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use thiserror::Error;
use tracing::info;

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

const DEFAULT_URL_KEY: &str = "DATABASE_URL";
const MAX_CONNECTIONS_KEY: &str = "DATABASE_MAX_CONNECTIONS";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing")]
    MissingUrl,
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    env_key: String,
    url: Option<String>,
    max_connections: Option<u32>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(DEFAULT_URL_KEY)
    }
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            url: None,
            max_connections: None,
        }
    }

    pub fn from_env() -> Self {
        let max_connections = std::env::var(MAX_CONNECTIONS_KEY)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok());
        Self {
            max_connections,
            ..Self::default()
        }
    }

    /// Pin the URL instead of reading it from the environment.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn database_url(&self) -> DbResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        std::env::var(&self.env_key)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or(DbError::MissingUrl)
    }

    pub fn max_connections(&self) -> Option<u32> {
        self.max_connections
    }
}

/// Open a pooled connection using `settings`.
pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url()?;
    let mut options = ConnectOptions::new(url);
    if let Some(max) = settings.max_connections {
        options.max_connections(max);
    }
    let pool = Database::connect(options).await?;
    info!(backend = ?pool.get_database_backend(), "database connected");
    Ok(pool)
}
