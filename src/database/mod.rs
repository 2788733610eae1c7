//! Entity Store module
//!
//! This module provides the storage contract for pets, groups and traits,
//! its backends, and (with the `database` feature) Postgres connection
//! management and configuration.

pub mod memory_store;
pub mod pet_store;

#[cfg(feature = "database")]
pub mod pet_repository;

pub use memory_store::InMemoryPetStore;
pub use pet_store::{PetFilter, PetStore, PetStoreTx, StoreError, StoreResult};

#[cfg(feature = "database")]
pub use pet_repository::PgPetStore;

#[cfg(feature = "database")]
pub use manager::{DatabaseConfig, DatabaseManager};

#[cfg(feature = "database")]
mod manager {
    use sqlx::{postgres::PgPoolOptions, PgPool};
    use std::time::Duration;
    use tracing::{info, warn};

    use super::PgPetStore;

    /// Database configuration
    #[derive(Debug, Clone)]
    pub struct DatabaseConfig {
        pub database_url: String,
        pub max_connections: u32,
        pub connection_timeout: Duration,
        pub idle_timeout: Option<Duration>,
        pub max_lifetime: Option<Duration>,
    }

    impl Default for DatabaseConfig {
        fn default() -> Self {
            Self {
                database_url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost:5432/pets".to_string()),
                max_connections: std::env::var("DATABASE_POOL_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                connection_timeout: Duration::from_secs(30),
                idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
                max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            }
        }
    }

    /// Database connection manager
    pub struct DatabaseManager {
        pool: PgPool,
    }

    impl DatabaseManager {
        /// Create a new database manager with the given configuration
        pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
            info!(
                "Connecting to database: {}",
                mask_database_url(&config.database_url)
            );

            let mut pool_options = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.connection_timeout);

            if let Some(idle_timeout) = config.idle_timeout {
                pool_options = pool_options.idle_timeout(idle_timeout);
            }

            if let Some(max_lifetime) = config.max_lifetime {
                pool_options = pool_options.max_lifetime(max_lifetime);
            }

            let pool = pool_options
                .connect(&config.database_url)
                .await
                .map_err(|e| {
                    warn!("Failed to connect to database: {}", e);
                    e
                })?;

            info!("Database connection pool created successfully");

            Ok(Self { pool })
        }

        /// Create a new database manager with default configuration
        pub async fn with_default_config() -> Result<Self, sqlx::Error> {
            Self::new(DatabaseConfig::default()).await
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }

        /// Pet store sharing this manager's pool
        pub fn pet_store(&self) -> PgPetStore {
            PgPetStore::new(self.pool.clone())
        }

        /// Test database connectivity
        pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
            sqlx::query("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map(|_| ())
        }

        /// Apply the embedded schema migrations
        pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
            info!("Running database migrations");
            sqlx::migrate!("./migrations").run(&self.pool).await?;
            info!("Database schema up to date");
            Ok(())
        }

        /// Close the database connection pool
        pub async fn close(self) {
            info!("Closing database connection pool");
            self.pool.close().await;
        }
    }

    /// Mask sensitive information in database URL for logging
    pub(crate) fn mask_database_url(url: &str) -> String {
        if let Ok(parsed) = url::Url::parse(url) {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        } else if url.chars().count() > 20 {
            let head: String = url.chars().take(10).collect();
            let tail_start = url
                .char_indices()
                .rev()
                .nth(9)
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            format!("{}***{}", head, &url[tail_start..])
        } else {
            "***".to_string()
        }
    }

}
