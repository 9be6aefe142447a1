use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::fs;
use tracing::debug;

use crate::config::{StoreConfig, StoreLocation};
use crate::error::StoreError;

/// Handle to the embedded match database. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        if let StoreLocation::File(path) = &config.location {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let options = config.connect_options()?;
        let pool = match config.location {
            // Each in-memory connection is its own database, so pin exactly one for the pool's lifetime.
            StoreLocation::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(config.busy_timeout()),
            StoreLocation::File(_) => SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .acquire_timeout(config.busy_timeout()),
        }
        .connect_with(options)
        .await?;

        debug!(location = %config.location, "opened match store");
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    let store = Store::open_in_memory().await.expect("in-memory store");
    crate::schema::init_schema(&store).await.expect("schema");
    store
}
