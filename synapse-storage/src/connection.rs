//! Connection pooling for the durable graph store.
//!
//! A thin pool over SurrealDB's `engine::any` connection: a semaphore bounds
//! in-flight operations, connections are created lazily and reused, and
//! acquisition is guarded by a timeout so callers never block indefinitely on
//! an unavailable store.
//!
//! The embedded `memory` endpoint keeps a single underlying connection,
//! since every `mem://` connection is its own isolated database.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use synapse_core::config::DatabaseSettings;
use synapse_core::error::{Result, SynapseError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// "memory" for the embedded engine, or a ws:// / http:// endpoint.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool: PoolOptions,
}

impl StoreConfig {
    /// Embedded in-memory store, used by tests.
    pub fn memory() -> Self {
        Self {
            endpoint: "memory".to_string(),
            namespace: "synapse".to_string(),
            database: "graph".to_string(),
            username: None,
            password: None,
            pool: PoolOptions::default(),
        }
    }

    /// Remote store at the given endpoint.
    pub fn remote(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::memory()
        }
    }

    fn is_memory(&self) -> bool {
        self.endpoint == "memory"
    }
}

impl From<&DatabaseSettings> for StoreConfig {
    fn from(settings: &DatabaseSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            namespace: settings.namespace.clone(),
            database: settings.database.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            pool: PoolOptions {
                max_connections: settings.max_connections,
                acquire_timeout: Duration::from_millis(settings.acquire_timeout_ms),
                retry: RetryOptions {
                    max_attempts: settings.retry_attempts,
                    initial_backoff: Duration::from_millis(settings.retry_backoff_ms),
                    multiplier: 2.0,
                },
            },
        }
    }
}

/// Pool sizing and timeout options.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum concurrent store operations.
    pub max_connections: usize,
    /// Timeout for acquiring a pool slot.
    pub acquire_timeout: Duration,
    /// Retry policy for connection establishment.
    pub retry: RetryOptions,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
            retry: RetryOptions::default(),
        }
    }
}

/// Exponential-backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }
}

impl RetryOptions {
    /// Backoff before the given 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff.mul_f64(factor)
    }
}

/// Bounded pool of SurrealDB connections.
pub struct StorePool {
    config: StoreConfig,
    connections: RwLock<Vec<Arc<Surreal<Any>>>>,
    next: AtomicUsize,
    permits: Arc<Semaphore>,
}

impl StorePool {
    /// Connect to the store and apply the graph schema.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        info!(endpoint = %config.endpoint, "connecting graph store");

        let pool = Self {
            permits: Arc::new(Semaphore::new(config.pool.max_connections)),
            connections: RwLock::new(Vec::new()),
            next: AtomicUsize::new(0),
            config,
        };

        let db = pool.create_connection().await?;
        crate::schema::init_schema(&db).await?;
        pool.connections.write().push(db);

        Ok(pool)
    }

    /// Acquire a connection slot, bounded by the configured timeout.
    pub async fn acquire(&self) -> Result<StoreConnection> {
        let permit = timeout(
            self.config.pool.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| SynapseError::timeout("store connection acquisition"))?
        .map_err(|_| SynapseError::database("connection pool closed"))?;

        let db = self.checkout().await?;
        Ok(StoreConnection { db, _permit: permit })
    }

    /// Pick an existing connection round-robin, creating one when the pool
    /// has headroom. The embedded memory engine always reuses its single
    /// connection.
    async fn checkout(&self) -> Result<Arc<Surreal<Any>>> {
        let limit = if self.config.is_memory() {
            1
        } else {
            self.config.pool.max_connections
        };

        {
            let connections = self.connections.read();
            if connections.len() >= limit {
                let idx = self.next.fetch_add(1, Ordering::Relaxed) % connections.len();
                return Ok(connections[idx].clone());
            }
        }

        let db = self.create_connection().await?;
        let mut connections = self.connections.write();
        if connections.len() < limit {
            connections.push(db.clone());
        }
        Ok(db)
    }

    async fn create_connection(&self) -> Result<Arc<Surreal<Any>>> {
        let retry = &self.config.pool.retry;
        let mut attempt = 0;

        loop {
            match self.try_create_connection().await {
                Ok(db) => return Ok(db),
                Err(e) if attempt < retry.max_attempts && e.is_retryable() => {
                    attempt += 1;
                    let delay = retry.delay(attempt);
                    warn!(
                        attempt,
                        max = retry.max_attempts,
                        error = %e,
                        "store connection failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_create_connection(&self) -> Result<Arc<Surreal<Any>>> {
        let target = if self.config.is_memory() {
            "mem://".to_string()
        } else {
            self.config.endpoint.clone()
        };

        debug!(endpoint = %target, "creating store connection");

        let db: Surreal<Any> = surrealdb::engine::any::connect(target)
            .await
            .map_err(|e| SynapseError::database(format!("connect failed: {e}")))?;

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            db.signin(surrealdb::opt::auth::Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await
            .map_err(|e| SynapseError::database(format!("authentication failed: {e}")))?;
        }

        db.use_ns(&self.config.namespace)
            .use_db(&self.config.database)
            .await
            .map_err(|e| SynapseError::database(format!("namespace selection failed: {e}")))?;

        Ok(Arc::new(db))
    }

    /// Number of established connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Available pool slots.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A pooled connection slot. The permit is released on drop.
#[derive(Debug)]
pub struct StoreConnection {
    db: Arc<Surreal<Any>>,
    _permit: OwnedSemaphorePermit,
}

impl StoreConnection {
    /// The underlying SurrealDB handle.
    pub fn connection(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_reuses_single_connection() {
        let pool = StorePool::connect(StoreConfig::memory()).await.unwrap();
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop((a, b));
        assert_eq!(pool.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let mut config = StoreConfig::memory();
        config.pool.max_connections = 1;
        config.pool.acquire_timeout = Duration::from_millis(50);

        let pool = StorePool::connect(config).await.unwrap();
        let held = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, SynapseError::Timeout(_)));
        drop(held);

        // Slot is available again after release.
        pool.acquire().await.unwrap();
    }

    #[test]
    fn test_retry_backoff_grows() {
        let retry = RetryOptions::default();
        assert!(retry.delay(2) > retry.delay(1));
    }
}
