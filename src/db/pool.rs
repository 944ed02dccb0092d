use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgPool, Postgres};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Owns the process's single Postgres pool.
///
/// Built once at startup and shared through `AppState`. The pool does its
/// own slot accounting, so callers never lock around it.
#[derive(Debug)]
pub struct ConnectionManager {
    pool: PgPool,
    operation_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}

impl ConnectionManager {
    /// Builds the pool and proves the backend answers before returning.
    /// An unreachable backend is an error here so the caller can refuse to
    /// start serving.
    pub async fn initialize(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let manager = Self::connect_lazy(config)?;

        let probe = async {
            let mut conn = manager.pool.acquire().await?;
            conn.ping().await
        };

        match timeout(config.connect_timeout(), probe).await {
            Ok(Ok(())) => {
                info!(
                    "Database reachable, pool ready (max={}, min={})",
                    config.max_connections, config.min_connections
                );
                Ok(manager)
            }
            Ok(Err(e)) => {
                error!("Database liveness probe failed: {}", e);
                manager.pool.close().await;
                Err(DatabaseError::ConnectionError(e.to_string()))
            }
            Err(_) => {
                error!("Database liveness probe timed out after {:?}", config.connect_timeout());
                manager.pool.close().await;
                Err(DatabaseError::ConnectionError("liveness probe timed out".into()))
            }
        }
    }

    /// Builds the pool without touching the network. Connections are opened
    /// on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let statement_timeout = config.socket_timeout().as_millis().to_string();
        let connect_options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| DatabaseError::ConnectionError(format!("invalid connection string: {}", e)))?
            .options([("statement_timeout", statement_timeout.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(config.idle_timeout())
            .acquire_timeout(config.server_selection_timeout())
            .connect_lazy_with(connect_options);

        Ok(Self {
            pool,
            operation_timeout: config.operation_timeout(),
        })
    }

    /// A fresh context for exactly one storage operation. Release it as soon
    /// as that operation is done; never hand it to a second one.
    pub fn new_operation_context(&self) -> OperationContext {
        OperationContext {
            id: Uuid::new_v4(),
            pool: self.pool.clone(),
            started: Instant::now(),
            deadline: Instant::now() + self.operation_timeout,
        }
    }

    pub fn pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Deadline-bound handle for a single storage operation.
///
/// Both waiting for a pool slot and the backend round-trip are cut off at
/// the same fixed deadline; whatever is in flight at that point is dropped
/// and reported as [`DatabaseError::Timeout`]. Not `Clone`.
#[derive(Debug)]
pub struct OperationContext {
    id: Uuid,
    pool: PgPool,
    started: Instant,
    deadline: Instant,
}

impl OperationContext {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Waits for a pool slot, but no later than the deadline.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DatabaseError> {
        self.within(self.pool.acquire()).await
    }

    /// Runs one backend call under the deadline.
    pub async fn within<T, F>(&self, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout_at(self.deadline, fut).await {
            Ok(result) => result.map_err(DatabaseError::from),
            Err(_) => {
                warn!(
                    "Operation {} exceeded its deadline after {:?}",
                    self.id,
                    self.started.elapsed()
                );
                Err(DatabaseError::Timeout)
            }
        }
    }

    /// Ends the operation. Dropping the context has the same effect.
    pub fn release(self) {}
}

impl Drop for OperationContext {
    fn drop(&mut self) {
        debug!("Operation {} released after {:?}", self.id, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn config() -> DatabaseConfig {
        Settings::new_for_test().unwrap().database
    }

    #[tokio::test]
    async fn test_invalid_connection_string() {
        let mut config = config();
        config.url = "not a connection string".to_string();
        let result = ConnectionManager::connect_lazy(&config);
        assert!(matches!(result, Err(DatabaseError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_context_deadline_is_fixed() {
        let manager = ConnectionManager::connect_lazy(&config()).unwrap();
        let before = Instant::now();
        let ctx = manager.new_operation_context();

        let ttl = config().operation_timeout();
        assert!(ctx.deadline() >= before + ttl);
        assert!(ctx.remaining() <= ttl);
        ctx.release();
    }

    #[tokio::test]
    async fn test_each_context_gets_its_own_deadline() {
        let manager = ConnectionManager::connect_lazy(&config()).unwrap();
        let first = manager.new_operation_context();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = manager.new_operation_context();
        assert!(second.deadline() > first.deadline());
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let manager = ConnectionManager::connect_lazy(&config()).unwrap();
        let ctx = manager.new_operation_context();

        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, sqlx::Error>(())
        };
        let started = Instant::now();
        let result = ctx.within(slow).await;

        assert!(matches!(result, Err(DatabaseError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_within_passes_results_through() {
        let manager = ConnectionManager::connect_lazy(&config()).unwrap();
        let ctx = manager.new_operation_context();

        let ok = ctx.within(async { Ok::<_, sqlx::Error>(7) }).await.unwrap();
        assert_eq!(ok, 7);

        let err = ctx
            .within(async { Err::<(), _>(sqlx::Error::RowNotFound) })
            .await;
        assert!(matches!(err, Err(DatabaseError::NotFound)));
    }

    #[tokio::test]
    async fn test_lazy_pool_starts_empty() {
        let manager = ConnectionManager::connect_lazy(&config()).unwrap();
        let status = manager.pool_status();
        assert_eq!(status.active_connections + status.idle_connections, status.total_connections);
        assert!(status.total_connections <= 10);
    }
}
