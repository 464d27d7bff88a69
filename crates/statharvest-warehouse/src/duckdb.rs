//! `DuckDB` connection pool management.
//!
//! Every pooled connection is cloned from a single root connection so that all
//! handles share one database instance and one file lock.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

use crate::WarehouseError;

struct PoolState {
    root: Option<Connection>,
    idle: Vec<Connection>,
}

struct PoolInner {
    db_path: PathBuf,
    max_pool_size: usize,
    state: Mutex<PoolState>,
}

/// A connection pool manager for `DuckDB` connections.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Create a new connection pool manager.
    ///
    /// The database file is not touched until the first [`acquire`](Self::acquire).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_pool_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path: path.into(),
                max_pool_size: max_pool_size.max(1),
                state: Mutex::new(PoolState {
                    root: None,
                    idle: Vec::new(),
                }),
            }),
        }
    }

    /// Acquire a connection from the pool, opening the database on first use.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured,
    /// or if a previous holder of the pool lock panicked.
    pub fn acquire(&self) -> Result<PooledConnection, WarehouseError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| WarehouseError::PoolPoisoned)?;

        let connection = match state.idle.pop() {
            Some(connection) => connection,
            None => {
                let root = match state.root.take() {
                    Some(root) => root,
                    None => Connection::open(self.inner.db_path.as_path())?,
                };
                let cloned = root.try_clone();
                state.root = Some(root);
                let connection = cloned?;
                configure_connection(&connection)?;
                connection
            }
        };
        drop(state);

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Number of idle connections currently held by the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.idle.len())
            .unwrap_or_default()
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the connection out.
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        if let Ok(mut state) = self.pool.state.lock() {
            if state.idle.len() < self.pool.max_pool_size {
                state.idle.push(connection);
            }
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(())
}
