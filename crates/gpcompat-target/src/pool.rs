//! Fixed-size connection pool

use crate::adapter::TargetConnection;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Deref;
use tokio::sync::Semaphore;

/// Errors from pool bring-up and checkout
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Connection pool has no connections")]
    Empty,

    #[error("Connection pool is closed")]
    Closed,

    #[error("Failed to connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("Connection pool bring-up timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Hands out connections one caller at a time
///
/// `get` waits until a connection is idle. The connection goes back to the
/// pool when the returned guard drops, including on panic or task abort.
pub struct ConnectionPool<C> {
    idle: Mutex<VecDeque<C>>,
    available: Semaphore,
    size: usize,
}

impl<C: TargetConnection> ConnectionPool<C> {
    pub fn new(connections: Vec<C>) -> Result<Self, PoolError> {
        if connections.is_empty() {
            return Err(PoolError::Empty);
        }

        let size = connections.len();
        Ok(Self {
            idle: Mutex::new(connections.into()),
            available: Semaphore::new(size),
            size,
        })
    }

    /// Take an idle connection, waiting for one if all are in use
    pub async fn get(&self) -> Result<PooledConnection<'_, C>, PoolError> {
        let permit = self.available.acquire().await.map_err(|_| PoolError::Closed)?;
        let conn = self.idle.lock().pop_front().ok_or(PoolError::Closed)?;
        permit.forget();
        Ok(PooledConnection { pool: self, conn: Some(conn) })
    }

    fn put_back(&self, conn: C) {
        self.idle.lock().push_back(conn);
        self.available.add_permits(1);
    }

    /// Total number of connections
    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not checked out right now
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Fail pending and future `get` calls
    pub fn close(&self) {
        self.available.close();
    }
}

/// A checked-out connection; dropping it returns the connection
pub struct PooledConnection<'a, C: TargetConnection> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C>,
}

impl<C: TargetConnection> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `drop` takes the connection out
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: TargetConnection> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn get_and_drop() {
        let pool = ConnectionPool::new(vec![MockConnection::new("a"), MockConnection::new("b")]).unwrap();
        assert_eq!(pool.size(), 2);

        let first = pool.get().await.unwrap();
        let second = pool.get().await.unwrap();
        assert_eq!(first.target(), "a");
        assert_eq!(second.target(), "b");
        assert_eq!(pool.idle(), 0);

        drop(first);
        let again = pool.get().await.unwrap();
        assert_eq!(again.target(), "a");

        drop(again);
        drop(second);
        assert_eq!(pool.idle(), 2);
    }

    #[tokio::test]
    async fn get_waits_for_release() {
        let pool = Arc::new(ConnectionPool::new(vec![MockConnection::new("only")]).unwrap());
        let conn = pool.get().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get().await.map(|c| c.target().to_string()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(conn);
        assert_eq!(waiter.await.unwrap().unwrap(), "only");
    }

    #[tokio::test]
    async fn connection_returns_when_holder_panics() {
        let pool = Arc::new(ConnectionPool::new(vec![MockConnection::new("only")]).unwrap());

        let holder = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let conn = pool.get().await.unwrap();
                panic!("check on {} failed", conn.target());
            })
        };
        assert!(holder.await.unwrap_err().is_panic());

        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.get().await.unwrap().target(), "only");
    }

    #[tokio::test]
    async fn connection_returns_when_holder_is_aborted() {
        let pool = Arc::new(ConnectionPool::new(vec![MockConnection::new("only")]).unwrap());

        let holder = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _conn = pool.get().await.unwrap();
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        };
        while pool.idle() > 0 {
            tokio::task::yield_now().await;
        }

        holder.abort();
        assert!(holder.await.unwrap_err().is_cancelled());
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_get() {
        let pool = ConnectionPool::new(vec![MockConnection::new("a")]).unwrap();
        pool.close();
        assert!(matches!(pool.get().await, Err(PoolError::Closed)));
    }

    #[test]
    fn empty_pool_is_an_error() {
        let result = ConnectionPool::<MockConnection>::new(Vec::new());
        assert!(matches!(result, Err(PoolError::Empty)));
    }
}
