//! Target engine execution
//!
//! Queries are checked against the target engine through a pool of
//! connections. Connections implement [`TargetConnection`]; the pool hands
//! them out one at a time behind a guard that returns them on drop.
//!
//! ## Features
//!
//! - `postgres` - targets reachable over the PostgreSQL wire protocol
//! - `tls` - TLS connections for the `postgres` adapter
//!
//! ## Example
//!
//! ```rust,ignore
//! use gpcompat_target::{PgConnection, ExecMode, TargetConnection};
//!
//! let pool = PgConnection::open_pool(&["host=localhost port=5432".into()], 4, timeout, false).await?;
//! let conn = pool.get().await?;
//! let result = conn.execute("SELECT 1", ExecMode::Explain).await;
//! ```

pub mod adapter;
pub mod pool;
pub mod postgres;
pub mod mock;

pub use adapter::{TargetConnection, ExecMode};
pub use pool::{ConnectionPool, PoolError, PooledConnection};
pub use postgres::{PgConnection, sqlstate_class_name};
pub use mock::MockConnection;
