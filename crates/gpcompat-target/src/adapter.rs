//! Connection trait for target engines

use async_trait::async_trait;
use gpcompat_core::ExecutionError;

/// How a query is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Parse and analyze only, nothing is executed
    Explain,

    /// Run the statement
    Execute,
}

/// A live connection to the target engine
///
/// Implementations speak the target's declared SQL-compatibility dialect;
/// any result handle is released before `execute` returns, whether or not
/// the query failed.
#[async_trait]
pub trait TargetConnection: Send + Sync + 'static {
    /// Label of the target this connection belongs to
    fn target(&self) -> &str;

    /// Submit one query
    async fn execute(&self, query: &str, mode: ExecMode) -> Result<(), ExecutionError>;
}
