//! Mock target connection for testing
//!
//! Returns scripted results without talking to any engine. Clones share
//! state, so a test can keep one handle while the pool owns the others and
//! inspect what was executed afterwards.
//!
//! ```rust,ignore
//! let conn = MockConnection::new("gp")
//!     .with_latency(5)
//!     .with_failure("DISTRIBUTED", ExecutionError::Other("boom".into()));
//! ```

use crate::adapter::{ExecMode, TargetConnection};
use async_trait::async_trait;
use gpcompat_core::ExecutionError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    /// First failure whose needle occurs in the query wins
    failures: Mutex<Vec<(String, ExecutionError)>>,

    executed: Mutex<Vec<(String, ExecMode)>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Scripted connection
#[derive(Clone)]
pub struct MockConnection {
    target: String,
    latency_ms: u64,
    state: Arc<MockState>,
}

impl MockConnection {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            latency_ms: 0,
            state: Arc::new(MockState::default()),
        }
    }

    /// Fail every query containing `needle` with `error`
    pub fn with_failure(self, needle: impl Into<String>, error: ExecutionError) -> Self {
        self.state.failures.lock().push((needle.into(), error));
        self
    }

    /// Simulate query latency (milliseconds)
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    /// Another connection to the same target sharing this one's script and log
    pub fn sibling(&self, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            latency_ms: self.latency_ms,
            state: Arc::clone(&self.state),
        }
    }

    /// Queries executed so far, in completion order
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn executed_modes(&self) -> Vec<ExecMode> {
        self.state.executed.lock().iter().map(|(_, m)| *m).collect()
    }

    /// Highest number of queries that ran at the same time
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetConnection for MockConnection {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self, query: &str, mode: ExecMode) -> Result<(), ExecutionError> {
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        let result = self
            .state
            .failures
            .lock()
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, err)| err.clone());

        self.state.executed.lock().push((query.to_string(), mode));
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failures() {
        let conn = MockConnection::new("gp").with_failure("bad", ExecutionError::Other("nope".to_string()));

        assert!(conn.execute("SELECT 1", ExecMode::Explain).await.is_ok());
        assert_eq!(
            conn.execute("SELECT bad", ExecMode::Explain).await,
            Err(ExecutionError::Other("nope".to_string()))
        );
        assert_eq!(conn.executed(), vec!["SELECT 1", "SELECT bad"]);
        assert_eq!(conn.executed_modes(), vec![ExecMode::Explain, ExecMode::Explain]);
    }

    #[tokio::test]
    async fn siblings_share_log() {
        let first = MockConnection::new("a");
        let second = first.sibling("b");

        second.execute("SELECT 2", ExecMode::Execute).await.unwrap();
        assert_eq!(first.executed(), vec!["SELECT 2"]);
        assert_eq!(second.target(), "b");
    }
}
