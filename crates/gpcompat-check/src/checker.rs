//! Concurrent query checking
//!
//! A fixed set of workers drains one shared query channel. Each query is
//! normalized, explained on a pooled connection and classified, then counted
//! exactly once. Every `checkpoint_every` queries one worker writes the stats
//! and rule files on the blocking pool while the others carry on.

use crate::rules::RuleStore;
use crate::stats::StatsAggregator;
use gpcompat_core::{Config, ExecutionError, Outcome};
use gpcompat_sql::QueryNormalizer;
use gpcompat_target::{ConnectionPool, ExecMode, TargetConnection};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Checker errors
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("can't start less than 1 checker, got: {0}")]
    InvalidWorkerCount(usize),

    #[error("Checker worker failed: {0}")]
    WorkerFailed(String),
}

/// Worker count, checkpoint interval and output files
#[derive(Debug, Clone)]
pub struct CheckerSettings {
    pub concurrency: usize,

    /// 0 disables checkpoints
    pub checkpoint_every: u64,

    pub stats_path: Option<PathBuf>,

    /// Where refreshed rules are written
    pub rules_path: Option<PathBuf>,

    pub sort_rules_by_count: bool,

    /// Log each unknown issue as it is classified
    pub print_progress: bool,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            checkpoint_every: 0,
            stats_path: None,
            rules_path: None,
            sort_rules_by_count: true,
            print_progress: false,
        }
    }
}

impl CheckerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.check.concurrency,
            checkpoint_every: config.output.write_stats_every,
            stats_path: config.stats_file().map(PathBuf::from),
            rules_path: config.updated_rules_file().map(PathBuf::from),
            sort_rules_by_count: config.rules.sort_by_count,
            print_progress: config.output.print_progress,
        }
    }
}

/// What a run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
}

struct Shared<C> {
    pool: Arc<ConnectionPool<C>>,
    rules: Arc<RuleStore>,
    stats: Arc<StatsAggregator>,
    settings: CheckerSettings,
    processed: AtomicU64,

    /// Held while the stats and rule files are written
    checkpoint: Arc<Mutex<()>>,
}

/// Bounded worker pool over one query stream
pub struct ConcurrentChecker<C> {
    shared: Arc<Shared<C>>,
}

impl<C: TargetConnection> ConcurrentChecker<C> {
    pub fn new(
        pool: Arc<ConnectionPool<C>>,
        rules: Arc<RuleStore>,
        stats: Arc<StatsAggregator>,
        settings: CheckerSettings,
    ) -> Result<Self, CheckError> {
        if settings.concurrency < 1 {
            return Err(CheckError::InvalidWorkerCount(settings.concurrency));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                pool,
                rules,
                stats,
                settings,
                processed: AtomicU64::new(0),
                checkpoint: Arc::new(Mutex::new(())),
            }),
        })
    }

    /// Check every query from `queries` until the channel closes
    ///
    /// Returns after all workers have exited and the final snapshot is written.
    pub async fn run(&self, queries: mpsc::Receiver<String>) -> Result<RunSummary, CheckError> {
        let queries = Arc::new(Mutex::new(queries));

        let mut workers = Vec::with_capacity(self.shared.settings.concurrency);
        for id in 0..self.shared.settings.concurrency {
            let shared = self.shared.clone();
            let queries = queries.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = queries.lock().await.recv().await;
                    let Some(query) = next else { break };
                    shared.check_query(&query).await;
                    shared.after_query().await;
                }
                debug!("checker {} finished", id);
            }));
        }

        let mut failure = None;
        for worker in workers {
            if let Err(e) = worker.await {
                failure.get_or_insert_with(|| e.to_string());
            }
        }

        self.shared.persist_snapshot().await;

        match failure {
            Some(message) => Err(CheckError::WorkerFailed(message)),
            None => Ok(RunSummary {
                processed: self.shared.processed.load(Ordering::SeqCst),
            }),
        }
    }

    /// Check one query outside of `run`
    pub async fn check_query(&self, query: &str) -> Outcome {
        self.shared.check_query(query).await
    }

    /// Write stats and refreshed rules now, waiting for a running checkpoint
    pub async fn persist_snapshot(&self) {
        self.shared.persist_snapshot().await;
    }
}

impl<C: TargetConnection> Shared<C> {
    async fn check_query(&self, raw: &str) -> Outcome {
        let query = QueryNormalizer::normalize(raw);

        let result = match self.pool.get().await {
            Ok(conn) => conn.execute(&query, ExecMode::Explain).await,
            Err(e) => Err(ExecutionError::Other(e.to_string())),
        };

        let outcome = match result {
            Ok(()) => Outcome::Ok,
            Err(err) => self.rules.classify(&query, &err),
        };

        self.stats.record(&outcome, &query);

        if self.settings.print_progress {
            if let Outcome::UnknownIssue(reason) = &outcome {
                info!("Unknown issue: {}\nQuery: {}", reason, query);
            }
        }

        outcome
    }

    async fn after_query(self: &Arc<Self>) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.settings.checkpoint_every;
        if every == 0 || processed % every != 0 {
            return;
        }

        match self.checkpoint.clone().try_lock_owned() {
            Ok(guard) => {
                debug!("checkpoint after {} queries", processed);
                self.write_files_blocking(guard).await;
            }
            Err(_) => debug!("checkpoint already running, skipping {}", processed),
        }
    }

    async fn persist_snapshot(self: &Arc<Self>) {
        let guard = self.checkpoint.clone().lock_owned().await;
        self.write_files_blocking(guard).await;
    }

    /// Keeps file I/O off the async workers; the lock is held until it is done
    async fn write_files_blocking(self: &Arc<Self>, guard: OwnedMutexGuard<()>) {
        let shared = Arc::clone(self);
        let written = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            shared.write_files();
        })
        .await;

        if let Err(e) = written {
            warn!("Checkpoint writer failed: {}", e);
        }
    }

    /// Failures are logged; the in-memory state stays valid for a later attempt
    fn write_files(&self) {
        let snapshot = self.stats.snapshot();

        if let Some(path) = &self.settings.stats_path {
            if let Err(e) = snapshot.save_to_file(path) {
                warn!("Stat file write failed {:?}: {}", path, e);
            }
        }

        if let Some(path) = &self.settings.rules_path {
            self.rules.update_from_stats(&snapshot, self.settings.sort_rules_by_count);
            if let Err(e) = self.rules.write_to_file(path) {
                warn!("Failed to update rules stat {:?}: {}", path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpcompat_target::MockConnection;
    use std::time::Duration;

    fn checker(settings: CheckerSettings) -> (ConcurrentChecker<MockConnection>, MockConnection) {
        let conn = MockConnection::new("gp").with_failure(
            "broken",
            ExecutionError::Other("timeout".to_string()),
        );
        let pool = Arc::new(ConnectionPool::new(vec![conn.clone()]).unwrap());
        let checker = ConcurrentChecker::new(
            pool,
            Arc::new(RuleStore::new()),
            Arc::new(StatsAggregator::new()),
            settings,
        )
        .unwrap();
        (checker, conn)
    }

    #[test]
    fn zero_workers_is_rejected() {
        let pool = Arc::new(ConnectionPool::new(vec![MockConnection::new("gp")]).unwrap());
        let settings = CheckerSettings { concurrency: 0, ..Default::default() };
        let result = ConcurrentChecker::new(pool, Arc::new(RuleStore::new()), Arc::new(StatsAggregator::new()), settings);
        assert!(matches!(result, Err(CheckError::InvalidWorkerCount(0))));
    }

    #[tokio::test]
    async fn explains_normalized_query() {
        let (checker, conn) = checker(CheckerSettings::default());

        let outcome = checker.check_query("  SELECT * FROM s.t DISTRIBUTED RANDOMLY ").await;
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(conn.executed(), vec!["SELECT * FROM s___t"]);
        assert_eq!(conn.executed_modes(), vec![ExecMode::Explain]);
    }

    #[tokio::test]
    async fn busy_checkpoint_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let stats_path = dir.path().join("stats.yaml");
        let settings = CheckerSettings {
            checkpoint_every: 1,
            stats_path: Some(stats_path.clone()),
            ..Default::default()
        };
        let (checker, _) = checker(settings);
        let shared = &checker.shared;

        let held = shared.checkpoint.clone().try_lock_owned().unwrap();
        shared.check_query("SELECT 1").await;
        tokio::time::timeout(Duration::from_secs(5), shared.after_query())
            .await
            .expect("a busy checkpoint must not block the worker");
        assert_eq!(shared.processed.load(Ordering::SeqCst), 1);
        assert!(!stats_path.exists());

        drop(held);
        shared.check_query("SELECT 2").await;
        shared.after_query().await;
        assert!(stats_path.exists());
    }

    #[tokio::test]
    async fn transport_errors_are_unknown_issues() {
        let (checker, _) = checker(CheckerSettings::default());

        let outcome = checker.check_query("SELECT broken").await;
        assert_eq!(outcome, Outcome::UnknownIssue("non engine err: timeout".to_string()));
        assert_eq!(checker.shared.stats.total(), 1);
        assert_eq!(checker.shared.pool.idle(), 1);
    }
}
