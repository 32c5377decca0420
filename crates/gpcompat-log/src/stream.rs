//! Query stream producers
//!
//! The producer runs on a blocking task and feeds a bounded channel shared by
//! all checker workers. Dropping the sender closes the channel, which is how
//! workers learn the stream is exhausted.

use crate::progress::Progress;
use crate::reader::{LogError, LogReader};
use crate::sessions::{session_queries, Session, SessionReconstructor};
use gpcompat_core::InputConfig;
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How the log is turned into a query stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Reconstruct sessions first (log is not globally ordered)
    pub need_sort: bool,

    pub include_failed: bool,

    /// 0 means unlimited
    pub requests_limit: usize,

    /// 0 disables progress lines
    pub progress_every: usize,

    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn from_input(input: &InputConfig, channel_capacity: usize) -> Self {
        Self {
            need_sort: input.need_sort,
            include_failed: input.include_failed,
            requests_limit: input.requests_limit,
            progress_every: input.progress_every,
            channel_capacity: channel_capacity.max(1),
        }
    }
}

/// What the producer did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub records_read: usize,
    pub queries_sent: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub truncated: bool,
}

/// Start producing queries from `reader` on a blocking task
pub fn spawn_query_stream<R>(
    reader: LogReader<R>,
    config: StreamConfig,
) -> (mpsc::Receiver<String>, JoinHandle<StreamSummary>)
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

    let handle = tokio::task::spawn_blocking(move || {
        let mut summary = StreamSummary::default();
        if config.need_sort {
            let sessions = read_sessions(reader, &config, &mut summary);
            send_sessions(&sessions, &config, &tx, &mut summary);
        } else {
            pass_through(reader, &config, &tx, &mut summary);
        }
        summary
    });

    (rx, handle)
}

/// Returns false when reading must stop
fn note_error(err: LogError, summary: &mut StreamSummary) -> bool {
    if err.is_recoverable() {
        warn!("{}", err);
        summary.malformed += 1;
        return true;
    }

    if matches!(err, LogError::Truncated { .. }) {
        summary.truncated = true;
    }
    warn!("{}; keeping records read so far", err);
    false
}

/// Stream records as they are read; the log is already ordered
fn pass_through<R: BufRead>(
    reader: LogReader<R>,
    config: &StreamConfig,
    tx: &mpsc::Sender<String>,
    summary: &mut StreamSummary,
) {
    let mut progress = Progress::new("Read items", config.progress_every);

    for item in reader {
        if config.requests_limit > 0 && summary.queries_sent >= config.requests_limit {
            info!("Count limit reached");
            break;
        }

        let record = match item {
            Ok(record) => record,
            Err(err) => {
                if note_error(err, summary) {
                    continue;
                }
                break;
            }
        };
        summary.records_read += 1;

        if !record.transaction_success && !config.include_failed {
            continue;
        }

        if tx.blocking_send(record.query).is_err() {
            debug!("query consumers are gone, stop reading");
            break;
        }
        summary.queries_sent += 1;
        progress.tick(summary.queries_sent, config.requests_limit);
    }

    info!("Read file completed, read items: {}", summary.records_read);
}

fn read_sessions<R: BufRead>(
    reader: LogReader<R>,
    config: &StreamConfig,
    summary: &mut StreamSummary,
) -> Vec<Session> {
    let mut reconstructor = SessionReconstructor::new();

    info!("Start reading file...");
    for item in reader {
        if config.requests_limit > 0 && summary.records_read >= config.requests_limit {
            info!("Reached limit for parse request count: {}", config.requests_limit);
            break;
        }

        match item {
            Ok(record) => {
                summary.records_read += 1;
                reconstructor.push(record);
            }
            Err(err) => {
                if !note_error(err, summary) {
                    break;
                }
            }
        }
    }

    summary.duplicates = reconstructor.duplicates();
    info!("Scanned entries: {}", reconstructor.len());
    reconstructor.finish()
}

fn send_sessions(
    sessions: &[Session],
    config: &StreamConfig,
    tx: &mpsc::Sender<String>,
    summary: &mut StreamSummary,
) {
    let total = session_queries(sessions, config.include_failed).count();
    info!("Sessions: {}, queries to check: {}", sessions.len(), total);

    let mut progress = Progress::new("Checking query", config.progress_every);
    for query in session_queries(sessions, config.include_failed) {
        if tx.blocking_send(query.to_string()).is_err() {
            debug!("query consumers are gone, stop sending");
            return;
        }
        summary.queries_sent += 1;
        progress.tick(summary.queries_sent, total);
    }
}
