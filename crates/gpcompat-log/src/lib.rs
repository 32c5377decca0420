//! Source engine session logs
//!
//! This crate handles:
//! - Decoding newline-delimited JSON query records (optionally gzip-compressed)
//! - Reconstructing ordered sessions, transactions and queries from unordered logs
//! - Producing the flat query stream consumed by the checker workers

pub mod record;
pub mod reader;
pub mod sessions;
pub mod stream;
pub mod progress;

pub use record::{LogRecord, RecordKey};
pub use reader::{LogReader, LogError, open_log};
pub use sessions::{Session, Transaction, Query, SessionReconstructor, session_queries};
pub use stream::{StreamConfig, StreamSummary, spawn_query_stream};
pub use progress::{Progress, note_stderr_write};
