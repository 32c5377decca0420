//! Session reconstruction from unordered logs
//!
//! Records from many concurrent source sessions arrive interleaved. They are
//! collected under a composite `(pid, sid, txn, query)` key, then grouped in
//! key order so queries replay in the order each source session ran them.

use crate::record::{LogRecord, RecordKey};
use std::collections::BTreeMap;
use tracing::warn;

/// One query in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub number: i64,
    pub text: String,
}

/// Ordered group of queries sharing a transaction number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub number: i64,

    /// False when any contained query was logged as failed
    pub success: bool,

    pub queries: Vec<Query>,
}

/// One source client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub process_id: i64,
    pub session_id: i64,
    pub transactions: Vec<Transaction>,
}

impl Session {
    /// Display id, `<pid>-<sid>`
    pub fn id(&self) -> String {
        format!("{}-{}", self.process_id, self.session_id)
    }

    pub fn query_count(&self) -> usize {
        self.transactions.iter().map(|t| t.queries.len()).sum()
    }
}

/// Collects unordered records and emits ordered sessions
#[derive(Debug, Default)]
pub struct SessionReconstructor {
    records: BTreeMap<RecordKey, LogRecord>,
    duplicates: usize,
}

impl SessionReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; a repeated key is reported and the later record dropped
    pub fn push(&mut self, record: LogRecord) -> bool {
        let key = record.key();
        if self.records.contains_key(&key) {
            warn!(
                "duplicated record: {}/{}/{}/{}",
                key.process_id, key.session_id, key.transaction, key.query
            );
            self.duplicates += 1;
            return false;
        }

        self.records.insert(key, record);
        true
    }

    /// Number of distinct records collected
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of dropped duplicate records
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Group collected records into sessions, ascending by pid then sid,
    /// transactions by number, queries by number
    pub fn finish(self) -> Vec<Session> {
        let mut sessions: Vec<Session> = Vec::new();

        for (key, record) in self.records {
            let same_session = sessions
                .last()
                .is_some_and(|s| s.process_id == key.process_id && s.session_id == key.session_id);
            if !same_session {
                sessions.push(Session {
                    process_id: key.process_id,
                    session_id: key.session_id,
                    transactions: Vec::new(),
                });
            }
            let Some(session) = sessions.last_mut() else {
                continue;
            };

            let same_transaction = session
                .transactions
                .last()
                .is_some_and(|t| t.number == key.transaction);
            if !same_transaction {
                session.transactions.push(Transaction {
                    number: key.transaction,
                    success: true,
                    queries: Vec::new(),
                });
            }
            let Some(transaction) = session.transactions.last_mut() else {
                continue;
            };

            transaction.success &= record.transaction_success;
            transaction.queries.push(Query {
                number: key.query,
                text: record.query,
            });
        }

        sessions
    }
}

/// Flatten sessions into query texts in execution order
///
/// Queries of failed transactions are left out unless `include_failed` is set.
pub fn session_queries(sessions: &[Session], include_failed: bool) -> impl Iterator<Item = &str> {
    sessions
        .iter()
        .flat_map(|s| s.transactions.iter())
        .filter(move |t| include_failed || t.success)
        .flat_map(|t| t.queries.iter().map(|q| q.text.as_str()))
}
