//! One query execution as recorded by the source engine

use serde::{Deserialize, Serialize};

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub process_id: i64,

    pub session_id: i64,

    /// Transaction sequence number within the session
    pub transaction_count: i64,

    /// Query sequence number within the transaction
    pub query_count: i64,

    pub query: String,

    /// False when the containing transaction failed on the source engine
    pub transaction_success: bool,
}

impl LogRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            process_id: self.process_id,
            session_id: self.session_id,
            transaction: self.transaction_count,
            query: self.query_count,
        }
    }
}

/// Position of a record in its session
///
/// Field order gives the reconstruction order: process, session,
/// transaction, query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub process_id: i64,
    pub session_id: i64,
    pub transaction: i64,
    pub query: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_record() {
        let line = r#"{"process_id":12,"session_id":3,"transaction_count":7,"query_count":1,"query":"SELECT 1","transaction_success":true}"#;
        let record: LogRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.query, "SELECT 1");
        assert_eq!(
            record.key(),
            RecordKey { process_id: 12, session_id: 3, transaction: 7, query: 1 }
        );
    }

    #[test]
    fn keys_order_by_session_then_sequence() {
        let a = RecordKey { process_id: 1, session_id: 9, transaction: 9, query: 9 };
        let b = RecordKey { process_id: 2, session_id: 0, transaction: 0, query: 0 };
        let c = RecordKey { process_id: 2, session_id: 0, transaction: 0, query: 1 };
        assert!(a < b);
        assert!(b < c);
    }
}
