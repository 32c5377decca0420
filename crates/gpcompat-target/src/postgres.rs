//! Target engines speaking the PostgreSQL wire protocol
//!
//! Greenplum, PostgreSQL and the engines that emulate them all accept
//! PostgreSQL-dialect SQL over this protocol. Server errors carry a SQLSTATE
//! code whose class becomes the engine error name.
//!
//! ```rust,ignore
//! let pool = PgConnection::open_pool(
//!     &["host=gp1 port=5432 user=root dbname=local".to_string()],
//!     4,
//!     Duration::from_secs(10),
//!     false,
//! ).await?;
//! ```

use crate::adapter::{ExecMode, TargetConnection};
use crate::pool::{ConnectionPool, PoolError};
use async_trait::async_trait;
use gpcompat_core::ExecutionError;
use std::time::Duration;

#[cfg(feature = "postgres")]
use gpcompat_core::Issue;

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, NoTls};

#[cfg(feature = "tls")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "tls")]
use native_tls::TlsConnector;

/// One connection to a PostgreSQL-wire target
pub struct PgConnection {
    #[cfg(feature = "postgres")]
    client: Client,

    target: String,
}

impl PgConnection {
    /// Connect without TLS
    #[cfg(feature = "postgres")]
    pub async fn connect(connection: &str, target: impl Into<String>) -> Result<Self, PoolError> {
        let target = target.into();
        let (client, conn) = tokio_postgres::connect(connection, NoTls)
            .await
            .map_err(|e| PoolError::Connect {
                target: target.clone(),
                message: e.to_string(),
            })?;

        let label = target.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::error!("connection error ({}): {}", label, e);
            }
        });

        Ok(Self { client, target })
    }

    #[cfg(not(feature = "postgres"))]
    pub async fn connect(_connection: &str, _target: impl Into<String>) -> Result<Self, PoolError> {
        Err(PoolError::ConfigError(
            "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres".to_string(),
        ))
    }

    /// Connect over TLS
    #[cfg(feature = "tls")]
    pub async fn connect_with_tls(connection: &str, target: impl Into<String>) -> Result<Self, PoolError> {
        let target = target.into();
        let connector = TlsConnector::new()
            .map_err(|e| PoolError::ConfigError(format!("Failed to create TLS connector: {}", e)))?;
        let tls = MakeTlsConnector::new(connector);

        let (client, conn) = tokio_postgres::connect(connection, tls)
            .await
            .map_err(|e| PoolError::Connect {
                target: target.clone(),
                message: e.to_string(),
            })?;

        let label = target.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::error!("connection error ({}): {}", label, e);
            }
        });

        Ok(Self { client, target })
    }

    #[cfg(not(feature = "tls"))]
    pub async fn connect_with_tls(_connection: &str, _target: impl Into<String>) -> Result<Self, PoolError> {
        Err(PoolError::ConfigError(
            "TLS support not compiled. Rebuild with: cargo build --features tls".to_string(),
        ))
    }

    /// Open `per_target` connections to every target and verify each one
    ///
    /// Connections are interleaved across targets so consecutive checkouts
    /// spread over all of them. The whole bring-up must finish within
    /// `timeout`; any failure fails the pool.
    pub async fn open_pool(
        connections: &[String],
        per_target: usize,
        timeout: Duration,
        tls: bool,
    ) -> Result<ConnectionPool<Self>, PoolError> {
        if connections.is_empty() {
            return Err(PoolError::Empty);
        }

        let bring_up = async {
            let mut opened = Vec::with_capacity(connections.len() * per_target);
            for _ in 0..per_target.max(1) {
                for (idx, connection) in connections.iter().enumerate() {
                    let target = format!("target{}", idx + 1);
                    let conn = if tls {
                        Self::connect_with_tls(connection, target).await?
                    } else {
                        Self::connect(connection, target).await?
                    };

                    conn.execute("SELECT 1", ExecMode::Execute)
                        .await
                        .map_err(|e| PoolError::Connect {
                            target: conn.target.clone(),
                            message: e.to_string(),
                        })?;
                    opened.push(conn);
                }
            }
            tracing::debug!("opened {} connections to {} targets", opened.len(), connections.len());
            ConnectionPool::new(opened)
        };

        tokio::time::timeout(timeout, bring_up)
            .await
            .map_err(|_| PoolError::Timeout(timeout.as_secs()))?
    }
}

#[async_trait]
impl TargetConnection for PgConnection {
    fn target(&self) -> &str {
        &self.target
    }

    #[cfg(feature = "postgres")]
    async fn execute(&self, query: &str, mode: ExecMode) -> Result<(), ExecutionError> {
        // Parse accepts every statement kind, DDL and utility commands
        // included, and never runs it. Multi-statement text is rejected.
        let result = match mode {
            ExecMode::Explain => self.client.prepare(query).await.map(|_| ()),
            ExecMode::Execute => self.client.batch_execute(query).await,
        };

        result.map_err(engine_error)
    }

    #[cfg(not(feature = "postgres"))]
    async fn execute(&self, _query: &str, _mode: ExecMode) -> Result<(), ExecutionError> {
        Err(ExecutionError::Other("PostgreSQL support not compiled".to_string()))
    }
}

#[cfg(feature = "postgres")]
fn engine_error(err: tokio_postgres::Error) -> ExecutionError {
    let Some(db) = err.as_db_error() else {
        return ExecutionError::Other(err.to_string());
    };

    let code = db.code().code().to_string();
    let mut issues = vec![Issue::new(code.clone(), db.message())];
    if let Some(detail) = db.detail() {
        issues.push(Issue::new(code.clone(), format!("DETAIL: {}", detail)));
    }
    if let Some(hint) = db.hint() {
        issues.push(Issue::new(code.clone(), format!("HINT: {}", hint)));
    }

    ExecutionError::Engine {
        name: sqlstate_class_name(&code).to_string(),
        code,
        issues,
    }
}

/// Name of the SQLSTATE class a code belongs to
pub fn sqlstate_class_name(code: &str) -> &'static str {
    match code.get(..2).unwrap_or("") {
        "00" => "successful_completion",
        "01" => "warning",
        "02" => "no_data",
        "03" => "sql_statement_not_yet_complete",
        "08" => "connection_exception",
        "09" => "triggered_action_exception",
        "0A" => "feature_not_supported",
        "0B" => "invalid_transaction_initiation",
        "0F" => "locator_exception",
        "0L" => "invalid_grantor",
        "0P" => "invalid_role_specification",
        "0Z" => "diagnostics_exception",
        "20" => "case_not_found",
        "21" => "cardinality_violation",
        "22" => "data_exception",
        "23" => "integrity_constraint_violation",
        "24" => "invalid_cursor_state",
        "25" => "invalid_transaction_state",
        "26" => "invalid_sql_statement_name",
        "27" => "triggered_data_change_violation",
        "28" => "invalid_authorization_specification",
        "2B" => "dependent_privilege_descriptors_still_exist",
        "2D" => "invalid_transaction_termination",
        "2F" => "sql_routine_exception",
        "34" => "invalid_cursor_name",
        "38" => "external_routine_exception",
        "39" => "external_routine_invocation_exception",
        "3B" => "savepoint_exception",
        "3D" => "invalid_catalog_name",
        "3F" => "invalid_schema_name",
        "40" => "transaction_rollback",
        "42" => "syntax_error_or_access_rule_violation",
        "44" => "with_check_option_violation",
        "53" => "insufficient_resources",
        "54" => "program_limit_exceeded",
        "55" => "object_not_in_prerequisite_state",
        "57" => "operator_intervention",
        "58" => "system_error",
        "72" => "snapshot_too_old",
        "F0" => "config_file_error",
        "HV" => "fdw_error",
        "P0" => "plpgsql_error",
        "XX" => "internal_error",
        _ => "unknown_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes() {
        assert_eq!(sqlstate_class_name("42601"), "syntax_error_or_access_rule_violation");
        assert_eq!(sqlstate_class_name("0A000"), "feature_not_supported");
        assert_eq!(sqlstate_class_name("XX000"), "internal_error");
        assert_eq!(sqlstate_class_name("ZZ999"), "unknown_error");
        assert_eq!(sqlstate_class_name(""), "unknown_error");
    }

    #[tokio::test]
    async fn empty_connection_list() {
        let result = PgConnection::open_pool(&[], 2, Duration::from_secs(1), false).await;
        assert!(matches!(result, Err(PoolError::Empty)));
    }
}
