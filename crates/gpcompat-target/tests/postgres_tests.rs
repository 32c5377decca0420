//! Explain mode against a live PostgreSQL-wire target
//!
//! These tests need a running engine and are marked with `#[ignore]`.
//!
//! ```bash
//! GPCOMPAT_TEST_CONNECTION="host=localhost port=5432 user=postgres dbname=postgres" \
//! cargo test -p gpcompat-target --features postgres --test postgres_tests -- --ignored
//! ```

/// Connection string of the test target, if one is configured
fn test_connection() -> Option<String> {
    std::env::var("GPCOMPAT_TEST_CONNECTION").ok()
}

#[tokio::test]
#[ignore]
async fn explain_accepts_ddl_without_running_it() {
    let Some(connection) = test_connection() else {
        eprintln!("Skipping PostgreSQL test: GPCOMPAT_TEST_CONNECTION not set");
        return;
    };

    #[cfg(feature = "postgres")]
    {
        use gpcompat_core::ExecutionError;
        use gpcompat_target::{ExecMode, PgConnection, TargetConnection};

        let conn = PgConnection::connect(&connection, "target1")
            .await
            .expect("Failed to connect to test target");

        for query in [
            "CREATE TABLE gpcompat_explain_only (a int)",
            "TRUNCATE gpcompat_explain_only",
            "VACUUM",
            "SET search_path TO public",
        ] {
            let result = conn.execute(query, ExecMode::Explain).await;
            assert!(result.is_ok(), "{}: {:?}", query, result);
        }

        // The CREATE above was only parsed
        let err = conn
            .execute("SELECT a FROM gpcompat_explain_only", ExecMode::Explain)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Engine { ref code, .. } if code == "42P01"), "{:?}", err);
    }

    #[cfg(not(feature = "postgres"))]
    {
        let _ = connection;
        eprintln!("PostgreSQL feature not enabled. Rebuild with --features postgres");
    }
}

#[tokio::test]
#[ignore]
async fn explain_rejects_multiple_statements() {
    let Some(connection) = test_connection() else {
        eprintln!("Skipping PostgreSQL test: GPCOMPAT_TEST_CONNECTION not set");
        return;
    };

    #[cfg(feature = "postgres")]
    {
        use gpcompat_core::ExecutionError;
        use gpcompat_target::{ExecMode, PgConnection, TargetConnection};

        let conn = PgConnection::connect(&connection, "target1")
            .await
            .expect("Failed to connect to test target");

        let err = conn
            .execute("SELECT 1; DROP TABLE gpcompat_never", ExecMode::Explain)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Engine { ref code, .. } if code == "42601"), "{:?}", err);
    }

    #[cfg(not(feature = "postgres"))]
    {
        let _ = connection;
        eprintln!("PostgreSQL feature not enabled. Rebuild with --features postgres");
    }
}
