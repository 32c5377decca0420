//! Pool behaviour under concurrent checkout

use gpcompat_target::{ConnectionPool, ExecMode, MockConnection, TargetConnection};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_bounds_concurrent_queries() {
    let base = MockConnection::new("t1").with_latency(10);
    let connections = vec![base.clone(), base.sibling("t2"), base.sibling("t1")];
    let pool = Arc::new(ConnectionPool::new(connections).unwrap());

    let mut handles = Vec::new();
    for i in 0..12 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.get().await.unwrap();
            conn.execute(&format!("SELECT {}", i), ExecMode::Explain).await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(base.executed().len(), 12);
    assert!(base.max_in_flight() <= 3);
    assert_eq!(pool.idle(), 3);
}

#[tokio::test]
async fn connections_rotate_across_targets() {
    let base = MockConnection::new("t1");
    let pool = ConnectionPool::new(vec![base.clone(), base.sibling("t2")]).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let conn = pool.get().await.unwrap();
        seen.push(conn.target().to_string());
    }

    assert_eq!(seen, vec!["t1", "t2", "t1", "t2"]);
}
