//! Client integration tests.
//!
//! These tests require a running PostgreSQL instance. They are ignored by
//! default and can be run with:
//!
//! ```bash
//! export PG_CONNINFO="host=localhost user=postgres password=postgres dbname=postgres"
//! cargo test -p pg-client --test integration -- --ignored
//! ```

use std::time::Duration;

use pg_client::{
    cancel, request, request_on, ConnectionInfo, ConnectionStatus, Error, Query, RowBuffer,
    TimeConstraint,
};

fn conninfo() -> ConnectionInfo {
    let conninfo = std::env::var("PG_CONNINFO").expect("PG_CONNINFO required");
    ConnectionInfo::new(conninfo)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_simple_query_via_info_provider() {
    let info = conninfo();
    let mut buf = RowBuffer::new();

    request(
        &info,
        &Query::new("SELECT 1"),
        TimeConstraint::In(Duration::from_secs(1)),
        &mut buf,
    )
    .await
    .expect("request failed");

    assert_eq!(buf.len(), 1);
    let value: i32 = buf.iter().next().expect("one row").get(0).expect("int4");
    assert_eq!(value, 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_typed_collection() {
    let info = conninfo();
    let mut out: Vec<(i32,)> = Vec::new();

    request(
        &info,
        &Query::new("SELECT generate_series(1, 3)"),
        TimeConstraint::In(Duration::from_secs(1)),
        &mut out,
    )
    .await
    .expect("request failed");

    assert_eq!(out, vec![(1,), (2,), (3,)]);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_connection_reuse() {
    let info = conninfo();
    let mut conn = info
        .connect(TimeConstraint::In(Duration::from_secs(1)))
        .await
        .expect("connect failed");

    for _ in 0..3 {
        let mut buf = RowBuffer::new();
        request_on(
            &mut conn,
            &Query::new("SELECT 1"),
            TimeConstraint::In(Duration::from_secs(1)),
            &mut buf,
        )
        .await
        .expect("request failed");
        assert_eq!(buf.len(), 1);
        assert_eq!(conn.status(), ConnectionStatus::Idle);
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_request_timeout_cancels_server_side() {
    let info = conninfo();
    let mut conn = info
        .connect(TimeConstraint::In(Duration::from_secs(1)))
        .await
        .expect("connect failed");

    let mut buf = RowBuffer::new();
    let outcome = request_on(
        &mut conn,
        &Query::new("SELECT pg_sleep(10)"),
        TimeConstraint::In(Duration::from_millis(100)),
        &mut buf,
    )
    .await;

    match outcome {
        Err(Error::Timeout) | Err(Error::OperationAborted) => {}
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(conn.status(), ConnectionStatus::Bad);
    assert!(!conn.is_open());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_cancel_with_immediate_wait_timeout() {
    let info = conninfo();
    let mut conn = info
        .connect(TimeConstraint::In(Duration::from_secs(1)))
        .await
        .expect("connect failed");

    // A wait bound this tight loses the race against the blocking dispatch;
    // the in-flight cancel keeps running on its executor and is discarded.
    let outcome = cancel(&mut conn, TimeConstraint::In(Duration::from_nanos(1))).await;

    assert!(matches!(outcome, Err(Error::OperationAborted)));
    assert!(!conn.is_open());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_server_error_surfaces_message() {
    let info = conninfo();
    let mut buf = RowBuffer::new();

    let outcome = request(
        &info,
        &Query::new("SELECT no_such_column FROM pg_type"),
        TimeConstraint::In(Duration::from_secs(1)),
        &mut buf,
    )
    .await;

    match outcome {
        Err(Error::Server { sqlstate, message }) => {
            assert_eq!(sqlstate.as_deref(), Some("42703"));
            assert!(!message.is_empty());
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_oid_map_preload() {
    let conninfo = std::env::var("PG_CONNINFO").expect("PG_CONNINFO required");
    let info = ConnectionInfo::new(conninfo).register_type("int4");

    let conn = info
        .connect(TimeConstraint::In(Duration::from_secs(1)))
        .await
        .expect("connect failed");

    assert_eq!(conn.oid_map().oid_of("int4"), Some(23));
}
