mod common;

use common::{init_tracing, test_config};
use reqshape_async::transport::{ScriptedTransport, Step};
use reqshape_async::{
    Connection, ExecuteOptions, Priority, Request, RequestError, RequestShaper, RetryingExecutor,
    ShaperConfig,
};
use reqshape_core::{ConnectionPool, TtlCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn executor(transport: Arc<ScriptedTransport>) -> RetryingExecutor {
    let cache = Arc::new(TtlCache::new(100, Duration::from_secs(300)));
    let pool = Arc::new(ConnectionPool::new(10, Duration::from_secs(30), Connection::open));
    RetryingExecutor::new(transport, cache, pool)
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success() {
    init_tracing();
    let transport = Arc::new(
        ScriptedTransport::new()
            .then(Step::fail("connection reset"))
            .then(Step::fail("connection reset"))
            .then(Step::ok(br#"{"ok":true}"#.to_vec())),
    );
    let executor = executor(transport.clone());
    let options = ExecuteOptions {
        timeout: Duration::from_millis(1000),
        retries: 3,
    };

    let started = Instant::now();
    let response = executor.execute(&Request::get("/flaky"), options).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.text(), r#"{"ok":true}"#);
    assert_eq!(transport.attempts(), 3);
    // 1s after the first failure, 2s after the second
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3100), "elapsed {elapsed:?}");

    assert_eq!(executor.total_requests(), 1);
    assert_eq!(executor.failed_requests(), 0);
    assert_eq!(executor.retries(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried_with_same_backoff() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .then(Step::Hang)
            .then(Step::ok(b"late".to_vec())),
    );
    let executor = executor(transport.clone());
    let options = ExecuteOptions {
        timeout: Duration::from_millis(1000),
        retries: 3,
    };

    let started = Instant::now();
    let response = executor.execute(&Request::get("/hang-once"), options).await.unwrap();

    assert_eq!(response.value, b"late");
    assert_eq!(transport.attempts(), 2);
    // one timed-out attempt plus a 1s backoff
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(executor.pool().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_wraps_last_error() {
    let transport = Arc::new(ScriptedTransport::new().with_fallback(Step::fail("refused")));
    let executor = executor(transport.clone());

    let err = executor
        .execute(&Request::get("/down"), ExecuteOptions::default().with_retries(4))
        .await
        .unwrap_err();

    match &err {
        RequestError::ExhaustedRetries { attempts, last } => {
            assert_eq!(*attempts, 4);
            assert!(matches!(**last, RequestError::TransportFailure { .. }));
        }
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
    assert_eq!(transport.attempts(), 4);
    assert_eq!(executor.total_requests(), 1);
    assert_eq!(executor.failed_requests(), 1);
    assert!(!executor.cache().contains(&Request::get("/down").cache_key()));
}

#[tokio::test(start_paused = true)]
async fn test_shaper_retries_direct_requests() {
    let config = ShaperConfig {
        retries: 2,
        ..test_config()
    };
    let transport = Arc::new(ScriptedTransport::new().then(Step::fail("blip")));
    let shaper = RequestShaper::start(config, transport.clone()).unwrap();

    let response = shaper
        .request(Request::get("/retry-me").with_priority(Priority::Critical))
        .await
        .unwrap();
    assert_eq!(response.value, b"/retry-me");

    let stats = shaper.stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.failed_requests, 0);

    shaper.dispose().await;
}
