use reqshape::{
    CachedCall, Priority, Request, RequestError, RequestShaper, ScriptedTransport, ShaperConfig,
    Step, TtlCache,
};
use serial_test::serial;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> ShaperConfig {
    ShaperConfig {
        batch_size: 2,
        timeout_ms: 250,
        backoff_base_ms: 10,
        ..ShaperConfig::default()
    }
}

#[tokio::test]
#[serial]
async fn test_end_to_end_through_facade() {
    let transport = Arc::new(ScriptedTransport::new());
    let shaper = Arc::new(RequestShaper::start(config(), transport.clone()).unwrap());

    let (a, b) = tokio::join!(shaper.get("/dash/users"), shaper.get("/dash/orders"));
    assert_eq!(a.unwrap().value, b"/dash/users");
    assert_eq!(b.unwrap().value, b"/dash/orders");

    let again = shaper.get("/dash/users").await.unwrap();
    assert!(again.from_cache);

    let stats = shaper.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.batches_flushed, 1);
    assert_eq!(stats.hits, 1);

    shaper.dispose().await;
    assert_eq!(
        shaper.get("/dash/users").await.unwrap_err(),
        RequestError::ShuttingDown
    );
}

#[tokio::test]
#[serial]
async fn test_low_priority_reads_skip_batching() {
    let transport = Arc::new(ScriptedTransport::new().then(Step::ok(b"bg".to_vec())));
    let shaper = RequestShaper::start(config(), transport).unwrap();

    let response = shaper
        .request(Request::get("/background").with_priority(Priority::Low))
        .await
        .unwrap();
    assert_eq!(response.value, b"bg");
    assert_eq!(shaper.dispatcher().batches_flushed(), 0);

    shaper.dispose().await;
}

#[tokio::test]
async fn test_cached_call_over_shared_cache() {
    static CALLS: AtomicU32 = AtomicU32::new(0);

    let cache = Arc::new(TtlCache::new(10, Duration::from_secs(60)));
    let lookup = CachedCall::new(cache, |id: &u32| format!("user:{id}"), |id: u32| async move {
        CALLS.fetch_add(1, Ordering::SeqCst);
        if id == 0 {
            Err(RequestError::TransportFailure {
                message: "no such user".into(),
            })
        } else {
            Ok(format!("user-{id}"))
        }
    });

    assert_eq!(lookup.call(7).await.unwrap(), "user-7");
    assert_eq!(lookup.call(7).await.unwrap(), "user-7");
    assert!(lookup.call(0).await.is_err());
    assert!(lookup.call(0).await.is_err());
    assert_eq!(CALLS.load(Ordering::SeqCst), 3);
}
