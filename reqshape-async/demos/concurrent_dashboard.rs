//! # Concurrent Dashboard Example
//!
//! Many widgets refresh at once and ask for overlapping data. The shaper
//! batches their reads, answers repeats from the cache and keeps the backend
//! inside its rate limit.
//!
//! Run with `RUST_LOG=reqshape_async=debug` to see batches and evictions.

use reqshape_async::transport::{ScriptedTransport, Step};
use reqshape_async::{Priority, Request, RequestShaper, ShaperConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const WIDGETS: [&str; 4] = ["/api/users", "/api/orders", "/api/revenue", "/api/alerts"];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Concurrent Dashboard Example ===\n");

    // Every call takes 600ms, so fresh reads are cached for a minute
    let transport = ScriptedTransport::new().with_fallback(Step::Echo.after(Duration::from_millis(600)));
    let config = ShaperConfig {
        batch_size: 4,
        ..ShaperConfig::default()
    };
    let shaper = Arc::new(
        RequestShaper::start(config, Arc::new(transport)).expect("default config is valid"),
    );

    let mut tasks = JoinSet::new();
    for round in 0..3 {
        for widget in WIDGETS {
            let shaper = Arc::clone(&shaper);
            tasks.spawn(async move {
                let response = shaper.get(widget).await;
                (round, widget, response)
            });
        }
        tokio::time::sleep(Duration::from_millis(700)).await;
    }

    while let Some(joined) = tasks.join_next().await {
        let (round, widget, response) = joined.expect("widget task panicked");
        match response {
            Ok(response) => println!(
                "round {round} {widget:<14} -> {} (cached: {})",
                response.status_code, response.from_cache
            ),
            Err(err) => println!("round {round} {widget:<14} -> error: {err}"),
        }
    }

    // A save button bypasses the queue and invalidates cached reads
    let saved = shaper
        .request(
            Request::post("/api/orders", serde_json::json!({"id": 17, "status": "shipped"}))
                .with_priority(Priority::High),
        )
        .await;
    println!("\nsave -> {:?}", saved.map(|r| r.status_code));

    let report = shaper
        .prewarm(WIDGETS.iter().map(|target| Request::get(*target).with_priority(Priority::Critical)))
        .await;
    println!("prewarm -> {report:?}");

    let stats = serde_json::to_string_pretty(&shaper.stats()).expect("stats serialize");
    println!("\n=== Stats ===\n{stats}");

    shaper.dispose().await;
}
