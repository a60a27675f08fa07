use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use marketflow_core::{Extreme, MarketflowError, Mode, Pair, Source};
use marketflow_feeds::{FeedEndpoint, SyntheticConfig};
use marketflow_services::{
    CoordinatorConfig, IngestionCoordinator, MemoryCache, PipelineConfig, QueryEngine,
    SqliteStore, Store,
};

/// Accepts one client and streams BTCUSDT lines until the client hangs up
async fn spawn_fake_feed(price: f64) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        let mut buf = [0u8; 64];
        loop {
            tokio::select! {
                read = socket.read(&mut buf) => match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                },
                _ = ticker.tick() => {
                    let line = format!(
                        "{{\"symbol\":\"BTCUSDT\",\"price\":{},\"timestamp\":1700000000000}}\n",
                        price
                    );
                    if socket.write_all(line.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    (address, task)
}

fn create_test_config(endpoints: Vec<FeedEndpoint>) -> CoordinatorConfig {
    CoordinatorConfig {
        live_endpoints: endpoints,
        pipeline: PipelineConfig {
            batch_window: Duration::from_millis(50),
            ..PipelineConfig::default()
        },
        synthetic: SyntheticConfig {
            interval: Duration::from_millis(20),
            ..SyntheticConfig::default()
        },
        ..CoordinatorConfig::default()
    }
}

async fn wait_for_buffer(coordinator: &IngestionCoordinator) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.buffer_len().await == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no snapshot reached the buffer");
}

#[tokio::test]
async fn test_switch_live_to_test_closes_feeds_and_flushes() {
    let mut endpoints = Vec::new();
    let mut feeds = Vec::new();
    for (source, price) in Source::FEEDS.iter().zip([60000.5, 60100.0, 59900.0]) {
        let (address, task) = spawn_fake_feed(price).await;
        endpoints.push(FeedEndpoint::new(source.as_str(), address));
        feeds.push(task);
    }

    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let cache = Arc::new(MemoryCache::new());
    let coordinator =
        IngestionCoordinator::new(store.clone(), cache.clone(), create_test_config(endpoints));

    coordinator.start(Mode::Live).await.unwrap();
    assert_eq!(coordinator.active_mode().await, Some(Mode::Live));
    wait_for_buffer(&coordinator).await;

    coordinator.switch_mode(Mode::Test).await.unwrap();
    assert_eq!(coordinator.active_mode().await, Some(Mode::Test));

    // Every live socket is hung up by the time the switch returns
    for feed in feeds {
        tokio::time::timeout(Duration::from_secs(5), feed)
            .await
            .expect("live feed was not closed")
            .unwrap();
    }

    // The live generation's buffer was flushed on the way out
    let highest = store
        .extreme(Extreme::Highest, Source::All, Pair::BtcUsdt, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(highest.price, 60100.0);
    let lowest = store
        .extreme(Extreme::Lowest, Source::Source3, Pair::BtcUsdt, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lowest.price, 59900.0);

    let err = coordinator.switch_mode(Mode::Test).await.unwrap_err();
    assert!(matches!(err, MarketflowError::Conflict(_)));

    coordinator.stop_listening().await;
    assert_eq!(coordinator.active_mode().await, None);
}

#[tokio::test]
async fn test_live_start_without_reachable_feeds_leaves_coordinator_idle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let coordinator = IngestionCoordinator::new(
        Arc::new(SqliteStore::new_in_memory().unwrap()),
        Arc::new(MemoryCache::new()),
        create_test_config(vec![FeedEndpoint::new("Source1", address)]),
    );

    let err = coordinator.start(Mode::Live).await.unwrap_err();
    assert!(matches!(err, MarketflowError::SourceUnavailable { .. }));
    assert_eq!(coordinator.active_mode().await, None);

    // An idle coordinator can still be switched to a working mode
    coordinator.switch_mode(Mode::Test).await.unwrap();
    assert_eq!(coordinator.active_mode().await, Some(Mode::Test));

    coordinator.stop_listening().await;
}

#[tokio::test]
async fn test_queries_see_unflushed_test_mode_data() {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let cache = Arc::new(MemoryCache::new());
    let coordinator =
        IngestionCoordinator::new(store.clone(), cache.clone(), create_test_config(Vec::new()));
    let engine = QueryEngine::new(coordinator.clone(), store.clone(), cache.clone());

    coordinator.start(Mode::Test).await.unwrap();
    wait_for_buffer(&coordinator).await;

    let base = Pair::BtcUsdt.base_price();
    let highest = engine
        .extreme(Extreme::Highest, "All", "BTCUSDT", Some("1m"))
        .await
        .unwrap();
    assert!(highest.price >= base * 0.85 && highest.price <= base * 1.15);

    let average = engine.average("Source2", "BTCUSDT", None).await.unwrap();
    assert!(average.price >= base * 0.85 && average.price <= base * 1.15);

    // Nothing was flushed yet, so the store alone has no answer
    assert!(store
        .average(Source::Source2, Pair::BtcUsdt, None)
        .await
        .unwrap()
        .is_none());

    coordinator.stop_listening().await;
    assert_eq!(coordinator.buffer_len().await, 0);
    assert!(store
        .average(Source::Source2, Pair::BtcUsdt, None)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_switch_to_active_live_mode_leaves_connections_untouched() {
    let mut endpoints = Vec::new();
    let mut feeds = Vec::new();
    for source in Source::FEEDS {
        let (address, task) = spawn_fake_feed(60000.0).await;
        endpoints.push(FeedEndpoint::new(source.as_str(), address));
        feeds.push(task);
    }

    let coordinator = IngestionCoordinator::new(
        Arc::new(SqliteStore::new_in_memory().unwrap()),
        Arc::new(MemoryCache::new()),
        create_test_config(endpoints),
    );

    coordinator.start(Mode::Live).await.unwrap();
    wait_for_buffer(&coordinator).await;

    let err = coordinator.switch_mode(Mode::Live).await.unwrap_err();
    assert!(matches!(err, MarketflowError::Conflict(_)));
    assert_eq!(coordinator.active_mode().await, Some(Mode::Live));

    // Ingestion carries on over the same sockets
    let before = coordinator.buffer_len().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.buffer_len().await <= before {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("buffer stopped growing after the rejected switch");
    assert!(feeds.iter().all(|feed| !feed.is_finished()));
    assert!(coordinator
        .check_health()
        .await
        .iter()
        .all(|entry| entry.is_healthy()));

    coordinator.stop_listening().await;
    for feed in feeds {
        tokio::time::timeout(Duration::from_secs(5), feed)
            .await
            .expect("live feed was not closed")
            .unwrap();
    }
}
