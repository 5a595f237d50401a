//! End-to-end tests: bulk catch-up, live updates, queries and notifications.

mod common;

use common::{feed, settle, FakeConnector, FakeFetcher};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use txmirror::{
    EventName, Field, FindOptions, HistoryOptions, InstanceOptions, Milestone, Mirror,
    MirrorConfig, Query, RemoveOptions, Sort, Transaction, TxHash,
};

fn mirror_with(fetcher: Arc<FakeFetcher>, connector: Arc<FakeConnector>) -> Mirror {
    Mirror::builder(MirrorConfig::default())
        .fetcher(fetcher)
        .connector(connector)
        .build()
}

fn numbered(count: i64) -> Vec<Transaction> {
    (1..=count)
        .map(|i| {
            Transaction::new(format!("TX{:03}", i))
                .with_address(if i % 2 == 0 { "EVEN" } else { "ODD" })
                .with_received_at(i * 1000)
        })
        .collect()
}

// --- Realistic Workflow Tests ---

#[tokio::test(start_paused = true)]
async fn test_catch_up_then_live_updates() {
    let fetcher = FakeFetcher::with(vec![Ok(vec![Transaction::new("A").with_received_at(1000)])]);
    let (server, script) = feed();
    let connector = FakeConnector::new(vec![script]);
    let mirror = mirror_with(fetcher.clone(), connector.clone());

    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in EventName::ALL {
        let seen = Arc::clone(&seen);
        view.on(event, move |update| {
            seen.lock().push((event, update.hash().to_string()));
        });
    }

    settle(5).await;
    assert!(view.source().history_loaded());
    assert_eq!(view.source().store().len(), 1);

    server.event("newTX", json!({"hash": "B", "address": "ADDR", "receivedAt": 2000}));
    server.event("update", json!({"hash": "A", "ctime": 100}));
    server.event("updateMilestone", json!({"hash": "B", "ctime": 200, "milestone": 7}));
    settle(5).await;

    let store = view.source().store();
    let a = store.get(&TxHash::from("A")).unwrap().unwrap();
    assert!(a.confirmed);
    assert_eq!(a.ctime, Some(100));

    let b = store.get(&TxHash::from("B")).unwrap().unwrap();
    assert!(b.confirmed);
    assert_eq!(b.ctime, Some(200));
    assert_eq!(b.milestone, Some(Milestone::Index(7)));
    assert_eq!(b.address.as_deref(), Some("ADDR"));

    // The bulk batch is stored silently; only live updates are announced.
    assert_eq!(
        *seen.lock(),
        vec![
            (EventName::TxNew, "B".to_string()),
            (EventName::TxConfirmed, "A".to_string()),
            (EventName::Milestones, "B".to_string()),
        ]
    );
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_get_independent_copies() {
    let (server, script) = feed();
    let mirror = mirror_with(FakeFetcher::with(vec![Ok(vec![])]), FakeConnector::new(vec![script]));
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();

    let received = Arc::new(Mutex::new(None));
    {
        let received = Arc::clone(&received);
        view.on(EventName::TxNew, move |update| {
            *received.lock() = update.transaction().cloned();
        });
    }

    settle(5).await;
    server.event("newTX", json!({"hash": "C", "address": "ADDR"}));
    settle(5).await;

    let mut copy = received.lock().take().unwrap();
    copy.confirmed = true;
    copy.address = Some("MUTATED".into());

    let stored = view.source().store().get(&TxHash::from("C")).unwrap().unwrap();
    assert!(!stored.confirmed);
    assert_eq!(stored.address.as_deref(), Some("ADDR"));
}

#[tokio::test(start_paused = true)]
async fn test_instances_share_one_source() {
    let fetcher = FakeFetcher::with(vec![Ok(numbered(3))]);
    let (server, script) = feed();
    let connector = FakeConnector::new(vec![script]);
    let mirror = mirror_with(fetcher.clone(), connector.clone());

    let first = mirror.instance(InstanceOptions::host("node.example")).unwrap();
    let second = mirror.instance(InstanceOptions::host("node.example")).unwrap();
    assert!(Arc::ptr_eq(first.source(), second.source()));

    let hits = Arc::new(Mutex::new(Vec::new()));
    for (name, view) in [("first", &first), ("second", &second)] {
        let hits = Arc::clone(&hits);
        view.on(EventName::TxNew, move |_| hits.lock().push(name));
    }

    settle(5).await;
    server.event("newTX", json!({"hash": "D"}));
    settle(5).await;

    assert_eq!(*hits.lock(), vec!["first", "second"]);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(connector.attempts(), 1);
    assert_eq!(first.source().store().len(), 4);
    assert_eq!(mirror.bus().instance_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_hosts_are_isolated() {
    let fetcher = FakeFetcher::with(vec![Ok(numbered(2)), Ok(numbered(5))]);
    let mirror = mirror_with(fetcher.clone(), FakeConnector::new(vec![]));

    let a = mirror.instance(InstanceOptions::host("alpha.example")).unwrap();
    let b = mirror
        .instance(InstanceOptions::host("beta.example").with_ssl(true))
        .unwrap();
    settle(5).await;

    assert!(!Arc::ptr_eq(a.source(), b.source()));
    assert_eq!(a.source().store().len() + b.source().store().len(), 7);
    assert_eq!(b.source().endpoint().origin(), "https://beta.example");
    assert_eq!(fetcher.calls(), 2);
}

// --- Query Tests ---

#[tokio::test(start_paused = true)]
async fn test_find_keeps_last_matches() {
    let mirror = mirror_with(FakeFetcher::with(vec![Ok(numbered(10))]), FakeConnector::new(vec![]));
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();
    settle(5).await;

    let newest = view
        .find(
            &Query::all(),
            FindOptions::limit(3).sorted(Sort::asc(Field::ReceivedAt)),
        )
        .await
        .unwrap();
    let hashes: Vec<_> = newest.iter().map(|tx| tx.hash.to_string()).collect();
    assert_eq!(hashes, vec!["TX008", "TX009", "TX010"]);

    let even = view
        .find(&Query::all().eq(Field::Address, "EVEN"), FindOptions::default())
        .await
        .unwrap();
    assert_eq!(even.len(), 5);

    let late = view
        .find(
            &Query::all().gte(Field::ReceivedAt, 9000),
            FindOptions::default().sorted(Sort::desc(Field::ReceivedAt)),
        )
        .await
        .unwrap();
    assert_eq!(late[0].hash, TxHash::from("TX010"));
    assert_eq!(late.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_remove_with_limit() {
    let mirror = mirror_with(FakeFetcher::with(vec![Ok(numbered(6))]), FakeConnector::new(vec![]));
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();
    settle(5).await;

    let odd = Query::all().eq(Field::Address, "ODD");
    let result = view.remove(&odd, RemoveOptions { limit: Some(2) }).await.unwrap();
    assert_eq!(result.removed, 2);

    let result = view.remove(&odd, RemoveOptions::default()).await.unwrap();
    assert_eq!(result.removed, 1);
    assert_eq!(view.source().store().len(), 3);
}

// --- History Backfill Tests ---

#[tokio::test(start_paused = true)]
async fn test_tx_history_respects_amount() {
    let mirror = mirror_with(FakeFetcher::with(vec![Ok(numbered(10))]), FakeConnector::new(vec![]));
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();

    let recent = view
        .tx_history(HistoryOptions { amount: Some(4) })
        .await
        .unwrap();
    assert_eq!(recent.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_tx_history_waits_for_catch_up() {
    let mut config = MirrorConfig::default();
    config.history.retry_delay = Duration::from_millis(500);

    let fetcher = FakeFetcher::with(vec![
        Err(txmirror::SyncError::Transport("503".into())),
        Ok(numbered(2)),
    ]);
    let mirror = Mirror::builder(config)
        .fetcher(fetcher.clone())
        .connector(FakeConnector::new(vec![]))
        .build();
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();

    let started = tokio::time::Instant::now();
    let history = view.tx_history(HistoryOptions::default()).await.unwrap();

    // Fewer than the minimum, but the catch-up completed.
    assert_eq!(history.len(), 2);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(mirror.history_retries_left(), 9);
}

// --- Subscription Tests ---

#[tokio::test(start_paused = true)]
async fn test_disposed_handler_stops_receiving() {
    let (server, script) = feed();
    let mirror = mirror_with(FakeFetcher::with(vec![Ok(vec![])]), FakeConnector::new(vec![script]));
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();

    let count = Arc::new(Mutex::new(0));
    let disposer = {
        let count = Arc::clone(&count);
        view.on(EventName::TxNew, move |_| *count.lock() += 1)
    };

    settle(5).await;
    server.event("newTX", json!({"hash": "E1"}));
    settle(5).await;
    disposer.dispose();
    server.event("newTX", json!({"hash": "E2"}));
    settle(5).await;

    assert_eq!(*count.lock(), 1);
    assert_eq!(view.source().store().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_channel_subscription() {
    let (server, script) = feed();
    let mirror = mirror_with(
        FakeFetcher::with(vec![Ok(vec![Transaction::new("R")])]),
        FakeConnector::new(vec![script]),
    );
    let view = mirror.instance(InstanceOptions::host("node.example")).unwrap();
    let reattaches = view.subscribe_channel(EventName::TxReattaches, 8);

    settle(5).await;
    server.event("updateReattach", json!({"hash": "R"}));
    server.event("somethingElse", json!({"hash": "R"}));
    settle(5).await;

    let update = reattaches.try_recv().unwrap();
    assert_eq!(update.hash(), &TxHash::from("R"));
    assert!(reattaches.try_recv().is_err());

    let stored = view.source().store().get(&TxHash::from("R")).unwrap().unwrap();
    assert!(stored.reattached);
}
