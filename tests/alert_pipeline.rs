//! End-to-end: price refresh -> evaluation -> bus -> relay -> live session

mod common;

use coin_radar::alerts::{AlertEvaluator, AlertKind, AlertManager, AlertRequest, AlertStatus};
use coin_radar::common::traits::UserChannel;
use coin_radar::common::types::{AssetRecord, UserRef};
use coin_radar::notifications::{
    AlertGateway, EventBus, NotificationPublisher, NotificationRelay, SessionRegistry,
    TriggeredAlertEvent,
};
use coin_radar::store::{AssetStore, InMemoryAlertStore, InMemoryAssetStore, InMemoryUserDirectory};
use coin_radar::sync::MarketDataSynchronizer;
use common::{fast_settings, FakeMarketClient};
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_test::assert_ok;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[test_log::test(tokio::test)]
async fn test_crossing_price_reaches_live_session_once() {
    let assets = Arc::new(InMemoryAssetStore::new());
    assets
        .upsert_many(vec![AssetRecord::new("x", "xc", "Xcoin").with_price(dec!(50000))])
        .await
        .unwrap();
    let alerts = Arc::new(InMemoryAlertStore::new());
    let users = Arc::new(InMemoryUserDirectory::new());
    users.insert(UserRef::new(1, "alice")).await;

    let manager = AlertManager::new(alerts.clone(), assets.clone(), users.clone());
    let alert = assert_ok!(
        manager
            .create_or_update(1, AlertRequest::new("x", AlertKind::PriceAbove, dec!(60000)))
            .await
    );

    let (bus, receivers) = EventBus::new(4, 16);
    let sessions = Arc::new(SessionRegistry::new(8));
    let (_, mut live) = sessions.connect("alice").await;
    let relay = Arc::new(NotificationRelay::new(sessions.clone())).spawn(receivers);

    let evaluator = Arc::new(AlertEvaluator::new(
        alerts.clone(),
        assets.clone(),
        users,
        Arc::new(NotificationPublisher::new(bus)),
    ));
    let upstream = Arc::new(FakeMarketClient::default());
    let sync = MarketDataSynchronizer::new(upstream.clone(), assets.clone(), fast_settings(1, 100))
        .with_listener(evaluator);

    upstream.set_price("x", dec!(61000));
    sync.price_refresh().await;

    let event = timeout(RECV_TIMEOUT, live.recv())
        .await
        .expect("event delivered in time")
        .expect("session open");
    assert_eq!(event.alert_id, alert.id);
    assert_eq!(event.username, "alice");
    assert_eq!(event.asset_symbol, "XC");
    assert_eq!(event.triggered_price, dec!(61000));
    assert!(event.message.contains("60000.00") && event.message.contains("61000.00"));

    upstream.set_price("x", dec!(62000));
    sync.price_refresh().await;
    relay.shutdown().await;
    assert!(live.try_recv().is_err());

    let stored = manager.list_alerts(1, Some(AlertStatus::Triggered)).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].triggered_price, Some(dec!(61000)));
    assert_eq!(manager.unread_count(1).await.unwrap(), 1);
}

#[tokio::test]
async fn test_offline_user_does_not_block_others() {
    let sessions = Arc::new(SessionRegistry::new(8));
    let (_, mut bob) = sessions.connect("bob").await;
    let (bus, receivers) = EventBus::new(1, 16);
    let relay_handle = Arc::new(NotificationRelay::new(sessions.clone())).spawn(receivers);

    let base: TriggeredAlertEvent = serde_json::from_value(serde_json::json!({
        "alertId": 1,
        "userId": 1,
        "username": "alice",
        "assetId": "x",
        "assetName": "Xcoin",
        "assetSymbol": "XC",
        "alertKind": "PRICE_BELOW",
        "threshold": "100",
        "triggeredPrice": "99",
        "message": "down",
        "triggeredAt": "2024-05-01T12:00:00Z"
    }))
    .unwrap();
    let for_bob = TriggeredAlertEvent {
        alert_id: 2,
        user_id: 2,
        username: "bob".to_string(),
        ..base.clone()
    };

    bus.publish("1", base).unwrap();
    bus.publish("2", for_bob).unwrap();

    let event = timeout(RECV_TIMEOUT, bob.recv()).await.unwrap().unwrap();
    assert_eq!(event.alert_id, 2);

    let relay = relay_handle.relay().clone();
    relay_handle.shutdown().await;
    assert_eq!(relay.failed_count(), 1);
    assert_eq!(relay.delivered_count(), 1);
}

#[tokio::test]
async fn test_gateway_streams_events_as_json() {
    let sessions = Arc::new(SessionRegistry::new(8));
    let listener = AlertGateway::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(Arc::new(AlertGateway::new(sessions.clone())).serve(listener, shutdown_rx));

    let url = format!("ws://{}/ws/alerts?username=carol", addr);
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    for _ in 0..100 {
        if sessions.session_count("carol").await == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sessions.session_count("carol").await, 1);

    let event: TriggeredAlertEvent = serde_json::from_value(serde_json::json!({
        "alertId": 7,
        "userId": 3,
        "username": "carol",
        "assetId": "ethereum",
        "assetName": "Ethereum",
        "assetSymbol": "ETH",
        "alertKind": "PERCENT_UP",
        "threshold": "10",
        "triggeredPrice": "3300",
        "message": "Ethereum is up 10.00% from your reference price. Price: $3300.00",
        "triggeredAt": "2024-05-01T12:00:00Z"
    }))
    .unwrap();
    sessions.push("carol", &event).await.unwrap();

    let frame = timeout(RECV_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
    let text = match frame {
        Message::Text(text) => text,
        other => panic!("expected text frame, got {:?}", other),
    };
    let received: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(received["alertId"], 7);
    assert_eq!(received["alertKind"], "PERCENT_UP");
    assert_eq!(received["username"], "carol");

    drop(ws);
    shutdown_tx.send(true).unwrap();
    timeout(RECV_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_gateway_rejects_missing_username() {
    let sessions = Arc::new(SessionRegistry::new(8));
    let listener = AlertGateway::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(Arc::new(AlertGateway::new(sessions)).serve(listener, shutdown_rx));

    let result = connect_async(format!("ws://{}/ws/alerts", addr).as_str()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_gateway_shutdown_closes_sessions() {
    let sessions = Arc::new(SessionRegistry::new(8));
    let listener = AlertGateway::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(Arc::new(AlertGateway::new(sessions.clone())).serve(listener, shutdown_rx));

    let url = format!("ws://{}/ws/alerts?username=dave", addr);
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    for _ in 0..100 {
        if sessions.session_count("dave").await == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sessions.session_count("dave").await, 1);

    shutdown_tx.send(true).unwrap();
    timeout(RECV_TIMEOUT, server).await.unwrap().unwrap();

    let frame = timeout(RECV_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(frame, Message::Close(_)));

    for _ in 0..100 {
        if sessions.session_count("dave").await == 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sessions.session_count("dave").await, 0);
}
