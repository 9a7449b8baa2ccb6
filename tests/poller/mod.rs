//! The polling client against the live server and against scripted sources.

use crate::common::{TestServer, at, input};
use alert_scheduler::alerts::{VisibleWindow, WireAlert};
use alert_scheduler::client::{AlertSource, AlertsClient, FeedEvent, Poller, SyncState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;
use url::Url;

async fn next_event(rx: &mut UnboundedReceiver<FeedEvent>) -> FeedEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a feed event")
        .expect("event channel closed")
}

#[tokio::test]
async fn poller_tracks_server_state() {
    let srv = TestServer::spawn().await;
    let showing = srv
        .store
        .create(input("Showing", "2000-01-01T00:00:00Z", "2999-01-01T00:00:00Z"))
        .unwrap();
    let upcoming = srv
        .store
        .create(input("Upcoming", "2998-01-01T00:00:00Z", "2999-01-01T00:00:00Z"))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let poller = Poller::start(
        AlertsClient::new(srv.listing.clone()),
        srv.config.refresh_interval,
        tx,
    );

    // First sync: every record reports its initial visibility.
    let mut seen = Vec::new();
    for _ in 0..2 {
        match next_event(&mut rx).await {
            FeedEvent::VisibilityChanged { id, visible } => seen.push((id, visible)),
            other => panic!("unexpected event {other:?}"),
        }
    }
    seen.sort();
    let mut expected = vec![
        (showing.id.to_string(), true),
        (upcoming.id.to_string(), false),
    ];
    expected.sort();
    assert_eq!(seen, expected);

    // A steady server produces no further events across several syncs.
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    assert_eq!(poller.state(), SyncState::Synced);
    assert_eq!(poller.records().len(), 2);

    // Deleting the showing alert hides it on a later sync.
    srv.store.delete(showing.id).unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        FeedEvent::VisibilityChanged {
            id: showing.id.to_string(),
            visible: false,
        }
    );
    assert_eq!(poller.records().len(), 1);

    poller.stop();
}

/// Succeeds once, then fails every subsequent fetch.
struct FlakySource {
    calls: AtomicUsize,
    alerts: Vec<WireAlert>,
}

#[async_trait::async_trait]
impl AlertSource for FlakySource {
    async fn fetch_alerts(&self) -> anyhow::Result<Vec<WireAlert>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(self.alerts.clone())
        } else {
            anyhow::bail!("connection reset by peer")
        }
    }
}

#[tokio::test]
async fn failed_fetch_serves_stale_records() {
    let source = FlakySource {
        calls: AtomicUsize::new(0),
        alerts: vec![WireAlert {
            id: "a".to_string(),
            title: "Showing".to_string(),
            message: String::new(),
            interval: VisibleWindow::new(at("2000-01-01T00:00:00Z"), at("2999-01-01T00:00:00Z"))
                .unwrap(),
        }],
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let poller = Poller::start(source, Duration::from_millis(25), tx);

    assert_eq!(
        next_event(&mut rx).await,
        FeedEvent::VisibilityChanged {
            id: "a".to_string(),
            visible: true,
        }
    );

    // The next tick fails; the record set and its flags survive.
    assert!(matches!(
        next_event(&mut rx).await,
        FeedEvent::FetchFailed { .. }
    ));
    assert_eq!(poller.state(), SyncState::Stale);
    let records = poller.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].visible);

    poller.stop();
}

#[tokio::test]
async fn unreachable_endpoint_reports_failures_and_keeps_polling() {
    // Nothing listens on port 9; every cycle fails and every cycle retries.
    let client = AlertsClient::new(Url::parse("http://127.0.0.1:9/api/alerts").unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let poller = Poller::start(client, Duration::from_millis(25), tx);

    for _ in 0..2 {
        assert!(matches!(
            next_event(&mut rx).await,
            FeedEvent::FetchFailed { .. }
        ));
    }
    assert_eq!(poller.state(), SyncState::Stale);
    assert!(poller.records().is_empty());

    poller.stop();
}
