//! Polling client for the alert listing.
//!
//! A [`Poller`] owns one recurring tokio task that fetches the listing,
//! feeds the result into an [`AlertFeed`], and forwards the feed's
//! visibility events to whatever render layer is listening on the channel.
//! The feed itself is plain state with no I/O, so the sync semantics are
//! testable without a server.
//!
//! A fetch that fails leaves the last-known-good records in place; the
//! next tick retries at the fixed interval.

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::alerts::WireAlert;

/// Where a feed pulls its records from.
///
/// [`AlertsClient`] is the production source; tests substitute scripted
/// implementations.
#[async_trait]
pub trait AlertSource: Send + Sync + 'static {
    async fn fetch_alerts(&self) -> anyhow::Result<Vec<WireAlert>>;
}

/// HTTP source backed by a deployed listing endpoint.
pub struct AlertsClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl AlertsClient {
    pub fn new(endpoint: Url) -> AlertsClient {
        AlertsClient {
            http: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl AlertSource for AlertsClient {
    async fn fetch_alerts(&self) -> anyhow::Result<Vec<WireAlert>> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .send()
            .await
            .context("requesting the alert listing")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("alert listing returned {status}");
        }
        let body = response
            .text()
            .await
            .context("reading the alert listing body")?;
        deserialize_listing(&body)
    }
}

/// Deserialize a listing body, naming the offending path on a mismatch.
fn deserialize_listing(body: &str) -> anyhow::Result<Vec<WireAlert>> {
    let mut deserializer = serde_json::Deserializer::from_str(body);
    let res: Result<Vec<WireAlert>, _> = serde_path_to_error::deserialize(&mut deserializer);
    match res {
        Ok(alerts) => Ok(alerts),
        Err(e) => {
            let ctx = format!("listing did not parse at {}", e.path());
            Err(e.into_inner()).context(ctx)
        }
    }
}

/// One alert as the client tracks it: the wire fields plus the derived
/// visibility flag. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub alert: WireAlert,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// A fetch is outstanding (including the initial one).
    Fetching,
    /// The record set reflects the last response.
    Synced,
    /// The last fetch failed; records are the last-known-good set.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A record's visibility flipped, including the first time a record is
    /// seen. Render layers key their show/hide behavior on this.
    VisibilityChanged { id: String, visible: bool },
    /// A fetch cycle failed; the feed is serving stale records until the
    /// next tick succeeds.
    FetchFailed { error: String },
}

/// The client-side record set and its sync bookkeeping.
///
/// Fetches are numbered by [`begin_fetch`](AlertFeed::begin_fetch); a
/// completion is only applied if nothing newer has been applied already,
/// so a slow response can never clobber a fresher one.
#[derive(Default)]
pub struct AlertFeed {
    records: HashMap<String, AlertRecord>,
    state: SyncState,
    next_seq: u64,
    applied_seq: u64,
}

impl Default for SyncState {
    fn default() -> SyncState {
        SyncState::Fetching
    }
}

impl AlertFeed {
    pub fn new() -> AlertFeed {
        AlertFeed::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.records.values().cloned().collect()
    }

    /// Number a new fetch cycle.
    pub fn begin_fetch(&mut self) -> u64 {
        self.next_seq += 1;
        self.state = SyncState::Fetching;
        self.next_seq
    }

    /// Apply a completed fetch, recompute every record's visibility at
    /// `now`, and return one event per record whose flag flipped.
    ///
    /// A response older than the newest applied one is discarded wholesale.
    pub fn apply(&mut self, seq: u64, alerts: Vec<WireAlert>, now: DateTime<Utc>) -> Vec<FeedEvent> {
        if seq <= self.applied_seq {
            tracing::debug!(
                "discarding alert fetch #{seq}: #{} already applied",
                self.applied_seq
            );
            return Vec::new();
        }
        self.applied_seq = seq;
        self.state = SyncState::Synced;

        let mut events = Vec::new();
        let mut fresh = HashMap::with_capacity(alerts.len());
        for alert in alerts {
            let visible = alert.interval.contains(now);
            let previous = self.records.get(&alert.id).map(|r| r.visible);
            if previous != Some(visible) {
                events.push(FeedEvent::VisibilityChanged {
                    id: alert.id.clone(),
                    visible,
                });
            }
            fresh.insert(alert.id.clone(), AlertRecord { alert, visible });
        }
        // A record the server no longer returns is gone; if it was showing,
        // observers get told to hide it.
        for (id, record) in &self.records {
            if record.visible && !fresh.contains_key(id) {
                events.push(FeedEvent::VisibilityChanged {
                    id: id.clone(),
                    visible: false,
                });
            }
        }
        self.records = fresh;
        events
    }

    /// Record a failed fetch. Keeps every record and flag as-is.
    pub fn mark_failed(&mut self, seq: u64) {
        if seq <= self.applied_seq {
            // A newer response already landed; the stale failure is moot.
            return;
        }
        self.state = SyncState::Stale;
    }
}

/// Drives an [`AlertFeed`] from a recurring fetch task.
pub struct Poller {
    feed: Arc<Mutex<AlertFeed>>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Spawn the fetch task: an immediate first fetch, then one per
    /// `refresh_interval`. The loop awaits each fetch before the next tick
    /// and skips ticks that fired mid-fetch, so at most one request is in
    /// flight per feed.
    pub fn start<S: AlertSource>(
        source: S,
        refresh_interval: Duration,
        events: UnboundedSender<FeedEvent>,
    ) -> Poller {
        let feed = Arc::new(Mutex::new(AlertFeed::new()));
        let task_feed = feed.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                run_fetch_cycle(&source, &task_feed, &events).await;
            }
        });
        Poller { feed, handle }
    }

    pub fn state(&self) -> SyncState {
        self.lock_feed().state()
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.lock_feed().records()
    }

    /// Cancel the fetch task. Dropping the poller does the same, so no
    /// timer outlives its owner.
    pub fn stop(&self) {
        self.handle.abort();
    }

    fn lock_feed(&self) -> std::sync::MutexGuard<'_, AlertFeed> {
        self.feed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_fetch_cycle<S: AlertSource>(
    source: &S,
    feed: &Arc<Mutex<AlertFeed>>,
    events: &UnboundedSender<FeedEvent>,
) {
    let seq = feed.lock().unwrap_or_else(|e| e.into_inner()).begin_fetch();
    match source.fetch_alerts().await {
        Ok(alerts) => {
            let changes = feed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .apply(seq, alerts, Utc::now());
            for event in changes {
                let _ = events.send(event);
            }
        }
        Err(error) => {
            tracing::warn!("alert fetch #{seq} failed: {error:#}");
            feed.lock().unwrap_or_else(|e| e.into_inner()).mark_failed(seq);
            let _ = events.send(FeedEvent::FetchFailed {
                error: format!("{error:#}"),
            });
        }
    }
}
