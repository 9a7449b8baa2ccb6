//! Shared setup: a real server on an ephemeral port plus a few builders.

use std::sync::Arc;
use std::time::Duration;

use alert_scheduler::api::{self, Context};
use alert_scheduler::config::Config;
use alert_scheduler::store::{AlertInput, Store};
use chrono::{DateTime, Utc};
use url::Url;

pub struct TestServer {
    pub store: Store,
    pub config: Config,
    /// Absolute URL of the listing endpoint.
    pub listing: Url,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> TestServer {
        TestServer::spawn_with_config(Config {
            endpoint_path: "/api/alerts".to_string(),
            refresh_interval: Duration::from_millis(50),
            default_timezone: Some("UTC".to_string()),
        })
        .await
    }

    pub async fn spawn_with_config(config: Config) -> TestServer {
        let store = Store::new();
        let endpoint_path = config.endpoint_path.clone();
        let ctx = Arc::new(Context {
            store: store.clone(),
            config: config.clone(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = api::routes(ctx);
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let listing = Url::parse(&format!("http://{addr}{endpoint_path}")).unwrap();
        TestServer {
            store,
            config,
            listing,
            handle,
        }
    }

    pub fn item_url(&self, id: &str) -> Url {
        Url::parse(&format!("{}/{id}", self.listing)).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn input(title: &str, from: &str, to: &str) -> AlertInput {
    AlertInput {
        title: title.to_string(),
        message: String::new(),
        from: at(from),
        to: at(to),
    }
}
