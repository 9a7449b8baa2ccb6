use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use alert_scheduler::api;
use alert_scheduler::config::Config;
use alert_scheduler::logger;
use alert_scheduler::store::Store;

#[derive(Parser)]
#[command(about = "Serves scheduled banner alerts over HTTP")]
struct Cli {
    /// Address to bind on.
    #[arg(long, default_value = "127.0.0.1")]
    addr: IpAddr,
    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();
    let cli = Cli::parse();

    let config = Config::from_env().context("reading configuration")?;
    let endpoint_path = config.endpoint_path.clone();
    let ctx = Arc::new(api::Context {
        store: Store::new(),
        config,
    });

    let addr = SocketAddr::new(cli.addr, cli.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("serving alerts on http://{addr}{endpoint_path}");

    axum::serve(listener, api::routes(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}
