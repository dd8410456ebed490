//! Binary entry point. Parses [`config::GatewayConfig`], stands up the
//! database, relay connection, and engine, then blocks until Ctrl-C.
//!
//! Grounded on `fedimint-testing/src/gateway.rs`'s `GatewayTest::new`, the
//! only full-assembly precedent in the retrieval pack. That file wires a
//! `Gateway` from a `FakeLightningBuilder`; we do the same here for all
//! three backend daemons (`arkrelay-testing`'s in-memory fakes), since the
//! daemons' wire protocols are explicitly out of scope (SPEC_FULL.md §3
//! Non-goals) and no concrete gRPC client for them exists in this workspace.
//! A production deployment would replace `build_fake_daemons` with real
//! clients behind the same `ArkDaemonRpc`/`TapdDaemonRpc`/`LightningDaemonRpc`
//! traits; nothing else in `main` would need to change.

mod config;

use std::sync::Arc;

use clap::Parser;
use nostr::key::Keys;
use tracing_subscriber::EnvFilter;

use arkrelay_core::engine::{Engine, EngineDeps};
use arkrelay_core::ports::EventPublisher;
use arkrelay_daemons::{ArkDaemonRpc, LightningDaemonRpc, TapdDaemonRpc};
use arkrelay_relay::RelayClient;
use arkrelay_store::Store;
use arkrelay_testing::{FakeArkDaemon, FakeLightningDaemon, FakeTapdDaemon};

use config::GatewayConfig;

const LOG_MAIN: &str = "arkrelay::gateway";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::parse();
    init_tracing(&config);

    let store = Arc::new(Store::connect(&config.database_url, config.database_max_connections).await?);
    store.migrate().await?;

    let keys = Keys::parse(&config.relay_secret_key)?;
    let (relay, inbound) = RelayClient::connect(
        config.relay_urls.clone(),
        keys,
        config.inbound_channel_capacity,
    )
    .await?;
    let publisher: Arc<dyn EventPublisher> = Arc::new(relay);

    let (ark, tapd, lightning_daemon) = build_fake_daemons();

    let engine = Engine::start(EngineDeps {
        store,
        ark,
        tapd,
        lightning_daemon,
        publisher,
        inbound,
    });

    tracing::info!(target: LOG_MAIN, relays = ?config.relay_urls, "gateway running, waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!(target: LOG_MAIN, "shutdown signal received");
    engine.shutdown().await;

    Ok(())
}

/// Placeholder backend set until real daemon clients land behind the same
/// trait objects (see module doc comment).
fn build_fake_daemons() -> (
    Arc<dyn ArkDaemonRpc>,
    Arc<dyn TapdDaemonRpc>,
    Arc<dyn LightningDaemonRpc>,
) {
    (
        Arc::new(FakeArkDaemon::new()),
        Arc::new(FakeTapdDaemon::new()),
        Arc::new(FakeLightningDaemon::new()),
    )
}

fn init_tracing(config: &GatewayConfig) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
