//! The env/flag surface the engine needs to boot. Not a general config-file
//! loader (explicitly out of scope per SPEC_FULL.md §3) — just the startup
//! parameters, mirroring `LightningMode`'s `#[arg(long = ..., env = ...)]`
//! style (`gateway/ln-gateway/src/lightning/mod.rs`).

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "arkrelay-gateway", about = "Ark relay orchestration gateway")]
pub struct GatewayConfig {
    /// Postgres connection string for C1.
    #[arg(long, env = "ARKRELAY_DATABASE_URL")]
    pub database_url: String,

    /// Max Postgres pool connections.
    #[arg(long, env = "ARKRELAY_DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// Nostr relay URLs C3 connects to, comma-separated.
    #[arg(long, env = "ARKRELAY_RELAY_URLS", value_delimiter = ',')]
    pub relay_urls: Vec<String>,

    /// Gateway's Nostr identity secret key (hex or nsec).
    #[arg(long, env = "ARKRELAY_RELAY_SECRET_KEY")]
    pub relay_secret_key: String,

    /// Inbound relay-event channel capacity (spec §4.3/§5 backpressure).
    #[arg(long, env = "ARKRELAY_INBOUND_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub inbound_channel_capacity: usize,

    /// `RUST_LOG`-style filter for `tracing-subscriber`.
    #[arg(long, env = "ARKRELAY_LOG_FILTER", default_value = "info")]
    pub log_filter: String,

    /// Emit logs as JSON instead of the default human-readable format.
    #[arg(long, env = "ARKRELAY_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}
