use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

/// Shared health flag a daemon adapter updates from its own background ping
/// loop and the rest of the gateway reads without touching the daemon
/// itself. Spec §4.2 "Connection pool with health pings" / §5 "At least one
/// [relay] connection must be healthy" generalizes to: every daemon adapter
/// reports a health bit the gateway's readiness check can poll.
#[derive(Clone)]
pub struct DaemonHealth {
    healthy: Arc<AtomicBool>,
    name: &'static str,
}

impl DaemonHealth {
    pub fn new(name: &'static str) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(false)),
            name,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set(&self, healthy: bool) {
        let was = self.healthy.swap(healthy, Ordering::Relaxed);
        if was != healthy {
            if healthy {
                info!(daemon = self.name, "became healthy");
            } else {
                warn!(daemon = self.name, "became unhealthy");
            }
        }
    }

    /// Runs `ping` on `interval` until cancelled, updating this handle.
    /// Intended to be spawned as its own tokio task per adapter.
    pub async fn run_loop<F, Fut>(self, interval: Duration, mut ping: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let healthy = ping().await;
            self.set(healthy);
        }
    }
}
