//! Global state: wires every C4-C11 collaborator to a concrete `Store`,
//! daemon set, and relay, then owns the background tasks (spec.md §9
//! "Global state").
//!
//! Grounded on `fedimint-testing/src/gateway.rs`'s `GatewayTest::new`
//! assembling a running `Gateway` from its collaborators and a `TaskGroup`;
//! we hold plain `JoinHandle`s instead of a `TaskGroup` since we are not
//! inside the fedimint task-group framework.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use arkrelay_daemons::{
    ArkDaemonRpc, LightningDaemonRpc, ResilientArkDaemon, ResilientLightningDaemon,
    ResilientTapdDaemon, TapdDaemonRpc,
};
use arkrelay_relay::RelayEvent;
use arkrelay_store::Store;

use crate::asset::AssetManager;
use crate::challenge::ChallengeManager;
use crate::dispatch::EventDispatcher;
use crate::lightning::LightningManager;
use crate::logging::LOG_ENGINE;
use crate::orchestrator::SigningOrchestrator;
use crate::ports::EventPublisher;
use crate::session::SessionManager;
use crate::transaction::TransactionProcessor;
use crate::vtxo::VtxoManager;
use crate::waiter::ResponseWaiter;

/// Everything `Engine::start` needs that isn't discovered from `Store`
/// itself. `tapd` backs both [`AssetManager`]'s asset registration check and
/// [`VtxoManager`]'s L1 settlement coordinator (spec §4.2's three C2
/// adapters).
///
/// `start` wraps each daemon handle in its `Resilient*Daemon` adapter before
/// handing it to a collaborator, so callers pass the raw client (real or
/// fake) and never see the circuit-breaker/retry layer themselves.
pub struct EngineDeps {
    pub store: Arc<Store>,
    pub ark: Arc<dyn ArkDaemonRpc>,
    pub tapd: Arc<dyn TapdDaemonRpc>,
    pub lightning_daemon: Arc<dyn LightningDaemonRpc>,
    pub publisher: Arc<dyn EventPublisher>,
    pub inbound: mpsc::Receiver<RelayEvent>,
}

/// A running engine. Holds the collaborators a caller (the `arkrelay-gateway`
/// binary, or a test) needs direct access to, plus the background task
/// handles `shutdown` tears down.
pub struct Engine {
    pub sessions: Arc<SessionManager>,
    pub challenges: Arc<ChallengeManager>,
    pub vtxos: Arc<VtxoManager>,
    pub assets: Arc<AssetManager>,
    pub transactions: Arc<TransactionProcessor>,
    pub lightning: Arc<LightningManager>,
    pub orchestrator: Arc<SigningOrchestrator>,
    background: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Assembles every collaborator and spawns the dispatcher plus the five
    /// background loops (session sweeper, VTXO inventory monitor,
    /// expiration sweeper, L1 settlement coordinator, Lightning
    /// reconciliation poller).
    pub fn start(deps: EngineDeps) -> Arc<Self> {
        let EngineDeps { store, ark, tapd, lightning_daemon, publisher, inbound } = deps;
        let ark: Arc<dyn ArkDaemonRpc> = Arc::new(ResilientArkDaemon::new(ark));
        let tapd: Arc<dyn TapdDaemonRpc> = Arc::new(ResilientTapdDaemon::new(tapd));
        let lightning_daemon: Arc<dyn LightningDaemonRpc> =
            Arc::new(ResilientLightningDaemon::new(lightning_daemon));

        let sessions = Arc::new(SessionManager::new(store.clone(), publisher.clone()));
        let challenges = Arc::new(ChallengeManager::new(store.clone(), sessions.clone()));
        let vtxos = Arc::new(VtxoManager::new(store.clone(), ark.clone(), tapd.clone(), publisher.clone()));
        let assets = Arc::new(AssetManager::new(store.clone(), tapd));
        let transactions = Arc::new(TransactionProcessor::new(store.clone()));
        let waiter = Arc::new(ResponseWaiter::new());
        let lightning = Arc::new(LightningManager::new(
            store.clone(),
            lightning_daemon,
            vtxos.clone(),
            assets.clone(),
            sessions.clone(),
            publisher.clone(),
        ));

        let orchestrator = Arc::new(SigningOrchestrator::new(
            store.clone(),
            ark,
            sessions.clone(),
            challenges.clone(),
            vtxos.clone(),
            assets.clone(),
            lightning.clone(),
            publisher,
            waiter.clone(),
        ));

        let dispatcher = Arc::new(EventDispatcher::new(
            sessions.clone(),
            challenges.clone(),
            waiter,
            orchestrator.clone(),
        ));

        let mut background = Vec::new();
        background.push(tokio::spawn(dispatcher.run(inbound)));
        background.push(tokio::spawn(sessions.clone().run_sweeper()));
        background.push(tokio::spawn(vtxos.clone().run_inventory_monitor()));
        background.push(tokio::spawn(vtxos.clone().run_expiration_sweeper()));
        background.push(tokio::spawn(vtxos.clone().run_l1_settlement()));
        background.push(tokio::spawn(lightning.clone().run_reconciliation()));

        info!(target: LOG_ENGINE, "engine started");

        Arc::new(Self {
            sessions,
            challenges,
            vtxos,
            assets,
            transactions,
            lightning,
            orchestrator,
            background,
        })
    }

    /// Aborts every background loop. In-flight ceremony tasks (spawned
    /// per-session by [`SigningOrchestrator::spawn_ceremony`]) are not
    /// tracked here and are not drained: a ceremony's only durable state is
    /// the session row (`last_completed_step`), so an abort mid-ceremony
    /// loses at most the in-flight step, not correctness (spec §9
    /// "Coroutine/async control flow"); the sweeper will expire any session
    /// that never resumes.
    pub async fn shutdown(&self) {
        info!(target: LOG_ENGINE, "engine shutting down");
        for handle in &self.background {
            handle.abort();
        }
    }
}
