//! Session Event Router - one consumer loop per transport handle
//!
//! ```text
//! PairingHandle ──EventStream──→ run() ──match kind──→ SessionStore::apply_when(Guard::Handle)
//!                                              │
//!                                              └──→ AssetRefresher::spawn_after(generation)
//! ```
//!
//! Events from one handle are handled strictly one at a time: the transition is
//! applied and the refresh started before the next event is received. Fetches
//! run in their own tasks, so a slow asset service never holds up the stream.

use crate::assets::AssetRefresher;
use crate::error::{PairingError, Result};
use crate::session::{Guard, Outcome, SessionStore, Transition};
use crate::transport::{EventKind, EventPayload, EventStream, HandleId, HandleRef, SessionParams, TransportEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Listener registration for one handle. Dropping it stops the loop and
/// releases the handle's event stream.
pub struct Subscription {
    handle_id: HandleId,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn handle_id(&self) -> HandleId { self.handle_id }

    pub fn is_active(&self) -> bool { !self.task.is_finished() }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Clone)]
pub struct EventRouter {
    store: Arc<SessionStore>,
    refresher: AssetRefresher,
    faults: Arc<watch::Sender<Option<PairingError>>>,
}

impl EventRouter {
    pub fn new(store: Arc<SessionStore>, refresher: AssetRefresher) -> Self {
        let (faults, _) = watch::channel(None);
        Self { store, refresher, faults: Arc::new(faults) }
    }

    /// Last fatal transport fault, if any.
    pub fn faults(&self) -> watch::Receiver<Option<PairingError>> {
        self.faults.subscribe()
    }

    /// Subscribe to `handle`, reconcile a session that is already live, then
    /// start consuming events.
    pub fn attach(&self, handle: &HandleRef) -> Subscription {
        let events = handle.subscribe();
        self.reconcile(handle);
        let router = self.clone();
        let handle_id = handle.id();
        tracing::debug!(handle = %handle_id, "router attached");
        Subscription { handle_id, task: tokio::spawn(router.run(handle_id, events)) }
    }

    fn reconcile(&self, handle: &HandleRef) {
        if !handle.connected() {
            return;
        }
        let params = SessionParams { accounts: handle.accounts(), chain_id: handle.chain_id() };
        if params.accounts.is_empty() {
            tracing::warn!(handle = %handle.id(), "handle reports connected without accounts, skipping reconcile");
            return;
        }
        tracing::info!(handle = %handle.id(), address = %params.accounts[0], chain_id = params.chain_id, "reconciling live session");
        self.bind(handle.id(), params, false);
    }

    async fn run(self, handle_id: HandleId, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            match self.dispatch(handle_id, event) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(fault) => {
                    tracing::error!(handle = %handle_id, error = %fault, "fatal transport fault");
                    self.faults.send_replace(Some(fault));
                    break;
                }
            }
        }
        tracing::debug!(handle = %handle_id, "router detached");
    }

    fn dispatch(&self, handle_id: HandleId, event: TransportEvent) -> Result<Flow> {
        tracing::debug!(handle = %handle_id, event = %event.kind, "event received");
        if self.store.get().handle_id() != Some(handle_id) {
            tracing::debug!(handle = %handle_id, event = %event.kind, "dropping event from superseded handle");
            return Ok(Flow::Continue);
        }
        if let Some(message) = event.error {
            return Err(PairingError::Transport { event: event.kind.to_string(), message });
        }

        match event.kind {
            EventKind::Connect => {
                let params = parse_session_params(event.kind, &event.payload)?;
                tracing::info!(address = %params.accounts[0], chain_id = params.chain_id, "wallet connected");
                self.bind(handle_id, params, true);
                Ok(Flow::Continue)
            }
            EventKind::SessionUpdate => {
                let params = parse_session_params(event.kind, &event.payload)?;
                tracing::info!(address = %params.accounts[0], chain_id = params.chain_id, "session updated");
                self.bind(handle_id, params, false);
                Ok(Flow::Continue)
            }
            EventKind::Disconnect => {
                if self.store.apply_when(Guard::Handle(handle_id), Transition::Reset).is_applied() {
                    tracing::info!(handle = %handle_id, "wallet disconnected, session reset");
                }
                Ok(Flow::Stop)
            }
        }
    }

    fn bind(&self, handle_id: HandleId, params: SessionParams, handshake: bool) {
        let address = params.accounts[0].clone();
        let chain_id = params.chain_id;
        let transition = if handshake {
            Transition::MarkConnected { accounts: params.accounts, chain_id }
        } else {
            Transition::UpdateBinding { accounts: params.accounts, chain_id }
        };
        match self.store.apply_when(Guard::Handle(handle_id), transition) {
            Outcome::Applied { generation } => {
                self.refresher.spawn_after(generation, address, chain_id);
            }
            Outcome::Discarded => {
                tracing::debug!(handle = %handle_id, "binding from superseded handle dropped");
            }
        }
    }
}

/// `payload.params[0]` as `{accounts, chainId}` with at least one account.
pub fn parse_session_params(kind: EventKind, payload: &EventPayload) -> Result<SessionParams> {
    let malformed = |reason: String| PairingError::MalformedPayload { event: kind.to_string(), reason };
    let first = payload.params.first().ok_or_else(|| malformed("missing params[0]".into()))?;
    let params: SessionParams = serde_json::from_value(first.clone()).map_err(|e| malformed(e.to_string()))?;
    if params.accounts.is_empty() {
        return Err(malformed("empty account list".into()));
    }
    Ok(params)
}
