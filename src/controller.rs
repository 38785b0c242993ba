//! Session Lifecycle Controller - connect, disconnect, reconcile
//!
//! Lifecycle operations are serialized on the subscription lock; readers of
//! the store are never blocked by them, not even while a handshake is pending.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `connect()` | create/obtain handle, attach router, start handshake (or tear down a stale session) |
//! | `disconnect()` | best-effort `kill_session`, then `Reset` |
//! | `reconcile()` | re-subscribe to the current handle, adopting a live session |
//! | `resume(handle)` | own an existing live handle (remount), then reconcile |
//! | `refresh_assets()` | re-fetch balances for the current binding |

use crate::assets::{AssetQuery, AssetRefresher};
use crate::config::PairingConfig;
use crate::error::{PairingError, Result};
use crate::router::{EventRouter, Subscription};
use crate::session::{Guard, Session, SessionStore, SessionWatch, Transition};
use crate::transport::{HandleRef, PairingTransport, SharedHandle};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The host's own signer, recorded next to the bound wallet.
#[async_trait]
pub trait LocalAccount: Send + Sync {
    async fn address(&self) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Handshake initiated; the wallet's approval arrives as a `connect` event.
    Pairing,
    /// The handle already carried a session, which was torn down instead.
    TornDown,
}

pub struct SessionController {
    config: PairingConfig,
    transport: Arc<dyn PairingTransport>,
    store: Arc<SessionStore>,
    router: EventRouter,
    refresher: AssetRefresher,
    local_account: Option<Arc<dyn LocalAccount>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionController {
    pub fn new(config: PairingConfig, transport: Arc<dyn PairingTransport>, assets: Arc<dyn AssetQuery>) -> Self {
        let store = Arc::new(SessionStore::new(config.default_chain_id));
        let refresher = AssetRefresher::new(store.clone(), assets);
        let router = EventRouter::new(store.clone(), refresher.clone());
        Self {
            config,
            transport,
            store,
            router,
            refresher,
            local_account: None,
            subscription: Mutex::new(None),
        }
    }

    pub fn with_local_account(mut self, account: Arc<dyn LocalAccount>) -> Self {
        self.local_account = Some(account);
        self
    }

    pub fn session(&self) -> Arc<Session> { self.store.get() }
    pub fn subscribe(&self) -> SessionWatch { self.store.subscribe() }

    pub fn fault(&self) -> Option<PairingError> {
        self.router.faults().borrow().clone()
    }

    /// Resolves with the first fatal transport fault.
    pub async fn faulted(&self) -> Option<PairingError> {
        let mut faults = self.router.faults();
        let fault = faults.wait_for(Option::is_some).await.ok()?;
        fault.clone()
    }

    /// Fails with the recorded fault once the router has stopped on one.
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        let mut subscription = self.subscription.lock().await;
        if let Some(fault) = self.fault() {
            tracing::warn!(error = %fault, "connect refused after fatal transport fault");
            return Err(fault);
        }
        let previous = self.store.get().handle.clone();
        let handle = match &previous {
            Some(handle) => handle.clone(),
            None => {
                let handle = HandleRef::new(self.transport.create(&self.config)?);
                tracing::info!(handle = %handle.id(), bridge = %self.config.bridge, "pairing handle created");
                handle
            }
        };
        self.store.apply(Transition::SetHandle(Some(handle.clone())));

        if handle.connected() {
            tracing::info!(handle = %handle.id(), "handle already carries a session, tearing it down");
            self.teardown(&mut subscription);
            return Ok(ConnectOutcome::TornDown);
        }

        self.resubscribe(&mut subscription, false);

        if let Err(err) = handle.create_session().await {
            tracing::warn!(handle = %handle.id(), error = %err, "handshake initiation failed");
            if previous.is_none() {
                self.store.apply_when(Guard::Handle(handle.id()), Transition::SetHandle(None));
                *subscription = None;
            }
            return Err(err);
        }
        tracing::info!(handle = %handle.id(), "handshake initiated, waiting for wallet approval");

        self.load_local_address(&handle).await;
        Ok(ConnectOutcome::Pairing)
    }

    pub async fn disconnect(&self) {
        let mut subscription = self.subscription.lock().await;
        self.teardown(&mut subscription);
    }

    /// Re-run subscription against the current handle. A handle that is
    /// already connected is folded into the store as a session update.
    pub async fn reconcile(&self) -> Arc<Session> {
        let mut subscription = self.subscription.lock().await;
        self.resubscribe(&mut subscription, true);
        self.store.get()
    }

    /// Take ownership of a handle that outlived a previous controller. A
    /// session this controller already owns is torn down first.
    pub async fn resume(&self, handle: SharedHandle) -> Arc<Session> {
        let mut subscription = self.subscription.lock().await;
        if self.store.get().handle.is_some() {
            self.teardown(&mut subscription);
        }
        let handle = HandleRef::new(handle);
        tracing::info!(handle = %handle.id(), "resuming handle");
        self.store.apply(Transition::SetHandle(Some(handle)));
        self.resubscribe(&mut subscription, true);
        self.store.get()
    }

    /// Re-fetch balances for the bound address. `None` when nothing is bound.
    pub async fn refresh_assets(&self) -> Option<Arc<Session>> {
        let session = self.store.get();
        let (address, chain_id) = session.binding()?;
        Some(self.refresher.refresh(address, chain_id).await)
    }

    fn teardown(&self, subscription: &mut Option<Subscription>) {
        if let Some(handle) = self.store.get().handle.clone() {
            tokio::spawn(async move {
                if let Err(err) = handle.kill_session().await {
                    tracing::warn!(handle = %handle.id(), error = %err, "kill_session failed");
                }
            });
        }
        self.store.apply(Transition::Reset);
        *subscription = None;
        tracing::info!("session reset");
    }

    /// Release the previous registration before attaching to the current handle.
    fn resubscribe(&self, subscription: &mut Option<Subscription>, force: bool) {
        let current = self.store.get().handle.clone();
        let attached = subscription.as_ref().filter(|s| s.is_active()).map(Subscription::handle_id);
        if !force && attached.is_some() && attached == current.as_ref().map(HandleRef::id) {
            return;
        }
        *subscription = None;
        if let Some(handle) = current {
            *subscription = Some(self.router.attach(&handle));
        }
    }

    async fn load_local_address(&self, handle: &HandleRef) {
        let Some(account) = &self.local_account else { return };
        match account.address().await {
            Ok(address) => {
                self.store.apply_when(Guard::Handle(handle.id()), Transition::SetLocalAddress(address));
            }
            Err(err) => tracing::warn!(error = %err, "local account unavailable"),
        }
    }
}
