//! Loopback transport - an in-process wallet standing in for the relay
//!
//! ```text
//! MemoryTransport::create() ──→ MemoryHandle ◄──── MemoryPeer (wallet side)
//!                                    │                  approve / update /
//!                                    │                  disconnect / fail
//!                                    └── listeners ──→ EventStream(s)
//! ```
//!
//! Every handle created by the transport is registered with the shared
//! [`MemoryWallet`]; the wallet drives the most recent one, or any earlier one
//! through [`MemoryWallet::peers`].

use super::{
    EventKind, EventStream, LogPresenter, PairingHandle, PairingPresenter, PairingTransport,
    SessionParams, SharedHandle, TransportEvent,
};
use crate::config::PairingConfig;
use crate::error::{PairingError, Result};
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Remote wallet simulator shared by the transport and the test/demo driver.
#[derive(Clone, Default)]
pub struct MemoryWallet {
    inner: Arc<WalletInner>,
}

#[derive(Default)]
struct WalletInner {
    peers: Mutex<Vec<MemoryPeer>>,
    resume: Mutex<Option<SessionParams>>,
    fail_next: Mutex<Option<String>>,
    kills: AtomicUsize,
    killed: Notify,
}

impl MemoryWallet {
    pub fn new() -> Self { Self::default() }

    /// The next handle starts out connected, as if a stored session was restored.
    pub fn resume_with(&self, accounts: Vec<String>, chain_id: u64) {
        if let Ok(mut resume) = self.inner.resume.lock() {
            *resume = Some(SessionParams { accounts, chain_id });
        }
    }

    /// The next `create_session` call fails with a handshake error.
    pub fn fail_next_handshake(&self, reason: impl Into<String>) {
        if let Ok(mut fail) = self.inner.fail_next.lock() {
            *fail = Some(reason.into());
        }
    }

    /// Peer for the most recently created handle.
    pub fn peer(&self) -> Option<MemoryPeer> {
        self.inner.peers.lock().ok()?.last().cloned()
    }

    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.inner.peers.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn approve(&self, accounts: Vec<String>, chain_id: u64) -> bool {
        self.peer().map(|p| p.approve(accounts, chain_id)).is_some()
    }

    pub fn update(&self, accounts: Vec<String>, chain_id: u64) -> bool {
        self.peer().map(|p| p.update(accounts, chain_id)).is_some()
    }

    pub fn disconnect(&self) -> bool {
        self.peer().map(|p| p.disconnect()).is_some()
    }

    /// Number of `kill_session` requests received so far.
    pub fn kill_requests(&self) -> usize {
        self.inner.kills.load(Ordering::SeqCst)
    }

    /// Resolves after the next (or an already pending) `kill_session` request.
    pub async fn wait_for_kill(&self) {
        self.inner.killed.notified().await
    }

    fn register(&self, peer: MemoryPeer) {
        if let Ok(mut peers) = self.inner.peers.lock() { peers.push(peer); }
    }

    fn take_resume(&self) -> Option<SessionParams> {
        self.inner.resume.lock().ok()?.take()
    }

    fn take_failure(&self) -> Option<String> {
        self.inner.fail_next.lock().ok()?.take()
    }

    fn record_kill(&self) {
        self.inner.kills.fetch_add(1, Ordering::SeqCst);
        self.inner.killed.notify_one();
    }
}

/// Transport backed by a [`MemoryWallet`].
pub struct MemoryTransport {
    wallet: MemoryWallet,
    presenter: Arc<dyn PairingPresenter>,
}

impl MemoryTransport {
    pub fn new(wallet: MemoryWallet) -> Self {
        Self { wallet, presenter: Arc::new(LogPresenter) }
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn PairingPresenter>) -> Self {
        self.presenter = presenter;
        self
    }
}

impl PairingTransport for MemoryTransport {
    fn create(&self, config: &PairingConfig) -> Result<SharedHandle> {
        config.validate().map_err(|e| PairingError::TransportUnavailable(e.to_string()))?;
        let state = Arc::new(HandleState {
            bridge: config.bridge.clone(),
            client_name: config.client_name.clone(),
            presenter: self.presenter.clone(),
            wallet: self.wallet.clone(),
            binding: Mutex::new(Binding::default()),
            listeners: Mutex::new(Vec::new()),
        });
        if let Some(params) = self.wallet.take_resume() {
            state.set_binding(true, params.accounts, params.chain_id);
        }
        self.wallet.register(MemoryPeer { state: state.clone() });
        Ok(Arc::new(MemoryHandle { state }))
    }
}

#[derive(Debug, Default)]
struct Binding {
    connected: bool,
    accounts: Vec<String>,
    chain_id: u64,
    uri: Option<String>,
}

struct HandleState {
    bridge: String,
    client_name: String,
    presenter: Arc<dyn PairingPresenter>,
    wallet: MemoryWallet,
    binding: Mutex<Binding>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

impl HandleState {
    fn set_binding(&self, connected: bool, accounts: Vec<String>, chain_id: u64) {
        if let Ok(mut binding) = self.binding.lock() {
            binding.connected = connected;
            binding.accounts = accounts;
            binding.chain_id = chain_id;
        }
    }

    fn clear_binding(&self) {
        if let Ok(mut binding) = self.binding.lock() {
            *binding = Binding::default();
        }
    }

    fn emit(&self, event: TransportEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

struct MemoryHandle {
    state: Arc<HandleState>,
}

#[async_trait]
impl PairingHandle for MemoryHandle {
    fn connected(&self) -> bool {
        self.state.binding.lock().map(|b| b.connected).unwrap_or(false)
    }

    fn accounts(&self) -> Vec<String> {
        self.state.binding.lock().map(|b| b.accounts.clone()).unwrap_or_default()
    }

    fn chain_id(&self) -> u64 {
        self.state.binding.lock().map(|b| b.chain_id).unwrap_or_default()
    }

    async fn create_session(&self) -> Result<()> {
        if self.connected() {
            return Err(PairingError::Handshake("session currently connected".into()));
        }
        if let Some(reason) = self.state.wallet.take_failure() {
            return Err(PairingError::Handshake(reason));
        }
        let uri = pairing_uri(&self.state.client_name, &self.state.bridge);
        if let Ok(mut binding) = self.state.binding.lock() {
            binding.uri = Some(uri.clone());
        }
        tracing::debug!(%uri, "session request published");
        self.state.presenter.open(&uri);
        Ok(())
    }

    async fn kill_session(&self) -> Result<()> {
        self.state.wallet.record_kill();
        self.state.clear_binding();
        self.state.presenter.close();
        self.state.emit(TransportEvent::disconnect("Session disconnected"));
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut listeners) = self.state.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }
}

/// Wallet-side driver for one handle.
#[derive(Clone)]
pub struct MemoryPeer {
    state: Arc<HandleState>,
}

impl MemoryPeer {
    /// Approve the session request: handle becomes connected, `connect` is pushed.
    pub fn approve(&self, accounts: Vec<String>, chain_id: u64) {
        self.state.set_binding(true, accounts.clone(), chain_id);
        self.state.presenter.close();
        self.state.emit(TransportEvent::connect(accounts, chain_id));
    }

    pub fn update(&self, accounts: Vec<String>, chain_id: u64) {
        self.state.set_binding(true, accounts.clone(), chain_id);
        self.state.emit(TransportEvent::session_update(accounts, chain_id));
    }

    /// Wallet-initiated teardown.
    pub fn disconnect(&self) {
        self.state.clear_binding();
        self.state.presenter.close();
        self.state.emit(TransportEvent::disconnect("Session disconnected"));
    }

    /// Push an event carrying an error argument.
    pub fn fail(&self, kind: EventKind, message: impl Into<String>) {
        self.state.emit(TransportEvent::failed(kind, message));
    }

    /// Push an arbitrary event, malformed ones included.
    pub fn push(&self, event: TransportEvent) {
        self.state.emit(event);
    }

    /// Live listeners (streams not yet dropped).
    pub fn listener_count(&self) -> usize {
        self.state
            .listeners
            .lock()
            .map(|mut listeners| {
                listeners.retain(|tx| !tx.is_closed());
                listeners.len()
            })
            .unwrap_or(0)
    }

    pub fn uri(&self) -> Option<String> {
        self.state.binding.lock().ok()?.uri.clone()
    }

    pub fn handle(&self) -> SharedHandle {
        Arc::new(MemoryHandle { state: self.state.clone() })
    }
}

/// `wc:{topic}@1?bridge={bridge}&key={key}`
fn pairing_uri(client_name: &str, bridge: &str) -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seed = format!("{client_name}:{nanos}:{}", SEQ.fetch_add(1, Ordering::Relaxed));
    let topic_hash = blake3::hash(seed.as_bytes());
    let key_hash = blake3::keyed_hash(topic_hash.as_bytes(), b"beepair-session-key");
    let topic = hex::encode(&topic_hash.as_bytes()[..16]);
    let key = hex::encode(key_hash.as_bytes());
    format!("wc:{topic}@1?bridge={}&key={key}", percent_encode(bridge))
}

/// RFC 3986 unreserved characters pass through, every other byte is `%XX`.
fn percent_encode(value: &str) -> String {
    value.bytes().fold(String::with_capacity(value.len()), |mut out, b| {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingPresenter;

    fn transport() -> (MemoryWallet, MemoryTransport, Arc<RecordingPresenter>) {
        let wallet = MemoryWallet::new();
        let presenter = Arc::new(RecordingPresenter::new());
        let transport = MemoryTransport::new(wallet.clone()).with_presenter(presenter.clone());
        (wallet, transport, presenter)
    }

    #[test]
    fn uri_shape() {
        let uri = pairing_uri("beepair", "https://bridge.walletconnect.org");
        assert!(uri.starts_with("wc:"));
        assert!(uri.contains("@1?bridge=https%3A%2F%2Fbridge.walletconnect.org&key="));
        let key = uri.rsplit("key=").next().unwrap();
        assert_eq!(key.len(), 64);
        assert_ne!(uri, pairing_uri("beepair", "https://bridge.walletconnect.org"));
    }

    #[test]
    fn bridge_is_percent_encoded() {
        assert_eq!(percent_encode("https://relay.example:443/v1"), "https%3A%2F%2Frelay.example%3A443%2Fv1");
        assert_eq!(percent_encode("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[tokio::test]
    async fn handshake_opens_presenter_and_approval_closes_it() {
        let (wallet, transport, presenter) = transport();
        let handle = transport.create(&PairingConfig::default()).unwrap();
        let mut events = handle.subscribe();

        handle.create_session().await.unwrap();
        assert!(presenter.is_open());
        assert_eq!(presenter.last_uri(), wallet.peer().unwrap().uri());

        assert!(wallet.approve(vec!["0xAA".into()], 1));
        assert!(!presenter.is_open());
        assert!(handle.connected());
        assert_eq!(handle.accounts(), vec!["0xAA".to_string()]);

        let event = events.recv().await.unwrap();
        assert_eq!(event, TransportEvent::connect(vec!["0xAA".into()], 1));
    }

    #[tokio::test]
    async fn resumed_handle_starts_connected() {
        let (wallet, transport, _) = transport();
        wallet.resume_with(vec!["0xCC".into()], 5);
        let handle = transport.create(&PairingConfig::default()).unwrap();
        assert!(handle.connected());
        assert_eq!(handle.chain_id(), 5);
        assert!(handle.create_session().await.is_err());

        // Only the next handle is resumed
        let fresh = transport.create(&PairingConfig::default()).unwrap();
        assert!(!fresh.connected());
    }

    #[tokio::test]
    async fn kill_session_is_counted_and_pushes_disconnect() {
        let (wallet, transport, _) = transport();
        let handle = transport.create(&PairingConfig::default()).unwrap();
        let mut events = handle.subscribe();
        wallet.approve(vec!["0xAA".into()], 1);
        let _ = events.recv().await;

        handle.kill_session().await.unwrap();
        wallet.wait_for_kill().await;
        assert_eq!(wallet.kill_requests(), 1);
        assert!(!handle.connected());
        assert_eq!(events.recv().await.unwrap().kind, EventKind::Disconnect);
    }

    #[tokio::test]
    async fn dropped_streams_release_listeners() {
        let (wallet, transport, _) = transport();
        let handle = transport.create(&PairingConfig::default()).unwrap();
        let first = handle.subscribe();
        let _second = handle.subscribe();
        let peer = wallet.peer().unwrap();
        assert_eq!(peer.listener_count(), 2);
        drop(first);
        assert_eq!(peer.listener_count(), 1);
    }

    #[tokio::test]
    async fn scripted_handshake_failure_is_one_shot() {
        let (wallet, transport, _) = transport();
        let handle = transport.create(&PairingConfig::default()).unwrap();
        wallet.fail_next_handshake("bridge unreachable");
        assert_eq!(
            handle.create_session().await,
            Err(PairingError::Handshake("bridge unreachable".into()))
        );
        assert!(handle.create_session().await.is_ok());
    }
}
