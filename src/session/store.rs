//! Binding State Store
//!
//! Holds one `Arc<Session>` plus a generation counter inside a tokio `watch`
//! channel. Every transition builds a new snapshot and swaps it in under the
//! channel's write lock, so readers only ever see whole snapshots.

use super::model::{Asset, Session};
use crate::error::PairingError;
use crate::transport::{HandleId, HandleRef};
use std::sync::Arc;
use tokio::sync::watch;

pub type FetchResult = std::result::Result<Vec<Asset>, PairingError>;

#[derive(Debug)]
pub enum Transition {
    Reset,
    SetHandle(Option<HandleRef>),
    SetLocalAddress(String),
    MarkConnected { accounts: Vec<String>, chain_id: u64 },
    UpdateBinding { accounts: Vec<String>, chain_id: u64 },
    BeginFetch,
    EndFetch(FetchResult),
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Reset => "reset",
            Transition::SetHandle(_) => "set_handle",
            Transition::SetLocalAddress(_) => "set_local_address",
            Transition::MarkConnected { .. } => "mark_connected",
            Transition::UpdateBinding { .. } => "update_binding",
            Transition::BeginFetch => "begin_fetch",
            Transition::EndFetch(_) => "end_fetch",
        }
    }

    /// Transitions that supersede any fetch in flight.
    fn advances(&self) -> bool {
        matches!(
            self,
            Transition::Reset
                | Transition::MarkConnected { .. }
                | Transition::UpdateBinding { .. }
                | Transition::BeginFetch
        )
    }

    fn apply_to(self, current: &Session, default_chain_id: u64) -> Session {
        let mut next = current.clone();
        match self {
            Transition::Reset => return Session::initial(default_chain_id),
            Transition::SetHandle(handle) => next.handle = handle,
            Transition::SetLocalAddress(address) => next.local_address = Some(address),
            Transition::MarkConnected { accounts, chain_id }
            | Transition::UpdateBinding { accounts, chain_id } => {
                next.connected = !accounts.is_empty();
                next.bound_address = accounts.first().cloned();
                next.accounts = accounts;
                next.chain_id = chain_id;
                next.pending_fetch = false;
            }
            Transition::BeginFetch => next.pending_fetch = true,
            Transition::EndFetch(result) => {
                next.pending_fetch = false;
                if let Ok(assets) = result {
                    next.assets = assets;
                }
            }
        }
        next
    }
}

/// Precondition checked under the write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    /// The store still owns this handle.
    Handle(HandleId),
    /// No superseding transition happened since this generation.
    Generation(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied { generation: u64 },
    Discarded,
}

impl Outcome {
    pub fn is_applied(&self) -> bool { matches!(self, Outcome::Applied { .. }) }

    pub fn generation(&self) -> Option<u64> {
        match self {
            Outcome::Applied { generation } => Some(*generation),
            Outcome::Discarded => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    session: Arc<Session>,
    generation: u64,
}

impl Slot {
    fn admits(&self, guard: Guard) -> bool {
        match guard {
            Guard::Always => true,
            Guard::Handle(id) => self.session.handle_id() == Some(id),
            Guard::Generation(generation) => self.generation == generation,
        }
    }
}

pub struct SessionStore {
    tx: watch::Sender<Slot>,
    default_chain_id: u64,
}

impl SessionStore {
    pub fn new(default_chain_id: u64) -> Self {
        let (tx, _) = watch::channel(Slot { session: Arc::new(Session::initial(default_chain_id)), generation: 0 });
        Self { tx, default_chain_id }
    }

    pub fn get(&self) -> Arc<Session> {
        self.tx.borrow().session.clone()
    }

    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    pub fn default_chain_id(&self) -> u64 { self.default_chain_id }

    /// Apply unconditionally. Returns the generation after the transition.
    pub fn apply(&self, transition: Transition) -> u64 {
        match self.apply_when(Guard::Always, transition) {
            Outcome::Applied { generation } => generation,
            Outcome::Discarded => self.generation(),
        }
    }

    pub fn apply_when(&self, guard: Guard, transition: Transition) -> Outcome {
        let mut outcome = Outcome::Discarded;
        let name = transition.name();
        self.tx.send_if_modified(|slot| {
            if !slot.admits(guard) {
                return false;
            }
            if transition.advances() {
                slot.generation += 1;
            }
            slot.session = Arc::new(transition.apply_to(&slot.session, self.default_chain_id));
            outcome = Outcome::Applied { generation: slot.generation };
            true
        });
        match outcome {
            Outcome::Applied { generation } => tracing::debug!(transition = name, generation, "applied"),
            Outcome::Discarded => tracing::debug!(transition = name, ?guard, "discarded"),
        }
        outcome
    }

    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch { rx: self.tx.subscribe() }
    }
}

/// Change feed over the store. Each `changed()` yields a whole snapshot.
pub struct SessionWatch {
    rx: watch::Receiver<Slot>,
}

impl SessionWatch {
    /// Next applied snapshot, or `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<Session>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().session.clone())
    }

    /// First snapshot (current included) satisfying `predicate`.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&Session) -> bool) -> Option<Arc<Session>> {
        let slot = self.rx.wait_for(|slot| predicate(&slot.session)).await.ok()?;
        Some(slot.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(store: &SessionStore, address: &str, chain_id: u64) -> u64 {
        store.apply(Transition::UpdateBinding { accounts: vec![address.into()], chain_id })
    }

    #[test]
    fn starts_empty_on_fallback_chain() {
        let store = SessionStore::new(1);
        assert_eq!(*store.get(), Session::initial(1));
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn binding_derives_bound_address_from_first_account() {
        let store = SessionStore::new(1);
        store.apply(Transition::MarkConnected {
            accounts: vec!["0xAA".into(), "0xAB".into()],
            chain_id: 3,
        });
        let session = store.get();
        assert!(session.connected);
        assert_eq!(session.bound_address.as_deref(), Some("0xAA"));
        assert_eq!(session.accounts.len(), 2);
        assert_eq!(session.binding(), Some(("0xAA", 3)));
    }

    #[test]
    fn end_fetch_under_stale_generation_is_discarded() {
        let store = SessionStore::new(1);
        let first = store.apply(Transition::BeginFetch);
        let second = store.apply(Transition::BeginFetch);
        assert!(second > first);

        let late = store.apply_when(Guard::Generation(first), Transition::EndFetch(Ok(vec![Asset::new("OLD", "1")])));
        assert_eq!(late, Outcome::Discarded);
        assert!(store.get().pending_fetch);

        let current = store.apply_when(Guard::Generation(second), Transition::EndFetch(Ok(vec![Asset::new("NEW", "2")])));
        assert!(current.is_applied());
        let session = store.get();
        assert!(!session.pending_fetch);
        assert_eq!(session.assets, vec![Asset::new("NEW", "2")]);
    }

    #[test]
    fn failed_fetch_keeps_previous_assets() {
        let store = SessionStore::new(1);
        let generation = store.apply(Transition::BeginFetch);
        store.apply_when(Guard::Generation(generation), Transition::EndFetch(Ok(vec![Asset::new("ETH", "5")])));

        let generation = store.apply(Transition::BeginFetch);
        store.apply_when(
            Guard::Generation(generation),
            Transition::EndFetch(Err(PairingError::AssetQuery("timeout".into()))),
        );
        let session = store.get();
        assert!(!session.pending_fetch);
        assert_eq!(session.assets, vec![Asset::new("ETH", "5")]);
    }

    #[test]
    fn reset_clears_everything_and_supersedes_fetches() {
        let store = SessionStore::new(1);
        bind(&store, "0xAA", 4);
        store.apply(Transition::SetLocalAddress("0x11".into()));
        let generation = store.apply(Transition::BeginFetch);

        store.apply(Transition::Reset);
        assert_eq!(*store.get(), Session::initial(1));

        let late = store.apply_when(Guard::Generation(generation), Transition::EndFetch(Ok(vec![Asset::new("ETH", "1")])));
        assert_eq!(late, Outcome::Discarded);
        assert_eq!(*store.get(), Session::initial(1));
    }

    #[test]
    fn binding_clears_pending_fetch_it_supersedes() {
        let store = SessionStore::new(1);
        store.apply(Transition::BeginFetch);
        bind(&store, "0xBB", 4);
        assert!(!store.get().pending_fetch);
    }

    #[test]
    fn local_address_and_handle_do_not_advance_generation() {
        let store = SessionStore::new(1);
        let generation = store.apply(Transition::BeginFetch);
        store.apply(Transition::SetLocalAddress("0x11".into()));
        store.apply(Transition::SetHandle(None));
        assert_eq!(store.generation(), generation);
    }

    #[tokio::test]
    async fn watchers_see_whole_snapshots() {
        let store = SessionStore::new(1);
        let mut watch = store.subscribe();
        bind(&store, "0xAA", 1);
        let seen = watch.changed().await.unwrap();
        assert_eq!(seen.bound_address.as_deref(), Some("0xAA"));
        assert!(seen.connected);

        store.apply(Transition::Reset);
        let seen = watch.wait_for(|s| !s.connected).await.unwrap();
        assert_eq!(*seen, Session::initial(1));
    }
}
