//! Pairing Transport - the relay handshake and the peer's push-event channel
//!
//! The relay protocol itself lives outside this crate. A transport hands out
//! [`PairingHandle`]s; each handle performs the handshake and pushes typed
//! [`TransportEvent`]s onto every stream obtained from [`PairingHandle::subscribe`].
//! Dropping the stream releases the listener.
//!
//! # Event Wire Shape
//!
//! | Event | `payload.params[0]` |
//! |-------|---------------------|
//! | `connect` | `{accounts, chainId}` |
//! | `session_update` | `{accounts, chainId}` |
//! | `disconnect` | `{message}` (ignored) |

mod memory;
mod presenter;

pub use memory::{MemoryPeer, MemoryTransport, MemoryWallet};
pub use presenter::{LogPresenter, PairingPresenter, PresenterEvent, RecordingPresenter};

use crate::config::PairingConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type SharedHandle = Arc<dyn PairingHandle>;

/// Events pushed by one handle, in delivery order.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    SessionUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::SessionUpdate => "session_update",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "connect" => Some(EventKind::Connect),
            "disconnect" => Some(EventKind::Disconnect),
            "session_update" => Some(EventKind::SessionUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub params: Vec<Value>,
}

/// `(error, payload)` pair delivered for one named event.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub kind: EventKind,
    pub error: Option<String>,
    pub payload: EventPayload,
}

impl TransportEvent {
    pub fn connect(accounts: Vec<String>, chain_id: u64) -> Self {
        Self::with_params(EventKind::Connect, SessionParams { accounts, chain_id })
    }

    pub fn session_update(accounts: Vec<String>, chain_id: u64) -> Self {
        Self::with_params(EventKind::SessionUpdate, SessionParams { accounts, chain_id })
    }

    pub fn disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Disconnect,
            error: None,
            payload: EventPayload { params: vec![json!({"message": message.into()})] },
        }
    }

    pub fn failed(kind: EventKind, message: impl Into<String>) -> Self {
        Self { kind, error: Some(message.into()), payload: EventPayload::default() }
    }

    fn with_params(kind: EventKind, params: SessionParams) -> Self {
        let value = serde_json::to_value(&params).unwrap_or(Value::Null);
        Self { kind, error: None, payload: EventPayload { params: vec![value] } }
    }
}

/// The `{accounts, chainId}` pair carried by `connect` and `session_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub accounts: Vec<String>,
    pub chain_id: u64,
}

/// One relay session with a remote wallet.
#[async_trait]
pub trait PairingHandle: Send + Sync {
    fn connected(&self) -> bool;
    fn accounts(&self) -> Vec<String>;
    fn chain_id(&self) -> u64;

    /// Start a new handshake. Presenting the pairing URI is the transport's business.
    async fn create_session(&self) -> Result<()>;

    /// Ask the peer to end the session.
    async fn kill_session(&self) -> Result<()>;

    /// Register a listener for `connect`, `disconnect` and `session_update`.
    fn subscribe(&self) -> EventStream;
}

pub trait PairingTransport: Send + Sync {
    fn create(&self, config: &PairingConfig) -> Result<SharedHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "h{}", self.0) }
}

/// Owned reference to the active handle. Equality is identity.
#[derive(Clone)]
pub struct HandleRef {
    id: HandleId,
    inner: SharedHandle,
}

impl HandleRef {
    pub fn new(inner: SharedHandle) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self { id: HandleId(NEXT.fetch_add(1, Ordering::Relaxed)), inner }
    }

    pub fn id(&self) -> HandleId { self.id }
}

impl Deref for HandleRef {
    type Target = dyn PairingHandle;
    fn deref(&self) -> &Self::Target { self.inner.as_ref() }
}

impl PartialEq for HandleRef {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl fmt::Debug for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleRef").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire() {
        for kind in [EventKind::Connect, EventKind::Disconnect, EventKind::SessionUpdate] {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("call_request"), None);
    }

    #[test]
    fn params_use_camel_case() {
        let event = TransportEvent::session_update(vec!["0xBB".into()], 4);
        assert_eq!(event.payload.params[0], json!({"accounts": ["0xBB"], "chainId": 4}));
        assert!(event.error.is_none());
    }
}
