//! Beepair: wallet pairing sessions. One wallet, one binding, one store.
//!
//! # Architecture
//!
//! ```text
//! SessionController (connect / disconnect / reconcile)
//!   │
//!   ├── PairingTransport ──create──→ PairingHandle (relay handshake, external)
//!   │                                   │  └── PairingPresenter (pairing URI, external)
//!   │                                   │
//!   │                               EventStream (connect | session_update | disconnect)
//!   │                                   │
//!   ├── EventRouter ◄───────────────────┘  one consumer loop per handle
//!   │     │
//!   │     ├──→ SessionStore (atomic snapshot swaps, generation counter)
//!   │     │
//!   │     └──→ AssetRefresher ──→ AssetQuery (account-assets service, external)
//!   │                 │
//!   │                 └──→ SessionStore (EndFetch, latest start wins)
//!   │
//!   └── SessionWatch (read-only snapshots for the UI)
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | connect | `controller.connect()` | Start a handshake, or tear down a stale session |
//! | disconnect | `controller.disconnect()` | Best-effort remote kill, local reset |
//! | reconcile | `controller.reconcile()` | Re-subscribe, adopting a session that is already live |
//! | read | `controller.session()` | Current `Session` snapshot |
//! | watch | `controller.subscribe()` | Snapshot change feed |
//!
//! # Features
//!
//! - `http` (default) - `HttpAssetQuery`, the reqwest client for the asset service
//!
//! # Usage
//!
//! ```ignore
//! use beepair::{MemoryTransport, MemoryWallet, PairingConfig, SessionController, StaticAssetQuery};
//! use std::sync::Arc;
//!
//! let wallet = MemoryWallet::new();
//! let controller = SessionController::new(
//!     PairingConfig::from_env()?,
//!     Arc::new(MemoryTransport::new(wallet.clone())),
//!     Arc::new(StaticAssetQuery::new()),
//! );
//!
//! controller.connect().await?;
//! wallet.approve(vec!["0xAA".into()], 1);
//! let session = controller.subscribe().wait_for(|s| s.connected).await;
//! ```

pub mod assets;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod session;
pub mod transport;

pub use assets::{AssetQuery, AssetRefresher, StaticAssetQuery};
#[cfg(feature = "http")]
pub use assets::HttpAssetQuery;
pub use config::PairingConfig;
pub use controller::{ConnectOutcome, LocalAccount, SessionController};
pub use error::{PairingError, Result};
pub use router::{EventRouter, Subscription};
pub use runtime::{install_signal_handlers, Shutdown};
pub use session::{Asset, Session, SessionStore, SessionWatch, Transition};
pub use transport::{
    EventKind, HandleRef, LogPresenter, MemoryPeer, MemoryTransport, MemoryWallet, PairingHandle,
    PairingPresenter, PairingTransport, RecordingPresenter, SessionParams, SharedHandle, TransportEvent,
};
