//! Session - the binding state read by the rest of the application
//!
//! # Transitions
//!
//! | Transition | Effect | Advances generation |
//! |------------|--------|---------------------|
//! | `Reset` | back to `Session::initial` | yes |
//! | `SetHandle` | own (or drop) the transport handle | no |
//! | `SetLocalAddress` | record the host signer address | no |
//! | `MarkConnected` | handshake approved: accounts, chain, bound address | yes |
//! | `UpdateBinding` | peer changed accounts or chain | yes |
//! | `BeginFetch` | `pending_fetch = true` | yes |
//! | `EndFetch` | `pending_fetch = false`, assets on success | no |
//!
//! A fetch result is only written under the generation its `BeginFetch`
//! produced, so a refresh started earlier never overwrites a later one and
//! nothing lands on a session that was reset in the meantime.

mod model;
mod store;

pub use model::{Asset, Session};
pub use store::{FetchResult, Guard, Outcome, SessionStore, SessionWatch, Transition};
