//! Session and Asset records

use crate::transport::{HandleId, HandleRef};
use serde::{Deserialize, Serialize};

/// The single wallet session, as seen by readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub connected: bool,
    pub chain_id: u64,
    /// Raw list reported by the peer. The first entry is authoritative.
    pub accounts: Vec<String>,
    pub bound_address: Option<String>,
    /// Host's own signer address, recorded next to the bound wallet.
    pub local_address: Option<String>,
    pub pending_fetch: bool,
    /// Last successful fetch. Kept when a later refresh fails.
    pub assets: Vec<Asset>,
    #[serde(skip)]
    pub(crate) handle: Option<HandleRef>,
}

impl Session {
    pub fn initial(chain_id: u64) -> Self {
        Self {
            connected: false,
            chain_id,
            accounts: Vec::new(),
            bound_address: None,
            local_address: None,
            pending_fetch: false,
            assets: Vec::new(),
            handle: None,
        }
    }

    pub fn handle_id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(HandleRef::id)
    }

    /// `(bound_address, chain_id)` when an address is bound.
    pub fn binding(&self) -> Option<(&str, u64)> {
        self.bound_address.as_deref().map(|address| (address, self.chain_id))
    }
}

/// One balance line as returned by the asset service. Not validated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub decimals: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, balance: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), balance: Some(balance.into()), ..Default::default() }
    }
}
