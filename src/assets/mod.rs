//! Assets - balance refresh for the bound `(address, chain)`
//!
//! ```text
//! router / controller
//!        │ BeginFetch ──→ generation g
//!        ▼
//!   AssetQuery::fetch_assets(address, chain)
//!        │
//!        ▼
//! EndFetch under Guard::Generation(g) ──→ applied, or discarded if superseded
//! ```

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpAssetQuery;

use crate::error::Result;
use crate::session::{Asset, Guard, Outcome, Session, SessionStore, Transition};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Asset Query Service: `(address, chain)` to balance lines.
#[async_trait]
pub trait AssetQuery: Send + Sync {
    async fn fetch_assets(&self, address: &str, chain_id: u64) -> Result<Vec<Asset>>;
}

/// Fixed balances keyed by `(address, chain)`. Unknown pairs hold nothing.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetQuery {
    balances: HashMap<(String, u64), Vec<Asset>>,
}

impl StaticAssetQuery {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, address: impl Into<String>, chain_id: u64, assets: Vec<Asset>) -> Self {
        self.balances.insert((address.into(), chain_id), assets);
        self
    }
}

#[async_trait]
impl AssetQuery for StaticAssetQuery {
    async fn fetch_assets(&self, address: &str, chain_id: u64) -> Result<Vec<Asset>> {
        Ok(self.balances.get(&(address.to_string(), chain_id)).cloned().unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct AssetRefresher {
    store: Arc<SessionStore>,
    query: Arc<dyn AssetQuery>,
}

impl AssetRefresher {
    pub fn new(store: Arc<SessionStore>, query: Arc<dyn AssetQuery>) -> Self {
        Self { store, query }
    }

    /// Fetch balances for `(address, chain_id)`. Only the most recently started
    /// refresh may write its result.
    pub async fn refresh(&self, address: &str, chain_id: u64) -> Arc<Session> {
        let generation = self.store.apply(Transition::BeginFetch);
        self.complete(generation, address, chain_id).await
    }

    /// Start a refresh in the background, unless something superseded the
    /// binding that produced `binding_generation`.
    pub fn spawn_after(
        &self,
        binding_generation: u64,
        address: String,
        chain_id: u64,
    ) -> Option<JoinHandle<Arc<Session>>> {
        let Outcome::Applied { generation } =
            self.store.apply_when(Guard::Generation(binding_generation), Transition::BeginFetch)
        else {
            tracing::debug!(%address, chain_id, "binding superseded before refresh started");
            return None;
        };
        let refresher = self.clone();
        Some(tokio::spawn(async move { refresher.complete(generation, &address, chain_id).await }))
    }

    async fn complete(&self, generation: u64, address: &str, chain_id: u64) -> Arc<Session> {
        let result = self.query.fetch_assets(address, chain_id).await;
        match &result {
            Ok(assets) => tracing::debug!(address, chain_id, count = assets.len(), "assets fetched"),
            Err(err) => tracing::warn!(address, chain_id, error = %err, "asset refresh failed, keeping previous balances"),
        }
        if !self.store.apply_when(Guard::Generation(generation), Transition::EndFetch(result)).is_applied() {
            tracing::debug!(address, chain_id, generation, "asset result superseded");
        }
        self.store.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_query_serves_known_pairs() {
        let query = StaticAssetQuery::new().with("0xAA", 1, vec![Asset::new("ETH", "2")]);
        assert_eq!(query.fetch_assets("0xAA", 1).await.unwrap(), vec![Asset::new("ETH", "2")]);
        assert!(query.fetch_assets("0xAA", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_writes_assets_and_clears_pending() {
        let store = Arc::new(SessionStore::new(1));
        let query = Arc::new(StaticAssetQuery::new().with("0xAA", 1, vec![Asset::new("ETH", "2")]));
        let refresher = AssetRefresher::new(store.clone(), query);

        let session = refresher.refresh("0xAA", 1).await;
        assert!(!session.pending_fetch);
        assert_eq!(session.assets, vec![Asset::new("ETH", "2")]);
    }

    #[tokio::test]
    async fn spawn_after_skips_superseded_binding() {
        let store = Arc::new(SessionStore::new(1));
        let refresher = AssetRefresher::new(store.clone(), Arc::new(StaticAssetQuery::new()));

        let generation = store.apply(Transition::UpdateBinding { accounts: vec!["0xAA".into()], chain_id: 1 });
        store.apply(Transition::Reset);
        assert!(refresher.spawn_after(generation, "0xAA".into(), 1).is_none());
        assert_eq!(*store.get(), Session::initial(1));
    }
}
