//! Pairing Configuration - passed from the host application

use crate::error::{PairingError, Result};
use std::time::Duration;

pub const DEFAULT_BRIDGE: &str = "https://bridge.walletconnect.org";
pub const DEFAULT_ASSET_API: &str = "https://ethereum-api.xyz";
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Pairing configuration. Hosts construct this, or overlay it from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingConfig {
    pub bridge: String,
    pub default_chain_id: u64,
    pub asset_api_url: String,
    pub request_timeout: Duration,
    pub client_name: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.into(),
            default_chain_id: DEFAULT_CHAIN_ID,
            asset_api_url: DEFAULT_ASSET_API.into(),
            request_timeout: Duration::from_secs(10),
            client_name: "beepair".into(),
        }
    }
}

impl PairingConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_bridge(mut self, url: impl Into<String>) -> Self { self.bridge = url.into(); self }
    pub fn with_default_chain(mut self, chain_id: u64) -> Self { self.default_chain_id = chain_id; self }
    pub fn with_asset_api(mut self, url: impl Into<String>) -> Self { self.asset_api_url = url.into(); self }
    pub fn with_timeout(mut self, timeout: Duration) -> Self { self.request_timeout = timeout; self }
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self { self.client_name = name.into(); self }

    /// Defaults overlaid with `BEEPAIR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(bridge) = lookup("BEEPAIR_BRIDGE") {
            self.bridge = bridge;
        }
        if let Some(raw) = lookup("BEEPAIR_CHAIN_ID") {
            self.default_chain_id = parse_number("BEEPAIR_CHAIN_ID", &raw)?;
        }
        if let Some(api) = lookup("BEEPAIR_ASSET_API") {
            self.asset_api_url = api;
        }
        if let Some(raw) = lookup("BEEPAIR_TIMEOUT_SECS") {
            self.request_timeout = Duration::from_secs(parse_number("BEEPAIR_TIMEOUT_SECS", &raw)?);
        }
        if let Some(name) = lookup("BEEPAIR_CLIENT_NAME") {
            self.client_name = name;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge.trim().is_empty() {
            return Err(PairingError::Config("bridge url is empty".into()));
        }
        if self.asset_api_url.trim().is_empty() {
            return Err(PairingError::Config("asset api url is empty".into()));
        }
        if self.default_chain_id == 0 {
            return Err(PairingError::Config("chain id must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| PairingError::Config(format!("{key}: not a number: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = PairingConfig::default();
        assert_eq!(config.bridge, DEFAULT_BRIDGE);
        assert_eq!(config.default_chain_id, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlay_reads_variables() {
        let config = PairingConfig::default()
            .overlay(env(&[
                ("BEEPAIR_BRIDGE", "https://relay.example"),
                ("BEEPAIR_CHAIN_ID", " 4 "),
                ("BEEPAIR_TIMEOUT_SECS", "3"),
            ]))
            .unwrap();
        assert_eq!(config.bridge, "https://relay.example");
        assert_eq!(config.default_chain_id, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.asset_api_url, DEFAULT_ASSET_API);
    }

    #[test]
    fn overlay_rejects_bad_numbers() {
        let err = PairingConfig::default()
            .overlay(env(&[("BEEPAIR_CHAIN_ID", "mainnet")]))
            .unwrap_err();
        assert!(matches!(err, PairingError::Config(msg) if msg.contains("BEEPAIR_CHAIN_ID")));
    }

    #[test]
    fn validate_rejects_zero_chain() {
        let config = PairingConfig::new().with_default_chain(0);
        assert!(config.validate().is_err());
    }
}
