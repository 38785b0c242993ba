//! HTTP Asset Query Service client
//!
//! `GET {asset_api_url}/account-assets?address={address}&chainId={chainId}`
//! answering `{"success": bool, "result": [Asset]}`.

use super::AssetQuery;
use crate::config::PairingConfig;
use crate::error::{PairingError, Result};
use crate::session::Asset;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
}

pub struct HttpAssetQuery {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAssetQuery {
    pub fn new(config: &PairingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PairingError::Config(format!("http client: {e}")))?;
        Ok(Self { client, base_url: config.asset_api_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl AssetQuery for HttpAssetQuery {
    async fn fetch_assets(&self, address: &str, chain_id: u64) -> Result<Vec<Asset>> {
        let url = format!("{}/account-assets", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("address", address.to_string()), ("chainId", chain_id.to_string())])
            .send()
            .await
            .map_err(|e| PairingError::AssetQuery(format!("request: {e}")))?;

        if !response.status().is_success() {
            return Err(PairingError::AssetQuery(format!("status {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PairingError::AssetQuery(format!("body: {e}")))?;
        decode_assets(body)
    }
}

fn decode_assets(body: Value) -> Result<Vec<Asset>> {
    let response: AssetsResponse =
        serde_json::from_value(body).map_err(|e| PairingError::AssetQuery(format!("json: {e}")))?;
    if !response.success {
        let reason = match response.result {
            Value::String(message) => message,
            Value::Null => "unsuccessful response".to_string(),
            other => other.to_string(),
        };
        return Err(PairingError::AssetQuery(reason));
    }
    serde_json::from_value(response.result).map_err(|e| PairingError::AssetQuery(format!("assets: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Answer one request with `status` and `body`; yields the request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(request.lines().next().unwrap_or_default().to_string());
        });
        (format!("http://{addr}"), rx)
    }

    fn local_query(base_url: String) -> HttpAssetQuery {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpAssetQuery { client, base_url }
    }

    #[test]
    fn decodes_successful_response() {
        let assets = decode_assets(json!({
            "success": true,
            "result": [
                {"symbol": "ETH", "name": "Ethereum", "decimals": "18", "contractAddress": "", "balance": "42"},
                {"symbol": "DAI", "name": "Dai", "decimals": "18", "contractAddress": "0x6b17"}
            ]
        }))
        .unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].balance.as_deref(), Some("42"));
        assert_eq!(assets[1].contract_address, "0x6b17");
        assert!(assets[1].balance.is_none());
    }

    #[test]
    fn unsuccessful_response_is_a_failure() {
        let err = decode_assets(json!({"success": false, "result": "unsupported chain"})).unwrap_err();
        assert_eq!(err, PairingError::AssetQuery("unsupported chain".into()));
        assert!(decode_assets(json!({})).is_err());
    }

    #[test]
    fn trims_trailing_slash_from_base() {
        let query = HttpAssetQuery::new(&PairingConfig::new().with_asset_api("https://assets.example/")).unwrap();
        assert_eq!(query.base_url, "https://assets.example");
    }

    #[tokio::test]
    async fn fetch_sends_address_and_chain_as_query() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"success": true, "result": [{"symbol": "ETH", "name": "Ethereum", "decimals": "18", "contractAddress": "", "balance": "7"}]}"#,
        )
        .await;

        let assets = local_query(base).fetch_assets("0xAA", 4).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].symbol, "ETH");
        assert_eq!(assets[0].balance.as_deref(), Some("7"));
        assert_eq!(request.await.unwrap(), "GET /account-assets?address=0xAA&chainId=4 HTTP/1.1");
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let (base, request) = serve_once("502 Bad Gateway", r#"{"error": "upstream"}"#).await;

        let err = local_query(base).fetch_assets("0xAA", 1).await.unwrap_err();
        assert!(matches!(err, PairingError::AssetQuery(ref reason) if reason.contains("502")));
        assert!(request.await.unwrap().starts_with("GET /account-assets?"));
    }
}
