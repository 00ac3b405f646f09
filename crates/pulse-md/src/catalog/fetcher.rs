//! Instrument catalog over HTTP.
//!
//! # Endpoint
//!
//! | Operation     | Method | Path                          |
//! |---------------|--------|-------------------------------|
//! | Spot catalog  | GET    | `<endpoint>?future=false`     |
//! | Future catalog| GET    | `<endpoint>?future=true`      |
//!
//! Response body:
//!
//! ```json
//! {"msg": "...", "time": 1700000000000, "data": [{"symbol": "BTC-USD", "isFuture": false}]}
//! ```
//!
//! Entries may carry an optional `price` (number or string).

use async_trait::async_trait;
use pulse_core::config::CatalogConfig;
use pulse_core::{CatalogSnapshot, Category, Instrument};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use super::{CatalogError, CatalogSource};
use crate::json_util::parse_str_f64;

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    data: Option<Vec<CatalogEntry>>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    symbol: String,
    #[serde(rename = "isFuture")]
    is_future: bool,
    #[serde(default)]
    price: Option<serde_json::Value>,
}

/// Catalog client for the REST endpoint. Stateless beyond its HTTP client.
pub struct HttpCatalogFetcher {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Catalog URL without query string.
    endpoint: String,
}

impl HttpCatalogFetcher {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogFetcher {
    async fn fetch(&self, category: Category) -> Result<CatalogSnapshot, CatalogError> {
        debug!("[catalog] GET {} future={}", self.endpoint, category.is_future());

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("future", category.is_future().to_string())])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body = resp.text().await.map_err(|e| CatalogError::Network(e.to_string()))?;
        parse_catalog(&body, category, Instant::now())
    }
}

/// Parse a catalog response body for `category`.
///
/// Entries belonging to the other category are dropped. A missing or null
/// `data` field is an empty-body failure; an empty array is a valid, empty
/// catalog.
pub fn parse_catalog(
    body: &str,
    category: Category,
    fetched_at: Instant,
) -> Result<CatalogSnapshot, CatalogError> {
    if body.trim().is_empty() {
        return Err(CatalogError::Empty);
    }

    let resp: CatalogResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Malformed(e.to_string()))?;
    let entries = resp.data.ok_or(CatalogError::Empty)?;

    if let Some(msg) = resp.msg.as_deref() {
        debug!("[catalog] server msg={msg:?} time={} entries={}", resp.time, entries.len());
    }

    let instruments = entries
        .into_iter()
        .filter(|e| Category::from_is_future(e.is_future) == category)
        .map(|e| {
            let price = parse_str_f64(e.price.as_ref()).unwrap_or(0.0);
            Instrument::new(e.symbol, category, price)
        })
        .collect();

    Ok(CatalogSnapshot::new(instruments, resp.time, fetched_at))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn parses_entries_for_requested_category() {
        let body = r#"{
            "msg": "success",
            "time": 1700000000000,
            "data": [
                {"symbol": "BTC-USD", "isFuture": false, "price": 50000},
                {"symbol": "ETH-USD", "isFuture": false},
                {"symbol": "ETH-PERP", "isFuture": true, "price": "4000"}
            ]
        }"#;
        let now = Instant::now();
        let spot = parse_catalog(body, Category::Spot, now).unwrap();
        assert_eq!(spot.server_timestamp, 1700000000000);
        assert_eq!(
            spot.instruments,
            vec![
                Instrument::new("BTC-USD", Category::Spot, 50000.0),
                Instrument::new("ETH-USD", Category::Spot, 0.0),
            ]
        );

        let future = parse_catalog(body, Category::Future, now).unwrap();
        assert_eq!(
            future.instruments,
            vec![Instrument::new("ETH-PERP", Category::Future, 4000.0)]
        );
    }

    #[test]
    fn duplicate_entries_collapse() {
        let body = r#"{"time": 1, "data": [
            {"symbol": "BTC-USD", "isFuture": false},
            {"symbol": "BTC-USD", "isFuture": false}
        ]}"#;
        let snap = parse_catalog(body, Category::Spot, Instant::now()).unwrap();
        assert_eq!(snap.instruments.len(), 1);
    }

    #[test]
    fn empty_array_is_valid() {
        let body = r#"{"msg": "ok", "time": 5, "data": []}"#;
        let snap = parse_catalog(body, Category::Spot, Instant::now()).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn failures() {
        let now = Instant::now();
        assert_eq!(parse_catalog("", Category::Spot, now), Err(CatalogError::Empty));
        assert_eq!(parse_catalog("  \n", Category::Spot, now), Err(CatalogError::Empty));
        assert_eq!(
            parse_catalog(r#"{"msg": "x", "time": 1}"#, Category::Spot, now),
            Err(CatalogError::Empty)
        );
        assert_eq!(
            parse_catalog(r#"{"data": null}"#, Category::Spot, now),
            Err(CatalogError::Empty)
        );
        assert!(matches!(
            parse_catalog("<html>", Category::Spot, now),
            Err(CatalogError::Malformed(_))
        ));
        assert!(matches!(
            parse_catalog(r#"{"data": [{"symbol": 1}]}"#, Category::Spot, now),
            Err(CatalogError::Malformed(_))
        ));
    }

    /// Serve one canned HTTP response and hand back the request head.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "{status_line}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            head
        });
        (format!("http://{addr}/v1/instruments"), task)
    }

    fn config_for(endpoint: String) -> CatalogConfig {
        CatalogConfig {
            endpoint,
            request_timeout_ms: 2000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn http_fetch_sends_category_flag() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"msg":"ok","time":42,"data":[{"symbol":"ETH-PERP","isFuture":true}]}"#,
        )
        .await;
        let fetcher = HttpCatalogFetcher::new(&config_for(url)).unwrap();

        let snap = fetcher.fetch(Category::Future).await.unwrap();
        assert_eq!(snap.server_timestamp, 42);
        assert_eq!(snap.instruments, vec![Instrument::new("ETH-PERP", Category::Future, 0.0)]);

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /v1/instruments?future=true "), "{head}");
    }

    #[tokio::test]
    async fn http_error_status_fails() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let fetcher = HttpCatalogFetcher::new(&config_for(url)).unwrap();

        assert_eq!(fetcher.fetch(Category::Spot).await, Err(CatalogError::Status(503)));
        let head = server.await.unwrap();
        assert!(head.contains("future=false"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = config_for(format!("http://{addr}/v1/instruments"));
        config.request_timeout_ms = 500;
        let fetcher = HttpCatalogFetcher::new(&config).unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(Category::Spot))
            .await
            .unwrap();
        assert!(matches!(err, Err(CatalogError::Network(_))));
    }
}
