use crate::auth::sign_request;
use crate::markets::MarketCache;
use async_trait::async_trait;
use chrono::Utc;
use configuration::{AccountConfig, ApiKeys};
use core_types::{Balance, MarketType, Position, Ticker};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

mod auth;
pub mod error;
pub mod markets;
pub mod responses;

// --- Public API ---
pub use error::ApiError;
pub use markets::Market;
pub use responses::{
    AccountAssetResponse, AccountResponse, ApiErrorResponse, ExchangeInfoResponse,
    PortfolioMarginBalanceResponse, PositionResponse, TickerPriceResponse,
};

/// The generic, abstract interface for a read-only exchange account client.
/// This trait is the contract the poller uses, allowing the underlying
/// implementation (live or fake) to be swapped out.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Loads (or refreshes) the market metadata needed to translate between
    /// unified symbols and exchange ids.
    async fn load_markets(&self) -> Result<(), ApiError>;

    /// Fetches the account balance for all assets. (Authenticated)
    async fn fetch_balance(&self) -> Result<Balance, ApiError>;

    /// Fetches every position row the exchange reports, flat ones included. (Authenticated)
    async fn fetch_positions(&self) -> Result<Vec<Position>, ApiError>;

    /// Fetches the last traded price of a unified symbol.
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ApiError>;
}

const FUTURES_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";
const PORTFOLIO_MARGIN_URL: &str = "https://papi.binance.com";

/// Market metadata is refetched at most this often.
const MARKETS_TTL: Duration = Duration::from_secs(60 * 60);
const RECV_WINDOW_MS: u64 = 5000;
/// Error bodies are logged verbatim, but an HTML error page can be huge.
const MAX_ERROR_BODY: usize = 512;

#[derive(Default)]
struct MarketState {
    cache: MarketCache,
    loaded_at: Option<Instant>,
}

/// A concrete implementation of the `ApiClient` for Binance derivatives accounts.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    /// Public market data (exchange info, tickers).
    market_url: String,
    /// Signed account endpoints; differs from `market_url` for portfolio margin.
    account_url: String,
    market_type: MarketType,

    api_secret: String,
    markets: Arc<RwLock<MarketState>>,
}

impl BinanceClient {
    pub fn new(account: &AccountConfig, keys: &ApiKeys) -> Result<Self, ApiError> {
        let market_url = if account.sandbox { FUTURES_TESTNET_URL } else { FUTURES_URL };
        let account_url = match account.market_type {
            MarketType::UsdmFutures => market_url,
            MarketType::PortfolioMargin => PORTFOLIO_MARGIN_URL,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&keys.key)
                .map_err(|_| ApiError::ClientBuild("API key contains invalid header characters".to_string()))?,
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(account.request_timeout_secs));
        if let Some(proxy) = &account.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| ApiError::ClientBuild(format!("invalid proxy '{}': {}", proxy, e)))?,
            );
        }

        Ok(Self {
            client: builder.build()?,
            market_url: market_url.to_string(),
            account_url: account_url.to_string(),
            market_type: account.market_type,

            api_secret: keys.secret.clone(),
            markets: Arc::new(RwLock::new(MarketState::default())),
        })
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.market_url, path);
        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();
        let text = response.text().await?;

        parse_response(status, &text)
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        params.insert("recvWindow", RECV_WINDOW_MS.to_string());
        params.insert("timestamp", Utc::now().timestamp_millis().to_string());

        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::InvalidData(format!("Failed to encode query: {}", e)))?;
        let signature = sign_request(&self.api_secret, &query_string);

        let url = format!(
            "{}{}?{}&signature={}",
            self.account_url, path, query_string, signature
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        parse_response(status, &text)
    }

    /// Loads the market cache on first use so `fetch_ticker` works even when
    /// the caller skipped `load_markets`.
    async fn ensure_markets(&self) -> Result<(), ApiError> {
        if self.markets.read().await.loaded_at.is_none() {
            self.load_markets().await?;
        }
        Ok(())
    }

    /// Refetches market metadata regardless of its age.
    async fn refresh_markets(&self) -> Result<(), ApiError> {
        let info: ExchangeInfoResponse = self.get_public("/fapi/v1/exchangeInfo", &[]).await?;
        let cache = MarketCache::from_exchange_info(info);
        tracing::debug!(markets = cache.len(), "Loaded market metadata.");

        let mut state = self.markets.write().await;
        state.cache = cache;
        state.loaded_at = Some(Instant::now());
        Ok(())
    }
}

/// Turns an HTTP status and body into either the decoded payload or a
/// classified `ApiError`.
pub(crate) fn parse_response<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T, ApiError> {
    if status.is_success() {
        return serde_json::from_str::<T>(text).map_err(|e| ApiError::Deserialization(e.to_string()));
    }

    match serde_json::from_str::<ApiErrorResponse>(text) {
        Ok(api_error) => Err(ApiError::BinanceError {
            code: api_error.code,
            msg: api_error.msg,
        }),
        Err(_) if status.is_server_error() => Err(ApiError::Unavailable {
            status: status.as_u16(),
            body: truncate(text),
        }),
        Err(_) => Err(ApiError::HttpStatus {
            status: status.as_u16(),
            body: truncate(text),
        }),
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl ApiClient for BinanceClient {
    async fn load_markets(&self) -> Result<(), ApiError> {
        let fresh = self
            .markets
            .read()
            .await
            .loaded_at
            .is_some_and(|at| at.elapsed() < MARKETS_TTL);
        if fresh {
            return Ok(());
        }
        self.refresh_markets().await
    }

    async fn fetch_balance(&self) -> Result<Balance, ApiError> {
        let mut params = BTreeMap::new();
        match self.market_type {
            MarketType::UsdmFutures => {
                let raw: AccountResponse = self.get_signed("/fapi/v2/account", &mut params).await?;
                Ok(markets::futures_balance(raw))
            }
            MarketType::PortfolioMargin => {
                let raw: Vec<PortfolioMarginBalanceResponse> =
                    self.get_signed("/papi/v1/balance", &mut params).await?;
                Ok(markets::portfolio_margin_balance(raw))
            }
        }
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, ApiError> {
        self.ensure_markets().await?;
        let path = match self.market_type {
            MarketType::UsdmFutures => "/fapi/v2/positionRisk",
            MarketType::PortfolioMargin => "/papi/v1/um/positionRisk",
        };

        let mut params = BTreeMap::new();
        let raw: Vec<PositionResponse> = self.get_signed(path, &mut params).await?;

        // A market listed after the cache was loaded; one reload before giving up.
        let missing = self
            .markets
            .read()
            .await
            .cache
            .missing_open_market(&raw)
            .map(str::to_string);
        if let Some(id) = missing {
            tracing::info!(market = %id, "Open position on an uncached market, reloading market metadata.");
            self.refresh_markets().await?;
        }
        self.markets.read().await.cache.positions(raw)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ApiError> {
        self.ensure_markets().await?;
        let known = self.markets.read().await.cache.contains_symbol(symbol);
        if !known {
            tracing::info!(symbol, "Unknown symbol, reloading market metadata.");
            self.refresh_markets().await?;
        }
        let id = self.markets.read().await.cache.id_for(symbol)?.to_string();

        let raw: TickerPriceResponse = self
            .get_public("/fapi/v1/ticker/price", &[("symbol", id.as_str())])
            .await?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: raw.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `handler(path)` as a 200 JSON body for every request.
    async fn serve<F>(handler: F) -> String
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 16 * 1024];
                    let mut read = 0;
                    while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => read += n,
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let target = request.split_whitespace().nth(1).unwrap_or("/");
                    let path = target.split('?').next().unwrap_or("/");

                    let body = handler(path);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    /// A client whose every endpoint points at `base`.
    fn local_client(base: &str) -> BinanceClient {
        let mut client = BinanceClient::new(&account("[[accounts]]\nid = \"a\""), &keys()).unwrap();
        client.client = reqwest::Client::builder().no_proxy().build().unwrap();
        client.market_url = base.to_string();
        client.account_url = base.to_string();
        client
    }

    fn exchange_info(ids: &[&str]) -> String {
        let symbols: Vec<String> = ids
            .iter()
            .map(|id| {
                let base = id.trim_end_matches("USDT");
                format!(
                    r#"{{"symbol":"{id}","contractType":"PERPETUAL","deliveryDate":4133404800000,"baseAsset":"{base}","quoteAsset":"USDT","marginAsset":"USDT"}}"#
                )
            })
            .collect();
        format!(r#"{{"symbols":[{}]}}"#, symbols.join(","))
    }

    /// The first exchangeInfo answer predates the NEWUSDT listing.
    fn listing_exchange(info_calls: Arc<AtomicUsize>) -> impl Fn(&str) -> String + Send + Sync + 'static {
        move |path| match path {
            "/fapi/v1/exchangeInfo" => {
                if info_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    exchange_info(&["ETHUSDT"])
                } else {
                    exchange_info(&["ETHUSDT", "NEWUSDT"])
                }
            }
            "/fapi/v2/positionRisk" => r#"[
                {"symbol":"ETHUSDT","positionAmt":"0","entryPrice":"0","unRealizedProfit":"0","positionSide":"BOTH"},
                {"symbol":"NEWUSDT","positionAmt":"-20","entryPrice":"1.5","unRealizedProfit":"2","positionSide":"BOTH"}
            ]"#
            .to_string(),
            "/fapi/v1/ticker/price" => r#"{"symbol":"NEWUSDT","price":"1.4"}"#.to_string(),
            "/fapi/v2/account" => r#"{"assets":[{"asset":"USDT","walletBalance":"1000","unrealizedProfit":"50","marginBalance":"1050","crossUnPnl":"0","availableBalance":"800"}]}"#.to_string(),
            _ => r#"{"code":-1,"msg":"not stubbed"}"#.to_string(),
        }
    }

    fn account(toml: &str) -> AccountConfig {
        configuration::load_config_from_str(toml).unwrap().accounts.remove(0)
    }

    fn keys() -> ApiKeys {
        ApiKeys {
            key: "key".to_string(),
            secret: "secret".to_string(),
        }
    }

    #[test]
    fn success_body_is_decoded() {
        let ticker: TickerPriceResponse =
            parse_response(StatusCode::OK, r#"{"symbol":"ETHUSDT","price":"3050.00","time":1}"#).unwrap();
        assert_eq!(ticker.price, dec!(3050));
    }

    #[test]
    fn error_payload_becomes_binance_error() {
        let err = parse_response::<TickerPriceResponse>(
            StatusCode::BAD_REQUEST,
            r#"{"code":-1121,"msg":"Invalid symbol."}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BinanceError { code: -1121, ref msg } if msg == "Invalid symbol."));
        assert!(err.is_exchange());
    }

    #[test]
    fn rate_limit_payload_is_exchange_class() {
        let err = parse_response::<TickerPriceResponse>(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"code":-1003,"msg":"Too many requests."}"#,
        )
        .unwrap_err();
        assert!(err.is_exchange());
    }

    #[test]
    fn bare_server_error_is_network_class() {
        let err = parse_response::<TickerPriceResponse>(StatusCode::BAD_GATEWAY, "<html>502</html>").unwrap_err();
        assert!(matches!(err, ApiError::Unavailable { status: 502, .. }));
        assert!(err.is_network());
    }

    #[test]
    fn bare_client_error_is_exchange_class() {
        let err = parse_response::<TickerPriceResponse>(StatusCode::FORBIDDEN, "blocked").unwrap_err();
        assert!(matches!(err, ApiError::HttpStatus { status: 403, .. }));
    }

    #[test]
    fn malformed_success_body_is_deserialization_error() {
        let err = parse_response::<TickerPriceResponse>(StatusCode::OK, r#"{"symbol":"ETHUSDT"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
        assert!(!err.is_network() && !err.is_exchange());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY * 2);
        let err = parse_response::<TickerPriceResponse>(StatusCode::SERVICE_UNAVAILABLE, &body).unwrap_err();
        let ApiError::Unavailable { body, .. } = err else { panic!("unexpected {err:?}") };
        assert_eq!(body.len(), MAX_ERROR_BODY + 3);
    }

    #[test]
    fn endpoints_follow_market_type() {
        let futures = BinanceClient::new(&account("[[accounts]]\nid = \"a\""), &keys()).unwrap();
        assert_eq!(futures.account_url, FUTURES_URL);
        assert_eq!(futures.market_url, FUTURES_URL);

        let pm = BinanceClient::new(
            &account("[[accounts]]\nid = \"a\"\nmarket_type = \"portfolio_margin\""),
            &keys(),
        )
        .unwrap();
        assert_eq!(pm.account_url, PORTFOLIO_MARGIN_URL);
        assert_eq!(pm.market_url, FUTURES_URL);

        let sandbox = BinanceClient::new(&account("[[accounts]]\nid = \"a\"\nsandbox = true"), &keys()).unwrap();
        assert_eq!(sandbox.account_url, FUTURES_TESTNET_URL);
    }

    #[test]
    fn invalid_proxy_is_rejected_at_construction() {
        let result = BinanceClient::new(
            &account("[[accounts]]\nid = \"a\"\nproxy = \"http://[::1\""),
            &keys(),
        );
        assert!(matches!(result, Err(ApiError::ClientBuild(_))));
    }

    #[tokio::test]
    async fn positions_on_newly_listed_markets_trigger_one_reload() {
        let info_calls = Arc::new(AtomicUsize::new(0));
        let client = local_client(&serve(listing_exchange(info_calls.clone())).await);

        client.load_markets().await.unwrap();
        let positions = client.fetch_positions().await.unwrap();

        assert_eq!(info_calls.load(Ordering::SeqCst), 2);
        let open: Vec<_> = positions.iter().filter(|p| p.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "NEW/USDT:USDT");
        assert_eq!(open[0].signed_contracts(), dec!(-20));

        // The refreshed cache now covers it.
        client.fetch_positions().await.unwrap();
        assert_eq!(info_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ticker_for_uncached_symbol_reloads_markets() {
        let info_calls = Arc::new(AtomicUsize::new(0));
        let client = local_client(&serve(listing_exchange(info_calls.clone())).await);

        client.load_markets().await.unwrap();
        let ticker = client.fetch_ticker("NEW/USDT:USDT").await.unwrap();

        assert_eq!(ticker.last, dec!(1.4));
        assert_eq!(info_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn futures_equity_is_the_margin_balance() {
        let info_calls = Arc::new(AtomicUsize::new(0));
        let client = local_client(&serve(listing_exchange(info_calls)).await);

        let balance = client.fetch_balance().await.unwrap();
        assert_eq!(balance.get("USDT").unwrap().total, dec!(1050));
    }
}
