//! REST API for balances, prices and transfers
//!
//! Endpoints, all under /api/v1/crypto:
//! - GET /ping - Liveness (no gateway secret required)
//! - GET /tokens - Supported chains and priced tokens (no gateway secret required)
//! - GET /token_info?token=&chain= - Token metadata from CoinGecko (no gateway secret required)
//! - GET /price?token= - Price in the configured fiat
//! - GET /balance?chain=&wallet=&rpc_url=&token_address= - Wallet balance
//! - GET /validate?chain=&wallet= - Address grammar check
//! - POST /send/native, POST /send/token - Submit a transfer
//! - GET /estimate-gas?chain=&destination_wallet=&amount=&rpc_url= - Expected network fee
//! - GET /tx_status?chain=&tx_hash=&rpc_url= - Poll a transaction to a terminal status
//! - GET /history?chain=&wallet=&limit= - Ledger entries for a wallet

use crate::chain::{Asset, ChainId};
use crate::db::TransferRecord;
use crate::dispatcher::{
    Dispatcher, FeeReport, FeeRequest, TransferAmount, TransferRequest, TransferResult,
    TxStatusReport,
};
use crate::explorer::explorer_url;
use crate::prices::{TokenDirectory, TokenMetadata};
use crate::validator;
use crate::wallets::{SigningSecret, WalletError};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

const API_PREFIX: &str = "/api/v1/crypto";
const PROXY_SECRET_HEADER: &str = "X-RapidAPI-Proxy-Secret";
const MAX_HISTORY: u32 = 500;
/// Reachable without the gateway secret
const PUBLIC_ENDPOINTS: [&str; 3] = ["/ping", "/tokens", "/token_info"];

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub tokens: Arc<dyn TokenDirectory>,
    pub proxy_secret: String,
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    let proxy_secret = state.proxy_secret.clone();

    let crypto = Router::new()
        .route("/ping", get(ping))
        .route("/tokens", get(supported_tokens))
        .route("/token_info", get(get_token_info))
        .route("/estimate-gas", get(estimate_gas))
        .route("/price", get(get_price))
        .route("/balance", get(get_balance))
        .route("/validate", get(validate_address))
        .route("/send/native", post(send_native))
        .route("/send/token", post(send_token))
        .route("/tx_status", get(get_tx_status))
        .route("/history", get(get_history));

    Router::new()
        .nest(API_PREFIX, crypto)
        .layer(middleware::from_fn(move |req: Request<Body>, next: Next| {
            let secret = proxy_secret.clone();
            async move { require_proxy_secret(secret, req, next).await }
        }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Gateway guard middleware
async fn require_proxy_secret(secret: String, request: Request<Body>, next: Next) -> Response {
    if secret.is_empty() {
        return next.run(request).await;
    }

    let path = request.uri().path();
    let public = PUBLIC_ENDPOINTS
        .iter()
        .any(|endpoint| path.strip_prefix(API_PREFIX) == Some(*endpoint));
    if public {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(PROXY_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented == Some(secret.as_str()) {
        return next.run(request).await;
    }

    warn!(path = %path, "Request without valid gateway secret");
    ApiError::new(StatusCode::FORBIDDEN, "Forbidden: invalid proxy secret").into_response()
}

/// Error body: `{ "status": "error", "detail": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        let status = match &e {
            WalletError::Validation(_)
            | WalletError::SelfTransfer(_)
            | WalletError::Unsupported(_) => StatusCode::BAD_REQUEST,
            WalletError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::Connectivity(_) => StatusCode::BAD_GATEWAY,
            WalletError::Rpc(_)
            | WalletError::OutOfRange(_)
            | WalletError::RateLimited
            | WalletError::TransactionFailed(_)
            | WalletError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, detail = %self.detail, "Request failed");
        } else {
            warn!(status = %self.status, detail = %self.detail, "Request refused");
        }
        let body = json!({ "status": "error", "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_chain(chain: &str) -> Result<ChainId, ApiError> {
    chain
        .parse::<ChainId>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Liveness endpoint
async fn ping() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "multichain-payments"
    }))
}

#[derive(Serialize)]
struct ChainInfo {
    chain: ChainId,
    family: String,
    native_symbol: &'static str,
}

#[derive(Serialize)]
struct TokensResponse {
    status: &'static str,
    chains: Vec<ChainInfo>,
    /// Symbols with a price source
    tokens: Vec<String>,
}

async fn supported_tokens(State(state): State<Arc<ApiState>>) -> Json<TokensResponse> {
    let chains = ChainId::ALL
        .into_iter()
        .map(|chain| ChainInfo {
            chain,
            family: chain.family().to_string(),
            native_symbol: chain.native_symbol(),
        })
        .collect();

    Json(TokensResponse {
        status: "success",
        chains,
        tokens: state
            .dispatcher
            .prices()
            .symbols()
            .iter()
            .map(|s| s.to_uppercase())
            .collect(),
    })
}

#[derive(Deserialize)]
struct PriceQuery {
    token: String,
}

async fn get_price(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let prices = state.dispatcher.prices();
    let lookup = prices.lookup(&query.token).await;

    if lookup.price.is_zero() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Price for {} is unavailable", query.token.to_uppercase()),
        ));
    }

    Ok(Json(json!({
        "status": "success",
        "token": query.token.to_uppercase(),
        "fiat": prices.fiat(),
        "price": lookup.price,
        "source": lookup.origin,
        "fetched_at": lookup.fetched_at,
    })))
}

#[derive(Deserialize)]
struct TokenInfoQuery {
    token: String,
    /// Platform the contract details are read for; Ethereum when absent
    #[serde(default)]
    chain: Option<String>,
}

#[derive(Serialize)]
struct TokenInfoResponse {
    status: &'static str,
    token: String,
    metadata: TokenMetadata,
}

async fn get_token_info(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TokenInfoQuery>,
) -> ApiResult<TokenInfoResponse> {
    let token = query.token.trim().to_lowercase();
    if token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    let chain = match query.chain.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(chain) => Some(parse_chain(chain)?),
        None => None,
    };

    let metadata = state.tokens.token_info(&token, chain).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Token {} is not listed on CoinGecko", token),
        )
    })?;

    Ok(Json(TokenInfoResponse {
        status: "success",
        token,
        metadata,
    }))
}

#[derive(Deserialize)]
struct BalanceQuery {
    chain: String,
    wallet: String,
    rpc_url: String,
    #[serde(default)]
    token_address: Option<String>,
}

#[derive(Serialize)]
struct BalanceResponse {
    status: &'static str,
    chain: ChainId,
    wallet: String,
    token_address: Option<String>,
    balance: Decimal,
    /// False when the node could not be reached and the balance reads as 0
    known: bool,
}

async fn get_balance(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<BalanceResponse> {
    let chain = parse_chain(&query.chain)?;
    let reading = state
        .dispatcher
        .check_balance(chain, &query.wallet, &query.rpc_url, query.token_address.as_deref())
        .await?;

    Ok(Json(BalanceResponse {
        status: "success",
        chain,
        wallet: query.wallet,
        token_address: query.token_address,
        balance: reading.or_zero(),
        known: reading.is_known(),
    }))
}

#[derive(Deserialize)]
struct ValidateQuery {
    chain: String,
    wallet: String,
}

async fn validate_address(Query(query): Query<ValidateQuery>) -> impl IntoResponse {
    let (valid, chain) = validator::validate(&query.chain, &query.wallet);
    Json(json!({
        "status": "success",
        "wallet": query.wallet,
        "valid": valid,
        "chain": chain,
    }))
}

/// Body of both send endpoints
#[derive(Debug, Deserialize)]
struct SendBody {
    chain: String,
    destination_wallet: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    nominal_fiat: Option<Decimal>,
    /// Price symbol used to size a token transfer from `nominal_fiat`
    #[serde(default)]
    token_symbol: Option<String>,
    #[serde(default)]
    rpc_url: String,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    token_address: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    wait_for_confirmation: Option<bool>,
}

#[derive(Serialize)]
struct SendResponse {
    status: &'static str,
    chain: ChainId,
    #[serde(flatten)]
    result: TransferResult,
}

impl SendBody {
    fn into_request(self, asset: Asset) -> Result<TransferRequest, ApiError> {
        let chain = parse_chain(&self.chain)?;

        let amount = match (self.amount, self.nominal_fiat) {
            (Some(amount), None) => TransferAmount::Units(amount),
            (None, Some(nominal)) => TransferAmount::Fiat {
                nominal,
                symbol: self.token_symbol,
            },
            _ => {
                return Err(ApiError::bad_request(
                    "Provide exactly one of amount or nominal_fiat",
                ))
            }
        };

        Ok(TransferRequest {
            chain,
            asset,
            destination: self.destination_wallet,
            amount,
            rpc_url: self.rpc_url,
            signing_key: self
                .private_key
                .filter(|key| !key.trim().is_empty())
                .map(SigningSecret::new),
            evm_chain_id: self.chain_id,
            wait_for_confirmation: self.wait_for_confirmation,
        })
    }
}

async fn send_native(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> ApiResult<SendResponse> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = body.into_request(Asset::Native)?;
    dispatch(&state, request).await
}

async fn send_token(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> ApiResult<SendResponse> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let token = body
        .token_address
        .clone()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("token_address is required"))?;
    let request = body.into_request(Asset::Token { address: token })?;
    dispatch(&state, request).await
}

async fn dispatch(state: &ApiState, request: TransferRequest) -> ApiResult<SendResponse> {
    let chain = request.chain;
    let result = state.dispatcher.transfer(&request).await?;
    Ok(Json(SendResponse {
        status: "success",
        chain,
        result,
    }))
}

#[derive(Deserialize)]
struct EstimateQuery {
    chain: String,
    destination_wallet: String,
    amount: Decimal,
    #[serde(default)]
    rpc_url: String,
    #[serde(default)]
    token_address: Option<String>,
    #[serde(default)]
    sender_wallet: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
}

#[derive(Serialize)]
struct EstimateResponse {
    status: &'static str,
    #[serde(flatten)]
    report: FeeReport,
}

async fn estimate_gas(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<EstimateQuery>,
) -> ApiResult<EstimateResponse> {
    let asset = match query.token_address.map(|t| t.trim().to_string()) {
        Some(address) if !address.is_empty() => Asset::Token { address },
        _ => Asset::Native,
    };
    let request = FeeRequest {
        chain: parse_chain(&query.chain)?,
        asset,
        destination: query.destination_wallet,
        amount: query.amount,
        rpc_url: query.rpc_url,
        sender: query.sender_wallet,
        evm_chain_id: query.chain_id,
    };

    let report = state.dispatcher.estimate_fee(&request).await?;
    Ok(Json(EstimateResponse {
        status: "success",
        report,
    }))
}

#[derive(Deserialize)]
struct TxStatusQuery {
    chain: String,
    tx_hash: String,
    #[serde(default)]
    rpc_url: Option<String>,
}

async fn get_tx_status(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TxStatusQuery>,
) -> ApiResult<TxStatusReport> {
    let chain = parse_chain(&query.chain)?;
    let report = state
        .dispatcher
        .get_tx_status(chain, &query.tx_hash, query.rpc_url.as_deref())
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct HistoryQuery {
    chain: String,
    wallet: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Serialize)]
struct HistoryResponse {
    status: &'static str,
    chain: ChainId,
    wallet: String,
    history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
struct HistoryEntry {
    #[serde(flatten)]
    record: TransferRecord,
    explorer_url: Option<String>,
}

impl From<TransferRecord> for HistoryEntry {
    fn from(record: TransferRecord) -> Self {
        let url = record
            .tx_handle
            .as_deref()
            .map(|handle| explorer_url(&record.chain, handle, false));
        Self {
            record,
            explorer_url: url,
        }
    }
}

async fn get_history(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let chain = parse_chain(&query.chain)?;
    let ledger = state
        .dispatcher
        .ledger()
        .ok_or_else(|| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Ledger not configured"))?;

    let history = ledger
        .get_history(chain, query.wallet.trim(), query.limit.min(MAX_HISTORY))
        .await?;

    Ok(Json(HistoryResponse {
        status: "success",
        chain,
        wallet: query.wallet,
        history: history.into_iter().map(HistoryEntry::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::prices::{PriceCache, PriceSettings, QuoteSource};
    use crate::test_support::MockNode;
    use crate::wallets::rpc::RpcClient;
    use crate::wallets::tron::{TronAdapter, TronSettings};
    use crate::workers::BlockingPool;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::time::Duration;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const DEST: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    struct OneQuote;

    #[async_trait]
    impl QuoteSource for OneQuote {
        async fn fetch(&self, _: &[String]) -> anyhow::Result<HashMap<String, Decimal>> {
            Ok([("sol".to_string(), Decimal::from(2_500_000))].into_iter().collect())
        }
    }

    struct OneToken;

    #[async_trait]
    impl TokenDirectory for OneToken {
        async fn token_info(
            &self,
            token: &str,
            chain: Option<ChainId>,
        ) -> anyhow::Result<Option<TokenMetadata>> {
            if token != "usdt" {
                return Ok(None);
            }
            let contract = match chain {
                Some(ChainId::Tron) => "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
                _ => "0xdac17f958d2ee523a2206206994597c13d831ec7",
            };
            Ok(Some(TokenMetadata {
                name: Some("Tether".to_string()),
                symbol: Some("USDT".to_string()),
                decimals: Some(6),
                contract_address: Some(contract.to_string()),
                coingecko_id: "tether".to_string(),
            }))
        }
    }

    struct TestServer {
        base: String,
        client: reqwest::Client,
        _dir: tempfile::TempDir,
        task: tokio::task::JoinHandle<()>,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    impl TestServer {
        async fn start(proxy_secret: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let prices = Arc::new(PriceCache::new(
                Arc::new(OneQuote),
                PriceSettings {
                    fiat: "idr".to_string(),
                    ttl: Duration::from_secs(15),
                    max_attempts: 1,
                    retry_delay: Duration::from_millis(1),
                    cache_path: dir.path().join("prices.json"),
                    symbols: vec!["sol".into(), "eth".into()],
                },
            ));
            let ledger = Database::new(&dir.path().join("ledger.db")).await.unwrap();
            let tron = Arc::new(TronAdapter::new(
                RpcClient::new(Duration::from_secs(5)).unwrap(),
                BlockingPool::new(2),
                TronSettings::default(),
            ));
            let dispatcher = Dispatcher::new(prices, "http://127.0.0.1:1")
                .with_adapter(tron)
                .with_ledger(ledger);

            let app = create_router(ApiState {
                dispatcher: Arc::new(dispatcher),
                tokens: Arc::new(OneToken),
                proxy_secret: proxy_secret.to_string(),
            });
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let task = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                base: format!("http://{}{}", addr, API_PREFIX),
                client: reqwest::Client::new(),
                _dir: dir,
                task,
            }
        }

        async fn get(&self, path: &str, secret: Option<&str>) -> (u16, Value) {
            let mut request = self.client.get(format!("{}{}", self.base, path));
            if let Some(secret) = secret {
                request = request.header(PROXY_SECRET_HEADER, secret);
            }
            let response = request.send().await.unwrap();
            let status = response.status().as_u16();
            (status, response.json().await.unwrap())
        }

        async fn post(&self, path: &str, body: Value) -> (u16, Value) {
            let response = self
                .client
                .post(format!("{}{}", self.base, path))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = response.status().as_u16();
            (status, response.json().await.unwrap())
        }
    }

    #[tokio::test]
    async fn gateway_secret_guards_everything_but_public_endpoints() {
        let server = TestServer::start("gateway").await;

        assert_eq!(server.get("/ping", None).await.0, 200);
        let (status, tokens) = server.get("/tokens", None).await;
        assert_eq!(status, 200);
        assert_eq!(tokens["chains"].as_array().unwrap().len(), 6);
        assert_eq!(server.get("/token_info?token=usdt", None).await.0, 200);

        let (status, _) = server
            .get(&format!("/estimate-gas?chain=trx&destination_wallet={}&amount=1", DEST), None)
            .await;
        assert_eq!(status, 403);

        let (status, body) = server.get("/validate?chain=trx&wallet=x", None).await;
        assert_eq!(status, 403);
        assert_eq!(body["status"], "error");

        let (status, _) = server.get("/validate?chain=trx&wallet=x", Some("wrong")).await;
        assert_eq!(status, 403);

        let (status, body) = server
            .get(&format!("/validate?chain=trx&wallet={}", DEST), Some("gateway"))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["valid"], true);
        assert_eq!(body["chain"], "tron");
    }

    #[tokio::test]
    async fn price_reports_source_and_missing_quotes() {
        let server = TestServer::start("").await;

        let (status, body) = server.get("/price?token=sol", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["source"], "live");
        assert_eq!(body["fiat"], "idr");
        let price = Decimal::from_str(body["price"].as_str().unwrap()).unwrap();
        assert_eq!(price, Decimal::from(2_500_000));

        let (status, body) = server.get("/price?token=eth", None).await;
        assert_eq!(status, 404);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn send_errors_map_to_status_codes() {
        let server = TestServer::start("").await;

        // bad destination
        let (status, body) = server
            .post(
                "/send/native",
                json!({"chain": "trx", "destination_wallet": "nope", "amount": "1",
                       "rpc_url": "http://127.0.0.1:1", "private_key": KEY}),
            )
            .await;
        assert_eq!(status, 400);
        assert!(body["detail"].as_str().unwrap().contains("destination"));

        // token endpoint without a token address
        let (status, _) = server
            .post(
                "/send/token",
                json!({"chain": "trx", "destination_wallet": DEST, "amount": "1"}),
            )
            .await;
        assert_eq!(status, 400);

        // both sizing modes at once
        let (status, _) = server
            .post(
                "/send/native",
                json!({"chain": "trx", "destination_wallet": DEST, "amount": "1",
                       "nominal_fiat": "10000"}),
            )
            .await;
        assert_eq!(status, 400);
    }

    #[test]
    fn wallet_errors_map_to_status_codes() {
        let cases = [
            (WalletError::SelfTransfer("T".into()), StatusCode::BAD_REQUEST),
            (WalletError::Unsupported("ton".into()), StatusCode::BAD_REQUEST),
            (
                WalletError::InsufficientBalance {
                    have: Decimal::ZERO,
                    need: Decimal::ONE,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (WalletError::Connectivity("refused".into()), StatusCode::BAD_GATEWAY),
            (WalletError::TransactionFailed("reverted".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (WalletError::OutOfRange("balance".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[tokio::test]
    async fn insufficient_balance_is_422_and_lands_in_history() {
        let node = MockNode::start(|path, _| match path {
            "/wallet/getaccount" => json!({"balance": 5_000_000u64}),
            _ => json!({}),
        })
        .await;
        let server = TestServer::start("").await;

        let (status, body) = server
            .post(
                "/send/native",
                json!({"chain": "trx", "destination_wallet": DEST, "amount": 10,
                       "rpc_url": node.url(), "private_key": KEY}),
            )
            .await;
        assert_eq!(status, 422);
        assert!(body["detail"].as_str().unwrap().contains("Insufficient"));

        let (status, body) = server.get(&format!("/history?chain=trx&wallet={}", DEST), None).await;
        assert_eq!(status, 200);
        assert_eq!(body["history"][0]["status"], "rejected");
        assert!(body["history"][0]["explorer_url"].is_null());

        let (status, body) = server
            .get(&format!("/balance?chain=trx&wallet={}&rpc_url={}", DEST, node.url()), None)
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["known"], true);
        assert_eq!(Decimal::from_str(body["balance"].as_str().unwrap()).unwrap(), Decimal::from(5));
    }

    #[tokio::test]
    async fn token_info_returns_metadata_or_404() {
        let server = TestServer::start("").await;

        let (status, body) = server.get("/token_info?token=USDT&chain=trx", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["token"], "usdt");
        assert_eq!(body["metadata"]["symbol"], "USDT");
        assert_eq!(body["metadata"]["decimals"], 6);
        assert_eq!(body["metadata"]["contract_address"], DEST);

        let (status, body) = server.get("/token_info?token=nope", None).await;
        assert_eq!(status, 404);
        assert_eq!(body["status"], "error");

        assert_eq!(server.get("/token_info?token=usdt&chain=ton", None).await.0, 400);
        assert_eq!(server.get("/token_info?token=%20", None).await.0, 400);
    }

    #[tokio::test]
    async fn estimate_gas_reports_native_fee() {
        let node = MockNode::start(|path, _| match path {
            "/wallet/getchainparameters" => json!({"chainParameter": [
                {"key": "getTransactionFee", "value": 1000}
            ]}),
            _ => json!({}),
        })
        .await;
        let server = TestServer::start("").await;

        let (status, body) = server
            .get(
                &format!(
                    "/estimate-gas?chain=trx&destination_wallet={}&amount=1&rpc_url={}",
                    DEST,
                    node.url()
                ),
                None,
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["native_symbol"], "trx");
        assert_eq!(Decimal::from_str(body["fee"].as_str().unwrap()).unwrap(), Decimal::new(268, 3));
        assert_eq!(body["units"], 268);
        assert!(body["fee_fiat"].is_null());

        let (status, _) = server
            .get(
                &format!(
                    "/estimate-gas?chain=trx&destination_wallet={}&amount=0&rpc_url={}",
                    DEST,
                    node.url()
                ),
                None,
            )
            .await;
        assert_eq!(status, 400);
        assert_eq!(node.hits("/wallet/getchainparameters"), 1);
    }
}
