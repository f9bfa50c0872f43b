//! HTTP transport shared by the chain adapters
//!
//! JSON-RPC 2.0 for EVM and Solana nodes, plain JSON POST for the Tron
//! HTTP API.

use super::{WalletError, WalletResult};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Node client; the endpoint is chosen per call since callers bring their own
#[derive(Clone)]
pub struct RpcClient {
    client: reqwest::Client,
}

impl RpcClient {
    pub fn new(timeout: Duration) -> WalletResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Make a JSON-RPC call whose result must be present
    pub async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> WalletResult<T> {
        self.call_nullable(url, method, params)
            .await?
            .ok_or_else(|| WalletError::Rpc(format!("No result in {} response", method)))
    }

    /// Make a JSON-RPC call whose result may legitimately be `null`
    pub async fn call_nullable<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> WalletResult<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response)?;

        let rpc_response: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(WalletError::Rpc(format!("{}: {}", error.code, error.message)));
        }

        Ok(rpc_response.result)
    }

    /// POST a JSON body to `{base}/{path}` (Tron HTTP API)
    pub async fn post<T: DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> WalletResult<T> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response)?
            .json()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> WalletError {
    if e.is_connect() || e.is_timeout() {
        WalletError::Connectivity(e.to_string())
    } else {
        WalletError::Rpc(e.to_string())
    }
}

fn check_status(response: reqwest::Response) -> WalletResult<reqwest::Response> {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => Err(WalletError::RateLimited),
        status if !status.is_success() => Err(WalletError::Rpc(format!("HTTP {}", status))),
        _ => Ok(response),
    }
}

// JSON-RPC types

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}
