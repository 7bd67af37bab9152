//! ERC-4626 `convertToAssets` over raw JSON-RPC

use alloy::primitives::{U256, hex, keccak256};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::settings::RPC_TIMEOUT;

/// Read-only share -> asset conversion on a staking vault
pub trait VaultReader {
    fn convert_to_assets(&self, shares: U256) -> Result<U256>;
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: Vec<serde_json::Value>,
    id: u32,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// First four bytes of keccak256 of the signature, hex without prefix
pub fn function_selector(signature: &str) -> String {
    hex::encode(&keccak256(signature.as_bytes())[..4])
}

/// Calldata for `convertToAssets(uint256)`
pub fn convert_to_assets_calldata(shares: U256) -> String {
    format!(
        "0x{}{}",
        function_selector("convertToAssets(uint256)"),
        hex::encode(shares.to_be_bytes::<32>())
    )
}

/// Parse a single uint256 return value
pub fn parse_uint256(raw: &str) -> Result<U256> {
    let clean = raw.trim().trim_start_matches("0x");
    if clean.is_empty() {
        anyhow::bail!("eth_call returned no data");
    }
    U256::from_str_radix(clean, 16).with_context(|| format!("eth_call returned invalid uint256: {}", raw))
}

pub struct RpcVaultReader {
    client: Client,
    rpc_url: String,
    vault: String,
}

impl RpcVaultReader {
    pub fn new(rpc_url: &str, vault: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            vault: vault.to_string(),
        })
    }

    fn eth_call(&self, data: &str) -> Result<String> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: vec![
                serde_json::json!({
                    "to": self.vault,
                    "data": data
                }),
                serde_json::json!("latest"),
            ],
            id: 1,
        };

        let response: JsonRpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .context("eth_call request failed")?
            .json()
            .context("eth_call response was not JSON-RPC")?;

        if let Some(error) = response.error {
            anyhow::bail!("RPC error: {}", error);
        }

        response.result.context("eth_call response has no result")
    }
}

impl VaultReader for RpcVaultReader {
    fn convert_to_assets(&self, shares: U256) -> Result<U256> {
        let data = convert_to_assets_calldata(shares);
        debug!(vault = %self.vault, shares = %shares, "Calling convertToAssets");
        let raw = self.eth_call(&data)?;
        parse_uint256(&raw)
    }
}
