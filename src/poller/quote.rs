//! CoW Swap sell-quote client

use alloy::primitives::{U256, hex, keccak256};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::settings::{COW_QUOTE_URL, QUOTE_TIMEOUT, token_name};

/// App data sent with every quote; its hash must be computed over these exact bytes
pub const APP_DATA: &str = r#"{"version": "0.9.0", "metadata": {}}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub sell_token: String,
    pub buy_token: String,
    /// Raw token units, before fee
    pub sell_amount: U256,
    pub from: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub sell_amount: U256,
    pub buy_amount: U256,
}

/// Anything that can price a sell order
pub trait QuoteSource {
    fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote>;
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    quote: QuoteBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody {
    sell_amount: String,
    buy_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteErrorBody {
    error_type: String,
    description: String,
}

pub fn app_data_hash() -> String {
    hex::encode_prefixed(keccak256(APP_DATA.as_bytes()))
}

/// JSON body for the quote endpoint
pub fn quote_payload(request: &QuoteRequest) -> serde_json::Value {
    serde_json::json!({
        "sellToken": request.sell_token,
        "buyToken": request.buy_token,
        "receiver": request.receiver,
        "appData": APP_DATA,
        "appDataHash": app_data_hash(),
        "sellTokenBalance": "erc20",
        "buyTokenBalance": "erc20",
        "from": request.from,
        "priceQuality": "verified",
        "signingScheme": "eip712",
        "onchainOrder": false,
        "kind": "sell",
        "sellAmountBeforeFee": request.sell_amount.to_string(),
    })
}

/// Human-readable reason for a non-200 quote response
pub fn status_reason(status: u16, body: &str) -> String {
    match status {
        400 => match serde_json::from_str::<QuoteErrorBody>(body) {
            Ok(err) => format!("{} - {}", err.error_type, err.description),
            Err(_) => "bad request".to_string(),
        },
        404 => "no trade route found".to_string(),
        405 => "request method not allowed".to_string(),
        429 => "too many requests, try again later".to_string(),
        500 => "server error".to_string(),
        _ => "unknown error".to_string(),
    }
}

fn parse_amount(raw: &str, field: &str) -> Result<U256> {
    raw.parse::<U256>()
        .with_context(|| format!("Quote {} is not an integer: {}", field, raw))
}

pub struct CowQuoteClient {
    client: Client,
    url: String,
}

impl CowQuoteClient {
    pub fn new() -> Result<Self> {
        Self::with_url(COW_QUOTE_URL)
    }

    /// Custom endpoint (for testing)
    pub fn with_url(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(QUOTE_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url: url.to_string() })
    }
}

impl QuoteSource for CowQuoteClient {
    fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let pair = format!("{} -> {}", token_name(&request.sell_token), token_name(&request.buy_token));
        info!(pair = %pair, amount = %request.sell_amount, "Requesting quote");

        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(&quote_payload(request))
            .send()
            .with_context(|| format!("Quote request failed for {}", pair))?;

        let status = response.status();
        let body = response.text().context("Failed to read quote response body")?;

        if !status.is_success() {
            let reason = status_reason(status.as_u16(), &body);
            warn!(pair = %pair, status = status.as_u16(), reason = %reason, "Quote rejected");
            debug!(body = %body, "Quote error body");
            anyhow::bail!("quote {} failed with status {}: {}", pair, status.as_u16(), reason);
        }

        let parsed: QuoteResponse = serde_json::from_str(&body)
            .with_context(|| format!("Unexpected quote response for {}", pair))?;

        Ok(Quote {
            sell_amount: parse_amount(&parsed.quote.sell_amount, "sellAmount")?,
            buy_amount: parse_amount(&parsed.quote.buy_amount, "buyAmount")?,
        })
    }
}
