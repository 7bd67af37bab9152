/// Settings and configuration management
/// Compiled-in constants plus environment loading for the APY poller

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Tagger Constants
// ============================================================================

pub const OUTPUT_FILE_PREFIX: &str = "smartmoney_tagged";

/// Marker prefixed to every error tag; the report paints these cells red
pub const TAG_ERROR_MARKER: &str = "错误：";
/// Summary marker for wallets whose profit overflowed the error ceiling
pub const PROFIT_INVALID_MARKER: &str = "盈利金额错误!";

pub const REPORT_FONT_NAME: &str = "Microsoft YaHei";
pub const REPORT_FONT_SIZE: f64 = 11.0;
pub const REPORT_ZOOM: u16 = 120;

/// Timestamped output name, e.g. smartmoney_tagged_20250224_201228.xlsx
pub fn default_output_file_name(now: chrono::NaiveDateTime) -> String {
    format!("{}_{}.xlsx", OUTPUT_FILE_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

// ============================================================================
// Poller Constants
// ============================================================================

pub const COW_QUOTE_URL: &str = "https://api.cow.fi/mainnet/api/v1/quote";
pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

pub const SUSDE_ADDRESS: &str = "0x9D39A5DE30e57443BfF2A8307A4256c8797A3497";
pub const USDE_ADDRESS: &str = "0x4c9edd5852cd905f086c759e8383e09bff1e68b3";

/// Cooldown between unstake request and withdrawal
pub const UNLOCK_DAYS: f64 = 7.0;
pub const DAYS_PER_YEAR: f64 = 365.0;

pub const DEFAULT_APY_THRESHOLD: f64 = 0.30;
pub const DEFAULT_INITIAL_AMOUNT: u64 = 1_000_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(180);
pub const DEFAULT_BASE_ASSETS: &str = "USDT";
pub const DEFAULT_ALERT_FROM: &str = "no-reply@yourdomain.com";
pub const DEFAULT_HISTORY_FILE: &str = "apy_history.xlsx";
pub const DEFAULT_ALERT_STATE_FILE: &str = "apy_alert_state.json";

pub const QUOTE_TIMEOUT: Duration = Duration::from_secs(15);
pub const RPC_TIMEOUT: Duration = Duration::from_secs(15);
pub const ALERT_TIMEOUT: Duration = Duration::from_secs(15);

/// ERC-20 token known to the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: &'static str,
    pub address: &'static str,
    pub decimals: u8,
}

pub const TOKENS: [Token; 5] = [
    Token { symbol: "USDT", address: "0xdac17f958d2ee523a2206206994597c13d831ec7", decimals: 6 },
    Token { symbol: "USDC", address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", decimals: 6 },
    Token { symbol: "DAI", address: "0x6b175474e89094c44da98b954eedeac495271d0f", decimals: 18 },
    Token { symbol: "sUSDe", address: SUSDE_ADDRESS, decimals: 18 },
    Token { symbol: "USDe", address: USDE_ADDRESS, decimals: 18 },
];

pub fn token_by_symbol(symbol: &str) -> Option<Token> {
    TOKENS.iter().copied().find(|t| t.symbol.eq_ignore_ascii_case(symbol.trim()))
}

pub fn token_by_address(address: &str) -> Option<Token> {
    TOKENS.iter().copied().find(|t| t.address.eq_ignore_ascii_case(address.trim()))
}

/// Display name for a token address: its symbol, or a shortened address
pub fn token_name(address: &str) -> String {
    if let Some(token) = token_by_address(address) {
        return token.symbol.to_string();
    }
    let chars: Vec<char> = address.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        address.to_string()
    }
}

pub fn susde() -> Token {
    TOKENS[3]
}

pub fn usde() -> Token {
    TOKENS[4]
}

// ============================================================================
// Price Display Constants
// ============================================================================

pub const TOKEN_LIST_URL: &str = "https://api-ffpscan.permaswap.network/tokenList";
pub const DEFAULT_PRICE_SYMBOL: &str = "AO";
pub const WINDOW_TITLE: &str = "AO Price Monitor";

// ============================================================================
// Poller Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub rpc_url: String,
    pub from_address: String,
    pub receiver_address: String,
    /// Resend API keys, tried in order until one succeeds
    pub resend_api_keys: Vec<String>,
    pub alert_to: Option<String>,
    pub alert_from: String,
    pub apy_threshold: f64,
    /// Base-asset amount (whole units) pushed through the stake/unstake round trip
    pub initial_amount: u64,
    pub poll_interval: Duration,
    pub base_assets: Vec<Token>,
    pub history_file: PathBuf,
    pub alert_state_file: PathBuf,
}

impl PollerConfig {
    /// Load configuration from environment (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("ETH_RPC_URL")
            .context("ETH_RPC_URL env var is required. Add it to your .env file.\n\
                     Example: ETH_RPC_URL=https://ethereum.blockpi.network/v1/rpc/<key>")?;
        let rpc_url = rpc_url.trim().to_string();
        if rpc_url.is_empty() {
            anyhow::bail!("ETH_RPC_URL is set but empty");
        }

        let from_address = env::var("QUOTE_FROM_ADDRESS")
            .context("QUOTE_FROM_ADDRESS env var is required (the address quotes are priced for)")?;
        let from_address = validate_eth_address(&from_address)
            .map_err(|e| anyhow::anyhow!("QUOTE_FROM_ADDRESS: {}", e))?;

        let receiver_address = match env::var("QUOTE_RECEIVER_ADDRESS") {
            Ok(addr) => validate_eth_address(&addr)
                .map_err(|e| anyhow::anyhow!("QUOTE_RECEIVER_ADDRESS: {}", e))?,
            Err(_) => from_address.clone(),
        };

        let resend_api_keys = env::var("RESEND_API_KEYS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        let alert_to = env::var("ALERT_TO_EMAIL").ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let base_assets = parse_base_assets(
            &env::var("BASE_ASSETS").unwrap_or_else(|_| DEFAULT_BASE_ASSETS.to_string()),
        )?;

        let apy_threshold = env_parse("APY_THRESHOLD", DEFAULT_APY_THRESHOLD);
        let initial_amount = env_parse("INITIAL_AMOUNT", DEFAULT_INITIAL_AMOUNT);
        if initial_amount == 0 {
            anyhow::bail!("INITIAL_AMOUNT must be greater than zero");
        }

        Ok(Self {
            rpc_url,
            from_address,
            receiver_address,
            resend_api_keys,
            alert_to,
            alert_from: env::var("ALERT_FROM_EMAIL").unwrap_or_else(|_| DEFAULT_ALERT_FROM.to_string()),
            apy_threshold,
            initial_amount,
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL.as_secs()).max(1)),
            base_assets,
            history_file: PathBuf::from(env::var("APY_HISTORY_FILE").unwrap_or_else(|_| DEFAULT_HISTORY_FILE.to_string())),
            alert_state_file: PathBuf::from(env::var("APY_ALERT_STATE_FILE").unwrap_or_else(|_| DEFAULT_ALERT_STATE_FILE.to_string())),
        })
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alert_to.is_some() && !self.resend_api_keys.is_empty()
    }
}

/// Parse a comma separated symbol list into known base tokens
pub fn parse_base_assets(raw: &str) -> Result<Vec<Token>> {
    let mut assets = Vec::new();
    for symbol in split_list(raw) {
        let token = token_by_symbol(&symbol)
            .with_context(|| format!("Unknown base asset '{}' (known: USDT, USDC, DAI)", symbol))?;
        if token == susde() || token == usde() {
            anyhow::bail!("{} cannot be used as a base asset", token.symbol);
        }
        if !assets.contains(&token) {
            assets.push(token);
        }
    }
    if assets.is_empty() {
        anyhow::bail!("BASE_ASSETS must name at least one asset");
    }
    Ok(assets)
}

/// Validate a 0x-prefixed 20-byte address, returning it trimmed
pub fn validate_eth_address(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    let hex = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
    if hex.len() != 40 {
        return Err(format!("address must be 40 hex characters (found {})", hex.len()));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("address contains non-hexadecimal characters".to_string());
    }
    Ok(format!("0x{}", hex))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
