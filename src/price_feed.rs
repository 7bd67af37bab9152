/// Token price lookup for the price display window
///
/// Fetches the token list, scans it for one symbol and reports the outcome as
/// a label text plus colored log lines. Nothing here depends on the GUI; the
/// `price_display` binary only renders [`LogPane`] and [`PriceOutcome`].

use std::collections::VecDeque;

use chrono::Local;
use reqwest::blocking::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is not a token list")]
    NotAList,

    #[error("symbol {symbol} not found; available: {}", available.join(", "))]
    MissingSymbol { symbol: String, available: Vec<String> },

    #[error("no price for {symbol}")]
    MissingPrice { symbol: String },

    #[error("price for {symbol} is not a number: {raw}")]
    BadPrice { symbol: String, raw: String },
}

fn price_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Linear scan of a token-list body for `symbol`
pub fn lookup_price(body: &str, symbol: &str) -> Result<f64, PriceError> {
    let data: Value = serde_json::from_str(body)?;
    let items = data.as_array().ok_or(PriceError::NotAList)?;
    debug!(tokens = items.len(), "Token list decoded");

    let Some(item) = items
        .iter()
        .find(|item| item.get("symbol").and_then(Value::as_str) == Some(symbol))
    else {
        let available = items
            .iter()
            .filter_map(|item| item.get("symbol").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        return Err(PriceError::MissingSymbol { symbol: symbol.to_string(), available });
    };

    let raw = item
        .get("price")
        .filter(|p| !p.is_null())
        .ok_or_else(|| PriceError::MissingPrice { symbol: symbol.to_string() })?;

    price_value(raw).ok_or_else(|| PriceError::BadPrice {
        symbol: symbol.to_string(),
        raw: raw.to_string(),
    })
}

// ============================================================================
// Log Pane
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

impl LogLevel {
    /// RGB of the line color
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            LogLevel::Info => (0x21, 0x96, 0xF3),
            LogLevel::Success => (0x4C, 0xAF, 0x50),
            LogLevel::Error => (0xF4, 0x43, 0x36),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub text: String,
    pub level: LogLevel,
}

/// Lines kept in the pane; older ones are dropped
pub const MAX_LOG_LINES: usize = 200;

/// Newest line first
#[derive(Debug, Default)]
pub struct LogPane {
    lines: VecDeque<LogLine>,
}

impl LogPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl AsRef<str>) {
        let text = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        self.lines.push_front(LogLine { text, level });
        self.lines.truncate(MAX_LOG_LINES);
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl AsRef<str>) {
        self.push(LogLevel::Success, message);
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.push(LogLevel::Error, message);
    }

    pub fn lines(&self) -> &VecDeque<LogLine> {
        &self.lines
    }
}

// ============================================================================
// Outcome
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PriceOutcome {
    Price(f64),
    FetchFailed,
    DataError,
    NoData,
    SystemError,
}

impl PriceOutcome {
    pub fn label(&self, symbol: &str) -> String {
        match self {
            PriceOutcome::Price(p) => format!("{symbol} price: ${p:.2}"),
            PriceOutcome::FetchFailed => format!("{symbol} price: fetch failed"),
            PriceOutcome::DataError => format!("{symbol} price: data error"),
            PriceOutcome::NoData => format!("{symbol} price: no data"),
            PriceOutcome::SystemError => format!("{symbol} price: system error"),
        }
    }
}

/// Map a lookup result to its outcome and write the matching log lines
pub fn record_outcome(result: Result<f64, PriceError>, symbol: &str, log: &mut LogPane) -> PriceOutcome {
    match result {
        Ok(price) => {
            log.success(format!("Fetched {symbol} price: ${price:.2}"));
            PriceOutcome::Price(price)
        }
        Err(PriceError::Network(e)) => {
            log.error(format!("Network request error: {e}"));
            PriceOutcome::FetchFailed
        }
        Err(PriceError::Json(e)) => {
            log.error(format!("JSON parse error: {e}"));
            PriceOutcome::DataError
        }
        Err(PriceError::MissingSymbol { symbol, available }) => {
            log.error(format!("No {symbol} entry; available symbols: {}", available.join(", ")));
            PriceOutcome::NoData
        }
        Err(e @ PriceError::MissingPrice { .. }) => {
            log.error(format!("Error: {e}"));
            PriceOutcome::NoData
        }
        Err(e) => {
            log.error(format!("Unexpected error: {e}"));
            PriceOutcome::SystemError
        }
    }
}

pub struct PriceFeed {
    client: Client,
    url: String,
    symbol: String,
}

impl PriceFeed {
    pub fn new(url: &str, symbol: &str) -> Result<Self, PriceError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            symbol: symbol.to_string(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// One blocking GET and lookup
    pub fn fetch(&self, log: &mut LogPane) -> Result<f64, PriceError> {
        log.info("Requesting token list...");
        let body = self.client.get(&self.url).send()?.error_for_status()?.text()?;
        log.info("Parsing response...");
        lookup_price(&body, &self.symbol)
    }

    /// Fetch and record; never returns an error
    pub fn refresh(&self, log: &mut LogPane) -> PriceOutcome {
        log.info(format!("Fetching {} price...", self.symbol));
        let result = self.fetch(log);
        if let Err(e) = &result {
            warn!(symbol = %self.symbol, error = %e, "Price fetch failed");
        }
        record_outcome(result, &self.symbol, log)
    }
}
