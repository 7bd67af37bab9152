/// Tagging configuration structures and parsing
/// Compiled-in defaults match the source spreadsheet; a JSON file may override any subset

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Input column headers, matched case-insensitively after trimming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub contract: String,
    pub address: String,
    pub sol_balance: String,
    pub pump_to_buy: String,
    pub buy_time: String,
    pub sell_time: String,
    pub last_active_time: String,
    pub holding_time: String,
    pub buy_amount: String,
    pub sell_amount: String,
    pub buy_count: String,
    pub sell_count: String,
    pub realized_profit: String,
    pub unrealized_profit: String,
    pub profit_rank: String,
    pub is_suspicious: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            contract: "合约".to_string(),
            address: "聪明钱".to_string(),
            sol_balance: "sol余额".to_string(),
            pump_to_buy: "pump到买入(秒)".to_string(),
            buy_time: "买入时间".to_string(),
            sell_time: "卖出时间".to_string(),
            last_active_time: "最后活跃时间".to_string(),
            holding_time: "持有时长(分钟)".to_string(),
            buy_amount: "买入金额".to_string(),
            sell_amount: "卖出金额".to_string(),
            buy_count: "买入次数".to_string(),
            sell_count: "卖出次数".to_string(),
            realized_profit: "实现利润".to_string(),
            unrealized_profit: "未实现利润".to_string(),
            profit_rank: "利润排名".to_string(),
            is_suspicious: "是否可疑".to_string(),
        }
    }
}

impl ColumnNames {
    /// All required headers in declaration order
    pub fn required(&self) -> [&str; 16] {
        [
            self.contract.as_str(),
            self.address.as_str(),
            self.sol_balance.as_str(),
            self.pump_to_buy.as_str(),
            self.buy_time.as_str(),
            self.sell_time.as_str(),
            self.last_active_time.as_str(),
            self.holding_time.as_str(),
            self.buy_amount.as_str(),
            self.sell_amount.as_str(),
            self.buy_count.as_str(),
            self.sell_count.as_str(),
            self.realized_profit.as_str(),
            self.unrealized_profit.as_str(),
            self.profit_rank.as_str(),
            self.is_suspicious.as_str(),
        ]
    }
}

/// Display thresholds: a segment outside these bounds is omitted from the tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagThresholds {
    /// Profit above this is not rendered (None = unbounded)
    pub max_profit: Option<f64>,
    pub min_multiplier: u64,
    pub max_multiplier: Option<u64>,
    pub min_top_10_count: usize,
    pub max_trade_count: Option<u64>,
    /// Minutes
    pub max_holding_minutes: Option<f64>,
}

impl Default for TagThresholds {
    fn default() -> Self {
        Self {
            max_profit: Some(100_000_000.0),
            min_multiplier: 10,
            max_multiplier: None,
            min_top_10_count: 1,
            max_trade_count: Some(200),
            max_holding_minutes: None,
        }
    }
}

/// Error thresholds: crossing any of these replaces the tag with a red error
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorThresholds {
    pub max_profit: f64,
    pub min_profit: f64,
    pub max_multiplier: u64,
    pub max_trade_count: u64,
    pub min_sol_balance: f64,
    pub exclude_suspicious: bool,
    /// Percent; None (the default) disables the check. The ratio depends on
    /// `win_rate_basis`, so a floor must be chosen against that basis.
    pub min_win_rate: Option<u32>,
}

impl Default for ErrorThresholds {
    fn default() -> Self {
        Self {
            max_profit: 100_000_000.0,
            min_profit: 10_000.0,
            max_multiplier: 10_000,
            max_trade_count: 200,
            min_sol_balance: 1.0,
            exclude_suspicious: true,
            min_win_rate: None,
        }
    }
}

/// What "win rate" divides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WinRateBasis {
    /// occurrence_count / trade_count; an activity ratio as much as a win rate
    #[default]
    OccurrencePerTrade,
    /// profit_count / occurrence_count
    ProfitablePerOccurrence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    OccurrenceCount,
    TotalProfit,
    MaxMultiple,
    #[serde(rename = "top_10_count")]
    Top10Count,
    #[serde(rename = "buy_count_within_10m")]
    BuyCountWithin10m,
    WinRate,
    TradeCount,
}

impl SortField {
    /// Column label used in the sort-basis description
    pub fn label(&self) -> &'static str {
        match self {
            SortField::OccurrenceCount => "盈利次数",
            SortField::TotalProfit => "盈利金额",
            SortField::MaxMultiple => "盈利倍数",
            SortField::Top10Count => "利润排名前 10 次数",
            SortField::BuyCountWithin10m => "前 10 分钟买入次数",
            SortField::WinRate => "胜率",
            SortField::TradeCount => "交易次数",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    #[serde(default)]
    pub ascending: bool,
}

impl SortKey {
    pub const fn desc(field: SortField) -> Self {
        Self { field, ascending: false }
    }

    pub const fn asc(field: SortField) -> Self {
        Self { field, ascending: true }
    }
}

fn default_sort_keys() -> Vec<SortKey> {
    vec![
        SortKey::desc(SortField::OccurrenceCount),
        SortKey::desc(SortField::MaxMultiple),
        SortKey::desc(SortField::Top10Count),
        SortKey::desc(SortField::BuyCountWithin10m),
        SortKey::desc(SortField::TotalProfit),
    ]
}

/// Complete tagger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub columns: ColumnNames,
    /// Row profit (realized + unrealized) counted as a win
    pub profit_threshold: f64,
    /// Pump-to-buy latency (seconds) counted as a fast buy
    pub pump_buy_threshold_secs: f64,
    /// Holding below this many minutes renders in minutes
    pub holding_short_minutes: f64,
    /// Holding below this many minutes renders in hours, otherwise days
    pub holding_day_minutes: f64,
    /// Maximum tag length in characters
    pub tag_max_length: usize,
    pub tag_thresholds: TagThresholds,
    pub error_thresholds: ErrorThresholds,
    pub sort_keys: Vec<SortKey>,
    /// true: drop low-balance/suspicious rows at load; false: only count them
    pub drop_flagged_rows: bool,
    pub win_rate_basis: WinRateBasis,
    /// Append the win count to the trade segment (交N胜M)
    pub show_win_count: bool,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            profit_threshold: 3000.0,
            pump_buy_threshold_secs: 600.0,
            holding_short_minutes: 60.0,
            holding_day_minutes: 1440.0,
            tag_max_length: 30,
            tag_thresholds: TagThresholds::default(),
            error_thresholds: ErrorThresholds::default(),
            sort_keys: default_sort_keys(),
            drop_flagged_rows: false,
            win_rate_basis: WinRateBasis::default(),
            show_win_count: true,
        }
    }
}

impl TaggingConfig {
    /// Load overrides from a JSON file and validate the merged result
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tagging config {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid tagging config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: TaggingConfig = serde_json::from_str(content).context("Failed to parse JSON")?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Defaults, or the file when one is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tag_max_length == 0 {
            return Err("tag_max_length must be greater than zero".to_string());
        }
        if self.pump_buy_threshold_secs < 0.0 {
            return Err("pump_buy_threshold_secs must not be negative".to_string());
        }
        if self.holding_short_minutes <= 0.0 || self.holding_short_minutes >= self.holding_day_minutes {
            return Err(format!(
                "holding_short_minutes ({}) must be positive and below holding_day_minutes ({})",
                self.holding_short_minutes, self.holding_day_minutes
            ));
        }
        if self.error_thresholds.min_profit > self.error_thresholds.max_profit {
            return Err(format!(
                "error_thresholds.min_profit ({}) exceeds max_profit ({})",
                self.error_thresholds.min_profit, self.error_thresholds.max_profit
            ));
        }
        if let Some(rate) = self.error_thresholds.min_win_rate {
            if rate > 100 {
                return Err(format!("error_thresholds.min_win_rate must be a percentage (found {})", rate));
            }
        }
        if self.sort_keys.is_empty() {
            return Err("sort_keys must contain at least one field".to_string());
        }
        let mut seen = HashSet::new();
        for key in &self.sort_keys {
            if !seen.insert(key.field) {
                return Err(format!("sort field {:?} listed more than once", key.field));
            }
        }
        let mut names = HashSet::new();
        for name in self.columns.required() {
            let normalized = name.trim().to_lowercase();
            if normalized.is_empty() {
                return Err("column names must not be empty".to_string());
            }
            if !names.insert(normalized) {
                return Err(format!("column name '{}' is mapped more than once", name));
            }
        }
        Ok(())
    }
}
