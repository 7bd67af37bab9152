// src/models.rs
// Core types for the tagging pipeline

use chrono::NaiveDateTime;

/// One row of the input spreadsheet after coercion
///
/// Every numeric and time field is optional: `None` is the null marker left by
/// an empty, `N/A`, unparseable or sentinel-epoch cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeRecord {
    pub contract: String,
    pub address: String,
    pub sol_balance: Option<f64>,
    /// Seconds from the reference launch event to this wallet's buy
    pub pump_to_buy_secs: Option<f64>,
    pub buy_time: Option<NaiveDateTime>,
    pub sell_time: Option<NaiveDateTime>,
    pub last_active: Option<NaiveDateTime>,
    pub holding_minutes: Option<f64>,
    pub buy_amount: Option<f64>,
    pub sell_amount: Option<f64>,
    pub buy_count: Option<f64>,
    pub sell_count: Option<f64>,
    pub realized_profit: Option<f64>,
    pub unrealized_profit: Option<f64>,
    pub profit_rank: Option<f64>,
    pub is_suspicious: Option<bool>,
}

impl TradeRecord {
    /// Realized + unrealized, nulls as zero
    #[inline]
    pub fn row_profit(&self) -> f64 {
        self.realized_profit.unwrap_or(0.0) + self.unrealized_profit.unwrap_or(0.0)
    }

    /// Buy count + sell count, nulls as zero
    #[inline]
    pub fn row_trade_count(&self) -> f64 {
        self.buy_count.unwrap_or(0.0) + self.sell_count.unwrap_or(0.0)
    }

    /// Sell/buy ratio when both amounts are usable
    pub fn multiple(&self) -> Option<f64> {
        let buy = self.buy_amount?;
        let sell = self.sell_amount?;
        if buy == 0.0 || !buy.is_finite() || !sell.is_finite() {
            return None;
        }
        let ratio = sell / buy;
        ratio.is_finite().then_some(ratio)
    }

    /// A missing flag counts as suspicious
    #[inline]
    pub fn flagged_suspicious(&self) -> bool {
        self.is_suspicious.unwrap_or(true)
    }
}

/// Per-wallet statistic bundle produced by the aggregator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletStats {
    pub address: String,
    pub total_profit: f64,
    pub max_multiple: u64,
    /// Rows with profit rank below 10
    pub top_10_count: usize,
    /// Largest buy + sell count seen on any row
    pub trade_count: u64,
    /// Rows whose profit reached the configured win threshold
    pub profit_count: usize,
    /// Percent, rounded
    pub win_rate: u32,
    pub buy_count_within_10m: u64,
    /// Mean fast-buy latency in whole minutes; 0 when none or above ten
    pub avg_fast_buy_minutes: u64,
    pub avg_holding_minutes: f64,
    pub occurrence_count: usize,
    pub latest_balance: Option<f64>,
    pub is_suspicious: bool,
    pub last_active: Option<NaiveDateTime>,
    pub is_profit_invalid: bool,
}

/// One line of the tagged report
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub address: String,
    pub tag: String,
    pub summary: String,
    pub last_active: Option<NaiveDateTime>,
    /// Sort keys are read from here
    pub stats: WalletStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_profit_treats_null_as_zero() {
        let record = TradeRecord {
            realized_profit: Some(1200.0),
            unrealized_profit: None,
            ..Default::default()
        };
        assert_eq!(record.row_profit(), 1200.0);
    }

    #[test]
    fn test_multiple_requires_nonzero_buy() {
        let mut record = TradeRecord {
            buy_amount: Some(0.0),
            sell_amount: Some(50.0),
            ..Default::default()
        };
        assert_eq!(record.multiple(), None);

        record.buy_amount = Some(2.0);
        assert_eq!(record.multiple(), Some(25.0));

        record.sell_amount = None;
        assert_eq!(record.multiple(), None);
    }

    #[test]
    fn test_missing_suspicious_flag_counts_as_suspicious() {
        let record = TradeRecord::default();
        assert!(record.flagged_suspicious());

        let record = TradeRecord { is_suspicious: Some(false), ..Default::default() };
        assert!(!record.flagged_suspicious());
    }
}
