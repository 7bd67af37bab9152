//! Wallet Aggregation Module
//!
//! Groups trade records by wallet address and reduces each group to a single
//! [`WalletStats`] bundle. Groups keep the order in which their address first
//! appears in the input. A null numeric cell contributes zero to every sum and
//! mean.

use std::collections::HashMap;

use tracing::debug;

use crate::config::tagging::{TaggingConfig, WinRateBasis};
use crate::models::{TradeRecord, WalletStats};

/// Fast-buy averages above this many minutes are reported as zero
pub const FAST_BUY_MAX_MINUTES: u64 = 10;

/// Records for one address, in input order
#[derive(Debug)]
struct WalletGroup<'a> {
    address: &'a str,
    rows: Vec<&'a TradeRecord>,
}

fn group_by_address(records: &[TradeRecord]) -> Vec<WalletGroup<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<WalletGroup<'_>> = Vec::new();

    for record in records {
        let key = record.address.as_str();
        match index.get(key) {
            Some(&i) => groups[i].rows.push(record),
            None => {
                index.insert(key, groups.len());
                groups.push(WalletGroup { address: key, rows: vec![record] });
            }
        }
    }

    groups
}

/// One bundle per distinct address, in first-appearance order
pub fn aggregate(records: &[TradeRecord], config: &TaggingConfig) -> Vec<WalletStats> {
    let stats: Vec<WalletStats> = group_by_address(records)
        .iter()
        .map(|group| wallet_stats(group, config))
        .collect();

    debug!(records = records.len(), wallets = stats.len(), "Aggregated trade records");
    stats
}

fn wallet_stats(group: &WalletGroup<'_>, config: &TaggingConfig) -> WalletStats {
    let rows = &group.rows;
    let occurrence_count = rows.len();

    let total_profit: f64 = rows.iter().map(|r| r.row_profit()).sum();

    let max_ratio = rows
        .iter()
        .filter_map(|r| r.multiple())
        .fold(f64::NEG_INFINITY, f64::max);
    let max_multiple = if max_ratio.is_finite() && max_ratio > 0.0 {
        max_ratio.trunc() as u64
    } else {
        0
    };

    let top_10_count = rows
        .iter()
        .filter(|r| r.profit_rank.is_some_and(|rank| rank < 10.0))
        .count();

    let max_trades = rows
        .iter()
        .map(|r| r.row_trade_count())
        .fold(0.0_f64, f64::max);
    let trade_count = max_trades.trunc() as u64;

    let profit_count = rows
        .iter()
        .filter(|r| r.row_profit() >= config.profit_threshold)
        .count();

    let win_rate = match config.win_rate_basis {
        WinRateBasis::OccurrencePerTrade => percent(occurrence_count as f64, trade_count as f64),
        WinRateBasis::ProfitablePerOccurrence => percent(profit_count as f64, occurrence_count as f64),
    };

    // Fast buys: rows with a known latency at or under the threshold
    let fast: Vec<&&TradeRecord> = rows
        .iter()
        .filter(|r| r.pump_to_buy_secs.is_some_and(|s| s <= config.pump_buy_threshold_secs))
        .collect();
    let buy_count_within_10m = fast
        .iter()
        .map(|r| r.buy_count.unwrap_or(0.0))
        .sum::<f64>()
        .max(0.0)
        .trunc() as u64;
    let avg_fast_buy_minutes = if fast.is_empty() {
        0
    } else {
        let mean_secs = fast
            .iter()
            .filter_map(|r| r.pump_to_buy_secs)
            .sum::<f64>()
            / fast.len() as f64;
        let minutes = (mean_secs / 60.0).max(0.0).trunc() as u64;
        if minutes > FAST_BUY_MAX_MINUTES { 0 } else { minutes }
    };

    let avg_holding_minutes = rows
        .iter()
        .map(|r| r.holding_minutes.unwrap_or(0.0))
        .sum::<f64>()
        / occurrence_count as f64;

    // Balance and flag follow the latest row of the group
    let (latest_balance, is_suspicious) = rows
        .last()
        .map(|r| (r.sol_balance, r.flagged_suspicious()))
        .unwrap_or((None, true));

    let last_active = rows.iter().filter_map(|r| r.last_active).max();

    let is_profit_invalid = total_profit > config.error_thresholds.max_profit;

    debug!(
        address = group.address,
        occurrence_count,
        total_profit,
        max_multiple,
        trade_count,
        profit_count,
        win_rate,
        "Wallet stats computed"
    );

    WalletStats {
        address: group.address.to_string(),
        total_profit,
        max_multiple,
        top_10_count,
        trade_count,
        profit_count,
        win_rate,
        buy_count_within_10m,
        avg_fast_buy_minutes,
        avg_holding_minutes,
        occurrence_count,
        latest_balance,
        is_suspicious,
        last_active,
        is_profit_invalid,
    }
}

/// Rounded percentage, 0 when the denominator is 0
fn percent(numerator: f64, denominator: f64) -> u32 {
    if denominator <= 0.0 {
        return 0;
    }
    (numerator / denominator * 100.0).round().max(0.0) as u32
}
