//! Tag Formatter
//!
//! Turns one wallet's [`WalletStats`] into a short display tag and a longer
//! summary line. Error thresholds are checked first, in a fixed order; the
//! first one crossed replaces the tag with an `错误：` message. Otherwise the
//! tag is built from segments that each have their own display bounds.

use crate::config::tagging::TaggingConfig;
use crate::models::WalletStats;
use crate::settings::{PROFIT_INVALID_MARKER, TAG_ERROR_MARKER};

/// Which error threshold replaced the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFailure {
    ProfitAboveMax,
    ProfitBelowMin,
    MultipleAboveMax,
    TradeCountAboveMax,
    LowBalance,
    Suspicious,
    LowWinRate,
    /// Profit overflowed the ceiling without any other message
    ProfitInvalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagOutcome {
    pub tag: String,
    pub summary: String,
    pub failure: Option<TagFailure>,
}

/// Integer part with thousands separators
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let n = value.trunc() as i64;
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `N/A` for a missing value
pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_else(|| "N/A".to_string())
}

// ============================================================================
// Error Ladder
// ============================================================================

fn check_errors(stats: &WalletStats, config: &TaggingConfig) -> Option<(TagFailure, String)> {
    let limits = &config.error_thresholds;
    let profit = format_number(stats.total_profit);

    if stats.total_profit > limits.max_profit {
        return Some((
            TagFailure::ProfitAboveMax,
            format!("{TAG_ERROR_MARKER}{profit}最大利润超过阀值{}", format_number(limits.max_profit)),
        ));
    }
    if stats.total_profit < limits.min_profit {
        return Some((
            TagFailure::ProfitBelowMin,
            format!("{TAG_ERROR_MARKER}{profit}最小利润低于阀值{}", format_number(limits.min_profit)),
        ));
    }
    if stats.max_multiple > limits.max_multiplier {
        return Some((
            TagFailure::MultipleAboveMax,
            format!(
                "{TAG_ERROR_MARKER}{}最大倍数超过阀值{}",
                format_number(stats.max_multiple as f64),
                format_number(limits.max_multiplier as f64)
            ),
        ));
    }
    if stats.trade_count > limits.max_trade_count {
        return Some((
            TagFailure::TradeCountAboveMax,
            format!(
                "{TAG_ERROR_MARKER}{}最大交易次数超过阀值{}",
                format_number(stats.trade_count as f64),
                format_number(limits.max_trade_count as f64)
            ),
        ));
    }
    if let Some(balance) = stats.latest_balance {
        if balance < limits.min_sol_balance {
            return Some((
                TagFailure::LowBalance,
                format!(
                    "{TAG_ERROR_MARKER}SOL余额{}低于阀值{}",
                    format_number(balance),
                    format_number(limits.min_sol_balance)
                ),
            ));
        }
    }
    if limits.exclude_suspicious && stats.is_suspicious {
        return Some((TagFailure::Suspicious, format!("{TAG_ERROR_MARKER}可疑地址")));
    }
    if let Some(min_rate) = limits.min_win_rate {
        if stats.win_rate < min_rate {
            return Some((
                TagFailure::LowWinRate,
                format!("{TAG_ERROR_MARKER}胜率{}%低于阀值{}%", stats.win_rate, min_rate),
            ));
        }
    }
    None
}

fn error_summary(stats: &WalletStats, config: &TaggingConfig, failure: TagFailure, message: &str) -> String {
    let limits = &config.error_thresholds;
    let profit = format_number(stats.total_profit);
    match failure {
        TagFailure::ProfitBelowMin => {
            format!("利润:{profit},最小利润错误(低于{})", format_number(limits.min_profit))
        }
        TagFailure::LowBalance => {
            format!("利润:{profit},SOL余额错误(低于{})", format_number(limits.min_sol_balance))
        }
        TagFailure::Suspicious => format!("利润:{profit},地址可疑"),
        TagFailure::LowWinRate => {
            format!("利润:{profit},胜率错误(低于{}%)", limits.min_win_rate.unwrap_or_default())
        }
        TagFailure::ProfitInvalid => format!("利润:{profit},{PROFIT_INVALID_MARKER}"),
        _ => format!("利润:{profit},{message}"),
    }
}

// ============================================================================
// Tag Segments
// ============================================================================

fn earnings_segment(stats: &WalletStats, config: &TaggingConfig) -> String {
    let display = &config.tag_thresholds;
    let mut part = String::new();

    let profit = stats.total_profit;
    if display.max_profit.is_none_or(|max| profit <= max) {
        let scaled = if profit >= 1_000_000.0 {
            format!("赚{}M", (profit / 1_000_000.0).trunc() as i64)
        } else if profit >= 10_000.0 {
            format!("赚{}万", (profit / 10_000.0).trunc() as i64)
        } else {
            format!("赚{}K", (profit / 1_000.0).trunc() as i64)
        };
        part.push_str(&scaled);
    }

    let multiple = stats.max_multiple;
    if multiple > 0
        && multiple >= display.min_multiplier
        && display.max_multiplier.is_none_or(|max| multiple <= max)
    {
        part.push_str(&format!("{multiple}x"));
    }

    if stats.top_10_count > 0 && stats.top_10_count >= display.min_top_10_count {
        part.push_str(&format!("前10({})", stats.top_10_count));
    }

    part
}

fn scaled_trade_count(count: u64) -> String {
    match count {
        0..100 => count.to_string(),
        100..1_000 => format!("{}百", count / 100),
        1_000..10_000 => format!("{}千", count / 1_000),
        _ => format!("{}万", count / 10_000),
    }
}

fn trade_segment(stats: &WalletStats, config: &TaggingConfig) -> String {
    if config
        .tag_thresholds
        .max_trade_count
        .is_some_and(|max| stats.trade_count > max)
    {
        return String::new();
    }
    let mut part = format!("交{}", scaled_trade_count(stats.trade_count));
    if config.show_win_count && stats.profit_count > 0 {
        part.push_str(&format!("胜{}", stats.profit_count));
    }
    part
}

fn holding_segment(stats: &WalletStats, config: &TaggingConfig) -> String {
    let holding = stats.avg_holding_minutes;
    let within_max = config
        .tag_thresholds
        .max_holding_minutes
        .is_none_or(|max| holding <= max);
    if !(holding > 0.0 && within_max) {
        return String::new();
    }
    if holding < config.holding_short_minutes {
        format!("持{}m", holding.trunc() as u64)
    } else if holding < config.holding_day_minutes {
        format!("持{}h", (holding / 60.0).trunc() as u64)
    } else {
        format!("持{}d", (holding / 1440.0).trunc() as u64)
    }
}

fn success_summary(stats: &WalletStats) -> String {
    format!(
        "利润:{},倍数:{}x,前10:{},交:{}/{},胜率:{}%,买:{}m,持:{}m,出现次数:{},SOL余额:{}",
        format_number(stats.total_profit),
        format_number(stats.max_multiple as f64),
        format_number(stats.top_10_count as f64),
        format_number(stats.trade_count as f64),
        format_number(stats.profit_count as f64),
        stats.win_rate,
        format_number(stats.avg_fast_buy_minutes as f64),
        format_number(stats.avg_holding_minutes),
        format_number(stats.occurrence_count as f64),
        format_optional(stats.latest_balance),
    )
}

/// Build the tag and summary for one wallet
pub fn format_tag(stats: &WalletStats, config: &TaggingConfig) -> TagOutcome {
    if let Some((failure, message)) = check_errors(stats, config) {
        return TagOutcome {
            summary: error_summary(stats, config, failure, &message),
            tag: message,
            failure: Some(failure),
        };
    }
    if stats.is_profit_invalid {
        return TagOutcome {
            tag: String::new(),
            summary: error_summary(stats, config, TagFailure::ProfitInvalid, ""),
            failure: Some(TagFailure::ProfitInvalid),
        };
    }

    let win_rate_part = if stats.win_rate > 0 {
        format!("胜率{}%", stats.win_rate)
    } else {
        String::new()
    };
    let balance_part = match stats.latest_balance {
        Some(balance) if balance > 0.0 => format!("余{}", balance.trunc() as i64),
        _ => String::new(),
    };
    let earnings = earnings_segment(stats, config);
    let trades = trade_segment(stats, config);
    let buy_part = if stats.avg_fast_buy_minutes > 0 {
        format!("买{}m", stats.avg_fast_buy_minutes)
    } else {
        String::new()
    };
    let holding = holding_segment(stats, config);

    let mut tag: String = [&win_rate_part, &balance_part, &earnings, &trades, &buy_part, &holding]
        .iter()
        .map(|s| s.as_str())
        .collect();

    if tag.chars().count() > config.tag_max_length {
        tag = format!("{earnings}{trades}")
            .chars()
            .take(config.tag_max_length)
            .collect();
    }

    TagOutcome {
        tag,
        summary: success_summary(stats),
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A wallet that passes every error threshold with the defaults
    fn healthy() -> WalletStats {
        WalletStats {
            address: "wallet".to_string(),
            total_profit: 25_000.0,
            max_multiple: 12,
            top_10_count: 2,
            trade_count: 6,
            profit_count: 2,
            win_rate: 33,
            buy_count_within_10m: 5,
            avg_fast_buy_minutes: 6,
            avg_holding_minutes: 40.0,
            occurrence_count: 2,
            latest_balance: Some(12.7),
            is_suspicious: false,
            last_active: None,
            is_profit_invalid: false,
        }
    }

    #[test]
    fn test_format_number_separators() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(999.9), "999");
        assert_eq!(format_number(1_234_567.8), "1,234,567");
        assert_eq!(format_number(-12_345.0), "-12,345");
        assert_eq!(format_number(f64::NAN), "N/A");
        assert_eq!(format_optional(None), "N/A");
    }

    #[test]
    fn test_healthy_wallet_tag_segments() {
        let config = TaggingConfig { tag_max_length: 40, ..Default::default() };
        let outcome = format_tag(&healthy(), &config);
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.tag, "胜率33%余12赚2万12x前10(2)交6胜2买6m持40m");
    }

    #[test]
    fn test_default_length_truncates_full_tag() {
        // Full tag is 31 characters
        let outcome = format_tag(&healthy(), &TaggingConfig::default());
        assert_eq!(outcome.tag, "赚2万12x前10(2)交6胜2");
    }

    #[test]
    fn test_healthy_wallet_summary() {
        let outcome = format_tag(&healthy(), &TaggingConfig::default());
        assert_eq!(
            outcome.summary,
            "利润:25,000,倍数:12x,前10:2,交:6/2,胜率:33%,买:6m,持:40m,出现次数:2,SOL余额:12"
        );
    }

    #[test]
    fn test_ten_million_profit_renders_scaled() {
        let stats = WalletStats { total_profit: 10_000_000.0, ..healthy() };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert!(outcome.tag.contains("赚10M"), "tag was {}", outcome.tag);
    }

    #[test]
    fn test_profit_over_max_is_exact_error() {
        let stats = WalletStats {
            total_profit: 150_000_000.0,
            is_profit_invalid: true,
            ..healthy()
        };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.tag, "错误：150,000,000最大利润超过阀值100,000,000");
        assert_eq!(outcome.failure, Some(TagFailure::ProfitAboveMax));
        assert!(!outcome.tag.contains('赚'));
        assert!(!outcome.tag.contains('交'));
        assert!(!outcome.tag.contains('持'));
    }

    #[test]
    fn test_error_ladder_order() {
        // Low profit wins over low balance and suspicious
        let stats = WalletStats {
            total_profit: 500.0,
            latest_balance: Some(0.1),
            is_suspicious: true,
            ..healthy()
        };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.failure, Some(TagFailure::ProfitBelowMin));
        assert_eq!(outcome.tag, "错误：500最小利润低于阀值10,000");
        assert_eq!(outcome.summary, "利润:500,最小利润错误(低于10,000)");

        // Multiple checked before trade count
        let stats = WalletStats { max_multiple: 20_000, trade_count: 500, ..healthy() };
        assert_eq!(format_tag(&stats, &TaggingConfig::default()).failure, Some(TagFailure::MultipleAboveMax));

        let stats = WalletStats { trade_count: 500, ..healthy() };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.tag, "错误：500最大交易次数超过阀值200");
        assert_eq!(outcome.summary, "利润:25,000,错误：500最大交易次数超过阀值200");
    }

    #[test]
    fn test_low_balance_error() {
        let stats = WalletStats { latest_balance: Some(0.4), ..healthy() };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.tag, "错误：SOL余额0低于阀值1");
        assert_eq!(outcome.summary, "利润:25,000,SOL余额错误(低于1)");
    }

    #[test]
    fn test_null_balance_skips_balance_check() {
        let stats = WalletStats { latest_balance: None, ..healthy() };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.failure, None);
        assert!(!outcome.tag.contains('余'));
        assert!(outcome.summary.ends_with("SOL余额:N/A"));
    }

    #[test]
    fn test_suspicious_error_respects_switch() {
        let stats = WalletStats { is_suspicious: true, ..healthy() };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.tag, "错误：可疑地址");
        assert_eq!(outcome.summary, "利润:25,000,地址可疑");

        let mut config = TaggingConfig::default();
        config.error_thresholds.exclude_suspicious = false;
        assert_eq!(format_tag(&stats, &config).failure, None);
    }

    #[test]
    fn test_low_win_rate_error_when_floor_set() {
        let stats = WalletStats { win_rate: 5, ..healthy() };
        let mut config = TaggingConfig::default();
        config.error_thresholds.min_win_rate = Some(10);
        let outcome = format_tag(&stats, &config);
        assert_eq!(outcome.tag, "错误：胜率5%低于阀值10%");
        assert_eq!(outcome.summary, "利润:25,000,胜率错误(低于10%)");

        assert_eq!(format_tag(&stats, &TaggingConfig::default()).failure, None);
    }

    #[test]
    fn test_single_occurrence_many_trades_is_tagged_with_defaults() {
        // One row, 10 buys + 10 sells: occurrence/trade ratio is only 5%
        let record = crate::models::TradeRecord {
            address: "busy".to_string(),
            sol_balance: Some(8.0),
            buy_amount: Some(100.0),
            sell_amount: Some(1_500.0),
            buy_count: Some(10.0),
            sell_count: Some(10.0),
            realized_profit: Some(50_000.0),
            profit_rank: Some(3.0),
            is_suspicious: Some(false),
            ..Default::default()
        };
        let config = TaggingConfig::default();
        let stats = crate::aggregator::aggregate(&[record], &config);
        assert_eq!(stats[0].win_rate, 5);

        let outcome = format_tag(&stats[0], &config);
        assert_eq!(outcome.failure, None);
        assert!(outcome.tag.contains("赚5万15x前10(1)"), "tag was {}", outcome.tag);
        assert!(outcome.tag.contains("交20胜1"), "tag was {}", outcome.tag);
    }

    #[test]
    fn test_null_trade_counts_are_not_an_error_with_defaults() {
        let stats = WalletStats { trade_count: 0, win_rate: 0, ..healthy() };
        let outcome = format_tag(&stats, &TaggingConfig::default());
        assert_eq!(outcome.failure, None);
        assert!(!outcome.tag.contains("胜率"));
    }

    #[test]
    fn test_profit_invalid_without_message() {
        let mut config = TaggingConfig::default();
        config.error_thresholds.max_profit = 1e12;
        let stats = WalletStats { is_profit_invalid: true, ..healthy() };
        let outcome = format_tag(&stats, &config);
        assert_eq!(outcome.tag, "");
        assert_eq!(outcome.summary, "利润:25,000,盈利金额错误!");
        assert_eq!(outcome.failure, Some(TagFailure::ProfitInvalid));
    }

    #[test]
    fn test_profit_scaling() {
        let config = TaggingConfig::default();
        let tag_for = |profit: f64| {
            let stats = WalletStats { total_profit: profit, ..healthy() };
            earnings_segment(&stats, &config)
        };
        assert!(tag_for(2_500_000.0).starts_with("赚2M"));
        assert!(tag_for(99_999.0).starts_with("赚9万"));
        assert!(tag_for(9_999.0).starts_with("赚9K"));
    }

    #[test]
    fn test_multiple_below_min_hidden() {
        let stats = WalletStats { max_multiple: 9, ..healthy() };
        assert_eq!(earnings_segment(&stats, &TaggingConfig::default()), "赚2万前10(2)");
    }

    #[test]
    fn test_trade_count_scaling() {
        assert_eq!(scaled_trade_count(0), "0");
        assert_eq!(scaled_trade_count(99), "99");
        assert_eq!(scaled_trade_count(150), "1百");
        assert_eq!(scaled_trade_count(4_321), "4千");
        assert_eq!(scaled_trade_count(25_000), "2万");
    }

    #[test]
    fn test_trade_segment_without_win_count() {
        let mut config = TaggingConfig::default();
        config.show_win_count = false;
        assert_eq!(trade_segment(&healthy(), &config), "交6");
    }

    #[test]
    fn test_holding_scaling() {
        let config = TaggingConfig::default();
        let part = |m: f64| holding_segment(&WalletStats { avg_holding_minutes: m, ..healthy() }, &config);
        assert_eq!(part(0.0), "");
        assert_eq!(part(59.9), "持59m");
        assert_eq!(part(150.0), "持2h");
        assert_eq!(part(4_000.0), "持2d");
    }

    #[test]
    fn test_long_tag_truncated_to_earnings_and_trades() {
        let config = TaggingConfig { tag_max_length: 12, ..Default::default() };
        let outcome = format_tag(&healthy(), &config);
        assert_eq!(outcome.tag, "赚2万12x前10(2)");
        assert_eq!(outcome.tag.chars().count(), 12);
    }
}
