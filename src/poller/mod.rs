//! Stake/unstake APY poller
//!
//! One tick walks every configured base asset in order:
//! base -> sUSDe quote, `convertToAssets` on the vault, USDe -> base quote,
//! then an annualized yield over the unlock period. A failure at any step
//! ends that asset's iteration and the tick moves on to the next asset.

pub mod history;
pub mod notifier;
pub mod quote;
pub mod vault;

pub use history::{HistoryBook, HistorySink};
pub use notifier::{AlertSender, AlertState, ResendNotifier};
pub use quote::{CowQuoteClient, Quote, QuoteRequest, QuoteSource};
pub use vault::{RpcVaultReader, VaultReader};

use alloy::primitives::U256;
use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::settings::{DAYS_PER_YEAR, PollerConfig, Token, UNLOCK_DAYS, susde, usde};
use crate::tagging::format_number;

pub const ALERT_SUBJECT: &str = "高 APY 套利机会告警";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

/// One completed base -> sUSDe -> USDe -> base round trip
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRun {
    pub asset: Token,
    /// Beijing time
    pub timestamp: NaiveDateTime,
    pub initial_amount: f64,
    pub susde_amount: f64,
    pub usde_amount: f64,
    pub final_amount: f64,
    pub profit: f64,
    pub apy: f64,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub runs: Vec<AssetRun>,
    /// (asset symbol, reason)
    pub failures: Vec<(String, String)>,
    pub alerts_sent: usize,
}

// ============================================================================
// Unit Helpers
// ============================================================================

/// Whole units to raw token units
pub fn from_units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

/// Raw token units to a float amount
pub fn to_units(raw: U256, decimals: u8) -> f64 {
    raw.to_string().parse::<f64>().unwrap_or(0.0) / 10f64.powi(i32::from(decimals))
}

/// ((final - initial) / unlock days * 365) / initial, rounded to 4 decimals
pub fn compute_apy(final_amount: f64, initial_amount: f64) -> f64 {
    if initial_amount <= 0.0 {
        return 0.0;
    }
    let profit = final_amount - initial_amount;
    let apy = (profit / UNLOCK_DAYS) * DAYS_PER_YEAR / initial_amount;
    (apy * 10_000.0).round() / 10_000.0
}

/// Thousands separators and two decimals
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round();
    let whole = format_number((cents / 100.0).trunc());
    let frac = (cents % 100.0) as u64;
    let sign = if value < 0.0 && cents > 0.0 { "-" } else { "" };
    format!("{sign}{whole}.{frac:02}")
}

pub fn beijing_now() -> NaiveDateTime {
    match FixedOffset::east_opt(8 * 3600) {
        Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
        None => Utc::now().naive_utc(),
    }
}

/// HTML body for the high-APY alert
pub fn alert_body(run: &AssetRun) -> String {
    let sym = run.asset.symbol;
    let susde_price = if run.susde_amount > 0.0 { run.initial_amount / run.susde_amount } else { 0.0 };
    let usde_price = if run.usde_amount > 0.0 { run.final_amount / run.usde_amount } else { 0.0 };
    format!(
        "<h2>套利机会告警</h2>\
         <p>基础资产：{sym}</p>\
         <p>当前 APY 收益：{:.2}%</p>\
         <p>当前 sUSDe 价格：{susde_price:.4} {sym}/sUSDe</p>\
         <p>当前 USDe 价格：{usde_price:.4} {sym}/USDe</p>\
         <p>投入 {} {sym} 可以换到 sUSDe：{} sUSDe</p>\
         <p>7 天后可换回 {sym}：{} {sym}</p>\
         <p>时间：{} (北京时间)</p>\
         <p>请及时检查并采取行动！</p>",
        run.apy * 100.0,
        format_amount(run.initial_amount),
        format_amount(run.susde_amount),
        format_amount(run.final_amount),
        run.timestamp.format("%Y-%m-%d %H:%M:%S"),
    )
}

// ============================================================================
// Poller
// ============================================================================

pub struct ApyPoller<Q, V, A> {
    config: PollerConfig,
    quotes: Q,
    vault: V,
    alerts: Option<A>,
    state: PollerState,
}

impl<Q: QuoteSource, V: VaultReader, A: AlertSender> ApyPoller<Q, V, A> {
    pub fn new(config: PollerConfig, quotes: Q, vault: V, alerts: Option<A>) -> Self {
        Self {
            config,
            quotes,
            vault,
            alerts,
            state: PollerState::Idle,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Run every base asset once; never fails as a whole
    pub fn run_tick(&mut self, alert_state: &mut AlertState, history: &mut dyn HistorySink) -> TickReport {
        self.state = PollerState::Polling;
        let mut report = TickReport::default();

        let assets = self.config.base_assets.clone();
        for asset in assets {
            match self.run_asset(asset) {
                Ok(run) => {
                    if let Err(e) = history.record(&run) {
                        warn!(asset = asset.symbol, error = %format!("{e:#}"), "Failed to append history row");
                    }
                    if self.maybe_alert(&run, alert_state) {
                        report.alerts_sent += 1;
                    }
                    report.runs.push(run);
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    error!(asset = asset.symbol, reason = %reason, "Asset run aborted");
                    report.failures.push((asset.symbol.to_string(), reason));
                }
            }
        }

        self.state = PollerState::Idle;
        info!(
            succeeded = report.runs.len(),
            failed = report.failures.len(),
            alerts = report.alerts_sent,
            "Tick complete"
        );
        report
    }

    fn run_asset(&self, asset: Token) -> Result<AssetRun> {
        let staked = susde();
        let underlying = usde();
        let initial_raw = from_units(self.config.initial_amount, asset.decimals);

        let first = self
            .quotes
            .fetch_quote(&QuoteRequest {
                sell_token: asset.address.to_string(),
                buy_token: staked.address.to_string(),
                sell_amount: initial_raw,
                from: self.config.from_address.clone(),
                receiver: self.config.receiver_address.clone(),
            })
            .with_context(|| format!("{} -> {} quote failed", asset.symbol, staked.symbol))?;
        info!(
            asset = asset.symbol,
            sold = %format_amount(to_units(first.sell_amount, asset.decimals)),
            received = %format_amount(to_units(first.buy_amount, staked.decimals)),
            "Step 1: bought sUSDe"
        );

        let unlocked = self
            .vault
            .convert_to_assets(first.buy_amount)
            .context("convertToAssets call failed")?;
        info!(
            asset = asset.symbol,
            usde = %format_amount(to_units(unlocked, underlying.decimals)),
            "Step 2: USDe unlockable after cooldown"
        );

        let second = self
            .quotes
            .fetch_quote(&QuoteRequest {
                sell_token: underlying.address.to_string(),
                buy_token: asset.address.to_string(),
                sell_amount: unlocked,
                from: self.config.from_address.clone(),
                receiver: self.config.receiver_address.clone(),
            })
            .with_context(|| format!("{} -> {} quote failed", underlying.symbol, asset.symbol))?;

        let initial_amount = self.config.initial_amount as f64;
        let final_amount = to_units(second.buy_amount, asset.decimals);
        let apy = compute_apy(final_amount, initial_amount);
        info!(
            asset = asset.symbol,
            formula = %format!(
                "APY = ((({final_amount} - {initial_amount}) / {UNLOCK_DAYS}) * {DAYS_PER_YEAR}) / {initial_amount}"
            ),
            apy = %format!("{:.2}%", apy * 100.0),
            "Step 3: round trip complete"
        );

        Ok(AssetRun {
            asset,
            timestamp: beijing_now(),
            initial_amount,
            susde_amount: to_units(first.buy_amount, staked.decimals),
            usde_amount: to_units(unlocked, underlying.decimals),
            final_amount,
            profit: final_amount - initial_amount,
            apy,
        })
    }

    /// Alert when above threshold and not already alerted at this rounded value
    fn maybe_alert(&self, run: &AssetRun, alert_state: &mut AlertState) -> bool {
        let threshold = self.config.apy_threshold;
        if run.apy <= threshold {
            info!(
                asset = run.asset.symbol,
                apy = %format!("{:.2}%", run.apy * 100.0),
                threshold = %format!("{:.2}%", threshold * 100.0),
                "APY below threshold; no alert"
            );
            return false;
        }

        let rounded = format!("{:.2}", run.apy);
        if !alert_state.should_alert(run.asset.symbol, &rounded) {
            info!(asset = run.asset.symbol, apy = %rounded, "Same APY already alerted; skipping");
            return false;
        }

        let Some(sender) = &self.alerts else {
            warn!(asset = run.asset.symbol, apy = %rounded, "APY above threshold but alerts are not configured");
            return false;
        };

        match sender.send_alert(ALERT_SUBJECT, &alert_body(run)) {
            Ok(()) => {
                alert_state.record(run.asset.symbol, &rounded);
                true
            }
            Err(e) => {
                error!(asset = run.asset.symbol, error = %format!("{e:#}"), "Alert not delivered");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_units() {
        assert_eq!(from_units(1_000_000, 6), U256::from(1_000_000_000_000u64));
        assert_eq!(from_units(2, 18), U256::from(2_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_to_units() {
        assert_eq!(to_units(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(to_units(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn test_compute_apy() {
        // 0.5% over 7 days
        assert_eq!(compute_apy(1_005_000.0, 1_000_000.0), 0.2607);
        assert_eq!(compute_apy(990_000.0, 1_000_000.0), -0.5214);
        assert_eq!(compute_apy(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_234_567.891), "1,234,567.89");
        assert_eq!(format_amount(0.5), "0.50");
        assert_eq!(format_amount(-0.25), "-0.25");
        assert_eq!(format_amount(999.999), "1,000.00");
    }

    #[test]
    fn test_alert_body_mentions_asset_and_apy() {
        let run = AssetRun {
            asset: crate::settings::token_by_symbol("USDT").unwrap(),
            timestamp: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            initial_amount: 1_000_000.0,
            susde_amount: 850_000.0,
            usde_amount: 1_010_000.0,
            final_amount: 1_008_000.0,
            profit: 8_000.0,
            apy: 0.4171,
        };
        let body = alert_body(&run);
        assert!(body.contains("当前 APY 收益：41.71%"));
        assert!(body.contains("投入 1,000,000.00 USDT"));
        assert!(body.contains("2025-03-01 09:00:00"));
    }
}
