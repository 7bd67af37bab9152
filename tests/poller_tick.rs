// Integration tests for the APY poller tick using in-memory quote, vault and alert fakes

use alloy::primitives::U256;
use anyhow::{Result, bail};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use smartmoney_tagger::poller::{
    AlertSender, AlertState, ApyPoller, AssetRun, HistorySink, PollerState, Quote, QuoteRequest, QuoteSource,
    VaultReader, from_units,
};
use smartmoney_tagger::settings::{PollerConfig, SUSDE_ADDRESS, Token, token_by_address, token_by_symbol};

// =========================================================================
// Fakes
// =========================================================================

/// Prices every round trip to a fixed final amount of the base asset
struct FakeQuotes {
    calls: Rc<RefCell<Vec<(String, String)>>>,
    fail_sell_token: Option<&'static str>,
    final_amount: u64,
}

impl QuoteSource for FakeQuotes {
    fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote> {
        self.calls
            .borrow_mut()
            .push((request.sell_token.clone(), request.buy_token.clone()));

        if self.fail_sell_token.is_some_and(|t| t.eq_ignore_ascii_case(&request.sell_token)) {
            bail!("Quote request failed (status 500): internal server error");
        }
        if request.buy_token.eq_ignore_ascii_case(SUSDE_ADDRESS) {
            return Ok(Quote {
                sell_amount: request.sell_amount,
                buy_amount: from_units(900_000, 18),
            });
        }
        let Some(base) = token_by_address(&request.buy_token) else {
            bail!("unknown buy token {}", request.buy_token);
        };
        Ok(Quote {
            sell_amount: request.sell_amount,
            buy_amount: from_units(self.final_amount, base.decimals),
        })
    }
}

struct FakeVault {
    calls: Rc<Cell<usize>>,
}

impl VaultReader for FakeVault {
    fn convert_to_assets(&self, _shares: U256) -> Result<U256> {
        self.calls.set(self.calls.get() + 1);
        Ok(from_units(1_010_000, 18))
    }
}

struct FakeSender {
    attempts: Rc<Cell<usize>>,
    fail: bool,
}

impl AlertSender for FakeSender {
    fn send_alert(&self, subject: &str, html: &str) -> Result<()> {
        self.attempts.set(self.attempts.get() + 1);
        assert!(!subject.is_empty());
        assert!(html.contains("APY"));
        if self.fail {
            bail!("all Resend API keys failed");
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryHistory {
    rows: Vec<AssetRun>,
}

impl HistorySink for MemoryHistory {
    fn record(&mut self, run: &AssetRun) -> Result<()> {
        self.rows.insert(0, run.clone());
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn token(symbol: &str) -> Token {
    token_by_symbol(symbol).unwrap()
}

fn config(assets: &[&str]) -> PollerConfig {
    PollerConfig {
        rpc_url: "http://localhost:8545".to_string(),
        from_address: "0x6810e776880c02933d47db1b9fc05908e5386b96".to_string(),
        receiver_address: "0x6810e776880c02933d47db1b9fc05908e5386b96".to_string(),
        resend_api_keys: vec!["re_test".to_string()],
        alert_to: Some("ops@example.com".to_string()),
        alert_from: "no-reply@example.com".to_string(),
        apy_threshold: 0.30,
        initial_amount: 1_000_000,
        poll_interval: Duration::from_secs(180),
        base_assets: assets.iter().map(|s| token(s)).collect(),
        history_file: PathBuf::from("unused.xlsx"),
        alert_state_file: PathBuf::from("unused.json"),
    }
}

struct Harness {
    poller: ApyPoller<FakeQuotes, FakeVault, FakeSender>,
    quote_calls: Rc<RefCell<Vec<(String, String)>>>,
    vault_calls: Rc<Cell<usize>>,
    alert_attempts: Rc<Cell<usize>>,
}

fn harness(assets: &[&str], final_amount: u64, fail_sell_token: Option<&'static str>, fail_send: bool) -> Harness {
    let quote_calls = Rc::new(RefCell::new(Vec::new()));
    let vault_calls = Rc::new(Cell::new(0));
    let alert_attempts = Rc::new(Cell::new(0));
    let poller = ApyPoller::new(
        config(assets),
        FakeQuotes { calls: quote_calls.clone(), fail_sell_token, final_amount },
        FakeVault { calls: vault_calls.clone() },
        Some(FakeSender { attempts: alert_attempts.clone(), fail: fail_send }),
    );
    Harness { poller, quote_calls, vault_calls, alert_attempts }
}

// =========================================================================
// Test Suite: Round Trip
// =========================================================================

#[test]
fn test_successful_round_trip_records_history() {
    let mut h = harness(&["USDT"], 1_008_000, None, false);
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let report = h.poller.run_tick(&mut state, &mut history);

    assert!(report.failures.is_empty());
    assert_eq!(report.runs.len(), 1);
    let run = &report.runs[0];
    assert_eq!(run.asset.symbol, "USDT");
    assert!((run.susde_amount - 900_000.0).abs() < 1e-6);
    assert!((run.usde_amount - 1_010_000.0).abs() < 1e-6);
    assert_eq!(run.final_amount, 1_008_000.0);
    assert_eq!(run.profit, 8_000.0);
    assert_eq!(run.apy, 0.4171);

    assert_eq!(history.rows.len(), 1);
    assert_eq!(h.vault_calls.get(), 1);

    // base -> sUSDe, then USDe -> base
    let calls = h.quote_calls.borrow();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.eq_ignore_ascii_case(SUSDE_ADDRESS));
    assert!(calls[1].1.eq_ignore_ascii_case(token("USDT").address));
    assert_eq!(h.poller.state(), PollerState::Idle);
}

#[test]
fn test_failed_first_quote_skips_rest_of_asset() {
    let usdt = token("USDT").address;
    let mut h = harness(&["USDT"], 1_008_000, Some(usdt), false);
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let report = h.poller.run_tick(&mut state, &mut history);

    assert!(report.runs.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "USDT");
    assert!(report.failures[0].1.contains("quote failed"));
    assert_eq!(h.quote_calls.borrow().len(), 1);
    assert_eq!(h.vault_calls.get(), 0);
    assert!(history.rows.is_empty());
    assert_eq!(h.alert_attempts.get(), 0);
}

#[test]
fn test_failed_asset_does_not_stop_the_next() {
    let dai = token("DAI").address;
    let mut h = harness(&["DAI", "USDT"], 1_008_000, Some(dai), false);
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let report = h.poller.run_tick(&mut state, &mut history);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "DAI");
    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].asset.symbol, "USDT");
}

// =========================================================================
// Test Suite: Alerts
// =========================================================================

#[test]
fn test_same_rounded_apy_alerts_once() {
    let mut h = harness(&["USDT"], 1_008_000, None, false);
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let first = h.poller.run_tick(&mut state, &mut history);
    let second = h.poller.run_tick(&mut state, &mut history);

    assert_eq!(first.alerts_sent, 1);
    assert_eq!(second.alerts_sent, 0);
    assert_eq!(h.alert_attempts.get(), 1);
    assert_eq!(state.last_alerted.get("USDT").map(String::as_str), Some("0.42"));
    assert_eq!(history.rows.len(), 2);
}

#[test]
fn test_failed_send_leaves_state_unchanged() {
    let mut h = harness(&["USDT"], 1_008_000, None, true);
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let report = h.poller.run_tick(&mut state, &mut history);
    assert_eq!(report.alerts_sent, 0);
    assert!(state.last_alerted.is_empty());

    // Retried on the next tick
    h.poller.run_tick(&mut state, &mut history);
    assert_eq!(h.alert_attempts.get(), 2);
}

#[test]
fn test_below_threshold_sends_nothing() {
    // 1,002,000 back is about 10% APY
    let mut h = harness(&["USDT"], 1_002_000, None, false);
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let report = h.poller.run_tick(&mut state, &mut history);

    assert_eq!(report.runs[0].apy, 0.1043);
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(h.alert_attempts.get(), 0);
    assert_eq!(history.rows.len(), 1);
}

#[test]
fn test_no_sender_configured() {
    let quote_calls = Rc::new(RefCell::new(Vec::new()));
    let mut poller: ApyPoller<FakeQuotes, FakeVault, FakeSender> = ApyPoller::new(
        config(&["USDT"]),
        FakeQuotes { calls: quote_calls, fail_sell_token: None, final_amount: 1_008_000 },
        FakeVault { calls: Rc::new(Cell::new(0)) },
        None,
    );
    let mut state = AlertState::default();
    let mut history = MemoryHistory::default();

    let report = poller.run_tick(&mut state, &mut history);

    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.alerts_sent, 0);
    assert!(state.last_alerted.is_empty());
}
