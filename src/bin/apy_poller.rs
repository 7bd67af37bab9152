// apy_poller.rs - Poll sUSDe stake/unstake round-trip APY and alert on high yield
//
// Usage:
//   cargo run --bin apy_poller                      # Poll every POLL_INTERVAL_SECS (default 180)
//   cargo run --bin apy_poller -- --once            # Single tick, then exit
//   cargo run --bin apy_poller -- --interval 60     # Override the interval

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use smartmoney_tagger::logging::init_logging;
use smartmoney_tagger::poller::{
    AlertState, ApyPoller, CowQuoteClient, HistoryBook, ResendNotifier, RpcVaultReader,
};
use smartmoney_tagger::settings::{PollerConfig, SUSDE_ADDRESS};

#[derive(Parser)]
#[command(name = "apy_poller")]
#[command(about = "Poll the sUSDe round-trip APY and send e-mail alerts")]
struct Args {
    /// Run a single tick and exit
    #[arg(long)]
    once: bool,

    /// Poll interval in seconds (overrides POLL_INTERVAL_SECS)
    #[arg(long)]
    interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

type Poller = ApyPoller<CowQuoteClient, RpcVaultReader, ResendNotifier>;

fn build_poller(config: PollerConfig) -> Result<Poller> {
    let quotes = CowQuoteClient::new()?;
    let vault = RpcVaultReader::new(&config.rpc_url, SUSDE_ADDRESS)?;
    let alerts = match (&config.alert_to, config.alerts_enabled()) {
        (Some(to), true) => Some(ResendNotifier::new(config.resend_api_keys.clone(), &config.alert_from, to)?),
        _ => {
            warn!("ALERT_TO_EMAIL or RESEND_API_KEYS not set; alerts disabled");
            None
        }
    };
    Ok(ApyPoller::new(config, quotes, vault, alerts))
}

/// One blocking tick off the async runtime; state goes in and comes back out
async fn tick(
    poller: Poller,
    mut alert_state: AlertState,
    mut history: HistoryBook,
) -> Result<(Poller, AlertState, HistoryBook)> {
    tokio::task::spawn_blocking(move || {
        let mut poller = poller;
        let _report = poller.run_tick(&mut alert_state, &mut history);
        (poller, alert_state, history)
    })
    .await
    .context("Poller tick panicked")
}

/// Await `signal` once on a background task. The receiver turns true and stays
/// true, so a signal that lands mid-tick is still seen afterwards.
fn spawn_shutdown_listener<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Ctrl-C received, stopping poller");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for Ctrl-C");
                // Keep the sender alive so `changed()` never resolves
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = PollerConfig::from_env()?;
    if let Some(secs) = args.interval {
        config.poll_interval = Duration::from_secs(secs.max(1));
    }

    let state_path = config.alert_state_file.clone();
    let mut alert_state = AlertState::load(&state_path);
    let mut history = HistoryBook::new(config.history_file.clone(), config.apy_threshold);

    info!(
        assets = ?config.base_assets.iter().map(|t| t.symbol).collect::<Vec<_>>(),
        interval_secs = config.poll_interval.as_secs(),
        threshold = config.apy_threshold,
        history = %history.path().display(),
        "APY poller starting"
    );

    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Blocking HTTP clients must be created and dropped off the async runtime
    let mut poller = tokio::task::spawn_blocking(move || build_poller(config))
        .await
        .context("Poller setup panicked")??;

    let mut shutdown = spawn_shutdown_listener(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let (p, s, h) = tick(poller, alert_state, history).await?;
        poller = p;
        alert_state = s;
        history = h;

        if let Err(e) = alert_state.save(&state_path) {
            error!(error = %format!("{e:#}"), "Failed to persist alert state");
        }
        if args.once || *shutdown.borrow() {
            break;
        }
    }

    tokio::task::spawn_blocking(move || drop(poller)).await.ok();
    Ok(())
}
