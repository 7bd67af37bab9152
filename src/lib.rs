/// Smart-money wallet tagging, stake/unstake APY polling, and token price lookup.
///
/// Three independent pipelines share this library:
/// - `smartmoney_tagger`: loader -> aggregator -> tagging -> report
/// - `apy_poller`: poller
/// - `price_display`: price_feed

pub mod aggregator;
pub mod config;
pub mod loader;
pub mod logging;
pub mod models;
pub mod poller;
pub mod price_feed;
pub mod report;
pub mod settings;
pub mod tagging;

pub use aggregator::aggregate;
pub use config::tagging::TaggingConfig;
pub use loader::{LoadError, RawTable};
pub use models::{OutputRow, TradeRecord, WalletStats};
pub use tagging::{TagOutcome, format_tag};
