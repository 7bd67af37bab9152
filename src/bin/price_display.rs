// price_display.rs - Desktop window showing one token price from the token-list API
//
// Usage:
//   cargo run --bin price_display                   # AO price
//   cargo run --bin price_display -- --symbol AR    # Another symbol

use anyhow::Result;
use clap::Parser;
use eframe::egui;
use egui::{Color32, RichText};

use smartmoney_tagger::logging::init_logging;
use smartmoney_tagger::price_feed::{LogPane, PriceFeed};
use smartmoney_tagger::settings::{DEFAULT_PRICE_SYMBOL, TOKEN_LIST_URL, WINDOW_TITLE};

#[derive(Parser)]
#[command(name = "price_display")]
#[command(about = "Show a token price in a small desktop window")]
struct Args {
    /// Token symbol to look up
    #[arg(long, default_value = DEFAULT_PRICE_SYMBOL)]
    symbol: String,

    /// Token-list endpoint
    #[arg(long, default_value = TOKEN_LIST_URL)]
    url: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,
}

struct PriceApp {
    feed: PriceFeed,
    label: String,
    log: LogPane,
}

impl PriceApp {
    fn new(feed: PriceFeed) -> Self {
        let label = format!("{} price: --", feed.symbol());
        Self {
            feed,
            label,
            log: LogPane::new(),
        }
    }

    fn refresh(&mut self) {
        let outcome = self.feed.refresh(&mut self.log);
        self.label = outcome.label(self.feed.symbol());
    }
}

impl eframe::App for PriceApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                let button = egui::Button::new(RichText::new("Get price").strong().color(Color32::WHITE))
                    .fill(Color32::from_rgb(0x21, 0x96, 0xF3))
                    .min_size(egui::vec2(120.0, 40.0));
                if ui.add(button).clicked() {
                    self.refresh();
                }
                ui.add_space(12.0);
                ui.label(RichText::new(&self.label).size(16.0).strong());
            });

            ui.separator();

            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for line in self.log.lines() {
                        let (r, g, b) = line.level.rgb();
                        ui.colored_label(Color32::from_rgb(r, g, b), RichText::new(&line.text).monospace());
                    }
                });
        });
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let feed = PriceFeed::new(&args.url, &args.symbol)?;
    let app = PriceApp::new(feed);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([520.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(WINDOW_TITLE, native_options, Box::new(|_cc| Box::new(app)))
        .map_err(|e| anyhow::anyhow!("eframe error: {e}"))?;
    Ok(())
}
