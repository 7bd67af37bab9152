//! APY history workbook
//!
//! Each successful asset run becomes one row. The file is read back, the new
//! row is placed on top, and the whole sheet is rewritten. Rows whose APY is
//! above the alert threshold are painted red.

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::{Color, Format, Workbook};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::AssetRun;

pub const HISTORY_HEADERS: [&str; 8] = ["时间(北京时间)", "基础资产", "投入金额", "sUSDe数量", "USDe数量", "最终金额", "利润", "APY"];

/// Destination for completed asset runs
pub trait HistorySink {
    fn record(&mut self, run: &AssetRun) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub timestamp: String,
    pub base_asset: String,
    pub initial_amount: f64,
    pub susde_amount: f64,
    pub usde_amount: f64,
    pub final_amount: f64,
    pub profit: f64,
    pub apy: f64,
}

impl From<&AssetRun> for HistoryRow {
    fn from(run: &AssetRun) -> Self {
        Self {
            timestamp: run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            base_asset: run.asset.symbol.to_string(),
            initial_amount: run.initial_amount,
            susde_amount: run.susde_amount,
            usde_amount: run.usde_amount,
            final_amount: run.final_amount,
            profit: run.profit,
            apy: run.apy,
        }
    }
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.clone(),
        Some(Data::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn cell_number(cell: Option<&Data>) -> f64 {
    match cell {
        Some(Data::Float(f)) => *f,
        Some(Data::Int(i)) => *i as f64,
        Some(Data::String(s)) => {
            let text = s.trim().replace(',', "");
            match text.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().map(|v| v / 100.0).unwrap_or(0.0),
                None => text.parse().unwrap_or(0.0),
            }
        }
        _ => 0.0,
    }
}

const AMOUNT_FORMAT: &str = "#,##0.00";
const PERCENT_FORMAT: &str = "0.00%";

/// Cell formats for one history row; red font when the APY beat the threshold
#[derive(Debug, Clone, PartialEq)]
struct RowFormats {
    text: Format,
    amount: Format,
    percent: Format,
}

fn is_highlighted(apy: f64, threshold: f64) -> bool {
    apy > threshold
}

impl RowFormats {
    fn new(highlight: bool) -> Self {
        let text = Format::new();
        let amount = Format::new().set_num_format(AMOUNT_FORMAT);
        let percent = Format::new().set_num_format(PERCENT_FORMAT);
        if highlight {
            Self {
                text: text.set_font_color(Color::Red),
                amount: amount.set_font_color(Color::Red),
                percent: percent.set_font_color(Color::Red),
            }
        } else {
            Self { text, amount, percent }
        }
    }
}

pub struct HistoryBook {
    path: PathBuf,
    apy_threshold: f64,
}

impl HistoryBook {
    pub fn new(path: impl Into<PathBuf>, apy_threshold: f64) -> Self {
        Self { path: path.into(), apy_threshold }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Existing rows, newest first; empty when the file does not exist yet
    pub fn read_rows(&self) -> Result<Vec<HistoryRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut workbook = open_workbook_auto(&self.path)
            .with_context(|| format!("Failed to open history {}", self.path.display()))?;
        let range = workbook
            .worksheet_range_at(0)
            .context("History workbook has no worksheets")?
            .with_context(|| format!("Failed to read history {}", self.path.display()))?;

        let rows = range
            .rows()
            .skip(1)
            .filter(|row| row.iter().any(|c| *c != Data::Empty))
            .map(|row| HistoryRow {
                timestamp: cell_text(row.first()),
                base_asset: cell_text(row.get(1)),
                initial_amount: cell_number(row.get(2)),
                susde_amount: cell_number(row.get(3)),
                usde_amount: cell_number(row.get(4)),
                final_amount: cell_number(row.get(5)),
                profit: cell_number(row.get(6)),
                apy: cell_number(row.get(7)),
            })
            .collect();
        Ok(rows)
    }

    fn write_rows(&self, rows: &[HistoryRow]) -> Result<()> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        let bold = Format::new().set_bold();
        let hot = RowFormats::new(true);
        let cool = RowFormats::new(false);

        for (col, header) in HISTORY_HEADERS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &bold)?;
        }

        for (i, row) in rows.iter().enumerate() {
            let r = (i + 1) as u32;
            let formats = if is_highlighted(row.apy, self.apy_threshold) { &hot } else { &cool };
            let (text, num, pct) = (&formats.text, &formats.amount, &formats.percent);

            sheet.write_string_with_format(r, 0, &row.timestamp, text)?;
            sheet.write_string_with_format(r, 1, &row.base_asset, text)?;
            sheet.write_number_with_format(r, 2, row.initial_amount, num)?;
            sheet.write_number_with_format(r, 3, row.susde_amount, num)?;
            sheet.write_number_with_format(r, 4, row.usde_amount, num)?;
            sheet.write_number_with_format(r, 5, row.final_amount, num)?;
            sheet.write_number_with_format(r, 6, row.profit, num)?;
            sheet.write_number_with_format(r, 7, row.apy, pct)?;
        }

        sheet.autofit();
        workbook
            .save(&self.path)
            .with_context(|| format!("Failed to save history {}", self.path.display()))?;
        Ok(())
    }
}

impl HistorySink for HistoryBook {
    fn record(&mut self, run: &AssetRun) -> Result<()> {
        let mut rows = self.read_rows()?;
        rows.insert(0, HistoryRow::from(run));
        self.write_rows(&rows)?;
        debug!(path = %self.path.display(), rows = rows.len(), "History updated");
        Ok(())
    }
}
