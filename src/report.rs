//! Report Writer
//!
//! Sorts tagged rows and writes them to an xlsx workbook (or a csv file when
//! the output path ends in `.csv`). Styling is best-effort: if the styled
//! workbook cannot be saved, the same data is saved again without formats.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime};
use rust_xlsxwriter::{Color, Format, Workbook, XlsxError};
use tracing::{info, warn};

use crate::config::tagging::{SortField, SortKey, TaggingConfig};
use crate::models::{OutputRow, WalletStats};
use crate::settings::{PROFIT_INVALID_MARKER, REPORT_FONT_NAME, REPORT_FONT_SIZE, REPORT_ZOOM, TAG_ERROR_MARKER};
use crate::tagging::{format_number, format_tag};

pub const REPORT_HEADERS: [&str; 6] = ["地址", "用户标签", "统计结果", "最后活跃时间", "阀值说明", "排序依据"];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Tag every wallet, one row per bundle
pub fn build_rows(stats: Vec<WalletStats>, config: &TaggingConfig) -> Vec<OutputRow> {
    stats
        .into_iter()
        .map(|s| {
            let outcome = format_tag(&s, config);
            OutputRow {
                address: s.address.clone(),
                tag: outcome.tag,
                summary: outcome.summary,
                last_active: s.last_active,
                stats: s,
            }
        })
        .collect()
}

// ============================================================================
// Sorting
// ============================================================================

fn compare_field(a: &WalletStats, b: &WalletStats, field: SortField) -> Ordering {
    match field {
        SortField::OccurrenceCount => a.occurrence_count.cmp(&b.occurrence_count),
        SortField::TotalProfit => a.total_profit.total_cmp(&b.total_profit),
        SortField::MaxMultiple => a.max_multiple.cmp(&b.max_multiple),
        SortField::Top10Count => a.top_10_count.cmp(&b.top_10_count),
        SortField::BuyCountWithin10m => a.buy_count_within_10m.cmp(&b.buy_count_within_10m),
        SortField::WinRate => a.win_rate.cmp(&b.win_rate),
        SortField::TradeCount => a.trade_count.cmp(&b.trade_count),
    }
}

/// Stable multi-key sort; later keys only break ties left by earlier ones
pub fn sort_rows(rows: &mut [OutputRow], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        keys.iter().fold(Ordering::Equal, |acc, key| {
            acc.then_with(|| {
                let ord = compare_field(&a.stats, &b.stats, key.field);
                if key.ascending { ord } else { ord.reverse() }
            })
        })
    });
}

pub fn sort_description(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|k| format!("{}（{}）", k.field.label(), if k.ascending { "顺序" } else { "倒序" }))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn threshold_description(config: &TaggingConfig) -> String {
    let t = &config.error_thresholds;
    let mut parts = vec![
        format!("最大利润:{}", format_number(t.max_profit)),
        format!("最小利润:{}", format_number(t.min_profit)),
        format!("最大倍数:{}", format_number(t.max_multiplier as f64)),
        format!("最大交易次数:{}", format_number(t.max_trade_count as f64)),
        format!("最小SOL余额:{}", t.min_sol_balance),
        format!("排除可疑:{}", if t.exclude_suspicious { "是" } else { "否" }),
    ];
    if let Some(rate) = t.min_win_rate {
        parts.push(format!("最小胜率:{}%", rate));
    }
    parts.join(",")
}

// ============================================================================
// Writing
// ============================================================================

fn is_error_text(text: &str) -> bool {
    text.contains(TAG_ERROR_MARKER) || text.contains(PROFIT_INVALID_MARKER)
}

fn is_recent(last_active: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    last_active.is_some_and(|t| now.signed_duration_since(t) <= Duration::days(1))
}

fn row_cells(row: &OutputRow, thresholds: &str, sort_basis: &str) -> [String; 6] {
    [
        row.address.clone(),
        row.tag.clone(),
        row.summary.clone(),
        row.last_active.map(|t| t.format(TIME_FORMAT).to_string()).unwrap_or_default(),
        thresholds.to_string(),
        sort_basis.to_string(),
    ]
}

const TAG_COLUMN: usize = 1;
const SUMMARY_COLUMN: usize = 2;

/// YaHei base font; red for error text, green for recently active wallets
struct ReportFormats {
    base: Format,
    error: Format,
    recent: Format,
}

impl ReportFormats {
    fn new() -> Self {
        let base = Format::new().set_font_name(REPORT_FONT_NAME).set_font_size(REPORT_FONT_SIZE);
        Self {
            error: base.clone().set_font_color(Color::Red),
            recent: base.clone().set_font_color(Color::Green),
            base,
        }
    }

    /// Format shared by every cell of the row
    fn row_format(&self, row: &OutputRow, now: NaiveDateTime) -> &Format {
        if is_recent(row.last_active, now) { &self.recent } else { &self.base }
    }

    /// Tag and summary cells turn red on error text, over the row format
    fn cell_format(&self, row: &OutputRow, col: usize, value: &str, now: NaiveDateTime) -> &Format {
        if (col == TAG_COLUMN || col == SUMMARY_COLUMN) && is_error_text(value) {
            &self.error
        } else {
            self.row_format(row, now)
        }
    }
}

fn build_workbook(
    rows: &[OutputRow],
    config: &TaggingConfig,
    now: NaiveDateTime,
    styled: bool,
) -> Result<Workbook, XlsxError> {
    let thresholds = threshold_description(config);
    let sort_basis = sort_description(&config.sort_keys);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    let formats = ReportFormats::new();

    for (col, header) in REPORT_HEADERS.iter().enumerate() {
        if styled {
            sheet.write_string_with_format(0, col as u16, *header, &formats.base)?;
        } else {
            sheet.write_string(0, col as u16, *header)?;
        }
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        let cells = row_cells(row, &thresholds, &sort_basis);
        if !styled {
            for (col, value) in cells.iter().enumerate() {
                sheet.write_string(r, col as u16, value)?;
            }
            continue;
        }

        for (col, value) in cells.iter().enumerate() {
            let format = formats.cell_format(row, col, value, now);
            sheet.write_string_with_format(r, col as u16, value, format)?;
        }
    }

    if styled {
        sheet.set_zoom(REPORT_ZOOM);
        sheet.autofit();
    }

    Ok(workbook)
}

fn write_csv(path: &Path, rows: &[OutputRow], config: &TaggingConfig) -> Result<()> {
    let thresholds = threshold_description(config);
    let sort_basis = sort_description(&config.sort_keys);

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(REPORT_HEADERS)?;
    for row in rows {
        writer.write_record(row_cells(row, &thresholds, &sort_basis))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the report, timestamping recency against the local clock
pub fn write_report(path: &Path, rows: &[OutputRow], config: &TaggingConfig) -> Result<()> {
    write_report_at(path, rows, config, Local::now().naive_local())
}

pub fn write_report_at(path: &Path, rows: &[OutputRow], config: &TaggingConfig, now: NaiveDateTime) -> Result<()> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        write_csv(path, rows, config)?;
        info!(path = %path.display(), rows = rows.len(), "Report written (csv)");
        return Ok(());
    }

    let styled = build_workbook(rows, config, now, true).and_then(|mut wb| wb.save(path));
    if let Err(e) = styled {
        warn!(error = %e, "Styled report failed; saving without formatting");
        let mut workbook = build_workbook(rows, config, now, false)
            .context("Failed to build report workbook")?;
        workbook
            .save(path)
            .with_context(|| format!("Failed to save report {}", path.display()))?;
    }

    info!(path = %path.display(), rows = rows.len(), "Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, open_workbook_auto};
    use chrono::NaiveDate;

    fn row(address: &str, occurrences: usize, profit: f64, multiple: u64) -> OutputRow {
        OutputRow {
            address: address.to_string(),
            tag: String::new(),
            summary: String::new(),
            last_active: None,
            stats: WalletStats {
                address: address.to_string(),
                occurrence_count: occurrences,
                total_profit: profit,
                max_multiple: multiple,
                ..Default::default()
            },
        }
    }

    fn addresses(rows: &[OutputRow]) -> Vec<&str> {
        rows.iter().map(|r| r.address.as_str()).collect()
    }

    #[test]
    fn test_sort_multi_key_descending() {
        let mut rows = vec![row("a", 1, 500.0, 3), row("b", 3, 100.0, 1), row("c", 3, 900.0, 1), row("d", 1, 50.0, 9)];
        let keys = [SortKey::desc(SortField::OccurrenceCount), SortKey::desc(SortField::MaxMultiple), SortKey::desc(SortField::TotalProfit)];
        sort_rows(&mut rows, &keys);
        assert_eq!(addresses(&rows), vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_sort_is_stable_on_full_ties() {
        let mut rows = vec![row("x", 2, 10.0, 1), row("y", 2, 10.0, 1), row("z", 2, 10.0, 1)];
        sort_rows(&mut rows, &[SortKey::desc(SortField::OccurrenceCount)]);
        assert_eq!(addresses(&rows), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_sort_ascending_key() {
        let mut rows = vec![row("a", 1, 300.0, 0), row("b", 1, -20.0, 0), row("c", 1, 100.0, 0)];
        sort_rows(&mut rows, &[SortKey::asc(SortField::TotalProfit)]);
        assert_eq!(addresses(&rows), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_description_default_keys() {
        let config = TaggingConfig::default();
        assert_eq!(
            sort_description(&config.sort_keys),
            "盈利次数（倒序）, 盈利倍数（倒序）, 利润排名前 10 次数（倒序）, 前 10 分钟买入次数（倒序）, 盈利金额（倒序）"
        );
        assert_eq!(sort_description(&[SortKey::asc(SortField::WinRate)]), "胜率（顺序）");
    }

    #[test]
    fn test_threshold_description() {
        let text = threshold_description(&TaggingConfig::default());
        assert!(text.starts_with("最大利润:100,000,000,最小利润:10,000"));
        assert!(text.ends_with("排除可疑:是"));

        let mut config = TaggingConfig::default();
        config.error_thresholds.min_win_rate = Some(10);
        assert!(threshold_description(&config).ends_with("最小胜率:10%"));
    }

    #[test]
    fn test_is_recent_window() {
        let now = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert!(is_recent(Some(now - Duration::hours(23)), now));
        assert!(!is_recent(Some(now - Duration::hours(25)), now));
        assert!(!is_recent(None, now));
    }

    #[test]
    fn test_report_formats_font_and_colors() {
        let base = Format::new().set_font_name("Microsoft YaHei").set_font_size(11.0);
        let formats = ReportFormats::new();
        assert_eq!(formats.base, base);
        assert_eq!(formats.error, base.clone().set_font_color(Color::Red));
        assert_eq!(formats.recent, base.set_font_color(Color::Green));
        assert_eq!(REPORT_ZOOM, 120);
    }

    #[test]
    fn test_recent_rows_are_green() {
        let now = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let formats = ReportFormats::new();
        let mut recent = row("addr1", 1, 0.0, 0);
        recent.last_active = Some(now - Duration::hours(2));
        let mut stale = row("addr2", 1, 0.0, 0);
        stale.last_active = Some(now - Duration::days(3));

        assert_eq!(formats.row_format(&recent, now), &formats.recent);
        assert_eq!(formats.row_format(&stale, now), &formats.base);
        assert_eq!(formats.row_format(&row("addr3", 1, 0.0, 0), now), &formats.base);
        // Address and date cells follow the row
        assert_eq!(formats.cell_format(&recent, 0, "addr1", now), &formats.recent);
    }

    #[test]
    fn test_error_text_is_red_in_tag_and_summary_only() {
        let now = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let formats = ReportFormats::new();
        let mut recent = row("addr1", 1, 0.0, 0);
        recent.last_active = Some(now);
        let error = "错误：可疑地址";

        assert_eq!(formats.cell_format(&recent, TAG_COLUMN, error, now), &formats.error);
        assert_eq!(formats.cell_format(&recent, SUMMARY_COLUMN, error, now), &formats.error);
        assert_eq!(formats.cell_format(&recent, 0, error, now), &formats.recent);
        assert_eq!(formats.cell_format(&recent, TAG_COLUMN, "赚2万交6", now), &formats.recent);
    }

    #[test]
    fn test_build_rows_one_per_wallet() {
        let stats = vec![
            WalletStats { address: "a".into(), total_profit: 100.0, ..Default::default() },
            WalletStats { address: "b".into(), total_profit: 200.0, ..Default::default() },
        ];
        let rows = build_rows(stats, &TaggingConfig::default());
        assert_eq!(addresses(&rows), vec!["a", "b"]);
        assert!(rows[0].tag.starts_with(TAG_ERROR_MARKER));
    }

    #[test]
    fn test_write_xlsx_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let mut rows = vec![row("addr1", 1, 0.0, 0), row("addr2", 2, 0.0, 0)];
        rows[0].tag = "错误：可疑地址".to_string();
        rows[1].tag = "赚2万交6".to_string();
        rows[1].last_active = NaiveDate::from_ymd_opt(2025, 2, 20).unwrap().and_hms_opt(8, 30, 0);

        write_report(&path, &rows, &TaggingConfig::default()).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        assert_eq!(range.height(), 3);
        assert_eq!(range.get((0, 0)), Some(&Data::String("地址".to_string())));
        assert_eq!(range.get((1, 1)), Some(&Data::String("错误：可疑地址".to_string())));
        assert_eq!(range.get((2, 3)), Some(&Data::String("2025-02-20 08:30:00".to_string())));
    }

    #[test]
    fn test_write_csv_when_extension_is_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        write_report(&path, &[row("addr1", 1, 0.0, 0)], &TaggingConfig::default()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, REPORT_HEADERS);
        assert_eq!(reader.records().count(), 1);
    }
}
