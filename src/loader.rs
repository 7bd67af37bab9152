//! Spreadsheet loading and cell coercion
//!
//! Reads `.xlsx`/`.xls`/`.ods` workbooks through calamine and `.csv` files
//! through the csv crate into a [`RawTable`]. Headers are trimmed and
//! lowercased, so required columns match case-insensitively.
//! [`parse_records`] then coerces the table into typed [`TradeRecord`]s.
//! Unusable cells become `None` instead of failing the load.

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::tagging::{ColumnNames, ErrorThresholds, TaggingConfig};
use crate::models::TradeRecord;

const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];
const MAX_LISTING: usize = 20;

/// Fatal input-validation failures
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file {} does not exist (directory contains: {listing})", path.display())]
    NotFound { path: PathBuf, listing: String },

    #[error("failed to read {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("{} contains no data rows", path.display())]
    Empty { path: PathBuf },

    #[error("input is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Cell value before column-specific coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl From<&Data> for RawCell {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => RawCell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
            Data::Float(f) => RawCell::Number(*f),
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Bool(b) => RawCell::Bool(*b),
            Data::DateTime(dt) => dt.as_datetime().map(RawCell::DateTime).unwrap_or(RawCell::Empty),
        }
    }
}

/// Headers (normalized) plus data rows, every row padded to the header width
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawCell>>) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|c| *c != RawCell::Empty))
            .map(|mut row| {
                row.resize(width, RawCell::Empty);
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);
        self.headers.iter().position(|h| *h == wanted)
    }

    /// Required columns absent from the header row, in configured order
    pub fn missing_columns(&self, columns: &ColumnNames) -> Vec<String> {
        columns
            .required()
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}

// ============================================================================
// Table Loading
// ============================================================================

/// Read a spreadsheet and validate it has data and every required column
pub fn load_table(path: &Path, columns: &ColumnNames) -> Result<RawTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
            listing: directory_listing(path),
        });
    }

    if let Ok(meta) = fs::metadata(path) {
        debug!(path = %path.display(), bytes = meta.len(), "Input file found");
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let table = if extension == "csv" {
        read_csv(path)?
    } else {
        if !WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            warn!(
                path = %path.display(),
                "File extension is not a known spreadsheet format; attempting to read it as a workbook"
            );
        }
        read_workbook(path)?
    };

    if table.is_empty() {
        return Err(LoadError::Empty { path: path.to_path_buf() });
    }

    let missing = table.missing_columns(columns);
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    debug!(headers = ?table.headers, rows = table.len(), "Loaded input table");
    Ok(table)
}

fn directory_listing(path: &Path) -> String {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match fs::read_dir(dir) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            if names.len() > MAX_LISTING {
                let extra = names.len() - MAX_LISTING;
                names.truncate(MAX_LISTING);
                names.push(format!("... {} more", extra));
            }
            names.join(", ")
        }
        Err(_) => format!("<{} unreadable>", dir.display()),
    }
}

fn read_csv(path: &Path) -> Result<RawTable, LoadError> {
    let parse_err = |reason: String| LoadError::Parse { path: path.to_path_buf(), reason };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| parse_err(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| parse_err(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| parse_err(format!("line {}: {}", line + 2, e)))?;
        let row = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable::new(headers, rows))
}

fn read_workbook(path: &Path) -> Result<RawTable, LoadError> {
    let parse_err = |reason: String| LoadError::Parse { path: path.to_path_buf(), reason };

    let mut workbook = open_workbook_auto(path).map_err(|e| parse_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_err("workbook has no worksheets".to_string()))?
        .map_err(|e| parse_err(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.clone(),
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
        None => return Err(LoadError::Empty { path: path.to_path_buf() }),
    };

    let data = rows.map(|row| row.iter().map(RawCell::from).collect()).collect();
    Ok(RawTable::new(headers, data))
}

// ============================================================================
// Cell Coercion
// ============================================================================

/// Numeric coercion: strips thousands separators, treats `N/A` as null
pub fn coerce_number(cell: &RawCell) -> Option<f64> {
    match cell {
        RawCell::Number(n) => n.is_finite().then_some(*n),
        RawCell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        RawCell::Text(s) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '，').collect();
            let cleaned = cleaned.trim();
            if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("n/a") || cleaned.eq_ignore_ascii_case("nan") {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        RawCell::Empty | RawCell::DateTime(_) => None,
    }
}

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Permissive time coercion; the 1970-01-01 sentinel is treated as missing
pub fn coerce_time(cell: &RawCell) -> Option<NaiveDateTime> {
    let parsed = match cell {
        RawCell::DateTime(dt) => Some(*dt),
        RawCell::Number(n) => time_from_number(*n),
        RawCell::Text(s) => parse_time_text(s),
        RawCell::Empty | RawCell::Bool(_) => None,
    }?;
    (!is_epoch_sentinel(&parsed)).then_some(parsed)
}

fn parse_time_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("n/a") {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    text.parse::<f64>().ok().and_then(time_from_number)
}

/// Unix millis, unix seconds, or an Excel serial day number
fn time_from_number(n: f64) -> Option<NaiveDateTime> {
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    if n >= 1e12 {
        DateTime::from_timestamp_millis(n as i64).map(|d| d.naive_utc())
    } else if n >= 1e9 {
        DateTime::from_timestamp(n as i64, 0).map(|d| d.naive_utc())
    } else if (20_000.0..100_000.0).contains(&n) {
        let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
        let millis = (n * 86_400_000.0).round() as i64;
        base.checked_add_signed(chrono::Duration::milliseconds(millis))
    } else {
        None
    }
}

fn is_epoch_sentinel(dt: &NaiveDateTime) -> bool {
    NaiveDate::from_ymd_opt(1970, 1, 1).is_some_and(|epoch| dt.date() == epoch)
}

pub fn coerce_flag(cell: &RawCell) -> Option<bool> {
    match cell {
        RawCell::Bool(b) => Some(*b),
        RawCell::Number(n) => Some(*n != 0.0),
        RawCell::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "是" => Some(true),
            "false" | "0" | "no" | "n" | "否" => Some(false),
            _ => None,
        },
        RawCell::Empty | RawCell::DateTime(_) => None,
    }
}

pub fn coerce_text(cell: &RawCell) -> String {
    match cell {
        RawCell::Empty => String::new(),
        RawCell::Text(s) => s.trim().to_string(),
        RawCell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{:.0}", n),
        RawCell::Number(n) => n.to_string(),
        RawCell::Bool(b) => b.to_string(),
        RawCell::DateTime(dt) => dt.to_string(),
    }
}

// ============================================================================
// Record Parsing
// ============================================================================

struct ColumnIndexes {
    contract: usize,
    address: usize,
    sol_balance: usize,
    pump_to_buy: usize,
    buy_time: usize,
    sell_time: usize,
    last_active: usize,
    holding_time: usize,
    buy_amount: usize,
    sell_amount: usize,
    buy_count: usize,
    sell_count: usize,
    realized_profit: usize,
    unrealized_profit: usize,
    profit_rank: usize,
    is_suspicious: usize,
}

impl ColumnIndexes {
    fn resolve(table: &RawTable, columns: &ColumnNames) -> Result<Self, LoadError> {
        let missing = table.missing_columns(columns);
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }
        // Presence was checked above
        let idx = |name: &str| table.column_index(name).unwrap_or_default();
        Ok(Self {
            contract: idx(&columns.contract),
            address: idx(&columns.address),
            sol_balance: idx(&columns.sol_balance),
            pump_to_buy: idx(&columns.pump_to_buy),
            buy_time: idx(&columns.buy_time),
            sell_time: idx(&columns.sell_time),
            last_active: idx(&columns.last_active_time),
            holding_time: idx(&columns.holding_time),
            buy_amount: idx(&columns.buy_amount),
            sell_amount: idx(&columns.sell_amount),
            buy_count: idx(&columns.buy_count),
            sell_count: idx(&columns.sell_count),
            realized_profit: idx(&columns.realized_profit),
            unrealized_profit: idx(&columns.unrealized_profit),
            profit_rank: idx(&columns.profit_rank),
            is_suspicious: idx(&columns.is_suspicious),
        })
    }
}

/// Coerce every row into a [`TradeRecord`]; rows without an address are skipped
pub fn parse_records(table: &RawTable, columns: &ColumnNames) -> Result<Vec<TradeRecord>, LoadError> {
    let ix = ColumnIndexes::resolve(table, columns)?;

    let numeric = [
        (ix.sol_balance, columns.sol_balance.as_str()),
        (ix.pump_to_buy, columns.pump_to_buy.as_str()),
        (ix.holding_time, columns.holding_time.as_str()),
        (ix.buy_amount, columns.buy_amount.as_str()),
        (ix.sell_amount, columns.sell_amount.as_str()),
        (ix.buy_count, columns.buy_count.as_str()),
        (ix.sell_count, columns.sell_count.as_str()),
        (ix.realized_profit, columns.realized_profit.as_str()),
        (ix.unrealized_profit, columns.unrealized_profit.as_str()),
        (ix.profit_rank, columns.profit_rank.as_str()),
    ];
    report_null_counts(table, &numeric, coerce_number, "numeric");

    let times = [
        (ix.buy_time, columns.buy_time.as_str()),
        (ix.sell_time, columns.sell_time.as_str()),
        (ix.last_active, columns.last_active_time.as_str()),
    ];
    report_null_counts(table, &times, coerce_time, "time");

    let mut records = Vec::with_capacity(table.len());
    let mut missing_address = 0usize;

    for row in &table.rows {
        let address = coerce_text(&row[ix.address]);
        if address.is_empty() {
            missing_address += 1;
            continue;
        }

        records.push(TradeRecord {
            contract: coerce_text(&row[ix.contract]),
            address,
            sol_balance: coerce_number(&row[ix.sol_balance]),
            pump_to_buy_secs: coerce_number(&row[ix.pump_to_buy]),
            buy_time: coerce_time(&row[ix.buy_time]),
            sell_time: coerce_time(&row[ix.sell_time]),
            last_active: coerce_time(&row[ix.last_active]),
            holding_minutes: coerce_number(&row[ix.holding_time]),
            buy_amount: coerce_number(&row[ix.buy_amount]),
            sell_amount: coerce_number(&row[ix.sell_amount]),
            buy_count: coerce_number(&row[ix.buy_count]),
            sell_count: coerce_number(&row[ix.sell_count]),
            realized_profit: coerce_number(&row[ix.realized_profit]),
            unrealized_profit: coerce_number(&row[ix.unrealized_profit]),
            profit_rank: coerce_number(&row[ix.profit_rank]),
            is_suspicious: coerce_flag(&row[ix.is_suspicious]),
        });
    }

    if missing_address > 0 {
        warn!(rows = missing_address, column = %columns.address, "Skipped rows without a wallet address");
    }

    Ok(records)
}

fn report_null_counts<T>(
    table: &RawTable,
    columns: &[(usize, &str)],
    coerce: fn(&RawCell) -> Option<T>,
    kind: &str,
) {
    for (idx, name) in columns {
        let mut nulls = 0usize;
        let mut samples = Vec::new();
        for row in &table.rows {
            let cell = &row[*idx];
            if coerce(cell).is_none() {
                nulls += 1;
                if samples.len() < 5 {
                    samples.push(coerce_text(cell));
                }
            }
        }
        if nulls > 0 {
            warn!(column = %name, kind, nulls, samples = ?samples, "Column has null or unparseable values");
        } else {
            debug!(column = %name, kind, "Column fully parsed");
        }
    }
}

// ============================================================================
// Row Policy
// ============================================================================

/// Counts from the balance/suspicious row policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowPolicyReport {
    pub low_balance: usize,
    pub suspicious: usize,
    pub dropped: usize,
}

/// Drop (or only count) rows under the balance floor or flagged suspicious
pub fn apply_row_policy(
    records: Vec<TradeRecord>,
    drop_flagged_rows: bool,
    thresholds: &ErrorThresholds,
) -> (Vec<TradeRecord>, RowPolicyReport) {
    let mut report = RowPolicyReport::default();
    let mut kept = Vec::with_capacity(records.len());

    for record in records {
        let low_balance = thresholds.min_sol_balance > 0.0
            && record.sol_balance.unwrap_or(0.0) < thresholds.min_sol_balance;
        let suspicious = thresholds.exclude_suspicious && record.flagged_suspicious();

        if low_balance {
            report.low_balance += 1;
        }
        if suspicious {
            report.suspicious += 1;
        }

        if drop_flagged_rows && (low_balance || suspicious) {
            report.dropped += 1;
        } else {
            kept.push(record);
        }
    }

    if drop_flagged_rows {
        info!(
            low_balance = report.low_balance,
            suspicious = report.suspicious,
            dropped = report.dropped,
            "Dropped flagged rows"
        );
    } else if report.low_balance > 0 || report.suspicious > 0 {
        info!(
            low_balance = report.low_balance,
            suspicious = report.suspicious,
            "Flagged rows kept (tag formatter reports them)"
        );
    }

    (kept, report)
}

/// Load, coerce and filter in one step
pub fn load_trade_records(
    path: &Path,
    config: &TaggingConfig,
) -> Result<(Vec<TradeRecord>, RowPolicyReport), LoadError> {
    let table = load_table(path, &config.columns)?;
    let records = parse_records(&table, &config.columns)?;
    info!(path = %path.display(), rows = table.len(), records = records.len(), "Parsed trade records");
    Ok(apply_row_policy(records, config.drop_flagged_rows, &config.error_thresholds))
}
