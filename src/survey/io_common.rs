use chrono::{Local, NaiveDateTime, Timelike};
use std::path::Path;
use technostress_core::{MAX_SCORE, MIN_SCORE};

/// Format of the `timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// The current local time, truncated to the precision of the store.
pub fn now_timestamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Averages are displayed with 2 decimals.
pub fn format_mean(x: f64) -> String {
    format!("{:.2}", x)
}

/// A horizontal bar for a mean on the 1-5 scale: empty at 1, `width` characters wide at 5.
pub fn mean_bar(mean: f64, width: usize) -> String {
    let ratio = (mean - f64::from(MIN_SCORE)) / f64::from(MAX_SCORE - MIN_SCORE);
    let filled = (ratio * width as f64).round().clamp(0.0, width as f64) as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}
