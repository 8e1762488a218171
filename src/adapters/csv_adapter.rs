//! CSV bar file adapter.
//!
//! Expected header: `timestamp,open,high,low,close,volume[,closed]`.
//! Timestamps are `%Y-%m-%d %H:%M:%S` or a bare `%Y-%m-%d` (midnight).
//! The optional `closed` column marks forming bars; it defaults to true.
//! Rows are returned in file order so the engine's ordering check sees
//! the data exactly as recorded.

use crate::domain::error::FutcoreError;
use crate::domain::observation::{Bar, Observation};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Vec<Observation>, FutcoreError> {
        let content = fs::read_to_string(&self.path).map_err(|e| FutcoreError::DataFeed {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let line = row + 2;
            let record = result.map_err(|e| FutcoreError::DataFeed {
                reason: format!("CSV parse error: {}", e),
            })?;

            let ts_str = record.get(0).ok_or_else(|| FutcoreError::DataFeed {
                reason: format!("line {}: missing timestamp column", line),
            })?;
            let start = parse_timestamp(ts_str).ok_or_else(|| FutcoreError::DataFeed {
                reason: format!("line {}: invalid timestamp '{}'", line, ts_str),
            })?;

            let open = parse_price(&record, 1, "open", line)?;
            let high = parse_price(&record, 2, "high", line)?;
            let low = parse_price(&record, 3, "low", line)?;
            let close = parse_price(&record, 4, "close", line)?;

            let volume: i64 = record
                .get(5)
                .ok_or_else(|| FutcoreError::DataFeed {
                    reason: format!("line {}: missing volume column", line),
                })?
                .parse()
                .map_err(|e| FutcoreError::DataFeed {
                    reason: format!("line {}: invalid volume value: {}", line, e),
                })?;

            let is_closed = match record.get(6) {
                None | Some("") => true,
                Some(flag) => parse_flag(flag).ok_or_else(|| FutcoreError::DataFeed {
                    reason: format!("line {}: invalid closed flag '{}'", line, flag),
                })?,
            };

            if high < low {
                return Err(FutcoreError::DataFeed {
                    reason: format!("line {}: high {} below low {}", line, high, low),
                });
            }

            bars.push(Observation::Bar(Bar {
                start,
                open,
                high,
                low,
                close,
                volume,
                is_closed,
            }));
        }

        Ok(bars)
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_price(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<f64, FutcoreError> {
    let value: f64 = record
        .get(index)
        .ok_or_else(|| FutcoreError::DataFeed {
            reason: format!("line {}: missing {} column", line, name),
        })?
        .parse()
        .map_err(|e| FutcoreError::DataFeed {
            reason: format!("line {}: invalid {} value: {}", line, name, e),
        })?;
    if !value.is_finite() {
        return Err(FutcoreError::DataFeed {
            reason: format!("line {}: {} is not finite", line, name),
        });
    }
    Ok(value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
