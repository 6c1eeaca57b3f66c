//! Feature Frame
//!
//! Time-ordered table of OHLCV and indicator columns consumed by the
//! trading environment. Values are stored row-major so a window of rows is a
//! contiguous slice.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::error::{Result, TraderError};

/// Column that every frame must carry
pub const CLOSE_COLUMN: &str = "close";

/// Column names recognised as the time reference
pub const TIME_COLUMNS: [&str; 2] = ["timestamp", "date"];

/// Immutable table of numeric features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    columns: Vec<String>,
    values: Vec<f64>,
    rows: usize,
    timestamps: Option<Vec<DateTime<Utc>>>,
}

impl FeatureFrame {
    /// Build a frame from row vectors
    ///
    /// Non-finite cells are replaced by their column mean (0 when the whole
    /// column is non-finite) with a warning.
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
        timestamps: Option<Vec<DateTime<Utc>>>,
    ) -> Result<Self> {
        let width = columns.len();
        if width == 0 {
            return Err(TraderError::Data("feature frame has no columns".into()));
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(TraderError::Data(format!("duplicate column '{name}'")));
            }
        }
        if let Some(ts) = &timestamps {
            if ts.len() != rows.len() {
                return Err(TraderError::Data(format!(
                    "timestamp count {} does not match row count {}",
                    ts.len(),
                    rows.len()
                )));
            }
        }

        let mut values = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(TraderError::Data(format!(
                    "row {i} has {} values, expected {width}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }

        let mut frame = Self {
            columns,
            values,
            rows: rows.len(),
            timestamps,
        };
        frame.fill_non_finite();
        Ok(frame)
    }

    /// Load a frame from a header CSV file
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            TraderError::Data(format!("failed to open {}: {e}", path.display()))
        })?;
        let frame = Self::from_csv_reader(file)?;
        debug!(path = %path.display(), rows = frame.len(), columns = frame.width(), "loaded feature frame");
        Ok(frame)
    }

    /// Load a frame from any CSV source
    ///
    /// A `timestamp` or `date` column becomes the time reference; every other
    /// column must be numeric. Empty or unparseable cells are mean-filled.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();

        let time_idx = headers
            .iter()
            .position(|h| TIME_COLUMNS.contains(&h.to_ascii_lowercase().as_str()));
        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != time_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut rows = Vec::new();
        let mut timestamps = time_idx.map(|_| Vec::new());
        let mut unparsed = 0usize;

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(columns.len());
            for (i, cell) in record.iter().enumerate() {
                if Some(i) == time_idx {
                    let ts = parse_timestamp(cell).ok_or_else(|| {
                        TraderError::Data(format!("row {line}: invalid timestamp '{cell}'"))
                    })?;
                    if let Some(ts_list) = timestamps.as_mut() {
                        ts_list.push(ts);
                    }
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(v) => row.push(v),
                    Err(_) => {
                        unparsed += 1;
                        row.push(f64::NAN);
                    }
                }
            }
            rows.push(row);
        }

        if unparsed > 0 {
            warn!(cells = unparsed, "non-numeric CSV cells treated as missing");
        }

        Self::new(columns, rows, timestamps)
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of numeric columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    pub fn has_time_reference(&self) -> bool {
        self.timestamps.is_some()
    }

    /// Row-major values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values of one row
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let width = self.width();
        Some(&self.values[index * width..(index + 1) * width])
    }

    /// Contiguous rows `[start, end)` flattened row-major
    pub fn rows_slice(&self, start: usize, end: usize) -> Option<&[f64]> {
        if start > end || end > self.rows {
            return None;
        }
        let width = self.width();
        Some(&self.values[start * width..end * width])
    }

    /// Value at `(row, column)`
    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        if column >= self.width() {
            return None;
        }
        self.row(row).map(|r| r[column])
    }

    /// Copy of one column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.values.iter().skip(idx).step_by(self.width()).copied().collect())
    }

    /// Close prices
    pub fn close(&self) -> Option<Vec<f64>> {
        self.column(CLOSE_COLUMN)
    }

    /// Reorder the frame to exactly `schema`
    ///
    /// The frame's columns must be the same set as `schema`.
    pub fn select(&self, schema: &[String]) -> Result<Self> {
        let missing: Vec<&str> = schema
            .iter()
            .filter(|c| !self.has_column(c))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !schema.contains(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(TraderError::config(format!(
                "feature frame columns do not match schema (missing: {missing:?}, unexpected: {extra:?})"
            )));
        }

        let indices: Vec<usize> = schema
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        if indices.len() != schema.len() {
            return Err(TraderError::config("feature schema lists a column twice"));
        }

        let width = self.width();
        let mut values = Vec::with_capacity(self.values.len());
        for row in self.values.chunks(width) {
            values.extend(indices.iter().map(|&i| row[i]));
        }

        Ok(Self {
            columns: schema.to_vec(),
            values,
            rows: self.rows,
            timestamps: self.timestamps.clone(),
        })
    }

    /// Sub-frame of rows `[start, end)`
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        let values = self
            .rows_slice(start, end)
            .ok_or_else(|| TraderError::Data(format!("row range {start}..{end} out of bounds")))?
            .to_vec();
        Ok(Self {
            columns: self.columns.clone(),
            values,
            rows: end - start,
            timestamps: self.timestamps.as_ref().map(|ts| ts[start..end].to_vec()),
        })
    }

    /// Chronological train/validation split (no shuffling)
    ///
    /// Both parts must hold at least `min_rows` rows.
    pub fn split_chronological(&self, train_ratio: f64, min_rows: usize) -> Result<(Self, Self)> {
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            return Err(TraderError::config(format!(
                "train split ratio must be in (0, 1), got {train_ratio}"
            )));
        }
        let split = (self.rows as f64 * train_ratio).floor() as usize;
        let (train_rows, val_rows) = (split, self.rows - split);
        if train_rows < min_rows || val_rows < min_rows {
            return Err(TraderError::config(format!(
                "split of {} rows gives {train_rows} train / {val_rows} validation rows, each needs at least {min_rows}",
                self.rows
            )));
        }
        Ok((self.slice(0, split)?, self.slice(split, self.rows)?))
    }

    fn fill_non_finite(&mut self) {
        let width = self.width();
        for col in 0..width {
            let (sum, count) = self
                .values
                .iter()
                .skip(col)
                .step_by(width)
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            let bad = self.rows - count;
            if bad == 0 {
                continue;
            }
            let mean = if count > 0 { sum / count as f64 } else { 0.0 };
            warn!(
                column = %self.columns[col],
                cells = bad,
                fill = mean,
                "non-finite feature values mean-filled"
            );
            for v in self.values.iter_mut().skip(col).step_by(width) {
                if !v.is_finite() {
                    *v = mean;
                }
            }
        }
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d` or epoch milliseconds
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ts));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ts| Utc.from_utc_datetime(&ts));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "timestamp,open,high,low,close,volume\n\
        2024-01-01 00:00:00,1,2,0.5,1.5,10\n\
        2024-01-01 01:00:00,1.5,2.5,1,2,\n\
        2024-01-01 02:00:00,2,3,1.5,2.5,30\n";

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_csv_load_and_mean_fill() {
        let frame = FeatureFrame::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.columns(), &columns(&["open", "high", "low", "close", "volume"])[..]);
        assert!(frame.has_time_reference());
        assert_eq!(frame.close().unwrap(), vec![1.5, 2.0, 2.5]);
        // Missing volume filled with mean of 10 and 30
        assert_eq!(frame.value(1, 4), Some(20.0));
    }

    #[test]
    fn test_csv_without_time_column() {
        let frame = FeatureFrame::from_csv_reader("close\n1\n2\n".as_bytes()).unwrap();
        assert!(!frame.has_time_reference());
    }

    #[test]
    fn test_row_width_mismatch() {
        let err = FeatureFrame::new(columns(&["a", "b"]), vec![vec![1.0]], None).unwrap_err();
        assert!(matches!(err, TraderError::Data(_)));
    }

    #[test]
    fn test_select_reorders_and_rejects_mismatch() {
        let frame =
            FeatureFrame::new(columns(&["a", "close"]), vec![vec![1.0, 2.0], vec![3.0, 4.0]], None)
                .unwrap();
        let selected = frame.select(&columns(&["close", "a"])).unwrap();
        assert_eq!(selected.values(), &[2.0, 1.0, 4.0, 3.0]);

        assert!(frame.select(&columns(&["close"])).unwrap_err().is_configuration());
        assert!(frame
            .select(&columns(&["close", "a", "b"]))
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_split_chronological() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let frame = FeatureFrame::new(columns(&["close"]), rows, None).unwrap();
        let (train, val) = frame.split_chronological(0.8, 2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val.close().unwrap(), vec![8.0, 9.0]);
        assert!(frame.split_chronological(0.8, 3).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-01T00:00:00Z").is_some());
        assert!(parse_timestamp("2024-01-01").is_some());
        assert_eq!(
            parse_timestamp("1704067200000"),
            parse_timestamp("2024-01-01 00:00:00")
        );
        assert!(parse_timestamp("yesterday").is_none());
    }
}
