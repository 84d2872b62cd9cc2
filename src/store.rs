use crate::fluorometer::Transient;
use chrono::{DateTime, Local};
use polars::prelude::*;
use std::fs::{self, OpenOptions};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

/// File captures are appended to unless configured otherwise.
pub const DEFAULT_STORE_FILE: &str = "Open-JIP_Data.csv";

/// Character offset of the time of day within a stored timestamp.
pub const TIME_OF_DAY_OFFSET: usize = 11;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const TIMESTAMP_COLUMN_NAME: &str = "timestamp";
const TIME_COLUMN_NAME: &str = "time";
const VALUE_COLUMN_NAME: &str = "value";

// headerless reads name the columns positionally
const READ_TIMESTAMP_COLUMN: &str = "column_1";
const READ_TIME_COLUMN: &str = "column_2";
const READ_VALUE_COLUMN: &str = "column_3";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No data found in {}", path.display())]
    NoData { path: PathBuf },

    #[error("Malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Refusing to store an empty transient")]
    EmptyTransient,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Polars(#[from] PolarsError),
}

/// One persisted capture.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub timestamp: String,
    pub time: Vec<f64>,
    pub value: Vec<f64>,
}

impl StoredRecord {
    /// Time-of-day part of the timestamp, e.g. `14:03:12.503117`.
    pub fn time_of_day(&self) -> &str {
        self.timestamp.get(TIME_OF_DAY_OFFSET..).unwrap_or("")
    }
}

fn join_samples(samples: &[f64]) -> String {
    samples
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_samples(field: &str) -> Result<Vec<f64>, String> {
    field
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid sample '{s}': {e}"))
        })
        .collect()
}

/// Append-only CSV file of captured transients.
///
/// Each row is `timestamp,"t1,...,tN","v1,...,vN"`.
#[derive(Debug, Clone)]
pub struct TransientStore {
    path: PathBuf,
}

impl TransientStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a transient stamped with the current local time.
    pub fn append(&self, transient: &Transient) -> Result<String, StoreError> {
        self.append_at(transient, &Local::now())
    }

    pub fn append_at(
        &self,
        transient: &Transient,
        captured_at: &DateTime<Local>,
    ) -> Result<String, StoreError> {
        let timestamp = captured_at.format(TIMESTAMP_FORMAT).to_string();
        self.append_row(&timestamp, transient)?;
        Ok(timestamp)
    }

    fn append_row(&self, timestamp: &str, transient: &Transient) -> Result<(), StoreError> {
        if transient.is_empty() {
            return Err(StoreError::EmptyTransient);
        }

        let mut df = df!(
            TIMESTAMP_COLUMN_NAME => [timestamp],
            TIME_COLUMN_NAME => [join_samples(transient.time())],
            VALUE_COLUMN_NAME => [join_samples(transient.value())],
        )?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        CsvWriter::new(&mut file)
            .include_header(false)
            .finish(&mut df)?;

        log::debug!(
            "Appended {} samples to {}",
            transient.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read every stored capture back, oldest first.
    pub fn load_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NoData {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            return Err(StoreError::NoData {
                path: self.path.clone(),
            });
        }

        let records = text
            .lines()
            .enumerate()
            .map(|(row, line)| parse_row(row, line))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Loaded {} records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}

fn read_field<'a>(df: &'a DataFrame, name: &str, row: usize) -> Result<&'a str, StoreError> {
    df.column(name)?
        .str()?
        .get(0)
        .ok_or_else(|| StoreError::MalformedRow {
            row,
            reason: format!("missing field {name}"),
        })
}

/// Parse one stored line on its own so a bad row is reported by number.
fn parse_row(row: usize, line: &str) -> Result<StoredRecord, StoreError> {
    let malformed = |reason: String| StoreError::MalformedRow { row, reason };

    if line.trim().is_empty() {
        return Err(malformed("empty row".to_string()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(line.as_bytes()))
        .finish()
        .map_err(|e| malformed(e.to_string()))?;

    if df.width() != 3 || df.height() != 1 {
        return Err(malformed(format!("expected 3 fields, found {}", df.width())));
    }

    let timestamp = read_field(&df, READ_TIMESTAMP_COLUMN, row)?;
    let time = parse_samples(read_field(&df, READ_TIME_COLUMN, row)?).map_err(malformed)?;
    let value = parse_samples(read_field(&df, READ_VALUE_COLUMN, row)?).map_err(malformed)?;

    if time.len() != value.len() {
        return Err(malformed(format!(
            "{} time samples but {} fluorescence samples",
            time.len(),
            value.len()
        )));
    }

    Ok(StoredRecord {
        timestamp: timestamp.to_string(),
        time,
        value,
    })
}
