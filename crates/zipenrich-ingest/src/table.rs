//! Tabular payload parsing and serialization
//!
//! Payloads are comma-delimited UTF-8 with a header row. Parsing and writing
//! share the same dialect so an untouched table round-trips unchanged.

use csv::{ReaderBuilder, WriterBuilder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Malformed table: {0}")]
    Malformed(#[from] csv::Error),

    #[error("Table has no header row")]
    MissingHeader,

    #[error("Failed to serialize table: {0}")]
    Write(String),
}

/// Header plus rows, every row as wide as the header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RecordSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Parse a payload. Rows whose width differs from the header are rejected.
    pub fn parse(data: &[u8]) -> Result<Self, TableError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(data);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(TableError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| TableError::Write(e.to_string()))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
