//! CSV loading into a raw string table
//!
//! Every cell stays a string until the schema decides how to read it.
//! Ragged rows are normalized to the header width.

use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::config::CleaningConfig;
use crate::errors::{PipelineError, Result};

/// Header plus data rows, all cells as strings
#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table from an already split header and rows.
    ///
    /// Short rows are padded with empty cells; surplus trailing cells are dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Parse CSV text. The first record is the header.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// Load a CSV file from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Parse CSV from any reader. The first record is the header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = csv_reader.records();
        let header = match records.next() {
            Some(record) => record?,
            None => return Err(PipelineError::EmptyInput),
        };

        let headers: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = if i == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name
                };
                name.trim().to_string()
            })
            .collect();

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(columns = headers.len(), rows = rows.len(), "parsed csv");
        Ok(Self::new(headers, rows))
    }

    /// Raw header cells (possibly blank)
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Get number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns (header width)
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn row(&self, index: usize) -> &[String] {
        &self.rows[index]
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        &self.rows[row][column]
    }

    /// Cells of one column, in row order
    pub fn column(&self, column: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row[column].as_str())
    }

    /// Apply the configured upload cleaning steps
    pub fn clean(&mut self, config: &CleaningConfig) {
        if config.drop_unnamed_columns {
            self.drop_unnamed_columns();
        }
        if let Some(max_missing) = config.max_missing_fraction {
            self.drop_sparse_columns(max_missing);
        }
    }

    /// Remove columns whose header cell is blank (typically exported row indices)
    pub fn drop_unnamed_columns(&mut self) -> usize {
        let keep: Vec<bool> = self.headers.iter().map(|h| !h.trim().is_empty()).collect();
        self.retain_columns(&keep)
    }

    /// Remove columns whose fraction of blank cells exceeds `max_missing_fraction`
    pub fn drop_sparse_columns(&mut self, max_missing_fraction: f64) -> usize {
        if self.rows.is_empty() {
            return 0;
        }
        let total = self.rows.len() as f64;
        let keep: Vec<bool> = (0..self.width())
            .map(|col| {
                let missing = self.column(col).filter(|v| v.trim().is_empty()).count();
                (missing as f64 / total) <= max_missing_fraction
            })
            .collect();
        self.retain_columns(&keep)
    }

    fn retain_columns(&mut self, keep: &[bool]) -> usize {
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped == 0 {
            return 0;
        }

        let filter = |cells: &mut Vec<String>| {
            let mut idx = 0;
            cells.retain(|_| {
                let kept = keep[idx];
                idx += 1;
                kept
            });
        };

        for (name, kept) in self.headers.iter().zip(keep) {
            if !kept {
                info!(column = %name, "dropping column during cleaning");
            }
        }
        filter(&mut self.headers);
        for row in &mut self.rows {
            filter(row);
        }
        dropped
    }
}
