//! FILENAME: engine/src/table.rs
//! PURPOSE: Rectangular data tables and the file-backed table loader.
//! CONTEXT: DATA("name") asks the injected loader for a table; subsequent
//! GETDATAVAL calls query it by row and column. The default loader resolves
//! the name against a base directory, parses comma-delimited files with the
//! csv crate, and falls back to whitespace-columnar splitting for anything
//! else. Short rows are padded so the table is always rectangular.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::sources::{SourceError, TableLoader};

/// A rectangular grid of string cells loaded from an external blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    rows: usize,
    cols: usize,
    cells: Vec<String>,
}

impl DataTable {
    /// Builds a table from parsed rows, padding short rows with empties.
    pub fn from_rows(parsed: Vec<Vec<String>>) -> Self {
        let rows = parsed.len();
        let cols = parsed.iter().map(Vec::len).max().unwrap_or(0);
        let mut cells = Vec::with_capacity(rows * cols);
        for mut row in parsed {
            row.resize(cols, String::new());
            cells.extend(row);
        }
        DataTable { rows, cols, cells }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells; DATA() reports this as its result.
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns the cell at (row, col), or "" when out of bounds.
    pub fn at(&self, row: usize, col: usize) -> &str {
        if row < self.rows && col < self.cols {
            &self.cells[row * self.cols + col]
        } else {
            ""
        }
    }
}

/// Loads tables from files under a base directory.
#[derive(Debug, Clone)]
pub struct FileTableLoader {
    base_dir: PathBuf,
}

impl FileTableLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileTableLoader {
            base_dir: base_dir.into(),
        }
    }
}

impl TableLoader for FileTableLoader {
    fn load(&self, name: &str) -> Result<DataTable, SourceError> {
        let path = self.base_dir.join(name);
        let raw = fs::read_to_string(&path)?;

        // Comma-delimited input goes through the csv reader; anything else
        // is split on whitespace columns.
        let table = if raw.lines().next().is_some_and(|line| line.contains(',')) {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(raw.as_bytes());
            let mut parsed = Vec::new();
            for record in reader.records() {
                let record = record.map_err(|e| SourceError::Malformed(e.to_string()))?;
                parsed.push(record.iter().map(|field| field.trim().to_string()).collect());
            }
            DataTable::from_rows(parsed)
        } else {
            DataTable::from_rows(
                raw.lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| line.split_whitespace().map(str::to_string).collect())
                    .collect(),
            )
        };

        debug!(
            path = %path.display(),
            rows = table.rows(),
            cols = table.cols(),
            "loaded data table"
        );
        Ok(table)
    }
}
