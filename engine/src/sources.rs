//! FILENAME: engine/src/sources.rs
//! PURPOSE: Injected collaborator interfaces and the in-memory cell store.
//! CONTEXT: The evaluator never performs I/O itself. Cell lookups, stock
//! quotes, and table loads all go through these traits, which the hosting
//! program implements and passes to the evaluator constructor. Collaborator
//! failures are recoverable: the evaluator records the message and the
//! offending function evaluates to NaN.

use std::cell::RefCell;
use std::collections::HashMap;

use thiserror::Error;

use crate::table::DataTable;
use parser::ast::CellCoord;
use parser::lexer::parse_address;

/// Errors surfaced by injected collaborators.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed table data: {0}")]
    Malformed(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a cell address to its numeric value.
/// Returning None means the cell is empty or unknown; a bare reference to
/// such a cell evaluates to NaN, while range reducers skip it.
pub trait CellSource {
    fn read(&self, col: u32, row: u32) -> Option<f64>;
}

/// Fetches the raw quote text for a ticker symbol.
/// The evaluator parses the returned body as a decimal.
pub trait QuoteSource {
    fn fetch(&self, symbol: &str) -> Result<String, SourceError>;
}

/// Loads a named data table for DATA() / GETDATAVAL().
pub trait TableLoader {
    fn load(&self, name: &str) -> Result<DataTable, SourceError>;
}

/// A simple in-memory cell store keyed by (col, row).
/// Interior mutability lets a host keep one long-lived evaluator borrowing
/// the sheet while still poking values into it between formulas.
#[derive(Debug, Default)]
pub struct SheetSource {
    cells: RefCell<HashMap<(u32, u32), f64>>,
}

impl SheetSource {
    pub fn new() -> Self {
        SheetSource::default()
    }

    /// Stores a value at a (col, row) coordinate.
    pub fn set(&self, col: u32, row: u32, value: f64) {
        self.cells.borrow_mut().insert((col, row), value);
    }

    /// Stores a value at an A1-style address like "B12".
    /// Returns false when the address does not parse.
    pub fn set_addr(&self, addr: &str, value: f64) -> bool {
        match parse_address(addr) {
            Some(CellCoord { col, row }) => {
                self.set(col, row, value);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.cells.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }
}

impl CellSource for SheetSource {
    fn read(&self, col: u32, row: u32) -> Option<f64> {
        self.cells.borrow().get(&(col, row)).copied()
    }
}
