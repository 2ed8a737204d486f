//! Workbook abstraction: named sheets of 1-based cells.
//!
//! The pipeline only ever sees the narrow [`CellReader`] / [`TableWriter`]
//! traits. Backends:
//! - [`LibSqlWorkbook`]: persistent workbook file (libSQL)
//! - [`MemoryWorkbook`]: in-memory fake for tests

pub mod libsql_backend;
pub mod memory;
mod migrations;
pub mod recorder;

pub use libsql_backend::LibSqlWorkbook;
pub use memory::MemoryWorkbook;
pub use recorder::{PROMPT_COLUMN, REPLY_COLUMN, SheetRecorder};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::SheetError;

/// Sheet holding the run configuration.
pub const CONFIG_SHEET: &str = "CONFIG";

/// Sheet receiving prompts and replies.
pub const REPLIES_SHEET: &str = "REPLIES";

/// A 1-based cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// The cell one column to the right.
    pub fn right(self) -> Self {
        Self::new(self.row, self.column + 1)
    }

    /// The cell `n` rows below.
    pub fn down(self, n: u32) -> Self {
        Self::new(self.row + n, self.column)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.column), self.row)
    }
}

impl FromStr for CellRef {
    type Err = SheetError;

    /// Parse A1 notation (`B5`, `aa12`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SheetError::InvalidCell(s.to_string());

        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let column = letters
            .chars()
            .try_fold(0_u32, |acc, c| {
                let digit = u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1;
                acc.checked_mul(26)?.checked_add(digit)
            })
            .ok_or_else(invalid)?;
        let row: u32 = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        Ok(Self::new(row, column))
    }
}

/// Convert a 1-based column index to letters (1 → A, 27 → AA).
fn column_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Read access to workbook cells.
#[async_trait]
pub trait CellReader: Send + Sync {
    /// Value of a cell, `None` when the sheet or the cell is absent.
    async fn read_cell(&self, sheet: &str, cell: CellRef) -> Result<Option<String>, SheetError>;
}

/// Write access to workbook cells.
#[async_trait]
pub trait TableWriter: Send + Sync {
    /// Whether a sheet with this exact name exists.
    async fn sheet_exists(&self, sheet: &str) -> Result<bool, SheetError>;

    /// Overwrite a single cell. Fails if the sheet does not exist.
    async fn write_cell(&self, sheet: &str, cell: CellRef, value: &str) -> Result<(), SheetError>;

    /// Overwrite consecutive rows of one column, starting at `start`.
    async fn write_column(
        &self,
        sheet: &str,
        start: CellRef,
        values: &[String],
    ) -> Result<(), SheetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_cell() {
        let cell: CellRef = "B5".parse().unwrap();
        assert_eq!(cell, CellRef::new(5, 2));
    }

    #[test]
    fn parse_lowercase_and_double_letters() {
        assert_eq!("aa12".parse::<CellRef>().unwrap(), CellRef::new(12, 27));
        assert_eq!("AZ1".parse::<CellRef>().unwrap(), CellRef::new(1, 52));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<CellRef>().is_err());
        assert!("12".parse::<CellRef>().is_err());
        assert!("B".parse::<CellRef>().is_err());
        assert!("B0".parse::<CellRef>().is_err());
        assert!("B5x".parse::<CellRef>().is_err());
        assert!("5B".parse::<CellRef>().is_err());
    }

    #[test]
    fn display_matches_a1() {
        assert_eq!(CellRef::new(2, 1).to_string(), "A2");
        assert_eq!(CellRef::new(8, 26).to_string(), "Z8");
        assert_eq!(CellRef::new(3, 28).to_string(), "AB3");
    }

    #[test]
    fn right_and_down() {
        let cell = CellRef::new(4, 1);
        assert_eq!(cell.right(), CellRef::new(4, 2));
        assert_eq!(cell.down(3), CellRef::new(7, 1));
    }
}
