//! In-memory workbook: used by tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CellReader, CellRef, TableWriter};
use crate::error::SheetError;

/// Workbook kept entirely in memory.
#[derive(Default)]
pub struct MemoryWorkbook {
    sheets: Mutex<HashMap<String, BTreeMap<CellRef, String>>>,
    writes: AtomicUsize,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workbook pre-populated with empty sheets.
    pub fn with_sheets(names: &[&str]) -> Self {
        let sheets = names
            .iter()
            .map(|name| (name.to_string(), BTreeMap::new()))
            .collect();
        Self {
            sheets: Mutex::new(sheets),
            writes: AtomicUsize::new(0),
        }
    }

    /// Create a sheet if it does not exist yet.
    pub async fn create_sheet(&self, name: &str) {
        self.sheets
            .lock()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Seed a cell without counting it as a pipeline write.
    pub async fn seed(&self, sheet: &str, cell: CellRef, value: &str) {
        self.sheets
            .lock()
            .await
            .entry(sheet.to_string())
            .or_default()
            .insert(cell, value.to_string());
    }

    /// All non-empty cells of a column, ordered by row.
    pub async fn column(&self, sheet: &str, column: u32) -> Vec<(u32, String)> {
        let sheets = self.sheets.lock().await;
        sheets
            .get(sheet)
            .map(|cells| {
                cells
                    .iter()
                    .filter(|(cell, _)| cell.column == column)
                    .map(|(cell, value)| (cell.row, value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of cells written through [`TableWriter`].
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CellReader for MemoryWorkbook {
    async fn read_cell(&self, sheet: &str, cell: CellRef) -> Result<Option<String>, SheetError> {
        let sheets = self.sheets.lock().await;
        Ok(sheets.get(sheet).and_then(|cells| cells.get(&cell).cloned()))
    }
}

#[async_trait]
impl TableWriter for MemoryWorkbook {
    async fn sheet_exists(&self, sheet: &str) -> Result<bool, SheetError> {
        Ok(self.sheets.lock().await.contains_key(sheet))
    }

    async fn write_cell(&self, sheet: &str, cell: CellRef, value: &str) -> Result<(), SheetError> {
        let mut sheets = self.sheets.lock().await;
        let cells = sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::SheetNotFound(sheet.to_string()))?;
        cells.insert(cell, value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_column(
        &self,
        sheet: &str,
        start: CellRef,
        values: &[String],
    ) -> Result<(), SheetError> {
        let mut sheets = self.sheets.lock().await;
        let cells = sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::SheetNotFound(sheet.to_string()))?;
        for (offset, value) in (0_u32..).zip(values) {
            cells.insert(start.down(offset), value.clone());
        }
        self.writes.fetch_add(values.len(), Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_to_missing_sheet_fails() {
        let wb = MemoryWorkbook::new();
        let err = wb.write_cell("NOPE", CellRef::new(1, 1), "x").await;
        assert!(matches!(err, Err(SheetError::SheetNotFound(_))));
        assert_eq!(wb.write_count(), 0);
    }

    #[tokio::test]
    async fn write_column_overwrites_in_place() {
        let wb = MemoryWorkbook::with_sheets(&["S"]);
        wb.seed("S", CellRef::new(2, 1), "old").await;

        wb.write_column("S", CellRef::new(2, 1), &["a".into(), "b".into()])
            .await
            .unwrap();

        assert_eq!(
            wb.column("S", 1).await,
            vec![(2, "a".to_string()), (3, "b".to_string())]
        );
        assert_eq!(wb.write_count(), 2);
    }

    #[tokio::test]
    async fn read_absent_cell_is_none() {
        let wb = MemoryWorkbook::with_sheets(&["S"]);
        assert_eq!(wb.read_cell("S", CellRef::new(9, 9)).await.unwrap(), None);
        assert_eq!(wb.read_cell("X", CellRef::new(1, 1)).await.unwrap(), None);
    }
}
