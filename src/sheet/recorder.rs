//! Sheet recorder: writes one value per processed item into a results column.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{CellRef, REPLIES_SHEET, TableWriter};
use crate::error::SheetError;

/// Column receiving the built prompts.
pub const PROMPT_COLUMN: u32 = 1;

/// Column receiving the generated replies.
pub const REPLY_COLUMN: u32 = 2;

/// Row 1 is reserved for headers.
const FIRST_DATA_ROW: u32 = 2;

/// Writes batch results into a sheet, keyed purely by batch order.
#[derive(Clone)]
pub struct SheetRecorder {
    writer: Arc<dyn TableWriter>,
    sheet: String,
}

impl SheetRecorder {
    /// Recorder targeting the `REPLIES` sheet.
    pub fn new(writer: Arc<dyn TableWriter>) -> Self {
        Self::for_sheet(writer, REPLIES_SHEET)
    }

    pub fn for_sheet(writer: Arc<dyn TableWriter>, sheet: impl Into<String>) -> Self {
        Self {
            writer,
            sheet: sheet.into(),
        }
    }

    /// Write `selector(item)` for every item into `column`, from row 2 down.
    ///
    /// Empty input or a missing sheet is silently skipped.
    pub async fn write<T, F>(&self, items: &[T], selector: F, column: u32) -> Result<(), SheetError>
    where
        F: Fn(&T) -> &str,
    {
        if items.is_empty() {
            return Ok(());
        }
        if !self.writer.sheet_exists(&self.sheet).await? {
            warn!(sheet = %self.sheet, "Results sheet missing, skipping write");
            return Ok(());
        }

        let values: Vec<String> = items.iter().map(|item| selector(item).to_string()).collect();
        self.writer
            .write_column(&self.sheet, CellRef::new(FIRST_DATA_ROW, column), &values)
            .await?;

        debug!(sheet = %self.sheet, column, count = values.len(), "Recorded column");
        Ok(())
    }
}
