//! libSQL workbook: sheets and cells persisted in a local database file.
//!
//! Cells are stored sparsely as `(sheet, row, col) -> value`. Writes are
//! upserts, so rewriting a range overwrites whatever was there before.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use super::migrations;
use super::{CellReader, CellRef, TableWriter};
use crate::error::SheetError;

const UPSERT_CELL: &str = "INSERT INTO cells (sheet, row_idx, col_idx, value, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5) \
     ON CONFLICT(sheet, row_idx, col_idx) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// Workbook backed by a libSQL database.
pub struct LibSqlWorkbook {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlWorkbook {
    /// Open (or create) a local workbook file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, SheetError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                SheetError::Open(format!("Failed to create workbook directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SheetError::Open(format!("Failed to open libSQL database: {e}")))?;

        let workbook = Self::from_database(db).await?;
        info!(path = %path.display(), "Workbook opened");
        Ok(workbook)
    }

    /// Create an in-memory workbook (for tests).
    pub async fn new_memory() -> Result<Self, SheetError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| SheetError::Open(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, SheetError> {
        let conn = db
            .connect()
            .map_err(|e| SheetError::Open(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create a sheet. Creating an existing sheet is a no-op.
    pub async fn create_sheet(&self, name: &str) -> Result<(), SheetError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO sheets (name, created_at) VALUES (?1, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| SheetError::Query(format!("create_sheet: {e}")))?;
        debug!(sheet = name, "Sheet ensured");
        Ok(())
    }

    /// Names of all sheets, alphabetically.
    pub async fn sheet_names(&self) -> Result<Vec<String>, SheetError> {
        let mut rows = self
            .conn
            .query("SELECT name FROM sheets ORDER BY name", ())
            .await
            .map_err(|e| SheetError::Query(format!("sheet_names: {e}")))?;

        let mut names = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SheetError::Query(format!("sheet_names: {e}")))?
        {
            names.push(
                row.get::<String>(0)
                    .map_err(|e| SheetError::Query(format!("sheet_names row parse: {e}")))?,
            );
        }
        Ok(names)
    }

    async fn ensure_sheet(&self, sheet: &str) -> Result<(), SheetError> {
        if self.sheet_exists(sheet).await? {
            Ok(())
        } else {
            Err(SheetError::SheetNotFound(sheet.to_string()))
        }
    }
}

#[async_trait]
impl CellReader for LibSqlWorkbook {
    async fn read_cell(&self, sheet: &str, cell: CellRef) -> Result<Option<String>, SheetError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM cells WHERE sheet = ?1 AND row_idx = ?2 AND col_idx = ?3",
                params![sheet, i64::from(cell.row), i64::from(cell.column)],
            )
            .await
            .map_err(|e| SheetError::Query(format!("read_cell: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| SheetError::Query(format!("read_cell row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(SheetError::Query(format!("read_cell: {e}"))),
        }
    }
}

#[async_trait]
impl TableWriter for LibSqlWorkbook {
    async fn sheet_exists(&self, sheet: &str) -> Result<bool, SheetError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sheets WHERE name = ?1", params![sheet])
            .await
            .map_err(|e| SheetError::Query(format!("sheet_exists: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| SheetError::Query(format!("sheet_exists row parse: {e}")))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(SheetError::Query(format!("sheet_exists: {e}"))),
        }
    }

    async fn write_cell(&self, sheet: &str, cell: CellRef, value: &str) -> Result<(), SheetError> {
        self.ensure_sheet(sheet).await?;
        self.conn
            .execute(
                UPSERT_CELL,
                params![
                    sheet,
                    i64::from(cell.row),
                    i64::from(cell.column),
                    value,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| SheetError::Query(format!("write_cell {sheet}!{cell}: {e}")))?;
        Ok(())
    }

    async fn write_column(
        &self,
        sheet: &str,
        start: CellRef,
        values: &[String],
    ) -> Result<(), SheetError> {
        self.ensure_sheet(sheet).await?;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SheetError::Query(format!("write_column begin: {e}")))?;
        let now = Utc::now().to_rfc3339();

        for (offset, value) in (0_u32..).zip(values) {
            let cell = start.down(offset);
            tx.execute(
                UPSERT_CELL,
                params![
                    sheet,
                    i64::from(cell.row),
                    i64::from(cell.column),
                    value.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| SheetError::Query(format!("write_column {sheet}!{cell}: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| SheetError::Query(format!("write_column commit: {e}")))?;

        debug!(sheet, start = %start, rows = values.len(), "Column written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_workbook() -> LibSqlWorkbook {
        LibSqlWorkbook::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn sheet_lifecycle() {
        let wb = test_workbook().await;
        assert!(!wb.sheet_exists("REPLIES").await.unwrap());

        wb.create_sheet("REPLIES").await.unwrap();
        wb.create_sheet("REPLIES").await.unwrap();
        wb.create_sheet("CONFIG").await.unwrap();

        assert!(wb.sheet_exists("REPLIES").await.unwrap());
        assert_eq!(wb.sheet_names().await.unwrap(), vec!["CONFIG", "REPLIES"]);
    }

    #[tokio::test]
    async fn write_and_read_cell() {
        let wb = test_workbook().await;
        wb.create_sheet("CONFIG").await.unwrap();

        let cell = CellRef::new(5, 2);
        wb.write_cell("CONFIG", cell, "Reply politely.").await.unwrap();
        assert_eq!(
            wb.read_cell("CONFIG", cell).await.unwrap().as_deref(),
            Some("Reply politely.")
        );

        wb.write_cell("CONFIG", cell, "Reply briefly.").await.unwrap();
        assert_eq!(
            wb.read_cell("CONFIG", cell).await.unwrap().as_deref(),
            Some("Reply briefly.")
        );
    }

    #[tokio::test]
    async fn write_cell_requires_sheet() {
        let wb = test_workbook().await;
        let err = wb.write_cell("MISSING", CellRef::new(1, 1), "x").await;
        assert!(matches!(err, Err(SheetError::SheetNotFound(_))));
    }

    #[tokio::test]
    async fn write_column_overwrites_consecutive_rows() {
        let wb = test_workbook().await;
        wb.create_sheet("REPLIES").await.unwrap();
        wb.write_cell("REPLIES", CellRef::new(3, 2), "stale").await.unwrap();

        let values = vec!["first".to_string(), "second".to_string()];
        wb.write_column("REPLIES", CellRef::new(2, 2), &values)
            .await
            .unwrap();

        assert_eq!(
            wb.read_cell("REPLIES", CellRef::new(2, 2)).await.unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(
            wb.read_cell("REPLIES", CellRef::new(3, 2)).await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(wb.read_cell("REPLIES", CellRef::new(2, 1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reopening_file_keeps_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.db");

        {
            let wb = LibSqlWorkbook::new_local(&path).await.unwrap();
            wb.create_sheet("CONFIG").await.unwrap();
            wb.write_cell("CONFIG", CellRef::new(2, 2), "me@example.com")
                .await
                .unwrap();
        }

        let wb = LibSqlWorkbook::new_local(&path).await.unwrap();
        assert_eq!(
            wb.read_cell("CONFIG", CellRef::new(2, 2)).await.unwrap().as_deref(),
            Some("me@example.com")
        );
    }
}
