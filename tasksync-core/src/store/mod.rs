//! Persistent row storage.
//!
//! A store holds two sheets: one row per synced event, and a log sheet that
//! receives one summary row per run plus a "last run" cell. Cell writes are
//! buffered until `flush_cell_writes`.

mod memory;
mod sheets;
mod token;

pub use memory::{MemorySheet, StoreCall, StoreOp};
pub use sheets::{SheetsConfig, SheetsStore, spreadsheet_id};
pub use token::TokenSource;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::event::{PersistedRow, RowRef};

/// A sheet, addressed by its title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetRef(String);

impl SheetRef {
    pub fn new(title: impl Into<String>) -> Self {
        SheetRef(title.into())
    }

    pub fn title(&self) -> &str {
        &self.0
    }

    /// Quoted form for A1 ranges: `'Sheet 1'` (embedded quotes doubled).
    pub fn quoted(&self) -> String {
        format!("'{}'", self.0.replace('\'', "''"))
    }
}

impl fmt::Display for SheetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-based cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub const fn new(row: usize, col: usize) -> Self {
        CellRef { row, col }
    }

    /// A1 notation, e.g. `(0, 7)` → `H1`.
    pub fn a1(&self) -> String {
        format!("{}{}", column_letters(self.col), self.row + 1)
    }
}

/// Zero-based column index → spreadsheet letters (`0` → `A`, `26` → `AA`).
pub fn column_letters(col: usize) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A value written to the log sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        CellValue::Number(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

/// Tabular storage the reconciliation writes into.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Every data row of `sheet` (the header row excluded), in sheet order.
    async fn list_rows(&self, sheet: &SheetRef) -> StoreResult<Vec<PersistedRow>>;

    /// Append rows after the last data row, in the given order.
    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<String>]) -> StoreResult<()>;

    /// Replace the cells of one existing row.
    async fn update_row(&self, sheet: &SheetRef, row: RowRef, cells: &[String]) -> StoreResult<()>;

    /// Append one row of mixed values to a log sheet.
    async fn append_log_row(&self, sheet: &SheetRef, cells: &[CellValue]) -> StoreResult<()>;

    /// Current value of a cell, including writes not yet flushed.
    async fn get_cell(&self, sheet: &SheetRef, cell: CellRef) -> StoreResult<Option<String>>;

    /// Buffer a cell write until the next flush.
    async fn set_cell(&self, sheet: &SheetRef, cell: CellRef, value: String) -> StoreResult<()>;

    /// Persist every buffered cell write of `sheet` in one batch.
    async fn flush_cell_writes(&self, sheet: &SheetRef) -> StoreResult<()>;
}

#[async_trait]
impl<T: RowStore + ?Sized> RowStore for Arc<T> {
    async fn list_rows(&self, sheet: &SheetRef) -> StoreResult<Vec<PersistedRow>> {
        (**self).list_rows(sheet).await
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<String>]) -> StoreResult<()> {
        (**self).append_rows(sheet, rows).await
    }

    async fn update_row(&self, sheet: &SheetRef, row: RowRef, cells: &[String]) -> StoreResult<()> {
        (**self).update_row(sheet, row, cells).await
    }

    async fn append_log_row(&self, sheet: &SheetRef, cells: &[CellValue]) -> StoreResult<()> {
        (**self).append_log_row(sheet, cells).await
    }

    async fn get_cell(&self, sheet: &SheetRef, cell: CellRef) -> StoreResult<Option<String>> {
        (**self).get_cell(sheet, cell).await
    }

    async fn set_cell(&self, sheet: &SheetRef, cell: CellRef, value: String) -> StoreResult<()> {
        (**self).set_cell(sheet, cell, value).await
    }

    async fn flush_cell_writes(&self, sheet: &SheetRef) -> StoreResult<()> {
        (**self).flush_cell_writes(sheet).await
    }
}
