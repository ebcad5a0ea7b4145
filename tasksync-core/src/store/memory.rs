//! In-memory workbook.
//!
//! Each sheet is a grid whose first row is the header. Every call is
//! recorded, and individual operations can be made to fail, which is what
//! the reconciliation tests lean on.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::event::{PersistedRow, RowRef};
use crate::store::{CellRef, CellValue, RowStore, SheetRef};

/// Operation names, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListRows,
    AppendRows,
    UpdateRow,
    AppendLogRow,
    GetCell,
    SetCell,
    Flush,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    ListRows(SheetRef),
    AppendRows(SheetRef, usize),
    UpdateRow(SheetRef, RowRef),
    AppendLogRow(SheetRef, Vec<CellValue>),
    GetCell(SheetRef, CellRef),
    SetCell(SheetRef, CellRef, String),
    Flush(SheetRef),
}

#[derive(Default)]
struct Workbook {
    grids: HashMap<SheetRef, Vec<Vec<String>>>,
    pending: HashMap<SheetRef, Vec<(CellRef, String)>>,
    calls: Vec<StoreCall>,
    failing: HashSet<StoreOp>,
}

impl Workbook {
    fn grid(&mut self, sheet: &SheetRef) -> StoreResult<&mut Vec<Vec<String>>> {
        self.grids
            .get_mut(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }

    fn check(&mut self, op: StoreOp, call: StoreCall) -> StoreResult<()> {
        self.calls.push(call);
        if self.failing.contains(&op) {
            return Err(StoreError::RateLimited);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySheet {
    book: Mutex<Workbook>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet holding `header` as its first row.
    pub fn with_sheet(self, sheet: &SheetRef, header: &[&str]) -> Self {
        self.lock().grids.insert(
            sheet.clone(),
            vec![header.iter().map(|h| h.to_string()).collect()],
        );
        self
    }

    /// Append data rows without recording a call.
    pub fn seed_rows(&self, sheet: &SheetRef, rows: &[Vec<String>]) {
        if let Some(grid) = self.lock().grids.get_mut(sheet) {
            grid.extend(rows.iter().cloned());
        }
    }

    /// Make every later call of `op` fail with `StoreError::RateLimited`.
    pub fn fail_on(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Snapshot of a sheet's grid, header included.
    pub fn grid(&self, sheet: &SheetRef) -> Vec<Vec<String>> {
        self.lock().grids.get(sheet).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Workbook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn put(grid: &mut Vec<Vec<String>>, cell: CellRef, value: String) {
    if grid.len() <= cell.row {
        grid.resize(cell.row + 1, Vec::new());
    }
    let row = &mut grid[cell.row];
    if row.len() <= cell.col {
        row.resize(cell.col + 1, String::new());
    }
    row[cell.col] = value;
}

#[async_trait]
impl RowStore for MemorySheet {
    async fn list_rows(&self, sheet: &SheetRef) -> StoreResult<Vec<PersistedRow>> {
        let mut book = self.lock();
        book.check(StoreOp::ListRows, StoreCall::ListRows(sheet.clone()))?;

        let rows = book
            .grid(sheet)?
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, cells)| PersistedRow::from_cells(RowRef(i + 1), cells))
            .collect();
        Ok(rows)
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<String>]) -> StoreResult<()> {
        let mut book = self.lock();
        book.check(StoreOp::AppendRows, StoreCall::AppendRows(sheet.clone(), rows.len()))?;
        book.grid(sheet)?.extend(rows.iter().cloned());
        Ok(())
    }

    async fn update_row(&self, sheet: &SheetRef, row: RowRef, cells: &[String]) -> StoreResult<()> {
        let mut book = self.lock();
        book.check(StoreOp::UpdateRow, StoreCall::UpdateRow(sheet.clone(), row))?;

        let grid = book.grid(sheet)?;
        // RowRef is 1-based and row 1 is the header
        match row.0.checked_sub(1).and_then(|i| grid.get_mut(i)) {
            Some(existing) if row.0 > 1 => {
                *existing = cells.to_vec();
                Ok(())
            }
            _ => Err(StoreError::RowNotFound(row.0)),
        }
    }

    async fn append_log_row(&self, sheet: &SheetRef, cells: &[CellValue]) -> StoreResult<()> {
        let mut book = self.lock();
        book.check(
            StoreOp::AppendLogRow,
            StoreCall::AppendLogRow(sheet.clone(), cells.to_vec()),
        )?;
        let row: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        book.grid(sheet)?.push(row);
        Ok(())
    }

    async fn get_cell(&self, sheet: &SheetRef, cell: CellRef) -> StoreResult<Option<String>> {
        let mut book = self.lock();
        book.check(StoreOp::GetCell, StoreCall::GetCell(sheet.clone(), cell))?;

        let pending = book
            .pending
            .get(sheet)
            .and_then(|writes| writes.iter().rev().find(|(c, _)| *c == cell))
            .map(|(_, v)| v.clone());
        if pending.is_some() {
            return Ok(pending);
        }

        Ok(book
            .grid(sheet)?
            .get(cell.row)
            .and_then(|r| r.get(cell.col))
            .filter(|v| !v.is_empty())
            .cloned())
    }

    async fn set_cell(&self, sheet: &SheetRef, cell: CellRef, value: String) -> StoreResult<()> {
        let mut book = self.lock();
        book.check(
            StoreOp::SetCell,
            StoreCall::SetCell(sheet.clone(), cell, value.clone()),
        )?;
        book.grid(sheet)?;
        book.pending.entry(sheet.clone()).or_default().push((cell, value));
        Ok(())
    }

    async fn flush_cell_writes(&self, sheet: &SheetRef) -> StoreResult<()> {
        let mut book = self.lock();
        book.check(StoreOp::Flush, StoreCall::Flush(sheet.clone()))?;

        let writes = book.pending.remove(sheet).unwrap_or_default();
        let grid = book.grid(sheet)?;
        for (cell, value) in writes {
            put(grid, cell, value);
        }
        Ok(())
    }
}
