//! Table editing commands. Each one reads a snapshot and returns the
//! transaction that performs it; normalization runs afterwards like for any
//! other edit.

use std::collections::HashSet;

use tracing::debug;

use crate::doc::{CellContent, CellPos, Doc, Table, TableCell, TableRow};
use crate::error::{Result, TableError};
use crate::grid::{GridMap, Rect};
use crate::normalize::CellContentFill;
use crate::transform::{Step, Transaction};

fn table_at(doc: &Doc, index: usize) -> Result<&Table> {
    doc.table(index).ok_or_else(|| TableError::InvalidStep(format!("node {} is not a table", index)))
}

/// Fail unless `rect` is a non-empty block inside the grid.
fn check_rect(map: &GridMap, rect: Rect) -> Result<()> {
    if rect.left >= rect.right || rect.top >= rect.bottom || !map.full_rect().contains(&rect) {
        return Err(TableError::InvalidRect { rect, width: map.width(), height: map.height() });
    }
    Ok(())
}

/// Insert an empty row below `rect`. Cells spanning across the new row's
/// position grow instead of getting a new cell.
pub fn add_row_after(doc: &Doc, index: usize, rect: Rect, fill: &CellContentFill) -> Result<Transaction> {
    add_row(doc, index, rect, rect.bottom, fill)
}

/// Insert an empty row above `rect`.
pub fn add_row_before(doc: &Doc, index: usize, rect: Rect, fill: &CellContentFill) -> Result<Transaction> {
    add_row(doc, index, rect, rect.top, fill)
}

// New cells copy the header flag of the cell above them, or below them in
// row 0.
fn add_row(doc: &Doc, index: usize, rect: Rect, row: usize, fill: &CellContentFill) -> Result<Transaction> {
    let table = table_at(doc, index)?;
    let map = GridMap::build(table)?;
    check_rect(&map, rect)?;
    let reference = row.saturating_sub(1);
    let mut transaction = Transaction::new();
    let mut cells = Vec::new();
    let mut col = 0;
    while col < map.width() {
        let spanning = (row > 0 && row < map.height())
            .then(|| map.cell_at(row, col))
            .flatten()
            .filter(|pos| map.cell_at(row - 1, col) == Some(*pos));
        match spanning {
            Some(pos) => {
                let occupied = map.find_cell(pos)?;
                let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
                let mut attrs = cell.attrs();
                attrs.rowspan += 1;
                transaction.push(Step::SetCellAttrs { table: index, cell: pos, attrs });
                col = occupied.right;
            }
            None => {
                let header = is_header(table, &map, reference, col);
                cells.push(fill.cell(header, map.col_widths().get(col).copied().unwrap_or(0)));
                col += 1;
            }
        }
    }
    debug!(table = index, row, "adding row");
    transaction.push(Step::InsertRows { table: index, at: row, rows: vec![TableRow { cells }] });
    Ok(transaction)
}

fn is_header(table: &Table, map: &GridMap, row: usize, col: usize) -> bool {
    map.cell_at(row, col).and_then(|pos| table.cell(pos)).is_some_and(|c| c.header)
}

/// Delete the rows of `rect`. Deleting every row deletes the table.
pub fn delete_row(doc: &Doc, index: usize, rect: Rect) -> Result<Transaction> {
    let map = GridMap::build(table_at(doc, index)?)?;
    check_rect(&map, rect)?;
    let mut work = doc.clone();
    let mut transaction = Transaction::new();
    if rect.top == 0 && rect.bottom == map.height() {
        transaction.push(Step::RemoveNode { index });
        return Ok(transaction);
    }
    for row in (rect.top..rect.bottom).rev() {
        let step = remove_row(table_at(&work, index)?, index, row)?;
        work = step.apply(&work)?;
        transaction.extend(step);
    }
    Ok(transaction)
}

fn remove_row(table: &Table, index: usize, row: usize) -> Result<Transaction> {
    let map = GridMap::build(table)?;
    let mut transaction = Transaction::new();
    let mut seen = HashSet::new();
    let mut moved_down = 0;
    for col in 0..map.width() {
        let Some(pos) = map.cell_at(row, col) else { continue };
        if !seen.insert(pos) {
            continue;
        }
        let occupied = map.find_cell(pos)?;
        let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
        if occupied.top < row {
            let mut attrs = cell.attrs();
            attrs.rowspan -= 1;
            transaction.push(Step::SetCellAttrs { table: index, cell: pos, attrs });
        } else if occupied.bottom > row + 1 {
            // The cell starts in the doomed row but reaches below it: move it
            // down, content included.
            let mut rest = cell.clone();
            rest.rowspan -= 1;
            let at = map.position_at(row + 1, occupied.left) + moved_down;
            transaction.push(Step::insert_cells(index, row + 1, at, vec![rest]));
            moved_down += 1;
        }
    }
    transaction.push(Step::RemoveRows { table: index, from: row, to: row + 1 });
    Ok(transaction)
}

/// Insert an empty column right of `rect`. Cells spanning across the new
/// column's position grow instead of getting a new cell.
pub fn add_column_after(doc: &Doc, index: usize, rect: Rect, fill: &CellContentFill) -> Result<Transaction> {
    add_column(doc, index, rect, rect.right, fill)
}

/// Insert an empty column left of `rect`.
pub fn add_column_before(doc: &Doc, index: usize, rect: Rect, fill: &CellContentFill) -> Result<Transaction> {
    add_column(doc, index, rect, rect.left, fill)
}

fn add_column(doc: &Doc, index: usize, rect: Rect, col: usize, fill: &CellContentFill) -> Result<Transaction> {
    let table = table_at(doc, index)?;
    let map = GridMap::build(table)?;
    check_rect(&map, rect)?;
    let reference = col.saturating_sub(1);
    let mut transaction = Transaction::new();
    for row in 0..map.height() {
        let here = map.cell_at(row, col);
        let spanning = (col > 0 && col < map.width()).then_some(here).flatten().filter(|pos| map.cell_at(row, col - 1) == Some(*pos));
        if let Some(pos) = spanning {
            let occupied = map.find_cell(pos)?;
            if occupied.top == row {
                let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
                let mut attrs = cell.attrs();
                attrs.colspan += 1;
                if let Some(widths) = &mut attrs.colwidths {
                    widths.insert(col - occupied.left, 0);
                }
                transaction.push(Step::SetCellAttrs { table: index, cell: pos, attrs });
            }
            continue;
        }
        let header = is_header(table, &map, row, reference);
        transaction.push(Step::insert_cells(index, row, map.position_at(row, col), vec![fill.cell(header, 0)]));
    }
    debug!(table = index, col, "adding column");
    Ok(transaction)
}

/// Delete the columns of `rect`. Deleting every column deletes the table.
pub fn delete_column(doc: &Doc, index: usize, rect: Rect) -> Result<Transaction> {
    let map = GridMap::build(table_at(doc, index)?)?;
    check_rect(&map, rect)?;
    let mut work = doc.clone();
    let mut transaction = Transaction::new();
    if rect.left == 0 && rect.right == map.width() {
        transaction.push(Step::RemoveNode { index });
        return Ok(transaction);
    }
    for col in (rect.left..rect.right).rev() {
        let table = table_at(&work, index)?;
        let map = GridMap::build(table)?;
        let mut step = Transaction::new();
        for (pos, occupied) in map.cells().filter(|(_, r)| r.left <= col && col < r.right) {
            if occupied.width() == 1 {
                step.push(Step::ReplaceCells { table: index, row: pos.row, from: pos.index, to: pos.index + 1, cells: Vec::new() });
            } else {
                let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
                step.push(Step::SetCellAttrs { table: index, cell: pos, attrs: cell.attrs().remove_colspan(col - occupied.left, 1) });
            }
        }
        work = step.apply(&work)?;
        transaction.extend(step);
    }
    Ok(transaction)
}

/// Merge the cells of `rect` into its top-left cell, joining their
/// non-empty content. `None` when the rectangle holds a single cell.
pub fn merge_cells(doc: &Doc, index: usize, rect: Rect) -> Result<Option<Transaction>> {
    let table = table_at(doc, index)?;
    let map = GridMap::build(table)?;
    check_rect(&map, rect)?;
    let rect = crate::rect::close(&map, rect);
    let cells = map.cells_in_rect(rect);
    let Some(first) = cells.first().copied() else { return Ok(None) };
    if cells.len() < 2 {
        return Ok(None);
    }
    let mut merged = table.cell(first).ok_or(TableError::OutOfTable(first))?.clone();
    let mut content = CellContent::default();
    for pos in &cells {
        content.append(&table.cell(*pos).ok_or(TableError::OutOfTable(*pos))?.content);
    }
    merged.content = content;
    merged.colspan = rect.width() as u32;
    merged.rowspan = rect.height() as u32;
    let widths = &map.col_widths()[rect.left..rect.right];
    merged.colwidths = widths.iter().any(|w| *w != 0).then(|| widths.to_vec());
    debug!(table = index, cells = cells.len(), "merging cells");

    let mut transaction = Transaction::new();
    for row in rect.top..rect.bottom {
        let from = map.position_at(row, rect.left);
        let to = map.position_at(row, rect.right);
        let replacement = if row == rect.top { vec![merged.clone()] } else { Vec::new() };
        if from < to || !replacement.is_empty() {
            transaction.push(Step::ReplaceCells { table: index, row, from, to, cells: replacement });
        }
    }
    Ok(Some(transaction))
}

/// Split a spanning cell into single-slot cells. The original content stays
/// in the top-left one. `None` when the cell spans a single slot.
pub fn split_cell(doc: &Doc, index: usize, pos: CellPos, fill: &CellContentFill) -> Result<Option<Transaction>> {
    let table = table_at(doc, index)?;
    let map = GridMap::build(table)?;
    let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
    if cell.colspan == 1 && cell.rowspan == 1 {
        return Ok(None);
    }
    let occupied = map.find_cell(pos)?;
    let attrs = cell.attrs();
    let piece = |j: usize| -> TableCell {
        let mut out = cell.with_content(fill.content());
        out.set_attrs(attrs.slice_colspan(j, j + 1));
        out.rowspan = 1;
        out
    };

    let mut transaction = Transaction::new();
    let mut first = attrs.slice_colspan(0, 1);
    first.rowspan = 1;
    transaction.push(Step::SetCellAttrs { table: index, cell: pos, attrs: first });
    for row in occupied.top..occupied.bottom {
        let skip = usize::from(row == occupied.top);
        let cells: Vec<TableCell> = (skip..occupied.width()).map(piece).collect();
        if cells.is_empty() {
            continue;
        }
        let at = if row == occupied.top { pos.index + 1 } else { map.position_at(row, occupied.left) };
        transaction.push(Step::insert_cells(index, row, at, cells));
    }
    Ok(Some(transaction))
}

/// Toggle the header flag of the cells in the first row. The row becomes a
/// header row unless it already is one.
pub fn toggle_header_row(doc: &Doc, index: usize) -> Result<Transaction> {
    let map = GridMap::build(table_at(doc, index)?)?;
    toggle_header_cells(doc, index, Rect::new(0, 0, map.width(), 1))
}

/// Toggle the header flag of the cells in the first column.
pub fn toggle_header_column(doc: &Doc, index: usize) -> Result<Transaction> {
    let map = GridMap::build(table_at(doc, index)?)?;
    toggle_header_cells(doc, index, Rect::new(0, 0, 1, map.height()))
}

/// Toggle the header flag of every cell touching `rect`. When all of them
/// are headers they turn into plain cells; otherwise all become headers.
pub fn toggle_header_cells(doc: &Doc, index: usize, rect: Rect) -> Result<Transaction> {
    let table = table_at(doc, index)?;
    let map = GridMap::build(table)?;
    check_rect(&map, rect)?;
    let mut cells = Vec::new();
    for pos in map.cells_in_rect(rect) {
        cells.push((pos, table.cell(pos).ok_or(TableError::OutOfTable(pos))?));
    }
    let header = !cells.iter().all(|(_, cell)| cell.header);
    let mut transaction = Transaction::new();
    for (pos, cell) in cells.into_iter().filter(|(_, cell)| cell.header != header) {
        let mut attrs = cell.attrs();
        attrs.header = header;
        transaction.push(Step::SetCellAttrs { table: index, cell: pos, attrs });
    }
    Ok(transaction)
}
