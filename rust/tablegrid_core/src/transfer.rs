//! Copying rectangular blocks of cells out of a table and pasting them back.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::doc::{CellAttrs, CellPos, Doc, Table, TableCell, TableRow};
use crate::error::{Result, TableError};
use crate::grid::{GridMap, Problem, Rect};
use crate::normalize::CellContentFill;
use crate::transform::{Step, Transaction};

/// A self-contained rectangular block of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub width: usize,
    pub height: usize,
    pub rows: Vec<Vec<TableCell>>,
}

impl Fragment {
    /// Check that `rows` tile a rectangle and measure it.
    pub fn from_cells(rows: Vec<Vec<TableCell>>) -> Result<Fragment> {
        let table = Table::from_rows(rows);
        let map = GridMap::build(&table)?;
        let broken = map.problems().iter().any(|p| !matches!(p, Problem::ColwidthMismatch { .. }));
        if broken || map.width() == 0 {
            return Err(TableError::NonRectangularFragment);
        }
        Ok(Fragment {
            width: map.width(),
            height: map.height(),
            rows: table.rows.into_iter().map(|r| r.cells).collect(),
        })
    }

    pub fn to_table(&self) -> Table {
        Table::from_rows(self.rows.clone())
    }
}

/// The result of pasting a fragment: the edit, the new snapshot and the
/// rectangle the fragment now occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct Pasted {
    pub transaction: Transaction,
    pub doc: Doc,
    pub rect: Rect,
}

/// Copy the cells of `rect`. Cells sticking out of the rectangle are cut
/// down to the part inside it and keep their content there; empty slots of
/// an irregular table come out as empty cells.
pub fn extract(table: &Table, map: &GridMap, rect: Rect) -> Result<Fragment> {
    let rect = Rect::new(
        rect.left,
        rect.top,
        rect.right.min(map.width()),
        rect.bottom.min(map.height()),
    );
    if rect.left >= rect.right || rect.top >= rect.bottom {
        return Err(TableError::NonRectangularFragment);
    }
    let mut rows = vec![Vec::new(); rect.height()];
    let mut seen = HashSet::new();
    for row in rect.top..rect.bottom {
        for col in rect.left..rect.right {
            let Some(pos) = map.cell_at(row, col) else {
                rows[row - rect.top].push(TableCell::default());
                continue;
            };
            if !seen.insert(pos) {
                continue;
            }
            let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
            let occupied = map.find_cell(pos)?;
            let mut copy = cell.clone();
            if !rect.contains(&occupied) {
                let from = col - occupied.left;
                let to = occupied.right.min(rect.right) - occupied.left;
                let rowspan = occupied.bottom.min(rect.bottom) - row;
                copy.set_attrs(CellAttrs { rowspan: rowspan as u32, ..cell.attrs().slice_colspan(from, to) });
            }
            rows[row - rect.top].push(copy);
        }
    }
    Ok(Fragment { width: rect.width(), height: rect.height(), rows })
}

/// Paste `fragment` with its top-left corner at `rect`'s top-left corner.
///
/// The target takes the fragment's size, whatever the size of `rect`. A
/// larger `rect` is shrunk to the fragment and the cells outside it are left
/// alone; a smaller one is widened. The fragment is never tiled. The table
/// grows when the fragment runs past its edges.
///
/// The target is not re-closed over spanning cells. Spans crossing its
/// border are split first instead, so the fragment replaces a clean block of
/// whole cells exactly where it was aimed.
pub fn insert(doc: &Doc, table_index: usize, rect: Rect, fragment: &Fragment, fill: &CellContentFill) -> Result<Pasted> {
    let checked = Fragment::from_cells(fragment.rows.clone())?;
    if checked.width != fragment.width || checked.height != fragment.height {
        return Err(TableError::NonRectangularFragment);
    }
    let target = Rect::new(rect.left, rect.top, rect.left + fragment.width, rect.top + fragment.height);
    let mut work = doc.clone();
    let mut transaction = Transaction::new();

    let grow = grow_table(table_at(&work, table_index)?, table_index, target, fill)?;
    if !grow.is_empty() {
        debug!(table = table_index, right = target.right, bottom = target.bottom, "growing table for paste");
        work = grow.apply(&work)?;
        transaction.extend(grow);
    }

    loop {
        let table = table_at(&work, table_index)?;
        let map = GridMap::build(table)?;
        let Some(split) = isolate_once(table, &map, table_index, target, fill)? else { break };
        work = split.apply(&work)?;
        transaction.extend(split);
    }

    let table = table_at(&work, table_index)?;
    let map = GridMap::build(table)?;
    let mut replace = Transaction::new();
    for (i, cells) in fragment.rows.iter().enumerate() {
        let row = target.top + i;
        let from = map.position_at(row, target.left);
        let to = map.position_at(row, target.right);
        replace.push(Step::ReplaceCells { table: table_index, row, from, to, cells: cells.clone() });
    }
    work = replace.apply(&work)?;
    transaction.extend(replace);
    work.revision = doc.revision + 1;
    Ok(Pasted { transaction, doc: work, rect: target })
}

fn table_at(doc: &Doc, index: usize) -> Result<&Table> {
    doc.table(index).ok_or_else(|| TableError::InvalidStep(format!("node {} is not a table", index)))
}

/// Add columns and rows of empty cells until `target` fits in the table.
fn grow_table(table: &Table, index: usize, target: Rect, fill: &CellContentFill) -> Result<Transaction> {
    let map = GridMap::build(table)?;
    let mut transaction = Transaction::new();
    let width = map.width().max(target.right);
    if target.right > map.width() {
        let extra = target.right - map.width();
        for (r, row) in table.rows.iter().enumerate() {
            let header = row.cells.first().is_some_and(|c| c.header);
            let cells = (0..extra).map(|_| fill.cell(header, 0)).collect();
            transaction.push(Step::insert_cells(index, r, row.cells.len(), cells));
        }
    }
    if target.bottom > map.height() {
        let rows = (map.height()..target.bottom)
            .map(|_| TableRow { cells: (0..width).map(|col| fill.cell(false, map.col_widths().get(col).copied().unwrap_or(0))).collect() })
            .collect();
        transaction.push(Step::InsertRows { table: index, at: map.height(), rows });
    }
    Ok(transaction)
}

/// Split the first cell crossing `target`'s border, if any.
fn isolate_once(table: &Table, map: &GridMap, index: usize, target: Rect, fill: &CellContentFill) -> Result<Option<Transaction>> {
    for (pos, occupied) in map.cells() {
        if !occupied.intersects(&target) || target.contains(&occupied) {
            continue;
        }
        let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
        let crosses_row = |line: usize| occupied.top < line && occupied.bottom > line;
        let crosses_col = |line: usize| occupied.left < line && occupied.right > line;
        let split = if crosses_row(target.top) {
            split_rows(map, index, pos, cell, occupied, target.top, fill)
        } else if crosses_row(target.bottom) {
            split_rows(map, index, pos, cell, occupied, target.bottom, fill)
        } else if crosses_col(target.left) {
            split_cols(index, pos, cell, occupied, target.left, fill)
        } else if crosses_col(target.right) {
            split_cols(index, pos, cell, occupied, target.right, fill)
        } else {
            continue;
        };
        debug!(cell = %pos, "splitting cell on paste border");
        return Ok(Some(split));
    }
    Ok(None)
}

/// Cut `cell` at grid row `line`; the lower part becomes a new empty cell.
fn split_rows(map: &GridMap, index: usize, pos: CellPos, cell: &TableCell, occupied: Rect, line: usize, fill: &CellContentFill) -> Transaction {
    let mut upper = cell.attrs();
    upper.rowspan = (line - occupied.top) as u32;
    let mut lower = cell.with_content(fill.content());
    lower.rowspan = (occupied.bottom - line) as u32;
    let mut transaction = Transaction::new();
    transaction
        .push(Step::SetCellAttrs { table: index, cell: pos, attrs: upper })
        .push(Step::insert_cells(index, line, map.position_at(line, occupied.left), vec![lower]));
    transaction
}

/// Cut `cell` at grid column `line`; the right part becomes a new empty cell.
fn split_cols(index: usize, pos: CellPos, cell: &TableCell, occupied: Rect, line: usize, fill: &CellContentFill) -> Transaction {
    let keep = line - occupied.left;
    let attrs = cell.attrs();
    let mut right = cell.with_content(fill.content());
    right.set_attrs(attrs.slice_colspan(keep, occupied.width()));
    let mut transaction = Transaction::new();
    transaction
        .push(Step::SetCellAttrs { table: index, cell: pos, attrs: attrs.slice_colspan(0, keep) })
        .push(Step::insert_cells(index, pos.row, pos.index + 1, vec![right]));
    transaction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Node;
    use pretty_assertions::assert_eq;

    fn t(text: &str) -> TableCell {
        TableCell::text(text)
    }

    fn texts(table: &Table) -> Vec<Vec<String>> {
        table.rows.iter().map(|r| r.cells.iter().map(|c| c.content.text.clone()).collect()).collect()
    }

    fn grid_3x3() -> Table {
        Table::from_rows(vec![
            vec![t("a"), t("b"), t("c")],
            vec![t("d"), t("e"), t("f")],
            vec![t("g"), t("h"), t("i")],
        ])
    }

    #[test]
    fn extract_plain_block() {
        let table = grid_3x3();
        let map = GridMap::build(&table).unwrap();
        let frag = extract(&table, &map, Rect::new(1, 1, 3, 3)).unwrap();
        assert_eq!((frag.width, frag.height), (2, 2));
        assert_eq!(texts(&frag.to_table()), vec![vec!["e", "f"], vec!["h", "i"]]);
    }

    #[test]
    fn extract_trims_partial_colspan() {
        let table = Table::from_rows(vec![vec![t("wide").with_span(3, 1)], vec![t("a"), t("b"), t("c")]]);
        let map = GridMap::build(&table).unwrap();
        let frag = extract(&table, &map, Rect::new(0, 0, 2, 2)).unwrap();
        assert_eq!(frag.rows[0][0].colspan, 2);
        assert_eq!(frag.rows[0][0].content.text, "wide");
        assert_eq!(table.rows[0].cells[0].colspan, 3);
        assert!(Fragment::from_cells(frag.rows.clone()).is_ok());
    }

    #[test]
    fn extract_trims_partial_rowspan_from_above() {
        let table = Table::from_rows(vec![vec![t("tall").with_span(1, 3), t("a")], vec![t("b")], vec![t("c")]]);
        let map = GridMap::build(&table).unwrap();
        let frag = extract(&table, &map, Rect::new(0, 1, 2, 3)).unwrap();
        assert_eq!(frag.rows[0][0].rowspan, 2);
        assert_eq!(frag.rows[0][0].content.text, "tall");
        assert_eq!(texts(&frag.to_table()), vec![vec!["tall", "b"], vec!["c"]]);
    }

    #[test]
    fn non_rectangular_fragment_is_rejected() {
        assert!(matches!(
            Fragment::from_cells(vec![vec![t("a"), t("b")], vec![t("c")]]),
            Err(TableError::NonRectangularFragment)
        ));
    }

    #[test]
    fn extract_then_insert_is_identity() {
        let table = Table::from_rows(vec![
            vec![t("a"), t("b").with_span(2, 1)],
            vec![t("c").with_span(1, 2), t("d"), t("e")],
            vec![t("f"), t("g")],
        ]);
        let doc = Doc::new(vec![Node::Table(table.clone())]);
        let map = GridMap::build(&table).unwrap();
        let rect = Rect::new(0, 0, 3, 3);
        let frag = extract(&table, &map, rect).unwrap();
        let pasted = insert(&doc, 0, rect, &frag, &CellContentFill::default()).unwrap();
        assert_eq!(pasted.doc.nodes, doc.nodes);
    }

    #[test]
    fn paste_replaces_block() {
        let doc = Doc::new(vec![Node::Table(grid_3x3())]);
        let frag = Fragment::from_cells(vec![vec![t("x"), t("y")]]).unwrap();
        let pasted = insert(&doc, 0, Rect::new(1, 2, 2, 3), &frag, &CellContentFill::default()).unwrap();
        assert_eq!(pasted.rect, Rect::new(1, 2, 3, 3));
        assert_eq!(texts(pasted.doc.table(0).unwrap())[2], vec!["g", "x", "y"]);
    }

    #[test]
    fn paste_into_larger_rect_takes_the_fragment_size() {
        let doc = Doc::new(vec![Node::Table(grid_3x3())]);
        let frag = Fragment::from_cells(vec![vec![t("x")]]).unwrap();
        let pasted = insert(&doc, 0, Rect::new(0, 0, 3, 3), &frag, &CellContentFill::default()).unwrap();
        assert_eq!(pasted.rect, Rect::new(0, 0, 1, 1));
        assert_eq!(texts(pasted.doc.table(0).unwrap()), vec![vec!["x", "b", "c"], vec!["d", "e", "f"], vec!["g", "h", "i"]]);
    }

    #[test]
    fn paste_grows_table() {
        let doc = Doc::new(vec![Node::Table(grid_3x3())]);
        let frag = Fragment::from_cells(vec![vec![t("x"), t("y")], vec![t("z"), t("w")]]).unwrap();
        let pasted = insert(&doc, 0, Rect::new(2, 2, 3, 3), &frag, &CellContentFill::default()).unwrap();
        let table = pasted.doc.table(0).unwrap();
        let map = GridMap::build(table).unwrap();
        assert_eq!((map.width(), map.height()), (4, 4));
        assert!(map.is_rectangular());
        assert_eq!(texts(table)[3], vec!["", "", "z", "w"]);
    }

    #[test]
    fn paste_splits_crossing_spans() {
        let doc = Doc::new(vec![Node::Table(Table::from_rows(vec![
            vec![t("wide").with_span(2, 1), t("c")],
            vec![t("tall").with_span(1, 2), t("e"), t("f")],
            vec![t("h"), t("i")],
        ]))]);
        let frag = Fragment::from_cells(vec![vec![t("x")], vec![t("y")]]).unwrap();
        let pasted = insert(&doc, 0, Rect::new(1, 0, 2, 2), &frag, &CellContentFill::default()).unwrap();
        let table = pasted.doc.table(0).unwrap();
        let map = GridMap::build(table).unwrap();
        assert!(map.is_rectangular());
        assert_eq!(table.rows[0].cells[0].colspan, 1);
        assert_eq!(table.rows[0].cells[0].content.text, "wide");
        assert_eq!(texts(table), vec![vec!["wide", "x", "c"], vec!["tall", "y", "f"], vec!["h", "i"]]);
    }
}
