//! Dense grid model derived from a table's row/cell tree.
//!
//! Every slot of the `height × width` grid records the tree position of the
//! cell covering it. A spanning cell's position is repeated over its whole
//! block. The map is a pure function of one table snapshot; it is never
//! updated in place.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::doc::{CellPos, Doc, Table, TableCell};
use crate::error::{Result, TableError};
use crate::rect;

/// Half-open rectangle in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl Rect {
    pub const fn new(left: usize, top: usize, right: usize, bottom: usize) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    pub fn height(&self) -> usize {
        self.bottom - self.top
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left && other.right <= self.right && other.top >= self.top && other.bottom <= self.bottom
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        other.left < self.right && other.right > self.left && other.top < self.bottom && other.bottom > self.top
    }

    pub fn contains_slot(&self, row: usize, col: usize) -> bool {
        row >= self.top && row < self.bottom && col >= self.left && col < self.right
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// A structural defect noticed while building the grid. None of these stop
/// the build; the normalizer repairs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// The cell could not start at `natural` because its block ran into
    /// `blocker`, so it was shifted right.
    Collision { pos: CellPos, natural: usize, blocker: CellPos },
    /// The cell's rowspan runs `excess` rows past the end of the table.
    OverlongRowspan { pos: CellPos, excess: u32 },
    /// The row has `count` slots no cell covers.
    Missing { row: usize, count: usize },
    /// The cell crosses the width established by row 0; `keep` columns fit.
    Overflow { pos: CellPos, keep: u32 },
    /// The cell's width hints disagree with its columns.
    ColwidthMismatch { pos: CellPos, colwidths: Option<Vec<u32>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridMap {
    width: usize,
    height: usize,
    map: Vec<Option<CellPos>>,
    /// Every cell with its occupied block, in tree (and placement) order.
    cells: Vec<(CellPos, Rect)>,
    col_widths: Vec<u32>,
    problems: Vec<Problem>,
}

impl GridMap {
    /// Place every cell of `table` on the grid.
    ///
    /// Cells go left to right, row by row. A cell starts at the first free
    /// slot after its predecessor; if its block would overlap an occupied
    /// slot it is shifted right until the whole block is free.
    pub fn build(table: &Table) -> Result<GridMap> {
        let height = table.rows.len();
        let mut grid: Vec<Vec<Option<CellPos>>> = vec![Vec::new(); height];
        let mut cells = Vec::new();
        let mut problems = Vec::new();

        for (r, row) in table.rows.iter().enumerate() {
            let mut cursor = 0;
            for (i, cell) in row.cells.iter().enumerate() {
                let pos = CellPos::new(r, i);
                if cell.colspan == 0 || cell.rowspan == 0 {
                    return Err(TableError::MalformedTable { pos, colspan: cell.colspan, rowspan: cell.rowspan });
                }
                let colspan = cell.colspan as usize;
                let rowspan = (cell.rowspan as usize).min(height - r);
                if rowspan < cell.rowspan as usize {
                    problems.push(Problem::OverlongRowspan { pos, excess: cell.rowspan - rowspan as u32 });
                }

                let natural = first_free(&grid[r], cursor);
                let mut col = natural;
                let mut blocker = None;
                while let Some(hit) = block_conflict(&grid, r, col, colspan, rowspan) {
                    blocker.get_or_insert(hit);
                    col = first_free(&grid[r], col + 1);
                }
                if let Some(blocker) = blocker {
                    problems.push(Problem::Collision { pos, natural, blocker });
                }

                for slots in grid.iter_mut().skip(r).take(rowspan) {
                    if slots.len() < col + colspan {
                        slots.resize(col + colspan, None);
                    }
                    for slot in &mut slots[col..col + colspan] {
                        *slot = Some(pos);
                    }
                }
                cells.push((pos, Rect::new(col, r, col + colspan, r + rowspan)));
                cursor = col + colspan;
            }
        }

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let mut map = Vec::with_capacity(width * height);
        for (r, mut slots) in grid.into_iter().enumerate() {
            slots.resize(width, None);
            let count = slots.iter().filter(|s| s.is_none()).count();
            if count > 0 {
                problems.push(Problem::Missing { row: r, count });
            }
            map.extend(slots);
        }

        let reference = cells.iter().filter(|(p, _)| p.row == 0).map(|(_, rect)| rect.right).max().unwrap_or(0);
        if reference > 0 {
            for (pos, rect) in &cells {
                if rect.left < reference && rect.right > reference {
                    problems.push(Problem::Overflow { pos: *pos, keep: (reference - rect.left) as u32 });
                }
            }
        }

        let col_widths = column_consensus(table, &cells, width);
        for (pos, rect) in &cells {
            if let Some(cell) = table.cell(*pos) {
                if let Some(colwidths) = reconciled_widths(cell, rect, &col_widths) {
                    problems.push(Problem::ColwidthMismatch { pos: *pos, colwidths });
                }
            }
        }

        trace!(width, height, problems = problems.len(), "built grid map");
        Ok(GridMap { width, height, map, cells, col_widths, problems })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn is_rectangular(&self) -> bool {
        self.problems.is_empty()
    }

    /// Consensus width hint per column, `0` where no cell gives one.
    pub fn col_widths(&self) -> &[u32] {
        &self.col_widths
    }

    /// The rectangle covering the whole grid.
    pub fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Every cell with its occupied block, in tree order.
    pub fn cells(&self) -> impl Iterator<Item = (CellPos, Rect)> + '_ {
        self.cells.iter().copied()
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<CellPos> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.map[row * self.width + col]
    }

    /// The occupied block of the cell at `pos`.
    pub fn find_cell(&self, pos: CellPos) -> Result<Rect> {
        self.cells
            .binary_search_by(|(p, _)| p.cmp(&pos))
            .map(|i| self.cells[i].1)
            .map_err(|_| TableError::OutOfTable(pos))
    }

    /// The left grid column of the cell at `pos`.
    pub fn col_count(&self, pos: CellPos) -> Result<usize> {
        Ok(self.find_cell(pos)?.left)
    }

    /// The closed rectangle covering both cells; see [`rect::rect_between`].
    pub fn rect_between(&self, a: CellPos, b: CellPos) -> Result<Rect> {
        rect::rect_between(self, a, b)
    }

    /// Distinct cells touching `rect`, in row-major order of the first slot
    /// at which each is met.
    pub fn cells_in_rect(&self, rect: Rect) -> Vec<CellPos> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in rect.top..rect.bottom.min(self.height) {
            for col in rect.left..rect.right.min(self.width) {
                if let Some(pos) = self.cell_at(row, col) {
                    if seen.insert(pos) {
                        out.push(pos);
                    }
                }
            }
        }
        out
    }

    /// Tree index a cell starting at grid column `col` would take in `row`.
    pub fn position_at(&self, row: usize, col: usize) -> usize {
        self.cells.iter().filter(|(p, rect)| p.row == row && rect.left < col).count()
    }

    /// The neighbouring cell of `pos` along `axis`, `forward` meaning
    /// right/down.
    pub fn next_cell(&self, pos: CellPos, axis: Axis, forward: bool) -> Option<CellPos> {
        let rect = self.find_cell(pos).ok()?;
        match (axis, forward) {
            (Axis::Horizontal, true) => self.cell_at(rect.top, rect.right),
            (Axis::Horizontal, false) => rect.left.checked_sub(1).and_then(|c| self.cell_at(rect.top, c)),
            (Axis::Vertical, true) => self.cell_at(rect.bottom, rect.left),
            (Axis::Vertical, false) => rect.top.checked_sub(1).and_then(|r| self.cell_at(r, rect.left)),
        }
    }
}

fn first_free(row: &[Option<CellPos>], from: usize) -> usize {
    (from..).find(|c| row.get(*c).map_or(true, Option::is_none)).unwrap_or(from)
}

/// First occupied slot, in row-major order, of the block at (`row`, `col`).
fn block_conflict(grid: &[Vec<Option<CellPos>>], row: usize, col: usize, colspan: usize, rowspan: usize) -> Option<CellPos> {
    grid.iter()
        .skip(row)
        .take(rowspan)
        .flat_map(|slots| slots.iter().skip(col).take(colspan))
        .find_map(|slot| *slot)
}

/// Per column, the width most cells agree on. A single disagreeing hint
/// replaces a width seen only once.
fn column_consensus(table: &Table, cells: &[(CellPos, Rect)], width: usize) -> Vec<u32> {
    let mut widths: Vec<(u32, u32)> = vec![(0, 0); width];
    for (pos, rect) in cells {
        let Some(colwidths) = table.cell(*pos).and_then(|c| c.colwidths.as_ref()) else { continue };
        for (j, w) in colwidths.iter().take(rect.width()).enumerate() {
            if *w == 0 {
                continue;
            }
            let entry = &mut widths[rect.left + j];
            if entry.1 == 0 || (entry.0 != *w && entry.1 == 1) {
                *entry = (*w, 1);
            } else if entry.0 == *w {
                entry.1 += 1;
            }
        }
    }
    widths.into_iter().map(|(w, _)| w).collect()
}

/// The width hints `cell` should carry, or `None` if it already agrees.
fn reconciled_widths(cell: &TableCell, rect: &Rect, consensus: &[u32]) -> Option<Option<Vec<u32>>> {
    let mut fresh: Vec<u32> = cell.colwidths.clone().unwrap_or_default();
    fresh.resize(cell.colspan as usize, 0);
    for (j, w) in fresh.iter_mut().enumerate().take(rect.width()) {
        if let Some(c) = consensus.get(rect.left + j).filter(|c| **c != 0) {
            *w = *c;
        }
    }
    let fresh = fresh.iter().any(|w| *w != 0).then_some(fresh);
    let current = cell.colwidths.clone().filter(|w| w.iter().any(|w| *w != 0));
    (fresh != current).then_some(fresh)
}

/// Memo of grid maps keyed by document revision and table index.
#[derive(Debug, Default)]
pub struct GridCache {
    entries: RefCell<HashMap<(u64, usize), Rc<GridMap>>>,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The grid of table `index` in `doc`, built at most once per revision.
    pub fn get(&self, doc: &Doc, index: usize) -> Result<Rc<GridMap>> {
        let key = (doc.revision, index);
        if let Some(map) = self.entries.borrow().get(&key) {
            return Ok(Rc::clone(map));
        }
        let table = doc.table(index).ok_or_else(|| TableError::InvalidStep(format!("node {} is not a table", index)))?;
        let map = Rc::new(GridMap::build(table)?);
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(revision, _), _| *revision == doc.revision);
        entries.insert(key, Rc::clone(&map));
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{Node, TableCell};
    use pretty_assertions::assert_eq;

    fn c() -> TableCell {
        TableCell::default()
    }

    fn span(colspan: u32, rowspan: u32) -> TableCell {
        TableCell::default().with_span(colspan, rowspan)
    }

    #[test]
    fn plain_table() {
        let map = GridMap::build(&Table::from_rows(vec![vec![c(), c()], vec![c(), c()]])).unwrap();
        assert_eq!((map.width(), map.height()), (2, 2));
        assert_eq!(map.cell_at(1, 1), Some(CellPos::new(1, 1)));
        assert!(map.is_rectangular());
    }

    #[test]
    fn spans_repeat_their_position() {
        let table = Table::from_rows(vec![vec![span(2, 2), c()], vec![c()], vec![c(), c(), c()]]);
        let map = GridMap::build(&table).unwrap();
        assert_eq!(map.width(), 3);
        for (r, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_eq!(map.cell_at(r, col), Some(CellPos::new(0, 0)));
        }
        assert_eq!(map.cell_at(1, 2), Some(CellPos::new(1, 0)));
        assert_eq!(map.find_cell(CellPos::new(0, 0)).unwrap(), Rect::new(0, 0, 2, 2));
        assert!(map.is_rectangular());
    }

    #[test]
    fn zero_span_is_malformed() {
        let table = Table::from_rows(vec![vec![c(), span(0, 1)]]);
        assert!(matches!(GridMap::build(&table), Err(TableError::MalformedTable { pos, .. }) if pos == CellPos::new(0, 1)));
    }

    #[test]
    fn short_rows_report_missing() {
        let map = GridMap::build(&Table::from_rows(vec![vec![c(), c()], vec![c()]])).unwrap();
        assert_eq!(map.problems(), &[Problem::Missing { row: 1, count: 1 }]);
        assert_eq!(map.cell_at(1, 1), None);
    }

    #[test]
    fn colliding_cell_is_shifted_right() {
        // Row 1's wide cell would overlap the rowspan coming down column 1.
        let table = Table::from_rows(vec![vec![c(), span(1, 2)], vec![span(2, 1)]]);
        let map = GridMap::build(&table).unwrap();
        assert_eq!(map.width(), 4);
        assert_eq!(map.find_cell(CellPos::new(1, 0)).unwrap(), Rect::new(2, 1, 4, 2));
        assert!(map.problems().contains(&Problem::Collision {
            pos: CellPos::new(1, 0),
            natural: 0,
            blocker: CellPos::new(0, 1),
        }));
    }

    #[test]
    fn overlong_rowspan_is_clipped() {
        let map = GridMap::build(&Table::from_rows(vec![vec![span(1, 3)]])).unwrap();
        assert_eq!(map.height(), 1);
        assert_eq!(map.problems(), &[Problem::OverlongRowspan { pos: CellPos::new(0, 0), excess: 2 }]);
    }

    #[test]
    fn overflow_against_first_row() {
        let table = Table::from_rows(vec![vec![c(), c()], vec![c(), span(2, 1)]]);
        let map = GridMap::build(&table).unwrap();
        assert!(map.problems().contains(&Problem::Overflow { pos: CellPos::new(1, 1), keep: 1 }));
    }

    #[test]
    fn colwidth_consensus() {
        let table = Table::from_rows(vec![
            vec![c().with_colwidths(vec![100]), c()],
            vec![c().with_colwidths(vec![100]), c()],
            vec![c().with_colwidths(vec![80]), c()],
        ]);
        let map = GridMap::build(&table).unwrap();
        assert_eq!(map.col_widths(), &[100, 0]);
        assert_eq!(map.problems(), &[Problem::ColwidthMismatch { pos: CellPos::new(2, 0), colwidths: Some(vec![100]) }]);
    }

    #[test]
    fn cells_in_rect_reports_each_cell_once() {
        let table = Table::from_rows(vec![vec![span(2, 2), c()], vec![c()]]);
        let map = GridMap::build(&table).unwrap();
        assert_eq!(map.cells_in_rect(map.full_rect()), vec![CellPos::new(0, 0), CellPos::new(0, 1), CellPos::new(1, 0)]);
    }

    #[test]
    fn position_at_counts_cells_starting_in_row() {
        let table = Table::from_rows(vec![vec![c(), span(1, 2), c()], vec![c(), c()]]);
        let map = GridMap::build(&table).unwrap();
        assert_eq!(map.position_at(1, 0), 0);
        assert_eq!(map.position_at(1, 2), 1);
        assert_eq!(map.position_at(1, 3), 2);
    }

    #[test]
    fn next_cell_walks_spans() {
        let table = Table::from_rows(vec![vec![span(2, 1), c()], vec![c(), c(), c()]]);
        let map = GridMap::build(&table).unwrap();
        let wide = CellPos::new(0, 0);
        assert_eq!(map.next_cell(wide, Axis::Horizontal, true), Some(CellPos::new(0, 1)));
        assert_eq!(map.next_cell(wide, Axis::Vertical, true), Some(CellPos::new(1, 0)));
        assert_eq!(map.next_cell(wide, Axis::Horizontal, false), None);
    }

    #[test]
    fn cache_reuses_maps_per_revision() {
        let mut doc = Doc::new(vec![Node::Table(Table::from_rows(vec![vec![c()]]))]);
        let cache = GridCache::new();
        let a = cache.get(&doc, 0).unwrap();
        let b = cache.get(&doc, 0).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        doc.revision += 1;
        let c = cache.get(&doc, 0).unwrap();
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(cache.entries.borrow().len(), 1);
    }
}
