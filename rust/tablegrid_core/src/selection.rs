//! Selection model: cursors, text ranges, node selections and cell
//! rectangles, mapped through every edit.

use serde::{Deserialize, Serialize};

use crate::doc::{CellAddress, CellPos, Doc};
use crate::error::{Result, TableError};
use crate::grid::{GridMap, Rect};
use crate::transform::Mapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anchor {
    Text { node_index: usize, char_offset: usize },
    TableCell { cell: CellAddress, char_offset: usize },
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Text { node_index: 0, char_offset: 0 }
    }
}

impl Anchor {
    pub fn cell(&self) -> Option<CellAddress> {
        match self {
            Anchor::TableCell { cell, .. } => Some(*cell),
            Anchor::Text { .. } => None,
        }
    }

    fn map(&self, mapping: &Mapping) -> Anchor {
        match *self {
            Anchor::Text { node_index, char_offset } => match mapping.map_node(node_index) {
                Some(node_index) => Anchor::Text { node_index, char_offset },
                None => Anchor::Text { node_index, char_offset: 0 },
            },
            Anchor::TableCell { cell, char_offset } => {
                let result = mapping.map_result(cell);
                let char_offset = if result.deleted { 0 } else { char_offset };
                Anchor::TableCell { cell: result.pos, char_offset }
            }
        }
    }
}

/// A rectangle of cells given by the two cells at its corners. The
/// rectangle itself is derived from the current grid whenever needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSelection {
    pub anchor: CellAddress,
    pub head: CellAddress,
}

impl CellSelection {
    /// Both cells must exist and belong to the same table.
    pub fn new(doc: &Doc, anchor: CellAddress, head: CellAddress) -> Result<CellSelection> {
        if doc.cell(anchor).is_none() {
            return Err(TableError::OutOfTable(anchor.cell));
        }
        if head.table != anchor.table || doc.cell(head).is_none() {
            return Err(TableError::OutOfTable(head.cell));
        }
        Ok(CellSelection { anchor, head })
    }

    /// Select the whole table at node `index`.
    pub fn whole_table(map: &GridMap, index: usize) -> Option<CellSelection> {
        let first = map.cell_at(0, 0)?;
        let last = map.cell_at(map.height().checked_sub(1)?, map.width().checked_sub(1)?)?;
        Some(CellSelection { anchor: CellAddress { table: index, cell: first }, head: CellAddress { table: index, cell: last } })
    }

    pub fn table(&self) -> usize {
        self.anchor.table
    }

    pub fn rect(&self, map: &GridMap) -> Result<Rect> {
        map.rect_between(self.anchor.cell, self.head.cell)
    }

    /// The selected cells, each once, in row-major order.
    pub fn cells(&self, map: &GridMap) -> Result<Vec<CellPos>> {
        Ok(map.cells_in_rect(self.rect(map)?))
    }

    pub fn is_col_selection(&self, map: &GridMap) -> Result<bool> {
        let rect = self.rect(map)?;
        Ok(rect.top == 0 && rect.bottom == map.height())
    }

    pub fn is_row_selection(&self, map: &GridMap) -> Result<bool> {
        let rect = self.rect(map)?;
        Ok(rect.left == 0 && rect.right == map.width())
    }

    /// Extend a selection between two cells to the full height of the
    /// columns they span.
    pub fn col_selection(map: &GridMap, anchor: CellAddress, head: CellAddress) -> Result<CellSelection> {
        let (a, h) = (map.find_cell(anchor.cell)?, map.find_cell(head.cell)?);
        let last = map.height().saturating_sub(1);
        let (mut anchor, mut head) = (anchor, head);
        let (top, bottom) = if a.top <= h.top { (&mut anchor, &mut head) } else { (&mut head, &mut anchor) };
        let (top_rect, bottom_rect) = if a.top <= h.top { (a, h) } else { (h, a) };
        if let Some(cell) = map.cell_at(0, top_rect.left) {
            top.cell = cell;
        }
        if let Some(cell) = map.cell_at(last, bottom_rect.right - 1) {
            bottom.cell = cell;
        }
        Ok(CellSelection { anchor, head })
    }

    /// Extend a selection between two cells to the full width of the rows
    /// they span.
    pub fn row_selection(map: &GridMap, anchor: CellAddress, head: CellAddress) -> Result<CellSelection> {
        let (a, h) = (map.find_cell(anchor.cell)?, map.find_cell(head.cell)?);
        let last = map.width().saturating_sub(1);
        let (mut anchor, mut head) = (anchor, head);
        let (first, second) = if a.left <= h.left { (&mut anchor, &mut head) } else { (&mut head, &mut anchor) };
        let (first_rect, second_rect) = if a.left <= h.left { (a, h) } else { (h, a) };
        if let Some(cell) = map.cell_at(first_rect.top, 0) {
            first.cell = cell;
        }
        if let Some(cell) = map.cell_at(second_rect.bottom - 1, last) {
            second.cell = cell;
        }
        Ok(CellSelection { anchor, head })
    }

    /// Follow both corner cells through an edit.
    pub fn map(&self, mapping: &Mapping) -> Result<CellSelection> {
        let anchor = mapping.map(self.anchor)?;
        let head = mapping.map(self.head)?;
        if anchor.table != head.table {
            return Err(TableError::DeletedCell(self.head));
        }
        Ok(CellSelection { anchor, head })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    Cursor { at: Anchor },
    Range { anchor: Anchor, head: Anchor },
    /// A whole top-level node.
    Node { index: usize },
    CellRect(CellSelection),
    All,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Cursor { at: Anchor::default() }
    }
}

impl Selection {
    pub fn cursor_in(cell: CellAddress) -> Self {
        Selection::Cursor { at: Anchor::TableCell { cell, char_offset: 0 } }
    }

    /// The cell holding the selection head, if the head is in a table.
    pub fn head_cell(&self) -> Option<CellAddress> {
        match self {
            Selection::Cursor { at } => at.cell(),
            Selection::Range { head, .. } => head.cell(),
            Selection::CellRect(sel) => Some(sel.head),
            Selection::Node { .. } | Selection::All => None,
        }
    }

    /// Follow the selection through an edit. A cell selection whose corner
    /// cell is gone collapses to a cursor where that cell was.
    pub fn map(&self, mapping: &Mapping) -> Selection {
        match self {
            Selection::Cursor { at } => Selection::Cursor { at: at.map(mapping) },
            Selection::Range { anchor, head } => Selection::Range { anchor: anchor.map(mapping), head: head.map(mapping) },
            Selection::Node { index } => match mapping.map_node(*index) {
                Some(index) => Selection::Node { index },
                None => Selection::default(),
            },
            Selection::CellRect(sel) => match sel.map(mapping) {
                Ok(sel) => Selection::CellRect(sel),
                Err(_) => Selection::cursor_in(mapping.map_result(sel.head).pos),
            },
            Selection::All => Selection::All,
        }
    }
}

/// Bring a selection in line with the document's tables.
///
/// A table node selection becomes a cell selection over the whole table
/// unless node selections of tables are allowed; a text range running
/// between two cells of one table becomes a cell selection; a selection
/// pointing at cells that no longer exist collapses to a cursor.
pub fn normalize_selection(doc: &Doc, selection: Selection, allow_table_node_selection: bool) -> Selection {
    match selection {
        Selection::Node { index } if !allow_table_node_selection => {
            let whole = doc
                .table(index)
                .and_then(|t| GridMap::build(t).ok())
                .and_then(|map| CellSelection::whole_table(&map, index));
            whole.map_or(selection, Selection::CellRect)
        }
        Selection::Range { anchor: Anchor::TableCell { cell: a, .. }, head: Anchor::TableCell { cell: h, .. } }
            if a.table == h.table && a.cell != h.cell =>
        {
            CellSelection::new(doc, a, h).map_or(selection, Selection::CellRect)
        }
        Selection::CellRect(sel) => match CellSelection::new(doc, sel.anchor, sel.head) {
            Ok(sel) => Selection::CellRect(sel),
            Err(_) => collapse(doc, sel),
        },
        Selection::Cursor { at: Anchor::TableCell { cell, .. } } if doc.cell(cell).is_none() => collapse_to(doc, cell.table),
        other => other,
    }
}

fn collapse(doc: &Doc, sel: CellSelection) -> Selection {
    [sel.head, sel.anchor]
        .into_iter()
        .find(|cell| doc.cell(*cell).is_some())
        .map(Selection::cursor_in)
        .unwrap_or_else(|| collapse_to(doc, sel.table()))
}

/// A cursor in the first cell of table `index`, or at the document start.
fn collapse_to(doc: &Doc, index: usize) -> Selection {
    match doc.table(index).and_then(|t| t.cell(CellPos::new(0, 0))) {
        Some(_) => Selection::cursor_in(CellAddress::new(index, 0, 0)),
        None => Selection::default(),
    }
}
