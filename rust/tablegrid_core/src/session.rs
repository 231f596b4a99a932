//! The editing session: owns the current snapshot and selection, runs the
//! normalizer after every edit and keeps the drag anchor in step with it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commands;
use crate::doc::{CellAddress, Doc};
use crate::error::{Result, TableError};
use crate::grid::{Axis, GridCache, GridMap, Rect};
use crate::normalize::{CellContentFill, Normalizer};
use crate::options::TableEditingOptions;
use crate::selection::{normalize_selection, CellSelection, Selection};
use crate::transfer::{self, Fragment};
use crate::transform::{Mapping, Transaction};

/// Where the selection head sits, in grid coordinates of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRects {
    pub table_index: usize,
    pub cell: Rect,
    pub table: Rect,
}

/// Notifications for the host UI. Both are informational.
pub trait TableCallbacks {
    /// The head entered a table, left one, or its table changed shape.
    /// `None` means the head is no longer in a table.
    fn selection_changed_on_table(&mut self, _rects: Option<SelectionRects>) {}

    fn context_menu_on_cell(&mut self, _cell: Rect) {}
}

#[derive(Debug, Default)]
pub struct NoCallbacks;

impl TableCallbacks for NoCallbacks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    ContextMenu(Rect),
}

pub struct TableEditing {
    options: TableEditingOptions,
    normalizer: Normalizer,
    fill: CellContentFill,
    callbacks: Box<dyn TableCallbacks>,
    doc: Doc,
    selection: Selection,
    drag_anchor: Option<CellAddress>,
    grids: GridCache,
    deferred: Vec<Deferred>,
}

impl TableEditing {
    /// Start a session on `doc`, normalizing its tables first.
    pub fn new(doc: Doc, options: TableEditingOptions, fill: CellContentFill) -> Result<Self> {
        let normalizer = Normalizer::new(fill.clone(), options.max_repair_passes);
        let doc = normalizer.normalize(&doc)?;
        Ok(Self {
            options,
            normalizer,
            fill,
            callbacks: Box::new(NoCallbacks),
            doc,
            selection: Selection::default(),
            drag_anchor: None,
            grids: GridCache::new(),
            deferred: Vec::new(),
        })
    }

    pub fn from_json(doc_json: &str, options: TableEditingOptions) -> Result<Self> {
        let doc: Doc = serde_json::from_str(doc_json)?;
        Self::new(doc, options, CellContentFill::default())
    }

    pub fn with_callbacks(mut self, callbacks: impl TableCallbacks + 'static) -> Self {
        self.callbacks = Box::new(callbacks);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.doc)?)
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn options(&self) -> &TableEditingOptions {
        &self.options
    }

    pub fn drag_anchor(&self) -> Option<CellAddress> {
        self.drag_anchor
    }

    /// The grid of the table at node `index` in the current snapshot.
    pub fn grid(&self, index: usize) -> Result<std::rc::Rc<GridMap>> {
        self.grids.get(&self.doc, index)
    }

    /// Apply a user edit, then repair tables and bring the selection along.
    pub fn dispatch(&mut self, transaction: &Transaction) -> Result<()> {
        self.commit(transaction, None)
    }

    pub fn set_selection(&mut self, selection: Selection) {
        let before = self.doc.clone();
        let prev = self.selection;
        self.selection = normalize_selection(&self.doc, selection, self.options.allow_table_node_selection);
        self.notify(&before, prev, &Mapping::new());
    }

    /// `selection`, when given, is expressed against the snapshot right after
    /// `transaction` and replaces the mapped old selection.
    fn commit(&mut self, transaction: &Transaction, selection: Option<Selection>) -> Result<()> {
        let before = self.doc.clone();
        let prev = self.selection;
        let applied = transaction.apply(&self.doc)?;
        let mut mapping = transaction.mapping();
        let mut selection = selection.unwrap_or_else(|| self.selection.map(&mapping));

        let doc = match self.normalizer.fix_tables(Some(&before), &applied)? {
            Some(repair) => {
                debug!(steps = repair.transaction.steps.len(), "appending table repair");
                let repair_mapping = repair.transaction.mapping();
                selection = selection.map(&repair_mapping);
                mapping.append(repair_mapping);
                repair.doc
            }
            None => applied,
        };

        self.drag_anchor = self.drag_anchor.and_then(|anchor| {
            let result = mapping.map_result(anchor);
            (!result.deleted).then_some(result.pos)
        });
        self.doc = doc;
        self.selection = normalize_selection(&self.doc, selection, self.options.allow_table_node_selection);
        self.notify(&before, prev, &mapping);
        Ok(())
    }

    fn notify(&mut self, before: &Doc, prev: Selection, mapping: &Mapping) {
        if self.selection == Selection::All {
            self.callbacks.selection_changed_on_table(None);
            return;
        }
        let moved = prev.map(mapping) != self.selection;
        let Some(head) = self.selection.head_cell() else {
            if moved {
                self.callbacks.selection_changed_on_table(None);
            }
            return;
        };
        let rects = match self.grid(head.table).and_then(|map| {
            let cell = map.find_cell(head.cell)?;
            Ok(SelectionRects { table_index: head.table, cell, table: map.full_rect() })
        }) {
            Ok(rects) => rects,
            Err(err) => {
                warn!(error = %err, "selection head does not resolve to a cell");
                return;
            }
        };
        if let Some(old) = prev.head_cell() {
            let same_table = mapping.map_node(old.table) == Some(head.table);
            let old_rect = before.table(old.table).and_then(|t| GridMap::build(t).ok()).map(|m| m.full_rect());
            if same_table && old_rect == Some(rects.table) {
                return;
            }
        }
        self.callbacks.selection_changed_on_table(Some(rects));
    }

    /// Remember `cell` as the anchor of a mouse drag.
    pub fn start_drag(&mut self, cell: CellAddress) -> Result<()> {
        if self.doc.cell(cell).is_none() {
            return Err(TableError::OutOfTable(cell.cell));
        }
        self.drag_anchor = Some(cell);
        self.set_selection(Selection::cursor_in(cell));
        Ok(())
    }

    /// Extend the drag to `cell`. Returns `false` when no drag is active.
    pub fn drag_to(&mut self, cell: CellAddress) -> Result<bool> {
        let Some(anchor) = self.drag_anchor else { return Ok(false) };
        let selection = CellSelection::new(&self.doc, anchor, cell)?;
        self.set_selection(Selection::CellRect(selection));
        Ok(true)
    }

    pub fn end_drag(&mut self) {
        self.drag_anchor = None;
    }

    /// Select the whole of `cell` as a one-cell selection, as a triple click
    /// does.
    pub fn select_cell(&mut self, cell: CellAddress) -> Result<()> {
        let selection = CellSelection::new(&self.doc, cell, cell)?;
        self.set_selection(Selection::CellRect(selection));
        Ok(())
    }

    /// Grow the selection by one cell along `axis`, turning a cursor in a
    /// cell into a cell selection. `false` at the table edge.
    pub fn extend_selection(&mut self, axis: Axis, forward: bool) -> Result<bool> {
        let (anchor, head) = match self.selection {
            Selection::CellRect(sel) => (sel.anchor, sel.head),
            other => match other.head_cell() {
                Some(cell) => (cell, cell),
                None => return Ok(false),
            },
        };
        let map = self.grid(head.table)?;
        let Some(next) = map.next_cell(head.cell, axis, forward) else { return Ok(false) };
        let selection = CellSelection::new(&self.doc, anchor, CellAddress { table: head.table, cell: next })?;
        self.set_selection(Selection::CellRect(selection));
        Ok(true)
    }

    /// The selected rectangle: a cell selection's rect, or the block of the
    /// cell holding the cursor.
    fn selected_rect(&self) -> Result<Option<(usize, Rect)>> {
        match self.selection {
            Selection::CellRect(sel) => {
                let map = self.grid(sel.table())?;
                Ok(Some((sel.table(), sel.rect(&map)?)))
            }
            other => match other.head_cell() {
                Some(cell) => {
                    let map = self.grid(cell.table)?;
                    Ok(Some((cell.table, map.find_cell(cell.cell)?)))
                }
                None => Ok(None),
            },
        }
    }

    pub fn copy(&self) -> Option<Fragment> {
        let Selection::CellRect(sel) = self.selection else { return None };
        let fragment = self.grid(sel.table()).and_then(|map| {
            let table = self.doc.table(sel.table()).ok_or(TableError::OutOfTable(sel.anchor.cell))?;
            transfer::extract(table, &map, sel.rect(&map)?)
        });
        fragment.map_err(|err| warn!(error = %err, "copy failed")).ok()
    }

    /// Paste at the selection and select the pasted block. `false` when the
    /// selection is not in a table.
    pub fn paste(&mut self, fragment: &Fragment) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let pasted = transfer::insert(&self.doc, index, rect, fragment, &self.fill)?;
        let table = pasted.doc.table(index).ok_or_else(|| TableError::InvalidStep(format!("node {} is not a table", index)))?;
        let map = GridMap::build(table)?;
        let corner = |row, col| map.cell_at(row, col).map(|cell| CellAddress { table: index, cell });
        let selection = match (corner(pasted.rect.top, pasted.rect.left), corner(pasted.rect.bottom - 1, pasted.rect.right - 1)) {
            (Some(anchor), Some(head)) => Some(Selection::CellRect(CellSelection { anchor, head })),
            _ => None,
        };
        self.commit(&pasted.transaction, selection)?;
        Ok(true)
    }

    fn run(&mut self, transaction: Option<Transaction>) -> Result<bool> {
        match transaction {
            Some(tr) if !tr.is_empty() => {
                self.commit(&tr, None)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn add_row_after(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::add_row_after(&self.doc, index, rect, &self.fill)?;
        self.run(Some(tr))
    }

    pub fn add_row_before(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::add_row_before(&self.doc, index, rect, &self.fill)?;
        self.run(Some(tr))
    }

    pub fn delete_row(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::delete_row(&self.doc, index, rect)?;
        self.run(Some(tr))
    }

    pub fn add_column_after(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::add_column_after(&self.doc, index, rect, &self.fill)?;
        self.run(Some(tr))
    }

    pub fn add_column_before(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::add_column_before(&self.doc, index, rect, &self.fill)?;
        self.run(Some(tr))
    }

    pub fn delete_column(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::delete_column(&self.doc, index, rect)?;
        self.run(Some(tr))
    }

    pub fn merge_cells(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::merge_cells(&self.doc, index, rect)?;
        self.run(tr)
    }

    pub fn split_cell(&mut self) -> Result<bool> {
        let Some(cell) = self.selection.head_cell() else { return Ok(false) };
        let tr = commands::split_cell(&self.doc, cell.table, cell.cell, &self.fill)?;
        self.run(tr)
    }

    /// Toggle the header flag of the first row of the table holding the
    /// selection.
    pub fn toggle_header_row(&mut self) -> Result<bool> {
        let Some((index, _)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::toggle_header_row(&self.doc, index)?;
        self.run(Some(tr))
    }

    pub fn toggle_header_column(&mut self) -> Result<bool> {
        let Some((index, _)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::toggle_header_column(&self.doc, index)?;
        self.run(Some(tr))
    }

    /// Toggle the header flag of the selected cells.
    pub fn toggle_header_cell(&mut self) -> Result<bool> {
        let Some((index, rect)) = self.selected_rect()? else { return Ok(false) };
        let tr = commands::toggle_header_cells(&self.doc, index, rect)?;
        self.run(Some(tr))
    }

    /// Secondary click on a cell. The context menu callback is held back
    /// until [`settle`](Self::settle) so the host finishes its own click
    /// handling first.
    pub fn context_click(&mut self, cell: CellAddress) -> Result<()> {
        let map = self.grid(cell.table)?;
        let rect = map.find_cell(cell.cell)?;
        self.deferred.push(Deferred::ContextMenu(rect));
        Ok(())
    }

    /// Deliver deferred callbacks.
    pub fn settle(&mut self) {
        for event in std::mem::take(&mut self.deferred) {
            match event {
                Deferred::ContextMenu(rect) => self.callbacks.context_menu_on_cell(rect),
            }
        }
    }

    pub fn destroy(mut self) {
        self.deferred.clear();
        self.callbacks.selection_changed_on_table(None);
    }
}
