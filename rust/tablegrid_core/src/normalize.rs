//! Repairs tables after an edit so that every row covers the same columns
//! and no two cells overlap.
//!
//! Repairs only add cells or shrink spans. Content is never dropped, except
//! for the empty filler cells the repair itself creates.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::doc::{CellAttrs, CellContent, CellPos, Doc, Table, TableCell};
use crate::error::{Result, TableError};
use crate::grid::{GridMap, Problem, Rect};
use crate::transform::{Step, Transaction};

/// Supplies the content of cells the normalizer has to create.
#[derive(Clone)]
pub struct CellContentFill(Rc<dyn Fn() -> CellContent>);

impl CellContentFill {
    pub fn new(f: impl Fn() -> CellContent + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn content(&self) -> CellContent {
        (self.0)()
    }

    /// A fresh 1×1 cell.
    pub fn cell(&self, header: bool, width: u32) -> TableCell {
        TableCell {
            header,
            colwidths: (width != 0).then(|| vec![width]),
            content: self.content(),
            ..TableCell::default()
        }
    }
}

impl Default for CellContentFill {
    fn default() -> Self {
        Self::new(CellContent::default)
    }
}

impl fmt::Debug for CellContentFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CellContentFill(..)")
    }
}

/// A corrective transaction and the snapshot it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub transaction: Transaction,
    pub doc: Doc,
}

pub const DEFAULT_MAX_REPAIR_PASSES: usize = 64;

#[derive(Debug, Clone)]
pub struct Normalizer {
    fill: CellContentFill,
    max_passes: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(CellContentFill::default(), DEFAULT_MAX_REPAIR_PASSES)
    }
}

impl Normalizer {
    pub fn new(fill: CellContentFill, max_passes: usize) -> Self {
        Self { fill, max_passes: max_passes.max(1) }
    }

    /// Inspect every table of `new` and return one repair covering all of
    /// them, or `None` when nothing needs fixing.
    ///
    /// With `old` given, tables identical to the node at the same index in
    /// `old` are assumed to be fine already.
    pub fn fix_tables(&self, old: Option<&Doc>, new: &Doc) -> Result<Option<Repair>> {
        let mut doc = new.clone();
        let mut transaction = Transaction::new();
        let indices: Vec<usize> = new.table_indices().collect();
        for index in indices {
            if old.is_some_and(|old| old.nodes.get(index) == new.nodes.get(index)) {
                continue;
            }
            match self.fix_table(&doc, index) {
                Ok(Some(repair)) => {
                    doc = repair.doc;
                    transaction.extend(repair.transaction);
                }
                Ok(None) => {}
                Err(err @ TableError::MalformedTable { .. }) => {
                    warn!(table = index, error = %err, "skipping table that cannot be placed");
                }
                Err(err) => return Err(err),
            }
        }
        if transaction.is_empty() {
            return Ok(None);
        }
        doc.revision = new.revision + 1;
        Ok(Some(Repair { transaction, doc }))
    }

    /// The normalized form of `doc`; `doc` itself when nothing needs fixing.
    pub fn normalize(&self, doc: &Doc) -> Result<Doc> {
        Ok(self.fix_tables(None, doc)?.map(|r| r.doc).unwrap_or_else(|| doc.clone()))
    }

    /// Repair the table at node `index` until its grid reports no problems.
    pub fn fix_table(&self, doc: &Doc, index: usize) -> Result<Option<Repair>> {
        let mut work = doc.clone();
        let mut transaction = Transaction::new();
        for pass in 0..self.max_passes {
            let table = work
                .table(index)
                .ok_or_else(|| TableError::InvalidStep(format!("node {} is not a table", index)))?;
            let map = GridMap::build(table)?;
            if map.problems().is_empty() {
                return Ok(finish(transaction, work));
            }
            let fix = repair_pass(table, &map, index, &self.fill)?;
            debug!(table = index, pass, problems = map.problems().len(), steps = fix.steps.len(), "repairing table");
            work = fix.apply(&work)?;
            transaction.extend(fix);
        }
        warn!(table = index, passes = self.max_passes, "table still irregular after repair bound");
        Ok(finish(transaction, work))
    }
}

fn finish(transaction: Transaction, doc: Doc) -> Option<Repair> {
    (!transaction.is_empty()).then_some(Repair { transaction, doc })
}

/// One round of repairs. Collisions go one at a time since each changes the
/// placement of everything after it; span shrinking goes before padding so
/// that padding measures the final widths.
fn repair_pass(table: &Table, map: &GridMap, index: usize, fill: &CellContentFill) -> Result<Transaction> {
    let problems = map.problems();

    if let Some((pos, natural, blocker)) = problems.iter().find_map(|p| match p {
        Problem::Collision { pos, natural, blocker } => Some((*pos, *natural, *blocker)),
        _ => None,
    }) {
        return split_collision(table, map, index, pos, natural, blocker, fill);
    }

    let mut attrs: BTreeMap<CellPos, CellAttrs> = BTreeMap::new();
    for problem in problems {
        if let Problem::OverlongRowspan { pos, excess } = problem {
            let a = attrs_entry(&mut attrs, table, *pos)?;
            a.rowspan = a.rowspan.saturating_sub(*excess).max(1);
        }
    }
    if attrs.is_empty() {
        for problem in problems {
            if let Problem::Overflow { pos, keep } = problem {
                let a = attrs_entry(&mut attrs, table, *pos)?;
                *a = a.remove_colspan(*keep as usize, a.colspan.saturating_sub(*keep));
            }
        }
    }
    if !attrs.is_empty() {
        return Ok(set_attrs(index, attrs));
    }

    for problem in problems {
        if let Problem::ColwidthMismatch { pos, colwidths } = problem {
            attrs_entry(&mut attrs, table, *pos)?.colwidths = colwidths.clone();
        }
    }
    let mut transaction = set_attrs(index, attrs);
    for problem in problems {
        if let Problem::Missing { row, count } = problem {
            let cells = &table.rows[*row].cells;
            let header = cells.first().is_some_and(|c| c.header);
            let fillers = empty_slots(map, *row)
                .take(*count)
                .map(|col| fill.cell(header, map.col_widths().get(col).copied().unwrap_or(0)))
                .collect();
            transaction.push(Step::insert_cells(index, *row, cells.len(), fillers));
        }
    }
    Ok(transaction)
}

/// Cut the earlier rowspan cell `blocker` off above the colliding cell's
/// row. The slots it gives up get filler cells, except those the colliding
/// cell takes once it sits at its natural column.
fn split_collision(
    table: &Table,
    map: &GridMap,
    index: usize,
    pos: CellPos,
    natural: usize,
    blocker: CellPos,
    fill: &CellContentFill,
) -> Result<Transaction> {
    let upper = map.find_cell(blocker)?;
    let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
    let lower = table.cell(blocker).ok_or(TableError::OutOfTable(blocker))?;
    let cut = pos.row;
    let taken = Rect::new(
        natural,
        cut,
        natural + cell.colspan as usize,
        (cut + cell.rowspan as usize).min(map.height()),
    );
    debug!(cell = %pos, blocker = %blocker, rows = cut - upper.top, "splitting overlapping rowspan");

    let mut transaction = Transaction::new();
    let mut attrs = lower.attrs();
    attrs.rowspan = (cut - upper.top) as u32;
    transaction.push(Step::SetCellAttrs { table: index, cell: blocker, attrs: attrs.clone() });

    for row in cut..upper.bottom {
        let pieces: Vec<TableCell> = (upper.left..upper.right)
            .filter(|col| !taken.contains_slot(row, *col))
            .map(|col| {
                let j = col - upper.left;
                let piece_attrs = CellAttrs { rowspan: 1, ..attrs.slice_colspan(j, j + 1) };
                let mut piece = lower.with_content(fill.content());
                piece.set_attrs(piece_attrs);
                piece
            })
            .collect();
        if pieces.is_empty() {
            continue;
        }
        // The colliding cell sits before the pieces in its own row.
        let at = map.position_at(row, upper.left) + usize::from(row == cut);
        transaction.push(Step::insert_cells(index, row, at, pieces));
    }
    Ok(transaction)
}

fn attrs_entry<'a>(attrs: &'a mut BTreeMap<CellPos, CellAttrs>, table: &Table, pos: CellPos) -> Result<&'a mut CellAttrs> {
    if !attrs.contains_key(&pos) {
        let cell = table.cell(pos).ok_or(TableError::OutOfTable(pos))?;
        attrs.insert(pos, cell.attrs());
    }
    attrs.get_mut(&pos).ok_or(TableError::OutOfTable(pos))
}

fn set_attrs(index: usize, attrs: BTreeMap<CellPos, CellAttrs>) -> Transaction {
    let mut transaction = Transaction::new();
    for (cell, attrs) in attrs {
        transaction.push(Step::SetCellAttrs { table: index, cell, attrs });
    }
    transaction
}

fn empty_slots(map: &GridMap, row: usize) -> impl Iterator<Item = usize> + '_ {
    (0..map.width()).filter(move |col| map.cell_at(row, *col).is_none())
}
