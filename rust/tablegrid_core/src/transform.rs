//! Edits expressed as data: steps, transactions and position mapping.
//!
//! A transaction never touches the document it is applied to; it produces
//! the next snapshot. Its mapping tells how a cell address from the old
//! snapshot moved, or whether the cell is gone.

use serde::{Deserialize, Serialize};

use crate::doc::{CellAddress, CellAttrs, CellPos, Doc, Node, TableCell, TableRow};
use crate::error::{Result, TableError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Replace cells `[from, to)` of one row with `cells`.
    ReplaceCells { table: usize, row: usize, from: usize, to: usize, cells: Vec<TableCell> },
    SetCellAttrs { table: usize, cell: CellPos, attrs: CellAttrs },
    InsertRows { table: usize, at: usize, rows: Vec<TableRow> },
    RemoveRows { table: usize, from: usize, to: usize },
    InsertNode { index: usize, node: Node },
    RemoveNode { index: usize },
    ReplaceNode { index: usize, node: Node },
}

impl Step {
    pub fn insert_cells(table: usize, row: usize, at: usize, cells: Vec<TableCell>) -> Self {
        Step::ReplaceCells { table, row, from: at, to: at, cells }
    }

    fn apply(&self, doc: &mut Doc) -> Result<()> {
        match self {
            Step::ReplaceCells { table, row, from, to, cells } => {
                let t = table_mut(doc, *table)?;
                let r = t
                    .rows
                    .get_mut(*row)
                    .ok_or_else(|| TableError::InvalidStep(format!("row {} out of range in table {}", row, table)))?;
                if from > to || *to > r.cells.len() {
                    return Err(TableError::InvalidStep(format!("cell range {}..{} out of range in row {}", from, to, row)));
                }
                r.cells.splice(*from..*to, cells.iter().cloned());
            }
            Step::SetCellAttrs { table, cell, attrs } => {
                let c = table_mut(doc, *table)?
                    .cell_mut(*cell)
                    .ok_or_else(|| TableError::InvalidStep(format!("no cell at {} in table {}", cell, table)))?;
                c.set_attrs(attrs.clone());
            }
            Step::InsertRows { table, at, rows } => {
                let t = table_mut(doc, *table)?;
                if *at > t.rows.len() {
                    return Err(TableError::InvalidStep(format!("row {} out of range in table {}", at, table)));
                }
                t.rows.splice(*at..*at, rows.iter().cloned());
            }
            Step::RemoveRows { table, from, to } => {
                let t = table_mut(doc, *table)?;
                if from > to || *to > t.rows.len() {
                    return Err(TableError::InvalidStep(format!("rows {}..{} out of range in table {}", from, to, table)));
                }
                t.rows.drain(*from..*to);
            }
            Step::InsertNode { index, node } => {
                if *index > doc.nodes.len() {
                    return Err(TableError::InvalidStep(format!("node {} out of range", index)));
                }
                doc.nodes.insert(*index, node.clone());
            }
            Step::RemoveNode { index } => {
                if *index >= doc.nodes.len() {
                    return Err(TableError::InvalidStep(format!("node {} out of range", index)));
                }
                doc.nodes.remove(*index);
            }
            Step::ReplaceNode { index, node } => {
                let slot = doc
                    .nodes
                    .get_mut(*index)
                    .ok_or_else(|| TableError::InvalidStep(format!("node {} out of range", index)))?;
                *slot = node.clone();
            }
        }
        Ok(())
    }

    fn step_map(&self) -> StepMap {
        match self {
            Step::ReplaceCells { table, row, from, to, cells } => StepMap {
                scope: Scope::Cells { table: *table, row: *row },
                from: *from,
                to: *to,
                inserted: cells.len(),
            },
            Step::SetCellAttrs { .. } => StepMap::identity(),
            Step::InsertRows { table, at, rows } => StepMap {
                scope: Scope::Rows { table: *table },
                from: *at,
                to: *at,
                inserted: rows.len(),
            },
            Step::RemoveRows { table, from, to } => StepMap { scope: Scope::Rows { table: *table }, from: *from, to: *to, inserted: 0 },
            Step::InsertNode { index, .. } => StepMap { scope: Scope::Nodes, from: *index, to: *index, inserted: 1 },
            Step::RemoveNode { index } => StepMap { scope: Scope::Nodes, from: *index, to: index + 1, inserted: 0 },
            Step::ReplaceNode { index, .. } => StepMap { scope: Scope::Nodes, from: *index, to: index + 1, inserted: 1 },
        }
    }
}

fn table_mut(doc: &mut Doc, index: usize) -> Result<&mut crate::doc::Table> {
    doc.table_mut(index).ok_or_else(|| TableError::InvalidStep(format!("node {} is not a table", index)))
}

/// An ordered list of steps applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub steps: Vec<Step>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn extend(&mut self, other: Transaction) {
        self.steps.extend(other.steps);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The snapshot that results from applying every step to `doc`.
    pub fn apply(&self, doc: &Doc) -> Result<Doc> {
        let mut next = doc.clone();
        for step in &self.steps {
            step.apply(&mut next)?;
        }
        next.revision = doc.revision + 1;
        Ok(next)
    }

    pub fn mapping(&self) -> Mapping {
        Mapping { maps: self.steps.iter().map(Step::step_map).collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapResult {
    pub pos: CellAddress,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Cells { table: usize, row: usize },
    Rows { table: usize },
    Nodes,
    None,
}

/// Items `[from, to)` of one list were replaced by `inserted` new items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepMap {
    scope: Scope,
    from: usize,
    to: usize,
    inserted: usize,
}

impl StepMap {
    fn identity() -> Self {
        StepMap { scope: Scope::None, from: 0, to: 0, inserted: 0 }
    }

    /// New index of `i`, and whether the item at `i` was replaced.
    fn shift(&self, i: usize) -> (usize, bool) {
        if i < self.from {
            (i, false)
        } else if i < self.to {
            (self.from, true)
        } else {
            (i - (self.to - self.from) + self.inserted, false)
        }
    }

    fn map(&self, mut pos: CellAddress) -> (CellAddress, bool) {
        let deleted = match self.scope {
            Scope::Cells { table, row } if pos.table == table && pos.cell.row == row => {
                let (index, deleted) = self.shift(pos.cell.index);
                pos.cell.index = index;
                deleted
            }
            Scope::Rows { table } if pos.table == table => {
                let (row, deleted) = self.shift(pos.cell.row);
                pos.cell.row = row;
                if deleted {
                    pos.cell.index = 0;
                }
                deleted
            }
            Scope::Nodes => {
                let (table, deleted) = self.shift(pos.table);
                pos.table = table;
                deleted
            }
            _ => false,
        };
        (pos, deleted)
    }
}

/// Position mapping accumulated over a transaction's steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the steps of a later transaction.
    pub fn append(&mut self, other: Mapping) {
        self.maps.extend(other.maps);
    }

    pub fn map_result(&self, pos: CellAddress) -> MapResult {
        self.maps.iter().fold(MapResult { pos, deleted: false }, |acc, m| {
            let (pos, deleted) = m.map(acc.pos);
            MapResult { pos, deleted: acc.deleted || deleted }
        })
    }

    /// New index of a top-level node, or `None` if it was removed.
    pub fn map_node(&self, index: usize) -> Option<usize> {
        let mut index = index;
        for m in self.maps.iter().filter(|m| m.scope == Scope::Nodes) {
            let (next, deleted) = m.shift(index);
            if deleted {
                return None;
            }
            index = next;
        }
        Some(index)
    }

    pub fn map(&self, pos: CellAddress) -> Result<CellAddress> {
        let result = self.map_result(pos);
        if result.deleted {
            Err(TableError::DeletedCell(pos))
        } else {
            Ok(result.pos)
        }
    }
}
