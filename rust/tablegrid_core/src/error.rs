//! Error types for tablegrid_core

use thiserror::Error;

use crate::doc::{CellAddress, CellPos};
use crate::grid::Rect;

#[derive(Error, Debug)]
pub enum TableError {
    /// A cell with a zero span cannot be placed in the grid at all.
    #[error("Malformed table: cell {pos} has colspan {colspan} and rowspan {rowspan}")]
    MalformedTable { pos: CellPos, colspan: u32, rowspan: u32 },

    #[error("Position {0} does not resolve to a cell in the expected table")]
    OutOfTable(CellPos),

    /// An empty rectangle, or one reaching past the table's grid.
    #[error("Rectangle {rect:?} does not fit a {width}x{height} grid")]
    InvalidRect { rect: Rect, width: usize, height: usize },

    #[error("Cell {0} was deleted by an edit")]
    DeletedCell(CellAddress),

    #[error("Fragment is not rectangular")]
    NonRectangularFragment,

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TableError>;
