pub mod doc;
pub mod error;
pub mod grid;
pub mod rect;
pub mod transform;
pub mod normalize;
pub mod transfer;
pub mod selection;
pub mod commands;
pub mod options;
pub mod session;

pub use doc::{CellAddress, CellAttrs, CellContent, CellPos, Doc, Node, Table, TableCell, TableRow};
pub use error::{Result, TableError};
pub use grid::{Axis, GridCache, GridMap, Problem, Rect};
pub use normalize::{CellContentFill, Normalizer, Repair};
pub use options::TableEditingOptions;
pub use selection::{normalize_selection, Anchor, CellSelection, Selection};
pub use session::{NoCallbacks, SelectionRects, TableCallbacks, TableEditing};
pub use transfer::{extract, insert, Fragment, Pasted};
pub use transform::{MapResult, Mapping, Step, Transaction};
