//! Document tree structures and helpers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Doc {
    pub nodes: Vec<Node>,
    /// Bumped every time a transaction produces this snapshot.
    #[serde(default)]
    pub revision: u64,
}

impl Doc {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes, revision: 0 }
    }

    pub fn table(&self, index: usize) -> Option<&Table> {
        match self.nodes.get(index) {
            Some(Node::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn table_mut(&mut self, index: usize) -> Option<&mut Table> {
        match self.nodes.get_mut(index) {
            Some(Node::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Node indices of every table in the document, in order.
    pub fn table_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| matches!(n, Node::Table(_)).then_some(i))
    }

    pub fn cell(&self, addr: CellAddress) -> Option<&TableCell> {
        self.table(addr.table)?.cell(addr.cell)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    Paragraph { text: String, #[serde(skip_serializing_if = "Option::is_none")] spans: Option<Vec<InlineSpan>> },
    Heading { level: u8, text: String, #[serde(skip_serializing_if = "Option::is_none")] spans: Option<Vec<InlineSpan>> },
    Table(Table),
    Image { src: String, alt: String },
}

impl Default for Node {
    fn default() -> Self {
        Node::Paragraph { text: String::new(), spans: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InlineStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InlineSpan {
    pub text: String,
    #[serde(default)]
    pub style: InlineStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

impl Table {
    /// Build a table from rows of cells.
    pub fn from_rows(rows: Vec<Vec<TableCell>>) -> Self {
        Self { rows: rows.into_iter().map(|cells| TableRow { cells }).collect() }
    }

    pub fn cell(&self, pos: CellPos) -> Option<&TableCell> {
        self.rows.get(pos.row)?.cells.get(pos.index)
    }

    pub fn cell_mut(&mut self, pos: CellPos) -> Option<&mut TableCell> {
        self.rows.get_mut(pos.row)?.cells.get_mut(pos.index)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default = "one")]
    pub colspan: u32,
    #[serde(default = "one")]
    pub rowspan: u32,
    /// Per-column width hints in pixels, one per spanned column. `0` = no hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colwidths: Option<Vec<u32>>,
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub style: CellStyle,
    #[serde(default)]
    pub content: CellContent,
}

impl Default for TableCell {
    fn default() -> Self {
        Self {
            colspan: 1,
            rowspan: 1,
            colwidths: None,
            header: false,
            style: CellStyle::default(),
            content: CellContent::default(),
        }
    }
}

impl TableCell {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content: CellContent::text(text), ..Self::default() }
    }

    pub fn with_span(mut self, colspan: u32, rowspan: u32) -> Self {
        self.colspan = colspan;
        self.rowspan = rowspan;
        self
    }

    pub fn with_colwidths(mut self, widths: Vec<u32>) -> Self {
        self.colwidths = Some(widths);
        self
    }

    pub fn attrs(&self) -> CellAttrs {
        CellAttrs {
            colspan: self.colspan,
            rowspan: self.rowspan,
            colwidths: self.colwidths.clone(),
            header: self.header,
        }
    }

    pub fn set_attrs(&mut self, attrs: CellAttrs) {
        self.colspan = attrs.colspan;
        self.rowspan = attrs.rowspan;
        self.colwidths = attrs.colwidths;
        self.header = attrs.header;
    }

    /// A cell with the same attributes and style but the given content.
    pub fn with_content(&self, content: CellContent) -> Self {
        Self { content, ..self.clone() }
    }
}

/// The structural attributes of a cell, as set by a `SetCellAttrs` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAttrs {
    pub colspan: u32,
    pub rowspan: u32,
    pub colwidths: Option<Vec<u32>>,
    pub header: bool,
}

impl CellAttrs {
    /// Drop `n` spanned columns starting at column offset `at` within the cell.
    pub fn remove_colspan(&self, at: usize, n: u32) -> CellAttrs {
        let mut out = self.clone();
        out.colspan = self.colspan.saturating_sub(n).max(1);
        if let Some(widths) = &mut out.colwidths {
            let end = (at + n as usize).min(widths.len());
            if at < end {
                widths.drain(at..end);
            }
            if widths.iter().all(|w| *w == 0) {
                out.colwidths = None;
            }
        }
        out
    }

    /// Keep only the columns `[from, to)` of the cell's span.
    pub fn slice_colspan(&self, from: usize, to: usize) -> CellAttrs {
        let mut out = self.clone();
        out.colspan = (to - from).max(1) as u32;
        out.colwidths = self.colwidths.as_ref().and_then(|w| {
            let sliced: Vec<u32> = (from..to).map(|i| w.get(i).copied().unwrap_or(0)).collect();
            sliced.iter().any(|w| *w != 0).then_some(sliced)
        });
        out
    }
}

/// Cell content is owned by the host; the grid code only clones it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CellContent {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<InlineSpan>>,
}

impl CellContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), spans: None }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.spans.as_ref().map_or(true, |s| s.iter().all(|s| s.text.is_empty()))
    }

    /// Append another cell's content, the way merged cells keep their text.
    pub fn append(&mut self, other: &CellContent) {
        if other.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&other.text);
        if let Some(theirs) = &other.spans {
            self.spans.get_or_insert_with(Vec::new).extend(theirs.iter().cloned());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CellStyle {
    pub background: Option<String>,
    pub border: Option<BorderStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderStyle {
    pub color: String,
    pub width_px: u32,
}

/// Tree address of a cell within one table: row index, then index in that row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub index: usize,
}

impl CellPos {
    pub const fn new(row: usize, index: usize) -> Self {
        Self { row, index }
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.index)
    }
}

/// A cell position qualified by the node index of its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    pub table: usize,
    pub cell: CellPos,
}

impl CellAddress {
    pub const fn new(table: usize, row: usize, index: usize) -> Self {
        Self { table, cell: CellPos::new(row, index) }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {} cell {}", self.table, self.cell)
    }
}
