use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};
use tablegrid_core::grid::{Axis, Rect};
use tablegrid_core::{CellAddress, Doc, Fragment, SelectionRects, TableCallbacks, TableEditing, TableEditingOptions, Transaction};
use wasm_bindgen::prelude::*;

/// Callback events queued for the host to poll with `take_events`.
#[derive(Clone, Default)]
struct EventQueue(Rc<RefCell<Vec<Value>>>);

impl TableCallbacks for EventQueue {
    fn selection_changed_on_table(&mut self, rects: Option<SelectionRects>) {
        self.0.borrow_mut().push(json!({ "event": "selection_changed_on_table", "rects": rects }));
    }

    fn context_menu_on_cell(&mut self, cell: Rect) {
        self.0.borrow_mut().push(json!({ "event": "context_menu_on_cell", "cell": cell }));
    }
}

#[wasm_bindgen]
pub struct Editor {
    core: Option<TableEditing>,
    events: EventQueue,
}

fn session(doc: Doc, options: TableEditingOptions, events: &EventQueue) -> Option<TableEditing> {
    TableEditing::new(doc, options, Default::default()).ok().map(|core| core.with_callbacks(events.clone()))
}

fn cell(table: u32, row: u32, index: u32) -> CellAddress {
    CellAddress::new(table as usize, row as usize, index as usize)
}

#[wasm_bindgen]
impl Editor {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Editor {
        let events = EventQueue::default();
        Editor { core: session(Doc::default(), TableEditingOptions::default(), &events), events }
    }

    /// Falls back to an empty document when either JSON fails to parse.
    pub fn from_json(doc_json: String, options_json: String) -> Editor {
        let events = EventQueue::default();
        let options = TableEditingOptions::from_json(&options_json).unwrap_or_default();
        let doc = serde_json::from_str(&doc_json).unwrap_or_default();
        Editor { core: session(doc, options, &events), events }
    }

    pub fn to_json(&self) -> String {
        self.core.as_ref().and_then(|c| c.to_json().ok()).unwrap_or_else(|| "{}".to_string())
    }

    pub fn selection_json(&self) -> String {
        self.core
            .as_ref()
            .and_then(|c| serde_json::to_string(&c.selection()).ok())
            .unwrap_or_else(|| "null".to_string())
    }

    pub fn set_selection_json(&mut self, selection_json: String) -> bool {
        let (Some(core), Ok(selection)) = (self.core.as_mut(), serde_json::from_str(&selection_json)) else { return false };
        core.set_selection(selection);
        true
    }

    /// Apply a transaction given as JSON; tables are repaired afterwards.
    pub fn dispatch_json(&mut self, transaction_json: String) -> bool {
        let Ok(transaction) = serde_json::from_str::<Transaction>(&transaction_json) else { return false };
        self.core.as_mut().is_some_and(|c| c.dispatch(&transaction).is_ok())
    }

    pub fn take_events(&mut self) -> String {
        let events = std::mem::take(&mut *self.events.0.borrow_mut());
        Value::Array(events).to_string()
    }

    // Drag selection
    pub fn start_drag(&mut self, table: u32, row: u32, index: u32) -> bool {
        self.core.as_mut().is_some_and(|c| c.start_drag(cell(table, row, index)).is_ok())
    }
    pub fn drag_to(&mut self, table: u32, row: u32, index: u32) -> bool {
        self.core.as_mut().is_some_and(|c| c.drag_to(cell(table, row, index)).unwrap_or(false))
    }
    pub fn end_drag(&mut self) { if let Some(c) = self.core.as_mut() { c.end_drag() } }

    /// Triple click: select the whole cell.
    pub fn select_cell(&mut self, table: u32, row: u32, index: u32) -> bool {
        self.core.as_mut().is_some_and(|c| c.select_cell(cell(table, row, index)).is_ok())
    }

    pub fn extend_selection(&mut self, vertical: bool, forward: bool) -> bool {
        let axis = if vertical { Axis::Vertical } else { Axis::Horizontal };
        self.core.as_mut().is_some_and(|c| c.extend_selection(axis, forward).unwrap_or(false))
    }

    // Clipboard
    pub fn copy(&self) -> String {
        self.core
            .as_ref()
            .and_then(TableEditing::copy)
            .and_then(|f| serde_json::to_string(&f).ok())
            .unwrap_or_else(|| "null".to_string())
    }
    pub fn paste(&mut self, fragment_json: String) -> bool {
        let Ok(fragment) = serde_json::from_str::<Fragment>(&fragment_json) else { return false };
        self.core.as_mut().is_some_and(|c| c.paste(&fragment).unwrap_or(false))
    }

    // Table commands on the current selection
    pub fn add_row_after(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.add_row_after().unwrap_or(false)) }
    pub fn add_row_before(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.add_row_before().unwrap_or(false)) }
    pub fn delete_row(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.delete_row().unwrap_or(false)) }
    pub fn add_column_after(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.add_column_after().unwrap_or(false)) }
    pub fn add_column_before(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.add_column_before().unwrap_or(false)) }
    pub fn delete_column(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.delete_column().unwrap_or(false)) }
    pub fn merge_cells(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.merge_cells().unwrap_or(false)) }
    pub fn split_cell(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.split_cell().unwrap_or(false)) }
    pub fn toggle_header_row(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.toggle_header_row().unwrap_or(false)) }
    pub fn toggle_header_column(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.toggle_header_column().unwrap_or(false)) }
    pub fn toggle_header_cell(&mut self) -> bool { self.core.as_mut().is_some_and(|c| c.toggle_header_cell().unwrap_or(false)) }

    // Context menu
    pub fn context_click(&mut self, table: u32, row: u32, index: u32) -> bool {
        self.core.as_mut().is_some_and(|c| c.context_click(cell(table, row, index)).is_ok())
    }
    pub fn settle(&mut self) { if let Some(c) = self.core.as_mut() { c.settle() } }

    pub fn destroy(&mut self) {
        if let Some(c) = self.core.take() {
            c.destroy();
        }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

    const DOC: &str = r#"{"nodes":[{"type":"Table","rows":[{"cells":[{"content":{"text":"a"}},{"content":{"text":"b"}}]},{"cells":[{"content":{"text":"c"}}]}]}]}"#;

    #[wasm_bindgen_test]
    fn loading_repairs_tables() {
        let e = Editor::from_json(DOC.to_string(), "{}".to_string());
        let doc: Doc = serde_json::from_str(&e.to_json()).unwrap();
        assert_eq!(doc.table(0).unwrap().rows[1].cells.len(), 2);
    }

    #[wasm_bindgen_test]
    fn drag_copy_and_events() {
        let mut e = Editor::from_json(DOC.to_string(), "{}".to_string());
        assert!(e.start_drag(0, 0, 0));
        assert!(e.drag_to(0, 0, 1));
        e.end_drag();
        assert!(e.copy().contains("\"width\":2"));
        assert!(e.take_events().contains("selection_changed_on_table"));
        assert!(e.context_click(0, 1, 0));
        e.settle();
        assert!(e.take_events().contains("context_menu_on_cell"));
    }

    #[wasm_bindgen_test]
    fn select_cell_then_insert_before() {
        let mut e = Editor::from_json(DOC.to_string(), "{}".to_string());
        assert!(e.select_cell(0, 1, 1));
        assert!(e.selection_json().contains("cell_rect"));
        assert!(e.add_row_before());
        assert!(e.add_column_before());
        assert!(e.toggle_header_row());
        let doc: Doc = serde_json::from_str(&e.to_json()).unwrap();
        let table = doc.table(0).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].cells.len(), 3);
        assert!(table.rows[0].cells.iter().all(|c| c.header));
        assert!(!e.select_cell(0, 9, 0));
    }
}
