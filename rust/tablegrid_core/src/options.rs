use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalize::DEFAULT_MAX_REPAIR_PASSES;

/// Settings of an editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableEditingOptions {
    /// Keep a node selection of a whole table instead of turning it into a
    /// cell selection.
    pub allow_table_node_selection: bool,
    /// Upper bound on repair passes per table and edit.
    pub max_repair_passes: usize,
}

impl Default for TableEditingOptions {
    fn default() -> Self {
        Self { allow_table_node_selection: false, max_repair_passes: DEFAULT_MAX_REPAIR_PASSES }
    }
}

impl TableEditingOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
