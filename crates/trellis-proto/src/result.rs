use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::Panel;

/// Decoded body of a `data` frame: the panel metadata echo, the streamed
/// rows for the requested window, and the server's total row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    #[serde(default)]
    pub metadata_panels: Vec<Panel>,
    #[serde(default)]
    pub rows: Vec<RawRow>,
    #[serde(default)]
    pub total_items_count: usize,
}

/// One pre-sorted result row. `cells` line up with the panel order of
/// the originating payload; the marker flags synthetic total rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    #[serde(default)]
    pub cells: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<RowMarker>,
}

impl RawRow {
    pub fn data(cells: Vec<Value>) -> Self {
        RawRow {
            cells,
            marker: None,
        }
    }

    pub fn marked(cells: Vec<Value>, marker: RowMarker) -> Self {
        RawRow {
            cells,
            marker: Some(marker),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowMarker {
    Subtotal,
    GrandTotal,
}

/// Body of an `error` frame: the server-reported failure indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marker_uses_camel_case_tags() {
        let row = RawRow::marked(vec![json!("Total")], RowMarker::GrandTotal);
        let wire = serde_json::to_value(&row).unwrap();
        assert_eq!(wire, json!({ "cells": ["Total"], "marker": "grandTotal" }));
    }

    #[test]
    fn result_tolerates_missing_fields() {
        let result: RawResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.total_items_count, 0);
    }
}
