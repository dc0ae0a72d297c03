use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The structured request describing dimensions, measures, filters and
/// sort directives. Immutable once submitted; the controllers produce a
/// fresh payload for every load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_ref: Option<Value>,
    #[serde(default)]
    pub metadata_panels: Vec<Panel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grand_totals: Option<GrandTotals>,
    /// Window start for incremental fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Window length for incremental fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrandTotals {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<bool>,
}

/// A named role grouping one field specification within the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub field_spec: FieldSpec,
    pub role: PanelRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_ref: Option<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

impl Panel {
    pub fn new(role: PanelRole, field_spec: FieldSpec) -> Self {
        Panel {
            field_spec,
            role,
            field_ref: None,
            disabled: None,
            hierarchies: None,
            format: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    /// Stable key identifying this panel across payload rebuilds.
    /// Prefers the explicit field reference, then the field definition's
    /// own id, then its title.
    pub fn key(&self) -> Option<String> {
        if let Some(field_ref) = &self.field_ref {
            if let Some(id) = &field_ref.id {
                return Some(id.clone());
            }
            if let Some(index) = field_ref.index {
                return Some(index.to_string());
            }
        }
        self.field_spec
            .definition_str("id")
            .or_else(|| self.field_spec.definition_str("title"))
            .map(str::to_owned)
    }

    /// Display title for header metadata, falling back to the field name.
    pub fn title(&self) -> String {
        self.field_spec
            .definition_str("title")
            .or_else(|| self.field_spec.definition_str("name"))
            .unwrap_or_default()
            .to_owned()
    }

    /// Machine name for header metadata.
    pub fn name(&self) -> String {
        self.field_spec
            .definition_str("name")
            .or_else(|| self.field_spec.definition_str("id"))
            .unwrap_or_default()
            .to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelRole {
    Rows,
    Columns,
    Measures,
    Scope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// The dimension/measure definition plus its optional sort directive.
/// The definition itself is opaque to the engine and flattened into the
/// same JSON object on the wire: `{ ...fieldDefinition, sortDetails?, type?, sort? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_details: Option<SortDetails>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub definition: serde_json::Map<String, Value>,
}

impl FieldSpec {
    pub fn definition_str(&self, key: &str) -> Option<&str> {
        self.definition.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Detailed sort directive attached to a panel's field spec: direction,
/// the measure column a dimension sort is evaluated against, and whether
/// this panel holds the most recently applied sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDetails {
    pub dir: SortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_path: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub is_last_applied: bool,
}
