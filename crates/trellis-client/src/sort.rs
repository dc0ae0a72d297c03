use std::collections::BTreeMap;

use trellis_proto::{QueryPayload, SortDetails, SortDirection};

/// Recorded sort for one panel. Sticky across reloads until a caller
/// changes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortState {
    pub direction: Option<SortDirection>,
    /// Which value column a dimension sort is evaluated against,
    /// keyed panel-key to field-id.
    pub by_measure_path: Option<BTreeMap<String, String>>,
    pub is_last_applied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SortOptions {
    pub by_measure_path: Option<BTreeMap<String, String>>,
}

/// Owns per-dimension sort state and serializes it into the next query
/// payload. Invariant: at most one panel is marked `is_last_applied`.
#[derive(Debug, Default)]
pub struct SortController {
    states: BTreeMap<String, SortState>,
}

impl SortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, panel_key: &str) -> Option<&SortState> {
        self.states.get(panel_key)
    }

    pub fn last_applied(&self) -> Option<(&str, &SortState)> {
        self.states
            .iter()
            .find(|(_, state)| state.is_last_applied)
            .map(|(key, state)| (key.as_str(), state))
    }

    /// Records a sort for `panel_key` and makes it the last-applied one,
    /// clearing the flag on every other panel.
    pub fn set_sort(
        &mut self,
        panel_key: &str,
        direction: Option<SortDirection>,
        options: SortOptions,
    ) {
        for state in self.states.values_mut() {
            state.is_last_applied = false;
        }
        let state = self.states.entry(panel_key.to_owned()).or_default();
        state.direction = direction;
        state.by_measure_path = options.by_measure_path;
        state.is_last_applied = true;
    }

    /// Returns a new payload with each recorded panel's sort directive
    /// written into its field spec. Panels with no recorded state pass
    /// through untouched.
    pub fn to_query_sort(&self, payload: &QueryPayload) -> QueryPayload {
        let mut next = payload.clone();
        for panel in &mut next.metadata_panels {
            let Some(key) = panel.key() else {
                continue;
            };
            let Some(state) = self.states.get(&key) else {
                continue;
            };
            panel.field_spec.sort = state.direction;
            panel.field_spec.sort_details = state.direction.map(|dir| SortDetails {
                dir,
                measure_path: state.by_measure_path.clone(),
                is_last_applied: state.is_last_applied,
            });
        }
        next
    }

    /// Inverse of `to_query_sort`, used to re-hydrate controller state
    /// from a payload after an externally-driven reload.
    pub fn from_query_sort(payload: &QueryPayload) -> BTreeMap<String, SortState> {
        let mut states = BTreeMap::new();
        let mut last_applied_seen = false;
        for panel in &payload.metadata_panels {
            let Some(key) = panel.key() else {
                continue;
            };
            let details = panel.field_spec.sort_details.as_ref();
            let direction = details.map(|d| d.dir).or(panel.field_spec.sort);
            if direction.is_none() && details.is_none() {
                continue;
            }
            let mut is_last_applied = details.map(|d| d.is_last_applied).unwrap_or(false);
            // Defensive: a payload claiming several last-applied panels
            // keeps only the first.
            if is_last_applied && last_applied_seen {
                is_last_applied = false;
            }
            last_applied_seen |= is_last_applied;
            states.insert(
                key,
                SortState {
                    direction,
                    by_measure_path: details.and_then(|d| d.measure_path.clone()),
                    is_last_applied,
                },
            );
        }
        states
    }

    pub fn hydrate(&mut self, payload: &QueryPayload) {
        self.states = Self::from_query_sort(payload);
    }
}
