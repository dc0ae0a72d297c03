use serde_json::Value;

use trellis_proto::{Panel, PanelRole, RawRow, RowMarker};

use crate::arena::{cell_key, NodeId, NodeType, TreeArena, TreeNode};

#[derive(Debug, Clone)]
struct LevelSpec {
    /// Column of the row stream this level reads.
    column: usize,
    /// Index of the panel in the full payload panel list.
    panel_index: usize,
}

/// Converts a pre-sorted row stream into an axis tree by walking the
/// axis dimensions in panel order and run-length grouping consecutive
/// rows that share a value at the current level. The server pre-sorts,
/// so this is straight grouping, never a sort.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    levels: Vec<LevelSpec>,
}

impl TreeBuilder {
    /// Levels are the enabled panels of `axis`, in panel order. A panel
    /// with an explicit field reference index reads that stream column;
    /// otherwise the panel's index in the full payload list is used,
    /// since row cells line up with payload panel order across axes.
    pub fn for_axis(panels: &[Panel], axis: PanelRole) -> Self {
        let levels = panels
            .iter()
            .enumerate()
            .filter(|(_, panel)| panel.role == axis && !panel.is_disabled())
            .map(|(panel_index, panel)| LevelSpec {
                column: panel
                    .field_ref
                    .as_ref()
                    .and_then(|field_ref| field_ref.index)
                    .unwrap_or(panel_index),
                panel_index,
            })
            .collect();
        TreeBuilder { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Builds a fresh tree from `rows`.
    pub fn build(&self, rows: &[RawRow]) -> TreeArena {
        let mut arena = TreeArena::new();
        let rows: Vec<&RawRow> = rows.iter().collect();
        self.build_level(&mut arena, &rows, 0, None);
        arena
    }

    /// Extends an existing tree with a later page, in place. Only the
    /// trailing node chain can absorb continuing groups, so insertion
    /// order is preserved across the page boundary.
    pub fn extend(&self, arena: &mut TreeArena, rows: &[RawRow]) {
        let rows: Vec<&RawRow> = rows.iter().collect();
        self.extend_level(arena, &rows, 0, None);
    }

    fn build_level(
        &self,
        arena: &mut TreeArena,
        rows: &[&RawRow],
        level: usize,
        parent: Option<NodeId>,
    ) {
        let Some(spec) = self.levels.get(level) else {
            return;
        };

        let mut run: Option<(String, Value, Vec<&RawRow>)> = None;
        for &row in rows {
            if let Some(marker) = row.marker {
                // Total rows never participate in grouping; they become
                // synthetic siblings in stream position.
                self.flush_run(arena, run.take(), level, parent, spec);
                let value = row.cells.get(spec.column).cloned().unwrap_or(Value::Null);
                let user_type = match marker {
                    RowMarker::Subtotal => NodeType::Subtotal,
                    RowMarker::GrandTotal => NodeType::Grandtotal,
                };
                arena.push(
                    TreeNode::total(value, user_type, Some(spec.panel_index)),
                    parent,
                );
                continue;
            }

            let Some(cell) = row.cells.get(spec.column) else {
                tracing::warn!(column = spec.column, "skipping row with missing cell");
                continue;
            };
            let key = cell_key(cell);
            match &mut run {
                Some((run_key, _, run_rows)) if *run_key == key => run_rows.push(row),
                _ => {
                    self.flush_run(arena, run.take(), level, parent, spec);
                    run = Some((key, cell.clone(), vec![row]));
                }
            }
        }
        self.flush_run(arena, run.take(), level, parent, spec);
    }

    fn flush_run(
        &self,
        arena: &mut TreeArena,
        run: Option<(String, Value, Vec<&RawRow>)>,
        level: usize,
        parent: Option<NodeId>,
        spec: &LevelSpec,
    ) {
        let Some((_, value, rows)) = run else {
            return;
        };
        let node = arena.push(TreeNode::data(value, Some(spec.panel_index)), parent);
        self.build_level(arena, &rows, level + 1, Some(node));
    }

    fn extend_level(
        &self,
        arena: &mut TreeArena,
        rows: &[&RawRow],
        level: usize,
        parent: Option<NodeId>,
    ) {
        let Some(spec) = self.levels.get(level) else {
            return;
        };
        if rows.is_empty() {
            return;
        }

        let last = match parent {
            Some(parent_id) => arena.children(parent_id).last().copied(),
            None => arena.roots().last().copied(),
        };

        let mut rest = rows;
        if let Some(last_id) = last {
            let trailing = arena
                .node(last_id)
                .filter(|node| node.user_type == NodeType::Data)
                .map(|node| node.key.clone());
            if let Some(last_key) = trailing {
                let split = rest
                    .iter()
                    .position(|row| {
                        row.marker.is_some()
                            || row.cells.get(spec.column).map(cell_key).as_deref()
                                != Some(last_key.as_str())
                    })
                    .unwrap_or(rest.len());
                if split > 0 {
                    self.extend_level(arena, &rest[..split], level + 1, Some(last_id));
                    rest = &rest[split..];
                }
            }
        }

        self.build_level(arena, rest, level, parent);
    }
}
