use serde::Serialize;
use serde_json::Value;

use trellis_proto::{Panel, PanelRole};

use crate::arena::{NodeId, TreeArena};

/// One level of the root-to-leaf dimension path for a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionLevel {
    pub title: String,
    pub name: String,
    pub member: Value,
    pub index: usize,
}

/// Walks the parent chain upward from `node`, prepending one level per
/// dimension so the result reads root-to-leaf. The walk stops at the
/// forest root or on the first level belonging to the measures panel.
///
/// When a node has no `field_index`, or no matching panel exists for it,
/// the accumulator is returned unchanged. That is a defensive early
/// exit, not an error.
pub fn dimension_metadata(
    arena: &TreeArena,
    panels: &[Panel],
    node: NodeId,
    mut acc: Vec<DimensionLevel>,
) -> Vec<DimensionLevel> {
    let mut current = Some(node);
    while let Some(id) = current {
        let Some(entry) = arena.node(id) else {
            return acc;
        };
        let Some(field_index) = entry.field_index else {
            return acc;
        };
        let Some(panel) = panels.get(field_index) else {
            return acc;
        };
        if panel.role == PanelRole::Measures {
            return acc;
        }
        acc.insert(
            0,
            DimensionLevel {
                title: panel.title(),
                name: panel.name(),
                member: entry.value.clone(),
                index: field_index,
            },
        );
        current = entry.parent;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{TreeNode, TreeArena};
    use serde_json::json;
    use trellis_proto::FieldSpec;

    fn panel(role: PanelRole, title: &str) -> Panel {
        Panel::new(
            role,
            FieldSpec {
                definition: json!({ "title": title, "name": title })
                    .as_object()
                    .cloned()
                    .unwrap(),
                ..FieldSpec::default()
            },
        )
    }

    #[test]
    fn walks_root_to_leaf() {
        let panels = vec![
            panel(PanelRole::Rows, "Region"),
            panel(PanelRole::Rows, "Product"),
        ];
        let mut arena = TreeArena::new();
        let region = arena.push(TreeNode::data(json!("North"), Some(0)), None);
        let product = arena.push(TreeNode::data(json!("Apples"), Some(1)), Some(region));

        let levels = dimension_metadata(&arena, &panels, product, Vec::new());
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].title, "Region");
        assert_eq!(levels[0].member, json!("North"));
        assert_eq!(levels[1].title, "Product");
        assert_eq!(levels[1].member, json!("Apples"));
    }

    #[test]
    fn missing_field_index_is_identity() {
        let panels = vec![panel(PanelRole::Rows, "Region")];
        let mut arena = TreeArena::new();
        let node = arena.push(TreeNode::data(json!("North"), None), None);

        let seeded = vec![DimensionLevel {
            title: "seed".into(),
            name: "seed".into(),
            member: json!(0),
            index: 9,
        }];
        let levels = dimension_metadata(&arena, &panels, node, seeded.clone());
        assert_eq!(levels, seeded);
    }

    #[test]
    fn unmatched_panel_stops_the_walk() {
        let panels = vec![panel(PanelRole::Rows, "Region")];
        let mut arena = TreeArena::new();
        let node = arena.push(TreeNode::data(json!("North"), Some(5)), None);

        let levels = dimension_metadata(&arena, &panels, node, Vec::new());
        assert!(levels.is_empty());
    }

    #[test]
    fn stops_at_measures_level() {
        let panels = vec![
            panel(PanelRole::Rows, "Region"),
            panel(PanelRole::Measures, "Sales"),
        ];
        let mut arena = TreeArena::new();
        let region = arena.push(TreeNode::data(json!("North"), Some(0)), None);
        let measure = arena.push(TreeNode::data(json!("Sum"), Some(1)), Some(region));

        let levels = dimension_metadata(&arena, &panels, measure, Vec::new());
        assert!(levels.is_empty());
    }
}
