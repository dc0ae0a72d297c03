use serde::Serialize;
use serde_json::Value;

/// Index into the owning arena. Parent links are plain indices, so the
/// forest never forms an ownership cycle: the arena holds the only
/// strong references.
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Data,
    Subtotal,
    Grandtotal,
}

/// One header node. Children keep insertion order as received; the
/// engine never re-sorts client-side.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    /// Canonical grouping key derived from `value`.
    pub key: String,
    pub value: Value,
    pub user_type: NodeType,
    /// Panel index this level belongs to, when known.
    pub field_index: Option<usize>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl TreeNode {
    pub fn data(value: Value, field_index: Option<usize>) -> Self {
        TreeNode {
            key: cell_key(&value),
            value,
            user_type: NodeType::Data,
            field_index,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn total(value: Value, user_type: NodeType, field_index: Option<usize>) -> Self {
        TreeNode {
            key: cell_key(&value),
            value,
            user_type,
            field_index,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena-backed single-rooted forest of header nodes.
#[derive(Debug, Clone, Default)]
pub struct TreeArena {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
}

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Appends a node under `parent` (or as a root) and wires both links.
    pub fn push(&mut self, mut node: TreeNode, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        node.parent = parent;
        self.nodes.push(node);
        match parent {
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(parent_id) {
                    parent_node.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Root-to-leaf value paths in tree order. Marker nodes appear as
    /// their own single-entry continuation of the path.
    pub fn leaf_paths(&self) -> Vec<Vec<Value>> {
        let mut paths = Vec::new();
        let mut stack = Vec::new();
        for &root in &self.roots {
            self.collect_paths(root, &mut stack, &mut paths);
        }
        paths
    }

    fn collect_paths(&self, id: NodeId, stack: &mut Vec<Value>, out: &mut Vec<Vec<Value>>) {
        let Some(node) = self.node(id) else {
            return;
        };
        stack.push(node.value.clone());
        if node.is_leaf() {
            out.push(stack.clone());
        } else {
            for &child in &node.children {
                self.collect_paths(child, stack, out);
            }
        }
        stack.pop();
    }
}

/// Canonical string form of a cell value, used for run-length grouping.
pub fn cell_key(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
