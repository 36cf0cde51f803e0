use feinschmecker_core::{GraphNode, KnowledgeStore, Literal, NodeId, NodeLabel, Property, Relation};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{label} node already exists: {key}")]
    DuplicateNode { label: NodeLabel, key: String },

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("invalid recipe document '{title}': {reason}")]
    InvalidDocument { title: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Immutable labeled graph. Built once through [`KnowledgeGraphBuilder`] and then only read.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeGraph {
    nodes: Vec<GraphNode>,
    by_key: HashMap<(NodeLabel, String), NodeId>,
    by_label: HashMap<NodeLabel, Vec<NodeId>>,
    edges: HashMap<(NodeId, Relation), Vec<NodeId>>,
    edge_count: usize,
}

impl KnowledgeGraph {
    pub fn builder() -> KnowledgeGraphBuilder {
        KnowledgeGraphBuilder::default()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn count(&self, label: NodeLabel) -> usize {
        self.nodes_with_label(label).len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }
}

impl KnowledgeStore for KnowledgeGraph {
    fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0 as usize)
    }

    fn lookup(&self, label: NodeLabel, key: &str) -> Option<&GraphNode> {
        self.by_key
            .get(&(label, key.to_string()))
            .and_then(|id| self.node(*id))
    }

    fn nodes_with_label(&self, label: NodeLabel) -> &[NodeId] {
        self.by_label
            .get(&label)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn related(&self, from: NodeId, relation: Relation) -> &[NodeId] {
        self.edges
            .get(&(from, relation))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Debug, Default)]
pub struct KnowledgeGraphBuilder {
    graph: KnowledgeGraph,
}

impl KnowledgeGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node for `(label, key)`, creating it when missing. The flag reports
    /// whether the node already existed.
    pub fn get_or_insert(&mut self, label: NodeLabel, key: &str) -> (NodeId, bool) {
        if let Some(id) = self.graph.by_key.get(&(label, key.to_string())) {
            return (*id, true);
        }
        (self.push_node(label, key), false)
    }

    /// Inserts a node that must not exist yet.
    pub fn insert_unique(&mut self, label: NodeLabel, key: &str) -> GraphResult<NodeId> {
        if self.graph.by_key.contains_key(&(label, key.to_string())) {
            return Err(GraphError::DuplicateNode {
                label,
                key: key.to_string(),
            });
        }
        Ok(self.push_node(label, key))
    }

    pub fn contains(&self, label: NodeLabel, key: &str) -> bool {
        self.graph.by_key.contains_key(&(label, key.to_string()))
    }

    pub fn set_property(
        &mut self,
        id: NodeId,
        property: Property,
        value: impl Into<Literal>,
    ) -> GraphResult<()> {
        let node = self
            .graph
            .nodes
            .get_mut(id.0 as usize)
            .ok_or(GraphError::UnknownNode(id))?;
        node.properties.insert(property, value.into());
        Ok(())
    }

    pub fn relate(&mut self, from: NodeId, relation: Relation, to: NodeId) -> GraphResult<()> {
        let len = self.graph.nodes.len();
        for id in [from, to] {
            if id.0 as usize >= len {
                return Err(GraphError::UnknownNode(id));
            }
        }
        self.graph
            .edges
            .entry((from, relation))
            .or_default()
            .push(to);
        self.graph.edge_count += 1;
        Ok(())
    }

    /// Number of `relation` edges already leaving `from`.
    pub fn degree(&self, from: NodeId, relation: Relation) -> usize {
        self.graph.related(from, relation).len()
    }

    pub fn build(self) -> KnowledgeGraph {
        self.graph
    }

    fn push_node(&mut self, label: NodeLabel, key: &str) -> NodeId {
        let id = NodeId(self.graph.nodes.len() as u32);
        self.graph.nodes.push(GraphNode {
            id,
            label,
            key: key.to_string(),
            properties: BTreeMap::new(),
        });
        self.graph.by_key.insert((label, key.to_string()), id);
        self.graph.by_label.entry(label).or_default().push(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_deduplicates_by_label_and_key() {
        let mut b = KnowledgeGraph::builder();
        let (a, existed) = b.get_or_insert(NodeLabel::Ingredient, "hummus");
        assert!(!existed);
        let (again, existed) = b.get_or_insert(NodeLabel::Ingredient, "hummus");
        assert!(existed);
        assert_eq!(a, again);

        // Same slug under a different label is a different node.
        let recipe = b.insert_unique(NodeLabel::Recipe, "hummus").unwrap();
        assert_ne!(recipe, a);
        assert!(matches!(
            b.insert_unique(NodeLabel::Recipe, "hummus"),
            Err(GraphError::DuplicateNode { .. })
        ));

        let g = b.build();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.lookup(NodeLabel::Recipe, "hummus").unwrap().id, recipe);
        assert!(g.lookup(NodeLabel::Author, "hummus").is_none());
    }

    #[test]
    fn relations_preserve_insertion_order() {
        let mut b = KnowledgeGraph::builder();
        let r = b.insert_unique(NodeLabel::Recipe, "r").unwrap();
        let x = b.insert_unique(NodeLabel::IngredientWithAmount, "x").unwrap();
        let y = b.insert_unique(NodeLabel::IngredientWithAmount, "y").unwrap();
        b.relate(r, Relation::HasIngredient, y).unwrap();
        b.relate(r, Relation::HasIngredient, x).unwrap();
        b.set_property(r, Property::RecipeName, "R").unwrap();

        assert!(b.relate(r, Relation::HasFat, NodeId(99)).is_err());

        let g = b.build();
        assert_eq!(g.related(r, Relation::HasIngredient), &[y, x]);
        assert!(g.related(r, Relation::HasFat).is_empty());
        assert_eq!(g.edge_count(), 2);
        assert_eq!(
            g.node(r).unwrap().property(Property::RecipeName),
            Some(&Literal::from("R"))
        );
        assert_eq!(
            g.nodes_with_label(NodeLabel::IngredientWithAmount),
            &[x, y]
        );
    }
}
