use crate::{GraphNode, NodeId, NodeLabel, ReloadEvent, Relation};

/// Read-only access to a loaded knowledge graph.
///
/// All methods are blocking and cheap; implementations are expected to be immutable
/// after construction so concurrent readers never contend.
pub trait KnowledgeStore: Send + Sync {
    fn node(&self, id: NodeId) -> Option<&GraphNode>;

    /// Point lookup by stable identity. Keys are unique per label.
    fn lookup(&self, label: NodeLabel, key: &str) -> Option<&GraphNode>;

    /// All nodes carrying `label`, in insertion order.
    fn nodes_with_label(&self, label: NodeLabel) -> &[NodeId];

    /// Targets of `relation` leaving `from`, in insertion order.
    fn related(&self, from: NodeId, relation: Relation) -> &[NodeId];

    fn node_count(&self) -> usize;
}

/// Receives a notification whenever the knowledge store is replaced.
pub trait ReloadListener: Send + Sync {
    fn on_reload(&self, event: &ReloadEvent);
}
