use nodedeck_core::NodeInfo;
use tracing::warn;

/// Ordered, name-unique collection of known nodes. Insertion order is
/// preserved; a backend-provided order survives `replace_all`.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<NodeInfo>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.nodes.clone()
    }

    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the node with the same name in place, or append.
    pub fn upsert(&mut self, node: NodeInfo) {
        match self.nodes.iter_mut().find(|existing| existing.name == node.name) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<NodeInfo> {
        let idx = self.nodes.iter().position(|node| node.name == name)?;
        Some(self.nodes.remove(idx))
    }

    /// Replace the whole registry with an authoritative backend listing.
    /// Duplicate names in the listing keep their first occurrence.
    pub fn replace_all(&mut self, nodes: Vec<NodeInfo>) {
        let mut deduped: Vec<NodeInfo> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if deduped.iter().any(|existing| existing.name == node.name) {
                warn!(name = %node.name, "backend listing repeated a node name; keeping first");
                continue;
            }
            deduped.push(node);
        }
        self.nodes = deduped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodedeck_core::{NodeConfig, NodeStatus};

    fn node(name: &str, status: NodeStatus) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            status,
            config: NodeConfig {
                server_port: 2428,
                swarm_port: 2528,
                run_on_startup: false,
            },
        }
    }

    #[test]
    fn upsert_never_duplicates_a_name() {
        let mut registry = NodeRegistry::new();
        registry.upsert(node("alpha", NodeStatus::Stopped));
        registry.upsert(node("beta", NodeStatus::Stopped));
        registry.upsert(node("alpha", NodeStatus::Running));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("alpha").expect("alpha").status, NodeStatus::Running);
    }

    #[test]
    fn upsert_preserves_insertion_order() {
        let mut registry = NodeRegistry::new();
        registry.upsert(node("charlie", NodeStatus::Stopped));
        registry.upsert(node("alpha", NodeStatus::Stopped));
        registry.upsert(node("charlie", NodeStatus::Running));

        let names: Vec<&str> = registry.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["charlie", "alpha"]);
    }

    #[test]
    fn remove_returns_the_removed_node() {
        let mut registry = NodeRegistry::new();
        registry.upsert(node("alpha", NodeStatus::Stopped));

        let removed = registry.remove("alpha").expect("removed");
        assert_eq!(removed.name, "alpha");
        assert!(registry.is_empty());
        assert!(registry.remove("alpha").is_none());
    }

    #[test]
    fn replace_all_drops_duplicate_names_from_backend() {
        let mut registry = NodeRegistry::new();
        registry.replace_all(vec![
            node("alpha", NodeStatus::Running),
            node("beta", NodeStatus::Stopped),
            node("alpha", NodeStatus::Stopped),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("alpha").expect("alpha").status, NodeStatus::Running);
    }
}
