use tracing::{debug, warn};

use super::model::{GraphSnapshot, Link, LinkKey, Node};
use crate::error::ViewerError;

/// Incremental change pushed by the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphDelta {
    NodeAdded(Node),
    NodeRemoved { node_id: String },
    LinkAdded(Link),
    LinkRemoved(Link),
}

impl GraphDelta {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeAdded(_) => "node_added",
            Self::NodeRemoved { .. } => "node_removed",
            Self::LinkAdded(_) => "link_added",
            Self::LinkRemoved(_) => "link_removed",
        }
    }
}

/// What a delta did to the snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// Valid but had no effect (duplicate add, removal of something absent).
    Unchanged,
    /// Rejected to keep every link's endpoints present.
    Rejected,
}

/// Authoritative graph state plus load/error status.
///
/// Only the store mutates the snapshot. Every effective mutation bumps `revision`, which
/// downstream caches (filter output, layout) compare against.
#[derive(Debug, Default)]
pub struct GraphStore {
    snapshot: GraphSnapshot,
    loading: bool,
    error: Option<String>,
    revision: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &GraphSnapshot {
        &self.snapshot
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    /// Swaps the whole graph in one step.
    pub fn replace(&mut self, snapshot: GraphSnapshot) {
        debug!(
            nodes = snapshot.node_count(),
            links = snapshot.link_count(),
            "replacing graph snapshot"
        );
        self.snapshot = snapshot;
        self.bump();
    }

    /// Resets to the empty graph.
    pub fn clear(&mut self) {
        self.replace(GraphSnapshot::new());
    }

    pub fn apply_delta(&mut self, delta: GraphDelta) -> DeltaOutcome {
        let kind = delta.name();
        let outcome = match delta {
            GraphDelta::NodeAdded(node) => {
                if node.id.is_empty() {
                    warn!(delta = kind, "ignoring node without id");
                    DeltaOutcome::Rejected
                } else if self.snapshot.insert_node(node) {
                    DeltaOutcome::Applied
                } else {
                    DeltaOutcome::Unchanged
                }
            }
            GraphDelta::NodeRemoved { node_id } => match self.snapshot.remove_node(&node_id) {
                Some(cascaded) => {
                    debug!(node_id = %node_id, cascaded, "removed node and its links");
                    DeltaOutcome::Applied
                }
                None => DeltaOutcome::Unchanged,
            },
            GraphDelta::LinkAdded(link) => {
                if self.snapshot.endpoints_present(&link) {
                    self.snapshot.push_link(link);
                    DeltaOutcome::Applied
                } else {
                    let key = link.key();
                    let violation = ViewerError::Invariant {
                        source_id: key.source,
                        target_id: key.target,
                        kind: key.kind.to_string(),
                    };
                    warn!(delta = kind, "{violation}");
                    DeltaOutcome::Rejected
                }
            }
            GraphDelta::LinkRemoved(link) => {
                let key: LinkKey = link.key();
                if self.snapshot.remove_link(&key) {
                    DeltaOutcome::Applied
                } else {
                    DeltaOutcome::Unchanged
                }
            }
        };

        if outcome == DeltaOutcome::Applied {
            self.bump();
        }
        outcome
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{GraphPayload, LinkKind, NodeKind};

    fn file_and_class() -> GraphStore {
        let mut store = GraphStore::new();
        store.replace(GraphSnapshot::from_payload(GraphPayload {
            nodes: vec![Node::new("A", NodeKind::File), Node::new("B", NodeKind::Class)],
            links: vec![Link::new("A", "B", LinkKind::Contains)],
        }));
        store
    }

    #[test]
    fn node_added_is_idempotent() {
        let mut store = file_and_class();
        let node = Node::new("C", NodeKind::Function);
        assert_eq!(
            store.apply_delta(GraphDelta::NodeAdded(node.clone())),
            DeltaOutcome::Applied
        );
        let revision = store.revision();
        assert_eq!(
            store.apply_delta(GraphDelta::NodeAdded(node)),
            DeltaOutcome::Unchanged
        );
        assert_eq!(store.current().node_count(), 3);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn node_removed_cascades_to_links() {
        let mut store = file_and_class();
        store.apply_delta(GraphDelta::NodeRemoved {
            node_id: "B".to_owned(),
        });
        assert_eq!(store.current().node_count(), 1);
        assert!(store.current().contains_node("A"));
        assert_eq!(store.current().link_count(), 0);
    }

    #[test]
    fn dangling_link_is_rejected() {
        let mut store = file_and_class();
        let outcome = store.apply_delta(GraphDelta::LinkAdded(Link::new(
            "A",
            "missing",
            LinkKind::Calls,
        )));
        assert_eq!(outcome, DeltaOutcome::Rejected);
        assert_eq!(store.current().link_count(), 1);
    }

    #[test]
    fn link_removed_matches_on_identity_triple() {
        let mut store = file_and_class();
        let wrong_kind = Link::new("A", "B", LinkKind::Calls);
        assert_eq!(
            store.apply_delta(GraphDelta::LinkRemoved(wrong_kind)),
            DeltaOutcome::Unchanged
        );
        let right = Link::new("A", "B", LinkKind::Contains);
        assert_eq!(
            store.apply_delta(GraphDelta::LinkRemoved(right)),
            DeltaOutcome::Applied
        );
        assert_eq!(store.current().link_count(), 0);
    }

    #[test]
    fn status_flags_are_independent() {
        let mut store = file_and_class();
        store.set_error(Some("stale".to_owned()));
        store.set_loading(true);
        assert!(store.is_loading());
        assert_eq!(store.error(), Some("stale"));
        store.set_loading(false);
        assert_eq!(store.error(), Some("stale"));
        store.set_error(None);
        assert!(store.error().is_none());
    }

    #[test]
    fn clear_empties_snapshot() {
        let mut store = file_and_class();
        store.clear();
        assert!(store.current().is_empty());
    }
}
