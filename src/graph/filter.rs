use std::collections::{BTreeSet, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::model::{GraphSnapshot, Link, LinkEnd, LinkKind, Node, NodeKind, resolve_endpoint_id};

/// User-selected view criteria. Independent of any snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub allowed_types: BTreeSet<NodeKind>,
    pub search_term: String,
    pub show_errors: bool,
    pub show_calls: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            allowed_types: NodeKind::KNOWN.into_iter().collect(),
            search_term: String::new(),
            show_errors: true,
            show_calls: true,
        }
    }
}

impl FilterCriteria {
    pub fn node_passes(&self, node: &Node) -> bool {
        if !self.allowed_types.contains(&node.kind) {
            return false;
        }
        if !self.show_errors && node.kind == NodeKind::LintError {
            return false;
        }

        let term = self.search_term.trim();
        if term.is_empty() {
            return true;
        }
        let term = term.to_lowercase();
        [node.name(), node.path()]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(&term))
    }

    fn link_kind_passes(&self, kind: &LinkKind) -> bool {
        self.show_calls || *kind != LinkKind::Calls
    }
}

/// Subgraph that survived filtering. Borrowed from the snapshot it was derived from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleGraph<'a> {
    pub nodes: Vec<&'a Node>,
    pub links: Vec<&'a Link>,
}

impl VisibleGraph<'_> {
    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|node| node.id.as_str()).collect()
    }

    /// Structural fingerprint: changes iff the visible node ids or link identities change.
    pub fn structure_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.nodes.len().hash(&mut hasher);
        for node in &self.nodes {
            node.id.hash(&mut hasher);
            node.kind.hash(&mut hasher);
        }
        self.links.len().hash(&mut hasher);
        for link in &self.links {
            link.key().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Pure derivation of the visible subgraph.
pub fn visible<'a>(snapshot: &'a GraphSnapshot, criteria: &FilterCriteria) -> VisibleGraph<'a> {
    let nodes = snapshot
        .nodes()
        .filter(|node| criteria.node_passes(node))
        .collect::<Vec<_>>();

    let surviving = nodes
        .iter()
        .map(|node| node.id.as_str())
        .collect::<HashSet<_>>();

    let links = snapshot
        .links()
        .iter()
        .filter(|link| {
            surviving.contains(resolve_endpoint_id(link, LinkEnd::Source))
                && surviving.contains(resolve_endpoint_id(link, LinkEnd::Target))
                && criteria.link_kind_passes(&link.kind)
        })
        .collect::<Vec<_>>();

    VisibleGraph { nodes, links }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::GraphPayload;

    fn sample() -> GraphSnapshot {
        GraphSnapshot::from_payload(GraphPayload {
            nodes: vec![
                Node::new("f", NodeKind::File).with_property("path", "backend/core/analyzer.py"),
                Node::new("c", NodeKind::Class).with_property("name", "CodebaseAnalyzer"),
                Node::new("m", NodeKind::Method).with_property("name", "analyze_codebase"),
                Node::new("g", NodeKind::Function).with_property("name", "setup_logging"),
                Node::new("e", NodeKind::LintError).with_property("name", "E501"),
            ],
            links: vec![
                Link::new("f", "c", LinkKind::Contains),
                Link::new("c", "m", LinkKind::HasMethod),
                Link::new("m", "g", LinkKind::Calls),
                Link::new("m", "e", LinkKind::HasError),
            ],
        })
    }

    #[test]
    fn search_is_case_insensitive_over_name_and_path() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            search_term: "ANALY".to_owned(),
            ..FilterCriteria::default()
        };
        let view = visible(&snapshot, &criteria);
        let ids = view.node_ids();
        assert_eq!(ids, HashSet::from(["f", "c", "m"]));
        assert_eq!(view.links.len(), 2);
    }

    #[test]
    fn hiding_errors_drops_lint_nodes_and_their_links() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            show_errors: false,
            ..FilterCriteria::default()
        };
        let view = visible(&snapshot, &criteria);
        assert!(!view.node_ids().contains("e"));
        assert!(view.links.iter().all(|link| link.kind != LinkKind::HasError));
    }

    #[test]
    fn hiding_calls_keeps_endpoints() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            show_calls: false,
            ..FilterCriteria::default()
        };
        let view = visible(&snapshot, &criteria);
        assert_eq!(view.nodes.len(), 5);
        assert!(view.links.iter().all(|link| link.kind != LinkKind::Calls));
    }

    #[test]
    fn structure_key_tracks_membership() {
        let snapshot = sample();
        let all = visible(&snapshot, &FilterCriteria::default());
        let again = visible(&snapshot, &FilterCriteria::default());
        assert_eq!(all.structure_key(), again.structure_key());

        let fewer = visible(
            &snapshot,
            &FilterCriteria {
                show_calls: false,
                ..FilterCriteria::default()
            },
        );
        assert_ne!(all.structure_key(), fewer.structure_key());
    }
}
