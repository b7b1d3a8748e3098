use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Node label as reported by the analysis backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    File,
    Class,
    Method,
    Function,
    LintError,
    Unknown(String),
}

impl NodeKind {
    pub const KNOWN: [NodeKind; 5] = [
        NodeKind::File,
        NodeKind::Class,
        NodeKind::Method,
        NodeKind::Function,
        NodeKind::LintError,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::File => "File",
            Self::Class => "Class",
            Self::Method => "Method",
            Self::Function => "Function",
            Self::LintError => "LintError",
            Self::Unknown(tag) => tag.as_str(),
        }
    }

    /// Visual radius in world units.
    pub fn radius(&self) -> f32 {
        match self {
            Self::File => 14.0,
            Self::Class => 11.0,
            Self::Method | Self::Function => 8.0,
            Self::LintError => 6.0,
            Self::Unknown(_) => 7.0,
        }
    }

    /// Relative charge used by the repulsion force.
    pub fn weight(&self) -> f32 {
        match self {
            Self::File => 1.8,
            Self::Class => 1.4,
            Self::Method | Self::Function | Self::Unknown(_) => 1.0,
            Self::LintError => 0.6,
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "File" => Self::File,
            "Class" => Self::Class,
            "Method" => Self::Method,
            "Function" => Self::Function,
            "LintError" => Self::LintError,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Unknown(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship type between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LinkKind {
    Contains,
    HasMethod,
    Calls,
    HasError,
    Unknown(String),
}

impl LinkKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Contains => "CONTAINS",
            Self::HasMethod => "HAS_METHOD",
            Self::Calls => "CALLS",
            Self::HasError => "HAS_ERROR",
            Self::Unknown(tag) => tag.as_str(),
        }
    }

    /// Rest length of the link spring, before node radii are added.
    ///
    /// Containment stays tight; call edges are allowed to span across clusters.
    pub fn target_distance(&self) -> f32 {
        match self {
            Self::Contains => 70.0,
            Self::HasMethod => 55.0,
            Self::HasError => 40.0,
            Self::Calls => 150.0,
            Self::Unknown(_) => 100.0,
        }
    }
}

impl From<String> for LinkKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "CONTAINS" => Self::Contains,
            "HAS_METHOD" => Self::HasMethod,
            "CALLS" => Self::Calls,
            "HAS_ERROR" => Self::HasError,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<LinkKind> for String {
    fn from(kind: LinkKind) -> Self {
        match kind {
            LinkKind::Unknown(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.property_str("name")
    }

    pub fn path(&self) -> Option<&str> {
        self.property_str("path")
    }

    /// Short human label: name, then last path segment, then id.
    pub fn label(&self) -> &str {
        if let Some(name) = self.name() {
            return name;
        }
        if let Some(path) = self.path() {
            return crate::util::short_path(path);
        }
        self.id.as_str()
    }
}

/// A link endpoint: either a bare node id or an embedded node object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Id(String),
    Node(EmbeddedNode),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedNode {
    pub id: String,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

impl Endpoint {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id.as_str(),
            Self::Node(node) => node.id.as_str(),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(id: &str) -> Self {
        Self::Id(id.to_owned())
    }
}

impl From<String> for Endpoint {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEnd {
    Source,
    Target,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

impl Link {
    pub fn new(source: impl Into<Endpoint>, target: impl Into<Endpoint>, kind: LinkKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    /// Identity used by `link_removed`: (source id, target id, type).
    pub fn key(&self) -> LinkKey {
        LinkKey {
            source: resolve_endpoint_id(self, LinkEnd::Source).to_owned(),
            target: resolve_endpoint_id(self, LinkEnd::Target).to_owned(),
            kind: self.kind.clone(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        resolve_endpoint_id(self, LinkEnd::Source) == node_id
            || resolve_endpoint_id(self, LinkEnd::Target) == node_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub source: String,
    pub target: String,
    pub kind: LinkKind,
}

/// Single normalisation point for the two endpoint representations.
pub fn resolve_endpoint_id(link: &Link, end: LinkEnd) -> &str {
    match end {
        LinkEnd::Source => link.source.id(),
        LinkEnd::Target => link.target.id(),
    }
}

/// Wire shape of `{nodes, links}` responses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Complete graph state. Every link's endpoints resolve to a node of the same snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphSnapshot {
    nodes: BTreeMap<String, Node>,
    links: Vec<Link>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot, dropping links whose endpoints are absent.
    pub fn from_payload(payload: GraphPayload) -> Self {
        let mut snapshot = Self::new();
        for node in payload.nodes {
            snapshot.nodes.entry(node.id.clone()).or_insert(node);
        }

        let mut dropped = 0usize;
        for link in payload.links {
            if snapshot.endpoints_present(&link) {
                snapshot.links.push(link);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, "dropped links with missing endpoints while ingesting snapshot");
        }

        snapshot
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn endpoints_present(&self, link: &Link) -> bool {
        self.nodes
            .contains_key(resolve_endpoint_id(link, LinkEnd::Source))
            && self
                .nodes
                .contains_key(resolve_endpoint_id(link, LinkEnd::Target))
    }

    /// Returns `false` if the id was already present.
    pub(crate) fn insert_node(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Removes the node and every link referencing it. Returns the number of links removed.
    pub(crate) fn remove_node(&mut self, id: &str) -> Option<usize> {
        self.nodes.remove(id)?;
        let before = self.links.len();
        self.links.retain(|link| !link.touches(id));
        Some(before - self.links.len())
    }

    pub(crate) fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }

    pub(crate) fn remove_link(&mut self, key: &LinkKey) -> bool {
        let before = self.links.len();
        self.links.retain(|link| &link.key() != key);
        before != self.links.len()
    }

    pub fn to_payload(&self) -> GraphPayload {
        GraphPayload {
            nodes: self.nodes.values().cloned().collect(),
            links: self.links.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_are_preserved() {
        let node: Node =
            serde_json::from_str(r#"{"id":"1","type":"Module","properties":{}}"#).unwrap();
        assert_eq!(node.kind, NodeKind::Unknown("Module".to_owned()));
        assert_eq!(serde_json::to_value(&node).unwrap()["type"], "Module");

        let link: Link =
            serde_json::from_str(r#"{"source":"1","target":"2","type":"IMPORTS"}"#).unwrap();
        assert_eq!(link.kind, LinkKind::Unknown("IMPORTS".to_owned()));
    }

    #[test]
    fn endpoints_accept_ids_and_embedded_nodes() {
        let link: Link = serde_json::from_str(
            r#"{"source":{"id":"a","type":"File","x":3.0},"target":"b","type":"CONTAINS"}"#,
        )
        .unwrap();
        assert_eq!(resolve_endpoint_id(&link, LinkEnd::Source), "a");
        assert_eq!(resolve_endpoint_id(&link, LinkEnd::Target), "b");
        assert_eq!(link.key(), Link::new("a", "b", LinkKind::Contains).key());
    }

    #[test]
    fn ingestion_drops_dangling_links() {
        let snapshot = GraphSnapshot::from_payload(GraphPayload {
            nodes: vec![Node::new("a", NodeKind::File), Node::new("b", NodeKind::Class)],
            links: vec![
                Link::new("a", "b", LinkKind::Contains),
                Link::new("a", "ghost", LinkKind::Calls),
            ],
        });
        assert_eq!(snapshot.node_count(), 2);
        assert_eq!(snapshot.link_count(), 1);
    }

    #[test]
    fn label_prefers_name_then_file_name() {
        let named = Node::new("1", NodeKind::Class).with_property("name", "Parser");
        assert_eq!(named.label(), "Parser");

        let file = Node::new("2", NodeKind::File).with_property("path", "src/core/analyzer.py");
        assert_eq!(file.label(), "analyzer.py");

        assert_eq!(Node::new("3", NodeKind::Method).label(), "3");
    }
}
