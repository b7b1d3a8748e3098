//! Property tests for the graph store: any sequence of pushed deltas keeps every link's
//! endpoints present, and re-applying a delta never changes the graph twice.

use codegraph_viewer::graph::{
    DeltaOutcome, GraphDelta, GraphPayload, GraphSnapshot, GraphStore, Link, LinkEnd, LinkKind,
    Node, NodeKind, resolve_endpoint_id,
};
use proptest::collection::vec;
use proptest::prelude::*;

fn node_id(index: u8) -> String {
    format!("n{index}")
}

fn kind_strategy() -> impl Strategy<Value = NodeKind> {
    prop_oneof![
        Just(NodeKind::File),
        Just(NodeKind::Class),
        Just(NodeKind::Method),
        Just(NodeKind::Function),
        Just(NodeKind::LintError),
    ]
}

fn link_kind_strategy() -> impl Strategy<Value = LinkKind> {
    prop_oneof![
        Just(LinkKind::Contains),
        Just(LinkKind::HasMethod),
        Just(LinkKind::Calls),
        Just(LinkKind::HasError),
    ]
}

fn delta_strategy() -> impl Strategy<Value = GraphDelta> {
    prop_oneof![
        (0u8..8, kind_strategy())
            .prop_map(|(id, kind)| GraphDelta::NodeAdded(Node::new(node_id(id), kind))),
        (0u8..8).prop_map(|id| GraphDelta::NodeRemoved { node_id: node_id(id) }),
        (0u8..8, 0u8..8, link_kind_strategy()).prop_map(|(source, target, kind)| {
            GraphDelta::LinkAdded(Link::new(node_id(source), node_id(target), kind))
        }),
        (0u8..8, 0u8..8, link_kind_strategy()).prop_map(|(source, target, kind)| {
            GraphDelta::LinkRemoved(Link::new(node_id(source), node_id(target), kind))
        }),
    ]
}

fn assert_endpoints_present(snapshot: &GraphSnapshot) -> Result<(), TestCaseError> {
    for link in snapshot.links() {
        prop_assert!(snapshot.contains_node(resolve_endpoint_id(link, LinkEnd::Source)));
        prop_assert!(snapshot.contains_node(resolve_endpoint_id(link, LinkEnd::Target)));
    }
    Ok(())
}

proptest! {
    /// No delta sequence can leave a dangling link behind.
    #[test]
    fn deltas_preserve_endpoint_invariant(deltas in vec(delta_strategy(), 0..60)) {
        let mut store = GraphStore::new();
        for delta in deltas {
            store.apply_delta(delta);
            assert_endpoints_present(store.current())?;
        }
    }

    /// Node adds and removals are idempotent: the second application is a no-op.
    #[test]
    fn node_deltas_are_idempotent(
        setup in vec(delta_strategy(), 0..30),
        delta in delta_strategy().prop_filter("node deltas only", |delta| {
            matches!(delta, GraphDelta::NodeAdded(_) | GraphDelta::NodeRemoved { .. })
        }),
    ) {
        let mut store = GraphStore::new();
        for delta in setup {
            store.apply_delta(delta);
        }

        store.apply_delta(delta.clone());
        let after_first = store.current().clone();
        let revision = store.revision();

        prop_assert_ne!(store.apply_delta(delta), DeltaOutcome::Applied);
        prop_assert_eq!(store.current(), &after_first);
        prop_assert_eq!(store.revision(), revision);
    }

    /// The revision moves exactly when a delta reports that it applied.
    #[test]
    fn revision_tracks_applied_deltas(deltas in vec(delta_strategy(), 0..40)) {
        let mut store = GraphStore::new();
        for delta in deltas {
            let before = store.revision();
            let outcome = store.apply_delta(delta);
            if outcome == DeltaOutcome::Applied {
                prop_assert_eq!(store.revision(), before + 1);
            } else {
                prop_assert_eq!(store.revision(), before);
            }
        }
    }

    /// Ingesting any payload drops exactly the links that point outside it.
    #[test]
    fn ingestion_keeps_only_resolvable_links(
        ids in vec(0u8..8, 0..8),
        links in vec((0u8..8, 0u8..8, link_kind_strategy()), 0..20),
    ) {
        let payload = GraphPayload {
            nodes: ids.iter().map(|&id| Node::new(node_id(id), NodeKind::Function)).collect(),
            links: links
                .iter()
                .map(|(source, target, kind)| {
                    Link::new(node_id(*source), node_id(*target), kind.clone())
                })
                .collect(),
        };
        let expected = links
            .iter()
            .filter(|(source, target, _)| ids.contains(source) && ids.contains(target))
            .count();

        let snapshot = GraphSnapshot::from_payload(payload);
        prop_assert_eq!(snapshot.link_count(), expected);
        assert_endpoints_present(&snapshot)?;
    }
}

#[test]
fn removing_a_file_cascades_to_its_contains_link() {
    let mut store = GraphStore::new();
    store.replace(GraphSnapshot::from_payload(GraphPayload {
        nodes: vec![
            Node::new("A", NodeKind::File).with_property("path", "src/a.py"),
            Node::new("B", NodeKind::Class).with_property("name", "B"),
        ],
        links: vec![Link::new("A", "B", LinkKind::Contains)],
    }));

    let outcome = store.apply_delta(GraphDelta::NodeRemoved {
        node_id: "A".to_owned(),
    });

    assert_eq!(outcome, DeltaOutcome::Applied);
    let snapshot = store.current();
    assert_eq!(snapshot.node_count(), 1);
    assert!(snapshot.contains_node("B"));
    assert_eq!(snapshot.link_count(), 0);
}

#[test]
fn link_with_embedded_endpoint_removes_by_identity() {
    let mut store = GraphStore::new();
    store.replace(GraphSnapshot::from_payload(GraphPayload {
        nodes: vec![Node::new("c", NodeKind::Class), Node::new("m", NodeKind::Method)],
        links: vec![Link::new("c", "m", LinkKind::HasMethod)],
    }));

    let embedded: Link = serde_json::from_str(
        r#"{"source":{"id":"c","type":"Class","x":12.5},"target":"m","type":"HAS_METHOD"}"#,
    )
    .unwrap();

    assert_eq!(
        store.apply_delta(GraphDelta::LinkRemoved(embedded)),
        DeltaOutcome::Applied
    );
    assert_eq!(store.current().link_count(), 0);
}
