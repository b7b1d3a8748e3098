pub mod filter;
pub mod model;
pub mod store;

pub use filter::{FilterCriteria, VisibleGraph, visible};
pub use model::{
    Endpoint, GraphPayload, GraphSnapshot, Link, LinkEnd, LinkKey, LinkKind, Node, NodeKind,
    resolve_endpoint_id,
};
pub use store::{DeltaOutcome, GraphDelta, GraphStore};
