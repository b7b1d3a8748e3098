//! Push-channel envelopes: `{type, data}` JSON text frames.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Result, ViewerError};
use crate::graph::{GraphDelta, Link, Node};

/// Recognised inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    /// The backend's graph changed wholesale; refetch.
    GraphUpdated,
    Delta(GraphDelta),
    /// Recognised but carries nothing for the graph (pong, info, progress...).
    Ignored(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRemovedData {
    #[serde(alias = "node_id", alias = "id")]
    node_id: String,
}

pub fn subscribe_message() -> String {
    json!({ "type": "subscribe", "topic": "graph" }).to_string()
}

pub fn ping_message() -> String {
    json!({ "type": "ping" }).to_string()
}

/// Parses one text frame.
///
/// Non-JSON text, a missing `type`, or a recognised type with a malformed `data` field are
/// protocol errors. Unknown types are not errors.
pub fn parse_push_message(text: &str) -> Result<PushEvent> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let event = match envelope.kind.as_str() {
        "graph_updated" => PushEvent::GraphUpdated,
        "node_added" => PushEvent::Delta(GraphDelta::NodeAdded(data::<Node>(
            &envelope.kind,
            envelope.data,
        )?)),
        "node_removed" => {
            let removed = data::<NodeRemovedData>(&envelope.kind, envelope.data)?;
            PushEvent::Delta(GraphDelta::NodeRemoved {
                node_id: removed.node_id,
            })
        }
        "link_added" => PushEvent::Delta(GraphDelta::LinkAdded(data::<Link>(
            &envelope.kind,
            envelope.data,
        )?)),
        "link_removed" => PushEvent::Delta(GraphDelta::LinkRemoved(data::<Link>(
            &envelope.kind,
            envelope.data,
        )?)),
        other => {
            debug!(message_type = other, "ignoring push message");
            PushEvent::Ignored(other.to_owned())
        }
    };

    Ok(event)
}

fn data<T: for<'de> Deserialize<'de>>(kind: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|error| ViewerError::Protocol(format!("malformed `{kind}` payload: {error}")))
}
