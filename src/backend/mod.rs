pub mod client;
pub mod protocol;
pub mod push;

pub use client::{
    DEFAULT_PATH_MAX_LENGTH, DEFAULT_PRUNE_DEPTH, ExportArtifact, ExportFormat, GraphService,
    HttpGraphService, SearchFilters, SubgraphOptions,
};
pub use protocol::{PushEvent, parse_push_message};
pub use push::{
    ConnectionEvent, ConnectionManager, ConnectionState, PushConnector, PushSettings, PushSocket,
    WebSocketConnector,
};
