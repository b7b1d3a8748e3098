//! One viewing session: the store, the push connection and every in-flight request.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::{
    ConnectionEvent, ConnectionManager, ConnectionState, DEFAULT_PATH_MAX_LENGTH,
    DEFAULT_PRUNE_DEPTH, ExportArtifact, ExportFormat, GraphService, PushConnector, PushEvent,
    PushSettings, SearchFilters, SubgraphOptions,
};
use crate::error::Result;
use crate::graph::{DeltaOutcome, FilterCriteria, GraphPayload, GraphSnapshot, GraphStore, Node};

const DEFAULT_SEARCH_LIMIT: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub prune_depth: u32,
    pub path_max_length: u32,
    pub search_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            prune_depth: DEFAULT_PRUNE_DEPTH,
            path_max_length: DEFAULT_PATH_MAX_LENGTH,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub selected: Option<String>,
    pub hovered: Option<String>,
}

impl SelectionState {
    /// Hover wins over selection for emphasis.
    pub fn focus(&self) -> Option<&str> {
        self.hovered.as_deref().or(self.selected.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeDetails {
    pub node_id: String,
    pub details: Value,
}

/// An operation that replaces the whole snapshot, kept so a failure can be retried.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphRequest {
    Refresh,
    Clear,
    Prune { node_id: String, depth: u32 },
    Subgraph { node_id: String, options: SubgraphOptions },
}

impl GraphRequest {
    fn name(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Clear => "clear",
            Self::Prune { .. } => "prune",
            Self::Subgraph { .. } => "subgraph",
        }
    }
}

enum Completion {
    Graph {
        request: GraphRequest,
        result: Result<GraphPayload>,
    },
    Cleared(Result<bool>),
    Stats(Result<Value>),
    Details {
        node_id: String,
        result: Result<Value>,
    },
    Paths(Result<Vec<Vec<String>>>),
    Search {
        query: String,
        result: Result<Vec<Node>>,
    },
    Export {
        format: ExportFormat,
        result: Result<ExportArtifact>,
    },
}

enum Inbound {
    Connection(ConnectionEvent),
    Completed(Completion),
}

pub struct GraphSession<S: GraphService> {
    service: Arc<S>,
    runtime: Handle,
    settings: SessionSettings,
    store: GraphStore,
    criteria: FilterCriteria,
    selection: SelectionState,
    stats: Option<Value>,
    details: Option<NodeDetails>,
    paths: Vec<Vec<String>>,
    search_results: Vec<Node>,
    server_export: Option<(ExportFormat, ExportArtifact)>,
    failed: Option<GraphRequest>,
    graph_requests_in_flight: usize,
    connection: Option<ConnectionManager>,
    connection_state: ConnectionState,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    torn_down: bool,
}

impl<S: GraphService> GraphSession<S> {
    pub fn new(service: S, runtime: Handle, settings: SessionSettings) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        Self {
            service: Arc::new(service),
            runtime,
            settings,
            store: GraphStore::new(),
            criteria: FilterCriteria::default(),
            selection: SelectionState::default(),
            stats: None,
            details: None,
            paths: Vec::new(),
            search_results: Vec::new(),
            server_export: None,
            failed: None,
            graph_requests_in_flight: 0,
            connection: None,
            connection_state: ConnectionState::Disconnected,
            inbox_tx,
            inbox,
            torn_down: false,
        }
    }

    /// Opens the push connection. Replaces (and shuts down) any previous one.
    pub fn connect<C: PushConnector>(&mut self, connector: C, settings: PushSettings) {
        if self.torn_down {
            return;
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let inbox = self.inbox_tx.clone();
        self.runtime.spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if inbox.send(Inbound::Connection(event)).is_err() {
                    break;
                }
            }
        });

        if let Some(mut previous) = self.connection.take() {
            previous.shutdown();
        }
        self.connection = Some(ConnectionManager::start(
            connector,
            settings,
            &self.runtime,
            events_tx,
        ));
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn snapshot(&self) -> &GraphSnapshot {
        self.store.current()
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn stats(&self) -> Option<&Value> {
        self.stats.as_ref()
    }

    pub fn details(&self) -> Option<&NodeDetails> {
        self.details.as_ref()
    }

    pub fn paths(&self) -> &[Vec<String>] {
        &self.paths
    }

    pub fn search_results(&self) -> &[Node] {
        &self.search_results
    }

    pub fn server_export(&self) -> Option<&(ExportFormat, ExportArtifact)> {
        self.server_export.as_ref()
    }

    pub fn take_server_export(&mut self) -> Option<(ExportFormat, ExportArtifact)> {
        self.server_export.take()
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ConnectionManager::is_connected)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.connection
            .as_ref()
            .map_or(0, ConnectionManager::reconnect_attempts)
    }

    pub fn has_pending_requests(&self) -> bool {
        self.graph_requests_in_flight > 0
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn refresh(&mut self) {
        self.request_graph(GraphRequest::Refresh);
    }

    pub fn clear(&mut self) {
        self.request_graph(GraphRequest::Clear);
    }

    pub fn prune(&mut self, node_id: &str) {
        self.request_graph(GraphRequest::Prune {
            node_id: node_id.to_owned(),
            depth: self.settings.prune_depth,
        });
    }

    pub fn subgraph(&mut self, node_id: &str, options: SubgraphOptions) {
        self.request_graph(GraphRequest::Subgraph {
            node_id: node_id.to_owned(),
            options,
        });
    }

    /// Re-issues the last snapshot request that failed, if any.
    pub fn retry(&mut self) -> bool {
        match self.failed.take() {
            Some(request) => {
                self.request_graph(request);
                true
            }
            None => false,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.failed.is_some()
    }

    pub fn dismiss_error(&mut self) {
        self.store.set_error(None);
    }

    pub fn load_stats(&mut self) {
        let service = Arc::clone(&self.service);
        self.spawn(async move { Completion::Stats(service.fetch_graph_stats().await) });
    }

    /// Selects a node (or clears the selection) and loads its details.
    pub fn select(&mut self, node_id: Option<String>) {
        if self.selection.selected == node_id {
            return;
        }
        self.selection.selected = node_id.clone();
        self.details = None;

        if let Some(node_id) = node_id {
            let service = Arc::clone(&self.service);
            self.spawn(async move {
                let result = service.fetch_node_details(&node_id).await;
                Completion::Details { node_id, result }
            });
        }
    }

    pub fn set_hovered(&mut self, node_id: Option<String>) {
        self.selection.hovered = node_id;
    }

    pub fn find_paths(&mut self, source_id: &str, target_id: &str) {
        let service = Arc::clone(&self.service);
        let (source_id, target_id) = (source_id.to_owned(), target_id.to_owned());
        let max_length = self.settings.path_max_length;
        self.spawn(async move {
            Completion::Paths(service.find_paths(&source_id, &target_id, max_length).await)
        });
    }

    pub fn clear_paths(&mut self) {
        self.paths.clear();
    }

    pub fn search(&mut self, query: &str) {
        let query = query.trim().to_owned();
        if query.is_empty() {
            self.search_results.clear();
            return;
        }

        let filters = SearchFilters {
            node_types: self.criteria.allowed_types.iter().cloned().collect(),
            limit: Some(self.settings.search_limit),
        };
        let service = Arc::clone(&self.service);
        self.spawn(async move {
            let result = service.search_nodes(&query, &filters).await;
            Completion::Search { query, result }
        });
    }

    pub fn export_from_server(&mut self, format: ExportFormat) {
        let service = Arc::clone(&self.service);
        self.spawn(async move {
            let result = service.export_graph(format).await;
            Completion::Export { format, result }
        });
    }

    /// Applies everything that has arrived since the last call. Returns whether anything did.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(inbound) = self.inbox.try_recv() {
            self.apply(inbound);
            changed = true;
        }
        changed
    }

    /// Waits for the next inbound message and applies it.
    pub async fn pump_next(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(inbound) => {
                self.apply(inbound);
                true
            }
            None => false,
        }
    }

    /// Closes the push connection and stops accepting results. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(mut connection) = self.connection.take() {
            connection.shutdown();
        }
        self.connection_state = ConnectionState::Disconnected;
        info!("graph session torn down");
    }

    fn request_graph(&mut self, request: GraphRequest) {
        if self.torn_down {
            return;
        }
        debug!(request = request.name(), "issuing graph request");
        self.graph_requests_in_flight += 1;
        self.store.set_loading(true);

        let service = Arc::clone(&self.service);
        match request {
            GraphRequest::Clear => {
                self.spawn(async move { Completion::Cleared(service.clear_graph().await) })
            }
            request => self.spawn(async move {
                let result = match &request {
                    GraphRequest::Refresh | GraphRequest::Clear => service.fetch_graph().await,
                    GraphRequest::Prune { node_id, depth } => {
                        service.prune_tree(node_id, *depth).await
                    }
                    GraphRequest::Subgraph { node_id, options } => {
                        service.fetch_subgraph(node_id, options).await
                    }
                };
                Completion::Graph { request, result }
            }),
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        if self.torn_down {
            return;
        }
        let inbox = self.inbox_tx.clone();
        self.runtime.spawn(async move {
            let _ = inbox.send(Inbound::Completed(work.await));
        });
    }

    fn finish_graph_request(&mut self) {
        self.graph_requests_in_flight = self.graph_requests_in_flight.saturating_sub(1);
        self.store.set_loading(self.graph_requests_in_flight > 0);
    }

    fn apply(&mut self, inbound: Inbound) {
        if self.torn_down {
            return;
        }

        match inbound {
            Inbound::Connection(ConnectionEvent::State(state)) => {
                self.connection_state = state;
            }
            Inbound::Connection(ConnectionEvent::Push(PushEvent::GraphUpdated)) => {
                self.refresh();
            }
            Inbound::Connection(ConnectionEvent::Push(PushEvent::Delta(delta))) => {
                if self.store.apply_delta(delta) == DeltaOutcome::Applied {
                    self.forget_missing_selection();
                }
            }
            Inbound::Connection(ConnectionEvent::Push(PushEvent::Ignored(kind))) => {
                debug!(%kind, "ignoring push event");
            }
            Inbound::Completed(completion) => self.complete(completion),
        }
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Graph { request, result } => {
                self.finish_graph_request();
                match result {
                    Ok(payload) => {
                        self.store.replace(GraphSnapshot::from_payload(payload));
                        self.store.set_error(None);
                        self.failed = None;
                        self.forget_missing_selection();
                        info!(
                            request = request.name(),
                            nodes = self.store.current().node_count(),
                            links = self.store.current().link_count(),
                            "graph replaced"
                        );
                    }
                    Err(err) => {
                        error!(request = request.name(), %err, "graph request failed");
                        self.store.set_error(Some(err.to_string()));
                        self.failed = Some(request);
                    }
                }
            }
            Completion::Cleared(result) => {
                self.finish_graph_request();
                match result {
                    Ok(true) => {
                        self.store.clear();
                        self.store.set_error(None);
                        self.failed = None;
                        self.selection = SelectionState::default();
                        self.details = None;
                        self.paths.clear();
                        info!("graph cleared");
                    }
                    Ok(false) => {
                        warn!("backend declined to clear the graph");
                        self.store
                            .set_error(Some("backend declined to clear the graph".to_owned()));
                        self.failed = Some(GraphRequest::Clear);
                    }
                    Err(err) => {
                        error!(request = "clear", %err, "graph request failed");
                        self.store.set_error(Some(err.to_string()));
                        self.failed = Some(GraphRequest::Clear);
                    }
                }
            }
            Completion::Stats(result) => {
                self.stats = result
                    .inspect_err(|err| warn!(%err, "failed to load graph stats"))
                    .ok();
            }
            Completion::Details { node_id, result } => {
                if self.selection.selected.as_deref() != Some(node_id.as_str()) {
                    debug!(%node_id, "discarding details for a stale selection");
                    return;
                }
                self.details = match result {
                    Ok(details) => Some(NodeDetails { node_id, details }),
                    Err(err) => {
                        warn!(%node_id, %err, "failed to load node details");
                        None
                    }
                };
            }
            Completion::Paths(result) => match result {
                Ok(paths) => {
                    debug!(count = paths.len(), "paths found");
                    self.paths = paths;
                }
                Err(err) => {
                    error!(%err, "path search failed");
                    self.store.set_error(Some(err.to_string()));
                }
            },
            Completion::Search { query, result } => match result {
                Ok(nodes) => {
                    debug!(%query, results = nodes.len(), "search finished");
                    self.search_results = nodes;
                }
                Err(err) => {
                    error!(%query, %err, "search failed");
                    self.store.set_error(Some(err.to_string()));
                }
            },
            Completion::Export { format, result } => match result {
                Ok(artifact) => self.server_export = Some((format, artifact)),
                Err(err) => {
                    error!(format = format.as_str(), %err, "server export failed");
                    self.store.set_error(Some(err.to_string()));
                }
            },
        }
    }

    fn forget_missing_selection(&mut self) {
        let snapshot = self.store.current();
        if let Some(selected) = &self.selection.selected
            && !snapshot.contains_node(selected)
        {
            self.selection.selected = None;
            self.details = None;
        }
        if let Some(hovered) = &self.selection.hovered
            && !snapshot.contains_node(hovered)
        {
            self.selection.hovered = None;
        }
    }
}

impl<S: GraphService> Drop for GraphSession<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
