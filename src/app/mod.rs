use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use eframe::egui::{Context, Vec2};
use tokio::runtime::Runtime;
use tracing::{error, info};

use codegraph_viewer::ViewerConfig;
use codegraph_viewer::backend::{ExportFormat, HttpGraphService, WebSocketConnector};
use codegraph_viewer::export::{self, PNG_FILE_NAME, SVG_FILE_NAME, Scene};
use codegraph_viewer::graph::{FilterCriteria, visible};
use codegraph_viewer::highlight::Highlighter;
use codegraph_viewer::layout::{Camera, LayoutEngine};
use codegraph_viewer::session::GraphSession;

mod canvas;
mod ui;

const IDLE_REPAINT: Duration = Duration::from_millis(250);

pub struct ViewerApp {
    // Declared before the runtime so the session is torn down while the runtime still runs.
    model: Box<ViewModel>,
    _runtime: Runtime,
}

impl ViewerApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: ViewerConfig,
        runtime: Runtime,
    ) -> anyhow::Result<Self> {
        let service = HttpGraphService::new(config.backend_url.clone(), config.request_timeout())?;
        let mut session =
            GraphSession::new(service, runtime.handle().clone(), config.session_settings());
        session.connect(
            WebSocketConnector::new(config.push_url()),
            config.push_settings(),
        );
        session.refresh();
        session.load_stats();
        info!(backend = %config.backend_url, push = %config.push_url(), "viewer started");

        Ok(Self {
            model: Box::new(ViewModel::new(session, &config)),
            _runtime: runtime,
        })
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.model.show(ctx);
    }
}

/// The revision and criteria the layout was last synced against.
#[derive(Clone, Debug, PartialEq)]
struct SyncKey {
    revision: u64,
    criteria: FilterCriteria,
}

struct ViewModel {
    session: GraphSession<HttpGraphService>,
    layout: LayoutEngine,
    camera: Camera,
    highlighter: Highlighter,
    synced: Option<SyncKey>,
    viewport: Vec2,
    visible_node_count: usize,
    visible_link_count: usize,
    live_physics: bool,
    dragging: Option<String>,
    quick_find: String,
    server_query: String,
    path_source: String,
    path_target: String,
    export_dir: PathBuf,
    notice: Option<String>,
    show_fps_bar: bool,
    fps_current: f32,
    fps_samples: VecDeque<f32>,
}

impl ViewModel {
    fn new(session: GraphSession<HttpGraphService>, config: &ViewerConfig) -> Self {
        Self {
            session,
            layout: LayoutEngine::new(config.layout),
            camera: Camera::default(),
            highlighter: Highlighter::new(),
            synced: None,
            viewport: Vec2::ZERO,
            visible_node_count: 0,
            visible_link_count: 0,
            live_physics: true,
            dragging: None,
            quick_find: String::new(),
            server_query: String::new(),
            path_source: String::new(),
            path_target: String::new(),
            export_dir: config.export_dir.clone(),
            notice: None,
            show_fps_bar: false,
            fps_current: 0.0,
            fps_samples: VecDeque::new(),
        }
    }

    /// Applies inbound messages and resyncs the layout and emphasis with the store.
    fn sync_with_session(&mut self, viewport: Vec2) {
        self.session.pump();
        self.save_server_export();

        let key = SyncKey {
            revision: self.session.store().revision(),
            criteria: self.session.criteria().clone(),
        };
        let stale = self.synced.as_ref() != Some(&key) || self.viewport != viewport;
        if stale {
            let view = visible(self.session.snapshot(), self.session.criteria());
            self.visible_node_count = view.nodes.len();
            self.visible_link_count = view.links.len();
            self.layout.sync(&view, viewport);
            self.synced = Some(key);
            self.viewport = viewport;
            if let Some(dragging) = &self.dragging
                && self.layout.index_of(dragging).is_none()
            {
                self.dragging = None;
            }
        }

        self.refresh_highlight(stale);
    }

    fn refresh_highlight(&mut self, force: bool) {
        let focus = self.session.selection().focus().map(str::to_owned);
        if force || self.highlighter.focus() != focus.as_deref() {
            let view = visible(self.session.snapshot(), self.session.criteria());
            self.highlighter.focus_in_view(focus.as_deref(), &view);
        }

        let path = self.session.paths().first().map(Vec::as_slice);
        if self.highlighter.path() != path.unwrap_or_default() {
            self.highlighter.set_path(path);
        }
    }

    fn select_and_center(&mut self, node_id: &str, now: f64) {
        self.session.select(Some(node_id.to_owned()));
        if let Some(position) = self.layout.position(node_id) {
            self.camera.recenter_on(position, self.viewport, now);
        }
    }

    fn export_local(&mut self, format: ExportFormat) {
        let scene = Scene::capture(
            &self.layout,
            self.session.snapshot(),
            &self.highlighter,
            self.session.selection().selected.as_deref(),
            self.camera.transform(),
            self.viewport,
        );
        let svg = export::render_svg(&scene);

        let written = match format {
            ExportFormat::Svg => {
                export::write_artifact(&self.export_dir, SVG_FILE_NAME, svg.as_bytes())
            }
            ExportFormat::Png => export::render_png(&svg, scene.width, scene.height)
                .and_then(|png| export::write_artifact(&self.export_dir, PNG_FILE_NAME, &png)),
            ExportFormat::Json => {
                let payload = self.session.snapshot().to_payload();
                serde_json::to_vec_pretty(&payload)
                    .map_err(Into::into)
                    .and_then(|bytes| {
                        export::write_artifact(&self.export_dir, "codebase-graph.json", &bytes)
                    })
            }
        };

        self.notice = Some(match written {
            Ok(path) => format!("Exported {}", path.display()),
            Err(err) => {
                error!(%err, "local export failed");
                format!("Export failed: {err}")
            }
        });
    }

    fn save_server_export(&mut self) {
        let Some((format, artifact)) = self.session.take_server_export() else {
            return;
        };
        let file_name = format!("codebase-graph-server.{}", format.as_str());
        self.notice = Some(
            match export::write_artifact(&self.export_dir, &file_name, &artifact.bytes) {
                Ok(path) => format!("Saved server export to {}", path.display()),
                Err(err) => {
                    error!(%err, "saving server export failed");
                    format!("Saving server export failed: {err}")
                }
            },
        );
    }

    fn show(&mut self, ctx: &Context) {
        self.update_fps_counter(ctx);
        self.draw_panels(ctx);

        if self.layout.is_running() || self.camera.is_animating() || self.dragging.is_some() {
            ctx.request_repaint();
        } else {
            // Push events and responses arrive off the UI thread.
            ctx.request_repaint_after(IDLE_REPAINT);
        }
    }
}
