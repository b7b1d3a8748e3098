use eframe::egui::{self, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Ui, Vec2, vec2};

use codegraph_viewer::style::{self, blend_color, with_opacity};
use codegraph_viewer::util::truncate_label;

use super::ViewModel;

const GRID_COLOR: Color32 = Color32::from_rgba_premultiplied(24, 28, 33, 70);
const LABEL_MAX_CHARS: usize = 28;
const HIT_SLACK_PX: f32 = 3.0;

fn draw_background(painter: &egui::Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, style::BACKGROUND);

    let step = (56.0 * zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.min + pan;

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment(
            [Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())],
            Stroke::new(1.0, GRID_COLOR),
        );
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment(
            [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
            Stroke::new(1.0, GRID_COLOR),
        );
        y += step;
    }
}

fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

fn edge_visible(rect: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let min_x = start.x.min(end.x) - padding;
    let max_x = start.x.max(end.x) + padding;
    let min_y = start.y.min(end.y) - padding;
    let max_y = start.y.max(end.y) + padding;
    !(max_x < rect.left() || min_x > rect.right() || max_y < rect.top() || min_y > rect.bottom())
}

impl ViewModel {
    fn handle_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.camera.zoom_about(rect.min, pointer, zoom_factor);
    }

    fn handle_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
            || (self.dragging.is_none() && response.dragged_by(egui::PointerButton::Primary))
        {
            self.camera.pan_by(response.drag_delta());
        }
    }

    fn node_under(&self, rect: Rect, screen: Pos2) -> Option<usize> {
        let transform = self.camera.transform();
        let world = transform.screen_to_world(rect.min, screen);
        self.layout.node_at(world, HIT_SLACK_PX / transform.zoom)
    }

    /// Primary-button drag on a node pins it under the pointer until release.
    fn handle_node_drag(&mut self, rect: Rect, response: &egui::Response) {
        let transform = self.camera.transform();

        if response.drag_started_by(egui::PointerButton::Primary)
            && let Some(pointer) = response.interact_pointer_pos()
            && let Some(index) = self.node_under(rect, pointer)
        {
            let id = self.layout.nodes()[index].id.clone();
            let world = transform.screen_to_world(rect.min, pointer);
            if self.layout.begin_drag(&id, world) {
                self.dragging = Some(id);
            }
        }

        if let Some(id) = self.dragging.clone() {
            if response.drag_stopped() {
                self.layout.end_drag(&id);
                self.dragging = None;
            } else if let Some(pointer) = response.interact_pointer_pos() {
                let world = transform.screen_to_world(rect.min, pointer);
                self.layout.drag_to(&id, world);
            }
        }
    }

    pub(super) fn draw_canvas(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        let now = ui.input(|input| input.time);

        self.sync_with_session(rect.size());

        self.handle_node_drag(rect, &response);
        self.handle_zoom(ui, rect, &response);
        self.handle_pan(&response);
        self.camera.tick(now);

        if self.live_physics || self.dragging.is_some() {
            let delta_seconds = ui
                .ctx()
                .input(|input| input.stable_dt)
                .clamp(1.0 / 240.0, 1.0 / 20.0);
            self.layout.step(delta_seconds);
        }

        let transform = self.camera.transform();
        draw_background(&painter, rect, transform.pan, transform.zoom);

        if self.layout.nodes().is_empty() {
            let message = if self.session.store().is_loading() {
                "Loading graph..."
            } else if self.session.snapshot().is_empty() {
                "The graph is empty. Run an analysis or press Refresh."
            } else {
                "No nodes match the current filters."
            };
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                message,
                FontId::proportional(15.0),
                style::LABEL,
            );
            return;
        }

        let hovered = response
            .hover_pos()
            .and_then(|pointer| self.node_under(rect, pointer));
        let hovered_id = hovered.map(|index| self.layout.nodes()[index].id.clone());
        if self.session.selection().hovered != hovered_id {
            self.session.set_hovered(hovered_id);
            self.refresh_highlight(false);
        }
        if hovered.is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::PointingHand);
        }

        if response.double_clicked() {
            if let Some(index) = hovered {
                let id = self.layout.nodes()[index].id.clone();
                self.select_and_center(&id, now);
            }
        } else if response.clicked_by(egui::PointerButton::Primary) {
            let selected = hovered.map(|index| self.layout.nodes()[index].id.clone());
            self.session.select(selected);
            self.refresh_highlight(false);
        }

        let positions = &self.layout.frame().positions;
        let screen = |index: usize| {
            transform.world_to_screen(rect.min, positions.get(index).copied().unwrap_or_default())
        };
        let zoom_sqrt = transform.zoom.sqrt();

        for link in self.layout.links() {
            let (start, end) = (screen(link.source), screen(link.target));
            if !edge_visible(rect, start, end, 4.0) {
                continue;
            }
            let source = &self.layout.nodes()[link.source].id;
            let target = &self.layout.nodes()[link.target].id;
            let emphasis = self
                .highlighter
                .link_emphasis_between(source, target, &link.kind);
            let color = if emphasis.highlighted && self.highlighter.path().len() > 1 {
                blend_color(style::link_color(&link.kind), style::PATH, 0.5)
            } else {
                style::link_color(&link.kind)
            };
            painter.line_segment(
                [start, end],
                Stroke::new(
                    (emphasis.width * zoom_sqrt).clamp(0.5, 6.0),
                    with_opacity(color, emphasis.opacity),
                ),
            );
        }

        let selected = self.session.selection().selected.clone();
        for (index, node) in self.layout.nodes().iter().enumerate() {
            let position = screen(index);
            let radius = (node.radius * transform.zoom).clamp(2.0, 48.0);
            if !circle_visible(rect, position, radius) {
                continue;
            }

            let emphasis = self.highlighter.node_emphasis(&node.id);
            let is_selected = selected.as_deref() == Some(node.id.as_str());
            let is_hovered = hovered == Some(index);
            let base = style::node_color(&node.kind);
            let color = if is_selected {
                style::SELECTED
            } else if is_hovered {
                style::HOVERED
            } else if emphasis.on_path {
                blend_color(base, style::PATH, 0.6)
            } else {
                base
            };

            painter.circle_filled(position, radius, with_opacity(color, emphasis.opacity));
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(
                    if node.is_pinned() { 2.2 } else { 1.0 },
                    with_opacity(style::NODE_OUTLINE, emphasis.opacity),
                ),
            );
            if is_selected {
                painter.circle_stroke(
                    position,
                    radius + 4.0,
                    Stroke::new(1.4, with_opacity(style::SELECTED, 0.6)),
                );
            }

            let show_label = is_selected
                || is_hovered
                || emphasis.focused
                || (self.highlighter.is_active() && !emphasis.is_dimmed())
                || transform.zoom > 1.2;
            if show_label && let Some(graph_node) = self.session.snapshot().node(&node.id) {
                painter.text(
                    position + vec2(radius + 5.0, 0.0),
                    Align2::LEFT_CENTER,
                    truncate_label(graph_node.label(), LABEL_MAX_CHARS),
                    FontId::proportional(12.0),
                    with_opacity(style::LABEL, emphasis.opacity),
                );
            }
        }

        if let Some(index) = hovered
            && let Some(node) = self.session.snapshot().node(&self.layout.nodes()[index].id)
        {
            let mut text = format!("{}  |  {}", node.label(), node.kind);
            if let Some(path) = node.path() {
                text.push_str(&format!("  |  {path}"));
            }
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                text,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }
    }
}
