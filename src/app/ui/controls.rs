use eframe::egui::{self, Key, RichText, Ui};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use codegraph_viewer::backend::{ExportFormat, SubgraphOptions};
use codegraph_viewer::graph::NodeKind;

use super::super::ViewModel;

const QUICK_FIND_ROWS: usize = 8;

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

fn submitted(ui: &Ui, response: &egui::Response) -> bool {
    response.lost_focus() && ui.input(|input| input.key_pressed(Key::Enter))
}

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Graph Controls");
        ui.separator();

        ui.horizontal_wrapped(|ui| {
            let busy = self.session.store().is_loading();
            if ui
                .add_enabled(!busy, egui::Button::new("Refresh"))
                .on_hover_text("Fetch the whole graph from the backend.")
                .clicked()
            {
                self.session.refresh();
            }
            if ui
                .add_enabled(!busy, egui::Button::new("Clear"))
                .on_hover_text("Delete every node on the backend.")
                .clicked()
            {
                self.session.clear();
            }
            if ui.button("Stats").clicked() {
                self.session.load_stats();
            }
        });

        ui.separator();
        self.draw_filters(ui);
        ui.separator();
        self.draw_quick_find(ui);
        ui.separator();
        self.draw_server_search(ui);
        ui.separator();
        self.draw_selection_actions(ui);
        ui.separator();
        self.draw_layout_controls(ui);
        ui.separator();
        self.draw_export_controls(ui);
    }

    fn draw_filters(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Filters").strong());
        let mut criteria = self.session.criteria().clone();

        ui.horizontal_wrapped(|ui| {
            for kind in NodeKind::KNOWN {
                let mut allowed = criteria.allowed_types.contains(&kind);
                if ui.checkbox(&mut allowed, kind.as_str()).changed() {
                    if allowed {
                        criteria.allowed_types.insert(kind);
                    } else {
                        criteria.allowed_types.remove(&kind);
                    }
                }
            }
        });

        ui.label("Name or path contains");
        ui.text_edit_singleline(&mut criteria.search_term)
            .on_hover_text("Case-insensitive substring filter on node name and path.");
        ui.checkbox(&mut criteria.show_errors, "Show lint errors");
        ui.checkbox(&mut criteria.show_calls, "Show call links");

        if &criteria != self.session.criteria() {
            self.session.set_criteria(criteria);
        }
    }

    fn draw_quick_find(&mut self, ui: &mut Ui) {
        ui.label("Quick find")
            .on_hover_text("Fuzzy match over the nodes currently on screen.");
        ui.text_edit_singleline(&mut self.quick_find);

        let query = self.quick_find.trim();
        if query.is_empty() {
            return;
        }

        let matcher = SkimMatcherV2::default();
        let snapshot = self.session.snapshot();
        let mut matches = self
            .layout
            .nodes()
            .iter()
            .filter_map(|node| {
                let label = snapshot.node(&node.id).map_or(node.id.as_str(), |n| n.label());
                fuzzy_match_score(&matcher, label, query)
                    .map(|score| (score, node.id.clone(), label.to_owned()))
            })
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.2.cmp(&b.2)));
        matches.truncate(QUICK_FIND_ROWS);

        if matches.is_empty() {
            ui.small("No visible node matches.");
            return;
        }

        let now = ui.input(|input| input.time);
        for (_, id, label) in matches {
            if ui.link(label).on_hover_text(id.as_str()).clicked() {
                self.select_and_center(&id, now);
            }
        }
    }

    fn draw_server_search(&mut self, ui: &mut Ui) {
        ui.label("Search backend");
        let mut run = false;
        ui.horizontal(|ui| {
            let response = ui.text_edit_singleline(&mut self.server_query);
            run |= submitted(ui, &response);
            run |= ui.button("Search").clicked();
        });
        if run {
            self.session.search(&self.server_query);
        }

        let now = ui.input(|input| input.time);
        let mut chosen = None;
        for node in self.session.search_results() {
            let text = format!("{}  ({})", node.label(), node.kind);
            if ui.link(text).on_hover_text(node.id.as_str()).clicked() {
                chosen = Some(node.id.clone());
            }
        }
        if let Some(id) = chosen {
            self.select_and_center(&id, now);
        }
    }

    fn draw_selection_actions(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Selection").strong());
        let Some(selected) = self.session.selection().selected.clone() else {
            ui.small("Click a node to select it; double-click to center on it.");
            self.draw_path_finder(ui);
            return;
        };

        let depth = self.session.settings().prune_depth;
        ui.horizontal_wrapped(|ui| {
            if ui
                .button(format!("Prune (depth {depth})"))
                .on_hover_text("Keep only the tree around this node.")
                .clicked()
            {
                self.session.prune(&selected);
            }
            if ui
                .button("Subgraph")
                .on_hover_text("Replace the view with this node's neighbourhood.")
                .clicked()
            {
                let options = SubgraphOptions {
                    depth: Some(depth),
                    relationship_types: Vec::new(),
                    include_errors: self.session.criteria().show_errors,
                };
                self.session.subgraph(&selected, options);
            }
            if ui.button("Path from").clicked() {
                self.path_source = selected.clone();
            }
            if ui.button("Path to").clicked() {
                self.path_target = selected.clone();
            }
            if ui.button("Deselect").clicked() {
                self.session.select(None);
            }
        });

        self.draw_path_finder(ui);
    }

    fn draw_path_finder(&mut self, ui: &mut Ui) {
        ui.collapsing("Find paths", |ui| {
            ui.horizontal(|ui| {
                ui.label("From");
                ui.text_edit_singleline(&mut self.path_source);
            });
            ui.horizontal(|ui| {
                ui.label("To");
                ui.text_edit_singleline(&mut self.path_target);
            });
            ui.horizontal(|ui| {
                let ready =
                    !self.path_source.trim().is_empty() && !self.path_target.trim().is_empty();
                if ui.add_enabled(ready, egui::Button::new("Find")).clicked() {
                    self.session
                        .find_paths(self.path_source.trim(), self.path_target.trim());
                }
                if !self.session.paths().is_empty() && ui.button("Clear paths").clicked() {
                    self.session.clear_paths();
                }
            });
        });
    }

    fn draw_layout_controls(&mut self, ui: &mut Ui) {
        ui.checkbox(&mut self.live_physics, "Live physics simulation")
            .on_hover_text("Keep stepping the layout while the graph is shown.");
        ui.checkbox(&mut self.show_fps_bar, "FPS display");

        ui.horizontal(|ui| {
            if ui.button("Reheat").clicked() {
                self.layout.reheat(1.0);
            }
            if ui.button("Reset view").clicked() {
                self.camera.reset();
            }
        });

        ui.collapsing("Physics tuning", |ui| {
            let mut config = self.layout.config();
            ui.add(
                egui::Slider::new(&mut config.intensity, 0.2..=2.5)
                    .text("Intensity")
                    .clamping(egui::SliderClamping::Always),
            )
            .on_hover_text("Overall strength applied to all physics forces.");
            ui.add(
                egui::Slider::new(&mut config.repulsion, 0.25..=2.6)
                    .text("Repulsion")
                    .clamping(egui::SliderClamping::Always),
            )
            .on_hover_text("How strongly nodes push away from each other.");
            ui.add(
                egui::Slider::new(&mut config.spring, 0.2..=2.2)
                    .text("Link spring")
                    .clamping(egui::SliderClamping::Always),
            )
            .on_hover_text("How strongly linked nodes pull toward their target distance.");
            ui.add(
                egui::Slider::new(&mut config.collision, 0.2..=2.0)
                    .text("Collision")
                    .clamping(egui::SliderClamping::Always),
            )
            .on_hover_text("Extra separation force between overlapping nodes.");
            ui.add(
                egui::Slider::new(&mut config.velocity_damping, 0.5..=0.97)
                    .text("Velocity damping")
                    .clamping(egui::SliderClamping::Always),
            )
            .on_hover_text("How quickly node movement slows each frame.");

            if config != self.layout.config() {
                self.layout.set_config(config);
                self.layout.reheat(0.3);
            }
        });
    }

    fn draw_export_controls(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Export").strong());
        ui.horizontal_wrapped(|ui| {
            for format in [ExportFormat::Svg, ExportFormat::Png, ExportFormat::Json] {
                if ui
                    .button(format.as_str().to_ascii_uppercase())
                    .on_hover_text("Save the current view into the export directory.")
                    .clicked()
                {
                    self.export_local(format);
                }
            }
        });
        ui.horizontal_wrapped(|ui| {
            ui.small("Backend:");
            for format in [ExportFormat::Svg, ExportFormat::Png, ExportFormat::Json] {
                if ui.small_button(format.as_str()).clicked() {
                    self.session.export_from_server(format);
                }
            }
        });
        ui.small(format!("Directory: {}", self.export_dir.display()));
    }
}
