use eframe::egui::{self, RichText, Ui};
use serde_json::Value;

use super::super::ViewModel;

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "-".to_owned(),
        other => other.to_string(),
    }
}

fn draw_key_values(ui: &mut Ui, id_salt: &str, value: &Value) {
    let Value::Object(entries) = value else {
        ui.label(value_text(value));
        return;
    };

    egui::Grid::new(id_salt)
        .num_columns(2)
        .striped(true)
        .show(ui, |ui| {
            for (key, value) in entries {
                ui.label(key.as_str());
                ui.label(value_text(value));
                ui.end_row();
            }
        });
}

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);
        self.draw_selected_node(ui);

        ui.separator();
        self.draw_paths(ui);

        ui.separator();
        ui.label(RichText::new("Graph statistics").strong());
        match self.session.stats() {
            Some(stats) => draw_key_values(ui, "graph_stats", stats),
            None => {
                ui.small("No statistics loaded.");
            }
        }
    }

    fn draw_selected_node(&mut self, ui: &mut Ui) {
        let Some(selected_id) = self.session.selection().selected.clone() else {
            ui.label("Select a node on the canvas or from a search.");
            return;
        };

        let Some(node) = self.session.snapshot().node(&selected_id) else {
            ui.label("Selected node no longer exists in the graph.");
            return;
        };

        ui.label(RichText::new(node.label()).strong());
        ui.small(format!("{}  |  {}", node.kind, node.id));
        if let Some(path) = node.path() {
            ui.small(path);
        }
        if !node.properties.is_empty() {
            ui.collapsing("Properties", |ui| {
                egui::Grid::new("node_properties")
                    .num_columns(2)
                    .striped(true)
                    .show(ui, |ui| {
                        for (key, value) in &node.properties {
                            ui.label(key.as_str());
                            ui.label(value_text(value));
                            ui.end_row();
                        }
                    });
            });
        }

        match self.session.details() {
            Some(details) if details.node_id == selected_id => {
                ui.collapsing("Backend details", |ui| {
                    draw_key_values(ui, "node_details", &details.details);
                });
            }
            _ => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.small("Loading details...");
                });
            }
        }

        let snapshot = self.session.snapshot();
        let mut neighbors = self
            .highlighter
            .neighbors()
            .iter()
            .filter_map(|id| snapshot.node(id))
            .map(|node| (node.label().to_owned(), node.kind.to_string(), node.id.clone()))
            .collect::<Vec<_>>();
        neighbors.sort();

        ui.add_space(6.0);
        ui.label(RichText::new(format!("Connected nodes ({})", neighbors.len())).strong());
        let now = ui.input(|input| input.time);
        let mut chosen = None;
        egui::ScrollArea::vertical()
            .id_salt("neighbors_scroll")
            .max_height(260.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for (label, kind, id) in &neighbors {
                    if ui
                        .link(format!("{label}  ({kind})"))
                        .on_hover_text(id.as_str())
                        .clicked()
                    {
                        chosen = Some(id.clone());
                    }
                }
            });
        if let Some(id) = chosen {
            self.select_and_center(&id, now);
        }
    }

    fn draw_paths(&mut self, ui: &mut Ui) {
        let paths = self.session.paths();
        ui.label(RichText::new(format!("Paths ({})", paths.len())).strong());
        if paths.is_empty() {
            ui.small("Use \"Find paths\" to trace connections between two nodes.");
            return;
        }

        let snapshot = self.session.snapshot();
        for (index, path) in paths.iter().enumerate() {
            let steps = path
                .iter()
                .map(|id| snapshot.node(id).map_or(id.as_str(), |node| node.label()))
                .collect::<Vec<_>>()
                .join(" → ");
            let text = if index == 0 {
                RichText::new(steps).strong()
            } else {
                RichText::new(steps)
            };
            ui.label(text);
        }
    }
}
