use eframe::egui::{self, Align, Color32, Context, Layout, RichText};

use codegraph_viewer::backend::ConnectionState;

use super::super::ViewModel;

const CONNECTED_COLOR: Color32 = Color32::from_rgb(106, 198, 120);
const CONNECTING_COLOR: Color32 = Color32::from_rgb(246, 206, 104);
const DISCONNECTED_COLOR: Color32 = Color32::from_rgb(214, 84, 84);
const BANNER_FILL: Color32 = Color32::from_rgb(92, 32, 32);

impl ViewModel {
    pub(in crate::app) fn draw_panels(&mut self, ctx: &Context) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Code graph");
                    ui.separator();
                    self.draw_connection_indicator(ui);
                    ui.separator();
                    ui.label(self.visible_graph_text());
                    if self.session.store().is_loading() {
                        ui.spinner();
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if let Some(fps_text) = self.fps_display_text() {
                            ui.label(fps_text);
                        }
                        if let Some(notice) = &self.notice {
                            ui.small(notice.as_str());
                        }
                    });
                });
            });

        if let Some(error) = self.session.store().error().map(str::to_owned) {
            egui::TopBottomPanel::top("error_banner")
                .frame(
                    egui::Frame::default()
                        .fill(BANNER_FILL)
                        .inner_margin(egui::Margin::same(6)),
                )
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(error).color(Color32::from_gray(240)));
                        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                            if ui.button("Dismiss").clicked() {
                                self.session.dismiss_error();
                            }
                            if self.session.can_retry() && ui.button("Retry").clicked() {
                                self.session.dismiss_error();
                                self.session.retry();
                            }
                        });
                    });
                });
        }

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .id_salt("controls_scroll")
                    .show(ui, |ui| self.draw_controls(ui));
            });

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .id_salt("details_scroll")
                    .show(ui, |ui| self.draw_details(ui));
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.draw_canvas(ui));
    }

    fn draw_connection_indicator(&self, ui: &mut egui::Ui) {
        let (color, text) = match self.session.connection_state() {
            ConnectionState::Connected => (CONNECTED_COLOR, "live".to_owned()),
            ConnectionState::Connecting => (CONNECTING_COLOR, "connecting".to_owned()),
            ConnectionState::Disconnected => {
                let attempts = self.session.reconnect_attempts();
                let text = if attempts > 0 {
                    format!("offline (retry {attempts})")
                } else {
                    "offline".to_owned()
                };
                (DISCONNECTED_COLOR, text)
            }
        };
        ui.colored_label(color, "●");
        ui.label(text);
    }
}
