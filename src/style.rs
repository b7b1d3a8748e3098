use eframe::egui::Color32;

use crate::graph::{LinkKind, NodeKind};

pub const BACKGROUND: Color32 = Color32::from_rgb(19, 23, 29);
pub const NODE_OUTLINE: Color32 = Color32::from_rgba_premultiplied(15, 15, 15, 190);
pub const LABEL: Color32 = Color32::from_gray(238);
pub const SELECTED: Color32 = Color32::from_rgb(245, 206, 93);
pub const HOVERED: Color32 = Color32::from_rgb(255, 164, 101);
pub const PATH: Color32 = Color32::from_rgb(246, 206, 104);

pub fn node_color(kind: &NodeKind) -> Color32 {
    match kind {
        NodeKind::File => Color32::from_rgb(86, 156, 214),
        NodeKind::Class => Color32::from_rgb(78, 201, 176),
        NodeKind::Method => Color32::from_rgb(197, 134, 192),
        NodeKind::Function => Color32::from_rgb(220, 220, 170),
        NodeKind::LintError => Color32::from_rgb(244, 71, 71),
        NodeKind::Unknown(_) => Color32::from_rgb(150, 150, 150),
    }
}

pub fn link_color(kind: &LinkKind) -> Color32 {
    match kind {
        LinkKind::Contains => Color32::from_rgb(110, 120, 134),
        LinkKind::HasMethod => Color32::from_rgb(124, 110, 150),
        LinkKind::Calls => Color32::from_rgb(241, 146, 94),
        LinkKind::HasError => Color32::from_rgb(214, 84, 84),
        LinkKind::Unknown(_) => Color32::from_rgb(96, 96, 96),
    }
}

/// Linear mix of `base` toward `overlay`.
pub fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub fn with_opacity(color: Color32, opacity: f32) -> Color32 {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    Color32::from_rgba_unmultiplied(r, g, b, (a as f32 * opacity.clamp(0.0, 1.0)) as u8)
}

/// `#rrggbb` for SVG attributes; alpha goes into a separate opacity attribute.
pub fn hex(color: Color32) -> String {
    let [r, g, b, _] = color.to_srgba_unmultiplied();
    format!("#{r:02x}{g:02x}{b:02x}")
}
