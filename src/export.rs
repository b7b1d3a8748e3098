use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use eframe::egui::{Pos2, Vec2};
use resvg::tiny_skia;
use resvg::usvg;
use tracing::info;

use crate::error::{Result, ViewerError};
use crate::graph::{GraphSnapshot, LinkKind, NodeKind};
use crate::highlight::{Highlighter, LinkEmphasis, NodeEmphasis};
use crate::layout::{LayoutEngine, ViewTransform};
use crate::style;
use crate::util::truncate_label;

pub const SVG_FILE_NAME: &str = "codebase-graph.svg";
pub const PNG_FILE_NAME: &str = "codebase-graph.png";

const LABEL_MAX_CHARS: usize = 32;
const LABEL_FONT_SIZE: f32 = 11.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub center: Pos2,
    pub radius: f32,
    pub emphasis: NodeEmphasis,
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneLink {
    pub from: Pos2,
    pub to: Pos2,
    pub kind: LinkKind,
    pub emphasis: LinkEmphasis,
}

/// Screen-space picture of the graph at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub nodes: Vec<SceneNode>,
    pub links: Vec<SceneLink>,
}

impl Scene {
    pub fn capture(
        layout: &LayoutEngine,
        snapshot: &GraphSnapshot,
        highlighter: &Highlighter,
        selected: Option<&str>,
        transform: ViewTransform,
        viewport: Vec2,
    ) -> Self {
        let positions = &layout.frame().positions;
        let to_screen = |index: usize| {
            let world = positions.get(index).copied().unwrap_or(Vec2::ZERO);
            transform.world_to_screen(Pos2::ZERO, world)
        };

        let nodes = layout
            .nodes()
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let label = snapshot
                    .node(&node.id)
                    .map_or(node.id.as_str(), |graph_node| graph_node.label());
                SceneNode {
                    id: node.id.clone(),
                    label: truncate_label(label, LABEL_MAX_CHARS),
                    kind: node.kind.clone(),
                    center: to_screen(index),
                    radius: node.radius * transform.zoom,
                    emphasis: highlighter.node_emphasis(&node.id),
                    selected: selected == Some(node.id.as_str()),
                }
            })
            .collect::<Vec<_>>();

        let links = layout
            .links()
            .iter()
            .map(|link| {
                let source = &layout.nodes()[link.source].id;
                let target = &layout.nodes()[link.target].id;
                SceneLink {
                    from: to_screen(link.source),
                    to: to_screen(link.target),
                    kind: link.kind.clone(),
                    emphasis: highlighter.link_emphasis_between(source, target, &link.kind),
                }
            })
            .collect();

        Self {
            width: viewport.x.max(1.0).round() as u32,
            height: viewport.y.max(1.0).round() as u32,
            nodes,
            links,
        }
    }
}

/// Serializes the scene as a standalone SVG document.
pub fn render_svg(scene: &Scene) -> String {
    let mut svg = String::with_capacity(256 + scene.nodes.len() * 160 + scene.links.len() * 96);
    let (width, height) = (scene.width.max(1), scene.height.max(1));

    // `write!` into a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let _ = writeln!(
        svg,
        r#"<rect width="100%" height="100%" fill="{}"/>"#,
        style::hex(style::BACKGROUND)
    );

    svg.push_str("<g class=\"links\">\n");
    for link in &scene.links {
        let _ = writeln!(
            svg,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="{:.2}" stroke-opacity="{:.2}"/>"#,
            link.from.x,
            link.from.y,
            link.to.x,
            link.to.y,
            style::hex(style::link_color(&link.kind)),
            link.emphasis.width,
            link.emphasis.opacity,
        );
    }
    svg.push_str("</g>\n<g class=\"nodes\">\n");

    for node in &scene.nodes {
        let fill = if node.selected {
            style::SELECTED
        } else if node.emphasis.on_path {
            style::blend_color(style::node_color(&node.kind), style::PATH, 0.6)
        } else {
            style::node_color(&node.kind)
        };
        let _ = writeln!(
            svg,
            r#"<circle data-id="{}" cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" fill-opacity="{:.2}" stroke="{}" stroke-width="1"/>"#,
            escape_xml(&node.id),
            node.center.x,
            node.center.y,
            node.radius,
            style::hex(fill),
            node.emphasis.opacity,
            style::hex(style::NODE_OUTLINE),
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="{LABEL_FONT_SIZE}" fill="{}" fill-opacity="{:.2}" dominant-baseline="middle">{}</text>"#,
            node.center.x + node.radius + 4.0,
            node.center.y,
            style::hex(style::LABEL),
            node.emphasis.opacity,
            escape_xml(&node.label),
        );
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}

/// Rasterizes SVG markup at `width`x`height` over the opaque canvas background.
pub fn render_png(svg: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &options)
        .map_err(|err| ViewerError::Export(format!("invalid SVG: {err}")))?;

    let mut pixmap = tiny_skia::Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| ViewerError::Export(format!("cannot allocate {width}x{height} image")))?;
    let [r, g, b, _] = style::BACKGROUND.to_srgba_unmultiplied();
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, 255));

    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        width.max(1) as f32 / size.width(),
        height.max(1) as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| ViewerError::Export(format!("PNG encoding failed: {err}")))
}

/// Writes an export artifact under `dir`, returning the full path.
pub fn write_artifact(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote export");
    Ok(path)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // Not representable in XML 1.0, even as a character reference.
            '\u{0}'..='\u{8}'
            | '\u{b}'
            | '\u{c}'
            | '\u{e}'..='\u{1f}'
            | '\u{fffe}'
            | '\u{ffff}' => {}
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};

    use super::*;
    use crate::graph::{FilterCriteria, GraphPayload, Link, Node, visible};
    use crate::layout::LayoutConfig;

    fn scene() -> Scene {
        Scene {
            width: 120,
            height: 80,
            nodes: vec![
                SceneNode {
                    id: "a".into(),
                    label: "<main>".into(),
                    kind: NodeKind::File,
                    center: pos2(30.0, 40.0),
                    radius: 14.0,
                    emphasis: NodeEmphasis::BASELINE,
                    selected: true,
                },
                SceneNode {
                    id: "b".into(),
                    label: "Parser".into(),
                    kind: NodeKind::Class,
                    center: pos2(90.0, 40.0),
                    radius: 11.0,
                    emphasis: NodeEmphasis::BASELINE,
                    selected: false,
                },
            ],
            links: vec![SceneLink {
                from: pos2(30.0, 40.0),
                to: pos2(90.0, 40.0),
                kind: LinkKind::Contains,
                emphasis: LinkEmphasis::baseline(&LinkKind::Contains),
            }],
        }
    }

    #[test]
    fn svg_contains_every_element_with_escaped_labels() {
        let svg = render_svg(&scene());
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<circle").count(), 2);
        assert_eq!(svg.matches("<line").count(), 1);
        assert!(svg.contains("&lt;main&gt;"));
        assert!(svg.contains(r#"width="120" height="80""#));
    }

    #[test]
    fn png_has_requested_dimensions() {
        let scene = scene();
        let png = render_png(&render_svg(&scene), scene.width, scene.height).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
        let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
        assert_eq!((width, height), (120, 80));
    }

    #[test]
    fn capture_leaves_layout_untouched() {
        let snapshot = GraphSnapshot::from_payload(GraphPayload {
            nodes: vec![
                Node::new("a", NodeKind::File).with_property("name", "main.rs"),
                Node::new("b", NodeKind::Class),
            ],
            links: vec![Link::new("a", "b", LinkKind::Contains)],
        });
        let mut layout = LayoutEngine::new(LayoutConfig::default());
        layout.sync(
            &visible(&snapshot, &FilterCriteria::default()),
            vec2(400.0, 300.0),
        );
        layout.step(1.0 / 60.0);
        let before = layout.frame().clone();

        let scene = Scene::capture(
            &layout,
            &snapshot,
            &Highlighter::new(),
            Some("a"),
            ViewTransform::default(),
            layout.viewport(),
        );
        assert_eq!(layout.frame(), &before);
        assert_eq!(scene.nodes.len(), 2);
        assert_eq!(scene.links.len(), 1);
        assert_eq!(scene.nodes[0].label, "main.rs");
        assert!(scene.nodes[0].selected);
        assert_eq!((scene.width, scene.height), (400, 300));
    }

    #[test]
    fn control_characters_in_labels_still_render() {
        let mut scene = scene();
        scene.nodes[1].label = "Par\u{1}ser\u{1b}\tok".into();
        scene.nodes[1].id = "b\u{0}".into();

        let svg = render_svg(&scene);
        assert!(!svg.contains('\u{1}'));
        assert!(!svg.contains('\u{1b}'));
        assert!(!svg.contains('\u{0}'));
        assert!(svg.contains("Parser\tok"));

        let png = render_png(&svg, scene.width, scene.height).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn invalid_svg_is_an_export_error() {
        let err = render_png("not svg", 10, 10).unwrap_err();
        assert!(matches!(err, ViewerError::Export(_)));
    }
}
