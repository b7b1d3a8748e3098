use std::collections::HashSet;

use crate::graph::{Link, LinkEnd, LinkKind, VisibleGraph, resolve_endpoint_id};

pub const DIMMED_OPACITY: f32 = 0.15;
const HIGHLIGHT_WIDTH_FACTOR: f32 = 2.0;
const HIGHLIGHT_WIDTH_EXTRA: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeEmphasis {
    pub opacity: f32,
    pub focused: bool,
    pub on_path: bool,
}

impl NodeEmphasis {
    pub const BASELINE: Self = Self {
        opacity: 1.0,
        focused: false,
        on_path: false,
    };

    pub fn is_dimmed(self) -> bool {
        self.opacity < 1.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkEmphasis {
    pub width: f32,
    pub opacity: f32,
    pub highlighted: bool,
}

impl LinkEmphasis {
    /// Unfocused appearance, by relationship type.
    pub fn baseline(kind: &LinkKind) -> Self {
        let (width, opacity) = match kind {
            LinkKind::Contains => (1.6, 0.6),
            LinkKind::HasMethod => (1.3, 0.6),
            LinkKind::Calls => (1.0, 0.35),
            LinkKind::HasError => (1.0, 0.8),
            LinkKind::Unknown(_) => (1.0, 0.5),
        };
        Self {
            width,
            opacity,
            highlighted: false,
        }
    }

    fn highlighted(kind: &LinkKind) -> Self {
        let baseline = Self::baseline(kind);
        Self {
            width: baseline.width * HIGHLIGHT_WIDTH_FACTOR + HIGHLIGHT_WIDTH_EXTRA,
            opacity: 1.0,
            highlighted: true,
        }
    }

    fn dimmed(kind: &LinkKind) -> Self {
        Self {
            opacity: DIMMED_OPACITY,
            ..Self::baseline(kind)
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Highlighter {
    focus: Option<String>,
    neighbors: HashSet<String>,
    path: Vec<String>,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    pub fn neighbors(&self) -> &HashSet<String> {
        &self.neighbors
    }

    pub fn is_active(&self) -> bool {
        self.focus.is_some() || !self.path.is_empty()
    }

    /// Recomputes the neighbourhood of `focus` in a single pass over `links`.
    pub fn set_focus<'a>(
        &mut self,
        focus: Option<&str>,
        links: impl IntoIterator<Item = &'a Link>,
    ) {
        self.neighbors.clear();
        self.focus = focus.map(str::to_owned);

        let Some(focus) = focus else {
            return;
        };

        for link in links {
            let source = resolve_endpoint_id(link, LinkEnd::Source);
            let target = resolve_endpoint_id(link, LinkEnd::Target);
            let other = if source == focus {
                target
            } else if target == focus {
                source
            } else {
                continue;
            };
            if other != focus {
                self.neighbors.insert(other.to_owned());
            }
        }
    }

    /// Focuses within the filtered view, so hidden links never make a neighbour.
    pub fn focus_in_view(&mut self, focus: Option<&str>, view: &VisibleGraph<'_>) {
        self.set_focus(focus, view.links.iter().copied());
    }

    pub fn clear_focus(&mut self) {
        self.set_focus(None, std::iter::empty());
    }

    /// Emphasises every node on `path` and the links between consecutive entries.
    pub fn set_path(&mut self, path: Option<&[String]>) {
        self.path.clear();
        if let Some(path) = path {
            self.path.extend(path.iter().cloned());
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn node_emphasis(&self, id: &str) -> NodeEmphasis {
        if !self.is_active() {
            return NodeEmphasis::BASELINE;
        }

        let focused = self.focus.as_deref() == Some(id);
        let on_path = self.path.iter().any(|step| step == id);
        let emphasised = focused || on_path || self.neighbors.contains(id);
        NodeEmphasis {
            opacity: if emphasised { 1.0 } else { DIMMED_OPACITY },
            focused,
            on_path,
        }
    }

    pub fn link_emphasis(&self, link: &Link) -> LinkEmphasis {
        self.link_emphasis_between(
            resolve_endpoint_id(link, LinkEnd::Source),
            resolve_endpoint_id(link, LinkEnd::Target),
            &link.kind,
        )
    }

    pub fn link_emphasis_between(
        &self,
        source: &str,
        target: &str,
        kind: &LinkKind,
    ) -> LinkEmphasis {
        if !self.is_active() {
            return LinkEmphasis::baseline(kind);
        }

        let focus = self.focus.as_deref();
        let touches_focus = focus == Some(source) || focus == Some(target);
        if touches_focus || self.on_path(source, target) {
            LinkEmphasis::highlighted(kind)
        } else {
            LinkEmphasis::dimmed(kind)
        }
    }

    fn on_path(&self, source: &str, target: &str) -> bool {
        self.path.windows(2).any(|pair| {
            (pair[0] == source && pair[1] == target) || (pair[0] == target && pair[1] == source)
        })
    }
}
