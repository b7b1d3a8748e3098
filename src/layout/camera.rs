use eframe::egui::{Pos2, Vec2};

pub const RECENTER_DURATION_SECS: f64 = 0.75;
pub const RECENTER_MIN_ZOOM: f32 = 1.5;
pub const MIN_ZOOM: f32 = 0.05;
pub const MAX_ZOOM: f32 = 6.0;

/// World-to-screen mapping: `screen = origin + pan + world * zoom`, where `origin` is the
/// viewport's top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl ViewTransform {
    pub fn world_to_screen(self, origin: Pos2, world: Vec2) -> Pos2 {
        origin + self.pan + world * self.zoom
    }

    pub fn screen_to_world(self, origin: Pos2, screen: Pos2) -> Vec2 {
        (screen - origin - self.pan) / self.zoom
    }

    /// Zooms by `factor` keeping the world point under `anchor` fixed.
    pub fn zoom_about(&mut self, origin: Pos2, anchor: Pos2, factor: f32) {
        let world = self.screen_to_world(origin, anchor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan = anchor - origin - world * self.zoom;
    }

    fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            pan: self.pan + (other.pan - self.pan) * t,
            zoom: self.zoom + (other.zoom - self.zoom) * t,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Transition {
    from: ViewTransform,
    to: ViewTransform,
    started_at: f64,
    duration: f64,
}

/// Pan/zoom state plus an optional timed transition. Never touches node positions.
#[derive(Clone, Debug, Default)]
pub struct Camera {
    transform: ViewTransform,
    transition: Option<Transition>,
}

impl Camera {
    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Direct manipulation cancels any running transition.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.transition = None;
        self.transform.pan += delta;
    }

    pub fn zoom_about(&mut self, origin: Pos2, anchor: Pos2, factor: f32) {
        self.transition = None;
        self.transform.zoom_about(origin, anchor, factor);
    }

    pub fn reset(&mut self) {
        self.transition = None;
        self.transform = ViewTransform::default();
    }

    /// Starts animating so that `world` ends up in the middle of a `viewport`-sized view.
    pub fn recenter_on(&mut self, world: Vec2, viewport: Vec2, now: f64) {
        let zoom = self.transform.zoom.max(RECENTER_MIN_ZOOM).min(MAX_ZOOM);
        let to = ViewTransform {
            pan: viewport * 0.5 - world * zoom,
            zoom,
        };
        self.transition = Some(Transition {
            from: self.transform,
            to,
            started_at: now,
            duration: RECENTER_DURATION_SECS,
        });
    }

    /// Advances a running transition to time `now`.
    pub fn tick(&mut self, now: f64) {
        let Some(transition) = self.transition else {
            return;
        };

        let elapsed = (now - transition.started_at).max(0.0);
        if elapsed >= transition.duration {
            self.transform = transition.to;
            self.transition = None;
            return;
        }

        let t = ease_in_out_cubic((elapsed / transition.duration) as f32);
        self.transform = transition.from.lerp(transition.to, t);
    }
}

fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};

    use super::*;

    #[test]
    fn recenter_lands_node_in_viewport_center() {
        let mut camera = Camera::default();
        let viewport = vec2(800.0, 600.0);
        let node = vec2(120.0, -40.0);
        camera.recenter_on(node, viewport, 10.0);

        camera.tick(10.3);
        assert!(camera.is_animating());

        camera.tick(10.0 + RECENTER_DURATION_SECS);
        assert!(!camera.is_animating());
        let screen = camera.transform().world_to_screen(Pos2::ZERO, node);
        assert!((screen - pos2(400.0, 300.0)).length() < 1e-3);
    }

    #[test]
    fn manual_pan_cancels_transition() {
        let mut camera = Camera::default();
        camera.recenter_on(vec2(10.0, 10.0), vec2(100.0, 100.0), 0.0);
        camera.pan_by(vec2(5.0, 0.0));
        assert!(!camera.is_animating());
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut transform = ViewTransform::default();
        let origin = pos2(10.0, 10.0);
        let anchor = pos2(210.0, 110.0);
        let before = transform.screen_to_world(origin, anchor);
        transform.zoom_about(origin, anchor, 1.1);
        let after = transform.screen_to_world(origin, anchor);
        assert!((before - after).length() < 1e-3);
    }
}
