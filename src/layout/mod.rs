mod camera;
mod forces;
mod quadtree;

use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};
use serde::Deserialize;
use tracing::debug;

use crate::graph::{LinkEnd, LinkKind, NodeKind, VisibleGraph, resolve_endpoint_id};
use crate::util::stable_pair;
pub use camera::{Camera, RECENTER_DURATION_SECS, ViewTransform};
use forces::{
    CollisionParams, RepulsionParams, accumulate_collision_pairs, accumulate_repulsion_for_node,
};
use quadtree::QuadNode;

const BARNES_HUT_THETA: f32 = 0.72;
const ALPHA_MIN: f32 = 0.001;
const ALPHA_DECAY: f32 = 0.0228;
pub const DRAG_ALPHA_TARGET: f32 = 0.3;

/// Physics tunables. All scales are clamped to sane ranges before use.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub intensity: f32,
    pub repulsion: f32,
    pub spring: f32,
    pub collision: f32,
    pub velocity_damping: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            repulsion: 1.0,
            spring: 1.0,
            collision: 1.0,
            velocity_damping: 0.85,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LayoutNode {
    pub id: String,
    pub kind: NodeKind,
    pub radius: f32,
    weight: f32,
    position: Vec2,
    velocity: Vec2,
    pinned: Option<Vec2>,
}

impl LayoutNode {
    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutLink {
    pub source: usize,
    pub target: usize,
    pub kind: LinkKind,
}

/// Positions published at the end of a step, indexed like [`LayoutEngine::nodes`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutFrame {
    pub generation: u64,
    pub tick: u64,
    pub positions: Vec<Vec2>,
}

#[derive(Default)]
struct PhysicsScratch {
    forces: Vec<Vec2>,
    positions: Vec<Vec2>,
    radii: Vec<f32>,
    weights: Vec<f32>,
}

struct Simulation {
    nodes: Vec<LayoutNode>,
    links: Vec<LayoutLink>,
    index_by_id: HashMap<String, usize>,
    center: Vec2,
    alpha: f32,
    alpha_target: f32,
    running: bool,
    scratch: PhysicsScratch,
}

pub struct LayoutEngine {
    config: LayoutConfig,
    simulation: Option<Simulation>,
    structure_key: Option<u64>,
    viewport: Vec2,
    generation: u64,
    frame: LayoutFrame,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            simulation: None,
            structure_key: None,
            viewport: Vec2::ZERO,
            generation: 0,
            frame: LayoutFrame::default(),
        }
    }

    pub fn config(&self) -> LayoutConfig {
        self.config
    }

    pub fn set_config(&mut self, config: LayoutConfig) {
        self.config = config;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// Replaces the simulation when the visible node/link set or the viewport changed.
    ///
    /// Positions of nodes that survive the change are carried over. Returns whether a new
    /// simulation was started.
    pub fn sync(&mut self, visible: &VisibleGraph<'_>, viewport: Vec2) -> bool {
        let key = visible.structure_key();
        if self.structure_key == Some(key) && self.viewport == viewport && self.simulation.is_some()
        {
            return false;
        }

        let previous = self.simulation.take();
        self.structure_key = Some(key);
        self.viewport = viewport;
        self.generation = self.generation.wrapping_add(1);

        let center = viewport * 0.5;
        let previous_positions = previous
            .as_ref()
            .map(|simulation| {
                simulation
                    .nodes
                    .iter()
                    .map(|node| (node.id.as_str(), (node.position, node.pinned)))
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();

        let mut index_by_id = HashMap::with_capacity(visible.nodes.len());
        for (index, node) in visible.nodes.iter().enumerate() {
            index_by_id.insert(node.id.clone(), index);
        }

        let links = visible
            .links
            .iter()
            .filter_map(|link| {
                let source = *index_by_id.get(resolve_endpoint_id(link, LinkEnd::Source))?;
                let target = *index_by_id.get(resolve_endpoint_id(link, LinkEnd::Target))?;
                (source != target).then(|| LayoutLink {
                    source,
                    target,
                    kind: link.kind.clone(),
                })
            })
            .collect::<Vec<_>>();

        let mut carried = 0usize;
        let mut nodes = visible
            .nodes
            .iter()
            .map(|node| {
                let prior = previous_positions.get(node.id.as_str()).copied();
                if prior.is_some() {
                    carried += 1;
                }
                let (position, pinned) = prior.unwrap_or((Vec2::ZERO, None));
                LayoutNode {
                    id: node.id.clone(),
                    kind: node.kind.clone(),
                    radius: node.kind.radius(),
                    weight: node.kind.weight(),
                    position,
                    velocity: Vec2::ZERO,
                    pinned,
                }
            })
            .collect::<Vec<_>>();

        let seeded = nodes
            .iter()
            .map(|node| previous_positions.contains_key(node.id.as_str()))
            .collect::<Vec<_>>();
        for index in 0..nodes.len() {
            if !seeded[index] {
                let anchor = links
                    .iter()
                    .find_map(|link| {
                        if link.source == index && seeded[link.target] {
                            Some(nodes[link.target].position)
                        } else if link.target == index && seeded[link.source] {
                            Some(nodes[link.source].position)
                        } else {
                            None
                        }
                    })
                    .unwrap_or(center);
                nodes[index].position = initial_position(&nodes[index].id, index, anchor);
            }
        }

        let alpha = if carried * 2 >= nodes.len() && carried > 0 {
            0.5
        } else {
            1.0
        };

        debug!(
            generation = self.generation,
            nodes = nodes.len(),
            links = links.len(),
            carried,
            "restarting layout simulation"
        );

        self.simulation = Some(Simulation {
            nodes,
            links,
            index_by_id,
            center,
            alpha,
            alpha_target: 0.0,
            running: true,
            scratch: PhysicsScratch::default(),
        });
        self.publish(0);
        true
    }

    /// Halts stepping. Idempotent; a later `sync` or drag starts it again.
    pub fn stop(&mut self) {
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.simulation
            .as_ref()
            .is_some_and(|simulation| simulation.running)
    }

    pub fn alpha(&self) -> f32 {
        self.simulation
            .as_ref()
            .map_or(0.0, |simulation| simulation.alpha)
    }

    pub fn reheat(&mut self, alpha: f32) {
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.alpha = simulation.alpha.max(alpha);
            simulation.running = true;
        }
    }

    pub fn nodes(&self) -> &[LayoutNode] {
        self.simulation
            .as_ref()
            .map_or(&[], |simulation| simulation.nodes.as_slice())
    }

    pub fn links(&self) -> &[LayoutLink] {
        self.simulation
            .as_ref()
            .map_or(&[], |simulation| simulation.links.as_slice())
    }

    pub fn frame(&self) -> &LayoutFrame {
        &self.frame
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.simulation
            .as_ref()
            .and_then(|simulation| simulation.index_by_id.get(id).copied())
    }

    pub fn position(&self, id: &str) -> Option<Vec2> {
        let index = self.index_of(id)?;
        self.frame.positions.get(index).copied()
    }

    /// Topmost node whose circle contains `world`, within `slack` extra world units.
    pub fn node_at(&self, world: Vec2, slack: f32) -> Option<usize> {
        self.nodes()
            .iter()
            .zip(&self.frame.positions)
            .enumerate()
            .filter_map(|(index, (node, position))| {
                let distance = (*position - world).length();
                (distance <= node.radius + slack).then_some((index, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    /// Pins a node under the pointer and raises the energy so neighbours react.
    pub fn begin_drag(&mut self, id: &str, world: Vec2) -> bool {
        let Some(simulation) = self.simulation.as_mut() else {
            return false;
        };
        let Some(&index) = simulation.index_by_id.get(id) else {
            return false;
        };

        let node = &mut simulation.nodes[index];
        node.pinned = Some(world);
        node.position = world;
        node.velocity = Vec2::ZERO;
        simulation.alpha_target = DRAG_ALPHA_TARGET;
        simulation.running = true;
        self.publish(self.frame.tick);
        true
    }

    pub fn drag_to(&mut self, id: &str, world: Vec2) {
        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };
        if let Some(&index) = simulation.index_by_id.get(id) {
            let node = &mut simulation.nodes[index];
            if node.pinned.is_some() {
                node.pinned = Some(world);
                node.position = world;
            }
        }
    }

    /// Releases the pin and lets the energy decay back to rest.
    pub fn end_drag(&mut self, id: &str) {
        let Some(simulation) = self.simulation.as_mut() else {
            return;
        };
        if let Some(&index) = simulation.index_by_id.get(id) {
            simulation.nodes[index].pinned = None;
        }
        if simulation.nodes.iter().all(|node| node.pinned.is_none()) {
            simulation.alpha_target = 0.0;
        }
    }

    /// Advances one step. `delta_seconds` is the frame time; returns whether anything moved.
    pub fn step(&mut self, delta_seconds: f32) -> bool {
        let config = self.config;
        let Some(simulation) = self.simulation.as_mut() else {
            return false;
        };
        if !simulation.running {
            return false;
        }

        simulation.alpha += (simulation.alpha_target - simulation.alpha) * ALPHA_DECAY;
        if simulation.alpha < ALPHA_MIN && simulation.alpha_target <= 0.0 {
            simulation.running = false;
            debug!(generation = self.generation, "layout settled");
            return false;
        }

        let moved = step_physics(simulation, config, delta_seconds);
        let tick = self.frame.tick.wrapping_add(1);
        self.publish(tick);
        moved
    }

    fn publish(&mut self, tick: u64) {
        self.frame.generation = self.generation;
        self.frame.tick = tick;
        self.frame.positions.clear();
        if let Some(simulation) = self.simulation.as_ref() {
            self.frame
                .positions
                .extend(simulation.nodes.iter().map(|node| node.position));
        }
    }
}

fn initial_position(id: &str, index: usize, anchor: Vec2) -> Vec2 {
    let (jx, jy) = stable_pair(id);
    let mut direction = vec2(jx, jy);
    if direction.length_sq() <= 0.0001 {
        let angle = ((index as f32) * 0.618_034 + 0.11) * std::f32::consts::TAU;
        direction = vec2(angle.cos(), angle.sin());
    }
    anchor + direction * 60.0
}

fn step_physics(simulation: &mut Simulation, config: LayoutConfig, delta_seconds: f32) -> bool {
    let node_count = simulation.nodes.len();
    if node_count == 0 {
        return false;
    }

    let scratch = &mut simulation.scratch;
    scratch.forces.clear();
    scratch.forces.resize(node_count, Vec2::ZERO);
    scratch.positions.clear();
    scratch.radii.clear();
    scratch.weights.clear();
    let mut max_radius = 0.0_f32;
    for node in &simulation.nodes {
        scratch.positions.push(node.position);
        scratch.radii.push(node.radius);
        scratch.weights.push(node.weight);
        max_radius = max_radius.max(node.radius);
    }

    let forces = &mut scratch.forces;
    let positions = &scratch.positions;

    let intensity = config.intensity.clamp(0.2, 2.5);
    let alpha = simulation.alpha;
    let repulsion = RepulsionParams {
        strength: 9_000.0 * intensity * config.repulsion.clamp(0.25, 2.6),
        softening: 400.0,
        theta: BARNES_HUT_THETA,
    };
    let spring_strength = 0.06 * intensity * config.spring.clamp(0.2, 2.2);
    let spring_damping = 0.22;
    let collision_padding = 4.0;
    let collision = CollisionParams {
        strength: 0.7 * intensity * config.collision.clamp(0.2, 2.0),
        padding: collision_padding,
        max_distance_sq: (max_radius * 2.0 + collision_padding).powi(2),
    };
    let center_pull = 0.012 * intensity;
    let time_step_scale = (delta_seconds * 60.0).clamp(0.25, 3.0);
    let damping_factor = config.velocity_damping.clamp(0.5, 0.97).powf(time_step_scale);

    if let Some(tree) = QuadNode::build(positions, &scratch.weights) {
        if node_count > 1 {
            for (index, force) in forces.iter_mut().enumerate() {
                accumulate_repulsion_for_node(
                    &tree,
                    index,
                    positions,
                    &scratch.weights,
                    repulsion,
                    force,
                );
            }
        }

        accumulate_collision_pairs(
            &tree,
            &tree,
            true,
            positions,
            &scratch.radii,
            collision,
            forces,
        );
    }

    for link in &simulation.links {
        let (from, to) = (link.source, link.target);
        let delta = positions[to] - positions[from];
        let distance = delta.length();
        if distance <= 0.0001 {
            continue;
        }
        let direction = delta / distance;

        let rest = link.kind.target_distance() + scratch.radii[from] + scratch.radii[to];
        let spring = (distance - rest) * spring_strength;
        let relative_velocity = simulation.nodes[to].velocity - simulation.nodes[from].velocity;
        let correction = direction * (spring + relative_velocity.dot(direction) * spring_damping);

        // Lighter endpoints give way more.
        let weight_from = scratch.weights[from];
        let weight_to = scratch.weights[to];
        let share_from = weight_to / (weight_from + weight_to);
        forces[from] += correction * (2.0 * share_from);
        forces[to] -= correction * (2.0 * (1.0 - share_from));
    }

    for (force, position) in forces.iter_mut().zip(positions) {
        *force += (simulation.center - *position) * center_pull;
    }

    let max_force = 165.0 + (intensity * 90.0);
    let max_speed = 11.0 + (intensity * 15.0);
    let mut any_motion = false;
    let mut drift = Vec2::ZERO;
    let mut free_count = 0usize;
    for (node, force) in simulation.nodes.iter_mut().zip(forces.iter()) {
        if let Some(pin) = node.pinned {
            node.position = pin;
            node.velocity = Vec2::ZERO;
            continue;
        }

        let mut force = *force * alpha;
        let force_length = force.length();
        if force_length > max_force {
            force *= max_force / force_length;
        }

        let mut velocity = (node.velocity + force * (0.55 * time_step_scale)) * damping_factor;
        let speed = velocity.length();
        if speed > max_speed {
            velocity *= max_speed / speed;
        }

        node.velocity = velocity;
        node.position += velocity * time_step_scale;
        drift += velocity;
        free_count += 1;
        if velocity.length_sq() > 0.000_001 {
            any_motion = true;
        }
    }

    // Keep the free bodies from sliding off together; pinned anchors hold still.
    let pinned_any = simulation.nodes.iter().any(LayoutNode::is_pinned);
    if free_count > 1 && !pinned_any {
        let drift = drift / free_count as f32;
        for node in &mut simulation.nodes {
            node.velocity -= drift;
        }

        let mut centroid = Vec2::ZERO;
        for node in &simulation.nodes {
            centroid += node.position;
        }
        centroid /= node_count as f32;
        let shift = (simulation.center - centroid) * 0.1;
        for node in &mut simulation.nodes {
            node.position += shift;
        }
    }

    any_motion
}
