//! Aim trajectory planning.
//!
//! The shot travels in a straight line, bouncing off the side walls,
//! until it hits a bubble or the ceiling. The planner only needs a raycast
//! capability, so any physics backend can sit behind [`CollisionQuery`];
//! [`BoardColliders`] is the built-in one that works straight off the grid.

use bevy::math::Vec2;
use tracing::{debug, warn};

use super::{config::BoardConfig, grid::HexGrid, hex::HexCoord};

/// Hits closer than this to the ray origin are the surface we start on.
const RAY_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Bubble(HexCoord),
    Wall(WallSide),
    /// The line above the top row. Shots stop here and snap into the top row.
    Ceiling,
    /// Never a valid stopping point, e.g. the score receptacle.
    Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec2,
    pub distance: f32,
    pub kind: HitKind,
}

/// Raycast capability consumed by the planner.
pub trait CollisionQuery {
    /// Every intersection along the ray, in any order.
    fn raycast(&self, origin: Vec2, direction: Vec2, max_length: f32) -> Vec<RayHit>;
}

/// How a path ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    /// Stopped against a grid bubble; the last collider.
    Bubble(HexCoord),
    Ceiling,
}

/// The vertices of an aim or flight path: start, every wall bounce, impact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub vertices: Vec<Vec2>,
    /// `None` when the ray never found anything to stop on.
    pub impact: Option<Impact>,
}

impl Path {
    /// A shot is only possible along a path that ends on something.
    pub fn is_shootable(&self) -> bool {
        self.impact.is_some()
    }

    pub fn start(&self) -> Option<Vec2> {
        self.vertices.first().copied()
    }

    /// The impact point for a shootable path.
    pub fn end(&self) -> Option<Vec2> {
        self.vertices.last().copied()
    }

    pub fn bounces(&self) -> usize {
        self.vertices.len().saturating_sub(2)
    }

    pub fn length(&self) -> f32 {
        self.vertices.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// Seconds a projectile needs to travel the whole path.
    pub fn flight_duration(&self, speed: f32) -> f32 {
        if speed <= 0.0 {
            return 0.0;
        }
        self.length() / speed
    }
}

/// Mirror a direction off a vertical wall.
pub fn reflect_off_wall(direction: Vec2) -> Vec2 {
    Vec2::new(-direction.x, direction.y)
}

/// Turn a pointer position into a shot direction.
///
/// Shots always go upward and are clamped to `max_angle` radians from vertical
/// so they can't be fired too horizontally.
pub fn aim_direction(start: Vec2, target: Vec2, max_angle: f32) -> Option<Vec2> {
    let mut direction = (target - start).normalize_or_zero();
    if direction == Vec2::ZERO {
        return None;
    }

    // Ensure we're aiming upward (not down)
    if direction.y < 0.1 {
        direction.y = 0.1;
        direction = direction.normalize();
    }

    let angle = direction.x.atan2(direction.y);
    let clamped = angle.clamp(-max_angle, max_angle);
    Some(Vec2::new(clamped.sin(), clamped.cos()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPlanner {
    pub max_ray_length: f32,
    pub max_reflections: usize,
}

impl TrajectoryPlanner {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            max_ray_length: config.max_ray_length,
            max_reflections: config.max_reflections,
        }
    }

    /// Build the path from `start` along `direction`, reflecting off walls.
    pub fn plan(&self, start: Vec2, direction: Vec2, query: &impl CollisionQuery) -> Path {
        let mut path = Path {
            vertices: vec![start],
            impact: None,
        };
        let mut direction = direction.normalize_or_zero();
        if direction == Vec2::ZERO {
            return path;
        }

        let mut origin = start;
        for _ in 0..=self.max_reflections {
            let Some(hit) = nearest_valid_hit(query.raycast(origin, direction, self.max_ray_length))
            else {
                debug!("Aim ray from {:?} found nothing to stop on", origin);
                return path;
            };

            path.vertices.push(hit.point);
            match hit.kind {
                HitKind::Wall(_) => {
                    origin = hit.point;
                    direction = reflect_off_wall(direction);
                }
                HitKind::Bubble(cell) => {
                    path.impact = Some(Impact::Bubble(cell));
                    return path;
                }
                HitKind::Ceiling => {
                    path.impact = Some(Impact::Ceiling);
                    return path;
                }
                // Filtered out by `nearest_valid_hit`.
                HitKind::Excluded => return path,
            }
        }

        warn!(
            "Aim ray bounced {} times without stopping, giving up",
            self.max_reflections
        );
        path
    }
}

/// The closest hit that is a valid stopping or bouncing point.
fn nearest_valid_hit(mut hits: Vec<RayHit>) -> Option<RayHit> {
    hits.retain(|h| h.kind != HitKind::Excluded && h.distance > RAY_EPSILON);
    hits.into_iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Distance along a normalized ray to the first intersection with a circle.
fn ray_circle(origin: Vec2, direction: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let m = origin - center;
    let b = m.dot(direction);
    let c = m.length_squared() - radius * radius;
    // Outside the circle and pointing away
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    // Starting inside a collider: ignore it
    (t >= 0.0).then_some(t)
}

/// Engine-free collision geometry of a board in world space: a circle per
/// settled bubble, the two side walls, the ceiling and any excluded regions.
#[derive(Debug, Clone, Default)]
pub struct BoardColliders {
    pub bubbles: Vec<(HexCoord, Vec2)>,
    pub bubble_radius: f32,
    pub left_wall_x: f32,
    pub right_wall_x: f32,
    pub ceiling_y: Option<f32>,
    pub excluded: Vec<(Vec2, f32)>,
}

impl BoardColliders {
    /// Snapshot the colliders of a grid whose cell (0, 0) sits at `origin`.
    pub fn from_grid(grid: &HexGrid, origin: Vec2, config: &BoardConfig) -> Self {
        let mut bubbles: Vec<(HexCoord, Vec2)> = grid
            .coords()
            .map(|c| (c, origin + grid.cell_to_world(c)))
            .collect();
        bubbles.sort_by_key(|(c, _)| *c);

        let top = HexCoord::new(grid.top_row(), 0);
        let ceiling_y = origin.y + grid.cell_to_world(top).y;

        Self {
            bubbles,
            bubble_radius: config.collider_radius,
            left_wall_x: config.left_wall_x,
            right_wall_x: config.right_wall_x,
            ceiling_y: Some(ceiling_y),
            excluded: config
                .excluded_regions
                .iter()
                .map(|r| (r.center(), r.radius))
                .collect(),
        }
    }

    /// Every bubble a straight, non-reflecting ray passes through.
    pub fn cells_along(&self, origin: Vec2, direction: Vec2, max_length: f32) -> Vec<HexCoord> {
        let mut hits: Vec<RayHit> = self
            .raycast(origin, direction, max_length)
            .into_iter()
            .filter(|h| matches!(h.kind, HitKind::Bubble(_)))
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.into_iter()
            .filter_map(|h| match h.kind {
                HitKind::Bubble(cell) => Some(cell),
                _ => None,
            })
            .collect()
    }
}

impl CollisionQuery for BoardColliders {
    fn raycast(&self, origin: Vec2, direction: Vec2, max_length: f32) -> Vec<RayHit> {
        let direction = direction.normalize_or_zero();
        if direction == Vec2::ZERO {
            return Vec::new();
        }

        let mut hits = Vec::new();
        let mut push = |distance: f32, kind: HitKind| {
            if distance <= max_length {
                hits.push(RayHit {
                    point: origin + direction * distance,
                    distance,
                    kind,
                });
            }
        };

        if direction.x < 0.0 {
            push((self.left_wall_x - origin.x) / direction.x, HitKind::Wall(WallSide::Left));
        } else if direction.x > 0.0 {
            push((self.right_wall_x - origin.x) / direction.x, HitKind::Wall(WallSide::Right));
        }

        if let Some(ceiling_y) = self.ceiling_y
            && direction.y > 0.0
        {
            let t = (ceiling_y - origin.y) / direction.y;
            if t >= 0.0 {
                push(t, HitKind::Ceiling);
            }
        }

        for &(cell, center) in &self.bubbles {
            if let Some(t) = ray_circle(origin, direction, center, self.bubble_radius) {
                push(t, HitKind::Bubble(cell));
            }
        }

        for &(center, radius) in &self.excluded {
            if let Some(t) = ray_circle(origin, direction, center, radius) {
                push(t, HitKind::Excluded);
            }
        }

        hits
    }
}
