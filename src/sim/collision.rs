//! Collision detection and response for circles
//!
//! Narrow phase only: circle vs circle and circle vs static line segment.
//! The world decides what to do with a hit; these functions just measure.

use glam::Vec2;

use crate::consts::CONTACT_SLOP;

/// Result of a collision check
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// Whether the shapes touch (within `CONTACT_SLOP`)
    pub hit: bool,
    /// Contact point (if hit)
    pub point: Vec2,
    /// Unit normal pointing from the other shape toward the first circle
    pub normal: Vec2,
    /// Overlap depth; may be slightly negative for touching-but-separated shapes
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            point: Vec2::ZERO,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// Check collision between two circles
///
/// The normal points from `b` toward `a`. Coincident centres fall back to
/// an upward normal so the pair still separates deterministically.
pub fn circle_circle_collision(a_pos: Vec2, a_radius: f32, b_pos: Vec2, b_radius: f32) -> CollisionResult {
    let delta = a_pos - b_pos;
    let dist = delta.length();
    let penetration = a_radius + b_radius - dist;

    if penetration < -CONTACT_SLOP {
        return CollisionResult::miss();
    }

    let normal = if dist > 1e-6 { delta / dist } else { Vec2::Y };
    CollisionResult {
        hit: true,
        point: b_pos + normal * b_radius,
        normal,
        penetration,
    }
}

/// Closest point to `p` on the segment `a`-`b`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let line_vec = b - a;
    let line_len_sq = line_vec.length_squared();
    if line_len_sq < 0.0001 {
        return a; // Degenerate segment
    }
    let t = ((p - a).dot(line_vec) / line_len_sq).clamp(0.0, 1.0);
    a + line_vec * t
}

/// Check collision between a circle and a static segment
///
/// The normal points from the segment toward the circle centre. When the
/// centre lies exactly on the segment, the left-hand perpendicular is used.
pub fn circle_segment_collision(pos: Vec2, radius: f32, a: Vec2, b: Vec2) -> CollisionResult {
    let closest = closest_point_on_segment(pos, a, b);
    let delta = pos - closest;
    let dist = delta.length();
    let penetration = radius - dist;

    if penetration < -CONTACT_SLOP {
        return CollisionResult::miss();
    }

    let normal = if dist > 1e-6 {
        delta / dist
    } else {
        let line_vec = b - a;
        Vec2::new(-line_vec.y, line_vec.x).normalize_or(Vec2::Y)
    };

    CollisionResult {
        hit: true,
        point: closest,
        normal,
        penetration,
    }
}

/// Bounce off a surface with energy loss
///
/// Only the approaching normal component is reflected (scaled by
/// `restitution`); the tangential part is damped by `friction`.
pub fn bounce_velocity(velocity: Vec2, normal: Vec2, restitution: f32, friction: f32) -> Vec2 {
    let vn = velocity.dot(normal);
    if vn >= 0.0 {
        return velocity; // Already separating
    }
    let normal_part = normal * vn;
    let tangent_part = velocity - normal_part;
    tangent_part * (1.0 - friction).clamp(0.0, 1.0) - normal_part * restitution
}
