//! Geometry and numeric helpers
//!
//! Pure functions only. Collision resolution is built on these, so every
//! boundary convention (strict AABB overlap, inclusive circle touch) is
//! pinned down by the tests at the bottom of this file.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle anchored at its top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Inclusive point test
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Closest point on (or inside) the rectangle to `p`
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.x, self.right()),
            p.y.clamp(self.y, self.bottom()),
        )
    }

    /// Grow horizontally by `amount`, split evenly on both sides
    pub fn widened(&self, amount: f32) -> Self {
        Self::new(self.x - amount / 2.0, self.y, self.width + amount, self.height)
    }

    /// Whether `other` lies entirely inside this rectangle
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Circle given by center and radius
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub const fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Bounding square
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.center.x - self.radius,
            self.center.y - self.radius,
            self.radius * 2.0,
            self.radius * 2.0,
        )
    }
}

/// Result of a ray/rectangle query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the (normalized) ray direction
    pub distance: f32,
    pub point: Vec2,
}

#[inline]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

#[inline]
pub fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + (end - start) * t
}

#[inline]
pub fn distance(a: Vec2, b: Vec2) -> f32 {
    a.distance(b)
}

#[inline]
pub fn to_radians(degrees: f32) -> f32 {
    degrees.to_radians()
}

#[inline]
pub fn to_degrees(radians: f32) -> f32 {
    radians.to_degrees()
}

/// Uniform float in `[min, max)`; returns `min` for an empty range
pub fn random<R: Rng>(rng: &mut R, min: f32, max: f32) -> f32 {
    if max <= min {
        return min;
    }
    rng.random_range(min..max)
}

/// Uniform integer in `[min, max]`
pub fn random_int<R: Rng>(rng: &mut R, min: i32, max: i32) -> i32 {
    if max <= min {
        return min;
    }
    rng.random_range(min..=max)
}

#[inline]
pub fn magnitude(v: Vec2) -> f32 {
    v.length()
}

/// Unit vector, or zero for a zero-length input
#[inline]
pub fn normalize(v: Vec2) -> Vec2 {
    v.normalize_or_zero()
}

#[inline]
pub fn add(a: Vec2, b: Vec2) -> Vec2 {
    a + b
}

#[inline]
pub fn subtract(a: Vec2, b: Vec2) -> Vec2 {
    a - b
}

#[inline]
pub fn scale(v: Vec2, s: f32) -> Vec2 {
    v * s
}

#[inline]
pub fn dot(a: Vec2, b: Vec2) -> f32 {
    a.dot(b)
}

/// Reflect velocity off a surface normal: v' = v - 2(v·n)n
#[inline]
pub fn reflect(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

/// Open AABB overlap: touching edges do not count
pub fn rect_intersect(a: &Rect, b: &Rect) -> bool {
    a.x < b.right() && a.right() > b.x && a.y < b.bottom() && a.bottom() > b.y
}

/// Circle/rectangle overlap; a circle touching the boundary counts
pub fn circle_rect_intersect(circle: &Circle, rect: &Rect) -> bool {
    let closest = rect.closest_point(circle.center);
    closest.distance_squared(circle.center) <= circle.radius * circle.radius
}

/// Slab-method ray/AABB test
///
/// `dir` need not be normalized; the returned distance is measured along
/// the normalized direction. Hits behind the origin are ignored.
pub fn ray_rect_intersect(origin: Vec2, dir: Vec2, rect: &Rect) -> Option<RayHit> {
    let dir = dir.normalize_or_zero();
    if dir == Vec2::ZERO {
        return None;
    }

    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for (o, d, lo, hi) in [
        (origin.x, dir.x, rect.x, rect.right()),
        (origin.y, dir.y, rect.y, rect.bottom()),
    ] {
        if d.abs() < f32::EPSILON {
            // Parallel to this slab: must already be inside it
            if o < lo || o > hi {
                return None;
            }
        } else {
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }
    }

    if t_max < t_min || t_max < 0.0 {
        return None;
    }

    let t = if t_min >= 0.0 { t_min } else { 0.0 };
    Some(RayHit {
        distance: t,
        point: origin + dir * t,
    })
}
