//! Drawing contract between the simulation and an external renderer
//!
//! Entities describe themselves as plain shapes; whoever owns the real
//! drawing surface implements [`DrawContext`] and rasterizes them. Nothing
//! here mutates simulation state.

use glam::Vec2;

use crate::config::Color;
use crate::math::Rect;

/// A single primitive emitted by an entity's render hook
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle {
        center: Vec2,
        radius: f32,
        color: Color,
        alpha: f32,
    },
    Rect {
        rect: Rect,
        color: Color,
        alpha: f32,
        /// Squash/stretch around the rect center
        scale: Vec2,
        rotation: f32,
    },
}

impl Shape {
    pub fn alpha(&self) -> f32 {
        match self {
            Shape::Circle { alpha, .. } | Shape::Rect { alpha, .. } => *alpha,
        }
    }
}

/// Opaque drawing surface handed to render hooks once per frame
pub trait DrawContext {
    fn draw(&mut self, shape: Shape);
}

/// Collects shapes in draw order (headless runs and tests)
#[derive(Debug, Default)]
pub struct ShapeRecorder {
    pub shapes: Vec<Shape>,
}

impl DrawContext for ShapeRecorder {
    fn draw(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }
}

/// Full-screen effects the renderer applies on top of the entities
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Overlay {
    /// Offset the whole scene by this much
    pub shake_offset: Vec2,
    pub flash: Option<(Color, f32)>,
}
