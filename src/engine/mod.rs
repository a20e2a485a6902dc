//! Layout engine seam and the geometry it reports.
//!
//! All coordinates here are in layout space: points, origin in the bottom-left
//! corner, y growing upwards. Node sizes are in inches.

pub mod dagre;

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::geometry::{Point, Size};
use crate::model::{EdgeId, GraphModel, NodeId, SubgraphId};

pub use dagre::DagreEngine;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    /// Engine rejected the graph; `code` is the engine's error count or status.
    #[error("layout engine failed (code {code}): {message}")]
    Engine { code: i32, message: String },
}

/// Computes positions for every element of a graph.
pub trait LayoutEngine {
    fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError>;

    /// Releases buffers kept from the last layout run.
    fn free_layout(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub ll: Point,
    pub ur: Point,
}

impl BoundingBox {
    pub const fn new(ll: Point, ur: Point) -> Self {
        Self { ll, ur }
    }

    pub fn width(&self) -> f64 {
        self.ur.x - self.ll.x
    }

    pub fn height(&self) -> f64 {
        self.ur.y - self.ll.y
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// A label placed by the engine. `pos` is the label centre, `size` its
/// footprint in points. `text` has escapes already expanded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLabel {
    pub text: String,
    pub html: bool,
    pub pos: Point,
    pub size: Size,
}

/// Outline of a node shape, centred on the origin.
///
/// Polygonal shapes list `sides` vertices per periphery, outermost ring
/// last. Elliptic shapes list two corner points per periphery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeDescriptor {
    pub sides: usize,
    pub peripheries: usize,
    pub vertices: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGeometry {
    pub center: Point,
    /// Inches.
    pub width: f64,
    /// Inches.
    pub height: f64,
    pub shape: Option<ShapeDescriptor>,
    pub label: Option<TextLabel>,
    pub xlabel: Option<TextLabel>,
}

/// One Bezier chain: `p0` followed by groups of three control points. When
/// present, `start`/`end` are the tips of the tail/head arrows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bezier {
    pub points: Vec<Point>,
    pub start: Option<Point>,
    pub end: Option<Point>,
}

impl Bezier {
    pub fn has_start_arrow(&self) -> bool {
        self.start.is_some()
    }

    pub fn has_end_arrow(&self) -> bool {
        self.end.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeGeometry {
    pub splines: Vec<Bezier>,
    pub label: Option<TextLabel>,
    pub xlabel: Option<TextLabel>,
    pub head_label: Option<TextLabel>,
    pub tail_label: Option<TextLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgraphGeometry {
    pub bb: BoundingBox,
    pub label: Option<TextLabel>,
}

/// Everything one engine run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphLayout {
    pub bb: BoundingBox,
    pub label: Option<TextLabel>,
    pub nodes: HashMap<NodeId, NodeGeometry>,
    pub edges: HashMap<EdgeId, EdgeGeometry>,
    pub subgraphs: HashMap<SubgraphId, SubgraphGeometry>,
}

impl GraphLayout {
    /// Height used for the y flip into screen space.
    pub fn height(&self) -> f64 {
        self.bb.ur.y
    }
}
