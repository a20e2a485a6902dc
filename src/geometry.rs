//! Screen-space geometry and the conversions from layout space.
//!
//! The layout engine reports coordinates with the origin in the bottom-left
//! corner and the y axis pointing up. Everything the scene stores uses the
//! rendering convention instead: origin top-left, y pointing down. All
//! conversions are parameterised by the overall graph height reported by the
//! engine.

use serde::Serialize;
use std::ops::{Add, Mul, Neg, Sub};
use thiserror::Error;

use crate::engine::{Bezier, ShapeDescriptor};

/// Points per inch used by the layout engine for node sizes.
pub const DOT_DEFAULT_DPI: f64 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (other - self).length()
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        self + (other - self) * t
    }

    pub fn approx_eq(self, other: Point, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in screen space. `x`/`y` is the top-left corner.
///
/// A rectangle with zero width and zero height is "null" and is ignored by
/// [`Rect::united`], matching how empty geometry must not drag the scene bounds
/// towards the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(a: Point, b: Point) -> Self {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        Self::new(left, top, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn from_center(center: Point, size: Size) -> Self {
        Self::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
            size.width,
            size.height,
        )
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_null(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// True when the rectangle encloses no area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    pub fn translated(&self, offset: Point) -> Rect {
        Rect::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    pub fn adjusted(&self, dx1: f64, dy1: f64, dx2: f64, dy2: f64) -> Rect {
        Rect::new(
            self.x + dx1,
            self.y + dy1,
            (self.width - dx1 + dx2).max(0.0),
            (self.height - dy1 + dy2).max(0.0),
        )
    }

    pub fn with_center(&self, center: Point) -> Rect {
        Rect::from_center(center, self.size())
    }

    pub fn united(&self, other: &Rect) -> Rect {
        if other.is_null() {
            return *self;
        }
        if self.is_null() {
            return *other;
        }
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    /// `other` lies inside `self` without touching any edge.
    pub fn strictly_contains(&self, other: &Rect) -> bool {
        other.left() > self.left()
            && other.top() > self.top()
            && other.right() < self.right()
            && other.bottom() < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PathElement {
    MoveTo(Point),
    LineTo(Point),
    CubicTo(Point, Point, Point),
    Close,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// A path with nothing to stroke or fill.
    pub fn is_empty(&self) -> bool {
        !self
            .elements
            .iter()
            .any(|el| matches!(el, PathElement::LineTo(_) | PathElement::CubicTo(..)))
    }

    pub fn move_to(&mut self, p: Point) {
        self.elements.push(PathElement::MoveTo(p));
    }

    pub fn line_to(&mut self, p: Point) {
        self.elements.push(PathElement::LineTo(p));
    }

    pub fn cubic_to(&mut self, c1: Point, c2: Point, end: Point) {
        self.elements.push(PathElement::CubicTo(c1, c2, end));
    }

    pub fn close(&mut self) {
        self.elements.push(PathElement::Close);
    }

    pub fn append(&mut self, other: &Path) {
        self.elements.extend_from_slice(&other.elements);
    }

    pub fn add_polygon(&mut self, points: &[Point]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.move_to(*first);
        for p in rest {
            self.line_to(*p);
        }
        self.close();
    }

    /// Appends an ellipse inscribed in `rect`, approximated by four cubic arcs.
    pub fn add_ellipse(&mut self, rect: Rect) {
        const KAPPA: f64 = 0.552_284_749_831;
        let c = rect.center();
        let rx = rect.width / 2.0;
        let ry = rect.height / 2.0;
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;
        self.move_to(Point::new(c.x + rx, c.y));
        self.cubic_to(
            Point::new(c.x + rx, c.y + ky),
            Point::new(c.x + kx, c.y + ry),
            Point::new(c.x, c.y + ry),
        );
        self.cubic_to(
            Point::new(c.x - kx, c.y + ry),
            Point::new(c.x - rx, c.y + ky),
            Point::new(c.x - rx, c.y),
        );
        self.cubic_to(
            Point::new(c.x - rx, c.y - ky),
            Point::new(c.x - kx, c.y - ry),
            Point::new(c.x, c.y - ry),
        );
        self.cubic_to(
            Point::new(c.x + kx, c.y - ry),
            Point::new(c.x + rx, c.y - ky),
            Point::new(c.x + rx, c.y),
        );
        self.close();
    }

    pub fn translated(&self, offset: Point) -> Path {
        let elements = self
            .elements
            .iter()
            .map(|el| match *el {
                PathElement::MoveTo(p) => PathElement::MoveTo(p + offset),
                PathElement::LineTo(p) => PathElement::LineTo(p + offset),
                PathElement::CubicTo(a, b, c) => {
                    PathElement::CubicTo(a + offset, b + offset, c + offset)
                }
                PathElement::Close => PathElement::Close,
            })
            .collect();
        Path { elements }
    }

    /// Tight bounds of the drawn outline, including curve extrema.
    pub fn bounding_rect(&self) -> Rect {
        let mut bounds: Option<(Point, Point)> = None;
        let mut include = |p: Point| {
            bounds = Some(match bounds {
                None => (p, p),
                Some((lo, hi)) => (
                    Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                    Point::new(hi.x.max(p.x), hi.y.max(p.y)),
                ),
            });
        };
        let mut current = Point::default();
        for el in &self.elements {
            match *el {
                PathElement::MoveTo(p) | PathElement::LineTo(p) => {
                    include(p);
                    current = p;
                }
                PathElement::CubicTo(c1, c2, end) => {
                    include(current);
                    include(end);
                    for t in cubic_extrema(current.x, c1.x, c2.x, end.x)
                        .into_iter()
                        .chain(cubic_extrema(current.y, c1.y, c2.y, end.y))
                    {
                        include(cubic_point(current, c1, c2, end, t));
                    }
                    current = end;
                }
                PathElement::Close => {}
            }
        }
        match bounds {
            Some((lo, hi)) => Rect::from_corners(lo, hi),
            None => Rect::default(),
        }
    }

    /// Polyline approximation of every subpath, used for hit testing.
    pub fn flatten(&self, segments_per_curve: usize) -> Vec<Vec<Point>> {
        let steps = segments_per_curve.max(1);
        let mut polylines: Vec<Vec<Point>> = Vec::new();
        let mut current = Point::default();
        let mut start = Point::default();
        for el in &self.elements {
            match *el {
                PathElement::MoveTo(p) => {
                    polylines.push(vec![p]);
                    current = p;
                    start = p;
                }
                PathElement::LineTo(p) => {
                    if let Some(line) = polylines.last_mut() {
                        line.push(p);
                    }
                    current = p;
                }
                PathElement::CubicTo(c1, c2, end) => {
                    if let Some(line) = polylines.last_mut() {
                        for step in 1..=steps {
                            let t = step as f64 / steps as f64;
                            line.push(cubic_point(current, c1, c2, end, t));
                        }
                    }
                    current = end;
                }
                PathElement::Close => {
                    if let Some(line) = polylines.last_mut() {
                        line.push(start);
                    }
                    current = start;
                }
            }
        }
        polylines
    }

    /// SVG path data (`d` attribute).
    pub fn to_svg_data(&self) -> String {
        let mut d = String::new();
        for el in &self.elements {
            if !d.is_empty() {
                d.push(' ');
            }
            match el {
                PathElement::MoveTo(p) => d.push_str(&format!("M {:.2} {:.2}", p.x, p.y)),
                PathElement::LineTo(p) => d.push_str(&format!("L {:.2} {:.2}", p.x, p.y)),
                PathElement::CubicTo(a, b, c) => d.push_str(&format!(
                    "C {:.2} {:.2} {:.2} {:.2} {:.2} {:.2}",
                    a.x, a.y, b.x, b.y, c.x, c.y
                )),
                PathElement::Close => d.push('Z'),
            }
        }
        d
    }
}

fn cubic_point(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let mt = 1.0 - t;
    p0 * (mt * mt * mt) + p1 * (3.0 * mt * mt * t) + p2 * (3.0 * mt * t * t) + p3 * (t * t * t)
}

/// Parameters in (0, 1) where one coordinate of a cubic reaches an extremum.
fn cubic_extrema(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    // derivative / 3 = qa t^2 + qb t + qc
    let qa = -a + 3.0 * b - 3.0 * c + d;
    let qb = 2.0 * (a - 2.0 * b + c);
    let qc = b - a;
    let mut roots = Vec::new();
    if qa.abs() < 1e-12 {
        if qb.abs() > 1e-12 {
            roots.push(-qc / qb);
        }
    } else {
        let disc = qb * qb - 4.0 * qa * qc;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            roots.push((-qb + sq) / (2.0 * qa));
            roots.push((-qb - sq) / (2.0 * qa));
        }
    }
    roots.retain(|t| *t > 0.0 && *t < 1.0);
    roots
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounding_rect(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::default();
        };
        let (lo, hi) = self.points.iter().fold((*first, *first), |(lo, hi), p| {
            (
                Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        });
        Rect::from_corners(lo, hi)
    }

    /// Even-odd point containment.
    pub fn contains(&self, point: Point) -> bool {
        let pts = &self.points;
        if pts.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (pi, pj) = (pts[i], pts[j]);
            if (pi.y > point.y) != (pj.y > point.y)
                && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineSegment {
    pub p1: Point,
    pub p2: Point,
}

impl LineSegment {
    pub const fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn dx(&self) -> f64 {
        self.p2.x - self.p1.x
    }

    pub fn dy(&self) -> f64 {
        self.p2.y - self.p1.y
    }

    /// Perpendicular of equal length, anchored at `p1`.
    pub fn normal(&self) -> LineSegment {
        LineSegment::new(self.p1, self.p1 + Point::new(self.dy(), -self.dx()))
    }

    pub fn distance_to_point(&self, p: Point) -> f64 {
        let d = self.p2 - self.p1;
        let len_sq = d.x * d.x + d.y * d.y;
        if len_sq == 0.0 {
            return self.p1.distance_to(p);
        }
        let t = (((p.x - self.p1.x) * d.x + (p.y - self.p1.y) * d.y) / len_sq).clamp(0.0, 1.0);
        self.p1.lerp(self.p2, t).distance_to(p)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SplineError {
    #[error("spline has {count} control points; expected 3n+1")]
    MalformedPointCount { count: usize },
}

/// Flips a layout-space point into screen space. Applying it twice with the
/// same height returns the original point.
pub fn to_screen_point(point: Point, graph_height: f64) -> Point {
    Point::new(point.x, graph_height - point.y)
}

pub fn center_to_origin(center: Point, width: f64, height: f64) -> Point {
    Point::new(center.x - width / 2.0, center.y - height / 2.0)
}

const ELLIPTIC_SHAPES: &[&str] = &[
    "ellipse",
    "oval",
    "circle",
    "doublecircle",
    "point",
];

/// Node outline in node-local screen coordinates (origin = top-left of the
/// `width` x `height` footprint).
///
/// Polygonal descriptors contribute one closed ring per periphery; elliptic
/// shapes use the first two vertices as the bounding corners of the outermost
/// ellipse. Missing or unusable descriptors give an empty path.
pub fn shape_path(
    shape_name: &str,
    shape: Option<&ShapeDescriptor>,
    width: f64,
    height: f64,
) -> Path {
    let mut path = Path::new();
    let Some(shape) = shape else {
        return path;
    };
    let to_local = |v: Point| Point::new(v.x + width / 2.0, height / 2.0 - v.y);

    if ELLIPTIC_SHAPES.contains(&shape_name.to_ascii_lowercase().as_str()) {
        let rings = shape.peripheries.max(1);
        if shape.vertices.len() >= 2 * rings {
            for ring in 0..rings {
                let a = to_local(shape.vertices[2 * ring]);
                let b = to_local(shape.vertices[2 * ring + 1]);
                path.add_ellipse(Rect::from_corners(a, b));
            }
        } else if width > 0.0 && height > 0.0 {
            path.add_ellipse(Rect::new(0.0, 0.0, width, height));
        }
        return path;
    }

    let sides = shape.sides;
    if sides < 3 || shape.vertices.len() < sides {
        return path;
    }
    for ring in shape.vertices.chunks_exact(sides).take(shape.peripheries.max(1)) {
        let points: Vec<Point> = ring.iter().copied().map(to_local).collect();
        path.add_polygon(&points);
    }
    path
}

/// Converts a Bezier chain into a strokable screen-space path.
///
/// The control points are consumed as `p0` followed by groups of three, each
/// group one cubic segment continuing from the previous end point. Arrow
/// anchors are not part of the stroke.
pub fn spline_path(spline: &Bezier, graph_height: f64) -> Result<Path, SplineError> {
    let mut path = Path::new();
    let count = spline.points.len();
    if count == 0 {
        return Ok(path);
    }
    if count % 3 != 1 {
        return Err(SplineError::MalformedPointCount { count });
    }
    let pts: Vec<Point> = spline
        .points
        .iter()
        .map(|p| to_screen_point(*p, graph_height))
        .collect();
    path.move_to(pts[0]);
    for seg in pts[1..].chunks_exact(3) {
        path.cubic_to(seg[0], seg[1], seg[2]);
    }
    Ok(path)
}

/// Isosceles arrowhead with its base centred on `line.p1` and apex at `line.p2`.
pub fn arrow(line: LineSegment) -> Polygon {
    let n = line.normal();
    let o = Point::new(n.dx() / 3.0, n.dy() / 3.0);
    Polygon::new(vec![line.p1 + o, line.p2, line.p1 - o])
}

/// Largest size with the aspect ratio of `source` that fits into `target`.
pub fn fit_keep_aspect(source: Size, target: Size) -> Size {
    if source.width <= 0.0 || source.height <= 0.0 || target.width <= 0.0 || target.height <= 0.0 {
        return Size::default();
    }
    let scale = (target.width / source.width).min(target.height / source.height);
    Size::new(source.width * scale, source.height * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bezier(points: &[(f64, f64)]) -> Bezier {
        Bezier {
            points: points.iter().map(|(x, y)| Point::new(*x, *y)).collect(),
            start: None,
            end: None,
        }
    }

    #[test]
    fn y_flip_is_self_inverse() {
        for (x, y, h) in [(0.0, 0.0, 0.0), (12.5, -3.0, 100.0), (-7.25, 400.125, 33.3)] {
            let p = Point::new(x, y);
            assert_eq!(to_screen_point(to_screen_point(p, h), h), p);
        }
    }

    #[test]
    fn center_to_origin_offsets_by_half_size() {
        let origin = center_to_origin(Point::new(50.0, 40.0), 20.0, 10.0);
        assert_eq!(origin, Point::new(40.0, 35.0));
    }

    #[test]
    fn spline_path_groups_points_in_threes() {
        let spl = bezier(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0), (5.0, 5.0), (6.0, 6.0)]);
        let path = spline_path(&spl, 10.0).unwrap();
        assert_eq!(path.elements().len(), 3);
        assert_eq!(path.elements()[0], PathElement::MoveTo(Point::new(0.0, 10.0)));
        assert_eq!(
            path.elements()[2],
            PathElement::CubicTo(Point::new(4.0, 6.0), Point::new(5.0, 5.0), Point::new(6.0, 4.0))
        );
    }

    #[test]
    fn spline_path_rejects_malformed_counts() {
        for n in [2usize, 3, 5, 6] {
            let pts: Vec<(f64, f64)> = (0..n).map(|i| (i as f64, 0.0)).collect();
            assert_eq!(
                spline_path(&bezier(&pts), 0.0),
                Err(SplineError::MalformedPointCount { count: n })
            );
        }
        assert!(spline_path(&bezier(&[]), 0.0).unwrap().is_empty());
    }

    #[test]
    fn arrow_apex_is_segment_end() {
        let poly = arrow(LineSegment::new(Point::new(0.0, 0.0), Point::new(0.0, 9.0)));
        assert_eq!(poly.points().len(), 3);
        assert_eq!(poly.points()[1], Point::new(0.0, 9.0));
        // base is perpendicular to the segment and one third of its length per side
        assert!(poly.points()[0].approx_eq(Point::new(3.0, 0.0), 1e-9));
        assert!(poly.points()[2].approx_eq(Point::new(-3.0, 0.0), 1e-9));
    }

    #[test]
    fn box_shape_fills_footprint() {
        let shape = ShapeDescriptor {
            sides: 4,
            peripheries: 1,
            vertices: vec![
                Point::new(27.0, -18.0),
                Point::new(27.0, 18.0),
                Point::new(-27.0, 18.0),
                Point::new(-27.0, -18.0),
            ],
        };
        let path = shape_path("box", Some(&shape), 54.0, 36.0);
        assert_eq!(path.bounding_rect(), Rect::new(0.0, 0.0, 54.0, 36.0));
    }

    #[test]
    fn missing_shape_gives_empty_path() {
        assert!(shape_path("box", None, 54.0, 36.0).is_empty());
        let broken = ShapeDescriptor {
            sides: 4,
            peripheries: 1,
            vertices: vec![Point::new(1.0, 1.0)],
        };
        assert!(shape_path("box", Some(&broken), 54.0, 36.0).is_empty());
    }

    #[test]
    fn ellipse_bounds_match_corners() {
        let shape = ShapeDescriptor {
            sides: 1,
            peripheries: 1,
            vertices: vec![Point::new(-27.0, -18.0), Point::new(27.0, 18.0)],
        };
        let rect = shape_path("ellipse", Some(&shape), 54.0, 36.0).bounding_rect();
        assert!((rect.width - 54.0).abs() < 1e-6);
        assert!((rect.height - 36.0).abs() < 1e-6);
        assert!(rect.top_left().approx_eq(Point::default(), 1e-6));
    }

    #[test]
    fn united_ignores_null_rects() {
        let a = Rect::new(10.0, 10.0, 5.0, 5.0);
        assert_eq!(a.united(&Rect::default()), a);
        assert_eq!(Rect::default().united(&a), a);
        assert_eq!(
            a.united(&Rect::new(0.0, 12.0, 2.0, 10.0)),
            Rect::new(0.0, 10.0, 15.0, 12.0)
        );
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        let fitted = fit_keep_aspect(Size::new(200.0, 100.0), Size::new(50.0, 50.0));
        assert_eq!(fitted, Size::new(50.0, 25.0));
    }
}
