//! Default layout engine: ranks and orders nodes with `dagre_rust`, then
//! derives node outlines, straight Bezier edges, cluster boxes and label
//! positions around the result.
//!
//! Work happens in dagre's frame (origin top-left, y down); the finished
//! layout is flipped into layout space (origin bottom-left, y up).

use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use std::collections::{HashMap, HashSet};
use std::f64::consts::{PI, SQRT_2};

use super::{
    Bezier, BoundingBox, EdgeGeometry, GraphLayout, LayoutEngine, LayoutError, NodeGeometry,
    ShapeDescriptor, SubgraphGeometry, TextLabel,
};
use crate::config::{Config, LayoutConfig};
use crate::geometry::{Point, Rect, Size};
use crate::model::{Attr, AttrTarget, AttrView, EdgeId, GraphModel, NodeId, SubgraphId};
use crate::text::{EscapeContext, Font, TextMetrics, expand_escapes, label_lines};
use crate::theme::Theme;

const PERIPHERY_GAP: f64 = 4.0;
const MIN_NODE_INCHES: f64 = 0.01;
const POINT_NODE_INCHES: f64 = 0.05;

pub struct DagreEngine {
    config: LayoutConfig,
    base_font: Font,
    last: Option<GraphLayout>,
}

impl DagreEngine {
    pub fn new(config: &Config) -> Self {
        Self::with_layout_config(config.layout.clone(), &config.theme)
    }

    pub fn with_layout_config(config: LayoutConfig, theme: &Theme) -> Self {
        let base_font = Font {
            family: theme.font_family.clone(),
            size: theme.font_size,
            color: crate::style::resolve_color(&theme.text_color, crate::style::Color::BLACK),
        };
        Self {
            config,
            base_font,
            last: None,
        }
    }

    /// Result of the last successful run, until [`LayoutEngine::free_layout`].
    pub fn last_layout(&self) -> Option<&GraphLayout> {
        self.last.as_ref()
    }
}

impl Default for DagreEngine {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl LayoutEngine for DagreEngine {
    fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError> {
        let layout = LayoutRun::new(&self.config, &self.base_font, model).run()?;
        tracing::debug!(
            nodes = layout.nodes.len(),
            edges = layout.edges.len(),
            clusters = layout.subgraphs.len(),
            "dagre layout finished"
        );
        self.last = Some(layout.clone());
        Ok(layout)
    }

    fn free_layout(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ShapeKind {
    Polygon { sides: usize },
    Diamond,
    Ellipse,
    Circle,
    Point,
    Plain,
}

impl ShapeKind {
    fn from_name(name: &str, sides: Option<f64>) -> Self {
        match name {
            "" | "ellipse" | "oval" => ShapeKind::Ellipse,
            "circle" | "doublecircle" => ShapeKind::Circle,
            "point" => ShapeKind::Point,
            "box" | "rect" | "rectangle" | "square" => ShapeKind::Polygon { sides: 4 },
            "diamond" => ShapeKind::Diamond,
            "triangle" => ShapeKind::Polygon { sides: 3 },
            "pentagon" => ShapeKind::Polygon { sides: 5 },
            "hexagon" => ShapeKind::Polygon { sides: 6 },
            "septagon" => ShapeKind::Polygon { sides: 7 },
            "octagon" | "doubleoctagon" | "tripleoctagon" => ShapeKind::Polygon { sides: 8 },
            "polygon" => ShapeKind::Polygon {
                sides: sides
                    .filter(|s| s.is_finite() && *s >= 3.0)
                    .map(|s| s as usize)
                    .unwrap_or(4),
            },
            "none" | "plaintext" | "plain" => ShapeKind::Plain,
            other => {
                tracing::warn!(shape = other, "unsupported node shape, using box");
                ShapeKind::Polygon { sides: 4 }
            }
        }
    }

    fn default_peripheries(name: &str) -> usize {
        match name {
            "doublecircle" | "doubleoctagon" => 2,
            "tripleoctagon" => 3,
            "none" | "plaintext" | "plain" => 0,
            _ => 1,
        }
    }

    fn is_elliptic(self) -> bool {
        matches!(self, ShapeKind::Ellipse | ShapeKind::Circle | ShapeKind::Point)
    }

    fn is_regular(self, name: &str) -> bool {
        matches!(self, ShapeKind::Circle | ShapeKind::Point) || name == "square"
    }
}

struct MeasuredLabel {
    text: String,
    html: bool,
    size: Size,
}

struct SizedNode {
    id: NodeId,
    width: f64,
    height: f64,
    kind: ShapeKind,
    peripheries: usize,
    label: Option<MeasuredLabel>,
    xlabel: Option<MeasuredLabel>,
}

impl SizedNode {
    /// Point where a ray from the centre in direction `dir` leaves the outline.
    fn boundary(&self, center: Point, dir: Point) -> Point {
        let a = self.width / 2.0;
        let b = self.height / 2.0;
        if a <= 0.0 || b <= 0.0 {
            return center;
        }
        let (dx, dy) = (dir.x.abs(), dir.y.abs());
        let t = match self.kind {
            k if k.is_elliptic() => 1.0 / ((dx / a).powi(2) + (dy / b).powi(2)).sqrt(),
            ShapeKind::Diamond => 1.0 / (dx / a + dy / b),
            _ => {
                let tx = if dx > 0.0 { a / dx } else { f64::INFINITY };
                let ty = if dy > 0.0 { b / dy } else { f64::INFINITY };
                tx.min(ty)
            }
        };
        if t.is_finite() { center + dir * t } else { center }
    }

    fn rect(&self, center: Point) -> Rect {
        Rect::from_center(center, Size::new(self.width, self.height))
    }

    fn descriptor(&self) -> ShapeDescriptor {
        let rings = self.peripheries;
        let mut vertices = Vec::new();
        let sides = match self.kind {
            ShapeKind::Plain => {
                return ShapeDescriptor {
                    sides: 4,
                    peripheries: 0,
                    vertices,
                };
            }
            ShapeKind::Ellipse | ShapeKind::Circle | ShapeKind::Point => {
                for ring in 0..rings.max(1) {
                    let inset = (rings.max(1) - 1 - ring) as f64 * PERIPHERY_GAP;
                    let rx = (self.width / 2.0 - inset).max(0.0);
                    let ry = (self.height / 2.0 - inset).max(0.0);
                    vertices.push(Point::new(-rx, -ry));
                    vertices.push(Point::new(rx, ry));
                }
                2
            }
            ShapeKind::Diamond => {
                for ring in 0..rings.max(1) {
                    let inset = (rings.max(1) - 1 - ring) as f64 * PERIPHERY_GAP;
                    let a = (self.width / 2.0 - inset).max(0.0);
                    let b = (self.height / 2.0 - inset).max(0.0);
                    vertices.extend([
                        Point::new(a, 0.0),
                        Point::new(0.0, b),
                        Point::new(-a, 0.0),
                        Point::new(0.0, -b),
                    ]);
                }
                4
            }
            ShapeKind::Polygon { sides } => {
                let unit = regular_polygon(sides);
                let (min, max) = extent(&unit);
                let mid = (min + max) * 0.5;
                let span = max - min;
                for ring in 0..rings.max(1) {
                    let inset = (rings.max(1) - 1 - ring) as f64 * PERIPHERY_GAP;
                    let w = (self.width - 2.0 * inset).max(0.0);
                    let h = (self.height - 2.0 * inset).max(0.0);
                    vertices.extend(unit.iter().map(|p| {
                        Point::new((p.x - mid.x) / span.x * w, (p.y - mid.y) / span.y * h)
                    }));
                }
                sides
            }
        };
        ShapeDescriptor {
            sides,
            peripheries: rings.max(1),
            vertices,
        }
    }
}

/// Unit polygon with a flat bottom edge, y up.
fn regular_polygon(sides: usize) -> Vec<Point> {
    let step = 2.0 * PI / sides as f64;
    let start = -PI / 2.0 - step / 2.0;
    (0..sides)
        .map(|k| {
            let angle = start + k as f64 * step;
            Point::new(angle.cos(), angle.sin())
        })
        .collect()
}

fn extent(points: &[Point]) -> (Point, Point) {
    points.iter().fold(
        (
            Point::new(f64::INFINITY, f64::INFINITY),
            Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        ),
        |(min, max), p| {
            (
                Point::new(min.x.min(p.x), min.y.min(p.y)),
                Point::new(max.x.max(p.x), max.y.max(p.y)),
            )
        },
    )
}

fn normalized(p: Point) -> Point {
    let len = p.length();
    if len > f64::EPSILON { p * (1.0 / len) } else { Point::new(0.0, 1.0) }
}

fn dimension(view: &AttrView<'_>, attr: Attr, default: f64, node: &str) -> Result<f64, LayoutError> {
    let raw = view.text(attr).trim();
    if raw.is_empty() {
        return Ok(default);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value.max(MIN_NODE_INCHES)),
        _ => Err(LayoutError::Engine {
            code: 1,
            message: format!("node `{node}`: invalid {} `{raw}`", attr.name()),
        }),
    }
}

fn separation(view: &AttrView<'_>, attr: Attr, default: f64, dpi: f64) -> f64 {
    view.number(attr)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|inches| inches * dpi)
        .unwrap_or(default)
}

/// Extents of everything placed, in dagre's frame.
#[derive(Debug, Clone, Copy)]
struct Extents {
    min: Point,
    max: Point,
}

impl Extents {
    fn new() -> Self {
        Self {
            min: Point::new(f64::INFINITY, f64::INFINITY),
            max: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    fn add_point(&mut self, p: Point) {
        self.min = Point::new(self.min.x.min(p.x), self.min.y.min(p.y));
        self.max = Point::new(self.max.x.max(p.x), self.max.y.max(p.y));
    }

    fn add_rect(&mut self, r: &Rect) {
        self.add_point(r.top_left());
        self.add_point(Point::new(r.right(), r.bottom()));
    }
}

/// Label placed in dagre's frame, converted at the end.
struct PendingLabel {
    text: String,
    html: bool,
    center: Point,
    size: Size,
}

impl PendingLabel {
    fn at(label: &MeasuredLabel, center: Point) -> Self {
        Self {
            text: label.text.clone(),
            html: label.html,
            center,
            size: label.size,
        }
    }

    fn rect(&self) -> Rect {
        Rect::from_center(self.center, self.size)
    }
}

#[derive(Default)]
struct PendingEdge {
    splines: Vec<Bezier>,
    label: Option<PendingLabel>,
    xlabel: Option<PendingLabel>,
    head_label: Option<PendingLabel>,
    tail_label: Option<PendingLabel>,
}

struct LayoutRun<'a> {
    config: &'a LayoutConfig,
    base_font: &'a Font,
    metrics: TextMetrics,
    model: &'a GraphModel,
    dpi: f64,
}

impl<'a> LayoutRun<'a> {
    fn new(config: &'a LayoutConfig, base_font: &'a Font, model: &'a GraphModel) -> Self {
        let dpi = if config.dpi > 0.0 { config.dpi } else { 72.0 };
        Self {
            config,
            base_font,
            metrics: config.text_metrics(),
            model,
            dpi,
        }
    }

    fn font(&self, view: &AttrView<'_>, base: &Font) -> Font {
        Font::from_attrs(
            base,
            view.text(Attr::FontName),
            view.number(Attr::FontSize),
            view.text(Attr::FontColor),
        )
    }

    fn measure(&self, view: &AttrView<'_>, attr: Attr, font: &Font, ctx: &EscapeContext<'_>) -> Option<MeasuredLabel> {
        let value = view.value(attr)?;
        let (text, html) = if value.is_html() {
            (value.as_str().to_string(), true)
        } else {
            (expand_escapes(value.as_str(), ctx), false)
        };
        if text.is_empty() {
            return None;
        }
        let size = self.metrics.measure(&label_lines(&text, html), font);
        Some(MeasuredLabel { text, html, size })
    }

    fn run(&self) -> Result<GraphLayout, LayoutError> {
        let model = self.model;
        let graph_view = model.view(AttrTarget::Graph);
        let graph_font = self.font(&graph_view, self.base_font);
        let graph_ctx = EscapeContext {
            graph: model.name(),
            ..EscapeContext::default()
        };

        let mut sized: Vec<SizedNode> = Vec::with_capacity(model.node_count());
        for id in model.nodes() {
            sized.push(self.size_node(id, &graph_font)?);
        }
        let graph_label = self.measure(&graph_view, Attr::Label, &graph_font, &graph_ctx);

        let mut layout = GraphLayout::default();
        if sized.is_empty() {
            if let Some(label) = graph_label {
                let m = self.config.margin;
                let (w, h) = (label.size.width + 2.0 * m, label.size.height + 2.0 * m);
                layout.bb = BoundingBox::new(Point::default(), Point::new(w, h));
                layout.label = Some(TextLabel {
                    text: label.text,
                    html: label.html,
                    pos: Point::new(w / 2.0, h / 2.0),
                    size: label.size,
                });
            }
            return Ok(layout);
        }

        let centers = self.place_nodes(&sized, &graph_view);
        let index: HashMap<NodeId, &SizedNode> = sized.iter().map(|n| (n.id, n)).collect();
        let center_of = |id: NodeId| centers.get(&id).copied().unwrap_or_default();

        let mut extents = Extents::new();
        for node in &sized {
            let center = center_of(node.id);
            extents.add_rect(&node.rect(center));
        }

        let mut node_xlabels: HashMap<NodeId, PendingLabel> = HashMap::new();
        for node in &sized {
            if let Some(xlabel) = &node.xlabel {
                let corner = node.rect(center_of(node.id)).top_left();
                let center = Point::new(
                    corner.x - xlabel.size.width / 2.0,
                    corner.y - xlabel.size.height / 2.0,
                );
                let pending = PendingLabel::at(xlabel, center);
                extents.add_rect(&pending.rect());
                node_xlabels.insert(node.id, pending);
            }
        }

        let edges = self.route_edges(&index, &center_of, &graph_font);
        for edge in edges.values() {
            for spline in &edge.splines {
                spline.points.iter().for_each(|p| extents.add_point(*p));
                spline.start.iter().chain(spline.end.iter()).for_each(|p| extents.add_point(*p));
            }
            for label in [&edge.label, &edge.xlabel, &edge.head_label, &edge.tail_label]
                .into_iter()
                .flatten()
            {
                extents.add_rect(&label.rect());
            }
        }

        let clusters = self.cluster_boxes(&index, &center_of, &graph_font);
        for (rect, _) in clusters.values() {
            extents.add_rect(rect);
        }

        // Frame: shift so the extents start at the margin, then flip.
        let m = self.config.margin;
        let mut shift = Point::new(m - extents.min.x, m - extents.min.y);
        let mut width = extents.max.x - extents.min.x + 2.0 * m;
        let mut height = extents.max.y - extents.min.y + 2.0 * m;
        let mut graph_label_center = None;
        if let Some(label) = &graph_label {
            width = width.max(label.size.width + 2.0 * m);
            let top = graph_view.text(Attr::LabelLoc).trim().eq_ignore_ascii_case("t");
            if top {
                shift.y += label.size.height;
                graph_label_center = Some(Point::new(width / 2.0, m + label.size.height / 2.0));
            } else {
                graph_label_center = Some(Point::new(
                    width / 2.0,
                    height + label.size.height / 2.0 - m,
                ));
            }
            height += label.size.height;
        }
        // centre horizontally when the label widened the frame
        shift.x += (width - (extents.max.x - extents.min.x + 2.0 * m)) / 2.0;

        let to_layout = |p: Point| Point::new(p.x + shift.x, height - (p.y + shift.y));
        let finish = |label: &PendingLabel| TextLabel {
            text: label.text.clone(),
            html: label.html,
            pos: to_layout(label.center),
            size: label.size,
        };

        layout.bb = BoundingBox::new(Point::default(), Point::new(width, height));
        if let (Some(label), Some(center)) = (graph_label, graph_label_center) {
            layout.label = Some(TextLabel {
                text: label.text,
                html: label.html,
                pos: Point::new(center.x, height - center.y),
                size: label.size,
            });
        }

        for node in &sized {
            let center = to_layout(center_of(node.id));
            layout.nodes.insert(
                node.id,
                NodeGeometry {
                    center,
                    width: node.width / self.dpi,
                    height: node.height / self.dpi,
                    shape: Some(node.descriptor()),
                    label: node.label.as_ref().map(|l| TextLabel {
                        text: l.text.clone(),
                        html: l.html,
                        pos: center,
                        size: l.size,
                    }),
                    xlabel: node_xlabels.get(&node.id).map(finish),
                },
            );
        }

        for (id, edge) in &edges {
            let splines = edge
                .splines
                .iter()
                .map(|b| Bezier {
                    points: b.points.iter().map(|p| to_layout(*p)).collect(),
                    start: b.start.map(to_layout),
                    end: b.end.map(to_layout),
                })
                .collect();
            layout.edges.insert(
                *id,
                EdgeGeometry {
                    splines,
                    label: edge.label.as_ref().map(finish),
                    xlabel: edge.xlabel.as_ref().map(finish),
                    head_label: edge.head_label.as_ref().map(finish),
                    tail_label: edge.tail_label.as_ref().map(finish),
                },
            );
        }

        for (id, (rect, label)) in &clusters {
            layout.subgraphs.insert(
                *id,
                SubgraphGeometry {
                    bb: BoundingBox::new(
                        to_layout(Point::new(rect.left(), rect.bottom())),
                        to_layout(Point::new(rect.right(), rect.top())),
                    ),
                    label: label.as_ref().map(finish),
                },
            );
        }

        Ok(layout)
    }

    fn size_node(&self, id: NodeId, graph_font: &Font) -> Result<SizedNode, LayoutError> {
        let model = self.model;
        let view = model.view(AttrTarget::Node(id));
        let name = model.node_name(id).unwrap_or_default();
        let width_in = dimension(&view, Attr::Width, self.config.default_node_width, name)?;
        let height_in = dimension(&view, Attr::Height, self.config.default_node_height, name)?;
        let shape_name = view.text(Attr::Shape).trim().to_ascii_lowercase();
        let kind = ShapeKind::from_name(&shape_name, view.number(Attr::Sides));
        let peripheries = view
            .number(Attr::Peripheries)
            .filter(|p| p.is_finite() && *p >= 0.0)
            .map(|p| p as usize)
            .unwrap_or_else(|| ShapeKind::default_peripheries(&shape_name));

        let font = self.font(&view, graph_font);
        let ctx = EscapeContext {
            graph: model.name(),
            node: name,
            ..EscapeContext::default()
        };
        let label = if kind == ShapeKind::Point {
            None
        } else {
            match view.value(Attr::Label) {
                Some(value) if !value.is_empty() => self.measure(&view, Attr::Label, &font, &ctx),
                _ => Some(MeasuredLabel {
                    text: name.to_string(),
                    html: false,
                    size: self.metrics.measure(&[name.to_string()], &font),
                }),
            }
        };
        let xlabel = self.measure(&view, Attr::XLabel, &font, &ctx);

        let (mut width, mut height) = if kind == ShapeKind::Point {
            let side = if view.text(Attr::Width).trim().is_empty() {
                POINT_NODE_INCHES
            } else {
                width_in
            };
            (side * self.dpi, side * self.dpi)
        } else {
            (width_in * self.dpi, height_in * self.dpi)
        };
        if !view.flag(Attr::FixedSize)
            && let Some(label) = &label
        {
            let mut need_w = label.size.width + 2.0 * self.config.label_margin_x;
            let mut need_h = label.size.height + 2.0 * self.config.label_margin_y;
            if kind.is_elliptic() {
                need_w *= SQRT_2;
                need_h *= SQRT_2;
            }
            width = width.max(need_w);
            height = height.max(need_h);
        }
        if kind.is_regular(&shape_name) {
            let side = width.max(height);
            width = side;
            height = side;
        }
        if peripheries > 1 {
            let grow = 2.0 * PERIPHERY_GAP * (peripheries - 1) as f64;
            width += grow;
            height += grow;
        }

        Ok(SizedNode {
            id,
            width,
            height,
            kind,
            peripheries,
            label,
            xlabel,
        })
    }

    fn place_nodes(&self, sized: &[SizedNode], graph_view: &AttrView<'_>) -> HashMap<NodeId, Point> {
        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(false),
            }));

        let rankdir = match graph_view.text(Attr::RankDir).trim().to_ascii_uppercase().as_str() {
            "LR" => "lr",
            "RL" => "rl",
            "BT" => "bt",
            _ => "tb",
        };
        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some(rankdir.to_string());
        graph_config.nodesep =
            Some(separation(graph_view, Attr::NodeSep, self.config.node_sep, self.dpi) as f32);
        graph_config.ranksep =
            Some(separation(graph_view, Attr::RankSep, self.config.rank_sep, self.dpi) as f32);
        graph_config.marginx = Some(self.config.margin as f32);
        graph_config.marginy = Some(self.config.margin as f32);
        dagre_graph.set_graph(graph_config);

        let key = |id: NodeId| format!("n{}", id.index());
        for node in sized {
            let mut dagre_node = DagreNode::default();
            dagre_node.width = node.width as f32;
            dagre_node.height = node.height as f32;
            dagre_graph.set_node(key(node.id), Some(dagre_node));
        }

        let mut edge_set: HashSet<(NodeId, NodeId)> = HashSet::new();
        for edge in self.model.edges() {
            let Some((tail, head)) = self.model.edge_endpoints(edge) else {
                continue;
            };
            if tail == head || !edge_set.insert((tail, head)) {
                continue;
            }
            let _ = dagre_graph.set_edge(&key(tail), &key(head), Some(DagreEdge::default()), None);
        }

        dagre_layout::run_layout(&mut dagre_graph);

        sized
            .iter()
            .map(|node| {
                let center = dagre_graph
                    .node(&key(node.id))
                    .map(|n| Point::new(f64::from(n.x), f64::from(n.y)))
                    .unwrap_or_default();
                (node.id, center)
            })
            .collect()
    }

    fn route_edges(
        &self,
        nodes: &HashMap<NodeId, &SizedNode>,
        center_of: &dyn Fn(NodeId) -> Point,
        graph_font: &Font,
    ) -> HashMap<EdgeId, PendingEdge> {
        let model = self.model;
        let mut groups: HashMap<(NodeId, NodeId), Vec<EdgeId>> = HashMap::new();
        let mut order: Vec<(NodeId, NodeId)> = Vec::new();
        for edge in model.edges() {
            let Some((tail, head)) = model.edge_endpoints(edge) else {
                continue;
            };
            let key = (tail.min(head), tail.max(head));
            let group = groups.entry(key).or_default();
            if group.is_empty() {
                order.push(key);
            }
            group.push(edge);
        }

        let mut out = HashMap::new();
        for key in order {
            let Some(group) = groups.get(&key) else {
                continue;
            };
            for (slot, edge) in group.iter().enumerate() {
                let Some((tail, head)) = model.edge_endpoints(*edge) else {
                    continue;
                };
                let (Some(tail_node), Some(head_node)) = (nodes.get(&tail), nodes.get(&head)) else {
                    continue;
                };
                let view = model.view(AttrTarget::Edge(*edge));
                let (head_arrow, tail_arrow) = self.arrow_flags(&view);
                let font = self.font(&view, graph_font);
                let ctx = EscapeContext {
                    graph: model.name(),
                    node: "",
                    tail: model.node_name(tail).unwrap_or_default(),
                    head: model.node_name(head).unwrap_or_default(),
                };
                let pending = if tail == head {
                    self.self_loop(tail_node, center_of(tail), slot, head_arrow, tail_arrow, &view, &font, &ctx)
                } else {
                    let offset = slot as f64 - (group.len() - 1) as f64 / 2.0;
                    self.straight_edge(
                        (tail_node, center_of(tail)),
                        (head_node, center_of(head)),
                        tail > head,
                        offset * self.config.parallel_edge_gap,
                        head_arrow,
                        tail_arrow,
                        &view,
                        &font,
                        &ctx,
                    )
                };
                out.insert(*edge, pending);
            }
        }
        out
    }

    fn arrow_flags(&self, view: &AttrView<'_>) -> (bool, bool) {
        let dir = view.text(Attr::Dir).trim().to_ascii_lowercase();
        let dir = if dir.is_empty() {
            if self.model.is_directed() { "forward".to_string() } else { "none".to_string() }
        } else {
            dir
        };
        let (mut head, mut tail) = match dir.as_str() {
            "both" => (true, true),
            "back" => (false, true),
            "none" => (false, false),
            _ => (true, false),
        };
        if view.text(Attr::ArrowHead).trim().eq_ignore_ascii_case("none") {
            head = false;
        }
        if view.text(Attr::ArrowTail).trim().eq_ignore_ascii_case("none") {
            tail = false;
        }
        (head, tail)
    }

    #[allow(clippy::too_many_arguments)]
    fn straight_edge(
        &self,
        (tail, tail_center): (&SizedNode, Point),
        (head, head_center): (&SizedNode, Point),
        reversed: bool,
        offset: f64,
        head_arrow: bool,
        tail_arrow: bool,
        view: &AttrView<'_>,
        font: &Font,
        ctx: &EscapeContext<'_>,
    ) -> PendingEdge {
        let dir = normalized(head_center - tail_center);
        // parallel edges keep their side regardless of direction
        let side = if reversed { -1.0 } else { 1.0 };
        let normal = Point::new(-dir.y, dir.x) * side;
        let start = tail.boundary(tail_center, dir) + normal * offset;
        let end = head.boundary(head_center, -dir) + normal * offset;

        let arrow = self.config.arrow_length;
        let mut bezier = Bezier::default();
        let mut p0 = start;
        let mut p3 = end;
        if tail_arrow {
            bezier.start = Some(start);
            p0 = start + dir * arrow;
        }
        if head_arrow {
            bezier.end = Some(end);
            p3 = end - dir * arrow;
        }
        bezier.points = vec![p0, p0.lerp(p3, 1.0 / 3.0), p0.lerp(p3, 2.0 / 3.0), p3];

        let beside = |label: &MeasuredLabel, anchor: Point, sign: f64| {
            let reach = (normal.x.abs() * label.size.width + normal.y.abs() * label.size.height) / 2.0 + 2.0;
            PendingLabel::at(label, anchor + normal * (reach * sign))
        };
        let mid = p0.lerp(p3, 0.5);
        let along = |label: &MeasuredLabel| (dir.x.abs() * label.size.width + dir.y.abs() * label.size.height) / 2.0 + 4.0;
        PendingEdge {
            splines: vec![bezier],
            label: self
                .measure(view, Attr::Label, font, ctx)
                .map(|l| beside(&l, mid, 1.0)),
            xlabel: self
                .measure(view, Attr::XLabel, font, ctx)
                .map(|l| beside(&l, mid, -1.0)),
            head_label: self
                .measure(view, Attr::HeadLabel, font, ctx)
                .map(|l| beside(&l, end - dir * along(&l), 1.0)),
            tail_label: self
                .measure(view, Attr::TailLabel, font, ctx)
                .map(|l| beside(&l, start + dir * along(&l), 1.0)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn self_loop(
        &self,
        node: &SizedNode,
        center: Point,
        slot: usize,
        head_arrow: bool,
        tail_arrow: bool,
        view: &AttrView<'_>,
        font: &Font,
        ctx: &EscapeContext<'_>,
    ) -> PendingEdge {
        let reach = self.config.self_loop_size * (slot + 1) as f64;
        let start = node.boundary(center, normalized(Point::new(1.0, -0.6)));
        let end = node.boundary(center, normalized(Point::new(1.0, 0.6)));
        let c1 = start + Point::new(reach, -reach * 0.6);
        let c2 = end + Point::new(reach, reach * 0.6);

        let arrow = self.config.arrow_length;
        let mut bezier = Bezier::default();
        let mut p0 = start;
        let mut p3 = end;
        if tail_arrow {
            bezier.start = Some(start);
            p0 = start + normalized(c1 - start) * arrow;
        }
        if head_arrow {
            bezier.end = Some(end);
            p3 = end + normalized(c2 - end) * arrow;
        }
        bezier.points = vec![p0, c1, c2, p3];

        let outer_x = center.x + node.width / 2.0 + reach * 0.75;
        let right_of = |label: &MeasuredLabel, y: f64| {
            PendingLabel::at(label, Point::new(outer_x + label.size.width / 2.0 + 2.0, y))
        };
        PendingEdge {
            splines: vec![bezier],
            label: self
                .measure(view, Attr::Label, font, ctx)
                .map(|l| right_of(&l, center.y)),
            xlabel: self
                .measure(view, Attr::XLabel, font, ctx)
                .map(|l| right_of(&l, center.y - node.height / 2.0 - l.size.height / 2.0)),
            head_label: self
                .measure(view, Attr::HeadLabel, font, ctx)
                .map(|l| right_of(&l, end.y + l.size.height / 2.0)),
            tail_label: self
                .measure(view, Attr::TailLabel, font, ctx)
                .map(|l| right_of(&l, start.y - l.size.height / 2.0)),
        }
    }

    /// Cluster boxes in dagre's frame. Nested clusters are boxed first so the
    /// parent encloses them; label space is reserved at the top.
    fn cluster_boxes(
        &self,
        nodes: &HashMap<NodeId, &SizedNode>,
        center_of: &dyn Fn(NodeId) -> Point,
        graph_font: &Font,
    ) -> HashMap<SubgraphId, (Rect, Option<PendingLabel>)> {
        let model = self.model;
        let pad = self.config.cluster_padding;
        let mut boxes: HashMap<SubgraphId, (Rect, Option<PendingLabel>)> = HashMap::new();
        let all = model.all_subgraphs();
        for sub in all.iter().rev().copied() {
            if !model.is_cluster(sub) {
                continue;
            }
            let mut rect = Rect::default();
            for node in model.subgraph_nodes(sub) {
                if let Some(sized) = nodes.get(node) {
                    rect = rect.united(&sized.rect(center_of(*node)));
                }
            }
            for (other, (child, _)) in &boxes {
                if is_descendant(model, *other, sub) {
                    rect = rect.united(child);
                }
            }
            if rect.is_null() {
                tracing::debug!(subgraph = model.subgraph_name(sub).unwrap_or_default(), "empty cluster has no box");
                continue;
            }
            rect = rect.adjusted(-pad, -pad, pad, pad);

            let view = model.view(AttrTarget::Subgraph(sub));
            let font = self.font(&view, graph_font);
            let ctx = EscapeContext {
                graph: model.subgraph_name(sub).unwrap_or_default(),
                ..EscapeContext::default()
            };
            let label = self.measure(&view, Attr::Label, &font, &ctx).map(|label| {
                rect = rect.adjusted(0.0, -(label.size.height + pad / 2.0), 0.0, 0.0);
                let need = label.size.width + 2.0 * pad;
                if rect.width < need {
                    let grow = (need - rect.width) / 2.0;
                    rect = rect.adjusted(-grow, 0.0, grow, 0.0);
                }
                let center = Point::new(
                    rect.center().x,
                    rect.top() + pad / 2.0 + label.size.height / 2.0,
                );
                PendingLabel::at(&label, center)
            });
            boxes.insert(sub, (rect, label));
        }
        boxes
    }
}

fn is_descendant(model: &GraphModel, candidate: SubgraphId, ancestor: SubgraphId) -> bool {
    let mut current = model.subgraph_parent(candidate);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = model.subgraph_parent(id);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttrValue;

    fn engine() -> DagreEngine {
        let mut config = Config::default();
        config.layout.fast_text_metrics = true;
        DagreEngine::new(&config)
    }

    #[test]
    fn empty_graph_has_empty_bounds() {
        let layout = engine().layout(&GraphModel::digraph("g")).unwrap();
        assert!(layout.bb.is_empty());
        assert!(layout.nodes.is_empty());
        assert_eq!(layout.height(), 0.0);
    }

    #[test]
    fn chain_is_ranked_top_to_bottom() {
        let g = GraphModel::from_dot("digraph { a -> b -> c }").unwrap();
        let layout = engine().layout(&g).unwrap();
        let y = |name: &str| layout.nodes[&g.node_id(name).unwrap()].center.y;
        // layout space: y grows upwards, first rank on top
        assert!(y("a") > y("b"));
        assert!(y("b") > y("c"));
        for node in layout.nodes.values() {
            assert!(node.center.y > 0.0 && node.center.y < layout.height());
        }
    }

    #[test]
    fn directed_edges_get_head_arrow_only() {
        let g = GraphModel::from_dot("digraph { a -> b; c -> d [dir=both]; e -> f [dir=none] }").unwrap();
        let layout = engine().layout(&g).unwrap();
        let flags = |tail: &str| {
            let edge = g.out_edges(g.node_id(tail).unwrap()).next().unwrap();
            let spline = &layout.edges[&edge].splines[0];
            assert_eq!(spline.points.len() % 3, 1);
            (spline.has_start_arrow(), spline.has_end_arrow())
        };
        assert_eq!(flags("a"), (false, true));
        assert_eq!(flags("c"), (true, true));
        assert_eq!(flags("e"), (false, false));
    }

    #[test]
    fn nested_clusters_enclose_members() {
        let g = GraphModel::from_dot(
            "digraph { subgraph cluster_o { label=Outer; subgraph cluster_i { a } b } c }",
        )
        .unwrap();
        let layout = engine().layout(&g).unwrap();
        let outer = layout.subgraphs[&g.subgraph_id("cluster_o").unwrap()].bb;
        let inner = layout.subgraphs[&g.subgraph_id("cluster_i").unwrap()].bb;
        assert!(outer.ll.x < inner.ll.x && outer.ur.y > inner.ur.y);
        let a = &layout.nodes[&g.node_id("a").unwrap()];
        assert!(inner.ll.x < a.center.x && a.center.x < inner.ur.x);
        assert!(layout.subgraphs[&g.subgraph_id("cluster_o").unwrap()].label.is_some());
    }

    #[test]
    fn invalid_size_is_an_engine_error() {
        let mut g = GraphModel::digraph("g");
        let a = g.add_node(Some("a")).unwrap();
        g.set_attr(AttrTarget::Node(a), "width", AttrValue::text("-2")).unwrap();
        let err = engine().layout(&g).unwrap_err();
        assert!(matches!(err, LayoutError::Engine { code: 1, .. }));
    }

    #[test]
    fn label_grows_node_unless_fixed() {
        let g = GraphModel::from_dot(
            "digraph { a [shape=box, label=\"a rather long label\"]; b [shape=box, fixedsize=true, label=\"a rather long label\"] }",
        )
        .unwrap();
        let layout = engine().layout(&g).unwrap();
        assert!(layout.nodes[&g.node_id("a").unwrap()].width > 0.75);
        assert_eq!(layout.nodes[&g.node_id("b").unwrap()].width, 0.75);
        let shape = layout.nodes[&g.node_id("a").unwrap()].shape.clone().unwrap();
        assert_eq!(shape.sides, 4);
        assert_eq!(shape.vertices.len(), 4);
    }

    #[test]
    fn free_layout_drops_cached_result() {
        let mut engine = engine();
        let g = GraphModel::from_dot("digraph { a }").unwrap();
        engine.layout(&g).unwrap();
        assert!(engine.last_layout().is_some());
        engine.free_layout();
        assert!(engine.last_layout().is_none());
    }
}
