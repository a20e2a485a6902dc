use serde::Serialize;

use super::{UpdateContext, place_label};
use crate::geometry::{LineSegment, Path, Point, Polygon, Rect, arrow, spline_path, to_screen_point};
use crate::model::{Attr, AttrTarget, EdgeId, NodeId};
use crate::paint::Painter;
use crate::style::{Brush, DashPattern, FillPattern, Pen, resolve_pen};
use crate::text::TextItem;

/// Extra width around the stroke that still counts as a hit.
const HIT_SLOP: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    id: EdgeId,
    tail: NodeId,
    head: NodeId,
    #[serde(skip)]
    path: Path,
    head_arrow: Polygon,
    tail_arrow: Polygon,
    pen: Pen,
    invisible: bool,
    tooltip: String,
    label: Option<TextItem>,
    head_label: Option<TextItem>,
    tail_label: Option<TextItem>,
    selected: bool,
    #[serde(skip)]
    selection_darken: u32,
}

impl Edge {
    /// Endpoints are fixed for the lifetime of the item.
    pub fn new(id: EdgeId, tail: NodeId, head: NodeId) -> Self {
        Self {
            id,
            tail,
            head,
            path: Path::new(),
            head_arrow: Polygon::default(),
            tail_arrow: Polygon::default(),
            pen: Pen::default(),
            invisible: false,
            tooltip: String::new(),
            label: None,
            head_label: None,
            tail_label: None,
            selected: false,
            selection_darken: 120,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn tail(&self) -> NodeId {
        self.tail
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn update_layout(&mut self, ctx: &UpdateContext<'_>) {
        let view = ctx.model.view(AttrTarget::Edge(self.id));
        let style = view.style();
        self.invisible = style.is_invisible();
        self.selection_darken = ctx.selection_darken;
        self.pen = resolve_pen(
            view.text(Attr::Color),
            &style,
            view.number(Attr::PenWidth),
            ctx.palette.line,
        );
        self.tooltip = view.text(Attr::Tooltip).to_string();
        let font = ctx.font(&view);

        let h = ctx.graph_height();
        self.path = Path::new();
        self.head_arrow = Polygon::default();
        self.tail_arrow = Polygon::default();

        let Some(geometry) = ctx.layout.edges.get(&self.id) else {
            tracing::warn!(edge = ?self.id, "no layout geometry for edge");
            for slot in [&mut self.label, &mut self.head_label, &mut self.tail_label] {
                if let Some(item) = slot {
                    item.hide();
                }
            }
            return;
        };

        let last = geometry.splines.len().saturating_sub(1);
        for (idx, spline) in geometry.splines.iter().enumerate() {
            match spline_path(spline, h) {
                Ok(part) => self.path.append(&part),
                Err(err) => {
                    tracing::warn!(edge = ?self.id, %err, "skipping malformed spline");
                    continue;
                }
            }
            if idx == 0
                && let Some(tip) = spline.start
                && let Some(first) = spline.points.first()
            {
                self.tail_arrow = arrow_at(*first, tip, h);
            }
            if idx == last
                && let Some(tip) = spline.end
                && let Some(end) = spline.points.last()
            {
                self.head_arrow = arrow_at(*end, tip, h);
            }
        }

        let visible = !self.invisible;
        let main = geometry.label.as_ref().or(geometry.xlabel.as_ref());
        place_label(&mut self.label, main, &font, ctx, visible);
        place_label(&mut self.head_label, geometry.head_label.as_ref(), &font, ctx, visible);
        place_label(&mut self.tail_label, geometry.tail_label.as_ref(), &font, ctx, visible);
    }

    /// Screen-space stroke.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn head_arrow(&self) -> &Polygon {
        &self.head_arrow
    }

    pub fn tail_arrow(&self) -> &Polygon {
        &self.tail_arrow
    }

    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    pub fn label(&self) -> Option<&TextItem> {
        self.label.as_ref()
    }

    pub fn head_label(&self) -> Option<&TextItem> {
        self.head_label.as_ref()
    }

    pub fn tail_label(&self) -> Option<&TextItem> {
        self.tail_label.as_ref()
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    fn labels(&self) -> impl Iterator<Item = &TextItem> {
        [&self.label, &self.head_label, &self.tail_label]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    /// Union of stroke, arrows and shown labels.
    pub fn bounding_rect(&self) -> Rect {
        let mut rect = self
            .path
            .bounding_rect()
            .united(&self.head_arrow.bounding_rect())
            .united(&self.tail_arrow.bounding_rect());
        for label in self.labels().filter(|l| l.is_visible()) {
            rect = rect.united(&label.bounding_rect());
        }
        rect
    }

    /// Hit test against the widened stroke and the arrowheads.
    pub fn contains(&self, point: Point) -> bool {
        let reach = (self.pen.width + HIT_SLOP) / 2.0;
        let on_stroke = self.path.flatten(16).iter().any(|line| {
            line.windows(2)
                .any(|w| LineSegment::new(w[0], w[1]).distance_to_point(point) <= reach)
        });
        on_stroke || self.head_arrow.contains(point) || self.tail_arrow.contains(point)
    }

    pub fn paint(&self, painter: &mut dyn Painter) {
        if self.invisible {
            return;
        }
        painter.begin_group("edge", Some(&self.tooltip));
        let pen = if self.selected {
            Pen {
                color: self.pen.color.darker(self.selection_darken),
                dash: DashPattern::Dot,
                ..self.pen
            }
        } else {
            self.pen
        };
        painter.draw_path(&self.path, &pen, &Brush {
            color: pen.color,
            pattern: FillPattern::None,
        });
        let arrow_fill = Brush {
            color: pen.color,
            pattern: FillPattern::Solid,
        };
        let arrow_pen = Pen {
            dash: DashPattern::Solid,
            ..pen
        };
        for head in [&self.head_arrow, &self.tail_arrow] {
            if !head.is_empty() {
                painter.draw_polygon(head, &arrow_pen, &arrow_fill);
            }
        }
        for label in self.labels() {
            label.paint(painter);
        }
        painter.end_group();
    }
}

fn arrow_at(base: Point, tip: Point, graph_height: f64) -> Polygon {
    arrow(LineSegment::new(
        to_screen_point(base, graph_height),
        to_screen_point(tip, graph_height),
    ))
}
