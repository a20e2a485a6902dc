use serde::Serialize;

use super::UpdateContext;
use crate::geometry::{Path, Point, Rect, Size, to_screen_point};
use crate::model::{Attr, AttrTarget, SubgraphId};
use crate::paint::Painter;
use crate::style::{Brush, Pen, resolve_brush, resolve_pen};
use crate::text::{Font, TextItem};

#[derive(Debug, Clone, Serialize)]
pub struct Subgraph {
    id: SubgraphId,
    name: String,
    cluster: bool,
    pos: Point,
    size: Size,
    pen: Pen,
    brush: Brush,
    invisible: bool,
    tooltip: String,
    label: TextItem,
    selected: bool,
}

impl Subgraph {
    pub fn new(id: SubgraphId, name: &str, cluster: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            cluster,
            pos: Point::default(),
            size: Size::default(),
            pen: Pen::default(),
            brush: Brush::default(),
            invisible: false,
            tooltip: String::new(),
            label: TextItem::new(Font::default()),
            selected: false,
        }
    }

    pub fn id(&self) -> SubgraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cluster(&self) -> bool {
        self.cluster
    }

    pub fn update_layout(&mut self, ctx: &UpdateContext<'_>) {
        let model = ctx.model;
        if let Some(name) = model.subgraph_name(self.id) {
            self.name = name.to_string();
        }
        self.cluster = model.is_cluster(self.id);
        let view = model.view(AttrTarget::Subgraph(self.id));
        let style = view.style();
        self.invisible = style.is_invisible();
        self.pen = resolve_pen(
            view.text(Attr::Color),
            &style,
            view.number(Attr::PenWidth),
            ctx.palette.line,
        );
        let fill = match view.text(Attr::FillColor) {
            "" => view.text(Attr::Color),
            fill => fill,
        };
        self.brush = resolve_brush(fill, &style, ctx.palette.cluster_fill);
        self.tooltip = view.text(Attr::Tooltip).to_string();

        let Some(geometry) = ctx.layout.subgraphs.get(&self.id) else {
            // groupings without a box occupy no screen space
            self.size = Size::default();
            self.label.hide();
            return;
        };
        let (ll, ur) = (geometry.bb.ll, geometry.bb.ur);
        self.size = Size::new(ur.x - ll.x, ur.y - ll.y);
        self.pos = to_screen_point(Point::new(ll.x, ur.y), ctx.graph_height());

        match geometry.label.as_ref().filter(|l| !l.text.is_empty()) {
            Some(label) => {
                self.label.set_font(ctx.font(&view));
                self.label.set_text(&label.text, label.html, &ctx.metrics);
                let rect = self.rect();
                // caption hangs from the top edge instead of the box centre
                self.label.move_center(Point::new(
                    rect.center().x,
                    rect.top() + self.label.size().height / 2.0,
                ));
                self.label.set_visible(!self.invisible);
            }
            None => self.label.hide(),
        }
    }

    pub fn pos(&self) -> Point {
        self.pos
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn label(&self) -> &TextItem {
        &self.label
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

    /// The box in scene space.
    pub fn rect(&self) -> Rect {
        Rect::new(self.pos.x, self.pos.y, self.size.width, self.size.height)
    }

    pub fn bounding_rect(&self) -> Rect {
        self.rect()
    }

    pub fn contains(&self, point: Point) -> bool {
        let rect = self.rect();
        !rect.is_empty() && rect.contains_point(point)
    }

    pub fn paint(&self, painter: &mut dyn Painter) {
        let rect = self.rect();
        if self.invisible || rect.is_empty() {
            return;
        }
        painter.begin_group("cluster", Some(&self.tooltip));
        let mut outline = Path::new();
        outline.add_polygon(&[
            rect.top_left(),
            Point::new(rect.right(), rect.top()),
            Point::new(rect.right(), rect.bottom()),
            Point::new(rect.left(), rect.bottom()),
        ]);
        painter.draw_path(&outline, &self.pen, &self.brush);
        self.label.paint(painter);
        painter.end_group();
    }
}
