use base64::Engine as _;
use serde::Serialize;
use thiserror::Error;

use super::{UpdateContext, place_label};
use crate::geometry::{
    Path, Point, Polygon, Rect, Size, center_to_origin, fit_keep_aspect, shape_path,
    to_screen_point,
};
use crate::model::{Attr, AttrTarget, GraphModel, NodeId};
use crate::paint::Painter;
use crate::style::{Brush, Pen, resolve_brush, resolve_pen};
use crate::text::{EscapeContext, Font, TextItem, expand_escapes, label_lines};

/// Inset of the label area from the node footprint.
const LABEL_MARGIN: f64 = 2.0;
const DEFAULT_SHAPE: &str = "ellipse";
const NAME_PLACEHOLDER: &str = "\\N";
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Error, PartialEq)]
pub enum IconError {
    #[error("data is not a PNG image")]
    NotPng,
    #[error("PNG decode failed: {0}")]
    Decode(String),
    #[error("image has zero size")]
    Empty,
}

/// A raster image shown inside a node. Kept as encoded PNG; painters scale it.
#[derive(Debug, Clone, PartialEq)]
pub struct Icon {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl Icon {
    pub fn from_png(bytes: Vec<u8>) -> Result<Icon, IconError> {
        if !bytes.starts_with(PNG_SIGNATURE) {
            return Err(IconError::NotPng);
        }
        let (width, height) = png_dimensions(&bytes)?;
        if width == 0 || height == 0 {
            return Err(IconError::Empty);
        }
        Ok(Icon {
            png: bytes,
            width,
            height,
        })
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    pub fn png_data(&self) -> &[u8] {
        &self.png
    }

    pub fn data_uri(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

#[cfg(feature = "png")]
fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), IconError> {
    let pixmap = resvg::tiny_skia::Pixmap::decode_png(bytes)
        .map_err(|err| IconError::Decode(err.to_string()))?;
    Ok((pixmap.width(), pixmap.height()))
}

/// Reads the IHDR chunk without decoding pixel data.
#[cfg(not(feature = "png"))]
fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), IconError> {
    let header = bytes
        .get(8..24)
        .filter(|h| &h[4..8] == b"IHDR")
        .ok_or_else(|| IconError::Decode("missing IHDR chunk".to_string()))?;
    let be = |b: &[u8]| u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
    Ok((be(&header[8..12]), be(&header[12..16])))
}

/// Text shown inside a node: the `label` attribute, or the node name when the
/// label is unset, empty or the `\N` placeholder.
pub fn displayed_label(model: &GraphModel, id: NodeId) -> (String, bool) {
    let name = model.node_name(id).unwrap_or_default();
    match model.attr(AttrTarget::Node(id), Attr::Label.name()) {
        Some(value) if value.is_html() => (value.as_str().to_string(), true),
        Some(value) if !value.is_empty() && value.as_str() != NAME_PLACEHOLDER => {
            let ctx = EscapeContext {
                graph: model.name(),
                node: name,
                ..EscapeContext::default()
            };
            (expand_escapes(value.as_str(), &ctx), false)
        }
        _ => (name.to_string(), false),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    id: NodeId,
    name: String,
    pos: Point,
    size: Size,
    #[serde(skip)]
    path: Path,
    pen: Pen,
    brush: Brush,
    font: Font,
    label: Vec<String>,
    label_html: bool,
    label_size: Size,
    show_label: bool,
    tooltip: String,
    invisible: bool,
    #[serde(skip)]
    icon: Option<Icon>,
    xlabel: Option<TextItem>,
    selected: bool,
    #[serde(skip)]
    selection_darken: u32,
}

impl Node {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            pos: Point::default(),
            size: Size::default(),
            path: Path::new(),
            pen: Pen::default(),
            brush: Brush::default(),
            font: Font::default(),
            label: Vec::new(),
            label_html: false,
            label_size: Size::default(),
            show_label: true,
            tooltip: String::new(),
            invisible: false,
            icon: None,
            xlabel: None,
            selected: false,
            selection_darken: 120,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rebuilds position, outline, pen, brush and labels.
    pub fn update_layout(&mut self, ctx: &UpdateContext<'_>) {
        let model = ctx.model;
        if let Some(name) = model.node_name(self.id) {
            self.name = name.to_string();
        }
        let view = model.view(AttrTarget::Node(self.id));
        let style = view.style();
        self.invisible = style.is_invisible();
        self.selection_darken = ctx.selection_darken;
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
        self.brush = resolve_brush(fill, &style, ctx.palette.fill);
        self.tooltip = view.text(Attr::Tooltip).to_string();
        self.font = ctx.font(&view);

        let (text, html) = displayed_label(model, self.id);
        self.label = label_lines(&text, html);
        self.label_html = html;
        self.label_size = ctx.metrics.measure(&self.label, &self.font);

        let Some(geometry) = ctx.layout.nodes.get(&self.id) else {
            tracing::warn!(node = %self.name, "no layout geometry for node");
            return;
        };
        let width = geometry.width * ctx.dpi;
        let height = geometry.height * ctx.dpi;
        self.size = Size::new(width, height);
        self.pos = center_to_origin(
            to_screen_point(geometry.center, ctx.graph_height()),
            width,
            height,
        );
        let shape_name = match view.text(Attr::Shape).trim() {
            "" => DEFAULT_SHAPE,
            name => name,
        };
        if geometry.shape.is_none() {
            tracing::warn!(node = %self.name, shape = shape_name, "missing shape descriptor, outline left empty");
        }
        self.path = shape_path(shape_name, geometry.shape.as_ref(), width, height);
        self.show_label = geometry.label.is_some();
        place_label(
            &mut self.xlabel,
            geometry.xlabel.as_ref(),
            &self.font,
            ctx,
            !self.invisible,
        );
    }

    /// Outline in node-local coordinates.
    pub fn path(&self) -> &Path {
        &self.path
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

    pub fn font(&self) -> &Font {
        &self.font
    }

    pub fn label_lines(&self) -> &[String] {
        &self.label
    }

    pub fn label_text(&self) -> String {
        self.label.join("\n")
    }

    pub fn is_html_label(&self) -> bool {
        self.label_html
    }

    pub fn xlabel(&self) -> Option<&TextItem> {
        self.xlabel.as_ref()
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    pub fn icon(&self) -> Option<&Icon> {
        self.icon.as_ref()
    }

    pub fn set_icon(&mut self, icon: Option<Icon>) {
        self.icon = icon;
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// The `width` x `height` box at the node position.
    pub fn footprint(&self) -> Rect {
        Rect::new(self.pos.x, self.pos.y, self.size.width, self.size.height)
    }

    /// Scene-space bounds: the outline, plus the external label when shown.
    pub fn bounding_rect(&self) -> Rect {
        let mut rect = self.path.bounding_rect().translated(self.pos);
        if let Some(xlabel) = self.xlabel.as_ref().filter(|x| x.is_visible()) {
            rect = rect.united(&xlabel.bounding_rect());
        }
        rect
    }

    /// Whether `point` (scene space) falls inside the outline.
    pub fn contains(&self, point: Point) -> bool {
        let local = point - self.pos;
        self.path
            .flatten(16)
            .into_iter()
            .any(|ring| Polygon::new(ring).contains(local))
    }

    pub fn paint(&self, painter: &mut dyn Painter) {
        if self.invisible {
            return;
        }
        painter.begin_group("node", Some(&self.tooltip));
        let brush = if self.selected {
            Brush {
                color: self.brush.color.darker(self.selection_darken),
                ..self.brush
            }
        } else {
            self.brush
        };
        painter.draw_path(&self.path.translated(self.pos), &self.pen, &brush);

        let area = self
            .footprint()
            .adjusted(LABEL_MARGIN, LABEL_MARGIN, -LABEL_MARGIN, -LABEL_MARGIN);
        match &self.icon {
            None => {
                if self.show_label {
                    painter.draw_text(
                        Rect::from_center(area.center(), self.label_size),
                        &self.label,
                        &self.font,
                    );
                }
            }
            Some(icon) => {
                // caption in the upper two thirds, icon in the lower third
                let text_area = area.adjusted(0.0, 0.0, 0.0, -area.height / 3.0);
                if self.show_label {
                    painter.draw_text(
                        Rect::from_center(text_area.center(), self.label_size),
                        &self.label,
                        &self.font,
                    );
                }
                let icon_area = area.adjusted(0.0, area.height * 2.0 / 3.0, 0.0, 0.0);
                let fit = fit_keep_aspect(icon.size(), icon_area.size());
                let target = Rect::new(
                    icon_area.x + (icon_area.width - fit.width) / 2.0,
                    icon_area.y,
                    fit.width,
                    fit.height,
                );
                painter.draw_image(target, icon);
            }
        }
        if let Some(xlabel) = &self.xlabel {
            xlabel.paint(painter);
        }
        painter.end_group();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttrValue;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn label_falls_back_to_name() {
        let mut g = GraphModel::digraph("g");
        let a = g.add_node(Some("alpha")).unwrap();
        assert_eq!(displayed_label(&g, a), ("alpha".to_string(), false));
        g.set_attr(AttrTarget::Node(a), "label", AttrValue::text("\\N")).unwrap();
        assert_eq!(displayed_label(&g, a).0, "alpha");
        g.set_attr(AttrTarget::Node(a), "label", AttrValue::text("")).unwrap();
        assert_eq!(displayed_label(&g, a).0, "alpha");
        g.set_attr(AttrTarget::Node(a), "label", AttrValue::text("Node \\N")).unwrap();
        assert_eq!(displayed_label(&g, a).0, "Node alpha");
        g.set_attr(AttrTarget::Node(a), "label", AttrValue::parse("<<b>Hi</b>>")).unwrap();
        assert_eq!(displayed_label(&g, a), ("<b>Hi</b>".to_string(), true));
    }

    #[test]
    fn rejects_non_png_icons() {
        assert_eq!(Icon::from_png(b"GIF89a".to_vec()), Err(IconError::NotPng));
    }

    #[cfg(not(feature = "png"))]
    #[test]
    fn reads_icon_size_from_header() {
        let icon = Icon::from_png(png_header(32, 16)).unwrap();
        assert_eq!(icon.pixel_size(), (32, 16));
        assert!(icon.data_uri().starts_with("data:image/png;base64,iVBORw0KGgo"));
        assert_eq!(Icon::from_png(png_header(0, 16)), Err(IconError::Empty));
    }

    #[cfg(feature = "png")]
    #[test]
    fn truncated_png_fails_to_decode() {
        assert!(matches!(
            Icon::from_png(png_header(32, 16)),
            Err(IconError::Decode(_))
        ));
    }
}
