//! Paint backends. Items describe themselves through the [`Painter`] trait in
//! scene coordinates; [`SvgPainter`] turns that into an SVG document and
//! [`DisplayList`] records it for inspection.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path as FsPath;

use crate::config::RenderConfig;
use crate::geometry::{Path, Point, Polygon, Rect};
use crate::items::node::Icon;
use crate::scene::Scene;
use crate::style::{Brush, Color, FillPattern, Pen};
use crate::text::Font;
use crate::theme::Theme;

const SVG_MARGIN: f64 = 4.0;
const HATCH_SPACING: f64 = 6.0;

pub trait Painter {
    fn draw_line(&mut self, from: Point, to: Point, pen: &Pen);
    fn draw_path(&mut self, path: &Path, pen: &Pen, brush: &Brush);
    fn draw_polygon(&mut self, polygon: &Polygon, pen: &Pen, brush: &Brush);
    /// Centred lines inside `rect`.
    fn draw_text(&mut self, rect: Rect, lines: &[String], font: &Font);
    fn draw_image(&mut self, rect: Rect, icon: &Icon);

    /// Opens a logical group (one scene item). Backends without grouping
    /// ignore it.
    fn begin_group(&mut self, _class: &str, _tooltip: Option<&str>) {}
    fn end_group(&mut self) {}
}

/// One recorded paint call.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintOp {
    Line { from: Point, to: Point, pen: Pen },
    Path { path: Path, pen: Pen, brush: Brush },
    Polygon { polygon: Polygon, pen: Pen, brush: Brush },
    Text { rect: Rect, lines: Vec<String>, font: Font },
    Image { rect: Rect, size: (u32, u32) },
    BeginGroup { class: String, tooltip: Option<String> },
    EndGroup,
}

impl PaintOp {
    /// Whether the call puts anything on the canvas.
    pub fn is_visible(&self) -> bool {
        match self {
            PaintOp::Line { pen, .. } => pen.visible,
            PaintOp::Path { path, pen, brush } => !path.is_empty() && (pen.visible || brush.is_visible()),
            PaintOp::Polygon { polygon, pen, brush } => {
                !polygon.is_empty() && (pen.visible || brush.is_visible())
            }
            PaintOp::Text { lines, .. } => lines.iter().any(|l| !l.is_empty()),
            PaintOp::Image { .. } => true,
            PaintOp::BeginGroup { .. } | PaintOp::EndGroup => false,
        }
    }
}

/// Painter that records every call.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    pub ops: Vec<PaintOp>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_ops(&self) -> impl Iterator<Item = &PaintOp> {
        self.ops.iter().filter(|op| op.is_visible())
    }

    pub fn texts(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                PaintOp::Text { lines, .. } => Some(lines.join("\n")),
                _ => None,
            })
            .collect()
    }
}

impl Painter for DisplayList {
    fn draw_line(&mut self, from: Point, to: Point, pen: &Pen) {
        self.ops.push(PaintOp::Line { from, to, pen: *pen });
    }

    fn draw_path(&mut self, path: &Path, pen: &Pen, brush: &Brush) {
        self.ops.push(PaintOp::Path {
            path: path.clone(),
            pen: *pen,
            brush: *brush,
        });
    }

    fn draw_polygon(&mut self, polygon: &Polygon, pen: &Pen, brush: &Brush) {
        self.ops.push(PaintOp::Polygon {
            polygon: polygon.clone(),
            pen: *pen,
            brush: *brush,
        });
    }

    fn draw_text(&mut self, rect: Rect, lines: &[String], font: &Font) {
        self.ops.push(PaintOp::Text {
            rect,
            lines: lines.to_vec(),
            font: font.clone(),
        });
    }

    fn draw_image(&mut self, rect: Rect, icon: &Icon) {
        self.ops.push(PaintOp::Image {
            rect,
            size: icon.pixel_size(),
        });
    }

    fn begin_group(&mut self, class: &str, tooltip: Option<&str>) {
        self.ops.push(PaintOp::BeginGroup {
            class: class.to_string(),
            tooltip: tooltip.map(str::to_string),
        });
    }

    fn end_group(&mut self) {
        self.ops.push(PaintOp::EndGroup);
    }
}

/// Writes paint calls as SVG elements over a fixed view box.
pub struct SvgPainter {
    view: Rect,
    background: Color,
    body: String,
    defs: BTreeMap<String, String>,
}

impl SvgPainter {
    pub fn new(view: Rect, background: Color) -> Self {
        Self {
            view,
            background,
            body: String::new(),
            defs: BTreeMap::new(),
        }
    }

    pub fn finish(self) -> String {
        let v = self.view;
        let mut svg = String::new();
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{:.2}\" height=\"{:.2}\" viewBox=\"{:.2} {:.2} {:.2} {:.2}\">",
            v.width, v.height, v.x, v.y, v.width, v.height
        );
        if !self.defs.is_empty() {
            svg.push_str("<defs>");
            for def in self.defs.values() {
                svg.push_str(def);
            }
            svg.push_str("</defs>");
        }
        if !self.background.is_transparent() {
            let _ = write!(
                svg,
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"/>",
                v.x,
                v.y,
                v.width,
                v.height,
                self.background.to_hex()
            );
        }
        svg.push_str(&self.body);
        svg.push_str("</svg>");
        svg
    }

    fn stroke_attrs(pen: &Pen) -> String {
        if !pen.visible {
            return "stroke=\"none\"".to_string();
        }
        let mut out = format!(
            "stroke=\"{}\" stroke-width=\"{:.2}\"",
            pen.color.to_hex(),
            pen.width
        );
        if pen.color.opacity() < 1.0 {
            let _ = write!(out, " stroke-opacity=\"{:.3}\"", pen.color.opacity());
        }
        if let Some(dash) = pen.dash.svg_dasharray(pen.width.max(1.0)) {
            let _ = write!(out, " stroke-dasharray=\"{dash}\"");
        }
        out
    }

    fn fill_attrs(&mut self, brush: &Brush) -> String {
        if !brush.is_visible() {
            return "fill=\"none\"".to_string();
        }
        let hex = brush.color.to_hex();
        let paint = match brush.pattern {
            FillPattern::None => return "fill=\"none\"".to_string(),
            FillPattern::Solid => hex.clone(),
            pattern => format!("url(#{})", self.hatch(pattern, brush.color)),
        };
        let mut out = format!("fill=\"{paint}\"");
        if brush.color.opacity() < 1.0 {
            let _ = write!(out, " fill-opacity=\"{:.3}\"", brush.color.opacity());
        }
        out
    }

    /// Registers a hatch pattern definition and returns its id.
    fn hatch(&mut self, pattern: FillPattern, color: Color) -> String {
        let (tag, lines) = match pattern {
            FillPattern::HorizontalHatch => ("h", vec![(0.0, 0.5, 1.0, 0.5)]),
            FillPattern::VerticalHatch => ("v", vec![(0.5, 0.0, 0.5, 1.0)]),
            FillPattern::CrossHatch => ("x", vec![(0.0, 0.5, 1.0, 0.5), (0.5, 0.0, 0.5, 1.0)]),
            _ => ("d", vec![(0.0, 1.0, 1.0, 0.0)]),
        };
        let id = format!("hatch-{tag}-{}", color.to_hex().trim_start_matches('#'));
        self.defs.entry(id.clone()).or_insert_with(|| {
            let s = HATCH_SPACING;
            let mut def = format!(
                "<pattern id=\"{id}\" patternUnits=\"userSpaceOnUse\" width=\"{s}\" height=\"{s}\">"
            );
            for (x1, y1, x2, y2) in lines {
                let _ = write!(
                    def,
                    "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"1\"/>",
                    x1 * s,
                    y1 * s,
                    x2 * s,
                    y2 * s,
                    color.to_hex()
                );
            }
            def.push_str("</pattern>");
            def
        });
        id
    }
}

impl Painter for SvgPainter {
    fn draw_line(&mut self, from: Point, to: Point, pen: &Pen) {
        if !pen.visible {
            return;
        }
        let stroke = Self::stroke_attrs(pen);
        let _ = write!(
            self.body,
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" {stroke}/>",
            from.x, from.y, to.x, to.y
        );
    }

    fn draw_path(&mut self, path: &Path, pen: &Pen, brush: &Brush) {
        if path.is_empty() || (!pen.visible && !brush.is_visible()) {
            return;
        }
        let fill = self.fill_attrs(brush);
        let stroke = Self::stroke_attrs(pen);
        let _ = write!(
            self.body,
            "<path d=\"{}\" {fill} {stroke}/>",
            path.to_svg_data()
        );
    }

    fn draw_polygon(&mut self, polygon: &Polygon, pen: &Pen, brush: &Brush) {
        if polygon.is_empty() || (!pen.visible && !brush.is_visible()) {
            return;
        }
        let points = polygon
            .points()
            .iter()
            .map(|p| format!("{:.2},{:.2}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        let fill = self.fill_attrs(brush);
        let stroke = Self::stroke_attrs(pen);
        let _ = write!(self.body, "<polygon points=\"{points}\" {fill} {stroke}/>");
    }

    fn draw_text(&mut self, rect: Rect, lines: &[String], font: &Font) {
        if lines.is_empty() {
            return;
        }
        let advance = rect.height / lines.len() as f64;
        let x = rect.center().x;
        let _ = write!(
            self.body,
            "<text text-anchor=\"middle\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{}\">",
            escape_xml(&font.family),
            font.size,
            font.color.to_hex()
        );
        for (idx, line) in lines.iter().enumerate() {
            // baseline sits at roughly 80% of the line box
            let y = rect.top() + advance * idx as f64 + advance * 0.8;
            let _ = write!(
                self.body,
                "<tspan x=\"{x:.2}\" y=\"{y:.2}\">{}</tspan>",
                escape_xml(line)
            );
        }
        self.body.push_str("</text>");
    }

    fn draw_image(&mut self, rect: Rect, icon: &Icon) {
        let _ = write!(
            self.body,
            "<image x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" href=\"{}\"/>",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            icon.data_uri()
        );
    }

    fn begin_group(&mut self, class: &str, tooltip: Option<&str>) {
        let _ = write!(self.body, "<g class=\"{}\">", escape_xml(class));
        if let Some(tip) = tooltip.filter(|t| !t.is_empty()) {
            let _ = write!(self.body, "<title>{}</title>", escape_xml(tip));
        }
    }

    fn end_group(&mut self) {
        self.body.push_str("</g>");
    }
}

/// Renders a laid-out scene as a standalone SVG document.
pub fn render_svg(scene: &Scene, theme: &Theme) -> String {
    let rect = scene.scene_rect();
    let view = if rect.is_valid() && !rect.is_null() {
        rect.adjusted(-SVG_MARGIN, -SVG_MARGIN, SVG_MARGIN, SVG_MARGIN)
    } else {
        Rect::new(0.0, 0.0, 2.0 * SVG_MARGIN, 2.0 * SVG_MARGIN)
    };
    let background = crate::style::resolve_color(&theme.background, Color::WHITE);
    let mut painter = SvgPainter::new(view, background);
    scene.paint(&mut painter, view);
    painter.finish()
}

pub fn write_output_svg(svg: &str, output: Option<&FsPath>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &FsPath, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = "Times New Roman".to_string();
    if let Some(size) = usvg::Size::from_wh(render_cfg.width, render_cfg.height) {
        opt.default_size = size;
    }
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    if let Some(bg) = crate::style::Color::parse(&render_cfg.background)
        && !bg.is_transparent()
    {
        pixmap.fill(resvg::tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));
    }
    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(_svg: &str, _output: &FsPath, _render_cfg: &RenderConfig) -> Result<()> {
    anyhow::bail!("PNG output requires the `png` feature")
}

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::DashPattern;

    #[test]
    fn invisible_pen_and_brush_emit_nothing() {
        let mut painter = SvgPainter::new(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        let mut path = Path::new();
        path.add_polygon(&[Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(5.0, 5.0)]);
        let pen = Pen {
            visible: false,
            ..Pen::default()
        };
        painter.draw_path(&path, &pen, &Brush::default());
        assert!(!painter.finish().contains("<path"));
    }

    #[test]
    fn dashed_pen_and_hatch_fill() {
        let mut painter = SvgPainter::new(Rect::new(0.0, 0.0, 10.0, 10.0), Color::TRANSPARENT);
        let polygon = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 4.0)]);
        let pen = Pen {
            dash: DashPattern::Dash,
            ..Pen::default()
        };
        let brush = Brush {
            color: Color::rgb(255, 0, 0),
            pattern: FillPattern::CrossHatch,
        };
        painter.draw_polygon(&polygon, &pen, &brush);
        let svg = painter.finish();
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("<pattern id=\"hatch-x-ff0000\""));
        assert!(svg.contains("fill=\"url(#hatch-x-ff0000)\""));
    }

    #[test]
    fn text_is_escaped() {
        let mut painter = SvgPainter::new(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        painter.draw_text(
            Rect::new(0.0, 0.0, 40.0, 14.0),
            &["a < b & c".to_string()],
            &Font::default(),
        );
        assert!(painter.finish().contains("a &lt; b &amp; c"));
    }
}
