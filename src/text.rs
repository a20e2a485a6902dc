//! Label text: escape expansion, markup flattening, measurement and the
//! standalone text item used for node, edge, subgraph and graph captions.

use serde::Serialize;

use crate::geometry::{Point, Rect, Size};
use crate::paint::Painter;
use crate::style::Color;
use crate::text_metrics;

/// Graphviz defaults.
pub const DEFAULT_FONT_FAMILY: &str = "Times-Roman";
pub const DEFAULT_FONT_SIZE: f64 = 14.0;
const MIN_FONT_SIZE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    pub family: String,
    pub size: f64,
    pub color: Color,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: DEFAULT_FONT_FAMILY.to_string(),
            size: DEFAULT_FONT_SIZE,
            color: Color::BLACK,
        }
    }
}

impl Font {
    /// Font from `fontname`/`fontsize`/`fontcolor` attribute values; empty or
    /// invalid values keep the defaults of `base`.
    pub fn from_attrs(base: &Font, family: &str, size: Option<f64>, color: &str) -> Font {
        Font {
            family: if family.trim().is_empty() {
                base.family.clone()
            } else {
                family.trim().to_string()
            },
            size: size
                .filter(|s| s.is_finite() && *s >= MIN_FONT_SIZE)
                .unwrap_or(base.size),
            color: crate::style::resolve_color(color, base.color),
        }
    }
}

/// Names substituted for `\G`, `\N`, `\E`, `\T` and `\H` in plain labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeContext<'a> {
    pub graph: &'a str,
    pub node: &'a str,
    pub tail: &'a str,
    pub head: &'a str,
}

/// Expands the backslash escapes of a plain label. `\n`, `\l` and `\r`
/// become line breaks; unknown escapes keep the escaped character.
pub fn expand_escapes(text: &str, ctx: &EscapeContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('l') | Some('r') => out.push('\n'),
            Some('G') => out.push_str(ctx.graph),
            Some('N') => out.push_str(ctx.node),
            Some('E') => {
                out.push_str(ctx.tail);
                out.push_str("->");
                out.push_str(ctx.head);
            }
            Some('T') => out.push_str(ctx.tail),
            Some('H') => out.push_str(ctx.head),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    // a trailing line break only terminates the last line
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Flattens a markup label into display lines: tags are dropped, `<br>`
/// breaks lines and character entities are decoded.
pub fn markup_lines(markup: &str) -> Vec<String> {
    let mut lines = vec![String::new()];
    let mut rest = markup;
    while let Some(start) = rest.find('<') {
        push_decoded(&mut lines, &rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            push_decoded(&mut lines, &rest[start..]);
            rest = "";
            break;
        };
        let tag = rest[start + 1..start + end].trim().to_ascii_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        if name == "br" || (tag.starts_with('/') && matches!(name, "tr")) {
            lines.push(String::new());
        }
        rest = &rest[start + end + 1..];
    }
    push_decoded(&mut lines, rest);
    let mut lines: Vec<String> = lines.into_iter().map(|l| l.trim().to_string()).collect();
    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn push_decoded(lines: &mut [String], raw: &str) {
    let decoded = decode_entities(&raw.replace(['\n', '\r'], " "));
    if let Some(last) = lines.last_mut() {
        last.push_str(&decoded);
    }
}

pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|i| *i <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Display lines for a label body.
pub fn label_lines(text: &str, html: bool) -> Vec<String> {
    if html {
        markup_lines(text)
    } else {
        text.split('\n').map(str::to_string).collect()
    }
}

/// Text measurement settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextMetrics {
    /// Skip font lookup and use the per-character estimate.
    pub fast: bool,
    /// Line advance as a multiple of the font size.
    pub line_height: f64,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            fast: false,
            line_height: 1.2,
        }
    }
}

impl TextMetrics {
    pub fn fast() -> Self {
        Self {
            fast: true,
            ..Self::default()
        }
    }

    pub fn line_width(&self, line: &str, font: &Font) -> f64 {
        if self.fast {
            return estimated_width(line, font.size);
        }
        text_metrics::measure_text_width(line, font.size, &font.family)
            .unwrap_or_else(|| estimated_width(line, font.size))
    }

    pub fn line_advance(&self, font: &Font) -> f64 {
        if self.fast {
            return font.size * self.line_height;
        }
        text_metrics::line_height(font.size, &font.family)
            .map(|h| h.max(font.size * self.line_height))
            .unwrap_or(font.size * self.line_height)
    }

    pub fn measure(&self, lines: &[String], font: &Font) -> Size {
        if lines.iter().all(|l| l.is_empty()) {
            return Size::default();
        }
        let width = lines
            .iter()
            .map(|l| self.line_width(l, font))
            .fold(0.0, f64::max);
        Size::new(width, lines.len() as f64 * self.line_advance(font))
    }
}

fn estimated_width(text: &str, font_size: f64) -> f64 {
    text.chars().map(char_width_factor).sum::<f64>() * font_size
}

/// Relative advance of a character in a proportional serif face.
fn char_width_factor(ch: char) -> f64 {
    match ch {
        ' ' => 0.25,
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '!' | '\'' | '|' => 0.28,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' => 0.33,
        'm' | 'w' => 0.75,
        'M' | 'W' => 0.89,
        c if c.is_ascii_uppercase() => 0.67,
        c if c.is_ascii_digit() => 0.5,
        c if c.is_ascii() => 0.48,
        c if c.len_utf8() >= 3 => 1.0,
        _ => 0.56,
    }
}

/// A standalone caption in screen space.
///
/// Created empty and hidden; becomes visible when given non-empty text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextItem {
    lines: Vec<String>,
    html: bool,
    font: Font,
    size: Size,
    pos: Point,
    visible: bool,
}

impl TextItem {
    pub fn new(font: Font) -> Self {
        Self {
            lines: Vec::new(),
            html: false,
            font,
            size: Size::default(),
            pos: Point::default(),
            visible: false,
        }
    }

    pub fn set_text(&mut self, text: &str, html: bool, metrics: &TextMetrics) {
        self.lines = label_lines(text, html);
        self.html = html;
        self.size = metrics.measure(&self.lines, &self.font);
        self.visible = !text.is_empty();
    }

    pub fn set_font(&mut self, font: Font) {
        self.font = font;
    }

    pub fn font(&self) -> &Font {
        &self.font
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_html(&self) -> bool {
        self.html
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pos(&self) -> Point {
        self.pos
    }

    pub fn set_pos(&mut self, pos: Point) {
        self.pos = pos;
    }

    /// Moves the item so that its box is centred on `center`.
    pub fn move_center(&mut self, center: Point) {
        self.pos = Point::new(
            center.x - self.size.width / 2.0,
            center.y - self.size.height / 2.0,
        );
    }

    pub fn bounding_rect(&self) -> Rect {
        Rect::new(self.pos.x, self.pos.y, self.size.width, self.size.height)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn paint(&self, painter: &mut dyn Painter) {
        if self.visible && !self.lines.is_empty() {
            painter.draw_text(self.bounding_rect(), &self.lines, &self.font);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_name_escapes() {
        let ctx = EscapeContext {
            graph: "G",
            node: "a",
            tail: "t",
            head: "h",
        };
        assert_eq!(expand_escapes("\\N in \\G", &ctx), "a in G");
        assert_eq!(expand_escapes("\\E", &ctx), "t->h");
        assert_eq!(expand_escapes("one\\ltwo\\l", &ctx), "one\ntwo");
        assert_eq!(expand_escapes("a\\\\b", &ctx), "a\\b");
    }

    #[test]
    fn flattens_markup() {
        assert_eq!(markup_lines("<b>Hi</b> &amp; bye"), vec!["Hi & bye"]);
        assert_eq!(markup_lines("one<br/>two<BR ALIGN=\"LEFT\"/>"), vec!["one", "two"]);
        assert_eq!(
            markup_lines("<table><tr><td>a</td></tr><tr><td>b</td></tr></table>"),
            vec!["a", "b"]
        );
        assert_eq!(decode_entities("&#65;&#x42;&bogus;"), "AB&bogus;");
    }

    #[test]
    fn fast_metrics_scale_with_font_size() {
        let metrics = TextMetrics::fast();
        let small = Font::default();
        let big = Font {
            size: small.size * 2.0,
            ..Font::default()
        };
        let lines = vec!["Hello".to_string()];
        let a = metrics.measure(&lines, &small);
        let b = metrics.measure(&lines, &big);
        assert!((b.width - 2.0 * a.width).abs() < 1e-9);
        assert!((b.height - 2.0 * a.height).abs() < 1e-9);
        assert_eq!(metrics.measure(&[String::new()], &small), Size::default());
    }

    #[test]
    fn text_item_is_hidden_until_it_has_text() {
        let mut item = TextItem::new(Font::default());
        assert!(!item.is_visible());
        item.set_text("caption", false, &TextMetrics::fast());
        assert!(item.is_visible());
        item.move_center(Point::new(100.0, 50.0));
        let rect = item.bounding_rect();
        assert!(rect.center().approx_eq(Point::new(100.0, 50.0), 1e-9));
        item.set_text("", false, &TextMetrics::fast());
        assert!(!item.is_visible());
    }
}
