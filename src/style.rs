//! Attribute strings to paint primitives.
//!
//! Resolution never fails: unknown colors fall back to black and unknown fill
//! keywords to a solid fill.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const LIGHT_GREY: Color = Color::rgb(211, 211, 211);
    pub const TRANSPARENT: Color = Color::rgba(255, 255, 254, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses a color name, `#rgb`, `#rrggbb`, `#rrggbbaa` or an HSV triple
    /// (`"0.6 0.5 0.9"` / `"0.6,0.5,0.9"`). Color lists (`red:blue`) resolve to
    /// their first entry.
    pub fn parse(value: &str) -> Option<Color> {
        let value = value.trim();
        let value = value.split(':').next().unwrap_or(value);
        let value = value.split(';').next().unwrap_or(value).trim();
        if value.is_empty() {
            return None;
        }
        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(caps) = HSV_RE.captures(value) {
            let h: f64 = caps[1].parse().ok()?;
            let s: f64 = caps[2].parse().ok()?;
            let v: f64 = caps[3].parse().ok()?;
            return Some(from_hsv(h, s, v));
        }
        let key = value.to_ascii_lowercase().replace([' ', '_'], "");
        // X11 scheme names may carry a scheme prefix: "/x11/red"
        let key = key.rsplit('/').next().unwrap_or(&key).to_string();
        NAMED_COLORS.get(key.as_str()).copied()
    }

    /// Darkens like a painter's `darker(factor)`: value is divided by
    /// `factor / 100`. 120 gives a 20 % darker color.
    pub fn darker(self, factor: u32) -> Color {
        if factor <= 100 {
            return self;
        }
        let scale = 100.0 / factor as f64;
        let ch = |c: u8| ((c as f64) * scale).round().clamp(0.0, 255.0) as u8;
        Color::rgba(ch(self.r), ch(self.g), ch(self.b), self.a)
    }

    pub fn is_transparent(self) -> bool {
        self.a == 0
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn opacity(self) -> f64 {
        self.a as f64 / 255.0
    }
}

static HSV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]*\.?[0-9]+)[,\s]+([0-9]*\.?[0-9]+)[,\s]+([0-9]*\.?[0-9]+)$").unwrap()
});

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.is_ascii() {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut it = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
            Some(Color::rgb(it.next()??, it.next()??, it.next()??))
        }
        6 => Some(Color::rgb(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
        8 => Some(Color::rgba(
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        )),
        _ => None,
    }
}

fn from_hsv(h: f64, s: f64, v: f64) -> Color {
    let h = (h.clamp(0.0, 1.0) * 6.0) % 6.0;
    let s = s.clamp(0.0, 1.0);
    let v = v.clamp(0.0, 1.0);
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match i as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let ch = |c: f64| (c * 255.0).round() as u8;
    Color::rgb(ch(r), ch(g), ch(b))
}

static NAMED_COLORS: Lazy<HashMap<&'static str, Color>> = Lazy::new(|| {
    [
        ("aliceblue", Color::rgb(240, 248, 255)),
        ("antiquewhite", Color::rgb(250, 235, 215)),
        ("aquamarine", Color::rgb(127, 255, 212)),
        ("azure", Color::rgb(240, 255, 255)),
        ("beige", Color::rgb(245, 245, 220)),
        ("bisque", Color::rgb(255, 228, 196)),
        ("black", Color::BLACK),
        ("blanchedalmond", Color::rgb(255, 235, 205)),
        ("blue", Color::rgb(0, 0, 255)),
        ("blueviolet", Color::rgb(138, 43, 226)),
        ("brown", Color::rgb(165, 42, 42)),
        ("burlywood", Color::rgb(222, 184, 135)),
        ("cadetblue", Color::rgb(95, 158, 160)),
        ("chartreuse", Color::rgb(127, 255, 0)),
        ("chocolate", Color::rgb(210, 105, 30)),
        ("coral", Color::rgb(255, 127, 80)),
        ("cornflowerblue", Color::rgb(100, 149, 237)),
        ("cornsilk", Color::rgb(255, 248, 220)),
        ("crimson", Color::rgb(220, 20, 60)),
        ("cyan", Color::rgb(0, 255, 255)),
        ("darkgoldenrod", Color::rgb(184, 134, 11)),
        ("darkgreen", Color::rgb(0, 100, 0)),
        ("darkkhaki", Color::rgb(189, 183, 107)),
        ("darkolivegreen", Color::rgb(85, 107, 47)),
        ("darkorange", Color::rgb(255, 140, 0)),
        ("darkorchid", Color::rgb(153, 50, 204)),
        ("darksalmon", Color::rgb(233, 150, 122)),
        ("darkseagreen", Color::rgb(143, 188, 143)),
        ("darkslateblue", Color::rgb(72, 61, 139)),
        ("darkslategray", Color::rgb(47, 79, 79)),
        ("darkslategrey", Color::rgb(47, 79, 79)),
        ("darkturquoise", Color::rgb(0, 206, 209)),
        ("darkviolet", Color::rgb(148, 0, 211)),
        ("deeppink", Color::rgb(255, 20, 147)),
        ("deepskyblue", Color::rgb(0, 191, 255)),
        ("dimgray", Color::rgb(105, 105, 105)),
        ("dimgrey", Color::rgb(105, 105, 105)),
        ("dodgerblue", Color::rgb(30, 144, 255)),
        ("firebrick", Color::rgb(178, 34, 34)),
        ("floralwhite", Color::rgb(255, 250, 240)),
        ("forestgreen", Color::rgb(34, 139, 34)),
        ("gainsboro", Color::rgb(220, 220, 220)),
        ("ghostwhite", Color::rgb(248, 248, 255)),
        ("gold", Color::rgb(255, 215, 0)),
        ("goldenrod", Color::rgb(218, 165, 32)),
        ("gray", Color::rgb(192, 192, 192)),
        ("grey", Color::rgb(192, 192, 192)),
        ("green", Color::rgb(0, 255, 0)),
        ("greenyellow", Color::rgb(173, 255, 47)),
        ("honeydew", Color::rgb(240, 255, 240)),
        ("hotpink", Color::rgb(255, 105, 180)),
        ("indianred", Color::rgb(205, 92, 92)),
        ("indigo", Color::rgb(75, 0, 130)),
        ("ivory", Color::rgb(255, 255, 240)),
        ("khaki", Color::rgb(240, 230, 140)),
        ("lavender", Color::rgb(230, 230, 250)),
        ("lavenderblush", Color::rgb(255, 240, 245)),
        ("lawngreen", Color::rgb(124, 252, 0)),
        ("lemonchiffon", Color::rgb(255, 250, 205)),
        ("lightblue", Color::rgb(173, 216, 230)),
        ("lightcoral", Color::rgb(240, 128, 128)),
        ("lightcyan", Color::rgb(224, 255, 255)),
        ("lightgoldenrod", Color::rgb(238, 221, 130)),
        ("lightgray", Color::LIGHT_GREY),
        ("lightgrey", Color::LIGHT_GREY),
        ("lightpink", Color::rgb(255, 182, 193)),
        ("lightsalmon", Color::rgb(255, 160, 122)),
        ("lightseagreen", Color::rgb(32, 178, 170)),
        ("lightskyblue", Color::rgb(135, 206, 250)),
        ("lightslategray", Color::rgb(119, 136, 153)),
        ("lightsteelblue", Color::rgb(176, 196, 222)),
        ("lightyellow", Color::rgb(255, 255, 224)),
        ("limegreen", Color::rgb(50, 205, 50)),
        ("linen", Color::rgb(250, 240, 230)),
        ("magenta", Color::rgb(255, 0, 255)),
        ("maroon", Color::rgb(176, 48, 96)),
        ("mediumaquamarine", Color::rgb(102, 205, 170)),
        ("mediumblue", Color::rgb(0, 0, 205)),
        ("mediumorchid", Color::rgb(186, 85, 211)),
        ("mediumpurple", Color::rgb(147, 112, 219)),
        ("mediumseagreen", Color::rgb(60, 179, 113)),
        ("mediumslateblue", Color::rgb(123, 104, 238)),
        ("mediumspringgreen", Color::rgb(0, 250, 154)),
        ("mediumturquoise", Color::rgb(72, 209, 204)),
        ("mediumvioletred", Color::rgb(199, 21, 133)),
        ("midnightblue", Color::rgb(25, 25, 112)),
        ("mintcream", Color::rgb(245, 255, 250)),
        ("mistyrose", Color::rgb(255, 228, 225)),
        ("moccasin", Color::rgb(255, 228, 181)),
        ("navajowhite", Color::rgb(255, 222, 173)),
        ("navy", Color::rgb(0, 0, 128)),
        ("navyblue", Color::rgb(0, 0, 128)),
        ("oldlace", Color::rgb(253, 245, 230)),
        ("olivedrab", Color::rgb(107, 142, 35)),
        ("orange", Color::rgb(255, 165, 0)),
        ("orangered", Color::rgb(255, 69, 0)),
        ("orchid", Color::rgb(218, 112, 214)),
        ("palegoldenrod", Color::rgb(238, 232, 170)),
        ("palegreen", Color::rgb(152, 251, 152)),
        ("paleturquoise", Color::rgb(175, 238, 238)),
        ("palevioletred", Color::rgb(219, 112, 147)),
        ("papayawhip", Color::rgb(255, 239, 213)),
        ("peachpuff", Color::rgb(255, 218, 185)),
        ("peru", Color::rgb(205, 133, 63)),
        ("pink", Color::rgb(255, 192, 203)),
        ("plum", Color::rgb(221, 160, 221)),
        ("powderblue", Color::rgb(176, 224, 230)),
        ("purple", Color::rgb(160, 32, 240)),
        ("red", Color::rgb(255, 0, 0)),
        ("rosybrown", Color::rgb(188, 143, 143)),
        ("royalblue", Color::rgb(65, 105, 225)),
        ("saddlebrown", Color::rgb(139, 69, 19)),
        ("salmon", Color::rgb(250, 128, 114)),
        ("sandybrown", Color::rgb(244, 164, 96)),
        ("seagreen", Color::rgb(46, 139, 87)),
        ("seashell", Color::rgb(255, 245, 238)),
        ("sienna", Color::rgb(160, 82, 45)),
        ("skyblue", Color::rgb(135, 206, 235)),
        ("slateblue", Color::rgb(106, 90, 205)),
        ("slategray", Color::rgb(112, 128, 144)),
        ("slategrey", Color::rgb(112, 128, 144)),
        ("snow", Color::rgb(255, 250, 250)),
        ("springgreen", Color::rgb(0, 255, 127)),
        ("steelblue", Color::rgb(70, 130, 180)),
        ("tan", Color::rgb(210, 180, 140)),
        ("thistle", Color::rgb(216, 191, 216)),
        ("tomato", Color::rgb(255, 99, 71)),
        ("transparent", Color::TRANSPARENT),
        ("none", Color::TRANSPARENT),
        ("turquoise", Color::rgb(64, 224, 208)),
        ("violet", Color::rgb(238, 130, 238)),
        ("violetred", Color::rgb(208, 32, 144)),
        ("wheat", Color::rgb(245, 222, 179)),
        ("white", Color::WHITE),
        ("whitesmoke", Color::rgb(245, 245, 245)),
        ("yellow", Color::rgb(255, 255, 0)),
        ("yellowgreen", Color::rgb(154, 205, 50)),
    ]
    .into_iter()
    .collect()
});

/// Resolves a color attribute; empty values use `default`, unknown ones black.
pub fn resolve_color(value: &str, default: Color) -> Color {
    if value.trim().is_empty() {
        return default;
    }
    Color::parse(value).unwrap_or(Color::BLACK)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DashPattern {
    Solid,
    Dash,
    Dot,
}

impl DashPattern {
    pub fn svg_dasharray(self, width: f64) -> Option<String> {
        match self {
            DashPattern::Solid => None,
            DashPattern::Dash => Some(format!("{:.1} {:.1}", 5.0 * width, 3.0 * width)),
            DashPattern::Dot => Some(format!("{:.1} {:.1}", width, 2.0 * width)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillPattern {
    None,
    Solid,
    HorizontalHatch,
    VerticalHatch,
    CrossHatch,
    DiagonalHatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pen {
    pub color: Color,
    pub width: f64,
    pub dash: DashPattern,
    pub visible: bool,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 1.0,
            dash: DashPattern::Solid,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Brush {
    pub color: Color,
    pub pattern: FillPattern,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: Color::LIGHT_GREY,
            pattern: FillPattern::None,
        }
    }
}

impl Brush {
    pub fn is_visible(&self) -> bool {
        self.pattern != FillPattern::None && !self.color.is_transparent()
    }
}

/// Parsed `style` attribute: comma separated keywords, with optional
/// arguments as in `setlinewidth(2)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSet {
    keywords: Vec<String>,
    line_width: Option<f64>,
}

const LINE_KEYWORDS: &[&str] = &[
    "solid", "dashed", "dotted", "bold", "invis", "invisible", "rounded", "tapered",
];

impl StyleSet {
    pub fn parse(value: &str) -> Self {
        let mut set = StyleSet::default();
        for raw in value.split(',') {
            let token = raw.trim().to_ascii_lowercase();
            if token.is_empty() {
                continue;
            }
            if let Some(arg) = token
                .strip_prefix("setlinewidth(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                set.line_width = arg.trim().parse().ok();
                continue;
            }
            set.keywords.push(token);
        }
        set
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }

    pub fn is_invisible(&self) -> bool {
        self.contains("invis") || self.contains("invisible")
    }

    pub fn dash(&self) -> DashPattern {
        if self.contains("dashed") {
            DashPattern::Dash
        } else if self.contains("dotted") {
            DashPattern::Dot
        } else {
            DashPattern::Solid
        }
    }

    pub fn line_width(&self) -> Option<f64> {
        self.line_width
            .or_else(|| self.contains("bold").then_some(2.0))
    }

    /// Fill pattern selected by the style keywords. Keywords that are neither
    /// line styles nor known fill styles count as an unrecognised fill and
    /// resolve to solid; a style without fill keywords leaves the shape unfilled.
    pub fn fill(&self) -> FillPattern {
        if self.is_invisible() {
            return FillPattern::None;
        }
        let mut fill = FillPattern::None;
        for keyword in &self.keywords {
            let pattern = match keyword.as_str() {
                "filled" => FillPattern::Solid,
                "striped" => FillPattern::HorizontalHatch,
                "vertical" => FillPattern::VerticalHatch,
                "wedged" | "crosshatch" => FillPattern::CrossHatch,
                "diagonals" | "hatched" => FillPattern::DiagonalHatch,
                "radial" => FillPattern::Solid,
                k if LINE_KEYWORDS.contains(&k) => continue,
                _ => FillPattern::Solid,
            };
            fill = pattern;
        }
        fill
    }
}

/// Pen for an outline or edge stroke from `color`, `style` and `penwidth`.
pub fn resolve_pen(color: &str, style: &StyleSet, pen_width: Option<f64>, default: Color) -> Pen {
    let width = pen_width
        .filter(|w| w.is_finite() && *w >= 0.0)
        .or_else(|| style.line_width())
        .unwrap_or(1.0);
    Pen {
        color: resolve_color(color, default),
        width,
        dash: style.dash(),
        visible: !style.is_invisible(),
    }
}

pub fn resolve_brush(fill_color: &str, style: &StyleSet, default: Color) -> Brush {
    Brush {
        color: resolve_color(fill_color, default),
        pattern: style.fill(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_hex() {
        assert_eq!(Color::parse("red"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse("Light Grey"), Some(Color::LIGHT_GREY));
        assert_eq!(Color::parse("#0f0"), Some(Color::rgb(0, 255, 0)));
        assert_eq!(Color::parse("#102030"), Some(Color::rgb(16, 32, 48)));
        assert_eq!(Color::parse("#10203080"), Some(Color::rgba(16, 32, 48, 128)));
        assert_eq!(Color::parse("red:blue"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse("0.0 1.0 1.0"), Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn unknown_color_falls_back_to_black() {
        assert_eq!(resolve_color("notacolor", Color::WHITE), Color::BLACK);
        assert_eq!(resolve_color("", Color::WHITE), Color::WHITE);
        assert_eq!(resolve_color("#12", Color::WHITE), Color::BLACK);
    }

    #[test]
    fn darker_by_twenty_percent() {
        assert_eq!(Color::rgb(240, 120, 60).darker(120), Color::rgb(200, 100, 50));
        assert_eq!(Color::WHITE.darker(100), Color::WHITE);
    }

    #[test]
    fn style_keywords_map_to_patterns() {
        assert_eq!(StyleSet::parse("dashed").dash(), DashPattern::Dash);
        assert_eq!(StyleSet::parse("dotted").dash(), DashPattern::Dot);
        assert_eq!(StyleSet::parse("").dash(), DashPattern::Solid);
        assert_eq!(StyleSet::parse("bold").line_width(), Some(2.0));
        assert_eq!(StyleSet::parse("setlinewidth(3)").line_width(), Some(3.0));
        assert!(StyleSet::parse("rounded, invis").is_invisible());
    }

    #[test]
    fn fill_resolution() {
        assert_eq!(StyleSet::parse("filled").fill(), FillPattern::Solid);
        assert_eq!(StyleSet::parse("rounded,filled").fill(), FillPattern::Solid);
        assert_eq!(StyleSet::parse("dashed").fill(), FillPattern::None);
        assert_eq!(StyleSet::parse("").fill(), FillPattern::None);
        assert_eq!(StyleSet::parse("striped").fill(), FillPattern::HorizontalHatch);
        assert_eq!(StyleSet::parse("diagonals").fill(), FillPattern::DiagonalHatch);
        assert_eq!(StyleSet::parse("sparkly").fill(), FillPattern::Solid);
        assert_eq!(StyleSet::parse("filled,invis").fill(), FillPattern::None);
    }

    #[test]
    fn pen_prefers_explicit_width() {
        let style = StyleSet::parse("bold,dashed");
        let pen = resolve_pen("blue", &style, Some(4.0), Color::BLACK);
        assert_eq!(pen.width, 4.0);
        assert_eq!(pen.dash, DashPattern::Dash);
        assert_eq!(pen.color, Color::rgb(0, 0, 255));
        assert!(pen.visible);
    }
}
