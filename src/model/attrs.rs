use serde::Serialize;
use std::fmt;

use super::{AttrTarget, GraphModel};
use crate::style::{Color, StyleSet, resolve_color};

/// Stored attribute value.
///
/// Values written as `<...>` are markup: the brackets are dropped and the body
/// is kept verbatim. Everything else is a plain string that the DOT writer
/// quotes and escapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttrValue {
    Text(String),
    Html(String),
}

impl AttrValue {
    /// Classifies raw user input: bracket-wrapped values become markup.
    pub fn parse(value: &str) -> Self {
        if value.len() >= 2 && value.starts_with('<') && value.ends_with('>') {
            AttrValue::Html(value[1..value.len() - 1].to_string())
        } else {
            AttrValue::Text(value.to_string())
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        AttrValue::Text(value.into())
    }

    pub fn html(value: impl Into<String>) -> Self {
        AttrValue::Html(value.into())
    }

    /// The stored body, without markup brackets.
    pub fn as_str(&self) -> &str {
        match self {
            AttrValue::Text(s) | AttrValue::Html(s) => s,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, AttrValue::Html(_))
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => f.write_str(s),
            AttrValue::Html(s) => write!(f, "<{s}>"),
        }
    }
}

/// Well-known attribute names read by the scene and the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Label,
    LabelLoc,
    XLabel,
    HeadLabel,
    TailLabel,
    Tooltip,
    Color,
    FillColor,
    FontColor,
    FontName,
    FontSize,
    Style,
    PenWidth,
    Shape,
    Sides,
    Peripheries,
    Width,
    Height,
    FixedSize,
    Dir,
    ArrowHead,
    ArrowTail,
    RankDir,
    NodeSep,
    RankSep,
    Root,
    Image,
}

impl Attr {
    pub const fn name(self) -> &'static str {
        match self {
            Attr::Label => "label",
            Attr::LabelLoc => "labelloc",
            Attr::XLabel => "xlabel",
            Attr::HeadLabel => "headlabel",
            Attr::TailLabel => "taillabel",
            Attr::Tooltip => "tooltip",
            Attr::Color => "color",
            Attr::FillColor => "fillcolor",
            Attr::FontColor => "fontcolor",
            Attr::FontName => "fontname",
            Attr::FontSize => "fontsize",
            Attr::Style => "style",
            Attr::PenWidth => "penwidth",
            Attr::Shape => "shape",
            Attr::Sides => "sides",
            Attr::Peripheries => "peripheries",
            Attr::Width => "width",
            Attr::Height => "height",
            Attr::FixedSize => "fixedsize",
            Attr::Dir => "dir",
            Attr::ArrowHead => "arrowhead",
            Attr::ArrowTail => "arrowtail",
            Attr::RankDir => "rankdir",
            Attr::NodeSep => "nodesep",
            Attr::RankSep => "ranksep",
            Attr::Root => "root",
            Attr::Image => "image",
        }
    }
}

/// Read-only typed accessors over one element's attributes.
#[derive(Clone, Copy)]
pub struct AttrView<'a> {
    model: &'a GraphModel,
    target: AttrTarget,
}

impl<'a> AttrView<'a> {
    pub(super) fn new(model: &'a GraphModel, target: AttrTarget) -> Self {
        Self { model, target }
    }

    pub fn value(&self, attr: Attr) -> Option<&'a AttrValue> {
        self.model.attr(self.target, attr.name())
    }

    /// Attribute body, empty when unset.
    pub fn text(&self, attr: Attr) -> &'a str {
        self.value(attr).map(AttrValue::as_str).unwrap_or("")
    }

    pub fn number(&self, attr: Attr) -> Option<f64> {
        self.value(attr).and_then(|v| v.as_str().trim().parse::<f64>().ok())
    }

    pub fn flag(&self, attr: Attr) -> bool {
        matches!(
            self.text(attr).trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "shape"
        )
    }

    pub fn style(&self) -> StyleSet {
        StyleSet::parse(self.text(Attr::Style))
    }

    pub fn color(&self, attr: Attr, default: Color) -> Color {
        resolve_color(self.text(attr), default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_values_are_markup() {
        assert_eq!(AttrValue::parse("<<b>Hi</b>>"), AttrValue::Html("<b>Hi</b>".into()));
        assert_eq!(AttrValue::parse("<b>Hi</b>"), AttrValue::Html("b>Hi</b".into()));
        assert_eq!(AttrValue::parse("Hi <b>"), AttrValue::Text("Hi <b>".into()));
        assert_eq!(AttrValue::parse("<"), AttrValue::Text("<".into()));
    }

    #[test]
    fn display_restores_brackets() {
        assert_eq!(AttrValue::html("x").to_string(), "<x>");
        assert_eq!(AttrValue::text("x").to_string(), "x");
    }
}
