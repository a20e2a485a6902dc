//! Scene items: the visual counterparts of nodes, edges and subgraphs.
//!
//! Each item caches screen-space geometry and paint state. `update_layout`
//! rebuilds that cache from the model attributes and the engine output;
//! `paint` only reads the cache.

pub mod edge;
pub mod node;
pub mod subgraph;

use serde::Serialize;

use crate::config::LayoutConfig;
use crate::engine::{GraphLayout, TextLabel};
use crate::geometry::to_screen_point;
use crate::model::{Attr, AttrView, EdgeId, GraphModel, NodeId, SubgraphId};
use crate::style::{Color, resolve_color};
use crate::text::{Font, TextItem, TextMetrics};
use crate::theme::Theme;

pub use edge::Edge;
pub use node::{Icon, IconError, Node};
pub use subgraph::Subgraph;

/// Which scene member a hit or an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id")]
pub enum ItemRef {
    Node(NodeId),
    Edge(EdgeId),
    Subgraph(SubgraphId),
    GraphLabel,
}

/// Fallback colours for attributes the graph leaves unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub line: Color,
    pub fill: Color,
    pub cluster_fill: Color,
    pub text: Color,
    pub grid: Color,
}

impl Palette {
    pub fn from_theme(theme: &Theme) -> Self {
        Self {
            line: resolve_color(&theme.line_color, Color::BLACK),
            fill: resolve_color(&theme.fill_color, Color::LIGHT_GREY),
            cluster_fill: resolve_color(&theme.cluster_fill, Color::TRANSPARENT),
            text: resolve_color(&theme.text_color, Color::BLACK),
            grid: resolve_color(&theme.grid_color, Color::LIGHT_GREY),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_theme(&Theme::default())
    }
}

/// Everything an item reads while rebuilding its cache.
pub struct UpdateContext<'a> {
    pub model: &'a GraphModel,
    pub layout: &'a GraphLayout,
    pub dpi: f64,
    pub metrics: TextMetrics,
    pub base_font: &'a Font,
    pub palette: &'a Palette,
    pub selection_darken: u32,
}

impl<'a> UpdateContext<'a> {
    pub fn new(
        model: &'a GraphModel,
        layout: &'a GraphLayout,
        config: &LayoutConfig,
        base_font: &'a Font,
        palette: &'a Palette,
    ) -> Self {
        Self {
            model,
            layout,
            dpi: if config.dpi > 0.0 {
                config.dpi
            } else {
                crate::geometry::DOT_DEFAULT_DPI
            },
            metrics: config.text_metrics(),
            base_font,
            palette,
            selection_darken: config.selection_darken,
        }
    }

    pub fn graph_height(&self) -> f64 {
        self.layout.height()
    }

    pub fn font(&self, view: &AttrView<'_>) -> Font {
        Font::from_attrs(
            self.base_font,
            view.text(Attr::FontName),
            view.number(Attr::FontSize),
            view.text(Attr::FontColor),
        )
    }
}

/// Shows `slot` at the engine-reported centre of `label`, creating the text
/// item on first use. An absent label hides an existing item.
pub(crate) fn place_label(
    slot: &mut Option<TextItem>,
    label: Option<&TextLabel>,
    font: &Font,
    ctx: &UpdateContext<'_>,
    visible: bool,
) {
    match label {
        Some(label) => {
            let item = slot.get_or_insert_with(|| TextItem::new(font.clone()));
            item.set_font(font.clone());
            item.set_text(&label.text, label.html, &ctx.metrics);
            item.move_center(to_screen_point(label.pos, ctx.graph_height()));
            item.set_visible(visible && !label.text.is_empty());
        }
        None => {
            if let Some(item) = slot {
                item.hide();
            }
        }
    }
}
