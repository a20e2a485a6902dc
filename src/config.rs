use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which subgraphs `Scene::load_layout` wraps in scene items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubgraphDiscovery {
    /// Every subgraph at any depth.
    #[default]
    Recursive,
    /// Only subgraphs directly under the root graph.
    ImmediateOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Points per inch for node sizes.
    pub dpi: f64,
    /// Default `nodesep`, points.
    pub node_sep: f64,
    /// Default `ranksep`, points.
    pub rank_sep: f64,
    pub margin: f64,
    pub cluster_padding: f64,
    /// Inches.
    pub default_node_width: f64,
    /// Inches.
    pub default_node_height: f64,
    /// Space around a label inside its node, points.
    pub label_margin_x: f64,
    pub label_margin_y: f64,
    pub label_line_height: f64,
    pub arrow_length: f64,
    pub self_loop_size: f64,
    pub parallel_edge_gap: f64,
    pub fast_text_metrics: bool,
    pub subgraph_discovery: SubgraphDiscovery,
    /// `Color::darker` factor for selected items; 120 is 20% darker.
    pub selection_darken: u32,
    pub grid_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dpi: 72.0,
            node_sep: 18.0,
            rank_sep: 36.0,
            margin: 8.0,
            cluster_padding: 8.0,
            default_node_width: 0.75,
            default_node_height: 0.5,
            label_margin_x: 8.0,
            label_margin_y: 4.0,
            label_line_height: 1.2,
            arrow_length: 10.0,
            self_loop_size: 18.0,
            parallel_edge_gap: 10.0,
            fast_text_metrics: false,
            subgraph_discovery: SubgraphDiscovery::Recursive,
            selection_darken: 120,
            grid_spacing: 25.0,
        }
    }
}

impl LayoutConfig {
    pub fn text_metrics(&self) -> crate::text::TextMetrics {
        crate::text::TextMetrics {
            fast: self.fast_text_metrics,
            line_height: self.label_line_height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
    pub background: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            background: "white".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        let theme = Theme::graphviz_default();
        let render = RenderConfig {
            background: theme.background.clone(),
            ..Default::default()
        };
        Self {
            theme,
            layout: LayoutConfig::default(),
            render,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<NumberOrString>,
    text_color: Option<String>,
    line_color: Option<String>,
    fill_color: Option<String>,
    cluster_fill: Option<String>,
    grid_color: Option<String>,
    background: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(val) => Some(*val),
            NumberOrString::String(val) => val.trim().trim_end_matches("px").parse::<f64>().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    dpi: Option<f64>,
    node_sep: Option<f64>,
    rank_sep: Option<f64>,
    margin: Option<f64>,
    cluster_padding: Option<f64>,
    default_node_width: Option<f64>,
    default_node_height: Option<f64>,
    label_line_height: Option<f64>,
    arrow_length: Option<f64>,
    fast_text_metrics: Option<bool>,
    subgraph_discovery: Option<SubgraphDiscovery>,
    selection_darken: Option<u32>,
    grid_spacing: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    background: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutConfigFile>,
    render: Option<RenderConfigFile>,
}

/// Loads a JSON (or, for `.json5` files, JSON5) config and merges it over the
/// defaults. No path means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    let is_json5 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json5"));
    parse_config(&contents, is_json5)
}

pub fn parse_config(contents: &str, json5_syntax: bool) -> anyhow::Result<Config> {
    let parsed: ConfigFile = if json5_syntax {
        json5::from_str(contents)?
    } else {
        serde_json::from_str(contents)?
    };

    let mut config = Config::default();
    if let Some(theme_name) = parsed.theme.as_deref() {
        match Theme::by_name(theme_name) {
            Some(theme) => config.theme = theme,
            None => tracing::warn!(theme = theme_name, "unknown theme, keeping default"),
        }
        config.render.background = config.theme.background.clone();
    }

    if let Some(vars) = parsed.theme_variables {
        if let Some(v) = vars.font_family {
            config.theme.font_family = v;
        }
        if let Some(v) = vars.font_size.as_ref().and_then(NumberOrString::as_f64) {
            config.theme.font_size = v;
        }
        if let Some(v) = vars.text_color {
            config.theme.text_color = v;
        }
        if let Some(v) = vars.line_color {
            config.theme.line_color = v;
        }
        if let Some(v) = vars.fill_color {
            config.theme.fill_color = v;
        }
        if let Some(v) = vars.cluster_fill {
            config.theme.cluster_fill = v;
        }
        if let Some(v) = vars.grid_color {
            config.theme.grid_color = v;
        }
        if let Some(v) = vars.background {
            config.render.background = v.clone();
            config.theme.background = v;
        }
    }

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.dpi {
            target.dpi = v;
        }
        if let Some(v) = layout.node_sep {
            target.node_sep = v;
        }
        if let Some(v) = layout.rank_sep {
            target.rank_sep = v;
        }
        if let Some(v) = layout.margin {
            target.margin = v;
        }
        if let Some(v) = layout.cluster_padding {
            target.cluster_padding = v;
        }
        if let Some(v) = layout.default_node_width {
            target.default_node_width = v;
        }
        if let Some(v) = layout.default_node_height {
            target.default_node_height = v;
        }
        if let Some(v) = layout.label_line_height {
            target.label_line_height = v;
        }
        if let Some(v) = layout.arrow_length {
            target.arrow_length = v;
        }
        if let Some(v) = layout.fast_text_metrics {
            target.fast_text_metrics = v;
        }
        if let Some(v) = layout.subgraph_discovery {
            target.subgraph_discovery = v;
        }
        if let Some(v) = layout.selection_darken {
            target.selection_darken = v;
        }
        if let Some(v) = layout.grid_spacing {
            target.grid_spacing = v;
        }
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.width {
            config.render.width = v;
        }
        if let Some(v) = render.height {
            config.render.height = v;
        }
        if let Some(v) = render.background {
            config.render.background = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_partial_json_over_defaults() {
        let config = parse_config(
            r#"{"theme":"modern","themeVariables":{"fontSize":"16px"},"layout":{"rankSep":50,"subgraphDiscovery":"immediateOnly"}}"#,
            false,
        )
        .unwrap();
        assert_eq!(config.theme.font_family, Theme::modern().font_family);
        assert_eq!(config.theme.font_size, 16.0);
        assert_eq!(config.layout.rank_sep, 50.0);
        assert_eq!(config.layout.node_sep, LayoutConfig::default().node_sep);
        assert_eq!(config.layout.subgraph_discovery, SubgraphDiscovery::ImmediateOnly);
    }

    #[test]
    fn accepts_json5_syntax() {
        let config = parse_config(
            "{ layout: { fastTextMetrics: true, }, // trailing comma\n render: { width: 640 } }",
            true,
        )
        .unwrap();
        assert!(config.layout.fast_text_metrics);
        assert_eq!(config.render.width, 640.0);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_config("{ layout: ", false).is_err());
    }
}
