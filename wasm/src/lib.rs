use dot_scene::config::{Config, SubgraphDiscovery};
use dot_scene::paint::render_svg;
use dot_scene::scene::Scene;
use dot_scene::theme::Theme;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DotRenderOptions {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f64>,
    fast_text: Option<bool>,
    grid: Option<bool>,
    shallow_subgraphs: Option<bool>,
}

fn build_config(options: &DotRenderOptions) -> Config {
    let mut config = Config::default();
    if let Some(theme) = options.theme.as_deref().and_then(Theme::by_name) {
        config.render.background = theme.background.clone();
        config.theme = theme;
    }
    if let Some(font_family) = &options.font_family {
        config.theme.font_family = font_family.clone();
    }
    if let Some(font_size) = options.font_size {
        config.theme.font_size = font_size;
    }
    // system font lookup is unavailable in the browser
    config.layout.fast_text_metrics = options.fast_text.unwrap_or(true);
    if options.shallow_subgraphs == Some(true) {
        config.layout.subgraph_discovery = SubgraphDiscovery::ImmediateOnly;
    }
    config
}

fn render(code: &str, options: &DotRenderOptions) -> Result<String, String> {
    let config = build_config(options);
    let mut scene = Scene::with_config("G", config.clone());
    scene.set_draw_background_grid(options.grid.unwrap_or(false));
    scene.load_layout(code).map_err(|error| error.to_string())?;
    Ok(render_svg(&scene, &config.theme))
}

#[wasm_bindgen]
pub fn render_dot_svg(code: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<DotRenderOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        DotRenderOptions::default()
    };

    render(code, &options).map_err(|error| JsValue::from_str(&error))
}

#[cfg(test)]
mod tests {
    use crate::{DotRenderOptions, render};

    #[test]
    fn renders_graph_with_edge_labels_and_cluster() {
        let code = r#"digraph G {
    start -> decide;
    decide -> work [label="yes"];
    decide -> stop [label="no"];
    subgraph cluster_loop {
        label="Loop";
        one -> two -> three -> one;
    }
    stop -> one;
}"#;

        let svg = render(code, &DotRenderOptions::default()).expect("graph should render");

        assert!(svg.contains("<svg"));
        assert!(svg.contains("yes"));
        assert!(svg.contains("Loop"));
    }

    #[test]
    fn reports_parse_errors() {
        assert!(render("digraph {", &DotRenderOptions::default()).is_err());
    }
}
