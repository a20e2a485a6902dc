use serde::{Deserialize, Serialize};

/// Colours and fonts used where the graph itself does not specify any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f64,
    pub text_color: String,
    pub line_color: String,
    pub fill_color: String,
    pub cluster_fill: String,
    pub grid_color: String,
    pub background: String,
}

impl Theme {
    /// Matches Graphviz's own defaults.
    pub fn graphviz_default() -> Self {
        Self {
            font_family: "Times-Roman".to_string(),
            font_size: 14.0,
            text_color: "black".to_string(),
            line_color: "black".to_string(),
            fill_color: "lightgrey".to_string(),
            cluster_fill: "transparent".to_string(),
            grid_color: "#D3D3D3".to_string(),
            background: "white".to_string(),
        }
    }

    pub fn modern() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, sans-serif".to_string(),
            font_size: 13.0,
            text_color: "#1C2430".to_string(),
            line_color: "#7A8AA6".to_string(),
            fill_color: "#EEF2F8".to_string(),
            cluster_fill: "#F7FAFF".to_string(),
            grid_color: "#E4E9F2".to_string(),
            background: "#FFFFFF".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "modern" => Some(Self::modern()),
            "default" | "graphviz" | "base" => Some(Self::graphviz_default()),
            _ => None,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::graphviz_default()
    }
}
