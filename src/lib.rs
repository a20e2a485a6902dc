#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod items;
pub mod model;
pub mod paint;
pub mod scene;
pub mod scene_dump;
pub mod style;
pub mod text;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, SubgraphDiscovery};
pub use engine::{DagreEngine, LayoutEngine};
pub use items::ItemRef;
pub use paint::render_svg;
pub use scene::{Scene, SceneError, SceneEvent, SceneState};
