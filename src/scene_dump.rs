use crate::scene::{Scene, SceneState};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// JSON snapshot of a scene's screen-space geometry.
#[derive(Debug, Serialize)]
pub struct SceneDump {
    pub name: String,
    pub directed: bool,
    pub state: SceneState,
    pub bounds: [f64; 4],
    pub graph_label: Option<LabelDump>,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub subgraphs: Vec<SubgraphDump>,
}

#[derive(Debug, Serialize)]
pub struct LabelDump {
    pub lines: Vec<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub path: String,
    pub label_lines: Vec<String>,
    pub xlabel: Option<LabelDump>,
    pub tooltip: String,
    pub has_icon: bool,
    pub hidden: bool,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub from: String,
    pub to: String,
    pub path: String,
    pub head_arrow: Vec<[f64; 2]>,
    pub tail_arrow: Vec<[f64; 2]>,
    pub label: Option<LabelDump>,
    pub head_label: Option<LabelDump>,
    pub tail_label: Option<LabelDump>,
    pub hidden: bool,
}

#[derive(Debug, Serialize)]
pub struct SubgraphDump {
    pub id: String,
    pub cluster: bool,
    pub nodes: Vec<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: Option<LabelDump>,
}

fn label_dump(item: &crate::text::TextItem) -> LabelDump {
    let rect = item.bounding_rect();
    LabelDump {
        lines: item.lines().to_vec(),
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
        visible: item.is_visible(),
    }
}

fn polygon_points(polygon: &crate::geometry::Polygon) -> Vec<[f64; 2]> {
    polygon.points().iter().map(|p| [p.x, p.y]).collect()
}

impl SceneDump {
    pub fn from_scene(scene: &Scene) -> Self {
        let model = scene.model();
        let name_of = |id| model.node_name(id).unwrap_or_default().to_string();

        let nodes = scene
            .nodes()
            .iter()
            .map(|node| NodeDump {
                id: node.name().to_string(),
                x: node.pos().x,
                y: node.pos().y,
                width: node.size().width,
                height: node.size().height,
                path: node.path().translated(node.pos()).to_svg_data(),
                label_lines: node.label_lines().to_vec(),
                xlabel: node.xlabel().map(label_dump),
                tooltip: node.tooltip().to_string(),
                has_icon: node.icon().is_some(),
                hidden: node.is_invisible(),
            })
            .collect();

        let edges = scene
            .edges()
            .iter()
            .map(|edge| EdgeDump {
                from: name_of(edge.tail()),
                to: name_of(edge.head()),
                path: edge.path().to_svg_data(),
                head_arrow: polygon_points(edge.head_arrow()),
                tail_arrow: polygon_points(edge.tail_arrow()),
                label: edge.label().map(label_dump),
                head_label: edge.head_label().map(label_dump),
                tail_label: edge.tail_label().map(label_dump),
                hidden: edge.is_invisible(),
            })
            .collect();

        let subgraphs = scene
            .subgraphs()
            .iter()
            .map(|sub| {
                let rect = sub.rect();
                SubgraphDump {
                    id: sub.name().to_string(),
                    cluster: sub.is_cluster(),
                    nodes: model
                        .subgraph_nodes(sub.id())
                        .iter()
                        .map(|id| name_of(*id))
                        .collect(),
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                    label: Some(sub.label())
                        .filter(|l| !l.lines().is_empty())
                        .map(label_dump),
                }
            })
            .collect();

        let bounds = scene.scene_rect();
        SceneDump {
            name: model.name().to_string(),
            directed: model.is_directed(),
            state: scene.state(),
            bounds: [bounds.x, bounds.y, bounds.width, bounds.height],
            graph_label: scene.graph_label().map(label_dump),
            nodes,
            edges,
            subgraphs,
        }
    }
}

pub fn write_scene_dump(path: &Path, scene: &Scene) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = SceneDump::from_scene(scene);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
