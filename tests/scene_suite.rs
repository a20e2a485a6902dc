use dot_scene::config::{Config, SubgraphDiscovery};
use dot_scene::engine::{
    Bezier, BoundingBox, DagreEngine, EdgeGeometry, GraphLayout, LayoutEngine, LayoutError,
    NodeGeometry, ShapeDescriptor, SubgraphGeometry, TextLabel,
};
use dot_scene::geometry::{Point, Rect, Size, to_screen_point};
use dot_scene::items::{Icon, ItemRef};
use dot_scene::model::{AttrValue, GraphModel};
use dot_scene::paint::{DisplayList, PaintOp, render_svg};
use dot_scene::scene::{Scene, SceneError, SceneState};
use dot_scene::text::TextItem;
use std::fs;
use std::path::Path;

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(path).expect("fixture missing")
}

/// Lays nodes out on a row 100pt apart and routes every edge as a straight
/// cubic. Clusters get a box 10pt around their members.
struct RowEngine;

const ROW_Y: f64 = 60.0;

impl LayoutEngine for RowEngine {
    fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError> {
        let count = model.node_count().max(1) as f64;
        let mut layout = GraphLayout {
            bb: BoundingBox::new(Point::new(0.0, 0.0), Point::new(100.0 * count, 120.0)),
            ..GraphLayout::default()
        };
        if model.is_empty() {
            layout.bb = BoundingBox::default();
            return Ok(layout);
        }
        for (i, id) in model.nodes().enumerate() {
            let center = Point::new(50.0 + 100.0 * i as f64, ROW_Y);
            layout.nodes.insert(
                id,
                NodeGeometry {
                    center,
                    width: 0.5,
                    height: 0.5,
                    shape: Some(ShapeDescriptor {
                        sides: 2,
                        peripheries: 1,
                        vertices: vec![Point::new(-18.0, -18.0), Point::new(18.0, 18.0)],
                    }),
                    label: Some(TextLabel {
                        text: model.node_name(id).unwrap_or_default().to_string(),
                        html: false,
                        pos: center,
                        size: Size::new(20.0, 14.0),
                    }),
                    xlabel: None,
                },
            );
        }
        for id in model.edges() {
            let (tail, head) = model.edge_endpoints(id).expect("edge endpoints");
            let a = layout.nodes[&tail].center;
            let b = layout.nodes[&head].center;
            layout.edges.insert(
                id,
                EdgeGeometry {
                    splines: vec![Bezier {
                        points: vec![a, a.lerp(b, 0.3), a.lerp(b, 0.6), a.lerp(b, 0.9)],
                        start: None,
                        end: model.is_directed().then_some(b),
                    }],
                    label: Some(TextLabel {
                        text: "edge".to_string(),
                        html: false,
                        pos: a.lerp(b, 0.5),
                        size: Size::new(24.0, 14.0),
                    }),
                    ..EdgeGeometry::default()
                },
            );
        }
        for id in model.all_subgraphs() {
            if !model.is_cluster(id) {
                continue;
            }
            let members = model.subgraph_nodes(id);
            let xs: Vec<f64> = members
                .iter()
                .filter_map(|n| layout.nodes.get(n))
                .map(|n| n.center.x)
                .collect();
            let (Some(min), Some(max)) = (
                xs.iter().copied().reduce(f64::min),
                xs.iter().copied().reduce(f64::max),
            ) else {
                continue;
            };
            layout.subgraphs.insert(
                id,
                SubgraphGeometry {
                    bb: BoundingBox::new(
                        Point::new(min - 28.0, ROW_Y - 28.0),
                        Point::new(max + 28.0, ROW_Y + 28.0),
                    ),
                    label: None,
                },
            );
        }
        Ok(layout)
    }
}

struct BrokenEngine;

impl LayoutEngine for BrokenEngine {
    fn layout(&mut self, _model: &GraphModel) -> Result<GraphLayout, LayoutError> {
        Err(LayoutError::Engine {
            code: 1,
            message: "unsupported graph".to_string(),
        })
    }
}

/// Row layout with one spline stretched to five points and one node left
/// without a shape descriptor.
struct DamagedEngine;

impl LayoutEngine for DamagedEngine {
    fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError> {
        let mut layout = RowEngine.layout(model)?;
        let a = model.node_id("a").expect("node a");
        for (id, geometry) in layout.edges.iter_mut() {
            if model.edge_endpoints(*id).map(|(tail, _)| tail) != Some(a) {
                continue;
            }
            let spline = &mut geometry.splines[0];
            let last = *spline.points.last().expect("spline points");
            spline.points.push(last);
            spline.start = Some(spline.points[0]);
        }
        let c = model.node_id("c").expect("node c");
        if let Some(node) = layout.nodes.get_mut(&c) {
            node.shape = None;
        }
        Ok(layout)
    }
}

fn text_label(text: &str, pos: Point) -> TextLabel {
    TextLabel {
        text: text.to_string(),
        html: false,
        pos,
        size: Size::new(24.0, 14.0),
    }
}

/// Row layout whose edges carry only side, head and tail labels.
struct SideLabelEngine;

impl LayoutEngine for SideLabelEngine {
    fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError> {
        let mut layout = RowEngine.layout(model)?;
        for geometry in layout.edges.values_mut() {
            geometry.label = None;
            geometry.xlabel = Some(text_label("side", Point::new(100.0, 90.0)));
            geometry.head_label = Some(text_label("h", Point::new(140.0, 70.0)));
            geometry.tail_label = Some(text_label("t", Point::new(60.0, 70.0)));
        }
        Ok(layout)
    }
}

/// Row layout that captions every cluster at its box centre.
struct CaptionEngine;

impl LayoutEngine for CaptionEngine {
    fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError> {
        let mut layout = RowEngine.layout(model)?;
        for geometry in layout.subgraphs.values_mut() {
            let center = Point::new(
                (geometry.bb.ll.x + geometry.bb.ur.x) / 2.0,
                (geometry.bb.ll.y + geometry.bb.ur.y) / 2.0,
            );
            geometry.label = Some(text_label("Group", center));
        }
        Ok(layout)
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.layout.fast_text_metrics = true;
    config
}

fn row_scene() -> Scene {
    Scene::with_engine("G", Box::new(RowEngine), fast_config())
}

fn dagre_scene() -> Scene {
    let config = fast_config();
    Scene::with_engine("G", Box::new(DagreEngine::new(&config)), config)
}

fn painted(scene: &Scene) -> DisplayList {
    let mut list = DisplayList::new();
    scene.paint(&mut list, scene.scene_rect());
    list
}

#[test]
fn node_labels_fall_back_to_the_node_name() {
    let mut scene = row_scene();
    scene.load_layout(&fixture("labels.dot")).unwrap();
    let lines = |name: &str| scene.node_by_name(name).unwrap().label_lines().to_vec();
    assert_eq!(lines("plain"), vec!["plain"]);
    assert_eq!(lines("blank"), vec!["blank"]);
    assert_eq!(lines("placeholder"), vec!["placeholder"]);
    assert_eq!(lines("named"), vec!["Named node"]);
    assert_eq!(lines("escaped"), vec!["graph labels node escaped"]);
    let markup = scene.node_by_name("markup").unwrap();
    assert!(markup.is_html_label());
    assert_eq!(markup.label_text(), "bold text");
}

#[test]
fn invisible_items_paint_nothing_but_keep_geometry() {
    let mut scene = row_scene();
    scene.load_layout(&fixture("invisible.dot")).unwrap();
    assert_eq!(scene.nodes().len(), 3);
    assert_eq!(scene.edges().len(), 2);
    for node in scene.nodes() {
        assert!(node.is_invisible());
        assert!(node.bounding_rect().is_valid());
    }
    assert!(scene.edges().iter().all(|e| !e.path().is_empty()));
    assert!(scene.scene_rect().is_valid());
    assert_eq!(painted(&scene).visible_ops().count(), 0);
    // hidden items are still there for hit tests
    let center = scene.node_by_name("a").unwrap().footprint().center();
    assert!(scene.item_at(center).is_some());
}

#[test]
fn y_flip_is_its_own_inverse() {
    let h = 321.5;
    for p in [Point::new(0.0, 0.0), Point::new(12.5, -4.0), Point::new(99.0, 321.5)] {
        assert_eq!(to_screen_point(to_screen_point(p, h), h), p);
    }
}

#[test]
fn nodes_are_placed_in_screen_space() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a; b }").unwrap();
    let a = scene.node_by_name("a").unwrap();
    // 0.5in at 72dpi around (50, 120 - 60)
    assert_eq!(a.size(), Size::new(36.0, 36.0));
    assert_eq!(a.pos(), Point::new(32.0, 42.0));
    assert_eq!(a.footprint().center(), Point::new(50.0, 60.0));
}

#[test]
fn serialized_graph_loads_back_identically() {
    let mut scene = row_scene();
    let a = scene.add_node("Alpha", Some("a")).unwrap();
    let b = scene.add_node("<<i>Beta</i>>", Some("b")).unwrap();
    let e = scene.add_edge(a, b, "link").unwrap();
    scene.edge_mut(e).unwrap().set_attribute("color", "red");
    let cluster = scene.add_subgraph("group", true).unwrap();
    scene.subgraph_mut(cluster).unwrap().add_existing_node(b);
    scene.set_graph_attribute("rankdir", "LR");
    scene.apply_layout().unwrap();

    let dot = scene.to_dot();
    let mut copy = row_scene();
    copy.load_layout(&dot).unwrap();

    assert_eq!(copy.nodes().len(), 2);
    assert_eq!(copy.edges().len(), 1);
    assert_eq!(copy.subgraphs().len(), 1);
    assert_eq!(copy.subgraphs()[0].name(), "cluster_group");
    assert_eq!(copy.graph_attribute("rankdir").as_deref(), Some("LR"));
    let copied_b = copy.node_by_name("b").unwrap().id();
    let node = copy.node_mut(copied_b).unwrap();
    assert_eq!(node.raw_attribute("label"), Some(&AttrValue::Html("<i>Beta</i>".to_string())));
    let edge = copy.edges()[0].id();
    assert_eq!(copy.edge_mut(edge).unwrap().label().as_deref(), Some("link"));
    assert_eq!(copy.edge_mut(edge).unwrap().attribute("color").as_deref(), Some("red"));
    assert_eq!(copy.to_dot(), dot);
}

#[test]
fn backslashes_in_values_load_back_unchanged() {
    let mut scene = row_scene();
    let a = scene.add_node("", Some("a")).unwrap();
    let b = scene.add_node(r#"say \"hi\""#, Some("b")).unwrap();
    scene.node_mut(a).unwrap().set_attribute("tooltip", r"C:\dir\");
    scene.node_mut(b).unwrap().set_attribute("tooltip", r"\N at \\share");
    scene.apply_layout().unwrap();

    let dot = scene.to_dot();
    let mut copy = row_scene();
    copy.load_layout(&dot).unwrap();
    assert_eq!(copy.node_by_name("a").unwrap().tooltip(), r"C:\dir\");
    let b = copy.node_by_name("b").unwrap().id();
    let node = copy.node_mut(b).unwrap();
    assert_eq!(node.attribute("tooltip").as_deref(), Some(r"\N at \\share"));
    assert_eq!(node.label().as_deref(), Some(r#"say \"hi\""#));
    assert_eq!(copy.to_dot(), dot);
}

#[test]
fn damaged_geometry_keeps_the_rest_of_the_scene() {
    let mut scene = Scene::with_engine("G", Box::new(DamagedEngine), fast_config());
    scene.load_layout("digraph { a -> b; b -> c }").unwrap();
    assert_eq!(scene.state(), SceneState::LaidOut);

    let a = scene.node_by_name("a").unwrap().id();
    let (bad, good): (Vec<_>, Vec<_>) = scene.edges().iter().partition(|e| e.tail() == a);
    assert_eq!((bad.len(), good.len()), (1, 1));
    assert!(bad[0].path().is_empty());
    assert!(bad[0].head_arrow().is_empty());
    assert!(bad[0].tail_arrow().is_empty());
    assert!(!good[0].path().is_empty());
    assert!(!good[0].head_arrow().is_empty());

    assert_eq!(scene.nodes().len(), 3);
    let c = scene.node_by_name("c").unwrap();
    assert!(c.path().is_empty());
    assert_eq!(c.size(), Size::new(36.0, 36.0));
    assert!(!scene.node_by_name("b").unwrap().path().is_empty());

    scene.apply_layout().unwrap();
    assert_eq!(scene.state(), SceneState::LaidOut);
}

#[test]
fn edge_labels_sit_at_their_reported_centres() {
    let mut scene = Scene::with_engine("G", Box::new(SideLabelEngine), fast_config());
    scene.load_layout("digraph { a -> b }").unwrap();
    let edge = &scene.edges()[0];
    let close = |item: Option<&TextItem>, expected: Point| {
        let item = item.expect("label item");
        assert!(item.is_visible());
        let center = item.bounding_rect().center();
        assert!(center.distance_to(expected) < 1e-9, "{center:?} != {expected:?}");
        item.lines().to_vec()
    };
    // graph height is 120, so engine y flips to 120 - y
    assert_eq!(close(edge.label(), Point::new(100.0, 30.0)), vec!["side"]);
    assert_eq!(close(edge.head_label(), Point::new(140.0, 50.0)), vec!["h"]);
    assert_eq!(close(edge.tail_label(), Point::new(60.0, 50.0)), vec!["t"]);
}

#[test]
fn cluster_caption_hangs_from_the_top_edge() {
    let mut scene = Scene::with_engine("G", Box::new(CaptionEngine), fast_config());
    scene.load_layout("digraph { subgraph cluster_x { a; b } }").unwrap();
    let cluster = scene.subgraphs().iter().find(|s| s.is_cluster()).unwrap();
    let rect = cluster.rect();
    let caption = cluster.label();
    assert!(caption.is_visible());
    assert_eq!(caption.lines(), ["Group"]);
    let bounds = caption.bounding_rect();
    assert!((bounds.top() - rect.top()).abs() < 1e-9);
    assert!((bounds.center().x - rect.center().x).abs() < 1e-9);
    assert!(bounds.center().y < rect.center().y);
}

fn wide_png() -> Vec<u8> {
    #[cfg(feature = "png")]
    {
        resvg::tiny_skia::Pixmap::new(4, 2).unwrap().encode_png().unwrap()
    }
    #[cfg(not(feature = "png"))]
    {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }
}

#[test]
fn icon_nodes_split_caption_and_picture() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a }").unwrap();
    let a = scene.node_by_name("a").unwrap().id();
    scene.node_mut(a).unwrap().set_icon(Icon::from_png(wide_png()).unwrap());

    let list = painted(&scene);
    let image = list
        .ops
        .iter()
        .find_map(|op| match op {
            PaintOp::Image { rect, size } => Some((*rect, *size)),
            _ => None,
        })
        .expect("icon painted");
    let text = list
        .ops
        .iter()
        .find_map(|op| match op {
            PaintOp::Text { rect, lines, .. } if lines == &["a"] => Some(*rect),
            _ => None,
        })
        .expect("caption painted");

    let (rect, size) = image;
    assert_eq!(size, (4, 2));
    // footprint (32, 42, 36, 36) less a 2pt margin; the icon gets the lower third
    let area = Rect::new(34.0, 44.0, 32.0, 32.0);
    assert!((rect.width / rect.height - 2.0).abs() < 1e-9);
    assert!((rect.height - area.height / 3.0).abs() < 1e-9);
    assert!((rect.center().x - area.center().x).abs() < 1e-9);
    assert!(rect.top() >= area.top() + area.height * 2.0 / 3.0 - 1e-9);
    assert!(rect.bottom() <= area.bottom() + 1e-9);
    assert!(text.center().y < rect.top());
}

#[test]
fn deleting_a_node_removes_its_edges() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a -> b; b -> c; c -> a; c -> d }").unwrap();
    let c = scene.node_by_name("c").unwrap().id();
    assert!(scene.delete_node(c));
    assert_eq!(scene.nodes().len(), 3);
    assert_eq!(scene.edges().len(), 1);
    assert_eq!(scene.model().edge_count(), 1);
    scene.apply_layout().unwrap();
    assert!(scene.edges().iter().all(|e| e.tail() != c && e.head() != c));
}

#[test]
fn empty_graph_has_an_empty_scene_rect() {
    let mut scene = row_scene();
    scene.load_layout("digraph empty {}").unwrap();
    assert_eq!(scene.state(), SceneState::LaidOut);
    assert!(scene.nodes().is_empty());
    assert!(scene.scene_rect().is_empty());
    assert_eq!(painted(&scene).visible_ops().count(), 0);
}

#[test]
fn end_arrow_sits_on_the_head_only() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a -> b }").unwrap();
    let edge = &scene.edges()[0];
    assert!(!edge.head_arrow().is_empty());
    assert!(edge.tail_arrow().is_empty());
    let tip = Point::new(150.0, 60.0);
    assert!(edge.head_arrow().points().iter().any(|p| p.distance_to(tip) < 1e-6));

    let mut undirected = row_scene();
    undirected.load_layout("graph { a -- b }").unwrap();
    let edge = &undirected.edges()[0];
    assert!(edge.head_arrow().is_empty());
    assert!(edge.tail_arrow().is_empty());
}

#[test]
fn clusters_enclose_their_nodes() {
    let mut scene = row_scene();
    scene.load_layout(&fixture("nested.dot")).unwrap();
    let outer = scene
        .subgraphs()
        .iter()
        .find(|s| s.name() == "cluster_outer")
        .unwrap();
    for name in ["a", "b", "c"] {
        let node = scene.node_by_name(name).unwrap();
        assert!(outer.rect().strictly_contains(&node.footprint()), "{name}");
    }
}

#[test]
fn dagre_clusters_enclose_their_nodes() {
    let mut scene = dagre_scene();
    scene.load_layout(&fixture("nested.dot")).unwrap();
    for sub in scene.subgraphs().iter().filter(|s| s.is_cluster()) {
        let members = scene.model().subgraph_nodes(sub.id()).to_vec();
        assert!(!members.is_empty());
        for id in members {
            let node = scene.node(id).unwrap();
            assert!(sub.rect().strictly_contains(&node.footprint()), "{}", node.name());
        }
    }
}

#[test]
fn markup_and_literal_values_are_stored_differently() {
    let mut scene = row_scene();
    let n = scene.add_node("", Some("n")).unwrap();
    let mut node = scene.node_mut(n).unwrap();
    node.set_attribute("label", "<b>x</b>");
    let markup = node.raw_attribute("label").cloned().unwrap();
    assert_eq!(node.attribute("label").as_deref(), Some("<<b>x</b>>"));
    node.set_attribute("label", "b x");
    let literal = node.raw_attribute("label").cloned().unwrap();
    assert!(markup.is_html());
    assert!(!literal.is_html());
    assert_ne!(markup, literal);
}

#[test]
fn subgraph_discovery_depth_is_configurable() {
    let mut deep = row_scene();
    deep.load_layout(&fixture("nested.dot")).unwrap();
    let mut names: Vec<&str> = deep.subgraphs().iter().map(|s| s.name()).collect();
    names.sort();
    assert_eq!(names, vec!["cluster_inner", "cluster_outer", "ranks"]);

    let mut config = fast_config();
    config.layout.subgraph_discovery = SubgraphDiscovery::ImmediateOnly;
    let mut shallow = Scene::with_engine("G", Box::new(RowEngine), config);
    shallow.load_layout(&fixture("nested.dot")).unwrap();
    let mut names: Vec<&str> = shallow.subgraphs().iter().map(|s| s.name()).collect();
    names.sort();
    assert_eq!(names, vec!["cluster_outer", "ranks"]);
}

#[test]
fn unparsable_input_leaves_an_empty_scene() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a -> b }").unwrap();
    let err = scene.load_layout("digraph { a -> ").unwrap_err();
    assert!(matches!(err, SceneError::Parse(_)));
    assert_eq!(scene.state(), SceneState::Empty);
    assert!(scene.nodes().is_empty());
    assert!(scene.model().is_empty());
}

#[test]
fn engine_failure_is_reported() {
    let mut scene = Scene::with_engine("G", Box::new(BrokenEngine), fast_config());
    let err = scene.load_layout("digraph { a }").unwrap_err();
    assert!(matches!(err, SceneError::Layout(LayoutError::Engine { code: 1, .. })));
    assert_eq!(scene.state(), SceneState::Loaded);
    assert_eq!(scene.nodes().len(), 1);
}

#[test]
fn selection_changes_how_items_paint() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a [style=filled, fillcolor=\"#808080\"]; a -> b }").unwrap();
    let a = scene.node_by_name("a").unwrap().id();
    let fill_of = |list: &DisplayList| {
        list.ops.iter().find_map(|op| match op {
            PaintOp::Path { brush, .. } if brush.is_visible() => Some(brush.color),
            _ => None,
        })
    };
    let before = fill_of(&painted(&scene)).unwrap();
    scene.set_selected(ItemRef::Node(a), true);
    let after = fill_of(&painted(&scene)).unwrap();
    assert_ne!(before, after);
    assert_eq!(scene.selected_items(), vec![ItemRef::Node(a)]);
    scene.clear_selection();
    assert!(scene.selected_items().is_empty());
}

#[test]
fn missing_icons_are_skipped() {
    let mut scene = row_scene();
    scene.load_layout("digraph { a [image=\"does-not-exist.png\"]; b }").unwrap();
    assert_eq!(scene.load_icons(Path::new(env!("CARGO_MANIFEST_DIR"))), 0);
    assert!(scene.nodes().iter().all(|n| n.icon().is_none()));
}

#[test]
fn dagre_scene_renders_to_svg() {
    let mut scene = dagre_scene();
    scene
        .load_layout(
            r#"digraph flow {
                label="Flow";
                start -> check;
                check -> done [label="ok"];
                check -> start [label="retry", style=dashed];
                subgraph cluster_tail { label="tail"; done; }
            }"#,
        )
        .unwrap();
    assert_eq!(scene.state(), SceneState::LaidOut);
    let rect: Rect = scene.scene_rect();
    assert!(rect.is_valid() && !rect.is_empty());
    assert!(scene.graph_label().is_some_and(|l| l.is_visible()));
    for node in scene.nodes() {
        assert!(rect.contains_point(node.footprint().center()));
    }

    let svg = render_svg(&scene, &scene.config().theme);
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("Flow"));
    assert!(svg.contains("retry"));
    assert!(svg.contains("stroke-dasharray"));
    assert!(svg.contains(">tail<"));
}
