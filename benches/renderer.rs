use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dot_scene::config::Config;
use dot_scene::engine::{DagreEngine, LayoutEngine};
use dot_scene::model::dot::parse_dot;
use dot_scene::paint::render_svg;
use dot_scene::scene::Scene;
use std::hint::black_box;

fn dense_graph_source(nodes: usize, extra_edges: usize) -> String {
    let mut out = String::from("digraph dense {\n");
    for i in 0..nodes {
        out.push_str(&format!("  n{} [label=\"Node {}\"];\n", i, i));
    }
    for i in 0..nodes.saturating_sub(1) {
        out.push_str(&format!("  n{} -> n{};\n", i, i + 1));
    }
    let mut count = 0usize;
    'outer: for i in 0..nodes {
        for j in (i + 2)..nodes {
            if count >= extra_edges {
                break 'outer;
            }
            out.push_str(&format!("  n{} -> n{};\n", i, j));
            count += 1;
        }
    }
    out.push_str("}\n");
    out
}

fn fixture(name: &str) -> &'static str {
    match name {
        "small" => include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/benches/fixtures/small.dot")),
        "clusters" => include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/benches/fixtures/clusters.dot"
        )),
        _ => panic!("unknown fixture"),
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.layout.fast_text_metrics = true;
    config
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for name in ["small", "clusters"] {
        let input = fixture(name);
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, data| {
            b.iter(|| {
                let model = parse_dot(black_box(data)).expect("parse failed");
                black_box(model.node_count());
            });
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let config = fast_config();
    let mut sources: Vec<(String, String)> = ["small", "clusters"]
        .iter()
        .map(|name| (name.to_string(), fixture(name).to_string()))
        .collect();
    for (nodes, extra_edges) in [(40usize, 80usize), (80, 240)] {
        sources.push((
            format!("dense_{}_{}", nodes, extra_edges),
            dense_graph_source(nodes, extra_edges),
        ));
    }
    for (name, source) in sources {
        let model = parse_dot(&source).expect("parse failed");
        group.bench_with_input(BenchmarkId::from_parameter(name), &model, |b, model| {
            let mut engine = DagreEngine::new(&config);
            b.iter(|| {
                let layout = engine.layout(black_box(model)).expect("layout failed");
                black_box(layout.nodes.len());
                engine.free_layout();
            });
        });
    }
    group.finish();
}

fn bench_scene_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_update");
    for name in ["small", "clusters"] {
        let mut scene = Scene::with_config("G", fast_config());
        scene.load_layout(fixture(name)).expect("load failed");
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                scene.apply_layout().expect("layout failed");
                black_box(scene.scene_rect());
            });
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let config = fast_config();
    for name in ["small", "clusters"] {
        let mut scene = Scene::with_config("G", config.clone());
        scene.load_layout(fixture(name)).expect("load failed");
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let svg = render_svg(black_box(&scene), &config.theme);
                black_box(svg.len());
            });
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    let config = fast_config();
    for name in ["small", "clusters"] {
        let input = fixture(name);
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, data| {
            b.iter(|| {
                let mut scene = Scene::with_config("G", config.clone());
                scene.load_layout(black_box(data)).expect("load failed");
                let svg = render_svg(&scene, &config.theme);
                black_box(svg.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_layout,
    bench_scene_update,
    bench_render,
    bench_end_to_end
);
criterion_main!(benches);
