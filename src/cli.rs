use crate::config::{Config, SubgraphDiscovery, load_config};
use crate::paint::{render_svg, write_output_png, write_output_svg};
use crate::scene::Scene;
use crate::scene_dump::write_scene_dump;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dotscene", version, about = "Lay out Graphviz DOT graphs and render the scene as SVG or PNG")]
pub struct Args {
    /// Input file (.dot/.gv, or Markdown with ```dot fences) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config file (.json or .json5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Width
    #[arg(short = 'w', long = "width", default_value_t = 1200.0)]
    pub width: f32,

    /// Height
    #[arg(short = 'H', long = "height", default_value_t = 800.0)]
    pub height: f32,

    /// Draw the background grid
    #[arg(long = "grid")]
    pub grid: bool,

    /// Write the laid-out scene geometry as JSON
    #[arg(long = "dump-layout")]
    pub dump_layout: Option<PathBuf>,

    /// Only build items for top-level subgraphs
    #[arg(long = "shallow-subgraphs")]
    pub shallow_subgraphs: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    config.render.width = args.width;
    config.render.height = args.height;
    if args.shallow_subgraphs {
        config.layout.subgraph_discovery = SubgraphDiscovery::ImmediateOnly;
    }

    let (input, is_markdown) = read_input(args.input.as_deref())?;
    let graphs = if is_markdown {
        extract_dot_blocks(&input)
    } else {
        vec![input]
    };

    if graphs.is_empty() {
        return Err(anyhow::anyhow!("No DOT graphs found in input"));
    }
    let icon_dir = args
        .input
        .as_deref()
        .filter(|p| *p != Path::new("-"))
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // one graph goes to -o (or stdout); several get numbered files
    let targets: Vec<(Option<PathBuf>, Option<PathBuf>)> = if graphs.len() == 1 {
        let output = match args.output_format {
            OutputFormat::Svg => args.output.clone(),
            OutputFormat::Png => Some(ensure_output(&args.output, "png")?),
        };
        vec![(output, args.dump_layout.clone())]
    } else {
        resolve_multi_outputs(args.output.as_deref(), args.output_format, graphs.len())?
            .into_iter()
            .enumerate()
            .map(|(idx, out)| (Some(out), args.dump_layout.as_deref().map(|d| numbered(d, idx + 1))))
            .collect()
    };

    for (graph, (output, dump)) in graphs.iter().zip(targets) {
        let scene = build_scene(graph, &config, args.grid, &icon_dir)?;
        if let Some(dump) = dump {
            write_scene_dump(&dump, &scene)?;
        }
        let svg = render_svg(&scene, &config.theme);
        match (args.output_format, output) {
            (OutputFormat::Png, Some(output)) => write_output_png(&svg, &output, &config.render)?,
            (_, output) => write_output_svg(&svg, output.as_deref())?,
        }
    }

    Ok(())
}

fn build_scene(dot: &str, config: &Config, grid: bool, icon_dir: &Path) -> Result<Scene> {
    let mut scene = Scene::with_config("G", config.clone());
    scene.set_draw_background_grid(grid);
    scene.load_layout(dot)?;
    let icons = scene.load_icons(icon_dir);
    tracing::debug!(icons, nodes = scene.nodes().len(), "scene ready");
    Ok(scene)
}

fn read_input(path: Option<&Path>) -> Result<(String, bool)> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok((buf, false));
        }
        let content = std::fs::read_to_string(path)?;
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| matches!(ext, "md" | "markdown"))
            .unwrap_or(false);
        return Ok((content, is_md));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok((buf, false))
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

fn extract_dot_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current = Vec::new();
    let mut fence = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(start_fence) = detect_dot_fence(trimmed) {
                in_block = true;
                fence = start_fence;
                continue;
            }
        } else if is_fence_end(trimmed, &fence) {
            in_block = false;
            blocks.push(current.join("\n"));
            current.clear();
            continue;
        }

        if in_block {
            current.push(line.to_string());
        }
    }

    blocks
}

fn detect_dot_fence(line: &str) -> Option<String> {
    for fence in ["```", "~~~"] {
        if let Some(rest) = line.strip_prefix(fence) {
            let tag = rest.trim_start_matches(&fence[..1]).trim();
            let lang = tag.split_whitespace().next().unwrap_or("");
            if matches!(lang, "dot" | "graphviz" | "gv") {
                return Some(fence.to_string());
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    if !line.starts_with(fence) {
        return false;
    }
    line[fence.len()..].trim().is_empty()
}

fn numbered(path: &Path, idx: usize) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("scene");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    path.with_file_name(format!("{stem}-{idx}.{ext}"))
}

fn resolve_multi_outputs(
    output: Option<&Path>,
    format: OutputFormat,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let ext = match format {
        OutputFormat::Svg => "svg",
        OutputFormat::Png => "png",
    };
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for markdown input"))?;
    if base.is_dir() {
        let mut outputs = Vec::new();
        for idx in 0..count {
            outputs.push(base.join(format!("graph-{}.{}", idx + 1, ext)));
        }
        return Ok(outputs);
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("graph");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    let mut outputs = Vec::new();
    for idx in 0..count {
        outputs.push(parent.join(format!("{}-{}.{}", stem, idx + 1, ext)));
    }
    Ok(outputs)
}
