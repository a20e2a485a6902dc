//! The scene: one graph model, its layout engine and the visual items built
//! from them, kept in step through every mutation.

use serde::Serialize;
use std::path::Path as FsPath;
use thiserror::Error;

use crate::config::{Config, SubgraphDiscovery};
use crate::engine::{DagreEngine, GraphLayout, LayoutEngine, LayoutError};
use crate::geometry::{Point, Rect, to_screen_point};
use crate::items::{Edge, Icon, ItemRef, Node, Palette, Subgraph, UpdateContext};
use crate::model::{
    Attr, AttrTarget, AttrValue, CLUSTER_PREFIX, DotError, EdgeId, GraphModel, NodeId, Scope,
    SubgraphId,
};
use crate::paint::Painter;
use crate::style::Pen;
use crate::text::{Font, TextItem};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Parse(#[from] DotError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SceneState {
    /// No elements yet, or the model was just replaced.
    Empty,
    /// Elements exist but geometry is missing or stale.
    Loaded,
    /// Geometry reflects the last successful layout.
    LaidOut,
}

/// What an interaction hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SceneEvent {
    NodeContextMenu(NodeId),
    EdgeContextMenu(EdgeId),
    SubgraphContextMenu(SubgraphId),
    GraphContextMenu,
    NodeDoubleClick(NodeId),
    EdgeDoubleClick(EdgeId),
    SubgraphDoubleClick(SubgraphId),
}

pub struct Scene {
    model: GraphModel,
    engine: Box<dyn LayoutEngine>,
    config: Config,
    palette: Palette,
    base_font: Font,
    state: SceneState,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    subgraphs: Vec<Subgraph>,
    graph_label: Option<TextItem>,
    scene_rect: Rect,
    draw_grid: bool,
}

impl Scene {
    /// Empty directed graph laid out by [`DagreEngine`].
    pub fn new(name: &str) -> Self {
        Self::with_config(name, Config::default())
    }

    pub fn with_config(name: &str, config: Config) -> Self {
        let engine = Box::new(DagreEngine::new(&config));
        Self::with_engine(name, engine, config)
    }

    pub fn with_engine(name: &str, engine: Box<dyn LayoutEngine>, config: Config) -> Self {
        let palette = Palette::from_theme(&config.theme);
        let base_font = Font {
            family: config.theme.font_family.clone(),
            size: config.theme.font_size,
            color: palette.text,
        };
        Self {
            model: GraphModel::digraph(name),
            engine,
            config,
            palette,
            base_font,
            state: SceneState::Empty,
            nodes: Vec::new(),
            edges: Vec::new(),
            subgraphs: Vec::new(),
            graph_label: None,
            scene_rect: Rect::default(),
            draw_grid: false,
        }
    }

    pub fn set_layout_engine(&mut self, engine: Box<dyn LayoutEngine>) {
        self.engine.free_layout();
        self.engine = engine;
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn subgraphs(&self) -> &[Subgraph] {
        &self.subgraphs
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id() == id)
    }

    pub fn subgraph(&self, id: SubgraphId) -> Option<&Subgraph> {
        self.subgraphs.iter().find(|s| s.id() == id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.model.node_id(name).and_then(|id| self.node(id))
    }

    pub fn graph_label(&self) -> Option<&TextItem> {
        self.graph_label.as_ref()
    }

    /// Union of all item bounds after the last layout.
    pub fn scene_rect(&self) -> Rect {
        self.scene_rect
    }

    // ---- graph lifecycle ----

    /// Drops every item and starts over with an empty directed graph.
    pub fn new_graph(&mut self, name: &str) {
        self.clear_graph_items();
        self.model = GraphModel::digraph(name);
        self.state = SceneState::Empty;
    }

    /// Replaces the model with a parsed DOT description, builds items for it
    /// and lays it out.
    pub fn load_layout(&mut self, text: &str) -> Result<(), SceneError> {
        self.clear_graph_items();
        self.state = SceneState::Empty;
        let model = match GraphModel::from_dot(text) {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!(%err, "could not read graph description");
                self.model = GraphModel::digraph(self.model.name());
                return Err(err.into());
            }
        };
        self.model = model;

        // subgraphs first so they paint beneath nodes and edges
        let subgraphs = match self.config.layout.subgraph_discovery {
            SubgraphDiscovery::Recursive => self.model.all_subgraphs(),
            SubgraphDiscovery::ImmediateOnly => self.model.root_subgraphs().to_vec(),
        };
        for id in subgraphs {
            let name = self.model.subgraph_name(id).unwrap_or_default();
            self.subgraphs
                .push(Subgraph::new(id, name, self.model.is_cluster(id)));
        }
        let node_ids: Vec<NodeId> = self.model.nodes().collect();
        for id in node_ids {
            let name = self.model.node_name(id).unwrap_or_default();
            self.nodes.push(Node::new(id, name));
            // each edge is reached once, through its tail
            for edge in self.model.out_edges(id) {
                if let Some((tail, head)) = self.model.edge_endpoints(edge) {
                    self.edges.push(Edge::new(edge, tail, head));
                }
            }
        }
        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            subgraphs = self.subgraphs.len(),
            "graph loaded"
        );
        self.state = SceneState::Loaded;
        self.apply_layout()
    }

    /// Runs the layout engine and refreshes every item. On failure the
    /// previous geometry is kept.
    pub fn apply_layout(&mut self) -> Result<(), SceneError> {
        let layout = match self.engine.layout(&self.model) {
            Ok(layout) => layout,
            Err(err) => {
                let LayoutError::Engine { code, message } = &err;
                tracing::error!(code, message = %message, "layout failed");
                return Err(err.into());
            }
        };
        self.update_layout(&layout);
        self.engine.free_layout();
        self.scene_rect = self.items_bounding_rect();
        self.state = SceneState::LaidOut;
        Ok(())
    }

    fn update_layout(&mut self, layout: &GraphLayout) {
        let ctx = UpdateContext::new(
            &self.model,
            layout,
            &self.config.layout,
            &self.base_font,
            &self.palette,
        );
        for subgraph in &mut self.subgraphs {
            subgraph.update_layout(&ctx);
        }
        for node in &mut self.nodes {
            node.update_layout(&ctx);
        }
        for edge in &mut self.edges {
            edge.update_layout(&ctx);
        }

        match &layout.label {
            Some(label) if !label.text.is_empty() => {
                let font = ctx.font(&self.model.view(AttrTarget::Graph));
                let item = self
                    .graph_label
                    .get_or_insert_with(|| TextItem::new(font.clone()));
                item.set_font(font);
                item.set_text(&label.text, label.html, &ctx.metrics);
                item.move_center(to_screen_point(label.pos, layout.height()));
                item.show();
            }
            _ => {
                if let Some(item) = &mut self.graph_label {
                    item.hide();
                }
            }
        }
    }

    fn items_bounding_rect(&self) -> Rect {
        let mut rect = Rect::default();
        for subgraph in &self.subgraphs {
            rect = rect.united(&subgraph.bounding_rect());
        }
        for node in &self.nodes {
            rect = rect.united(&node.bounding_rect());
        }
        for edge in &self.edges {
            rect = rect.united(&edge.bounding_rect());
        }
        if let Some(label) = self.graph_label.as_ref().filter(|l| l.is_visible()) {
            rect = rect.united(&label.bounding_rect());
        }
        rect
    }

    /// Releases engine buffers and destroys every item. The model is kept.
    pub fn clear_graph_items(&mut self) {
        self.engine.free_layout();
        self.nodes.clear();
        self.edges.clear();
        self.subgraphs.clear();
        self.graph_label = None;
        self.scene_rect = Rect::default();
    }

    fn touch(&mut self) {
        if self.state == SceneState::Empty {
            self.state = SceneState::Loaded;
        }
    }

    // ---- attributes ----

    /// Sets a root graph attribute.
    pub fn set_graph_attribute(&mut self, name: &str, value: &str) {
        self.model.set_default(Scope::Graph, name, AttrValue::parse(value));
    }

    /// Declares the default of a node attribute.
    pub fn set_node_attribute(&mut self, name: &str, value: &str) {
        self.model.set_default(Scope::Node, name, AttrValue::parse(value));
    }

    /// Declares the default of an edge attribute.
    pub fn set_edge_attribute(&mut self, name: &str, value: &str) {
        self.model.set_default(Scope::Edge, name, AttrValue::parse(value));
    }

    pub fn graph_attribute(&self, name: &str) -> Option<String> {
        self.model
            .attr(AttrTarget::Graph, name)
            .map(ToString::to_string)
    }

    /// Makes `node` the centre for radial layouts.
    pub fn set_root_node(&mut self, node: NodeId) {
        let Some(name) = self.model.node_name(node).map(str::to_string) else {
            tracing::warn!(node = ?node, "root node is not part of this scene");
            return;
        };
        self.model
            .set_default(Scope::Graph, Attr::Root.name(), AttrValue::text(name));
    }

    pub fn to_dot(&self) -> String {
        self.model.to_dot()
    }

    // ---- structural mutation ----

    /// Creates a node named `id` (generated when `None`) labelled `label`.
    pub fn add_node(&mut self, label: &str, id: Option<&str>) -> Option<NodeId> {
        self.create_node(None, label, id)
    }

    fn create_node(
        &mut self,
        parent: Option<SubgraphId>,
        label: &str,
        id: Option<&str>,
    ) -> Option<NodeId> {
        let node = match self.model.add_node(id) {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!(%err, label, "invalid node");
                return None;
            }
        };
        if let Some(parent) = parent
            && let Err(err) = self.model.add_node_to_subgraph(parent, node)
        {
            tracing::warn!(%err, "invalid subgraph node");
            let _ = self.model.delete_node(node);
            return None;
        }
        if !label.is_empty() {
            let _ = self
                .model
                .set_attr(AttrTarget::Node(node), "label", AttrValue::parse(label));
        }
        let name = self.model.node_name(node).unwrap_or_default();
        self.nodes.push(Node::new(node, name));
        self.touch();
        Some(node)
    }

    /// Connects two nodes of this scene.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, label: &str) -> Option<EdgeId> {
        if self.node(source).is_none() || self.node(target).is_none() {
            tracing::warn!(?source, ?target, "edge endpoints must be nodes of this scene");
            return None;
        }
        let edge = match self.model.add_edge(source, target) {
            Ok(edge) => edge,
            Err(err) => {
                tracing::warn!(%err, "invalid edge");
                return None;
            }
        };
        if !label.is_empty() {
            let _ = self
                .model
                .set_attr(AttrTarget::Edge(edge), "label", AttrValue::parse(label));
        }
        self.edges.push(Edge::new(edge, source, target));
        self.touch();
        Some(edge)
    }

    /// Creates a top-level subgraph. Cluster names get the `cluster_` prefix
    /// so the engine draws a box around them.
    pub fn add_subgraph(&mut self, name: &str, cluster: bool) -> Option<SubgraphId> {
        self.create_subgraph(None, name, cluster)
    }

    fn create_subgraph(
        &mut self,
        parent: Option<SubgraphId>,
        name: &str,
        cluster: bool,
    ) -> Option<SubgraphId> {
        let full_name = if cluster {
            format!("{CLUSTER_PREFIX}{name}")
        } else {
            name.to_string()
        };
        let id = match self.model.add_subgraph(parent, &full_name) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%err, "invalid subgraph");
                return None;
            }
        };
        let name = self.model.subgraph_name(id).unwrap_or_default();
        self.subgraphs
            .push(Subgraph::new(id, name, self.model.is_cluster(id)));
        self.touch();
        Some(id)
    }

    /// Deletes a node together with every edge attached to it. Returns false
    /// when the node is not part of this scene.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        let Some(index) = self.nodes.iter().position(|n| n.id() == id) else {
            tracing::warn!(node = ?id, "node is not part of this scene");
            return false;
        };
        match self.model.delete_node(id) {
            Ok(removed) => {
                self.edges.retain(|e| !removed.contains(&e.id()));
                self.nodes.remove(index);
                true
            }
            Err(err) => {
                tracing::warn!(%err, "error deleting node");
                false
            }
        }
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> bool {
        let Some(index) = self.edges.iter().position(|e| e.id() == id) else {
            tracing::warn!(edge = ?id, "edge is not part of this scene");
            return false;
        };
        match self.model.delete_edge(id) {
            Ok(()) => {
                self.edges.remove(index);
                true
            }
            Err(err) => {
                tracing::warn!(%err, "error deleting edge");
                false
            }
        }
    }

    /// Deletes a subgraph and its nested subgraphs. Member nodes stay in the
    /// graph.
    pub fn delete_subgraph(&mut self, id: SubgraphId) -> bool {
        if self.subgraph(id).is_none() {
            tracing::warn!(subgraph = ?id, "subgraph is not part of this scene");
            return false;
        }
        match self.model.delete_subgraph(id) {
            Ok(removed) => {
                self.subgraphs.retain(|s| !removed.contains(&s.id()));
                true
            }
            Err(err) => {
                tracing::warn!(%err, "error deleting subgraph");
                false
            }
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<NodeMut<'_>> {
        self.node(id)?;
        Some(NodeMut { scene: self, id })
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<EdgeMut<'_>> {
        self.edge(id)?;
        Some(EdgeMut { scene: self, id })
    }

    pub fn subgraph_mut(&mut self, id: SubgraphId) -> Option<SubgraphMut<'_>> {
        self.subgraph(id)?;
        Some(SubgraphMut { scene: self, id })
    }

    /// Loads PNG icons named by the nodes' `image` attributes, relative to
    /// `base_dir`. Returns how many icons were attached.
    pub fn load_icons(&mut self, base_dir: &FsPath) -> usize {
        let mut loaded = 0;
        for node in &mut self.nodes {
            let view = self.model.view(AttrTarget::Node(node.id()));
            let file = view.text(Attr::Image).trim();
            if file.is_empty() {
                continue;
            }
            let icon = std::fs::read(base_dir.join(file))
                .map_err(|err| err.to_string())
                .and_then(|bytes| Icon::from_png(bytes).map_err(|err| err.to_string()));
            match icon {
                Ok(icon) => {
                    node.set_icon(Some(icon));
                    loaded += 1;
                }
                Err(err) => tracing::warn!(node = node.name(), image = file, %err, "could not load icon"),
            }
        }
        loaded
    }

    // ---- interaction ----

    pub fn set_draw_background_grid(&mut self, draw: bool) {
        self.draw_grid = draw;
    }

    pub fn draws_background_grid(&self) -> bool {
        self.draw_grid
    }

    /// Every item under `point`, top-most first.
    pub fn items_at(&self, point: Point) -> Vec<ItemRef> {
        let mut hits = Vec::new();
        if let Some(label) = &self.graph_label
            && label.is_visible()
            && label.bounding_rect().contains_point(point)
        {
            hits.push(ItemRef::GraphLabel);
        }
        hits.extend(
            self.nodes
                .iter()
                .rev()
                .filter(|n| n.contains(point))
                .map(|n| ItemRef::Node(n.id())),
        );
        hits.extend(
            self.edges
                .iter()
                .rev()
                .filter(|e| e.contains(point))
                .map(|e| ItemRef::Edge(e.id())),
        );
        hits.extend(
            self.subgraphs
                .iter()
                .rev()
                .filter(|s| s.contains(point))
                .map(|s| ItemRef::Subgraph(s.id())),
        );
        hits
    }

    pub fn item_at(&self, point: Point) -> Option<ItemRef> {
        self.items_at(point).into_iter().next()
    }

    /// Selects the top-most item under `point` and reports it. Nothing is
    /// reported when the point hits no item.
    pub fn context_menu_at(&mut self, point: Point) -> Option<SceneEvent> {
        let item = self.item_at(point)?;
        self.set_selected(item, true);
        Some(match item {
            ItemRef::Node(id) => SceneEvent::NodeContextMenu(id),
            ItemRef::Edge(id) => SceneEvent::EdgeContextMenu(id),
            ItemRef::Subgraph(id) => SceneEvent::SubgraphContextMenu(id),
            ItemRef::GraphLabel => SceneEvent::GraphContextMenu,
        })
    }

    /// Reports the top-most node, edge or subgraph under `point`.
    pub fn double_click_at(&self, point: Point) -> Option<SceneEvent> {
        self.items_at(point).into_iter().find_map(|item| match item {
            ItemRef::Node(id) => Some(SceneEvent::NodeDoubleClick(id)),
            ItemRef::Edge(id) => Some(SceneEvent::EdgeDoubleClick(id)),
            ItemRef::Subgraph(id) => Some(SceneEvent::SubgraphDoubleClick(id)),
            ItemRef::GraphLabel => None,
        })
    }

    pub fn set_selected(&mut self, item: ItemRef, selected: bool) {
        match item {
            ItemRef::Node(id) => {
                if let Some(node) = self.nodes.iter_mut().find(|n| n.id() == id) {
                    node.set_selected(selected);
                }
            }
            ItemRef::Edge(id) => {
                if let Some(edge) = self.edges.iter_mut().find(|e| e.id() == id) {
                    edge.set_selected(selected);
                }
            }
            ItemRef::Subgraph(id) => {
                if let Some(sub) = self.subgraphs.iter_mut().find(|s| s.id() == id) {
                    sub.set_selected(selected);
                }
            }
            ItemRef::GraphLabel => {}
        }
    }

    pub fn clear_selection(&mut self) {
        self.nodes.iter_mut().for_each(|n| n.set_selected(false));
        self.edges.iter_mut().for_each(|e| e.set_selected(false));
        self.subgraphs.iter_mut().for_each(|s| s.set_selected(false));
    }

    pub fn selected_items(&self) -> Vec<ItemRef> {
        let nodes = self
            .nodes
            .iter()
            .filter(|n| n.is_selected())
            .map(|n| ItemRef::Node(n.id()));
        let edges = self
            .edges
            .iter()
            .filter(|e| e.is_selected())
            .map(|e| ItemRef::Edge(e.id()));
        let subgraphs = self
            .subgraphs
            .iter()
            .filter(|s| s.is_selected())
            .map(|s| ItemRef::Subgraph(s.id()));
        nodes.chain(edges).chain(subgraphs).collect()
    }

    // ---- painting ----

    /// Paints the part of the scene inside `exposed`: grid, subgraphs,
    /// edges, nodes, graph label.
    pub fn paint(&self, painter: &mut dyn Painter, exposed: Rect) {
        if self.draw_grid {
            self.paint_background_grid(painter, exposed);
        }
        for subgraph in &self.subgraphs {
            subgraph.paint(painter);
        }
        for edge in &self.edges {
            edge.paint(painter);
        }
        for node in &self.nodes {
            node.paint(painter);
        }
        if let Some(label) = &self.graph_label {
            label.paint(painter);
        }
    }

    fn paint_background_grid(&self, painter: &mut dyn Painter, rect: Rect) {
        let spacing = self.config.layout.grid_spacing;
        if spacing <= 0.0 || rect.is_empty() {
            return;
        }
        let pen = Pen {
            color: self.palette.grid,
            ..Pen::default()
        };
        painter.begin_group("grid", None);
        let mut x = (rect.left() / spacing).floor() * spacing;
        while x < rect.right() {
            painter.draw_line(Point::new(x, rect.top()), Point::new(x, rect.bottom()), &pen);
            x += spacing;
        }
        let mut y = (rect.top() / spacing).floor() * spacing;
        while y < rect.bottom() {
            painter.draw_line(Point::new(rect.left(), y), Point::new(rect.right(), y), &pen);
            y += spacing;
        }
        painter.end_group();
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.engine.free_layout();
    }
}

/// Attribute access shared by the element handles.
fn set_element_attribute(model: &mut GraphModel, target: AttrTarget, name: &str, value: &str) {
    // a value in angle brackets is stored as markup, anything else literally
    if let Err(err) = model.set_attr(target, name, AttrValue::parse(value)) {
        tracing::warn!(%err, attribute = name, "cannot set attribute");
    }
}

fn element_attribute(model: &GraphModel, target: AttrTarget, name: &str) -> Option<String> {
    model.attr(target, name).map(ToString::to_string)
}

/// Mutable access to one node of a scene.
pub struct NodeMut<'a> {
    scene: &'a mut Scene,
    id: NodeId,
}

impl NodeMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.scene.model.node_name(self.id).unwrap_or_default()
    }

    pub fn label(&self) -> Option<String> {
        self.attribute("label")
    }

    pub fn set_label(&mut self, label: &str) {
        self.set_attribute("label", label);
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        set_element_attribute(&mut self.scene.model, AttrTarget::Node(self.id), name, value);
    }

    /// Value as written in DOT; markup keeps its angle brackets.
    pub fn attribute(&self, name: &str) -> Option<String> {
        element_attribute(&self.scene.model, AttrTarget::Node(self.id), name)
    }

    pub fn raw_attribute(&self, name: &str) -> Option<&AttrValue> {
        self.scene.model.attr(AttrTarget::Node(self.id), name)
    }

    pub fn set_icon(&mut self, icon: Icon) {
        if let Some(node) = self.scene.nodes.iter_mut().find(|n| n.id() == self.id) {
            node.set_icon(Some(icon));
        }
    }

    pub fn clear_icon(&mut self) {
        if let Some(node) = self.scene.nodes.iter_mut().find(|n| n.id() == self.id) {
            node.set_icon(None);
        }
    }
}

/// Mutable access to one edge of a scene.
pub struct EdgeMut<'a> {
    scene: &'a mut Scene,
    id: EdgeId,
}

impl EdgeMut<'_> {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn endpoints(&self) -> Option<(NodeId, NodeId)> {
        self.scene.model.edge_endpoints(self.id)
    }

    pub fn label(&self) -> Option<String> {
        self.attribute("label")
    }

    pub fn set_label(&mut self, label: &str) {
        self.set_attribute("label", label);
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        set_element_attribute(&mut self.scene.model, AttrTarget::Edge(self.id), name, value);
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        element_attribute(&self.scene.model, AttrTarget::Edge(self.id), name)
    }
}

/// Mutable access to one subgraph of a scene.
pub struct SubgraphMut<'a> {
    scene: &'a mut Scene,
    id: SubgraphId,
}

impl SubgraphMut<'_> {
    pub fn id(&self) -> SubgraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.scene.model.subgraph_name(self.id).unwrap_or_default()
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        set_element_attribute(&mut self.scene.model, AttrTarget::Subgraph(self.id), name, value);
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        element_attribute(&self.scene.model, AttrTarget::Subgraph(self.id), name)
    }

    /// Creates a node inside this subgraph.
    pub fn add_node(&mut self, label: &str) -> Option<NodeId> {
        self.scene.create_node(Some(self.id), label, None)
    }

    /// Adds an existing node of the scene to this subgraph.
    pub fn add_existing_node(&mut self, node: NodeId) -> bool {
        match self.scene.model.add_node_to_subgraph(self.id, node) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "invalid subgraph node");
                false
            }
        }
    }

    /// Creates a nested subgraph.
    pub fn add_subgraph(&mut self, name: &str, cluster: bool) -> Option<SubgraphId> {
        self.scene.create_subgraph(Some(self.id), name, cluster)
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.scene.model.subgraph_nodes(self.id).to_vec()
    }

    pub fn subgraphs(&self) -> Vec<SubgraphId> {
        self.scene.model.subgraph_children(self.id).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Bezier, BoundingBox, EdgeGeometry, NodeGeometry, ShapeDescriptor};
    use crate::paint::DisplayList;

    struct FailingEngine;

    impl LayoutEngine for FailingEngine {
        fn layout(&mut self, _model: &GraphModel) -> Result<GraphLayout, LayoutError> {
            Err(LayoutError::Engine {
                code: 2,
                message: "syntax error".to_string(),
            })
        }
    }

    /// Places every node on a row and every edge as a straight cubic.
    struct RowEngine;

    impl LayoutEngine for RowEngine {
        fn layout(&mut self, model: &GraphModel) -> Result<GraphLayout, LayoutError> {
            let mut layout = GraphLayout {
                bb: BoundingBox::new(Point::new(0.0, 0.0), Point::new(200.0, 100.0)),
                ..GraphLayout::default()
            };
            for (i, id) in model.nodes().enumerate() {
                layout.nodes.insert(
                    id,
                    NodeGeometry {
                        center: Point::new(50.0 + 100.0 * i as f64, 50.0),
                        width: 0.5,
                        height: 0.5,
                        shape: Some(ShapeDescriptor {
                            sides: 2,
                            peripheries: 1,
                            vertices: vec![Point::new(-18.0, -18.0), Point::new(18.0, 18.0)],
                        }),
                        label: None,
                        xlabel: None,
                    },
                );
            }
            for id in model.edges() {
                let (t, h) = model.edge_endpoints(id).unwrap();
                let a = layout.nodes.get(&t).map(|n| n.center).unwrap_or_default();
                let b = layout.nodes.get(&h).map(|n| n.center).unwrap_or_default();
                layout.edges.insert(
                    id,
                    EdgeGeometry {
                        splines: vec![Bezier {
                            points: vec![a, a.lerp(b, 0.3), a.lerp(b, 0.6), a.lerp(b, 0.9)],
                            start: None,
                            end: Some(b),
                        }],
                        ..EdgeGeometry::default()
                    },
                );
            }
            Ok(layout)
        }
    }

    fn scene(engine: Box<dyn LayoutEngine>) -> Scene {
        let mut config = Config::default();
        config.layout.fast_text_metrics = true;
        Scene::with_engine("g", engine, config)
    }

    #[test]
    fn state_follows_lifecycle() {
        let mut s = scene(Box::new(RowEngine));
        assert_eq!(s.state(), SceneState::Empty);
        let a = s.add_node("A", None).unwrap();
        assert_eq!(s.state(), SceneState::Loaded);
        s.apply_layout().unwrap();
        assert_eq!(s.state(), SceneState::LaidOut);
        assert!(s.node(a).unwrap().size().width > 0.0);
        s.new_graph("h");
        assert_eq!(s.state(), SceneState::Empty);
        assert!(s.nodes().is_empty());
        assert_eq!(s.model().name(), "h");
    }

    #[test]
    fn failed_layout_keeps_previous_geometry() {
        let mut s = scene(Box::new(RowEngine));
        let a = s.add_node("A", Some("a")).unwrap();
        s.apply_layout().unwrap();
        let before = s.node(a).unwrap().pos();
        let rect = s.scene_rect();
        s.set_layout_engine(Box::new(FailingEngine));
        let err = s.apply_layout().unwrap_err();
        assert!(matches!(err, SceneError::Layout(LayoutError::Engine { code: 2, .. })));
        assert_eq!(s.node(a).unwrap().pos(), before);
        assert_eq!(s.scene_rect(), rect);
        assert_eq!(s.state(), SceneState::LaidOut);
    }

    #[test]
    fn edges_need_scene_nodes() {
        let mut s = scene(Box::new(RowEngine));
        let a = s.add_node("A", None).unwrap();
        let gone = s.add_node("X", None).unwrap();
        assert!(s.delete_node(gone));
        assert!(s.add_edge(a, gone, "").is_none());
        assert!(s.edges().is_empty());
        assert_eq!(s.model().edge_count(), 0);
    }

    #[test]
    fn duplicate_node_names_are_rejected() {
        let mut s = scene(Box::new(RowEngine));
        assert!(s.add_node("first", Some("n")).is_some());
        assert!(s.add_node("second", Some("n")).is_none());
        assert_eq!(s.nodes().len(), 1);
    }

    #[test]
    fn deleting_a_node_cascades_to_its_edges() {
        let mut s = scene(Box::new(RowEngine));
        let a = s.add_node("A", Some("a")).unwrap();
        let b = s.add_node("B", Some("b")).unwrap();
        let c = s.add_node("C", Some("c")).unwrap();
        s.add_edge(a, b, "").unwrap();
        let keep = s.add_edge(b, c, "").unwrap();
        assert!(s.delete_node(a));
        assert_eq!(s.nodes().len(), 2);
        assert_eq!(s.edges().len(), 1);
        assert_eq!(s.edges()[0].id(), keep);
        assert!(!s.to_dot().contains("a ->"));
        assert!(!s.delete_node(a));
    }

    #[test]
    fn grid_paints_beneath_items() {
        let mut s = scene(Box::new(RowEngine));
        s.add_node("A", None).unwrap();
        s.apply_layout().unwrap();
        s.set_draw_background_grid(true);
        let mut list = DisplayList::new();
        s.paint(&mut list, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(matches!(list.ops.first(), Some(crate::paint::PaintOp::BeginGroup { class, .. }) if class == "grid"));
        let lines = list
            .ops
            .iter()
            .filter(|op| matches!(op, crate::paint::PaintOp::Line { .. }))
            .count();
        // 0, 25, 50, 75 in both directions
        assert_eq!(lines, 8);
    }

    #[test]
    fn context_menu_selects_hit_item() {
        let mut s = scene(Box::new(RowEngine));
        let a = s.add_node("A", Some("a")).unwrap();
        let b = s.add_node("B", Some("b")).unwrap();
        let e = s.add_edge(a, b, "").unwrap();
        s.apply_layout().unwrap();
        let center = s.node(a).unwrap().footprint().center();
        assert_eq!(s.context_menu_at(center), Some(SceneEvent::NodeContextMenu(a)));
        assert_eq!(s.selected_items(), vec![ItemRef::Node(a)]);
        // halfway between the nodes lies only the edge
        let mid = Point::new(100.0, 50.0);
        assert_eq!(s.double_click_at(mid), Some(SceneEvent::EdgeDoubleClick(e)));
        assert_eq!(s.context_menu_at(Point::new(-500.0, -500.0)), None);
    }
}
