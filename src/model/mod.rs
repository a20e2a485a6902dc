//! In-memory graph description: nodes, edges, nested subgraphs and their
//! string attributes.
//!
//! Handles are plain integers that stay valid until the element is deleted
//! and are never reused within one model.

mod attrs;
pub mod dot;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub use attrs::{Attr, AttrValue, AttrView};
pub use dot::DotError;

/// Name prefix that makes the layout engine draw a subgraph as a boxed cluster.
pub const CLUSTER_PREFIX: &str = "cluster_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubgraphId(u32);

impl NodeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl EdgeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl SubgraphId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("node `{0}` already exists")]
    DuplicateNode(String),
    #[error("subgraph `{0}` already exists")]
    DuplicateSubgraph(String),
    #[error("strict graph already has an edge {tail} -> {head}")]
    DuplicateEdge { tail: String, head: String },
    #[error("invalid name `{0}`")]
    InvalidName(String),
    #[error("unknown node handle {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown edge handle {0:?}")]
    UnknownEdge(EdgeId),
    #[error("unknown subgraph handle {0:?}")]
    UnknownSubgraph(SubgraphId),
}

/// Scope of an attribute default declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Graph,
    Node,
    Edge,
}

/// Element an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrTarget {
    Graph,
    Node(NodeId),
    Edge(EdgeId),
    Subgraph(SubgraphId),
}

type AttrMap = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone)]
struct NodeEntry {
    name: String,
    attrs: AttrMap,
}

#[derive(Debug, Clone)]
struct EdgeEntry {
    tail: NodeId,
    head: NodeId,
    attrs: AttrMap,
}

#[derive(Debug, Clone)]
struct SubgraphEntry {
    name: String,
    anonymous: bool,
    parent: Option<SubgraphId>,
    attrs: AttrMap,
    nodes: Vec<NodeId>,
    children: Vec<SubgraphId>,
}

#[derive(Debug, Clone)]
pub struct GraphModel {
    name: String,
    directed: bool,
    strict: bool,
    graph_attrs: AttrMap,
    node_defaults: AttrMap,
    edge_defaults: AttrMap,
    nodes: BTreeMap<NodeId, NodeEntry>,
    node_names: HashMap<String, NodeId>,
    edges: BTreeMap<EdgeId, EdgeEntry>,
    subgraphs: BTreeMap<SubgraphId, SubgraphEntry>,
    subgraph_names: HashMap<String, SubgraphId>,
    root_subgraphs: Vec<SubgraphId>,
    next_id: u32,
}

impl GraphModel {
    pub fn new(name: &str, directed: bool) -> Self {
        Self {
            name: name.to_string(),
            directed,
            strict: false,
            graph_attrs: AttrMap::new(),
            node_defaults: AttrMap::new(),
            edge_defaults: AttrMap::new(),
            nodes: BTreeMap::new(),
            node_names: HashMap::new(),
            edges: BTreeMap::new(),
            subgraphs: BTreeMap::new(),
            subgraph_names: HashMap::new(),
            root_subgraphs: Vec::new(),
            next_id: 1,
        }
    }

    pub fn digraph(name: &str) -> Self {
        Self::new(name, true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.subgraphs.is_empty()
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- attributes ----

    /// Declares a default for every element of `scope`. For `Scope::Graph`
    /// this sets the root graph attribute.
    pub fn set_default(&mut self, scope: Scope, key: &str, value: AttrValue) {
        let map = match scope {
            Scope::Graph => &mut self.graph_attrs,
            Scope::Node => &mut self.node_defaults,
            Scope::Edge => &mut self.edge_defaults,
        };
        map.insert(key.to_string(), value);
    }

    /// Effective value: the element's own value, else the scope default.
    pub fn attr(&self, target: AttrTarget, key: &str) -> Option<&AttrValue> {
        match target {
            AttrTarget::Graph => self.graph_attrs.get(key),
            AttrTarget::Node(id) => self
                .nodes
                .get(&id)?
                .attrs
                .get(key)
                .or_else(|| self.node_defaults.get(key)),
            AttrTarget::Edge(id) => self
                .edges
                .get(&id)?
                .attrs
                .get(key)
                .or_else(|| self.edge_defaults.get(key)),
            AttrTarget::Subgraph(id) => self.subgraphs.get(&id)?.attrs.get(key),
        }
    }

    /// Sets an element's own value, creating the attribute if needed.
    pub fn set_attr(
        &mut self,
        target: AttrTarget,
        key: &str,
        value: AttrValue,
    ) -> Result<(), ModelError> {
        let map = self.attrs_mut(target)?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    fn attrs_mut(&mut self, target: AttrTarget) -> Result<&mut AttrMap, ModelError> {
        Ok(match target {
            AttrTarget::Graph => &mut self.graph_attrs,
            AttrTarget::Node(id) => {
                &mut self
                    .nodes
                    .get_mut(&id)
                    .ok_or(ModelError::UnknownNode(id))?
                    .attrs
            }
            AttrTarget::Edge(id) => {
                &mut self
                    .edges
                    .get_mut(&id)
                    .ok_or(ModelError::UnknownEdge(id))?
                    .attrs
            }
            AttrTarget::Subgraph(id) => {
                &mut self
                    .subgraphs
                    .get_mut(&id)
                    .ok_or(ModelError::UnknownSubgraph(id))?
                    .attrs
            }
        })
    }

    /// Attributes set directly on an element, in name order.
    pub fn own_attrs(&self, target: AttrTarget) -> Vec<(&str, &AttrValue)> {
        let map = match target {
            AttrTarget::Graph => Some(&self.graph_attrs),
            AttrTarget::Node(id) => self.nodes.get(&id).map(|n| &n.attrs),
            AttrTarget::Edge(id) => self.edges.get(&id).map(|e| &e.attrs),
            AttrTarget::Subgraph(id) => self.subgraphs.get(&id).map(|s| &s.attrs),
        };
        map.map(|m| m.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn defaults(&self, scope: Scope) -> Vec<(&str, &AttrValue)> {
        let map = match scope {
            Scope::Graph => &self.graph_attrs,
            Scope::Node => &self.node_defaults,
            Scope::Edge => &self.edge_defaults,
        };
        map.iter().map(|(k, v)| (k.as_str(), v)).collect()
    }

    pub fn view(&self, target: AttrTarget) -> AttrView<'_> {
        AttrView::new(self, target)
    }

    // ---- nodes ----

    /// Creates a node. Without a name one is generated; an explicit name that
    /// is already taken is rejected.
    pub fn add_node(&mut self, name: Option<&str>) -> Result<NodeId, ModelError> {
        let name = match name {
            Some(name) if name.is_empty() => return Err(ModelError::InvalidName(String::new())),
            Some(name) => {
                if self.node_names.contains_key(name) {
                    return Err(ModelError::DuplicateNode(name.to_string()));
                }
                name.to_string()
            }
            None => self.fresh_node_name(),
        };
        let id = NodeId(self.alloc_id());
        self.node_names.insert(name.clone(), id);
        self.nodes.insert(
            id,
            NodeEntry {
                name,
                attrs: AttrMap::new(),
            },
        );
        Ok(id)
    }

    fn fresh_node_name(&self) -> String {
        let mut n = self.nodes.len() + 1;
        loop {
            let candidate = format!("n{n}");
            if !self.node_names.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deletes a node together with every edge attached to it. Returns the
    /// removed edges.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Vec<EdgeId>, ModelError> {
        let entry = self.nodes.remove(&id).ok_or(ModelError::UnknownNode(id))?;
        self.node_names.remove(&entry.name);
        let attached: Vec<EdgeId> = self
            .edges
            .iter()
            .filter(|(_, e)| e.tail == id || e.head == id)
            .map(|(eid, _)| *eid)
            .collect();
        for eid in &attached {
            self.edges.remove(eid);
        }
        for sub in self.subgraphs.values_mut() {
            sub.nodes.retain(|n| *n != id);
        }
        Ok(attached)
    }

    // ---- edges ----

    pub fn add_edge(&mut self, tail: NodeId, head: NodeId) -> Result<EdgeId, ModelError> {
        if !self.nodes.contains_key(&tail) {
            return Err(ModelError::UnknownNode(tail));
        }
        if !self.nodes.contains_key(&head) {
            return Err(ModelError::UnknownNode(head));
        }
        if self.strict && self.find_edge(tail, head).is_some() {
            return Err(ModelError::DuplicateEdge {
                tail: self.node_name(tail).unwrap_or_default().to_string(),
                head: self.node_name(head).unwrap_or_default().to_string(),
            });
        }
        let id = EdgeId(self.alloc_id());
        self.edges.insert(
            id,
            EdgeEntry {
                tail,
                head,
                attrs: AttrMap::new(),
            },
        );
        Ok(id)
    }

    /// First edge connecting `tail` to `head`; either direction for undirected graphs.
    pub fn find_edge(&self, tail: NodeId, head: NodeId) -> Option<EdgeId> {
        self.edges
            .iter()
            .find(|(_, e)| {
                (e.tail == tail && e.head == head)
                    || (!self.directed && e.tail == head && e.head == tail)
            })
            .map(|(id, _)| *id)
    }

    pub fn edge_endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(&id).map(|e| (e.tail, e.head))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys().copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .filter(move |(_, e)| e.tail == node)
            .map(|(id, _)| *id)
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> Result<(), ModelError> {
        self.edges
            .remove(&id)
            .map(|_| ())
            .ok_or(ModelError::UnknownEdge(id))
    }

    // ---- subgraphs ----

    /// Creates a subgraph under `parent` (the root graph when `None`).
    /// An empty name creates an anonymous subgraph.
    pub fn add_subgraph(
        &mut self,
        parent: Option<SubgraphId>,
        name: &str,
    ) -> Result<SubgraphId, ModelError> {
        if let Some(parent) = parent
            && !self.subgraphs.contains_key(&parent)
        {
            return Err(ModelError::UnknownSubgraph(parent));
        }
        let anonymous = name.is_empty();
        let id = SubgraphId(self.alloc_id());
        let name = if anonymous {
            format!("%{}", id.0)
        } else {
            if self.subgraph_names.contains_key(name) {
                return Err(ModelError::DuplicateSubgraph(name.to_string()));
            }
            name.to_string()
        };
        self.subgraph_names.insert(name.clone(), id);
        self.subgraphs.insert(
            id,
            SubgraphEntry {
                name,
                anonymous,
                parent,
                attrs: AttrMap::new(),
                nodes: Vec::new(),
                children: Vec::new(),
            },
        );
        match parent {
            Some(parent) => {
                if let Some(p) = self.subgraphs.get_mut(&parent) {
                    p.children.push(id);
                }
            }
            None => self.root_subgraphs.push(id),
        }
        Ok(id)
    }

    pub fn subgraph_id(&self, name: &str) -> Option<SubgraphId> {
        self.subgraph_names.get(name).copied()
    }

    pub fn subgraph_name(&self, id: SubgraphId) -> Option<&str> {
        self.subgraphs.get(&id).map(|s| s.name.as_str())
    }

    pub fn is_anonymous(&self, id: SubgraphId) -> bool {
        self.subgraphs.get(&id).is_some_and(|s| s.anonymous)
    }

    pub fn is_cluster(&self, id: SubgraphId) -> bool {
        self.subgraph_name(id)
            .is_some_and(|name| name.starts_with("cluster"))
    }

    pub fn subgraph_parent(&self, id: SubgraphId) -> Option<SubgraphId> {
        self.subgraphs.get(&id).and_then(|s| s.parent)
    }

    /// Immediate subgraphs of the root graph.
    pub fn root_subgraphs(&self) -> &[SubgraphId] {
        &self.root_subgraphs
    }

    pub fn subgraph_children(&self, id: SubgraphId) -> &[SubgraphId] {
        self.subgraphs
            .get(&id)
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
    }

    /// Every subgraph, parents before children.
    pub fn all_subgraphs(&self) -> Vec<SubgraphId> {
        let mut out = Vec::with_capacity(self.subgraphs.len());
        let mut stack: Vec<SubgraphId> = self.root_subgraphs.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.subgraph_children(id).iter().rev().copied());
        }
        out
    }

    pub fn subgraph_nodes(&self, id: SubgraphId) -> &[NodeId] {
        self.subgraphs
            .get(&id)
            .map(|s| s.nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Adds `node` to `subgraph` and to all of its ancestors.
    pub fn add_node_to_subgraph(
        &mut self,
        subgraph: SubgraphId,
        node: NodeId,
    ) -> Result<(), ModelError> {
        if !self.nodes.contains_key(&node) {
            return Err(ModelError::UnknownNode(node));
        }
        if !self.subgraphs.contains_key(&subgraph) {
            return Err(ModelError::UnknownSubgraph(subgraph));
        }
        let mut current = Some(subgraph);
        while let Some(id) = current {
            let Some(entry) = self.subgraphs.get_mut(&id) else {
                break;
            };
            if !entry.nodes.contains(&node) {
                entry.nodes.push(node);
            }
            current = entry.parent;
        }
        Ok(())
    }

    /// Deletes a subgraph and its nested subgraphs. Member nodes stay in the
    /// graph. Returns every removed subgraph handle, the requested one first.
    pub fn delete_subgraph(&mut self, id: SubgraphId) -> Result<Vec<SubgraphId>, ModelError> {
        if !self.subgraphs.contains_key(&id) {
            return Err(ModelError::UnknownSubgraph(id));
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(entry) = self.subgraphs.remove(&current) {
                self.subgraph_names.remove(&entry.name);
                stack.extend(entry.children.iter().copied());
                removed.push(current);
            }
        }
        self.root_subgraphs.retain(|s| *s != id);
        for sub in self.subgraphs.values_mut() {
            sub.children.retain(|s| *s != id);
        }
        Ok(removed)
    }
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::digraph("g")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut g = GraphModel::digraph("g");
        g.add_node(Some("a")).unwrap();
        assert_eq!(g.add_node(Some("a")), Err(ModelError::DuplicateNode("a".into())));
        assert!(g.add_node(Some("")).is_err());
        let anon = g.add_node(None).unwrap();
        assert_ne!(g.node_name(anon), Some("a"));
    }

    #[test]
    fn attribute_defaults_apply_until_overridden() {
        let mut g = GraphModel::digraph("g");
        let a = g.add_node(Some("a")).unwrap();
        g.set_default(Scope::Node, "shape", AttrValue::text("box"));
        assert_eq!(g.view(AttrTarget::Node(a)).text(Attr::Shape), "box");
        g.set_attr(AttrTarget::Node(a), "shape", AttrValue::text("circle"))
            .unwrap();
        assert_eq!(g.view(AttrTarget::Node(a)).text(Attr::Shape), "circle");
        assert_eq!(g.own_attrs(AttrTarget::Node(a)).len(), 1);
    }

    #[test]
    fn deleting_node_cascades_to_edges() {
        let mut g = GraphModel::digraph("g");
        let a = g.add_node(Some("a")).unwrap();
        let b = g.add_node(Some("b")).unwrap();
        let c = g.add_node(Some("c")).unwrap();
        let ab = g.add_edge(a, b).unwrap();
        let bc = g.add_edge(b, c).unwrap();
        let removed = g.delete_node(b).unwrap();
        assert_eq!(removed, vec![ab, bc]);
        assert_eq!(g.edge_count(), 0);
        assert!(g.node_id("b").is_none());
    }

    #[test]
    fn subgraph_membership_propagates_to_ancestors() {
        let mut g = GraphModel::digraph("g");
        let outer = g.add_subgraph(None, "cluster_outer").unwrap();
        let inner = g.add_subgraph(Some(outer), "cluster_inner").unwrap();
        let a = g.add_node(Some("a")).unwrap();
        g.add_node_to_subgraph(inner, a).unwrap();
        assert_eq!(g.subgraph_nodes(outer), &[a]);
        assert_eq!(g.all_subgraphs(), vec![outer, inner]);
        assert_eq!(g.root_subgraphs(), &[outer]);
    }

    #[test]
    fn deleting_subgraph_removes_descendants_but_keeps_nodes() {
        let mut g = GraphModel::digraph("g");
        let outer = g.add_subgraph(None, "cluster_outer").unwrap();
        let inner = g.add_subgraph(Some(outer), "cluster_inner").unwrap();
        let a = g.add_node(Some("a")).unwrap();
        g.add_node_to_subgraph(inner, a).unwrap();
        let removed = g.delete_subgraph(outer).unwrap();
        assert_eq!(removed, vec![outer, inner]);
        assert!(g.contains_node(a));
        assert!(g.root_subgraphs().is_empty());
        assert!(g.subgraph_id("cluster_inner").is_none());
    }

    #[test]
    fn strict_graph_rejects_parallel_edges() {
        let mut g = GraphModel::digraph("g");
        g.set_strict(true);
        let a = g.add_node(Some("a")).unwrap();
        let b = g.add_node(Some("b")).unwrap();
        g.add_edge(a, b).unwrap();
        assert!(matches!(g.add_edge(a, b), Err(ModelError::DuplicateEdge { .. })));
    }
}
