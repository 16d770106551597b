//! Graph document: nodes, lines and nested canvases
//!
//! Nodes live in an arena keyed by id. Canvases only hold ordered id lists:
//! the root canvas belongs to the document and every container node owns a
//! sub-canvas. Block-splitter containers additionally get a proxy block node
//! in their sub-canvas. Proxies can be line endpoints but are not nodes: they
//! are never user-addressable and never part of scope resolution.
//!
//! The mutation methods here are raw: they keep the arena, canvases and
//! lines consistent but apply no registry policy. Policy checks
//! ([`Document::check_removable`], [`Document::check_line`], ...) are
//! separate so that history replay can bypass them.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::descriptor::{PortDirection, DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT};
use crate::error::{EngineError, Result};
use crate::node_config::{NodeConfig, NodeType};
use crate::registry::NodeRegistry;
use crate::types::{LineId, NodeId, PortId, ViewVariableMeta};
use crate::value::InputValue;

/// Port id a proxy block node exposes to the first nodes of its sub-canvas
pub const BLOCK_START_PORT: &str = "block-start";

/// The editable part of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBody {
    pub title: String,
    #[serde(default)]
    pub inputs: Vec<InputValue>,
    #[serde(default)]
    pub outputs: Vec<ViewVariableMeta>,
    pub config: NodeConfig,
}

impl NodeBody {
    pub fn new(title: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            title: title.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<InputValue>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<ViewVariableMeta>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}

/// Ordered node membership of a canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub nodes: Vec<NodeId>,
    /// Synthesized proxy block node, present for block-splitter containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_proxy: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub body: NodeBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_canvas: Option<Canvas>,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        self.body.config.node_type()
    }

    pub fn title(&self) -> &str {
        &self.body.title
    }

    pub fn inputs(&self) -> &[InputValue] {
        &self.body.inputs
    }

    pub fn outputs(&self) -> &[ViewVariableMeta] {
        &self.body.outputs
    }

    pub fn config(&self) -> &NodeConfig {
        &self.body.config
    }

    /// Find an input binding by name
    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.body.inputs.iter().find(|i| i.name == name)
    }

    pub fn is_container(&self) -> bool {
        self.sub_canvas.is_some()
    }
}

/// A directed connection between two nodes (or a proxy and a node) of one canvas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub from: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<PortId>,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<PortId>,
}

impl Line {
    /// Create a line with a generated id
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.into(),
            from_port: None,
            to: to.into(),
            to_port: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<LineId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn from_port(mut self, port: impl Into<PortId>) -> Self {
        self.from_port = Some(port.into());
        self
    }

    pub fn to_port(mut self, port: impl Into<PortId>) -> Self {
        self.to_port = Some(port.into());
        self
    }

    pub fn touches(&self, id: &str) -> bool {
        self.from == id || self.to == id
    }
}

/// Conversation-level variable scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalScope {
    App,
    User,
    System,
}

impl GlobalScope {
    pub const ALL: [GlobalScope; 3] = [GlobalScope::App, GlobalScope::User, GlobalScope::System];

    /// Name of the scope root in key paths
    pub fn root_name(&self) -> &'static str {
        match self {
            GlobalScope::App => "global_variable_app",
            GlobalScope::User => "global_variable_user",
            GlobalScope::System => "global_variable_system",
        }
    }

    pub fn from_root_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.root_name() == name)
    }
}

/// A detached node together with its descendants and every line that touched them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSubtree {
    /// Root first, then descendants in pre-order
    pub nodes: Vec<Node>,
    /// Lines with their original positions, ascending
    pub lines: Vec<(usize, Line)>,
    /// Position of the root in its canvas
    pub canvas_index: usize,
}

impl NodeSubtree {
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.id)
    }
}

/// Description of a node to create
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub id: Option<NodeId>,
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    pub title: Option<String>,
    pub inputs: Option<Vec<InputValue>>,
    pub outputs: Option<Vec<ViewVariableMeta>>,
    pub config: Option<NodeConfig>,
}

impl NodeSpec {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            id: None,
            node_type,
            parent_id: None,
            title: None,
            inputs: None,
            outputs: None,
            config: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Place the node inside a container's sub-canvas
    pub fn inside(mut self, container_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(container_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputValue>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<ViewVariableMeta>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Override the default config. Its variant must match `node_type`.
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Proxy id for a block-splitter container
pub fn proxy_id_for(container_id: &str) -> NodeId {
    format!("{}-{}", container_id, BLOCK_START_PORT)
}

/// The in-memory workflow graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    root: Canvas,
    lines: Vec<Line>,
    /// proxy id -> owning container id
    proxies: HashMap<NodeId, NodeId>,
    globals: BTreeMap<GlobalScope, Vec<ViewVariableMeta>>,
    version: u64,
}

impl PartialEq for Document {
    /// Structural equality; the version counter is ignored
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.root == other.root
            && self.lines == other.lines
            && self.proxies == other.proxies
            && self.globals == other.globals
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter advanced by every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump(&mut self) {
        self.version += 1;
    }

    // --- queries ---

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node id in canvas pre-order (a container before its sub-canvas)
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.collect_canvas(&self.root, &mut out);
        out
    }

    fn collect_canvas(&self, canvas: &Canvas, out: &mut Vec<NodeId>) {
        for id in &canvas.nodes {
            out.push(id.clone());
            if let Some(sub) = self.nodes.get(id).and_then(|n| n.sub_canvas.as_ref()) {
                self.collect_canvas(sub, out);
            }
        }
    }

    pub fn root_canvas(&self) -> &Canvas {
        &self.root
    }

    /// The canvas owned by `parent`, or the root canvas for `None`
    pub fn canvas(&self, parent: Option<&str>) -> Option<&Canvas> {
        match parent {
            None => Some(&self.root),
            Some(id) => self.nodes.get(id)?.sub_canvas.as_ref(),
        }
    }

    fn canvas_mut(&mut self, parent: Option<&str>) -> Option<&mut Canvas> {
        match parent {
            None => Some(&mut self.root),
            Some(id) => self.nodes.get_mut(id)?.sub_canvas.as_mut(),
        }
    }

    /// Nodes of a canvas in order
    pub fn nodes_in_canvas(&self, parent: Option<&str>) -> Vec<&Node> {
        self.canvas(parent)
            .map(|c| c.nodes.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn is_proxy(&self, id: &str) -> bool {
        self.proxies.contains_key(id)
    }

    /// Container owning a proxy block node
    pub fn proxy_owner(&self, proxy_id: &str) -> Option<&NodeId> {
        self.proxies.get(proxy_id)
    }

    /// The canvas an endpoint lives in, `Some(None)` being the root canvas
    pub fn endpoint_canvas(&self, id: &str) -> Option<Option<&str>> {
        if let Some(node) = self.nodes.get(id) {
            return Some(node.parent_id.as_deref());
        }
        self.proxies.get(id).map(|owner| Some(owner.as_str()))
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, id: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn incoming_lines(&self, id: &str) -> Vec<&Line> {
        self.lines.iter().filter(|l| l.to == id).collect()
    }

    pub fn outgoing_lines(&self, id: &str) -> Vec<&Line> {
        self.lines.iter().filter(|l| l.from == id).collect()
    }

    /// Lines whose endpoints both live in the given canvas
    pub fn lines_in_canvas(&self, parent: Option<&str>) -> Vec<&Line> {
        self.lines
            .iter()
            .filter(|l| self.endpoint_canvas(&l.from) == Some(parent))
            .collect()
    }

    /// Every node with a line path into `id`
    pub fn upstream_nodes(&self, id: &str) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for line in self.lines.iter().filter(|l| l.to == current) {
                if seen.insert(line.from.clone()) {
                    queue.push_back(&line.from);
                }
            }
        }
        seen.remove(id);
        seen
    }

    /// Enclosing containers, nearest first
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        while let Some(parent) = current {
            current = self.nodes.get(&parent).and_then(|n| n.parent_id.clone());
            out.push(parent);
        }
        out
    }

    /// A node and everything nested in its sub-canvas, in pre-order
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.nodes.get(id) {
            out.push(node.id.clone());
            if let Some(sub) = &node.sub_canvas {
                self.collect_canvas(sub, &mut out);
            }
        }
        out
    }

    pub fn globals(&self, scope: GlobalScope) -> &[ViewVariableMeta] {
        self.globals.get(&scope).map(Vec::as_slice).unwrap_or_default()
    }

    /// Replace the variables of a global scope, returning the previous ones
    pub fn set_globals(
        &mut self,
        scope: GlobalScope,
        variables: Vec<ViewVariableMeta>,
    ) -> Vec<ViewVariableMeta> {
        self.bump();
        self.globals.insert(scope, variables).unwrap_or_default()
    }

    // --- node construction and policy ---

    /// Build a node from a spec using the registry's defaults
    pub fn create_node(&self, spec: NodeSpec, registry: &NodeRegistry) -> Result<Node> {
        let descriptor = registry.descriptor(spec.node_type)?;
        let defaults = (descriptor.default_body)();
        let mut body = defaults.clone();

        if let Some(config) = spec.config {
            if config.node_type() != spec.node_type {
                return Err(EngineError::UnknownNodeType(format!(
                    "config for {} given to a {} node",
                    config.node_type(),
                    spec.node_type
                )));
            }
            body.config = config;
        }
        if let Some(title) = spec.title {
            body.title = title;
        }
        if let Some(inputs) = spec.inputs {
            body.inputs = inputs;
        }
        if let Some(outputs) = spec.outputs {
            body.outputs = outputs;
        }
        if let Some(sync) = descriptor.sync_config {
            sync(&defaults, &mut body);
        }

        let id = spec
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let sub_canvas = descriptor.has_sub_canvas.then(|| Canvas {
            nodes: Vec::new(),
            block_proxy: descriptor.block_splitter.then(|| proxy_id_for(&id)),
        });

        Ok(Node {
            id,
            parent_id: spec.parent_id,
            body,
            sub_canvas,
        })
    }

    /// Check whether a node may be removed by a user.
    ///
    /// `pinned` holds nodes an open history transaction depends on.
    pub fn check_removable(
        &self,
        id: &str,
        registry: &NodeRegistry,
        pinned: &HashSet<NodeId>,
    ) -> Result<()> {
        if self.is_proxy(id) {
            return Err(EngineError::not_removable(id, "proxy block nodes cannot be removed"));
        }
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;

        if !registry.descriptor_for(node)?.removable {
            return Err(EngineError::not_removable(
                id,
                format!("{} nodes cannot be removed", node.node_type()),
            ));
        }

        if node.is_container() {
            if let Some(held) = self.descendants(id).iter().skip(1).find(|n| pinned.contains(*n)) {
                return Err(EngineError::not_removable(
                    id,
                    format!("sub-canvas node '{}' is used by the open transaction", held),
                ));
            }
        }
        Ok(())
    }

    /// Check that a line connects live endpoints of one canvas through existing ports
    pub fn check_line(&self, line: &Line, registry: &NodeRegistry) -> Result<()> {
        if line.from == line.to {
            return Err(EngineError::invalid_endpoint(&line.from, "a node cannot connect to itself"));
        }
        if self.line(&line.id).is_some() {
            return Err(EngineError::invalid_endpoint(&line.id, "line id already exists"));
        }

        let from_canvas = self
            .endpoint_canvas(&line.from)
            .ok_or_else(|| EngineError::invalid_endpoint(&line.from, "no such node"))?;
        let to_canvas = self
            .endpoint_canvas(&line.to)
            .ok_or_else(|| EngineError::invalid_endpoint(&line.to, "no such node"))?;
        if from_canvas != to_canvas {
            return Err(EngineError::invalid_endpoint(
                format!("{} -> {}", line.from, line.to),
                "endpoints live in different canvases",
            ));
        }
        if self.is_proxy(&line.to) {
            return Err(EngineError::invalid_endpoint(&line.to, "proxy block nodes have no inputs"));
        }

        self.check_port(&line.from, line.from_port.as_deref(), PortDirection::Output, registry)?;
        self.check_port(&line.to, line.to_port.as_deref(), PortDirection::Input, registry)
    }

    fn check_port(
        &self,
        id: &str,
        port: Option<&str>,
        direction: PortDirection,
        registry: &NodeRegistry,
    ) -> Result<()> {
        let default_port = match direction {
            PortDirection::Input => DEFAULT_INPUT_PORT,
            PortDirection::Output => DEFAULT_OUTPUT_PORT,
        };

        let available: Vec<String> = match self.nodes.get(id) {
            Some(node) => registry
                .ports(node)
                .into_iter()
                .filter(|p| p.direction == direction)
                .map(|p| p.id)
                .collect(),
            // proxies expose a single output
            None => match direction {
                PortDirection::Output => vec![DEFAULT_OUTPUT_PORT.to_string()],
                PortDirection::Input => Vec::new(),
            },
        };

        let wanted = port.unwrap_or(default_port);
        if available.iter().any(|p| p == wanted) {
            Ok(())
        } else {
            Err(EngineError::invalid_endpoint(
                format!("{}:{}", id, wanted),
                "port does not exist on the node",
            ))
        }
    }

    /// Check the source node's line policy for removing a line
    pub fn check_line_removal(&self, line: &Line, registry: &NodeRegistry) -> Result<()> {
        let Some(source) = self.nodes.get(&line.from) else {
            return Ok(());
        };
        let descriptor = registry.descriptor_for(source)?;
        if (descriptor.can_remove_line)(self, line) {
            Ok(())
        } else {
            Err(EngineError::LineNotRemovable(line.id.clone()))
        }
    }

    /// Lines leaving `id` through a port the node no longer has
    pub fn lines_from_missing_ports(&self, id: &str, registry: &NodeRegistry) -> Vec<LineId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let ports = registry.output_ports(node);
        self.lines
            .iter()
            .filter(|l| l.from == id)
            .filter(|l| {
                let port = l.from_port.as_deref().unwrap_or(DEFAULT_OUTPUT_PORT);
                !ports.iter().any(|p| p == port)
            })
            .map(|l| l.id.clone())
            .collect()
    }

    // --- raw mutations ---

    /// Insert a detached subtree back into the document
    pub(crate) fn attach_subtree(&mut self, subtree: NodeSubtree) -> Result<()> {
        let root = subtree
            .root()
            .ok_or_else(|| EngineError::HistoryReplay("empty subtree".to_string()))?;
        let parent_id = root.parent_id.clone();
        let root_id = root.id.clone();

        for node in &subtree.nodes {
            if self.nodes.contains_key(&node.id) || self.proxies.contains_key(&node.id) {
                return Err(EngineError::DuplicateNodeId(node.id.clone()));
            }
        }
        if self.canvas(parent_id.as_deref()).is_none() {
            return Err(EngineError::NodeNotFound(parent_id.unwrap_or_default()));
        }

        let incoming: HashSet<&str> = subtree.nodes.iter().map(|n| n.id.as_str()).collect();
        let incoming_proxies: HashSet<String> = subtree
            .nodes
            .iter()
            .filter_map(|n| n.sub_canvas.as_ref()?.block_proxy.clone())
            .collect();
        // a proxy id may not shadow any node, existing or incoming
        for proxy in &incoming_proxies {
            if incoming.contains(proxy.as_str())
                || self.nodes.contains_key(proxy)
                || self.proxies.contains_key(proxy)
            {
                return Err(EngineError::DuplicateNodeId(proxy.clone()));
            }
        }
        for (_, line) in &subtree.lines {
            for end in [&line.from, &line.to] {
                let known = incoming.contains(end.as_str())
                    || incoming_proxies.contains(end)
                    || self.nodes.contains_key(end)
                    || self.proxies.contains_key(end);
                if !known {
                    return Err(EngineError::invalid_endpoint(end, "no such node"));
                }
            }
            if self.line(&line.id).is_some() {
                return Err(EngineError::invalid_endpoint(&line.id, "line id already exists"));
            }
        }

        // validated; nothing below can fail
        if let Some(canvas) = self.canvas_mut(parent_id.as_deref()) {
            let index = subtree.canvas_index.min(canvas.nodes.len());
            canvas.nodes.insert(index, root_id);
        }
        for node in subtree.nodes {
            if let Some(proxy) = node.sub_canvas.as_ref().and_then(|c| c.block_proxy.clone()) {
                self.proxies.insert(proxy, node.id.clone());
            }
            self.nodes.insert(node.id.clone(), node);
        }
        for (index, line) in subtree.lines {
            let index = index.min(self.lines.len());
            self.lines.insert(index, line);
        }
        self.bump();
        Ok(())
    }

    /// Remove a node, its sub-canvas contents and every line touching them
    pub(crate) fn detach_subtree(&mut self, id: &str) -> Result<NodeSubtree> {
        let parent_id = self
            .nodes
            .get(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?
            .parent_id
            .clone();

        let ids = self.descendants(id);
        let removed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let removed_proxies: HashSet<String> = ids
            .iter()
            .filter_map(|n| self.nodes.get(n)?.sub_canvas.as_ref()?.block_proxy.clone())
            .collect();

        let touching: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                removed.contains(l.from.as_str())
                    || removed.contains(l.to.as_str())
                    || removed_proxies.contains(&l.from)
            })
            .map(|(i, _)| i)
            .collect();
        let mut lines = Vec::with_capacity(touching.len());
        for index in touching.into_iter().rev() {
            lines.push((index, self.lines.remove(index)));
        }
        lines.reverse();

        let mut canvas_index = 0;
        if let Some(canvas) = self.canvas_mut(parent_id.as_deref()) {
            if let Some(pos) = canvas.nodes.iter().position(|n| n == id) {
                canvas.nodes.remove(pos);
                canvas_index = pos;
            }
        }

        let nodes: Vec<Node> = ids.iter().filter_map(|n| self.nodes.remove(n)).collect();
        for proxy in &removed_proxies {
            self.proxies.remove(proxy);
        }
        self.bump();

        Ok(NodeSubtree {
            nodes,
            lines,
            canvas_index,
        })
    }

    /// Insert a line without port checks; endpoints must exist in one canvas
    pub(crate) fn insert_line(&mut self, line: Line, index: Option<usize>) -> Result<usize> {
        if self.line(&line.id).is_some() {
            return Err(EngineError::invalid_endpoint(&line.id, "line id already exists"));
        }
        let from = self
            .endpoint_canvas(&line.from)
            .ok_or_else(|| EngineError::invalid_endpoint(&line.from, "no such node"))?;
        let to = self
            .endpoint_canvas(&line.to)
            .ok_or_else(|| EngineError::invalid_endpoint(&line.to, "no such node"))?;
        if from != to {
            return Err(EngineError::invalid_endpoint(&line.id, "endpoints live in different canvases"));
        }

        let index = index.unwrap_or(self.lines.len()).min(self.lines.len());
        self.lines.insert(index, line);
        self.bump();
        Ok(index)
    }

    /// Remove a line, returning it with its position
    pub(crate) fn take_line(&mut self, id: &str) -> Option<(usize, Line)> {
        let index = self.lines.iter().position(|l| l.id == id)?;
        let line = self.lines.remove(index);
        self.bump();
        Some((index, line))
    }

    /// Swap a node's body, returning the previous one
    pub(crate) fn replace_body(&mut self, id: &str, body: NodeBody) -> Result<NodeBody> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        let previous = std::mem::replace(&mut node.body, body);
        self.bump();
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_config::{BatchConfig, CommentConfig};

    fn node(id: &str, parent: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            body: NodeBody::new(id, NodeConfig::Comment(CommentConfig::default())),
            sub_canvas: None,
        }
    }

    fn container(id: &str) -> Node {
        Node {
            id: id.to_string(),
            parent_id: None,
            body: NodeBody::new(id, NodeConfig::Batch(BatchConfig::default())),
            sub_canvas: Some(Canvas {
                nodes: Vec::new(),
                block_proxy: Some(proxy_id_for(id)),
            }),
        }
    }

    fn single(node: Node) -> NodeSubtree {
        NodeSubtree {
            nodes: vec![node],
            lines: Vec::new(),
            canvas_index: usize::MAX,
        }
    }

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.attach_subtree(single(node("a", None))).unwrap();
        doc.attach_subtree(single(container("batch"))).unwrap();
        doc.attach_subtree(single(node("inner", Some("batch")))).unwrap();
        doc.attach_subtree(single(node("b", None))).unwrap();
        doc.insert_line(Line::new("a", "batch").with_id("l1"), None).unwrap();
        doc.insert_line(Line::new("batch", "b").with_id("l2"), None).unwrap();
        doc.insert_line(Line::new(proxy_id_for("batch"), "inner").with_id("l3"), None)
            .unwrap();
        doc
    }

    #[test]
    fn test_canvas_structure() {
        let doc = sample();
        assert_eq!(doc.node_ids(), vec!["a", "batch", "inner", "b"]);
        assert_eq!(doc.nodes_in_canvas(None).len(), 3);
        assert_eq!(doc.nodes_in_canvas(Some("batch")).len(), 1);
        assert!(doc.is_proxy("batch-block-start"));
        assert!(!doc.contains("batch-block-start"));
        assert_eq!(doc.endpoint_canvas("batch-block-start"), Some(Some("batch")));
        assert_eq!(doc.ancestors("inner"), vec!["batch".to_string()]);
    }

    #[test]
    fn test_cross_canvas_line_rejected() {
        let mut doc = sample();
        let err = doc.insert_line(Line::new("a", "inner"), None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEndpoint { .. }));
        assert_eq!(doc.lines().len(), 3);
    }

    #[test]
    fn test_detach_cascades_and_attach_restores() {
        let mut doc = sample();
        let before = doc.clone();

        let subtree = doc.detach_subtree("batch").unwrap();
        assert_eq!(subtree.nodes.len(), 2);
        assert_eq!(subtree.lines.len(), 3);
        assert_eq!(subtree.canvas_index, 1);
        assert!(!doc.contains("inner"));
        assert!(!doc.is_proxy("batch-block-start"));
        assert!(doc.lines().is_empty());

        doc.attach_subtree(subtree).unwrap();
        assert_eq!(doc, before);
        assert!(doc.version() > before.version());
    }

    #[test]
    fn test_attach_duplicate_rejected() {
        let mut doc = sample();
        let err = doc.attach_subtree(single(node("a", None))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNodeId(_)));
    }

    #[test]
    fn test_proxy_id_collision_rejected() {
        let mut doc = Document::new();
        doc.attach_subtree(single(node("x-block-start", None))).unwrap();
        let err = doc.attach_subtree(single(container("x"))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNodeId(id) if id == "x-block-start"));
        assert!(!doc.contains("x"));
        assert!(doc.contains("x-block-start"));
        assert!(!doc.is_proxy("x-block-start"));
    }

    #[test]
    fn test_attach_into_missing_parent_rejected() {
        let mut doc = sample();
        let err = doc.attach_subtree(single(node("x", Some("ghost")))).unwrap_err();
        assert!(matches!(err, EngineError::NodeNotFound(_)));
        assert!(!doc.contains("x"));
    }

    #[test]
    fn test_upstream_nodes() {
        let doc = sample();
        let upstream = doc.upstream_nodes("b");
        assert!(upstream.contains("a"));
        assert!(upstream.contains("batch"));
        assert!(!upstream.contains("b"));
    }

    #[test]
    fn test_take_line_and_globals() {
        let mut doc = sample();
        let v = doc.version();
        let (index, line) = doc.take_line("l2").unwrap();
        assert_eq!(index, 1);
        assert_eq!(line.from, "batch");
        assert!(doc.take_line("l2").is_none());
        assert!(doc.version() > v);

        doc.set_globals(
            GlobalScope::User,
            vec![ViewVariableMeta::new("nickname", crate::types::ViewType::String)],
        );
        assert_eq!(doc.globals(GlobalScope::User).len(), 1);
        assert!(doc.globals(GlobalScope::App).is_empty());
        assert_eq!(
            GlobalScope::from_root_name("global_variable_user"),
            Some(GlobalScope::User)
        );
    }

    #[test]
    fn test_checkpoint_serialization() {
        let doc = sample();
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.version(), doc.version());
    }
}
