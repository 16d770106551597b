//! Validation of nodes and whole documents
//!
//! Validation is pull-based and never mutates: it walks a node's variable
//! trees and input bindings, runs the node type's own validators and returns
//! every [`Issue`] it found.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::descriptor::InputVariableTag;
use crate::document::{Document, Node};
use crate::node_config::NodeType;
use crate::registry::NodeRegistry;
use crate::types::{is_json_input_type, NodeId, ViewType, ViewVariableMeta};
use crate::variables::VariableLookup;

static NAME_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z_$0-9]*$").ok());

const RESERVED_WORDS: [&str; 9] = [
    "true", "false", "and", "or", "not", "null", "nil", "if", "switch",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyName,
    InvalidNameFormat,
    Duplicated,
    InvalidDefaultJson,
    EmptyValue,
    InvalidReference,
    InvalidConfig,
    DanglingLine,
    CycleDetected,
    NestedComposite,
    Misplaced,
}

/// A problem found by validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// `None` for problems that belong to the graph rather than one node
    pub node_id: Option<NodeId>,
    /// Field path inside the node, e.g. `outputs.obj.x` or `inputs.query`
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    pub fn new(
        node_id: impl Into<NodeId>,
        path: impl Into<String>,
        kind: IssueKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node_id: Some(node_id.into()),
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn graph(path: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            node_id: None,
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(node_id) => write!(f, "{} [{}]: {}", node_id, self.path, self.message),
            None => write!(f, "[{}]: {}", self.path, self.message),
        }
    }
}

/// What validators may look at
pub struct ValidationContext<'a> {
    pub document: &'a Document,
    pub registry: &'a NodeRegistry,
    pub lookup: &'a dyn VariableLookup,
}

/// Check a variable name, returning the issue kind if it is unacceptable
pub fn check_name(name: &str) -> Option<IssueKind> {
    if name.is_empty() {
        return Some(IssueKind::EmptyName);
    }
    let well_formed = NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name));
    if !well_formed || is_reserved(name) {
        return Some(IssueKind::InvalidNameFormat);
    }
    None
}

fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name))
}

fn field_path(parent: &str, name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("{}[{}]", parent, index)
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Walks the variable trees of one node, accumulating issues
struct NodeVisitor<'n> {
    node_id: &'n str,
    issues: Vec<Issue>,
    duplicate_reported: bool,
}

impl<'n> NodeVisitor<'n> {
    fn new(node_id: &'n str) -> Self {
        Self {
            node_id,
            issues: Vec::new(),
            duplicate_reported: false,
        }
    }

    fn push(&mut self, path: String, kind: IssueKind, message: String) {
        self.issues.push(Issue::new(self.node_id, path, kind, message));
    }

    /// Check one name against the names already seen among its siblings
    fn check_name_at<'a>(&mut self, path: String, name: &'a str, seen: &mut HashSet<&'a str>) {
        match check_name(name) {
            Some(IssueKind::EmptyName) => {
                self.push(path, IssueKind::EmptyName, "Variable name is empty".to_string())
            }
            Some(kind) => self.push(
                path,
                kind,
                format!(
                    "'{}' must start with a letter or underscore, contain only letters, digits, '_' or '$', and not be a reserved word",
                    name
                ),
            ),
            None => {
                if !seen.insert(name) && !self.duplicate_reported {
                    self.duplicate_reported = true;
                    self.push(
                        path,
                        IssueKind::Duplicated,
                        format!("Variable name '{}' is duplicated", name),
                    );
                }
            }
        }
    }

    fn check_names<'a>(&mut self, parent: &str, names: impl Iterator<Item = &'a str>) {
        let mut seen = HashSet::new();
        for (index, name) in names.enumerate() {
            self.check_name_at(field_path(parent, name, index), name, &mut seen);
        }
    }

    /// Depth-first pre-order, so the first duplicate reported is the first one met
    fn visit_metas(&mut self, parent: &str, metas: &[ViewVariableMeta]) {
        let mut seen = HashSet::new();
        for (index, meta) in metas.iter().enumerate() {
            let path = field_path(parent, &meta.name, index);
            self.check_name_at(path.clone(), &meta.name, &mut seen);
            self.check_default(&path, meta);
            if !meta.children.is_empty() {
                self.visit_metas(&path, &meta.children);
            }
        }
    }

    /// Shallow check: the default must parse and have the right top-level shape
    fn check_default(&mut self, path: &str, meta: &ViewVariableMeta) {
        if !is_json_input_type(&meta.ty) {
            return;
        }
        let Some(text) = meta.default_value.as_deref().filter(|t| !t.trim().is_empty()) else {
            return;
        };
        let shape_ok = match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => match meta.ty {
                ViewType::Object => value.is_object(),
                _ => value.is_array(),
            },
            Err(_) => false,
        };
        if !shape_ok {
            self.push(
                path.to_string(),
                IssueKind::InvalidDefaultJson,
                format!("Default value of '{}' is not a valid {}", meta.name, meta.ty),
            );
        }
    }
}

/// Validate a single node. Unknown ids yield no issues.
pub fn validate_node(node_id: &str, ctx: &ValidationContext<'_>) -> Vec<Issue> {
    let Some(node) = ctx.document.node(node_id) else {
        log::debug!("Skipping validation of unknown node '{}'", node_id);
        return Vec::new();
    };

    let mut visitor = NodeVisitor::new(&node.id);
    visitor.visit_metas("outputs", node.outputs());
    visitor.check_names("inputs", node.inputs().iter().map(|i| i.name.as_str()));
    let mut issues = visitor.issues;

    let descriptor = ctx.registry.get(node.node_type());
    if let Some(descriptor) = descriptor {
        for input in node.inputs() {
            let path = format!("inputs.{}", input.name);
            match (descriptor.input_variable_tag)(node, input, ctx.lookup) {
                InputVariableTag::Valid => {}
                InputVariableTag::Empty => issues.push(Issue::new(
                    &node.id,
                    path,
                    IssueKind::EmptyValue,
                    format!("Input '{}' has no value", input.name),
                )),
                InputVariableTag::InvalidReference => issues.push(Issue::new(
                    &node.id,
                    path,
                    IssueKind::InvalidReference,
                    format!("Input '{}' references a variable that no longer exists", input.name),
                )),
            }
        }

        for validator in &descriptor.validators {
            issues.extend(validator(node, ctx));
        }
    }
    issues
}

/// Validate every node plus the graph-level rules
pub fn validate_document(ctx: &ValidationContext<'_>) -> Vec<Issue> {
    let document = ctx.document;
    let mut issues: Vec<Issue> = document
        .node_ids()
        .iter()
        .flat_map(|id| validate_node(id, ctx))
        .collect();

    dangling_lines(document, &mut issues);

    detect_cycles(document, None, &mut issues);
    for id in document.node_ids() {
        if document.node(&id).is_some_and(Node::is_container) {
            detect_cycles(document, Some(&id), &mut issues);
        }
    }

    placement(document, ctx.registry, &mut issues);
    issues
}

fn dangling_lines(document: &Document, issues: &mut Vec<Issue>) {
    for line in document.lines() {
        for end in [&line.from, &line.to] {
            if document.endpoint_canvas(end).is_none() {
                issues.push(Issue::graph(
                    format!("lines.{}", line.id),
                    IssueKind::DanglingLine,
                    format!("Line '{}' references unknown node '{}'", line.id, end),
                ));
            }
        }
    }
}

/// Kahn's algorithm over one canvas
fn detect_cycles(document: &Document, parent: Option<&str>, issues: &mut Vec<Issue>) {
    let Some(canvas) = document.canvas(parent) else {
        return;
    };
    let lines = document.lines_in_canvas(parent);

    let mut in_degree: HashMap<&str, usize> = canvas
        .nodes
        .iter()
        .chain(canvas.block_proxy.iter())
        .map(|id| (id.as_str(), 0))
        .collect();
    for line in &lines {
        if let Some(degree) = in_degree.get_mut(line.to.as_str()) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for line in lines.iter().filter(|l| l.from == id) {
            if let Some(degree) = in_degree.get_mut(line.to.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(&line.to);
                }
            }
        }
    }

    if visited < in_degree.len() {
        let message = match parent {
            Some(container) => format!("Cycle detected inside '{}'", container),
            None => "Cycle detected in workflow".to_string(),
        };
        issues.push(Issue {
            node_id: parent.map(str::to_string),
            path: "lines".to_string(),
            kind: IssueKind::CycleDetected,
            message,
        });
    }
}

/// Composite nodes inside composite nodes, loop-only nodes outside a loop
fn placement(document: &Document, registry: &NodeRegistry, issues: &mut Vec<Issue>) {
    for id in document.node_ids() {
        let Some(node) = document.node(&id) else {
            continue;
        };
        let ancestors = document.ancestors(&id);

        let composite = registry
            .get(node.node_type())
            .is_some_and(|d| d.has_sub_canvas);
        if composite && !ancestors.is_empty() {
            issues.push(Issue::new(
                &id,
                "",
                IssueKind::NestedComposite,
                format!("{} nodes cannot be placed inside another container", node.node_type()),
            ));
        }

        if node.node_type().is_loop_only() {
            let in_loop = ancestors
                .iter()
                .filter_map(|a| document.node(a))
                .any(|a| a.node_type() == NodeType::Loop);
            if !in_loop {
                issues.push(Issue::new(
                    &id,
                    "",
                    IssueKind::Misplaced,
                    format!("{} nodes can only be used inside a loop", node.node_type()),
                ));
            }
        }
    }
}
