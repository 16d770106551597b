//! Node descriptors: the static, per-node-type behaviour table
//!
//! A [`NodeDescriptor`] bundles everything the engine needs to know about a
//! node type without holding any per-graph state: its flags, default body,
//! dynamic ports, persistence formatters, input tagging, validators, line
//! policy and scope contributions.
//!
//! Node crates describe themselves through [`NodeDefinition`] and register at
//! link time:
//!
//! ```ignore
//! impl NodeDefinition for LlmNode {
//!     fn descriptor() -> NodeDescriptor {
//!         NodeDescriptor::new(NodeType::Llm, "LLM", NodeCategory::Processing, default_body)
//!             .with_ports(error_handling::ports)
//!     }
//! }
//!
//! inventory::submit!(workflow_engine::DescriptorFn(LlmNode::descriptor));
//! ```

use serde::{Deserialize, Serialize};

use crate::document::{Document, Line, Node, NodeBody};
use crate::dto::NodeDataDto;
use crate::error::Result;
use crate::format;
use crate::node_config::NodeType;
use crate::schema_sync::SchemaRequest;
use crate::types::{PortId, ViewVariableMeta};
use crate::validation::{Issue, ValidationContext};
use crate::value::InputValue;
use crate::variables::VariableLookup;

/// Port id used when a line does not name a port
pub const DEFAULT_INPUT_PORT: &str = "input";
/// Port id used when a line does not name a port
pub const DEFAULT_OUTPUT_PORT: &str = "output";

/// Category of a node for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Workflow entry and exit
    Boundary,
    /// Nodes that compute something (LLM, code, plugins, HTTP)
    Processing,
    /// Control flow (conditions, loops, batches)
    Control,
    /// Database access
    Storage,
    /// Messages sent to the conversation
    Output,
    /// Canvas annotations
    Annotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A connection point of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub id: PortId,
    pub direction: PortDirection,
}

impl PortDefinition {
    pub fn input(id: impl Into<PortId>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
        }
    }

    pub fn output(id: impl Into<PortId>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
        }
    }
}

/// Health of a single input binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputVariableTag {
    Valid,
    /// Nothing bound to a required input
    Empty,
    /// A reference that no longer resolves
    InvalidReference,
}

pub type DefaultBodyFn = fn() -> NodeBody;
pub type PortsFn = fn(&Node) -> Vec<PortDefinition>;
/// Build a node body from its wire data, starting from the type's default body
pub type FormatOnInitFn = fn(&NodeDataDto, NodeBody) -> Result<NodeBody>;
pub type FormatOnSubmitFn = fn(&Node, &dyn VariableLookup) -> NodeDataDto;
pub type InputTagFn = fn(&Node, &InputValue, &dyn VariableLookup) -> InputVariableTag;
pub type NodeValidator = fn(&Node, &ValidationContext<'_>) -> Vec<Issue>;
/// Whether `line` (whose source is a node of this type) may be removed
pub type LinePolicyFn = fn(&Document, &Line) -> bool;
/// Bring a changed body's config back in line with its new outputs; receives the previous body
pub type SyncConfigFn = fn(&NodeBody, &mut NodeBody);
/// Variables a container contributes to the scope of its sub-canvas
pub type LocalsFn = fn(&Node, &dyn VariableLookup) -> Vec<ViewVariableMeta>;
/// The external schema a node currently needs, if any
pub type SchemaRequestFn = fn(&Node) -> Option<SchemaRequest>;
/// Apply an asynchronously fetched schema to a body
pub type ApplySchemaFn = fn(&mut NodeBody, Vec<ViewVariableMeta>);

/// Static description of a node type
#[derive(Clone)]
pub struct NodeDescriptor {
    pub node_type: NodeType,
    pub label: &'static str,
    pub category: NodeCategory,
    /// Whether users may delete nodes of this type
    pub removable: bool,
    /// Whether the node owns a sub-canvas
    pub has_sub_canvas: bool,
    /// Whether the sub-canvas gets a synthesized proxy block node
    pub block_splitter: bool,
    pub default_body: DefaultBodyFn,
    pub ports: PortsFn,
    pub format_on_init: FormatOnInitFn,
    pub format_on_submit: FormatOnSubmitFn,
    pub input_variable_tag: InputTagFn,
    pub validators: Vec<NodeValidator>,
    pub can_remove_line: LinePolicyFn,
    pub sync_config: Option<SyncConfigFn>,
    pub locals: Option<LocalsFn>,
    pub schema_request: Option<SchemaRequestFn>,
    pub apply_schema: Option<ApplySchemaFn>,
}

impl std::fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("node_type", &self.node_type)
            .field("label", &self.label)
            .field("category", &self.category)
            .field("removable", &self.removable)
            .field("has_sub_canvas", &self.has_sub_canvas)
            .field("block_splitter", &self.block_splitter)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl NodeDescriptor {
    /// Create a descriptor with the generic behaviour for everything but the default body
    pub fn new(
        node_type: NodeType,
        label: &'static str,
        category: NodeCategory,
        default_body: DefaultBodyFn,
    ) -> Self {
        Self {
            node_type,
            label,
            category,
            removable: true,
            has_sub_canvas: false,
            block_splitter: false,
            default_body,
            ports: default_ports,
            format_on_init: format::default_format_on_init,
            format_on_submit: format::default_format_on_submit,
            input_variable_tag: default_input_tag,
            validators: Vec::new(),
            can_remove_line: allow_line_removal,
            sync_config: None,
            locals: None,
            schema_request: None,
            apply_schema: None,
        }
    }

    pub fn not_removable(mut self) -> Self {
        self.removable = false;
        self
    }

    /// Give the node a sub-canvas, optionally with a proxy block node
    pub fn with_sub_canvas(mut self, block_splitter: bool) -> Self {
        self.has_sub_canvas = true;
        self.block_splitter = block_splitter;
        self
    }

    pub fn with_ports(mut self, ports: PortsFn) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_formatters(mut self, init: FormatOnInitFn, submit: FormatOnSubmitFn) -> Self {
        self.format_on_init = init;
        self.format_on_submit = submit;
        self
    }

    pub fn with_input_tag(mut self, tag: InputTagFn) -> Self {
        self.input_variable_tag = tag;
        self
    }

    pub fn with_validator(mut self, validator: NodeValidator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_line_policy(mut self, policy: LinePolicyFn) -> Self {
        self.can_remove_line = policy;
        self
    }

    pub fn with_config_sync(mut self, sync: SyncConfigFn) -> Self {
        self.sync_config = Some(sync);
        self
    }

    pub fn with_locals(mut self, locals: LocalsFn) -> Self {
        self.locals = Some(locals);
        self
    }

    /// Make the node's outputs follow an external schema
    pub fn with_schema_target(mut self, request: SchemaRequestFn, apply: ApplySchemaFn) -> Self {
        self.schema_request = Some(request);
        self.apply_schema = Some(apply);
        self
    }
}

/// Trait for node types that describe themselves
pub trait NodeDefinition {
    fn descriptor() -> NodeDescriptor
    where
        Self: Sized;
}

/// Link-time registration of a node descriptor.
///
/// Collected by [`NodeRegistry::with_builtins`](crate::registry::NodeRegistry::with_builtins).
pub struct DescriptorFn(pub fn() -> NodeDescriptor);

inventory::collect!(DescriptorFn);

/// One input and one output port
pub fn default_ports(_node: &Node) -> Vec<PortDefinition> {
    vec![
        PortDefinition::input(DEFAULT_INPUT_PORT),
        PortDefinition::output(DEFAULT_OUTPUT_PORT),
    ]
}

/// Empty inputs are `Empty`, references that do not resolve are `InvalidReference`
pub fn default_input_tag(
    node: &Node,
    input: &InputValue,
    lookup: &dyn VariableLookup,
) -> InputVariableTag {
    if input.input.is_empty() {
        return InputVariableTag::Empty;
    }
    reference_tag(node, input, lookup)
}

/// Like [`default_input_tag`] but an unbound input is acceptable
pub fn optional_input_tag(
    node: &Node,
    input: &InputValue,
    lookup: &dyn VariableLookup,
) -> InputVariableTag {
    if input.input.is_empty() {
        return InputVariableTag::Valid;
    }
    reference_tag(node, input, lookup)
}

fn reference_tag(node: &Node, input: &InputValue, lookup: &dyn VariableLookup) -> InputVariableTag {
    match input.input.key_path() {
        Some(path) if lookup.lookup(&node.id, path).is_none() => InputVariableTag::InvalidReference,
        _ => InputVariableTag::Valid,
    }
}

pub fn allow_line_removal(_document: &Document, _line: &Line) -> bool {
    true
}
