//! Break, Continue and SetVariable
//!
//! These only mean something inside a loop body. Placement itself is checked
//! when the whole document is validated; SetVariable additionally checks that
//! every variable it assigns is declared by the enclosing loop.

use workflow_engine::descriptor::{PortDefinition, DEFAULT_INPUT_PORT};
use workflow_engine::{
    DescriptorFn, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition,
    NodeDescriptor, NodeType, ValidationContext,
};

use super::loop_node::LoopNode;

/// Loop control nodes end the current path of the body
fn input_only(_node: &Node) -> Vec<PortDefinition> {
    vec![PortDefinition::input(DEFAULT_INPUT_PORT)]
}

pub struct BreakNode;

impl NodeDefinition for BreakNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Break, "Break", NodeCategory::Control, || {
            NodeBody::new("Break", NodeConfig::Break)
        })
        .with_ports(input_only)
    }
}

inventory::submit!(DescriptorFn(BreakNode::descriptor));

pub struct ContinueNode;

impl NodeDefinition for ContinueNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Continue, "Continue", NodeCategory::Control, || {
            NodeBody::new("Continue", NodeConfig::Continue)
        })
        .with_ports(input_only)
    }
}

inventory::submit!(DescriptorFn(ContinueNode::descriptor));

/// Assigns new values to loop variables.
///
/// Each input is one assignment: its name is the loop variable, its
/// expression the new value.
pub struct SetVariableNode;

impl SetVariableNode {
    fn validate(node: &Node, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let enclosing = ctx
            .document
            .ancestors(&node.id)
            .into_iter()
            .find_map(|id| ctx.document.node(&id).and_then(LoopNode::config));
        let Some(enclosing) = enclosing else {
            return Vec::new();
        };

        node.inputs()
            .iter()
            .filter(|input| !input.name.is_empty())
            .filter(|input| !enclosing.variables.iter().any(|v| v.name == input.name))
            .map(|input| {
                Issue::new(
                    &node.id,
                    format!("inputs.{}", input.name),
                    IssueKind::InvalidReference,
                    format!("'{}' is not a variable of the enclosing loop", input.name),
                )
            })
            .collect()
    }
}

impl NodeDefinition for SetVariableNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(
            NodeType::SetVariable,
            "Set Variable",
            NodeCategory::Control,
            || NodeBody::new("Set Variable", NodeConfig::SetVariable),
        )
        .with_validator(Self::validate)
    }
}

inventory::submit!(DescriptorFn(SetVariableNode::descriptor));
