//! End node
//!
//! Consumes the workflow result, either returned as variables or rendered
//! through an answer template.

use workflow_engine::descriptor::{PortDefinition, DEFAULT_INPUT_PORT};
use workflow_engine::node_config::{EndConfig, TerminatePlan};
use workflow_engine::{
    DescriptorFn, InputValue, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig,
    NodeDefinition, NodeDescriptor, NodeType, ValidationContext,
};

use crate::template::check_placeholders;

pub struct EndNode;

impl EndNode {
    fn default_body() -> NodeBody {
        NodeBody::new("End", NodeConfig::End(EndConfig::default()))
            .with_inputs(vec![InputValue::unbound("output")])
    }

    fn ports(_node: &Node) -> Vec<PortDefinition> {
        vec![PortDefinition::input(DEFAULT_INPUT_PORT)]
    }

    fn validate(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let NodeConfig::End(config) = node.config() else {
            return Vec::new();
        };
        if config.terminate_plan != TerminatePlan::UseAnswerContent {
            return Vec::new();
        }
        match config.content.as_deref().map(str::trim) {
            Some(content) if !content.is_empty() => {
                check_placeholders(node, content, "inputs.content")
            }
            _ => vec![Issue::new(
                &node.id,
                "inputs.content",
                IssueKind::EmptyValue,
                "An answer template is required",
            )],
        }
    }
}

impl NodeDefinition for EndNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::End, "End", NodeCategory::Boundary, Self::default_body)
            .not_removable()
            .with_ports(Self::ports)
            .with_validator(Self::validate)
    }
}

inventory::submit!(DescriptorFn(EndNode::descriptor));
