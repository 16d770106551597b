//! Output (message) node
//!
//! Renders a template over its inputs and emits it as an intermediate
//! message, optionally streamed.

use workflow_engine::node_config::OutputConfig;
use workflow_engine::{
    DescriptorFn, InputValue, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig,
    NodeDefinition, NodeDescriptor, NodeType, ValidationContext,
};

use crate::template::check_placeholders;

pub struct OutputNode;

impl OutputNode {
    fn default_body() -> NodeBody {
        NodeBody::new("Output", NodeConfig::Output(OutputConfig::default()))
            .with_inputs(vec![InputValue::unbound("output")])
    }

    fn validate(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let NodeConfig::Output(config) = node.config() else {
            return Vec::new();
        };
        if config.content.trim().is_empty() {
            return vec![Issue::new(
                &node.id,
                "inputs.content",
                IssueKind::EmptyValue,
                "Message content is empty",
            )];
        }
        check_placeholders(node, &config.content, "inputs.content")
    }
}

impl NodeDefinition for OutputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Output, "Output", NodeCategory::Output, Self::default_body)
            .with_validator(Self::validate)
    }
}

inventory::submit!(DescriptorFn(OutputNode::descriptor));
