//! LLM node
//!
//! Prompts a model with templates that interpolate the node inputs.

use workflow_engine::node_config::LlmConfig;
use workflow_engine::{
    DescriptorFn, InputValue, Issue, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition,
    NodeDescriptor, NodeType, ValidationContext, ViewType, ViewVariableMeta,
};

use crate::error_handling::with_error_handling;
use crate::template::check_placeholders;

pub struct LlmNode;

impl LlmNode {
    fn default_body() -> NodeBody {
        NodeBody::new("LLM", NodeConfig::Llm(LlmConfig::default()))
            .with_inputs(vec![InputValue::unbound("input")])
            .with_outputs(vec![ViewVariableMeta::new("output", ViewType::String)])
    }

    /// Every `{{name}}` in the prompts must name an input
    fn validate(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let NodeConfig::Llm(config) = node.config() else {
            return Vec::new();
        };
        let mut issues = check_placeholders(node, &config.system_prompt, "inputs.systemPrompt");
        issues.extend(check_placeholders(node, &config.prompt, "inputs.prompt"));
        issues
    }
}

impl NodeDefinition for LlmNode {
    fn descriptor() -> NodeDescriptor {
        with_error_handling(
            NodeDescriptor::new(NodeType::Llm, "LLM", NodeCategory::Processing, Self::default_body)
                .with_validator(Self::validate),
        )
    }
}

inventory::submit!(DescriptorFn(LlmNode::descriptor));
