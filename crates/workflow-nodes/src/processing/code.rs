//! Code node
//!
//! Runs user code over its inputs. The declared outputs are what the code
//! promises to return.

use workflow_engine::node_config::CodeConfig;
use workflow_engine::{
    DescriptorFn, InputValue, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig,
    NodeDefinition, NodeDescriptor, NodeType, ValidationContext, ViewType, ViewVariableMeta,
};

use crate::error_handling::with_error_handling;

pub struct CodeNode;

impl CodeNode {
    pub const LANGUAGES: [&'static str; 2] = ["python", "javascript"];

    const TEMPLATE: &'static str = "async def main(args):\n    params = args.params\n    return {\"key0\": params['input']}\n";

    fn default_body() -> NodeBody {
        NodeBody::new(
            "Code",
            NodeConfig::Code(CodeConfig {
                language: Self::LANGUAGES[0].to_string(),
                code: Self::TEMPLATE.to_string(),
                ..Default::default()
            }),
        )
        .with_inputs(vec![InputValue::unbound("input")])
        .with_outputs(vec![
            ViewVariableMeta::new("key0", ViewType::String),
            ViewVariableMeta::new("key1", ViewType::list_of(ViewType::String)),
            ViewVariableMeta::new("key2", ViewType::Object)
                .with_children(vec![ViewVariableMeta::new("key21", ViewType::String)]),
        ])
    }

    fn validate(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let NodeConfig::Code(config) = node.config() else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        if !Self::LANGUAGES.contains(&config.language.as_str()) {
            issues.push(Issue::new(
                &node.id,
                "inputs.language",
                IssueKind::InvalidConfig,
                format!("Unsupported language '{}'", config.language),
            ));
        }
        if config.code.trim().is_empty() {
            issues.push(Issue::new(&node.id, "inputs.code", IssueKind::EmptyValue, "Code is empty"));
        }
        issues
    }
}

impl NodeDefinition for CodeNode {
    fn descriptor() -> NodeDescriptor {
        with_error_handling(
            NodeDescriptor::new(NodeType::Code, "Code", NodeCategory::Processing, Self::default_body)
                .with_validator(Self::validate),
        )
    }
}

inventory::submit!(DescriptorFn(CodeNode::descriptor));
