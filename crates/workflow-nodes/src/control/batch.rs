//! Batch node
//!
//! Runs its body concurrently over the elements of its array inputs.

use workflow_engine::node_config::BatchConfig;
use workflow_engine::{
    DescriptorFn, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition,
    NodeDescriptor, NodeType, ValidationContext,
};

use super::iteration::{element_locals, validate_array_inputs};

pub struct BatchNode;

impl BatchNode {
    fn default_body() -> NodeBody {
        NodeBody::new("Batch", NodeConfig::Batch(BatchConfig::default()))
    }

    fn validate(node: &Node, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let NodeConfig::Batch(config) = node.config() else {
            return Vec::new();
        };
        let mut issues = validate_array_inputs(node, ctx);
        for (path, value) in [
            ("inputs.batchSize", config.batch_size),
            ("inputs.concurrentSize", config.concurrent_size),
        ] {
            if value <= 0 {
                issues.push(Issue::new(
                    &node.id,
                    path,
                    IssueKind::InvalidConfig,
                    format!("Must be a positive number, got {}", value),
                ));
            }
        }
        issues
    }
}

impl NodeDefinition for BatchNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Batch, "Batch", NodeCategory::Control, Self::default_body)
            .with_sub_canvas(true)
            .with_locals(element_locals)
            .with_validator(Self::validate)
    }
}

inventory::submit!(DescriptorFn(BatchNode::descriptor));
