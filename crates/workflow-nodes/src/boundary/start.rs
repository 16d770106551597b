//! Start node
//!
//! Declares the workflow parameters as its outputs.

use workflow_engine::descriptor::{PortDefinition, DEFAULT_OUTPUT_PORT};
use workflow_engine::{
    DescriptorFn, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition, NodeDescriptor,
    NodeType,
};

pub struct StartNode;

impl StartNode {
    fn default_body() -> NodeBody {
        NodeBody::new("Start", NodeConfig::Start)
    }

    fn ports(_node: &Node) -> Vec<PortDefinition> {
        vec![PortDefinition::output(DEFAULT_OUTPUT_PORT)]
    }
}

impl NodeDefinition for StartNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Start, "Start", NodeCategory::Boundary, Self::default_body)
            .not_removable()
            .with_ports(Self::ports)
    }
}

inventory::submit!(DescriptorFn(StartNode::descriptor));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let descriptor = StartNode::descriptor();
        assert_eq!(descriptor.node_type, NodeType::Start);
        assert!(!descriptor.removable);
        assert!(!descriptor.has_sub_canvas);
    }
}
