//! Comment node
//!
//! A sticky note on the canvas. It has no ports, inputs or outputs, so it
//! never takes part in data flow or scope.

use workflow_engine::descriptor::PortDefinition;
use workflow_engine::node_config::CommentConfig;
use workflow_engine::{
    DescriptorFn, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition, NodeDescriptor,
    NodeType,
};

pub struct CommentNode;

impl CommentNode {
    fn no_ports(_node: &Node) -> Vec<PortDefinition> {
        Vec::new()
    }
}

impl NodeDefinition for CommentNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Comment, "Comment", NodeCategory::Annotation, || {
            NodeBody::new("Comment", NodeConfig::Comment(CommentConfig::default()))
        })
        .with_ports(Self::no_ports)
    }
}

inventory::submit!(DescriptorFn(CommentNode::descriptor));
