//! Node type registry
//!
//! Maps each [`NodeType`] to its static [`NodeDescriptor`]. The registry is
//! read-only once built and shared between sessions behind an `Arc`.
//!
//! # Usage
//!
//! ```ignore
//! use workflow_engine::NodeRegistry;
//!
//! // Every descriptor submitted through `inventory`
//! let registry = NodeRegistry::with_builtins();
//!
//! // Or composed by hand
//! let mut registry = NodeRegistry::new();
//! registry.register(MyNode::descriptor());
//! registry.merge(plugin_registry);
//! ```

use std::collections::HashMap;

use crate::descriptor::{DescriptorFn, NodeCategory, NodeDescriptor, PortDefinition, PortDirection};
use crate::document::{Node, NodeBody};
use crate::error::{EngineError, Result};
use crate::node_config::NodeType;

/// Registry of node descriptors keyed by node type
pub struct NodeRegistry {
    entries: HashMap<NodeType, NodeDescriptor>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every descriptor registered through `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for DescriptorFn(describe) in inventory::iter::<DescriptorFn> {
            registry.register(describe());
        }
        log::debug!("Collected {} built-in node descriptors", registry.entries.len());
        registry
    }

    /// Register a descriptor, replacing any previous one for the same type
    pub fn register(&mut self, descriptor: NodeDescriptor) {
        if self.entries.contains_key(&descriptor.node_type) {
            log::debug!("Replacing descriptor for node type {}", descriptor.node_type);
        }
        self.entries.insert(descriptor.node_type, descriptor);
    }

    /// Get the descriptor for a node type
    pub fn get(&self, node_type: NodeType) -> Option<&NodeDescriptor> {
        self.entries.get(&node_type)
    }

    /// Get the descriptor for a node type, failing with `UnknownNodeType`
    pub fn descriptor(&self, node_type: NodeType) -> Result<&NodeDescriptor> {
        self.get(node_type)
            .ok_or_else(|| EngineError::UnknownNodeType(node_type.to_string()))
    }

    /// Get the descriptor of a node's type
    pub fn descriptor_for(&self, node: &Node) -> Result<&NodeDescriptor> {
        self.descriptor(node.node_type())
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: NodeType) -> bool {
        self.entries.contains_key(&node_type)
    }

    /// Get all registered descriptors
    pub fn all(&self) -> Vec<&NodeDescriptor> {
        self.entries.values().collect()
    }

    /// Get descriptors grouped by category
    pub fn by_category(&self) -> HashMap<NodeCategory, Vec<&NodeDescriptor>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeDescriptor>> = HashMap::new();
        for descriptor in self.entries.values() {
            grouped.entry(descriptor.category).or_default().push(descriptor);
        }
        grouped
    }

    /// List all registered node types
    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.entries.keys().copied().collect();
        types.sort();
        types
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }

    /// Default body for a new node of this type
    pub fn default_body(&self, node_type: NodeType) -> Result<NodeBody> {
        Ok((self.descriptor(node_type)?.default_body)())
    }

    /// Current ports of a node; unknown types have none
    pub fn ports(&self, node: &Node) -> Vec<PortDefinition> {
        self.get(node.node_type())
            .map(|d| (d.ports)(node))
            .unwrap_or_default()
    }

    /// Output port ids of a node
    pub fn output_ports(&self, node: &Node) -> Vec<String> {
        self.ports(node)
            .into_iter()
            .filter(|p| p.direction == PortDirection::Output)
            .map(|p| p.id)
            .collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_config::NodeConfig;

    fn comment_body() -> NodeBody {
        NodeBody::new("Comment", NodeConfig::Comment(Default::default()))
    }

    fn break_body() -> NodeBody {
        NodeBody::new("Break", NodeConfig::Break)
    }

    fn test_descriptor(node_type: NodeType, label: &'static str) -> NodeDescriptor {
        let body = match node_type {
            NodeType::Break => break_body,
            _ => comment_body,
        };
        NodeDescriptor::new(node_type, label, NodeCategory::Annotation, body)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.register(test_descriptor(NodeType::Comment, "Comment"));

        assert!(registry.has_node_type(NodeType::Comment));
        assert!(!registry.has_node_type(NodeType::Llm));
        assert_eq!(registry.descriptor(NodeType::Comment).unwrap().label, "Comment");
        assert!(matches!(
            registry.descriptor(NodeType::Llm),
            Err(EngineError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_merge_override() {
        let mut registry1 = NodeRegistry::new();
        registry1.register(test_descriptor(NodeType::Comment, "Original"));

        let mut registry2 = NodeRegistry::new();
        registry2.register(test_descriptor(NodeType::Comment, "Override"));
        registry2.register(test_descriptor(NodeType::Break, "Break"));

        registry1.merge(registry2);
        assert_eq!(registry1.all().len(), 2);
        assert_eq!(registry1.descriptor(NodeType::Comment).unwrap().label, "Override");
        assert_eq!(registry1.node_types(), vec![NodeType::Break, NodeType::Comment]);
    }

    #[test]
    fn test_default_body() {
        let mut registry = NodeRegistry::new();
        registry.register(test_descriptor(NodeType::Break, "Break"));
        let body = registry.default_body(NodeType::Break).unwrap();
        assert_eq!(body.config.node_type(), NodeType::Break);
        assert!(registry.default_body(NodeType::Loop).is_err());
    }
}
