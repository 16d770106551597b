//! Workflow Nodes
//!
//! Built-in node types for the workflow engine. Each type contributes a
//! [`NodeDescriptor`](workflow_engine::NodeDescriptor) at link time; linking
//! this crate is enough for [`NodeRegistry::with_builtins`] to find them all.
//!
//! # Categories
//!
//! - **Boundary**: Start and End
//! - **Processing**: LLM, Code, Plugin and HTTP, with shared error handling
//! - **Control**: Condition, Loop, Batch, Break, Continue and SetVariable
//! - **Storage**: database query, insert, update and delete
//! - **Output**: intermediate messages
//! - **Annotation**: canvas comments

pub mod annotation;
pub mod boundary;
pub mod control;
pub mod error_handling;
pub mod output;
pub mod processing;
pub mod storage;
pub mod template;

pub use annotation::CommentNode;
pub use boundary::*;
pub use control::*;
pub use output::*;
pub use processing::*;
pub use storage::*;

use workflow_engine::{Node, NodeRegistry, NodeType, SchemaRequest};

/// Registry with every built-in node type
pub fn builtin_registry() -> NodeRegistry {
    NodeRegistry::with_builtins()
}

/// The external schema a node currently needs, if any
pub fn schema_request(node: &Node) -> Option<SchemaRequest> {
    match node.node_type() {
        NodeType::Plugin => PluginNode::schema_request(node),
        NodeType::DatabaseQuery
        | NodeType::DatabaseInsert
        | NodeType::DatabaseUpdate
        | NodeType::DatabaseDelete => database_schema_request(node),
        _ => None,
    }
}
