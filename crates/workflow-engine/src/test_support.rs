//! Minimal descriptors for unit tests
//!
//! The real node types live in the `workflow-nodes` crate, which this crate
//! cannot depend on. These cover the shapes the engine itself cares about.

use crate::descriptor::{NodeCategory, NodeDescriptor};
use crate::document::{Node, NodeBody};
use crate::node_config::{
    BatchConfig, CodeConfig, CommentConfig, EndConfig, LoopConfig, NodeConfig, NodeType,
};
use crate::registry::NodeRegistry;
use crate::types::{ViewType, ViewVariableMeta};
use crate::variables::VariableLookup;

pub fn vars(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

fn start() -> NodeBody {
    NodeBody::new("Start", NodeConfig::Start)
}

fn end() -> NodeBody {
    NodeBody::new("End", NodeConfig::End(EndConfig::default()))
}

fn code() -> NodeBody {
    NodeBody::new("Code", NodeConfig::Code(CodeConfig::default()))
}

fn batch() -> NodeBody {
    NodeBody::new("Batch", NodeConfig::Batch(BatchConfig::default()))
}

fn loop_body() -> NodeBody {
    NodeBody::new("Loop", NodeConfig::Loop(LoopConfig::default()))
}

fn break_body() -> NodeBody {
    NodeBody::new("Break", NodeConfig::Break)
}

fn continue_body() -> NodeBody {
    NodeBody::new("Continue", NodeConfig::Continue)
}

fn comment() -> NodeBody {
    NodeBody::new("Comment", NodeConfig::Comment(CommentConfig::default()))
}

/// `index` plus one element local per list-typed input
fn element_locals(node: &Node, lookup: &dyn VariableLookup) -> Vec<ViewVariableMeta> {
    let mut locals =
        vec![ViewVariableMeta::new("index", ViewType::Integer).with_key(format!("{}:index", node.id))];
    for input in node.inputs() {
        let Some(path) = input.input.key_path() else {
            continue;
        };
        let Some(resolved) = lookup.lookup(&node.id, path) else {
            continue;
        };
        if let ViewType::List(item) = resolved.meta.ty {
            locals.push(ViewVariableMeta {
                key: format!("{}:{}", node.id, input.name),
                name: input.name.clone(),
                ty: *item,
                children: resolved.meta.children,
                ..ViewVariableMeta::new("", ViewType::String)
            });
        }
    }
    locals
}

pub fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(
        NodeDescriptor::new(NodeType::Start, "Start", NodeCategory::Boundary, start).not_removable(),
    );
    registry.register(
        NodeDescriptor::new(NodeType::End, "End", NodeCategory::Boundary, end).not_removable(),
    );
    registry.register(NodeDescriptor::new(NodeType::Code, "Code", NodeCategory::Processing, code));
    registry.register(
        NodeDescriptor::new(NodeType::Batch, "Batch", NodeCategory::Control, batch)
            .with_sub_canvas(true)
            .with_locals(element_locals),
    );
    registry.register(
        NodeDescriptor::new(NodeType::Loop, "Loop", NodeCategory::Control, loop_body)
            .with_sub_canvas(true)
            .with_locals(element_locals),
    );
    registry.register(NodeDescriptor::new(
        NodeType::Break,
        "Break",
        NodeCategory::Control,
        break_body,
    ));
    registry.register(NodeDescriptor::new(
        NodeType::Continue,
        "Continue",
        NodeCategory::Control,
        continue_body,
    ));
    registry.register(NodeDescriptor::new(
        NodeType::Comment,
        "Comment",
        NodeCategory::Annotation,
        comment,
    ));
    registry
}
