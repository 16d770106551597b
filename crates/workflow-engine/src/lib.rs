//! Workflow Engine - variable resolution, type propagation and validation
//! for editable workflow graphs
//!
//! This crate is the editing core behind a visual workflow editor. It holds
//! the graph document and answers the questions an editor keeps asking:
//!
//! - What variables can this node reference, and what type is `a.b.c`?
//! - Which inputs reference variables that no longer exist?
//! - Are the output names valid and unique?
//! - How do I undo the last edit?
//!
//! # Architecture
//!
//! - [`Document`]: arena of nodes with nested canvases and lines
//! - [`NodeRegistry`]: static per-type behaviour ([`NodeDescriptor`]), filled at
//!   link time by node crates through `inventory`
//! - [`VariableService`]: scope chains, memoized key-path resolution, subscriptions
//! - [`validation`]: pull-based issue collection
//! - [`History`]: invertible operations with zstd-checkpointed replay
//! - [`Session`]: ties the above together for one editing session
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workflow_engine::{EngineConfig, NodeRegistry, NodeSpec, NodeType, Session};
//!
//! let mut session = Session::new(Arc::new(NodeRegistry::with_builtins()), EngineConfig::default());
//! let start = session.add_node(NodeSpec::new(NodeType::Start))?;
//! let llm = session.add_node(NodeSpec::new(NodeType::Llm))?;
//! session.add_line(Line::new(&start, &llm))?;
//! let issues = session.validate(&llm);
//! ```

pub mod config;
pub mod descriptor;
pub mod document;
pub mod dto;
pub mod error;
pub mod events;
pub mod format;
pub mod history;
pub mod meta_diff;
pub mod node_config;
pub mod registry;
pub mod schema_sync;
pub mod session;
pub mod types;
pub mod validation;
pub mod value;
pub mod variables;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types
pub use config::{EngineConfig, ForwardReferencePolicy, ValidateTrigger};
pub use descriptor::{
    DescriptorFn, InputVariableTag, NodeCategory, NodeDefinition, NodeDescriptor, PortDefinition,
    PortDirection, DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT,
};
pub use document::{
    Canvas, Document, GlobalScope, Line, Node, NodeBody, NodeSpec, NodeSubtree, BLOCK_START_PORT,
};
pub use dto::{EdgeDto, NodeDataDto, NodeDto, WorkflowDto};
pub use error::{EngineError, Result};
pub use events::{EditEvent, NullReporter, OperationReporter, VecReporter};
pub use history::{Checkpoint, History, HistoryState, Operation};
pub use node_config::{NodeConfig, NodeType};
pub use registry::NodeRegistry;
pub use schema_sync::{SchemaArrival, SchemaFetcher, SchemaRequest, SchemaSyncOutcome};
pub use session::{NodePatch, Session};
pub use types::{FileKind, NodeId, ViewType, ViewVariableMeta};
pub use validation::{Issue, IssueKind, ValidationContext};
pub use value::{InputValue, ValueExpression};
pub use variables::{VariableChange, VariableLookup, VariableService};

// Re-export for node crates registering descriptors
pub use inventory;
