//! Control nodes
//!
//! Branching and iteration: conditions, loops, batches and the nodes that
//! steer a running loop.

mod batch;
mod condition;
pub mod iteration;
mod loop_control;
mod loop_node;

pub use batch::BatchNode;
pub use condition::ConditionNode;
pub use loop_control::{BreakNode, ContinueNode, SetVariableNode};
pub use loop_node::LoopNode;
