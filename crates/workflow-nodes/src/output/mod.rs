//! Output nodes
//!
//! Nodes that send something to the conversation while the workflow runs.

mod message;

pub use message::OutputNode;
