//! Processing nodes
//!
//! Nodes that compute something and can fail while doing it. All of them
//! share the error handling in [`crate::error_handling`].

mod code;
mod http;
mod llm;
mod plugin;

pub use code::CodeNode;
pub use http::HttpNode;
pub use llm::LlmNode;
pub use plugin::PluginNode;
