//! Boundary nodes
//!
//! Where a workflow starts and ends. Every workflow has exactly one of each
//! and neither can be removed.

mod end;
mod start;

pub use end::EndNode;
pub use start::StartNode;
