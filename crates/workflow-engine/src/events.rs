//! Edit events reported to an external telemetry consumer
//!
//! The history service reports every recorded operation through an
//! [`OperationReporter`]. Consecutive data changes to the same node field are
//! collapsed into one [`EditEvent::NodeDataChanged`] before they reach the
//! reporter.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::node_config::NodeType;
use crate::types::{LineId, NodeId};

/// Trait for receiving edit events
///
/// This abstracts over the transport (telemetry client, channel, log, ...)
/// so the engine can be embedded in different hosts.
pub trait OperationReporter: Send + Sync {
    /// Report an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn report(&self, event: EditEvent) -> Result<(), ReportError>;
}

/// Error when reporting an event fails
#[derive(Debug, Clone)]
pub struct ReportError {
    pub message: String,
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Report error: {}", self.message)
    }
}

impl std::error::Error for ReportError {}

impl ReportError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events describing user edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditEvent {
    #[serde(rename_all = "camelCase")]
    NodeAdded { node_id: NodeId, node_type: NodeType },

    #[serde(rename_all = "camelCase")]
    NodeRemoved { node_id: NodeId, node_type: NodeType },

    #[serde(rename_all = "camelCase")]
    LineAdded {
        line_id: LineId,
        from: NodeId,
        to: NodeId,
    },

    #[serde(rename_all = "camelCase")]
    LineRemoved { line_id: LineId },

    /// One or more consecutive changes to the same node field settled
    #[serde(rename_all = "camelCase")]
    NodeDataChanged {
        node_id: NodeId,
        field_path: String,
        changes: usize,
    },

    #[serde(rename_all = "camelCase")]
    Undone { operations: usize },

    #[serde(rename_all = "camelCase")]
    Redone { operations: usize },
}

impl EditEvent {
    pub fn node_data_changed(node_id: &str, field_path: &str, changes: usize) -> Self {
        Self::NodeDataChanged {
            node_id: node_id.to_string(),
            field_path: field_path.to_string(),
            changes,
        }
    }
}

/// A no-op reporter that discards all events
pub struct NullReporter;

impl OperationReporter for NullReporter {
    fn report(&self, _event: EditEvent) -> Result<(), ReportError> {
        Ok(())
    }
}

/// A vector-based reporter that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecReporter {
    events: Mutex<Vec<EditEvent>>,
}

impl VecReporter {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<EditEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<EditEvent> {
        self.guard().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.guard().clear();
    }
}

impl Default for VecReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationReporter for VecReporter {
    fn report(&self, event: EditEvent) -> Result<(), ReportError> {
        self.guard().push(event);
        Ok(())
    }
}

/// Shared handles report into the same sink
impl<T: OperationReporter + ?Sized> OperationReporter for std::sync::Arc<T> {
    fn report(&self, event: EditEvent) -> Result<(), ReportError> {
        (**self).report(event)
    }
}
