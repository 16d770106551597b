//! Operation log with undo/redo
//!
//! Every structural mutation is recorded as an invertible [`Operation`].
//! Operations recorded between [`History::begin`] and [`History::commit`] form
//! one undo entry; outside a transaction each operation is its own entry.
//!
//! Replay is atomic: before an entry is undone or redone the document is
//! captured in a zstd-compressed [`Checkpoint`]. If any inverse fails the
//! checkpoint is restored and both stacks are left as they were.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::document::{Document, Line, NodeBody, NodeSubtree};
use crate::error::{EngineError, Result};
use crate::events::{EditEvent, NullReporter, OperationReporter};
use crate::types::NodeId;

/// A recorded, invertible document mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    AddNode { subtree: NodeSubtree },
    #[serde(rename_all = "camelCase")]
    DeleteNode { subtree: NodeSubtree },
    #[serde(rename_all = "camelCase")]
    AddLine { index: usize, line: Line },
    #[serde(rename_all = "camelCase")]
    DeleteLine { index: usize, line: Line },
    #[serde(rename_all = "camelCase")]
    ChangeNodeData {
        node_id: NodeId,
        field_path: String,
        before: NodeBody,
        after: NodeBody,
    },
}

impl Operation {
    /// Re-apply the operation
    pub fn apply(&self, document: &mut Document) -> Result<()> {
        match self {
            Operation::AddNode { subtree } => document.attach_subtree(subtree.clone()),
            Operation::DeleteNode { subtree } => {
                let root = subtree
                    .root()
                    .ok_or_else(|| EngineError::HistoryReplay("empty subtree".to_string()))?;
                document.detach_subtree(&root.id).map(|_| ())
            }
            Operation::AddLine { index, line } => {
                document.insert_line(line.clone(), Some(*index)).map(|_| ())
            }
            Operation::DeleteLine { line, .. } => take_line(document, &line.id),
            Operation::ChangeNodeData { node_id, after, .. } => {
                document.replace_body(node_id, after.clone()).map(|_| ())
            }
        }
    }

    /// Apply the inverse of the operation
    pub fn revert(&self, document: &mut Document) -> Result<()> {
        match self {
            Operation::AddNode { subtree } => {
                let root = subtree
                    .root()
                    .ok_or_else(|| EngineError::HistoryReplay("empty subtree".to_string()))?;
                document.detach_subtree(&root.id).map(|_| ())
            }
            Operation::DeleteNode { subtree } => document.attach_subtree(subtree.clone()),
            Operation::AddLine { line, .. } => take_line(document, &line.id),
            Operation::DeleteLine { index, line } => {
                document.insert_line(line.clone(), Some(*index)).map(|_| ())
            }
            Operation::ChangeNodeData {
                node_id, before, ..
            } => document.replace_body(node_id, before.clone()).map(|_| ()),
        }
    }

    /// Nodes this operation depends on
    pub fn node_ids(&self) -> Vec<&NodeId> {
        match self {
            Operation::AddNode { subtree } | Operation::DeleteNode { subtree } => {
                subtree.node_ids().collect()
            }
            Operation::AddLine { line, .. } | Operation::DeleteLine { line, .. } => {
                vec![&line.from, &line.to]
            }
            Operation::ChangeNodeData { node_id, .. } => vec![node_id],
        }
    }

    fn event(&self) -> Option<EditEvent> {
        match self {
            Operation::AddNode { subtree } => subtree.root().map(|n| EditEvent::NodeAdded {
                node_id: n.id.clone(),
                node_type: n.node_type(),
            }),
            Operation::DeleteNode { subtree } => subtree.root().map(|n| EditEvent::NodeRemoved {
                node_id: n.id.clone(),
                node_type: n.node_type(),
            }),
            Operation::AddLine { line, .. } => Some(EditEvent::LineAdded {
                line_id: line.id.clone(),
                from: line.from.clone(),
                to: line.to.clone(),
            }),
            Operation::DeleteLine { line, .. } => Some(EditEvent::LineRemoved {
                line_id: line.id.clone(),
            }),
            Operation::ChangeNodeData { .. } => None,
        }
    }
}

fn take_line(document: &mut Document, id: &str) -> Result<()> {
    document
        .take_line(id)
        .map(|_| ())
        .ok_or_else(|| EngineError::HistoryReplay(format!("line '{}' is missing", id)))
}

/// An operation with the time it was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    #[serde(flatten)]
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
}

/// One undo step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub records: Vec<OperationRecord>,
}

impl HistoryEntry {
    pub fn operations(&self) -> Vec<Operation> {
        self.records.iter().map(|r| r.operation.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Idle,
    Recording,
}

/// Compressed snapshot of a document
pub struct Checkpoint {
    compressed: Vec<u8>,
}

impl Checkpoint {
    pub fn capture(document: &Document, level: i32) -> Result<Self> {
        let json = serde_json::to_vec(document)?;
        let compressed = zstd::encode_all(&json[..], level)
            .map_err(|e| EngineError::Compression(e.to_string()))?;
        Ok(Self { compressed })
    }

    pub fn restore(&self) -> Result<Document> {
        let json = zstd::decode_all(&self.compressed[..])
            .map_err(|e| EngineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn compressed_size(&self) -> usize {
        self.compressed.len()
    }
}

struct PendingChange {
    node_id: NodeId,
    field_path: String,
    changes: usize,
}

#[derive(Clone, Copy)]
enum Direction {
    Backward,
    Forward,
}

/// Undo/redo log of one session
pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    open: Option<HistoryEntry>,
    depth: usize,
    limit: usize,
    checkpoint_level: i32,
    reporter: Arc<dyn OperationReporter>,
    pending: Option<PendingChange>,
}

impl History {
    pub fn new(limit: usize, checkpoint_level: i32, reporter: Arc<dyn OperationReporter>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            open: None,
            depth: 0,
            limit: limit.max(1),
            checkpoint_level,
            reporter,
            pending: None,
        }
    }

    pub fn from_config(config: &EngineConfig, reporter: Arc<dyn OperationReporter>) -> Self {
        Self::new(config.history_limit, config.checkpoint_level, reporter)
    }

    pub fn state(&self) -> HistoryState {
        if self.open.is_some() {
            HistoryState::Recording
        } else {
            HistoryState::Idle
        }
    }

    /// Open a transaction. Nested calls join the outer transaction.
    pub fn begin(&mut self) {
        if self.depth == 0 {
            self.open = Some(HistoryEntry::default());
        }
        self.depth += 1;
    }

    /// Close a transaction; the outermost commit pushes one undo entry
    pub fn commit(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return;
        }
        if let Some(entry) = self.open.take() {
            if !entry.records.is_empty() {
                self.push_entry(entry);
            }
        }
        self.flush_reports();
    }

    fn force_commit(&mut self) {
        if self.depth > 0 {
            self.depth = 1;
            self.commit();
        }
    }

    /// Record an applied operation
    pub fn record(&mut self, operation: Operation) {
        self.report(&operation);
        let record = OperationRecord {
            operation,
            timestamp: Utc::now(),
        };
        match &mut self.open {
            Some(entry) => entry.records.push(record),
            None => self.push_entry(HistoryEntry {
                records: vec![record],
            }),
        }
        self.redo_stack.clear();
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
    }

    /// Nodes the open transaction depends on
    pub fn pinned_nodes(&self) -> HashSet<NodeId> {
        self.open
            .iter()
            .flat_map(|e| e.records.iter())
            .flat_map(|r| r.operation.node_ids())
            .cloned()
            .collect()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.open.as_ref().is_some_and(|e| !e.records.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.flush_reports();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open = None;
        self.depth = 0;
    }

    /// Undo the most recent entry, returning the operations that were reverted
    pub fn undo(&mut self, document: &mut Document) -> Result<Vec<Operation>> {
        self.force_commit();
        self.flush_reports();
        let entry = self
            .undo_stack
            .pop_back()
            .ok_or(EngineError::NothingToReplay("undo"))?;

        if let Err(e) = self.replay(document, &entry, Direction::Backward) {
            self.undo_stack.push_back(entry);
            return Err(e);
        }

        let operations = entry.operations();
        self.emit(EditEvent::Undone {
            operations: operations.len(),
        });
        self.redo_stack.push(entry);
        Ok(operations)
    }

    /// Redo the most recently undone entry, returning the operations that were re-applied
    pub fn redo(&mut self, document: &mut Document) -> Result<Vec<Operation>> {
        self.force_commit();
        self.flush_reports();
        let entry = self
            .redo_stack
            .pop()
            .ok_or(EngineError::NothingToReplay("redo"))?;

        if let Err(e) = self.replay(document, &entry, Direction::Forward) {
            self.redo_stack.push(entry);
            return Err(e);
        }

        let operations = entry.operations();
        self.emit(EditEvent::Redone {
            operations: operations.len(),
        });
        self.push_entry(entry);
        Ok(operations)
    }

    fn replay(&self, document: &mut Document, entry: &HistoryEntry, direction: Direction) -> Result<()> {
        let checkpoint = Checkpoint::capture(document, self.checkpoint_level)?;
        let outcome = match direction {
            Direction::Backward => entry
                .records
                .iter()
                .rev()
                .try_for_each(|r| r.operation.revert(document)),
            Direction::Forward => entry
                .records
                .iter()
                .try_for_each(|r| r.operation.apply(document)),
        };

        if let Err(e) = outcome {
            log::warn!("History replay failed, restoring checkpoint: {}", e);
            *document = checkpoint.restore()?;
            let message = match e {
                EngineError::HistoryReplay(message) => message,
                other => other.to_string(),
            };
            return Err(EngineError::HistoryReplay(message));
        }
        Ok(())
    }

    fn report(&mut self, operation: &Operation) {
        if let Operation::ChangeNodeData {
            node_id, field_path, ..
        } = operation
        {
            if let Some(pending) = &mut self.pending {
                if &pending.node_id == node_id && &pending.field_path == field_path {
                    pending.changes += 1;
                    return;
                }
            }
            self.flush_reports();
            self.pending = Some(PendingChange {
                node_id: node_id.clone(),
                field_path: field_path.clone(),
                changes: 1,
            });
            return;
        }

        self.flush_reports();
        if let Some(event) = operation.event() {
            self.emit(event);
        }
    }

    /// Report a settled run of data changes, if any
    pub fn flush_reports(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.emit(EditEvent::node_data_changed(
                &pending.node_id,
                &pending.field_path,
                pending.changes,
            ));
        }
    }

    fn emit(&self, event: EditEvent) {
        if let Err(e) = self.reporter.report(event) {
            log::warn!("Failed to report edit event: {}", e);
        }
    }
}

impl Default for History {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self::from_config(&config, Arc::new(NullReporter))
    }
}
