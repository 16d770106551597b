//! Editing session
//!
//! A [`Session`] owns one document together with everything that observes
//! or edits it: the variable service, the history log, the last validation
//! results and the schema sync. All edits go through the session so that
//! every structural mutation is policy-checked, recorded and followed by
//! subscription notification.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{EngineConfig, ValidateTrigger};
use crate::document::{Document, GlobalScope, Line, NodeBody, NodeSpec, NodeSubtree};
use crate::dto::{from_workflow_dto, to_workflow_dto, WorkflowDto};
use crate::error::{EngineError, Result};
use crate::events::{NullReporter, OperationReporter};
use crate::format::outputs_to_vo;
use crate::history::{History, Operation};
use crate::node_config::NodeConfig;
use crate::registry::NodeRegistry;
use crate::schema_sync::{
    SchemaArrival, SchemaFetcher, SchemaRequest, SchemaSync, SchemaSyncOutcome,
};
use crate::types::{LineId, NodeId, ViewVariableMeta};
use crate::validation::{validate_document, validate_node, Issue, ValidationContext};
use crate::value::{InputValue, ValueExpression, ValueExpressionDto};
use crate::variables::{
    value_expression_to_dto, value_expression_to_vo, ScopeRoot, SubscriptionId, VariableChange,
    VariableService,
};

/// A change to one part of a node body
#[derive(Debug, Clone, PartialEq)]
pub enum NodePatch {
    Title(String),
    Inputs(Vec<InputValue>),
    Outputs(Vec<ViewVariableMeta>),
    /// Must be the same variant as the node's current config
    Config(NodeConfig),
    Body(NodeBody),
}

impl NodePatch {
    fn apply(self, body: &mut NodeBody) -> Result<()> {
        match self {
            NodePatch::Title(title) => body.title = title,
            NodePatch::Inputs(inputs) => body.inputs = inputs,
            NodePatch::Outputs(outputs) => body.outputs = outputs,
            NodePatch::Config(config) => {
                check_same_type(body, &config)?;
                body.config = config;
            }
            NodePatch::Body(new_body) => {
                check_same_type(body, &new_body.config)?;
                *body = new_body;
            }
        }
        Ok(())
    }
}

fn check_same_type(body: &NodeBody, config: &NodeConfig) -> Result<()> {
    if body.node_type() != config.node_type() {
        return Err(EngineError::UnknownNodeType(format!(
            "cannot replace {} config with {} config",
            body.node_type(),
            config.node_type()
        )));
    }
    Ok(())
}

pub struct Session {
    config: EngineConfig,
    registry: Arc<NodeRegistry>,
    document: Document,
    variables: VariableService,
    history: History,
    schema_sync: Option<SchemaSync>,
    issues: BTreeMap<NodeId, Vec<Issue>>,
}

impl Session {
    pub fn new(registry: Arc<NodeRegistry>, config: EngineConfig) -> Self {
        Self::with_reporter(registry, config, Arc::new(NullReporter))
    }

    pub fn with_reporter(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        reporter: Arc<dyn OperationReporter>,
    ) -> Self {
        Self::from_document(registry, config, reporter, Document::new())
    }

    fn from_document(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        reporter: Arc<dyn OperationReporter>,
        document: Document,
    ) -> Self {
        log::info!(
            "Starting editing session ({} node types, {} nodes)",
            registry.node_types().len(),
            document.node_count()
        );
        let mut session = Self {
            variables: VariableService::new(config.forward_references),
            history: History::from_config(&config, reporter),
            config,
            registry,
            document,
            schema_sync: None,
            issues: BTreeMap::new(),
        };
        session.revalidate();
        session
    }

    /// Load a persisted workflow
    pub fn from_dto(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        dto: &WorkflowDto,
    ) -> Result<Self> {
        let document = from_workflow_dto(dto, &registry)?;
        Ok(Self::from_document(
            registry,
            config,
            Arc::new(NullReporter),
            document,
        ))
    }

    /// Enable asynchronous schema fetches
    pub fn with_schema_fetcher(mut self, fetcher: Arc<dyn SchemaFetcher>) -> Self {
        self.schema_sync = Some(SchemaSync::new(fetcher));
        self
    }

    pub fn to_dto(&self) -> WorkflowDto {
        let scope = self.variables.scope(&self.document, &self.registry);
        to_workflow_dto(&self.document, &self.registry, &scope)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn variables(&self) -> &VariableService {
        &self.variables
    }

    // --- structural mutations ---

    /// Create a node from a spec and insert it at the end of its canvas
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeId> {
        let node = self
            .document
            .create_node(spec, &self.registry)
            .inspect_err(|e| log::warn!("Rejected node creation: {}", e))?;
        let canvas_index = self
            .document
            .canvas(node.parent_id.as_deref())
            .map(|c| c.nodes.len())
            .unwrap_or_default();
        let id = node.id.clone();
        let node_type = node.node_type();

        let subtree = NodeSubtree {
            nodes: vec![node],
            lines: Vec::new(),
            canvas_index,
        };
        self.document
            .attach_subtree(subtree.clone())
            .inspect_err(|e| log::warn!("Rejected node '{}': {}", id, e))?;
        self.history.record(Operation::AddNode { subtree });

        log::debug!("Added {} node '{}'", node_type, id);
        self.after_mutation();
        if self.schema_request_for(&id).is_some() {
            self.refresh_schema_logged(&id);
        }
        Ok(id)
    }

    /// Remove a node with its sub-canvas and every line touching them
    pub fn remove_node(&mut self, id: &str) -> Result<()> {
        let pinned = self.history.pinned_nodes();
        self.document
            .check_removable(id, &self.registry, &pinned)
            .inspect_err(|e| log::warn!("Rejected removal of '{}': {}", id, e))?;

        let subtree = self.document.detach_subtree(id)?;
        let removed: Vec<NodeId> = subtree.node_ids().cloned().collect();
        for node_id in &removed {
            self.forget_node(node_id);
        }
        log::debug!(
            "Removed node '{}' ({} nodes, {} lines)",
            id,
            removed.len(),
            subtree.lines.len()
        );
        self.history.record(Operation::DeleteNode { subtree });
        self.after_mutation();
        Ok(())
    }

    /// Connect two endpoints of one canvas
    pub fn add_line(&mut self, line: Line) -> Result<LineId> {
        self.document
            .check_line(&line, &self.registry)
            .inspect_err(|e| log::warn!("Rejected line {} -> {}: {}", line.from, line.to, e))?;
        let id = line.id.clone();
        let index = self.document.insert_line(line.clone(), None)?;
        self.history.record(Operation::AddLine { index, line });

        log::debug!("Added line '{}'", id);
        self.after_mutation();
        Ok(id)
    }

    /// Remove a line. Unknown ids are a no-op returning `false`.
    pub fn remove_line(&mut self, id: &str) -> Result<bool> {
        let Some(line) = self.document.line(id) else {
            log::debug!("Line '{}' already gone", id);
            return Ok(false);
        };
        self.document
            .check_line_removal(line, &self.registry)
            .inspect_err(|e| log::warn!("Rejected removal of line '{}': {}", id, e))?;

        if let Some((index, line)) = self.document.take_line(id) {
            self.history.record(Operation::DeleteLine { index, line });
        }
        log::debug!("Removed line '{}'", id);
        self.after_mutation();
        Ok(true)
    }

    /// Replace part of a node body.
    ///
    /// Lines leaving ports the node no longer has are removed in the same
    /// history entry, and the node type's config sync runs on the new body.
    pub fn change_node_data(&mut self, id: &str, field_path: &str, patch: NodePatch) -> Result<()> {
        let node = self
            .document
            .node(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))
            .inspect_err(|e| log::warn!("Rejected change: {}", e))?;
        let before = node.body.clone();
        let mut after = before.clone();
        let previous_request = self.schema_request_for(id);
        patch
            .apply(&mut after)
            .inspect_err(|e| log::warn!("Rejected change of '{}': {}", id, e))?;

        if let Some(sync) = self.registry.get(after.node_type()).and_then(|d| d.sync_config) {
            sync(&before, &mut after);
        }
        if after == before {
            log::debug!("Change of '{}' at {} is a no-op", id, field_path);
            return Ok(());
        }

        self.transaction(|session| {
            session.document.replace_body(id, after.clone())?;
            session.history.record(Operation::ChangeNodeData {
                node_id: id.to_string(),
                field_path: field_path.to_string(),
                before,
                after,
            });

            for line_id in session.document.lines_from_missing_ports(id, &session.registry) {
                if let Some((index, line)) = session.document.take_line(&line_id) {
                    log::debug!("Pruned line '{}' from a removed port", line_id);
                    session.history.record(Operation::DeleteLine { index, line });
                }
            }
            Ok(())
        })?;

        log::debug!("Changed '{}' at {}", id, field_path);
        self.after_mutation();
        if self.schema_request_for(id) != previous_request {
            self.refresh_schema_logged(id);
        }
        Ok(())
    }

    fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.history.begin();
        let result = f(self);
        self.history.commit();
        result
    }

    /// Group the following mutations into one undo entry
    pub fn begin(&mut self) {
        self.history.begin();
    }

    pub fn commit(&mut self) {
        self.history.commit();
    }

    pub fn undo(&mut self) -> Result<()> {
        let operations = self.history.undo(&mut self.document)?;
        log::debug!("Undid {} operations", operations.len());
        self.after_replay(&operations);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let operations = self.history.redo(&mut self.document)?;
        log::debug!("Redid {} operations", operations.len());
        self.after_replay(&operations);
        Ok(())
    }

    fn after_replay(&mut self, operations: &[Operation]) {
        let gone: Vec<NodeId> = operations
            .iter()
            .flat_map(Operation::node_ids)
            .filter(|id| !self.document.contains(id))
            .cloned()
            .collect();
        for id in &gone {
            self.forget_node(id);
        }
        self.after_mutation();

        // replayed bodies lack schemas applied after they were recorded
        let mut touched: Vec<&NodeId> = operations
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    Operation::AddNode { .. }
                        | Operation::DeleteNode { .. }
                        | Operation::ChangeNodeData { .. }
                )
            })
            .flat_map(Operation::node_ids)
            .filter(|id| self.document.contains(id))
            .collect();
        touched.sort();
        touched.dedup();
        for id in touched {
            self.refresh_schema_logged(id);
        }
    }

    /// Replace the variables of a global scope. Not recorded in history.
    pub fn set_global_variables(&mut self, scope: GlobalScope, variables: Vec<ViewVariableMeta>) {
        self.document.set_globals(scope, variables);
        log::debug!("Replaced {} global variables", scope.root_name());
        self.after_mutation();
    }

    fn forget_node(&mut self, id: &str) {
        let disposed = self.variables.dispose_node(id);
        if disposed > 0 {
            log::debug!("Disposed {} subscriptions of '{}'", disposed, id);
        }
        if let Some(sync) = &mut self.schema_sync {
            sync.cancel(id);
        }
        self.issues.remove(id);
    }

    fn after_mutation(&mut self) {
        let fired = self.variables.notify(&self.document, &self.registry);
        if fired > 0 {
            log::debug!("Notified {} variable subscribers", fired);
        }
        if self.config.validate_trigger == ValidateTrigger::OnChange {
            self.revalidate();
        }
    }

    fn revalidate(&mut self) {
        let issues = {
            let scope = self.variables.scope(&self.document, &self.registry);
            let ctx = ValidationContext {
                document: &self.document,
                registry: &self.registry,
                lookup: &scope,
            };
            validate_document(&ctx)
        };
        self.store_issues(issues);
    }

    fn store_issues(&mut self, issues: Vec<Issue>) {
        self.issues.clear();
        for issue in issues {
            let key = issue.node_id.clone().unwrap_or_default();
            self.issues.entry(key).or_default().push(issue);
        }
    }

    // --- variables ---

    /// Resolve a key path from a node's point of view
    pub fn resolve(&self, node_id: &str, key_path: &[String]) -> Option<ViewVariableMeta> {
        self.variables
            .resolve(&self.document, &self.registry, node_id, key_path)
            .map(|r| r.meta)
    }

    /// Every scope root visible from a node, nearest first
    pub fn scope_chain(&self, node_id: &str) -> Vec<ScopeRoot> {
        self.variables
            .resolver()
            .scope_chain(&self.document, &self.registry, node_id)
    }

    /// Watch the variable a key path resolves to. Disposed with the node.
    pub fn on_variable_change(
        &mut self,
        node_id: &str,
        key_path: Vec<String>,
        callback: impl FnMut(&VariableChange) + 'static,
    ) -> Result<SubscriptionId> {
        if !self.document.contains(node_id) {
            return Err(EngineError::NodeNotFound(node_id.to_string()));
        }
        Ok(self.variables.on_variable_change(
            &self.document,
            &self.registry,
            node_id,
            key_path,
            Box::new(callback),
        ))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.variables.unsubscribe(id)
    }

    pub fn value_expression_to_dto(
        &self,
        node_id: &str,
        expression: &ValueExpression,
    ) -> Option<ValueExpressionDto> {
        let scope = self.variables.scope(&self.document, &self.registry);
        value_expression_to_dto(node_id, expression, &scope)
    }

    pub fn value_expression_to_vo(&self, dto: &ValueExpressionDto) -> Option<ValueExpression> {
        value_expression_to_vo(dto)
    }

    // --- validation ---

    /// Validate one node and remember its issues
    pub fn validate(&mut self, node_id: &str) -> Vec<Issue> {
        let issues = {
            let scope = self.variables.scope(&self.document, &self.registry);
            let ctx = ValidationContext {
                document: &self.document,
                registry: &self.registry,
                lookup: &scope,
            };
            validate_node(node_id, &ctx)
        };
        if issues.is_empty() {
            self.issues.remove(node_id);
        } else {
            self.issues.insert(node_id.to_string(), issues.clone());
        }
        issues
    }

    /// Validate the whole document and remember the issues
    pub fn validate_document(&mut self) -> Vec<Issue> {
        self.revalidate();
        self.issues.values().flatten().cloned().collect()
    }

    /// Issues of a node from the last validation; graph issues are under `""`
    pub fn issues(&self, node_id: &str) -> &[Issue] {
        self.issues.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_issues(&self) -> bool {
        self.issues.values().any(|i| !i.is_empty())
    }

    // --- schema sync ---

    /// Ask for the external schema of a node
    pub fn request_schema(&mut self, node_id: &str, request: SchemaRequest) -> Result<u64> {
        if !self.document.contains(node_id) {
            return Err(EngineError::NodeNotFound(node_id.to_string()));
        }
        let sync = self
            .schema_sync
            .as_mut()
            .ok_or_else(|| EngineError::Config("no schema fetcher configured".to_string()))?;
        sync.request(node_id, request)
    }

    /// The external schema a node's current config names, if any
    pub fn schema_request_for(&self, node_id: &str) -> Option<SchemaRequest> {
        let node = self.document.node(node_id)?;
        let request = self.registry.get(node.node_type())?.schema_request?;
        request(node)
    }

    /// Bring a node's schema fetch in line with its current config.
    ///
    /// Starts a fetch when the config names a schema and cancels the one in
    /// flight when it names none. Without a fetcher this does nothing.
    pub fn refresh_schema(&mut self, node_id: &str) -> Result<Option<u64>> {
        if !self.document.contains(node_id) {
            return Err(EngineError::NodeNotFound(node_id.to_string()));
        }
        let request = self.schema_request_for(node_id);
        let Some(sync) = self.schema_sync.as_mut() else {
            return Ok(None);
        };
        match request {
            Some(request) => sync.request(node_id, request).map(Some),
            None => {
                if sync.cancel(node_id) {
                    log::debug!("Cancelled schema fetch for '{}'", node_id);
                }
                Ok(None)
            }
        }
    }

    fn refresh_schema_logged(&mut self, node_id: &str) {
        if let Err(e) = self.refresh_schema(node_id) {
            log::warn!("Could not refresh schema of '{}': {}", node_id, e);
        }
    }

    /// Wait for the next schema arrival; `None` once nothing is in flight
    pub async fn next_schema_arrival(&mut self) -> Option<SchemaArrival> {
        match &mut self.schema_sync {
            Some(sync) => sync.next().await,
            None => None,
        }
    }

    /// Apply an arrived schema to its node. Not recorded in history.
    ///
    /// Returns `false` when the node is gone, its type takes no schema or
    /// its config no longer names the schema that arrived.
    pub fn apply_schema_arrival(&mut self, arrival: SchemaArrival) -> Result<bool> {
        let Some(node) = self.document.node(&arrival.node_id) else {
            log::warn!("Ignoring schema for removed node '{}'", arrival.node_id);
            return Ok(false);
        };
        let Some(descriptor) = self.registry.get(node.node_type()) else {
            return Ok(false);
        };
        let Some(apply) = descriptor.apply_schema else {
            log::debug!("{} nodes take no schema", node.node_type());
            return Ok(false);
        };
        if let Some(request) = descriptor.schema_request {
            if request(node).as_ref() != Some(&arrival.request) {
                log::warn!(
                    "Ignoring stale schema {:?} for '{}'",
                    arrival.request,
                    arrival.node_id
                );
                return Ok(false);
            }
        }

        let metas = arrival
            .result
            .and_then(|dtos| outputs_to_vo(&dtos))
            .inspect_err(|e| log::warn!("Schema fetch for '{}' failed: {}", arrival.node_id, e))?;

        let mut body = node.body.clone();
        apply(&mut body, metas);
        self.document.replace_body(&arrival.node_id, body)?;
        log::debug!("Applied schema to '{}'", arrival.node_id);
        self.after_mutation();
        Ok(true)
    }

    /// Apply every schema arrival until nothing is in flight.
    ///
    /// A failed arrival leaves its node untouched and does not stop the others.
    pub async fn sync_schemas(&mut self) -> SchemaSyncOutcome {
        let mut outcome = SchemaSyncOutcome::default();
        while let Some(arrival) = self.next_schema_arrival().await {
            let node_id = arrival.node_id.clone();
            match self.apply_schema_arrival(arrival) {
                Ok(true) => outcome.applied += 1,
                Ok(false) => {}
                Err(e) => outcome.failed.push((node_id, e)),
            }
        }
        if !outcome.is_clean() {
            log::warn!(
                "Schema sync applied {} schemas, {} failed",
                outcome.applied,
                outcome.failed.len()
            );
        }
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.history.flush_reports();
        log::info!("Closing editing session ({} nodes)", self.document.node_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::proxy_id_for;
    use crate::node_config::NodeType;
    use crate::test_support::{test_registry, vars};
    use crate::types::ViewType;
    use crate::validation::IssueKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session() -> Session {
        Session::new(Arc::new(test_registry()), EngineConfig::default())
    }

    fn code(id: &str) -> NodeSpec {
        NodeSpec::new(NodeType::Code).with_id(id)
    }

    #[test]
    fn test_add_and_remove_node() {
        let mut s = session();
        let id = s.add_node(code("a")).unwrap();
        assert_eq!(id, "a");
        assert!(s.history().can_undo());

        s.remove_node("a").unwrap();
        assert!(s.document().is_empty());
        assert!(matches!(s.remove_node("a"), Err(EngineError::NodeNotFound(_))));
    }

    #[test]
    fn test_start_is_not_removable() {
        let mut s = session();
        s.add_node(NodeSpec::new(NodeType::Start).with_id("start")).unwrap();
        let err = s.remove_node("start").unwrap_err();
        assert!(matches!(err, EngineError::NotRemovable { .. }));
        assert!(s.document().contains("start"));
    }

    #[test]
    fn test_proxy_is_not_removable() {
        let mut s = session();
        s.add_node(NodeSpec::new(NodeType::Batch).with_id("batch")).unwrap();
        let err = s.remove_node(&proxy_id_for("batch")).unwrap_err();
        assert!(matches!(err, EngineError::NotRemovable { .. }));
    }

    #[test]
    fn test_container_with_pinned_child_not_removable() {
        let mut s = session();
        s.add_node(NodeSpec::new(NodeType::Batch).with_id("batch")).unwrap();

        s.begin();
        s.add_node(code("inner").inside("batch")).unwrap();
        let err = s.remove_node("batch").unwrap_err();
        assert!(matches!(err, EngineError::NotRemovable { .. }));
        s.commit();

        s.remove_node("batch").unwrap();
        assert!(!s.document().contains("inner"));
    }

    #[test]
    fn test_add_line_rejections() {
        let mut s = session();
        s.add_node(code("a")).unwrap();
        s.add_node(code("b")).unwrap();
        let version = s.document().version();

        for line in [
            Line::new("a", "ghost"),
            Line::new("a", "a"),
            Line::new("a", "b").from_port("nowhere"),
        ] {
            assert!(matches!(s.add_line(line), Err(EngineError::InvalidEndpoint { .. })));
        }
        assert_eq!(s.document().version(), version);
        assert!(s.document().lines().is_empty());
    }

    #[test]
    fn test_remove_line_is_idempotent() {
        let mut s = session();
        s.add_node(code("a")).unwrap();
        s.add_node(code("b")).unwrap();
        let id = s.add_line(Line::new("a", "b")).unwrap();

        assert!(s.remove_line(&id).unwrap());
        assert!(!s.remove_line(&id).unwrap());
        assert!(!s.remove_line("never-existed").unwrap());
    }

    #[test]
    fn test_undo_add_node_add_line() {
        let mut s = session();
        s.add_node(code("a")).unwrap();
        let snapshot = s.document().clone();

        s.add_node(code("b")).unwrap();
        s.add_line(Line::new("a", "b")).unwrap();

        s.undo().unwrap();
        assert!(s.document().lines().is_empty());
        assert!(s.document().contains("b"));
        s.undo().unwrap();
        assert_eq!(s.document(), &snapshot);

        s.redo().unwrap();
        s.redo().unwrap();
        assert_eq!(s.document().lines().len(), 1);
    }

    #[test]
    fn test_change_node_data_and_config_mismatch() {
        let mut s = session();
        s.add_node(code("a")).unwrap();
        s.change_node_data("a", "title", NodePatch::Title("Renamed".into()))
            .unwrap();
        assert_eq!(s.document().node("a").unwrap().title(), "Renamed");

        let err = s
            .change_node_data("a", "config", NodePatch::Config(NodeConfig::Start))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownNodeType(_)));

        s.undo().unwrap();
        assert_ne!(s.document().node("a").unwrap().title(), "Renamed");
    }

    #[test]
    fn test_subscriptions_follow_changes_and_removal() {
        let mut s = session();
        s.add_node(code("a").with_outputs(vec![ViewVariableMeta::new("out", ViewType::String)]))
            .unwrap();
        s.add_node(code("b")).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.on_variable_change("b", vars(&["a", "out"]), move |change| {
            sink.borrow_mut().push(change.current.clone())
        })
        .unwrap();

        s.remove_node("a").unwrap();
        assert_eq!(seen.borrow().as_slice(), &[None]);

        s.undo().unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow()[1].is_some());

        s.remove_node("b").unwrap();
        assert!(s.variables().subscriptions().is_empty());
    }

    #[test]
    fn test_on_change_trigger_revalidates() {
        let config = EngineConfig {
            validate_trigger: ValidateTrigger::OnChange,
            ..Default::default()
        };
        let mut s = Session::new(Arc::new(test_registry()), config);
        s.add_node(code("a").with_outputs(vec![ViewVariableMeta::new("1bad", ViewType::String)]))
            .unwrap();
        assert_eq!(s.issues("a")[0].kind, IssueKind::InvalidNameFormat);

        s.change_node_data(
            "a",
            "outputs",
            NodePatch::Outputs(vec![ViewVariableMeta::new("good", ViewType::String)]),
        )
        .unwrap();
        assert!(s.issues("a").is_empty());
        assert!(!s.has_issues());
    }

    #[test]
    fn test_globals_resolve() {
        let mut s = session();
        s.add_node(code("a")).unwrap();
        s.set_global_variables(
            GlobalScope::User,
            vec![ViewVariableMeta::new("nickname", ViewType::String)],
        );
        let meta = s.resolve("a", &vars(&["global_variable_user", "nickname"])).unwrap();
        assert_eq!(meta.ty, ViewType::String);
    }

    #[test]
    fn test_schema_request_without_fetcher() {
        let mut s = session();
        s.add_node(code("a")).unwrap();
        let err = s
            .request_schema(
                "a",
                SchemaRequest::DatabaseTable {
                    table_id: "t".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
